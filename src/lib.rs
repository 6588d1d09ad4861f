#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

//! A pairwise hidden-Markov-model alignment engine for nanopore signal data.
//!
//! This crate aligns a nucleotide sequence (as a sequence of overlapping
//! k-mers) against an event sequence (per-event mean current and noise) by
//! evaluating a dynamic-programming lattice whose cells are log-probabilities
//! computed from a small family of state machines. It also provides the
//! training-side twin of those state machines: per-variant HMM expectation
//! containers that accumulate transition and emission expectations,
//! normalize them, and round-trip to disk.
//!
//! The DP *cell-update* kernel ([`state_machine::StateMachine::cell_calculate`])
//! is in scope; the driver that iterates the lattice, schedules reads across
//! threads, and produces a traceback/alignment string is an external
//! collaborator this crate does not implement.

pub mod emissions;
pub mod error;
pub mod facade;
pub mod hmm;
pub mod kmer;
pub mod pore_model;
pub mod serializer;
pub mod state;
pub mod state_machine;

/// Sentinel standing in for `log(0)`: a large negative magnitude (not
/// `f64::NEG_INFINITY`) so that accumulating several disabled edges can
/// never produce a NaN through `-inf + inf` cancellation.
pub const LOG_ZERO: f64 = -1.0e9;

/// Stable integer tags for the HMM/state-machine variants, used as the first
/// field of every on-disk format (§6) and rejected by loaders that don't
/// expect them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ModelType {
    /// 5-state symbol-to-symbol machine, symmetric defaults.
    FiveState = 0,
    /// 5-state symbol-to-symbol machine, asymmetric (independently trained)
    /// parameters.
    FiveStateAsymmetric = 1,
    /// 3-state symbol-to-symbol machine, symmetric defaults.
    ThreeState = 2,
    /// 3-state symbol-to-symbol machine, asymmetric parameters.
    ThreeStateAsymmetric = 3,
    /// 3-state signal machine with an HDP emission prior.
    ThreeStateHdp = 4,
    /// 3-state "vanilla" signal machine (Gaussian-of-current emissions).
    Vanilla = 5,
}

impl ModelType {
    /// Recovers a [`ModelType`] from its stable on-disk integer tag.
    #[must_use]
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::FiveState),
            1 => Some(Self::FiveStateAsymmetric),
            2 => Some(Self::ThreeState),
            3 => Some(Self::ThreeStateAsymmetric),
            4 => Some(Self::ThreeStateHdp),
            5 => Some(Self::Vanilla),
            _ => None,
        }
    }

    /// The stable on-disk integer tag for this variant.
    #[must_use]
    pub const fn tag(self) -> u32 {
        self as u32
    }
}

/// Numerically stable accumulation of log-probabilities:
/// `log(exp(a) + exp(b))`. The external DP driver must use this (rather than
/// naively exponentiating) when combining forward/backward cell values;
/// exposed here because a handful of normalization paths inside this crate
/// need it as well.
#[must_use]
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == LOG_ZERO {
        return b;
    }
    if b == LOG_ZERO {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sum_exp_matches_naive_computation() {
        let a = -2.3_f64;
        let b = -1.1_f64;
        let naive = (a.exp() + b.exp()).ln();
        assert!((log_sum_exp(a, b) - naive).abs() < 1e-9);
    }

    #[test]
    fn log_sum_exp_handles_log_zero() {
        assert!((log_sum_exp(LOG_ZERO, -1.0) - (-1.0)).abs() < 1e-12);
        assert!((log_sum_exp(-1.0, LOG_ZERO) - (-1.0)).abs() < 1e-12);
    }

    #[test]
    fn model_type_tags_round_trip() {
        for tag in 0..=5 {
            let model_type = ModelType::from_tag(tag).unwrap();
            assert_eq!(model_type.tag(), tag);
        }
        assert!(ModelType::from_tag(6).is_none());
    }
}
