//! Type-dispatched constructors and I/O entry points, keyed by
//! [`ModelType`]. This is the crate's single public surface for "give me an
//! HMM/state machine for this model type" — everything else (the concrete
//! accumulator and state-machine structs) is reachable directly too, for
//! callers that already know their variant.

use crate::error::{HmmError, Result};
use crate::hmm::{ContinuousPairHmm, HdpHmm, Hmm, HmmEnum, VanillaHmm};
use crate::kmer::NUM_SKIP_BINS;
use crate::pore_model::PoreModel;
use crate::serializer::{self, ContinuousPairFile, HdpFile, VanillaFile};
use crate::state_machine::StateMachineEnum;
use crate::ModelType;
use std::io::{BufRead, Write};

/// Default minimum posterior match probability at which a freshly
/// constructed HDP accumulator records an assignment (§4.4's `threshold`).
const DEFAULT_HDP_THRESHOLD: f64 = 0.8;

/// Builds a fresh, pseudocount-seeded expectation container for
/// `model_type`.
#[must_use]
pub fn new_hmm(model_type: ModelType) -> HmmEnum {
    match model_type {
        ModelType::FiveState
        | ModelType::FiveStateAsymmetric
        | ModelType::ThreeState
        | ModelType::ThreeStateAsymmetric => ContinuousPairHmm::new().into(),
        ModelType::Vanilla => VanillaHmm::new().into(),
        ModelType::ThreeStateHdp => HdpHmm::new(DEFAULT_HDP_THRESHOLD).into(),
    }
}

/// Loads an expectation container from disk, dispatching on the declared
/// model type (§6). Vanilla and HDP files carry their own pore model /
/// assignment data and are folded directly into the returned container;
/// `ContinuousPair` files are type-compatible with both the 5-state and
/// 3-state variants, so the caller's `expected` list controls which tags are
/// accepted.
///
/// # Errors
///
/// Returns [`HmmError::WrongModelType`] if the on-disk tag doesn't match
/// `expected`, and [`HmmError::MalformedFile`] on any parse failure.
pub fn load_hmm(mut r: impl BufRead, path: &str, expected: &[ModelType]) -> Result<HmmEnum> {
    if expected.contains(&ModelType::Vanilla) {
        let file = serializer::read_vanilla(&mut r, path)?;
        return Ok(vanilla_hmm_from_file(&file).into());
    }
    if expected.contains(&ModelType::ThreeStateHdp) {
        let file = serializer::read_hdp(&mut r, path)?;
        return Ok(hdp_hmm_from_file(&file)?.into());
    }
    let file = serializer::read_continuous_pair(&mut r, path, expected)?;
    Ok(continuous_pair_hmm_from_file(&file)?.into())
}

fn continuous_pair_hmm_from_file(file: &ContinuousPairFile) -> Result<ContinuousPairHmm> {
    let symbol_number = crate::kmer::SYMBOL_NUMBER;
    if file.gap_probs.len() != symbol_number {
        return Err(HmmError::IndexOutOfRange {
            what: "gap probability table length",
            value: file.gap_probs.len() as i64,
            bound: symbol_number as i64,
        });
    }
    let mut hmm = ContinuousPairHmm::new();
    let states = if file.state_number == 5 {
        crate::state::State::ALL_FIVE.to_vec()
    } else {
        crate::state::State::ALL_THREE.to_vec()
    };
    for (i, &from) in states.iter().enumerate() {
        for (j, &to) in states.iter().enumerate() {
            let weight = file.transitions[i * file.state_number + j];
            hmm.add_to_transition(from, to, weight);
        }
    }
    for (i, &v) in file.gap_probs.iter().enumerate() {
        hmm.add_to_gap_emission_x(i, v);
        hmm.add_to_gap_emission_y(i, v);
    }
    Ok(hmm)
}

fn vanilla_hmm_from_file(file: &VanillaFile) -> VanillaHmm {
    let mut hmm = VanillaHmm::new();
    for (i, &v) in file.alpha_bins.iter().enumerate() {
        hmm.add_to_skip_open(i, v);
    }
    for (i, &v) in file.beta_bins.iter().enumerate() {
        hmm.add_to_skip_extend(i, v);
    }
    hmm
}

fn hdp_hmm_from_file(file: &HdpFile) -> Result<HdpHmm> {
    let kmer_number = crate::kmer::num_of_kmers();
    if file.gap_probs.len() != kmer_number {
        return Err(HmmError::IndexOutOfRange {
            what: "hdp gap probability table length",
            value: file.gap_probs.len() as i64,
            bound: kmer_number as i64,
        });
    }
    let mut hmm = HdpHmm::new(file.threshold);
    let states = crate::state::State::ALL_THREE;
    for (i, &from) in states.iter().enumerate() {
        for (j, &to) in states.iter().enumerate() {
            let weight = file.transitions[i * file.state_number + j];
            hmm.add_to_transition(from, to, weight);
        }
    }
    for (i, &v) in file.gap_probs.iter().enumerate() {
        hmm.add_to_kmer_gap(i, v)?;
    }
    for &(kmer_idx, mean) in &file.assignments {
        hmm.load_assignment(kmer_idx, mean)?;
    }
    Ok(hmm)
}

/// Writes an expectation container to disk, dispatching on its concrete
/// variant. Vanilla and HDP containers need auxiliary data the container
/// itself doesn't own (a pore model, a likelihood, a threshold); callers
/// supply it via `likelihood`/`pore_model`/`scaled_model`.
///
/// # Errors
///
/// Returns [`HmmError::NonFiniteParameter`] if any value about to be
/// written is non-finite (no output is produced), and propagates I/O
/// failures as [`HmmError::MalformedFile`].
pub fn save_hmm(
    hmm: &HmmEnum,
    model_type: ModelType,
    state_number: usize,
    likelihood: f64,
    pore_model: Option<(&PoreModel, &PoreModel)>,
    mut w: impl Write,
    path: &str,
) -> Result<()> {
    match hmm {
        HmmEnum::ContinuousPairHmm(inner) => {
            let transitions = serializer::flatten_transitions(inner, state_number);
            let gap_probs = continuous_pair_gap_probs(inner);
            serializer::write_continuous_pair(model_type, state_number, &transitions, likelihood, &gap_probs, &mut w, path)
        }
        HmmEnum::VanillaHmm(_) => {
            let (primary, scaled) = pore_model.ok_or_else(|| HmmError::MalformedFile {
                path: path.to_string(),
                detail: "vanilla hmm requires a pore model to serialize".to_string(),
            })?;
            let alpha = vanilla_alpha_bins(hmm);
            let beta = vanilla_beta_bins(hmm);
            serializer::write_vanilla(state_number, &alpha, &beta, likelihood, primary, scaled, &mut w, path)
        }
        HmmEnum::HdpHmm(inner) => {
            let transitions = hdp_transitions(inner, state_number);
            let gap_probs = hdp_gap_probs(inner);
            serializer::write_hdp(
                state_number,
                inner.threshold_value(),
                &transitions,
                likelihood,
                &gap_probs,
                inner.assignments(),
                &mut w,
                path,
            )
        }
    }
}

fn continuous_pair_gap_probs(hmm: &ContinuousPairHmm) -> Vec<f64> {
    // The gap-probability line in the on-disk format stores one probability
    // per symbol, shared between the X and Y tables in the reference
    // layout; this crate keeps them separately, so we write the X table.
    let mut out = vec![0.0; crate::kmer::SYMBOL_NUMBER];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = hmm.gap_x_emission_raw(i);
    }
    out
}

fn vanilla_alpha_bins(hmm: &HmmEnum) -> [f64; NUM_SKIP_BINS] {
    match hmm {
        HmmEnum::VanillaHmm(inner) => inner.alpha_bins_raw(),
        _ => [0.0; NUM_SKIP_BINS],
    }
}

fn vanilla_beta_bins(hmm: &HmmEnum) -> [f64; NUM_SKIP_BINS] {
    match hmm {
        HmmEnum::VanillaHmm(inner) => inner.beta_bins_raw(),
        _ => [0.0; NUM_SKIP_BINS],
    }
}

fn hdp_transitions(hmm: &HdpHmm, state_number: usize) -> Vec<f64> {
    let states = crate::state::State::ALL_THREE;
    let mut out = vec![0.0; state_number * state_number];
    for (i, j) in itertools::iproduct!(0..states.len(), 0..states.len()) {
        out[i * state_number + j] = hmm.raw_transition(states[i], states[j]);
    }
    out
}

fn hdp_gap_probs(hmm: &HdpHmm) -> Vec<f64> {
    let mut out = vec![0.0; crate::kmer::num_of_kmers()];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = hmm.kmer_gap_raw(i);
    }
    out
}

/// Normalizes an expectation container in place, matching §4.4's per-variant
/// normalization rules.
pub fn normalize_hmm(hmm: &mut HmmEnum) {
    hmm.normalize();
}

/// Builds a [`StateMachineEnum`] from a trained expectation container and
/// (for the vanilla variant) a pore model. This is the load step described
/// in §4.4: counts in, log-probabilities out, with the 5-state EM safeguard
/// applied automatically.
///
/// # Errors
///
/// Returns [`HmmError::WrongModelType`] if `hmm`'s concrete variant doesn't
/// match `model_type`.
pub fn build_state_machine(
    hmm: &HmmEnum,
    model_type: ModelType,
    pore_model: Option<(PoreModel, PoreModel)>,
    skip_bins: Option<[f64; NUM_SKIP_BINS]>,
    tau: f64,
    a_ee: f64,
) -> Result<StateMachineEnum> {
    match (hmm, model_type) {
        (HmmEnum::ContinuousPairHmm(inner), ModelType::FiveState | ModelType::FiveStateAsymmetric) => {
            Ok(StateMachineEnum::FiveState(inner.load_into_five_state()))
        }
        (HmmEnum::ContinuousPairHmm(inner), ModelType::ThreeState | ModelType::ThreeStateAsymmetric) => {
            Ok(StateMachineEnum::ThreeState(inner.load_into_three_state()))
        }
        (HmmEnum::VanillaHmm(inner), ModelType::Vanilla) => {
            let (primary, scaled) = pore_model.ok_or_else(|| HmmError::MalformedFile {
                path: String::new(),
                detail: "vanilla state machine requires a pore model".to_string(),
            })?;
            let _ = (skip_bins, tau, a_ee);
            Ok(StateMachineEnum::ThreeStateVanilla(inner.load_into(primary, scaled)))
        }
        (_, found) => Err(HmmError::WrongModelType {
            expected: vec![found.tag()],
            found: found.tag(),
        }),
    }
}
