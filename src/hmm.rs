//! Training-side HMM expectation containers: per-variant accumulators of
//! transition and emission counts, their normalization/randomization, and
//! the load step that turns accumulated counts into a state machine's
//! log-probabilities.
//!
//! These mirror the state-machine variants one-for-one
//! ([`ContinuousPairHmm`] feeds [`crate::state_machine::FiveState`] and
//! [`crate::state_machine::ThreeState`]; [`VanillaHmm`] feeds
//! [`crate::state_machine::ThreeStateVanilla`]) but are never touched by the
//! DP cell kernel itself — only by the external training driver that calls
//! `add_to_*` once per traceback edge, then `normalize`, then `load_into`.

use crate::emissions::{LOG_UNIFORM_GAP, LOG_UNIFORM_MATCH};
use crate::error::{HmmError, Result};
use crate::kmer::{is_n, num_of_kmers, NUM_SKIP_BINS, SYMBOL_NUMBER};
use crate::state::State;
use crate::state_machine::{apply_em_safeguard, FiveState, ThreeState, ThreeStateVanilla};
use crate::LOG_ZERO;
use enum_dispatch::enum_dispatch;
use float_cmp::approx_eq;
use ndarray::{Array1, Array2};
use rand::Rng;

// emissions.rs doesn't export these two constants publicly; redeclare the
// pseudocount seed value used to cold-start every accumulator (§4.4).
const PSEUDOCOUNT: f64 = 1e-3;

/// Operations shared by every expectation-container variant, dispatched
/// through [`HmmEnum`].
#[enum_dispatch]
pub trait Hmm {
    /// Adds `weight` to the accumulated count for the transition
    /// `from -> to` on the X axis, the Y axis, or the diagonal, as
    /// determined by which states are passed (§4.4).
    fn add_to_transition(&mut self, from: State, to: State, weight: f64);

    /// Adds `weight` to the accumulated count for matching sequence symbol
    /// `x_index` against event/column value `y_index` (discrete variants)
    /// or the given observed current (vanilla variant's own inherent
    /// method covers that case instead).
    fn add_to_match_emission(&mut self, x_index: usize, y_index: usize, weight: f64);

    /// Adds `weight` to the accumulated gap-emission count on the named
    /// axis for symbol `index`.
    fn add_to_gap_emission_x(&mut self, index: usize, weight: f64);

    /// Adds `weight` to the accumulated gap-emission count on the Y axis for
    /// symbol `index`.
    fn add_to_gap_emission_y(&mut self, index: usize, weight: f64);

    /// Normalizes every row of every accumulator so it sums to 1 in linear
    /// space (dividing through by the row's pseudocount-inclusive total).
    fn normalize(&mut self);

    /// Replaces every accumulated count with an independent draw from
    /// `Uniform(0, 1)`, for a randomized cold start (§4.4).
    fn randomize(&mut self, rng: &mut dyn rand::RngCore);

    /// Merges another accumulator of the same variant into this one,
    /// summing counts elementwise. The external trainer uses this to
    /// combine per-thread partial accumulators associatively (§5/§8
    /// invariant 7); panics if `other` isn't the same concrete type,
    /// which would indicate a caller bug, not bad input.
    fn merge_from(&mut self, other: &HmmEnum);
}

/// Expectation container for the symbol-to-symbol variants (5-state and
/// 3-state). The same accumulator shape serves both: the 5-state's extra
/// long-gap transitions are tracked in the four `long_*` fields, which the
/// 3-state loader simply never touches.
#[derive(Clone, Debug)]
pub struct ContinuousPairHmm {
    match_emissions: Array2<f64>,
    gap_x_emissions: Array1<f64>,
    gap_y_emissions: Array1<f64>,

    match_continue: f64,
    match_from_gap_x: f64,
    match_from_gap_y: f64,
    gap_open_x: f64,
    gap_open_y: f64,
    gap_extend_x: f64,
    gap_extend_y: f64,
    gap_switch_to_x: f64,
    gap_switch_to_y: f64,

    long_gap_open_x: f64,
    long_gap_open_y: f64,
    long_gap_extend_x: f64,
    long_gap_extend_y: f64,
    match_from_long_gap_x: f64,
    match_from_long_gap_y: f64,
}

impl ContinuousPairHmm {
    /// Builds a fresh accumulator with every count seeded at
    /// [`PSEUDOCOUNT`], matching the reference implementation's
    /// `continuousPairHmm_construct`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            match_emissions: Array2::from_elem((SYMBOL_NUMBER, SYMBOL_NUMBER), PSEUDOCOUNT),
            gap_x_emissions: Array1::from_elem(SYMBOL_NUMBER, PSEUDOCOUNT),
            gap_y_emissions: Array1::from_elem(SYMBOL_NUMBER, PSEUDOCOUNT),
            match_continue: PSEUDOCOUNT,
            match_from_gap_x: PSEUDOCOUNT,
            match_from_gap_y: PSEUDOCOUNT,
            gap_open_x: PSEUDOCOUNT,
            gap_open_y: PSEUDOCOUNT,
            gap_extend_x: PSEUDOCOUNT,
            gap_extend_y: PSEUDOCOUNT,
            gap_switch_to_x: PSEUDOCOUNT,
            gap_switch_to_y: PSEUDOCOUNT,
            long_gap_open_x: PSEUDOCOUNT,
            long_gap_open_y: PSEUDOCOUNT,
            long_gap_extend_x: PSEUDOCOUNT,
            long_gap_extend_y: PSEUDOCOUNT,
            match_from_long_gap_x: PSEUDOCOUNT,
            match_from_long_gap_y: PSEUDOCOUNT,
        }
    }

    /// Loads this accumulator's counts into a fresh 3-state symbol state
    /// machine. Reproduces the reference implementation's asymmetric
    /// special case exactly (§4.4): `gap_extend_x` is loaded as
    /// `log(1 - P(shortGapX -> match))` rather than its own raw count, and
    /// `gap_switch_to_y` is hardcoded to [`LOG_ZERO`] regardless of what was
    /// accumulated for it.
    #[must_use]
    pub fn load_into_three_state(&self) -> ThreeState {
        // Row totals: each is the sum of everything accumulated as an
        // outgoing edge from that source state, mirroring
        // `continuousPairHmm_normalize`'s per-row normalization before
        // `continuousPairHmm_loadTransitionsAndKmerGapProbs` takes logs.
        let match_row_total = self.match_continue + self.gap_open_x + self.gap_open_y;
        let gap_x_row_total = self.match_from_gap_x + self.gap_extend_x + self.gap_switch_to_y;
        let gap_y_row_total = self.match_from_gap_y + self.gap_extend_y + self.gap_switch_to_x;

        let p_gap_x_to_match = self.match_from_gap_x / gap_x_row_total.max(f64::MIN_POSITIVE);
        let gap_extend_x_log = (1.0 - p_gap_x_to_match).max(f64::MIN_POSITIVE).ln();

        let mut sm = ThreeState::new(
            self.normalized_match_table(),
            self.normalized_gap_x_table(),
            self.normalized_gap_y_table(),
        );
        sm.set_transitions(
            (self.match_continue / match_row_total).ln(),
            (self.match_from_gap_x / gap_x_row_total).ln(),
            (self.match_from_gap_y / gap_y_row_total).ln(),
            (self.gap_open_x / match_row_total).ln(),
            (self.gap_open_y / match_row_total).ln(),
            gap_extend_x_log,
            (self.gap_extend_y / gap_y_row_total).ln(),
            (self.gap_switch_to_x / gap_y_row_total).ln(),
            LOG_ZERO,
        );
        sm
    }

    /// Loads this accumulator's counts into a fresh 5-state machine, then
    /// applies the EM safeguard ([`apply_em_safeguard`]) so the long-gap
    /// extend probability never ends up below the short-gap extend
    /// probability on either axis.
    #[must_use]
    pub fn load_into_five_state(&self) -> FiveState {
        // Row totals grouped by source state (see `load_into_three_state`);
        // the 5-state match row additionally includes the two long-gap-open
        // edges, and the short/long gap rows have no switch edges to fold
        // in (the 5-state topology never produces them).
        let match_row_total = self.match_continue
            + self.gap_open_x
            + self.gap_open_y
            + self.long_gap_open_x
            + self.long_gap_open_y;
        let gap_x_row_total = self.match_from_gap_x + self.gap_extend_x;
        let gap_y_row_total = self.match_from_gap_y + self.gap_extend_y;
        let long_gap_x_row_total = self.match_from_long_gap_x + self.long_gap_extend_x;
        let long_gap_y_row_total = self.match_from_long_gap_y + self.long_gap_extend_y;

        let mut sm = FiveState::new(
            self.normalized_match_table(),
            self.normalized_gap_x_table(),
            self.normalized_gap_y_table(),
        );
        sm.set_match_continue((self.match_continue / match_row_total).ln());
        *sm.gap_open_x_mut().0 = (self.gap_open_x / match_row_total).ln();
        *sm.gap_open_y_mut().0 = (self.gap_open_y / match_row_total).ln();
        *sm.gap_open_x_mut().1 = (self.long_gap_open_x / match_row_total).ln();
        *sm.gap_open_y_mut().1 = (self.long_gap_open_y / match_row_total).ln();
        *sm.gap_extend_x_mut().0 = (self.gap_extend_x / gap_x_row_total).ln();
        *sm.gap_extend_y_mut().0 = (self.gap_extend_y / gap_y_row_total).ln();
        *sm.gap_extend_x_mut().1 = (self.long_gap_extend_x / long_gap_x_row_total).ln();
        *sm.gap_extend_y_mut().1 = (self.long_gap_extend_y / long_gap_y_row_total).ln();
        *sm.match_from_gap_x_mut().0 = (self.match_from_gap_x / gap_x_row_total).ln();
        *sm.match_from_gap_y_mut().0 = (self.match_from_gap_y / gap_y_row_total).ln();
        *sm.match_from_gap_x_mut().1 = (self.match_from_long_gap_x / long_gap_x_row_total).ln();
        *sm.match_from_gap_y_mut().1 = (self.match_from_long_gap_y / long_gap_y_row_total).ln();

        apply_em_safeguard(&mut sm);
        sm
    }

    /// Raw (un-normalized) accumulated count for one named transition edge,
    /// in the reference implementation's flat layout. Used by the
    /// serializer to flatten this accumulator into an on-disk transition
    /// vector without exposing the individual scalar fields.
    #[must_use]
    pub fn raw_transition(&self, from: State, to: State) -> f64 {
        match (from, to) {
            (State::Match, State::Match) => self.match_continue,
            (State::ShortGapX, State::Match) => self.match_from_gap_x,
            (State::ShortGapY, State::Match) => self.match_from_gap_y,
            (State::LongGapX, State::Match) => self.match_from_long_gap_x,
            (State::LongGapY, State::Match) => self.match_from_long_gap_y,
            (State::Match, State::ShortGapX) => self.gap_open_x,
            (State::Match, State::ShortGapY) => self.gap_open_y,
            (State::ShortGapX, State::ShortGapX) => self.gap_extend_x,
            (State::ShortGapY, State::ShortGapY) => self.gap_extend_y,
            (State::ShortGapY, State::ShortGapX) => self.gap_switch_to_x,
            (State::ShortGapX, State::ShortGapY) => self.gap_switch_to_y,
            (State::Match, State::LongGapX) => self.long_gap_open_x,
            (State::Match, State::LongGapY) => self.long_gap_open_y,
            (State::LongGapX, State::LongGapX) => self.long_gap_extend_x,
            (State::LongGapY, State::LongGapY) => self.long_gap_extend_y,
            _ => 0.0,
        }
    }

    /// Raw accumulated gap-emission count on the X axis for `index`, used by
    /// the serializer to flatten this accumulator to the on-disk gap
    /// probability line.
    #[must_use]
    pub fn gap_x_emission_raw(&self, index: usize) -> f64 {
        self.gap_x_emissions[index]
    }

    fn normalized_match_table(&self) -> Array2<f64> {
        let total: f64 = self.match_emissions.sum();
        self.match_emissions.mapv(|v| {
            if v <= 0.0 {
                LOG_UNIFORM_MATCH
            } else {
                (v / total).ln()
            }
        })
    }

    fn normalized_gap_x_table(&self) -> Array1<f64> {
        let total: f64 = self.gap_x_emissions.sum();
        self.gap_x_emissions.mapv(|v| {
            if v <= 0.0 {
                LOG_UNIFORM_GAP
            } else {
                (v / total).ln()
            }
        })
    }

    fn normalized_gap_y_table(&self) -> Array1<f64> {
        let total: f64 = self.gap_y_emissions.sum();
        self.gap_y_emissions.mapv(|v| {
            if v <= 0.0 {
                LOG_UNIFORM_GAP
            } else {
                (v / total).ln()
            }
        })
    }
}

impl Default for ContinuousPairHmm {
    fn default() -> Self {
        Self::new()
    }
}

impl Hmm for ContinuousPairHmm {
    fn add_to_transition(&mut self, from: State, to: State, weight: f64) {
        match (from, to) {
            (State::Match, State::Match) => self.match_continue += weight,
            (State::ShortGapX, State::Match) => self.match_from_gap_x += weight,
            (State::ShortGapY, State::Match) => self.match_from_gap_y += weight,
            (State::LongGapX, State::Match) => self.match_from_long_gap_x += weight,
            (State::LongGapY, State::Match) => self.match_from_long_gap_y += weight,
            (State::Match, State::ShortGapX) => self.gap_open_x += weight,
            (State::Match, State::ShortGapY) => self.gap_open_y += weight,
            (State::ShortGapX, State::ShortGapX) => self.gap_extend_x += weight,
            (State::ShortGapY, State::ShortGapY) => self.gap_extend_y += weight,
            (State::ShortGapY, State::ShortGapX) => self.gap_switch_to_x += weight,
            (State::ShortGapX, State::ShortGapY) => self.gap_switch_to_y += weight,
            (State::Match, State::LongGapX) => self.long_gap_open_x += weight,
            (State::Match, State::LongGapY) => self.long_gap_open_y += weight,
            (State::LongGapX, State::LongGapX) => self.long_gap_extend_x += weight,
            (State::LongGapY, State::LongGapY) => self.long_gap_extend_y += weight,
            _ => {}
        }
    }

    fn add_to_match_emission(&mut self, x_index: usize, y_index: usize, weight: f64) {
        if is_n(x_index) || is_n(y_index) {
            return;
        }
        self.match_emissions[[x_index, y_index]] += weight;
    }

    fn add_to_gap_emission_x(&mut self, index: usize, weight: f64) {
        if is_n(index) {
            return;
        }
        self.gap_x_emissions[index] += weight;
    }

    fn add_to_gap_emission_y(&mut self, index: usize, weight: f64) {
        if is_n(index) {
            return;
        }
        self.gap_y_emissions[index] += weight;
    }

    fn normalize(&mut self) {
        let match_total: f64 = self.match_emissions.sum();
        self.match_emissions.mapv_inplace(|v| v / match_total);
        let gx_total: f64 = self.gap_x_emissions.sum();
        self.gap_x_emissions.mapv_inplace(|v| v / gx_total);
        let gy_total: f64 = self.gap_y_emissions.sum();
        self.gap_y_emissions.mapv_inplace(|v| v / gy_total);

        // Each group below is one source state's row: the set of counts
        // accumulated for edges leaving that state, normalized to sum to 1.
        let match_row_total = self.match_continue
            + self.gap_open_x
            + self.gap_open_y
            + self.long_gap_open_x
            + self.long_gap_open_y;
        self.match_continue /= match_row_total;
        self.gap_open_x /= match_row_total;
        self.gap_open_y /= match_row_total;
        self.long_gap_open_x /= match_row_total;
        self.long_gap_open_y /= match_row_total;

        let gap_x_row_total = self.match_from_gap_x + self.gap_extend_x + self.gap_switch_to_y;
        self.match_from_gap_x /= gap_x_row_total;
        self.gap_extend_x /= gap_x_row_total;
        self.gap_switch_to_y /= gap_x_row_total;

        let gap_y_row_total = self.match_from_gap_y + self.gap_extend_y + self.gap_switch_to_x;
        self.match_from_gap_y /= gap_y_row_total;
        self.gap_extend_y /= gap_y_row_total;
        self.gap_switch_to_x /= gap_y_row_total;

        let long_gap_x_row_total = self.match_from_long_gap_x + self.long_gap_extend_x;
        self.match_from_long_gap_x /= long_gap_x_row_total;
        self.long_gap_extend_x /= long_gap_x_row_total;

        let long_gap_y_row_total = self.match_from_long_gap_y + self.long_gap_extend_y;
        self.match_from_long_gap_y /= long_gap_y_row_total;
        self.long_gap_extend_y /= long_gap_y_row_total;

        debug_assert!(approx_eq!(
            f64,
            self.match_continue + self.gap_open_x + self.gap_open_y + self.long_gap_open_x + self.long_gap_open_y,
            1.0,
            epsilon = 1e-9
        ));
        debug_assert!(approx_eq!(
            f64,
            self.match_from_gap_x + self.gap_extend_x + self.gap_switch_to_y,
            1.0,
            epsilon = 1e-9
        ));
    }

    fn randomize(&mut self, rng: &mut dyn rand::RngCore) {
        for v in self.match_emissions.iter_mut() {
            *v = rng.gen_range(0.0..1.0);
        }
        for v in self.gap_x_emissions.iter_mut() {
            *v = rng.gen_range(0.0..1.0);
        }
        for v in self.gap_y_emissions.iter_mut() {
            *v = rng.gen_range(0.0..1.0);
        }
        for field in [
            &mut self.match_continue,
            &mut self.match_from_gap_x,
            &mut self.match_from_gap_y,
            &mut self.match_from_long_gap_x,
            &mut self.match_from_long_gap_y,
            &mut self.gap_open_x,
            &mut self.gap_open_y,
            &mut self.gap_extend_x,
            &mut self.gap_extend_y,
            &mut self.gap_switch_to_x,
            &mut self.gap_switch_to_y,
            &mut self.long_gap_open_x,
            &mut self.long_gap_open_y,
            &mut self.long_gap_extend_x,
            &mut self.long_gap_extend_y,
        ] {
            *field = rng.gen_range(0.0..1.0);
        }
    }

    fn merge_from(&mut self, other: &HmmEnum) {
        let HmmEnum::ContinuousPairHmm(other) = other else {
            panic!("merge_from called with mismatched Hmm variant");
        };
        self.match_emissions += &other.match_emissions;
        self.gap_x_emissions += &other.gap_x_emissions;
        self.gap_y_emissions += &other.gap_y_emissions;
        self.match_continue += other.match_continue;
        self.match_from_gap_x += other.match_from_gap_x;
        self.match_from_gap_y += other.match_from_gap_y;
        self.gap_open_x += other.gap_open_x;
        self.gap_open_y += other.gap_open_y;
        self.gap_extend_x += other.gap_extend_x;
        self.gap_extend_y += other.gap_extend_y;
        self.gap_switch_to_x += other.gap_switch_to_x;
        self.gap_switch_to_y += other.gap_switch_to_y;
        self.long_gap_open_x += other.long_gap_open_x;
        self.long_gap_open_y += other.long_gap_open_y;
        self.long_gap_extend_x += other.long_gap_extend_x;
        self.long_gap_extend_y += other.long_gap_extend_y;
        self.match_from_long_gap_x += other.match_from_long_gap_x;
        self.match_from_long_gap_y += other.match_from_long_gap_y;
    }
}

/// Expectation container for the vanilla signal variant. Transition counts
/// are tracked per skip bin rather than as flat scalars, since the state
/// machine derives its transition probabilities per-cell from the
/// skip-probability table (§4.3/§4.4).
#[derive(Clone, Debug)]
pub struct VanillaHmm {
    /// 30 skip-open ("alpha") bins, consulted by the state machine.
    alpha_bins: [f64; NUM_SKIP_BINS],
    /// 30 skip-extend ("beta") bins, accumulated but not consulted by the
    /// cell kernel — see the module doc on
    /// [`crate::state_machine::ThreeStateVanilla`].
    beta_bins: [f64; NUM_SKIP_BINS],
    tau_numerator: f64,
    tau_denominator: f64,
    a_ee_numerator: f64,
    a_ee_denominator: f64,
}

impl VanillaHmm {
    /// Builds a fresh accumulator with every bin seeded at [`PSEUDOCOUNT`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            alpha_bins: [PSEUDOCOUNT; NUM_SKIP_BINS],
            beta_bins: [PSEUDOCOUNT; NUM_SKIP_BINS],
            tau_numerator: PSEUDOCOUNT,
            tau_denominator: 2.0 * PSEUDOCOUNT,
            a_ee_numerator: PSEUDOCOUNT,
            a_ee_denominator: 2.0 * PSEUDOCOUNT,
        }
    }

    /// Adds `weight` to the skip-open count for `bin`.
    pub fn add_to_skip_open(&mut self, bin: usize, weight: f64) {
        self.alpha_bins[bin] += weight;
    }

    /// Adds `weight` to the skip-extend count for `bin`.
    pub fn add_to_skip_extend(&mut self, bin: usize, weight: f64) {
        self.beta_bins[bin] += weight;
    }

    /// Adds `weight` to the `match -> shortGapY` (extra-event open) or
    /// `match -> match` count, feeding the `tau` estimate.
    pub fn add_to_extra_event(&mut self, is_extra_event: bool, weight: f64) {
        if is_extra_event {
            self.tau_numerator += weight;
        }
        self.tau_denominator += weight;
    }

    /// Adds `weight` to the `shortGapY -> shortGapY` or `shortGapY -> match`
    /// count, feeding the `a_ee` estimate.
    pub fn add_to_extra_event_extend(&mut self, extended: bool, weight: f64) {
        if extended {
            self.a_ee_numerator += weight;
        }
        self.a_ee_denominator += weight;
    }

    /// Raw (un-normalized) skip-open bins, for the serializer.
    #[must_use]
    pub fn alpha_bins_raw(&self) -> [f64; NUM_SKIP_BINS] {
        self.alpha_bins
    }

    /// Raw (un-normalized) skip-extend bins, for the serializer.
    #[must_use]
    pub fn beta_bins_raw(&self) -> [f64; NUM_SKIP_BINS] {
        self.beta_bins
    }

    /// Loads this accumulator's counts into a fresh vanilla state machine,
    /// re-using `pore_model`/`scaled_model` as given (this container never
    /// trains the pore model itself — see §4.3's Non-goals).
    #[must_use]
    pub fn load_into(
        &self,
        pore_model: crate::pore_model::PoreModel,
        scaled_model: crate::pore_model::PoreModel,
    ) -> ThreeStateVanilla {
        ThreeStateVanilla::new(
            pore_model,
            scaled_model,
            self.alpha_bins,
            self.tau_numerator / self.tau_denominator,
            self.a_ee_numerator / self.a_ee_denominator,
        )
    }
}

impl Default for VanillaHmm {
    fn default() -> Self {
        Self::new()
    }
}

impl Hmm for VanillaHmm {
    fn add_to_transition(&mut self, from: State, to: State, weight: f64) {
        match (from, to) {
            (State::Match, State::ShortGapY) => self.add_to_extra_event(true, weight),
            (State::Match, State::Match) => self.add_to_extra_event(false, weight),
            (State::ShortGapY, State::ShortGapY) => self.add_to_extra_event_extend(true, weight),
            (State::ShortGapY, State::Match) => self.add_to_extra_event_extend(false, weight),
            _ => {}
        }
    }

    fn add_to_match_emission(&mut self, _x_index: usize, _y_index: usize, _weight: f64) {
        // The vanilla variant's match emission is a continuous Gaussian
        // density, not a discrete table; there is nothing to accumulate
        // here (its pore model is trained by an external collaborator).
    }

    fn add_to_gap_emission_x(&mut self, index: usize, weight: f64) {
        self.add_to_skip_open(index, weight);
    }

    fn add_to_gap_emission_y(&mut self, _index: usize, _weight: f64) {
        // No discrete Y-gap emission table for the vanilla variant; the
        // extra-event emission is the bivariate Gaussian, also untrained
        // here.
    }

    fn normalize(&mut self) {
        // Corrected two-group-of-30 behavior: alpha and beta normalize as
        // independent 30-bin distributions, not pooled into one 60-bin
        // distribution (see the Open Question decision in DESIGN.md).
        let alpha_total: f64 = self.alpha_bins.iter().sum();
        for v in &mut self.alpha_bins {
            *v /= alpha_total;
        }
        let beta_total: f64 = self.beta_bins.iter().sum();
        for v in &mut self.beta_bins {
            *v /= beta_total;
        }
    }

    fn randomize(&mut self, rng: &mut dyn rand::RngCore) {
        for v in &mut self.alpha_bins {
            *v = rng.gen_range(0.0..1.0);
        }
        for v in &mut self.beta_bins {
            *v = rng.gen_range(0.0..1.0);
        }
        self.tau_numerator = rng.gen_range(0.0..1.0);
        self.tau_denominator = self.tau_numerator + rng.gen_range(0.0..1.0);
        self.a_ee_numerator = rng.gen_range(0.0..1.0);
        self.a_ee_denominator = self.a_ee_numerator + rng.gen_range(0.0..1.0);
    }

    fn merge_from(&mut self, other: &HmmEnum) {
        let HmmEnum::VanillaHmm(other) = other else {
            panic!("merge_from called with mismatched Hmm variant");
        };
        for i in 0..NUM_SKIP_BINS {
            self.alpha_bins[i] += other.alpha_bins[i];
            self.beta_bins[i] += other.beta_bins[i];
        }
        self.tau_numerator += other.tau_numerator;
        self.tau_denominator += other.tau_denominator;
        self.a_ee_numerator += other.a_ee_numerator;
        self.a_ee_denominator += other.a_ee_denominator;
    }
}

/// HDP (hierarchical Dirichlet process) emission-assignment accumulator.
/// Everything a [`ContinuousPairHmm`] tracks — transitions, per-symbol
/// match/gap emission counts — is tracked here too (§3: "HDP: everything in
/// ContinuousPair, plus..."); this container additionally owns two parallel
/// `(k-mer, event-mean)` assignment lists fed to an external DP mixture fit
/// (§3 Non-goals), gated by a minimum posterior match probability.
#[derive(Clone, Debug)]
pub struct HdpHmm {
    base: ContinuousPairHmm,
    /// Per-k-mer gap-probability counts (`individualKmerGapProbs` in the
    /// reference implementation) — unlike the plain variant's symbol-sized
    /// gap tables, this one is indexed by the full k-mer space, matching
    /// the on-disk `Hdp` format's `symbolSetSize` header field.
    kmer_gap_probs: Array1<f64>,
    /// Minimum posterior match probability at which an assignment is
    /// recorded (reference implementation's `threshold` field,
    /// `continuousHmm.c:40`), not a list-length flush count.
    threshold: f64,
    /// Parallel `(kmer_index, event_mean)` assignments recorded so far.
    assignments: Vec<(usize, f64)>,
}

impl HdpHmm {
    /// Builds a fresh accumulator. `threshold` is the minimum posterior
    /// match probability an assignment's observation must clear to be
    /// recorded by [`Self::add_to_assignment`].
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            base: ContinuousPairHmm::new(),
            kmer_gap_probs: Array1::from_elem(num_of_kmers(), PSEUDOCOUNT),
            threshold,
            assignments: Vec::new(),
        }
    }

    /// Adds `weight` to the per-k-mer gap-probability count for
    /// `kmer_index`.
    ///
    /// # Errors
    ///
    /// Returns [`HmmError::IndexOutOfRange`] if `kmer_index` is out of
    /// range.
    pub fn add_to_kmer_gap(&mut self, kmer_index: usize, weight: f64) -> Result<()> {
        let slot = self
            .kmer_gap_probs
            .get_mut(kmer_index)
            .ok_or(HmmError::IndexOutOfRange {
                what: "hdp kmer index",
                value: kmer_index as i64,
                bound: num_of_kmers() as i64,
            })?;
        *slot += weight;
        Ok(())
    }

    /// Raw (un-normalized) per-k-mer gap-probability count for `kmer_index`,
    /// for the serializer.
    #[must_use]
    pub fn kmer_gap_raw(&self, kmer_index: usize) -> f64 {
        self.kmer_gap_probs[kmer_index]
    }

    /// Appends `(kmer_index, event_mean)` to the assignment lists if
    /// `posterior` meets the configured threshold — §4.4's
    /// `addToAssignment(kmer, event)`, gated the way the driver is expected
    /// to gate its own calls (only invoked when the posterior at that cell
    /// exceeds `threshold`).
    ///
    /// # Errors
    ///
    /// Returns [`HmmError::IndexOutOfRange`] if `kmer_index` is out of
    /// range.
    pub fn add_to_assignment(&mut self, kmer_index: usize, event_mean: f64, posterior: f64) -> Result<()> {
        if kmer_index >= num_of_kmers() {
            return Err(HmmError::IndexOutOfRange {
                what: "hdp kmer index",
                value: kmer_index as i64,
                bound: num_of_kmers() as i64,
            });
        }
        if posterior >= self.threshold {
            self.assignments.push((kmer_index, event_mean));
        }
        Ok(())
    }

    /// Appends a `(kmer_index, event_mean)` pair unconditionally. Used when
    /// reloading assignments from disk, where the posterior gate was
    /// already applied before they were written.
    ///
    /// # Errors
    ///
    /// Returns [`HmmError::IndexOutOfRange`] if `kmer_index` is out of
    /// range.
    pub fn load_assignment(&mut self, kmer_index: usize, event_mean: f64) -> Result<()> {
        if kmer_index >= num_of_kmers() {
            return Err(HmmError::IndexOutOfRange {
                what: "hdp kmer index",
                value: kmer_index as i64,
                bound: num_of_kmers() as i64,
            });
        }
        self.assignments.push((kmer_index, event_mean));
        Ok(())
    }

    /// All recorded `(kmer_index, event_mean)` assignments, in insertion
    /// order, for the serializer.
    #[must_use]
    pub fn assignments(&self) -> &[(usize, f64)] {
        &self.assignments
    }

    /// The configured posterior threshold, for the serializer's on-disk
    /// header field.
    #[must_use]
    pub fn threshold_value(&self) -> f64 {
        self.threshold
    }

    /// Raw accumulated count for one named transition edge, delegating to
    /// the embedded [`ContinuousPairHmm`] (§3).
    #[must_use]
    pub fn raw_transition(&self, from: State, to: State) -> f64 {
        self.base.raw_transition(from, to)
    }

    /// Raw accumulated gap-emission count on the X axis for `index`,
    /// delegating to the embedded [`ContinuousPairHmm`].
    #[must_use]
    pub fn gap_x_emission_raw(&self, index: usize) -> f64 {
        self.base.gap_x_emission_raw(index)
    }
}

impl Hmm for HdpHmm {
    fn add_to_transition(&mut self, from: State, to: State, weight: f64) {
        self.base.add_to_transition(from, to, weight);
    }

    fn add_to_match_emission(&mut self, x_index: usize, y_index: usize, weight: f64) {
        self.base.add_to_match_emission(x_index, y_index, weight);
    }

    fn add_to_gap_emission_x(&mut self, index: usize, weight: f64) {
        self.base.add_to_gap_emission_x(index, weight);
    }

    fn add_to_gap_emission_y(&mut self, index: usize, weight: f64) {
        self.base.add_to_gap_emission_y(index, weight);
    }

    fn normalize(&mut self) {
        self.base.normalize();
        let total: f64 = self.kmer_gap_probs.sum();
        self.kmer_gap_probs.mapv_inplace(|v| v / total);
    }

    fn randomize(&mut self, rng: &mut dyn rand::RngCore) {
        self.base.randomize(rng);
        for v in self.kmer_gap_probs.iter_mut() {
            *v = rng.gen_range(0.0..1.0);
        }
    }

    fn merge_from(&mut self, other: &HmmEnum) {
        let HmmEnum::HdpHmm(other) = other else {
            panic!("merge_from called with mismatched Hmm variant");
        };
        self.base.merge_from(&HmmEnum::ContinuousPairHmm(other.base.clone()));
        self.kmer_gap_probs += &other.kmer_gap_probs;
        self.assignments.extend_from_slice(&other.assignments);
    }
}

/// Closed enumeration of all expectation-container variants, dispatched
/// through [`Hmm`] via `enum_dispatch`.
#[enum_dispatch(Hmm)]
#[derive(Clone, Debug)]
pub enum HmmEnum {
    /// Accumulator for the 5-state and 3-state symbol variants.
    ContinuousPairHmm,
    /// Accumulator for the vanilla signal variant.
    VanillaHmm,
    /// Accumulator for the HDP signal variant.
    HdpHmm,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn normalize_uniform_rows_yield_one_third() {
        // S2: all 9 (3-state) transitions set to 1.0; after normalize each
        // row's three entries equal 1/3, whose log is -1.0986 to 1e-6.
        let mut hmm = ContinuousPairHmm::new();
        hmm.match_continue = 1.0;
        hmm.gap_open_x = 1.0;
        hmm.gap_open_y = 1.0;
        hmm.match_from_gap_x = 1.0;
        hmm.gap_extend_x = 1.0;
        hmm.gap_switch_to_y = 1.0;
        hmm.match_from_gap_y = 1.0;
        hmm.gap_extend_y = 1.0;
        hmm.gap_switch_to_x = 1.0;
        hmm.long_gap_open_x = 0.0;
        hmm.long_gap_open_y = 0.0;
        hmm.match_from_long_gap_x = 0.0;
        hmm.match_from_long_gap_y = 0.0;
        hmm.long_gap_extend_x = 1.0; // isolated row, any nonzero value normalizes to itself / total
        hmm.long_gap_extend_y = 1.0;

        hmm.normalize();

        for v in [
            hmm.match_continue,
            hmm.gap_open_x,
            hmm.gap_open_y,
            hmm.match_from_gap_x,
            hmm.gap_extend_x,
            hmm.gap_switch_to_y,
            hmm.match_from_gap_y,
            hmm.gap_extend_y,
            hmm.gap_switch_to_x,
        ] {
            assert!((v - 1.0 / 3.0).abs() < 1e-9);
            assert!((v.ln() - (-1.0986)).abs() < 1e-4);
        }
    }

    #[test]
    fn load_into_three_state_normalizes_per_source_row() {
        let mut hmm = ContinuousPairHmm::new();
        hmm.match_continue = 3.0;
        hmm.gap_open_x = 1.0;
        hmm.gap_open_y = 1.0;
        hmm.match_from_gap_x = 4.0;
        hmm.gap_extend_x = 1.0;
        hmm.gap_switch_to_y = 0.0;
        hmm.match_from_gap_y = 2.0;
        hmm.gap_extend_y = 2.0;
        hmm.gap_switch_to_x = 1.0;

        let sm = hmm.load_into_three_state();
        let mut current = vec![0.0; 3];
        let middle = vec![0.0; 3];
        let mut match_continue_t = None;
        let mut gap_open_x_t = None;
        sm.cell_calculate(
            &mut current,
            None,
            Some(&middle),
            None,
            &crate::state_machine::XObservation::Symbol(0),
            &crate::state_machine::YObservation::Symbol(0),
            &mut |_, _, from, to, _, t| {
                if from == State::Match && to == State::Match {
                    match_continue_t = Some(t);
                }
                if from == State::ShortGapX && to == State::Match {
                    gap_open_x_t = Some(t);
                }
            },
        );
        // match row total = 3+1+1 = 5, so match_continue = ln(3/5)
        assert!((match_continue_t.unwrap() - (3.0_f64 / 5.0).ln()).abs() < 1e-9);
        // gap_x row total = 4+1+0 = 5, so match_from_gap_x = ln(4/5)
        assert!((gap_open_x_t.unwrap() - (4.0_f64 / 5.0).ln()).abs() < 1e-9);
    }

    #[test]
    fn normalize_rows_sum_to_one() {
        let mut hmm = ContinuousPairHmm::new();
        hmm.add_to_match_emission(0, 1, 5.0);
        hmm.add_to_gap_emission_x(2, 3.0);
        hmm.normalize();
        let sum: f64 = hmm.match_emissions.sum();
        assert!((sum - 1.0).abs() < 1e-9);
        let sum: f64 = hmm.gap_x_emissions.sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn vanilla_normalize_keeps_groups_independent() {
        let mut hmm = VanillaHmm::new();
        hmm.add_to_skip_open(0, 10.0);
        hmm.add_to_skip_extend(5, 1.0);
        hmm.normalize();
        let alpha_sum: f64 = hmm.alpha_bins.iter().sum();
        let beta_sum: f64 = hmm.beta_bins.iter().sum();
        assert!((alpha_sum - 1.0).abs() < 1e-9);
        assert!((beta_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn three_state_load_hardcodes_switch_to_y_to_log_zero() {
        let hmm = ContinuousPairHmm::new();
        let sm = hmm.load_into_three_state();
        let mut current = vec![0.0; 3];
        let upper = vec![0.0; 3];
        let mut weight = None;
        sm.cell_calculate(
            &mut current,
            None,
            None,
            Some(&upper),
            &crate::state_machine::XObservation::Symbol(0),
            &crate::state_machine::YObservation::Symbol(0),
            &mut |_, _, from, to, _, t| {
                if from == State::ShortGapX && to == State::ShortGapY {
                    weight = Some(t);
                }
            },
        );
        assert_eq!(weight, Some(LOG_ZERO));
    }

    #[test]
    fn hdp_assignment_is_gated_on_posterior_threshold() {
        let mut hmm = HdpHmm::new(0.5);
        hmm.add_to_assignment(0, 81.3, 0.2).unwrap();
        assert!(hmm.assignments().is_empty(), "below-threshold posterior must not record");
        hmm.add_to_assignment(0, 81.3, 0.5).unwrap();
        assert_eq!(hmm.assignments(), &[(0, 81.3)], "posterior meeting the threshold must record");
        hmm.add_to_assignment(1, 82.0, 0.9).unwrap();
        assert_eq!(hmm.assignments(), &[(0, 81.3), (1, 82.0)]);
    }

    #[test]
    fn hdp_assignment_rejects_out_of_range_kmer() {
        let mut hmm = HdpHmm::new(0.0);
        let err = hmm.add_to_assignment(num_of_kmers(), 80.0, 1.0).unwrap_err();
        assert!(matches!(err, HmmError::IndexOutOfRange { .. }));
    }

    #[test]
    fn hdp_shares_continuous_pair_accumulators() {
        let mut hmm = HdpHmm::new(0.0);
        hmm.add_to_transition(State::Match, State::Match, 4.0);
        hmm.add_to_gap_emission_x(0, 2.0);
        assert!(hmm.raw_transition(State::Match, State::Match) > 4.0);
        assert!(hmm.gap_x_emission_raw(0) > 2.0);
    }

    #[test]
    fn randomize_produces_values_in_unit_interval() {
        let mut hmm = ContinuousPairHmm::new();
        let mut rng = rand_pcg::Pcg32::seed_from_u64(42);
        hmm.randomize(&mut rng);
        assert!(hmm.match_emissions.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn merge_sums_counts_associatively() {
        let mut a = ContinuousPairHmm::new();
        a.add_to_match_emission(0, 0, 2.0);
        let mut b = ContinuousPairHmm::new();
        b.add_to_match_emission(0, 0, 3.0);
        let b_enum: HmmEnum = b.into();
        a.merge_from(&b_enum);
        // 2 pseudocount-seeded cells (2*PSEUDOCOUNT) plus 2.0 + 3.0 added.
        assert!((a.match_emissions[[0, 0]] - (2.0 * PSEUDOCOUNT + 5.0)).abs() < 1e-9);
    }
}
