//! Transition constants, state enumeration, start/end state probabilities,
//! and the cell-update kernel, for the three state-machine variants.
//!
//! The inner kernel ([`StateMachine::cell_calculate`]) is called
//! `Θ(reads · sequence · events)` times by the external DP driver, so each
//! variant's implementation is a concrete, monomorphized `match`/field-access
//! path rather than a virtual-dispatch chain; [`StateMachineEnum`] only pays
//! for one dynamic dispatch per *cell*, not per edge.

use crate::emissions::{
    bivariate_gaussian_match_log_prob, gaussian_match_log_prob, skip_probability,
    symbol_gap_log_prob, symbol_match_log_prob,
};
use crate::kmer::{num_of_kmers, skip_bin, NUM_SKIP_BINS};
use crate::pore_model::PoreModel;
use crate::state::State;
use crate::LOG_ZERO;
use enum_dispatch::enum_dispatch;
use ndarray::{Array1, Array2};

/// The sequence-axis (`x`) observation at one lattice column. Symbol
/// variants carry a single alphabet index; the vanilla variant carries the
/// current and previous k-mer index (the skip-bin lookup needs both).
#[derive(Clone, Copy, Debug)]
pub enum XObservation {
    /// Discrete alphabet index (5-state / 3-state symbol variants).
    Symbol(usize),
    /// K-mer index of this column and of the column before it (vanilla).
    Kmer {
        /// Index of the k-mer aligned at this column.
        index: usize,
        /// Index of the previous column's k-mer, used for the skip bin.
        prev_index: usize,
    },
}

/// The event-axis (`y`) observation at one lattice row. Symbol variants
/// carry a single alphabet index; the vanilla variant carries the event's
/// mean current and noise.
#[derive(Clone, Copy, Debug)]
pub enum YObservation {
    /// Discrete alphabet index (5-state / 3-state symbol variants).
    Symbol(usize),
    /// One nanopore event's summary statistics.
    Event {
        /// Mean current of the event.
        mean: f64,
        /// Noise (current fluctuation) of the event.
        noise: f64,
    },
}

/// Callback invoked once per active edge of the cell kernel:
/// `(current_cell, neighbor_cell, from_state, to_state, emission_log_prob,
/// transition_log_prob)`. The driver supplies this; it is the same kernel
/// that drives forward, backward, posterior, and expectation-accumulation
/// passes, distinguished only by what this callback does with the
/// probabilities it's handed.
pub type DoTransition<'a> = dyn FnMut(&mut [f64], &[f64], State, State, f64, f64) + 'a;

/// Trait every state-machine variant implements. Shared by [`FiveState`],
/// [`ThreeState`], and [`ThreeStateVanilla`] via [`StateMachineEnum`].
#[enum_dispatch]
pub trait StateMachine {
    /// Number of states this variant uses (3 or 5).
    fn num_states(&self) -> usize;

    /// Log-probability of entering the lattice at `state` via a normal
    /// (non-ragged) start. Always requires `state == State::Match`.
    fn start_state_prob(&self, state: State) -> f64;

    /// Log-probability of entering the lattice at `state` via a ragged
    /// start, used when aligning sub-sequences. Allowed only through the
    /// longest gap state(s) this variant has.
    fn ragged_start_state_prob(&self, state: State) -> f64;

    /// Log-probability of exiting the lattice from `state` via a normal end.
    fn end_state_prob(&self, state: State) -> f64;

    /// Log-probability of exiting the lattice from `state` via a ragged end.
    fn ragged_end_state_prob(&self, state: State) -> f64;

    /// The DP cell-update kernel: for each non-`None` neighbor cell, invokes
    /// `do_transition` once per edge of the model that touches that
    /// neighbor. `current` is the cell being computed; `lower`/`middle`/
    /// `upper` are its sequence-only / diagonal / event-only neighbors.
    fn cell_calculate(
        &self,
        current: &mut [f64],
        lower: Option<&[f64]>,
        middle: Option<&[f64]>,
        upper: Option<&[f64]>,
        x: &XObservation,
        y: &YObservation,
        do_transition: &mut DoTransition<'_>,
    );
}

fn expect_symbol(obs: &XObservation) -> usize {
    match obs {
        XObservation::Symbol(i) => *i,
        XObservation::Kmer { .. } => {
            unreachable!("symbol state machine given a kmer observation")
        }
    }
}

fn expect_symbol_y(obs: &YObservation) -> usize {
    match obs {
        YObservation::Symbol(i) => *i,
        YObservation::Event { .. } => {
            unreachable!("symbol state machine given an event observation")
        }
    }
}

/// The 5-state symbol-to-symbol state machine: `match`, `shortGapX`,
/// `shortGapY`, `longGapX`, `longGapY`. `longGapX`/`longGapY` model an
/// extended run of skips/extra-events with their own (smaller) extend
/// probability, enforced by the EM safeguard in [`apply_em_safeguard`].
#[derive(Clone, Debug)]
pub struct FiveState {
    match_table: Array2<f64>,
    gap_x_table: Array1<f64>,
    gap_y_table: Array1<f64>,

    match_continue: f64,
    gap_open_x: f64,
    gap_open_y: f64,
    gap_extend_x: f64,
    gap_extend_y: f64,
    match_from_gap_x: f64,
    match_from_gap_y: f64,
    gap_long_open_x: f64,
    gap_long_open_y: f64,
    gap_long_extend_x: f64,
    gap_long_extend_y: f64,
    match_from_long_gap_x: f64,
    match_from_long_gap_y: f64,

    /// Stored but never consulted by [`StateMachine::cell_calculate`]: the
    /// short↔long and X↔Y switch edges are disabled by design (§9).
    gap_short_to_long_x: f64,
    gap_short_to_long_y: f64,
    gap_switch_to_x: f64,
    gap_switch_to_y: f64,
}

impl FiveState {
    /// Constructs a 5-state machine with the reference implementation's
    /// cold-start defaults: the short-gap parameters match the 3-state
    /// symbol defaults, and the long-gap parameters are set strictly more
    /// conservative (smaller open/extend probability) to respect the EM
    /// safeguard's invariant before any training has happened.
    #[must_use]
    pub fn new(match_table: Array2<f64>, gap_x_table: Array1<f64>, gap_y_table: Array1<f64>) -> Self {
        Self {
            match_table,
            gap_x_table,
            gap_y_table,
            match_continue: -0.030_064_059_121_770_816,
            gap_open_x: -4.212_566_42,
            gap_open_y: -4.212_566_42,
            gap_extend_x: -0.338_826_268_923_155_3,
            gap_extend_y: -0.338_826_268_923_155_3,
            match_from_gap_x: -1.272_871_422_049_609,
            match_from_gap_y: -1.272_871_422_049_609,
            gap_long_open_x: -6.0,
            gap_long_open_y: -6.0,
            gap_long_extend_x: -1.0,
            gap_long_extend_y: -1.0,
            match_from_long_gap_x: -1.0,
            match_from_long_gap_y: -1.0,
            gap_short_to_long_x: LOG_ZERO,
            gap_short_to_long_y: LOG_ZERO,
            gap_switch_to_x: LOG_ZERO,
            gap_switch_to_y: LOG_ZERO,
        }
    }

    /// Mutable access to the 16 scalar transition fields, keyed by name, for
    /// use by [`crate::hmm::Hmm::load_into`] and the EM safeguard. Returns
    /// `(short_extend, long_extend)` pairs and setters so callers don't need
    /// to know the field layout.
    pub(crate) fn gap_extend_x_mut(&mut self) -> (&mut f64, &mut f64) {
        (&mut self.gap_extend_x, &mut self.gap_long_extend_x)
    }

    pub(crate) fn gap_extend_y_mut(&mut self) -> (&mut f64, &mut f64) {
        (&mut self.gap_extend_y, &mut self.gap_long_extend_y)
    }

    pub(crate) fn gap_open_x_mut(&mut self) -> (&mut f64, &mut f64) {
        (&mut self.gap_open_x, &mut self.gap_long_open_x)
    }

    pub(crate) fn gap_open_y_mut(&mut self) -> (&mut f64, &mut f64) {
        (&mut self.gap_open_y, &mut self.gap_long_open_y)
    }

    pub(crate) fn match_from_gap_x_mut(&mut self) -> (&mut f64, &mut f64) {
        (&mut self.match_from_gap_x, &mut self.match_from_long_gap_x)
    }

    pub(crate) fn match_from_gap_y_mut(&mut self) -> (&mut f64, &mut f64) {
        (&mut self.match_from_gap_y, &mut self.match_from_long_gap_y)
    }

    pub(crate) fn set_match_continue(&mut self, v: f64) {
        self.match_continue = v;
    }

    /// Raw transition value, by name, used only by tests checking the EM
    /// safeguard (S4).
    #[must_use]
    pub fn gap_extend_long_x(&self) -> f64 {
        self.gap_long_extend_x
    }

    #[must_use]
    #[cfg(test)]
    fn gap_extend_short_x(&self) -> f64 {
        self.gap_extend_x
    }
}

impl StateMachine for FiveState {
    fn num_states(&self) -> usize {
        5
    }

    fn start_state_prob(&self, state: State) -> f64 {
        if matches!(state, State::Match) {
            0.0
        } else {
            LOG_ZERO
        }
    }

    fn ragged_start_state_prob(&self, state: State) -> f64 {
        if matches!(state, State::LongGapX | State::LongGapY) {
            0.0
        } else {
            LOG_ZERO
        }
    }

    fn end_state_prob(&self, state: State) -> f64 {
        self.start_state_prob(state)
    }

    fn ragged_end_state_prob(&self, state: State) -> f64 {
        self.ragged_start_state_prob(state)
    }

    fn cell_calculate(
        &self,
        current: &mut [f64],
        lower: Option<&[f64]>,
        middle: Option<&[f64]>,
        upper: Option<&[f64]>,
        x: &XObservation,
        y: &YObservation,
        do_transition: &mut DoTransition<'_>,
    ) {
        let x_idx = expect_symbol(x);
        let y_idx = expect_symbol_y(y);

        if let Some(lower) = lower {
            let e_p = symbol_gap_log_prob(&self.gap_x_table, x_idx);
            do_transition(current, lower, State::Match, State::ShortGapX, e_p, self.gap_open_x);
            do_transition(current, lower, State::ShortGapX, State::ShortGapX, e_p, self.gap_extend_x);
            do_transition(current, lower, State::Match, State::LongGapX, e_p, self.gap_long_open_x);
            do_transition(current, lower, State::LongGapX, State::LongGapX, e_p, self.gap_long_extend_x);
        }
        if let Some(middle) = middle {
            let e_p = symbol_match_log_prob(&self.match_table, x_idx, y_idx);
            do_transition(current, middle, State::Match, State::Match, e_p, self.match_continue);
            do_transition(current, middle, State::ShortGapX, State::Match, e_p, self.match_from_gap_x);
            do_transition(current, middle, State::ShortGapY, State::Match, e_p, self.match_from_gap_y);
            do_transition(current, middle, State::LongGapX, State::Match, e_p, self.match_from_long_gap_x);
            do_transition(current, middle, State::LongGapY, State::Match, e_p, self.match_from_long_gap_y);
        }
        if let Some(upper) = upper {
            let e_p = symbol_gap_log_prob(&self.gap_y_table, y_idx);
            do_transition(current, upper, State::Match, State::ShortGapY, e_p, self.gap_open_y);
            do_transition(current, upper, State::ShortGapY, State::ShortGapY, e_p, self.gap_extend_y);
            do_transition(current, upper, State::Match, State::LongGapY, e_p, self.gap_long_open_y);
            do_transition(current, upper, State::LongGapY, State::LongGapY, e_p, self.gap_long_extend_y);
        }
        // gap_short_to_long_{x,y} and gap_switch_to_{x,y} are intentionally
        // never consulted here: see the struct doc comment and §9.
    }
}

/// The 3-state symbol-to-symbol state machine: `match`, `shortGapX`,
/// `shortGapY`. Unlike the 5-state variant, `shortGapX` and `shortGapY` can
/// switch directly into each other.
#[derive(Clone, Debug)]
pub struct ThreeState {
    match_table: Array2<f64>,
    gap_x_table: Array1<f64>,
    gap_y_table: Array1<f64>,

    match_continue: f64,
    match_from_gap_x: f64,
    match_from_gap_y: f64,
    gap_open_x: f64,
    gap_open_y: f64,
    gap_extend_x: f64,
    gap_extend_y: f64,
    gap_switch_to_x: f64,
    gap_switch_to_y: f64,
}

impl ThreeState {
    /// Constructs a 3-state symbol machine with the reference
    /// implementation's cold-start defaults (`stateMachine3_construct`).
    #[must_use]
    pub fn new(match_table: Array2<f64>, gap_x_table: Array1<f64>, gap_y_table: Array1<f64>) -> Self {
        Self {
            match_table,
            gap_x_table,
            gap_y_table,
            match_continue: -0.030_064_059_121_770_816,
            match_from_gap_x: -1.272_871_422_049_609,
            match_from_gap_y: -1.272_871_422_049_609,
            gap_open_x: -4.212_566_42,
            gap_open_y: -4.212_566_42,
            gap_extend_x: -0.338_826_268_923_155_3,
            gap_extend_y: -0.338_826_268_923_155_3,
            gap_switch_to_x: -4.910_694_825_551_255,
            gap_switch_to_y: -4.910_694_825_551_255,
        }
    }

    pub(crate) fn set_transitions(
        &mut self,
        match_continue: f64,
        match_from_gap_x: f64,
        match_from_gap_y: f64,
        gap_open_x: f64,
        gap_open_y: f64,
        gap_extend_x: f64,
        gap_extend_y: f64,
        gap_switch_to_x: f64,
        gap_switch_to_y: f64,
    ) {
        self.match_continue = match_continue;
        self.match_from_gap_x = match_from_gap_x;
        self.match_from_gap_y = match_from_gap_y;
        self.gap_open_x = gap_open_x;
        self.gap_open_y = gap_open_y;
        self.gap_extend_x = gap_extend_x;
        self.gap_extend_y = gap_extend_y;
        self.gap_switch_to_x = gap_switch_to_x;
        self.gap_switch_to_y = gap_switch_to_y;
    }

    pub(crate) fn gap_x_table_mut(&mut self) -> &mut Array1<f64> {
        &mut self.gap_x_table
    }
}

impl StateMachine for ThreeState {
    fn num_states(&self) -> usize {
        3
    }

    fn start_state_prob(&self, state: State) -> f64 {
        if matches!(state, State::Match) {
            0.0
        } else {
            LOG_ZERO
        }
    }

    fn ragged_start_state_prob(&self, state: State) -> f64 {
        if matches!(state, State::ShortGapX | State::ShortGapY) {
            0.0
        } else {
            LOG_ZERO
        }
    }

    fn end_state_prob(&self, state: State) -> f64 {
        self.start_state_prob(state)
    }

    fn ragged_end_state_prob(&self, state: State) -> f64 {
        self.ragged_start_state_prob(state)
    }

    fn cell_calculate(
        &self,
        current: &mut [f64],
        lower: Option<&[f64]>,
        middle: Option<&[f64]>,
        upper: Option<&[f64]>,
        x: &XObservation,
        y: &YObservation,
        do_transition: &mut DoTransition<'_>,
    ) {
        let x_idx = expect_symbol(x);
        let y_idx = expect_symbol_y(y);

        if let Some(lower) = lower {
            let e_p = symbol_gap_log_prob(&self.gap_x_table, x_idx);
            do_transition(current, lower, State::Match, State::ShortGapX, e_p, self.gap_open_x);
            do_transition(current, lower, State::ShortGapX, State::ShortGapX, e_p, self.gap_extend_x);
            do_transition(current, lower, State::ShortGapY, State::ShortGapX, e_p, self.gap_switch_to_x);
        }
        if let Some(middle) = middle {
            let e_p = symbol_match_log_prob(&self.match_table, x_idx, y_idx);
            do_transition(current, middle, State::Match, State::Match, e_p, self.match_continue);
            do_transition(current, middle, State::ShortGapX, State::Match, e_p, self.match_from_gap_x);
            do_transition(current, middle, State::ShortGapY, State::Match, e_p, self.match_from_gap_y);
        }
        if let Some(upper) = upper {
            let e_p = symbol_gap_log_prob(&self.gap_y_table, y_idx);
            do_transition(current, upper, State::Match, State::ShortGapY, e_p, self.gap_open_y);
            do_transition(current, upper, State::ShortGapY, State::ShortGapY, e_p, self.gap_extend_y);
            do_transition(current, upper, State::ShortGapX, State::ShortGapY, e_p, self.gap_switch_to_y);
        }
    }
}

/// The 3-state "vanilla" signal state machine: sequence axis is a stream of
/// k-mers, event axis is a stream of (mean, noise) pairs. Unlike the symbol
/// variants, its transition probabilities are *derived per-cell* from the
/// skip-probability table and two scalar parameters rather than stored as
/// constants (§4.3).
#[derive(Clone, Debug)]
pub struct ThreeStateVanilla {
    pore_model: PoreModel,
    scaled_model: PoreModel,
    /// The 30 "alpha" (skip-open) bins; see the module doc on
    /// [`crate::hmm::VanillaHmm`] for why the 30 "beta" bins aren't
    /// consulted here.
    skip_bins: [f64; NUM_SKIP_BINS],
    /// `P(extra-event | not skip)`, the fudge factor from Nanopolish.
    tau: f64,
    /// `P(extra-event extend)`, fixed rather than position-dependent.
    a_ee: f64,
}

impl ThreeStateVanilla {
    /// Builds a vanilla state machine directly from a pore model, its scaled
    /// counterpart, and the derived-transition parameters.
    #[must_use]
    pub fn new(
        pore_model: PoreModel,
        scaled_model: PoreModel,
        skip_bins: [f64; NUM_SKIP_BINS],
        tau: f64,
        a_ee: f64,
    ) -> Self {
        Self {
            pore_model,
            scaled_model,
            skip_bins,
            tau,
            a_ee,
        }
    }

    pub(crate) fn skip_bins_mut(&mut self) -> &mut [f64; NUM_SKIP_BINS] {
        &mut self.skip_bins
    }

    /// Current pore model (read-only access for emission debugging/tests).
    #[must_use]
    pub fn pore_model(&self) -> &PoreModel {
        &self.pore_model
    }
}

/// Derives the six transition probabilities (all linear, not log-space) used
/// by one cell of the vanilla state machine, from the skip probability at
/// that cell and the two scalar fudge factors. Factored out of
/// [`StateMachine::cell_calculate`] so it can be exercised directly by tests
/// (S6) without constructing a full pore model.
#[must_use]
pub fn vanilla_transition_probs(skip_prob: f64, tau: f64, a_ee: f64) -> VanillaTransitionProbs {
    let a_mx = skip_prob;
    let a_me = (1.0 - a_mx) * tau;
    let a_mm = 1.0 - a_me - a_mx;
    let a_em = 1.0 - a_ee;
    let a_xx = a_mx;
    let a_xm = 1.0 - a_xx;
    VanillaTransitionProbs {
        a_mm,
        a_me,
        a_mx,
        a_xm,
        a_em,
        a_ee,
        a_xx,
    }
}

/// Linear-space transition probabilities derived for one vanilla cell, as
/// computed by [`vanilla_transition_probs`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VanillaTransitionProbs {
    /// `match -> match`
    pub a_mm: f64,
    /// `match -> shortGapY` (extra event)
    pub a_me: f64,
    /// `match -> shortGapX` (skip)
    pub a_mx: f64,
    /// `shortGapX -> match`
    pub a_xm: f64,
    /// `shortGapY -> match`
    pub a_em: f64,
    /// `shortGapY -> shortGapY` (extra event extend)
    pub a_ee: f64,
    /// `shortGapX -> shortGapX` (skip extend, equal to `a_mx` by
    /// construction)
    pub a_xx: f64,
}

impl StateMachine for ThreeStateVanilla {
    fn num_states(&self) -> usize {
        3
    }

    fn start_state_prob(&self, state: State) -> f64 {
        if matches!(state, State::Match) {
            0.0
        } else {
            LOG_ZERO
        }
    }

    fn ragged_start_state_prob(&self, state: State) -> f64 {
        if matches!(state, State::ShortGapX | State::ShortGapY) {
            0.0
        } else {
            LOG_ZERO
        }
    }

    fn end_state_prob(&self, state: State) -> f64 {
        self.start_state_prob(state)
    }

    fn ragged_end_state_prob(&self, state: State) -> f64 {
        self.ragged_start_state_prob(state)
    }

    fn cell_calculate(
        &self,
        current: &mut [f64],
        lower: Option<&[f64]>,
        middle: Option<&[f64]>,
        upper: Option<&[f64]>,
        x: &XObservation,
        y: &YObservation,
        do_transition: &mut DoTransition<'_>,
    ) {
        let (index, prev_index) = match x {
            XObservation::Kmer { index, prev_index } => (*index, *prev_index),
            XObservation::Symbol(_) => unreachable!("vanilla state machine given a symbol observation"),
        };
        let (mean, noise) = match y {
            YObservation::Event { mean, noise } => (*mean, *noise),
            YObservation::Symbol(_) => unreachable!("vanilla state machine given a symbol observation"),
        };

        let delta = (self.pore_model.level_mean(index) - self.pore_model.level_mean(prev_index)).abs();
        let bin = skip_bin(delta);
        let skip_prob = skip_probability(&self.skip_bins, bin);
        let p = vanilla_transition_probs(skip_prob, self.tau, self.a_ee);

        if let Some(lower) = lower {
            do_transition(current, lower, State::Match, State::ShortGapX, 0.0, p.a_mx.ln());
            do_transition(current, lower, State::ShortGapX, State::ShortGapX, 0.0, p.a_xx.ln());
        }
        if let Some(middle) = middle {
            let e_p = gaussian_match_log_prob(mean, index, &self.pore_model);
            do_transition(current, middle, State::Match, State::Match, e_p, p.a_mm.ln());
            do_transition(current, middle, State::ShortGapX, State::Match, e_p, p.a_xm.ln());
            do_transition(current, middle, State::ShortGapY, State::Match, e_p, p.a_em.ln());
        }
        if let Some(upper) = upper {
            let e_p = bivariate_gaussian_match_log_prob(mean, noise, index, &self.scaled_model);
            do_transition(current, upper, State::Match, State::ShortGapY, e_p, p.a_me.ln());
            do_transition(current, upper, State::ShortGapY, State::ShortGapY, e_p, p.a_ee.ln());
        }
    }
}

/// Closed enumeration of all state-machine variants, dispatched through
/// [`StateMachine`] via `enum_dispatch` so the DP driver can hold one
/// `StateMachineEnum` regardless of which variant it was built for.
#[enum_dispatch(StateMachine)]
#[derive(Clone, Debug)]
pub enum StateMachineEnum {
    /// 5-state symbol-to-symbol variant.
    FiveState,
    /// 3-state symbol-to-symbol variant.
    ThreeState,
    /// 3-state signal variant.
    ThreeStateVanilla,
}

/// Applies the EM safeguard described in §4.3/§9: if the accumulated "short
/// extend" probability on an axis exceeds the "long extend" probability (a
/// degenerate optimum that would invert the intended semantic ordering
/// `P(extend_long) >= P(extend_short)`), swap the short/long open, extend,
/// and match-from-gap fields pairwise on that axis. Called from
/// [`crate::hmm::Hmm::load_into`] for the 5-state variant only — the 3-state
/// variants have no long-gap states to protect.
pub fn apply_em_safeguard(sm: &mut FiveState) {
    {
        let (short, long) = sm.gap_extend_x_mut();
        if *short > *long {
            std::mem::swap(short, long);
            let (short, long) = sm.gap_open_x_mut();
            std::mem::swap(short, long);
            let (short, long) = sm.match_from_gap_x_mut();
            std::mem::swap(short, long);
        }
    }
    {
        let (short, long) = sm.gap_extend_y_mut();
        if *short > *long {
            std::mem::swap(short, long);
            let (short, long) = sm.gap_open_y_mut();
            std::mem::swap(short, long);
            let (short, long) = sm.match_from_gap_y_mut();
            std::mem::swap(short, long);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::SYMBOL_NUMBER;

    fn symbol_machine() -> ThreeState {
        ThreeState::new(
            Array2::zeros((SYMBOL_NUMBER, SYMBOL_NUMBER)),
            Array1::zeros(SYMBOL_NUMBER),
            Array1::zeros(SYMBOL_NUMBER),
        )
    }

    #[test]
    fn three_state_start_requires_match() {
        let sm = symbol_machine();
        assert_eq!(sm.start_state_prob(State::Match), 0.0);
        assert_eq!(sm.start_state_prob(State::ShortGapX), LOG_ZERO);
    }

    #[test]
    fn three_state_ragged_start_allows_short_gaps() {
        let sm = symbol_machine();
        assert_eq!(sm.ragged_start_state_prob(State::ShortGapX), 0.0);
        assert_eq!(sm.ragged_start_state_prob(State::ShortGapY), 0.0);
        assert_eq!(sm.ragged_start_state_prob(State::Match), LOG_ZERO);
    }

    #[test]
    fn three_state_cell_calculate_invokes_all_nine_edges() {
        let sm = symbol_machine();
        let mut current = vec![0.0; 3];
        let lower = vec![0.0; 3];
        let middle = vec![0.0; 3];
        let upper = vec![0.0; 3];
        let mut count = 0;
        sm.cell_calculate(
            &mut current,
            Some(&lower),
            Some(&middle),
            Some(&upper),
            &XObservation::Symbol(0),
            &YObservation::Symbol(0),
            &mut |_, _, _, _, _, _| count += 1,
        );
        assert_eq!(count, 9);
    }

    #[test]
    fn five_state_cell_calculate_invokes_thirteen_edges_and_never_switches() {
        let sm = FiveState::new(
            Array2::zeros((SYMBOL_NUMBER, SYMBOL_NUMBER)),
            Array1::zeros(SYMBOL_NUMBER),
            Array1::zeros(SYMBOL_NUMBER),
        );
        let mut current = vec![0.0; 5];
        let lower = vec![0.0; 5];
        let middle = vec![0.0; 5];
        let upper = vec![0.0; 5];
        let mut edges = Vec::new();
        sm.cell_calculate(
            &mut current,
            Some(&lower),
            Some(&middle),
            Some(&upper),
            &XObservation::Symbol(0),
            &YObservation::Symbol(0),
            &mut |_, _, from, to, _, _| edges.push((from, to)),
        );
        assert_eq!(edges.len(), 13);
        assert!(!edges.contains(&(State::ShortGapX, State::LongGapX)));
        assert!(!edges.contains(&(State::ShortGapX, State::ShortGapY)));
    }

    #[test]
    fn em_safeguard_swaps_when_short_exceeds_long() {
        // S4: P(shortGapX->shortGapX)=0.9, P(longGapX->longGapX)=0.5
        let mut sm = FiveState::new(
            Array2::zeros((SYMBOL_NUMBER, SYMBOL_NUMBER)),
            Array1::zeros(SYMBOL_NUMBER),
            Array1::zeros(SYMBOL_NUMBER),
        );
        *sm.gap_extend_x_mut().0 = 0.9_f64.ln();
        *sm.gap_extend_x_mut().1 = 0.5_f64.ln();
        apply_em_safeguard(&mut sm);
        assert!(sm.gap_extend_long_x() >= sm.gap_extend_short_x());
        assert!((sm.gap_extend_long_x() - 0.9_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn vanilla_transition_probs_matches_literal_scenario() {
        // S6
        let p = vanilla_transition_probs(0.1, 0.17, 0.55);
        assert!((p.a_mm - 0.747).abs() < 1e-9);
        assert!((p.a_me - 0.153).abs() < 1e-9);
        assert!((p.a_mx - 0.1).abs() < 1e-9);
        assert!((p.a_xm - 0.9).abs() < 1e-9);
        assert!((p.a_em - 0.45).abs() < 1e-9);
    }

    #[test]
    fn vanilla_has_no_x_to_y_switch() {
        let model = PoreModel::new(
            0.0,
            Array1::from_elem(4 * num_of_kmers(), 1.0),
        )
        .unwrap();
        let sm = ThreeStateVanilla::new(model.clone(), model, [0.01; NUM_SKIP_BINS], 0.1, 0.5);
        let mut current = vec![0.0; 3];
        let lower = vec![0.0; 3];
        let middle = vec![0.0; 3];
        let upper = vec![0.0; 3];
        let mut edges = Vec::new();
        sm.cell_calculate(
            &mut current,
            Some(&lower),
            Some(&middle),
            Some(&upper),
            &XObservation::Kmer { index: 1, prev_index: 0 },
            &YObservation::Event { mean: 80.0, noise: 1.0 },
            &mut |_, _, from, to, _, _| edges.push((from, to)),
        );
        assert_eq!(edges.len(), 7);
        assert!(!edges.contains(&(State::ShortGapX, State::ShortGapY)));
        assert!(!edges.contains(&(State::ShortGapY, State::ShortGapX)));
    }
}
