use porehmm::facade::{load_hmm, new_hmm, save_hmm};
use porehmm::hmm::{ContinuousPairHmm, Hmm, HmmEnum};
use porehmm::kmer::{num_of_kmers, SYMBOL_NUMBER};
use porehmm::serializer::{flatten_transitions, write_continuous_pair};
use porehmm::state::State;
use porehmm::ModelType;

// S1: round-trip a freshly constructed (pseudocount-only) ContinuousPair
// accumulator through the on-disk format; every transition and gap
// probability should come back at the pseudocount value, likelihood 0.0.
#[test]
fn s1_round_trip_empty_continuous_pair() {
    let hmm = ContinuousPairHmm::new();
    let transitions = flatten_transitions(&hmm, 3);
    let mut gap_probs = vec![0.0; SYMBOL_NUMBER];
    for (i, slot) in gap_probs.iter_mut().enumerate() {
        *slot = hmm.gap_x_emission_raw(i);
    }

    let mut buf = Vec::new();
    write_continuous_pair(ModelType::ThreeState, 3, &transitions, 0.0, &gap_probs, &mut buf, "s1")
        .expect("fresh accumulator has only finite pseudocounts");

    let file = porehmm::serializer::read_continuous_pair(&buf[..], "s1", &[ModelType::ThreeState]).unwrap();
    assert_eq!(file.state_number, 3);
    assert!((file.likelihood - 0.0).abs() < 1e-6);
    for t in &file.transitions {
        assert!((t - 0.001).abs() < 1e-6, "expected pseudocount 0.001, got {t}");
    }
    for g in &file.gap_probs {
        assert!((g - 0.001).abs() < 1e-6, "expected pseudocount 0.001, got {g}");
    }
}

// S5: a NaN injected anywhere in the transition vector must suppress the
// write of everything past the header — §8 invariant 9 and S5 both specify
// a file with exactly one header line and nothing else. Reading that
// header-only file back must fail (there's no transition line to parse),
// not succeed on garbage.
#[test]
fn s5_nan_guard_refuses_to_write_and_read_back_fails() {
    let mut transitions = vec![0.1_f64.ln(); 9];
    transitions[4] = f64::NAN;
    let gap_probs = vec![0.25_f64.ln(); 4];

    let mut buf = Vec::new();
    let err = write_continuous_pair(ModelType::ThreeState, 3, &transitions, -1.0, &gap_probs, &mut buf, "s5");
    assert!(err.is_err());
    let written = String::from_utf8(buf.clone()).unwrap();
    assert_eq!(written.lines().count(), 1, "expected header-only output, got {written:?}");
    assert_eq!(written.trim_end(), format!("{}\t3\t4", ModelType::ThreeState.tag()));

    let read_err = porehmm::serializer::read_continuous_pair(&buf[..], "s5", &[ModelType::ThreeState]);
    assert!(read_err.is_err());
}

// §8 invariant 7: expectation accumulation is associative. Splitting a
// stream of traceback edges across two containers and merging them must
// equal accumulating into a single container directly.
#[test]
fn s7_merge_is_associative_with_single_container_accumulation() {
    let mut single = ContinuousPairHmm::new();
    single.add_to_transition(State::Match, State::Match, 2.0);
    single.add_to_transition(State::Match, State::ShortGapX, 3.0);
    single.add_to_match_emission(0, 1, 4.0);

    let mut left = ContinuousPairHmm::new();
    left.add_to_transition(State::Match, State::Match, 2.0);
    left.add_to_match_emission(0, 1, 1.0);

    let mut right = ContinuousPairHmm::new();
    right.add_to_transition(State::Match, State::ShortGapX, 3.0);
    right.add_to_match_emission(0, 1, 3.0);

    let right_enum: HmmEnum = right.into();
    left.merge_from(&right_enum);

    assert!((left.raw_transition(State::Match, State::Match) - single.raw_transition(State::Match, State::Match)).abs() < 1e-12);
    assert!(
        (left.raw_transition(State::Match, State::ShortGapX) - single.raw_transition(State::Match, State::ShortGapX)).abs()
            < 1e-12
    );
}

// §8 invariant 8 (EM safeguard), exercised end-to-end through loadInto
// rather than the unit-level helper in state_machine.rs.
#[test]
fn s4_em_safeguard_holds_after_load_into_five_state() {
    let mut hmm = ContinuousPairHmm::new();
    // Bias the accumulator so the raw short-extend count on X implies a
    // higher probability than the raw long-extend count. The accumulator
    // starts pseudocount-seeded (0.001 per §8 S1), so the post-load ratios
    // are diluted slightly from the literal 0.9/0.5 inputs.
    hmm.add_to_transition(State::ShortGapX, State::ShortGapX, 0.9);
    hmm.add_to_transition(State::ShortGapX, State::Match, 0.1);
    hmm.add_to_transition(State::LongGapX, State::LongGapX, 0.5);
    hmm.add_to_transition(State::LongGapX, State::Match, 0.5);

    let sm = hmm.load_into_five_state();
    let short_extend_ratio = (0.001 + 0.9) / (0.001 + 0.9 + 0.001 + 0.1 + 0.001);
    let long_extend_ratio = (0.001 + 0.5) / (0.001 + 0.5 + 0.001 + 0.5);
    assert!(short_extend_ratio > long_extend_ratio);
    // Before the safeguard, short-extend > long-extend; after loadInto's
    // swap, the "long" slot must hold the larger probability.
    assert!((sm.gap_extend_long_x() - short_extend_ratio.ln()).abs() < 1e-6);
}

#[test]
fn facade_builds_hmm_for_every_model_type() {
    for model_type in [
        ModelType::FiveState,
        ModelType::FiveStateAsymmetric,
        ModelType::ThreeState,
        ModelType::ThreeStateAsymmetric,
        ModelType::ThreeStateHdp,
        ModelType::Vanilla,
    ] {
        let _hmm = new_hmm(model_type);
    }
}

#[test]
fn kmer_index_space_matches_symbol_alphabet() {
    assert_eq!(num_of_kmers(), SYMBOL_NUMBER.pow(6));
}

#[test]
fn load_hmm_rejects_file_with_foreign_type_tag() {
    let transitions = vec![0.0; 9];
    let gap_probs = vec![0.0; 4];
    let mut buf = Vec::new();
    write_continuous_pair(ModelType::FiveState, 3, &transitions, -1.0, &gap_probs, &mut buf, "test").unwrap();
    let err = load_hmm(&buf[..], "test", &[ModelType::ThreeState]);
    assert!(err.is_err());
}

#[test]
fn save_and_reload_three_state_hmm_preserves_gap_probs() {
    let mut hmm = new_hmm(ModelType::ThreeState);
    if let HmmEnum::ContinuousPairHmm(inner) = &mut hmm {
        inner.add_to_gap_emission_x(0, 5.0);
    }
    let mut buf = Vec::new();
    save_hmm(&hmm, ModelType::ThreeState, 3, -2.0, None, &mut buf, "test").unwrap();
    let loaded = load_hmm(&buf[..], "test", &[ModelType::ThreeState]).unwrap();
    if let HmmEnum::ContinuousPairHmm(inner) = loaded {
        assert!(inner.gap_x_emission_raw(0) > 5.0);
    } else {
        panic!("expected ContinuousPairHmm");
    }
}
