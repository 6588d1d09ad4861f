//! Text read/write for the three on-disk HMM formats (§6): `ContinuousPair`
//! (3-/5-state symbol), `Vanilla` (3-state signal), and `Hdp` (3-state
//! signal + emission assignments). All three share the same line-0 header
//! shape and the same NaN write-guard; each differs only in what follows.

use crate::error::{HmmError, Result};
use crate::hmm::ContinuousPairHmm;
use crate::kmer::{kmer_from_index, kmer_index, num_of_kmers, KMER_LENGTH, NUM_SKIP_BINS};
use crate::state::State;
use crate::ModelType;
use std::io::{BufRead, Write};

fn io_err(path: &str, e: std::io::Error) -> HmmError {
    HmmError::MalformedFile {
        path: path.to_string(),
        detail: e.to_string(),
    }
}

fn malformed(path: &str, detail: impl Into<String>) -> HmmError {
    HmmError::MalformedFile {
        path: path.to_string(),
        detail: detail.into(),
    }
}

fn read_line(r: &mut impl BufRead, path: &str) -> Result<String> {
    let mut line = String::new();
    let n = r.read_line(&mut line).map_err(|e| io_err(path, e))?;
    if n == 0 {
        return Err(malformed(path, "unexpected end of file"));
    }
    Ok(line)
}

fn parse_tokens<'a>(line: &'a str, path: &str, expected: usize, what: &str) -> Result<Vec<&'a str>> {
    let tokens: Vec<&str> = line.trim_end().split_whitespace().collect();
    if tokens.len() < expected {
        return Err(malformed(
            path,
            format!("expected at least {expected} {what}, found {}", tokens.len()),
        ));
    }
    Ok(tokens)
}

fn parse_f64(tok: &str, path: &str, field: &str) -> Result<f64> {
    tok.parse::<f64>()
        .map_err(|_| malformed(path, format!("could not parse {field}: {tok:?}")))
}

fn parse_usize(tok: &str, path: &str, field: &str) -> Result<usize> {
    tok.parse::<usize>()
        .map_err(|_| malformed(path, format!("could not parse {field}: {tok:?}")))
}

fn parse_u32(tok: &str, path: &str, field: &str) -> Result<u32> {
    tok.parse::<u32>()
        .map_err(|_| malformed(path, format!("could not parse {field}: {tok:?}")))
}

fn check_type_tag(found: u32, expected: &[ModelType], path: &str) -> Result<ModelType> {
    ModelType::from_tag(found)
        .filter(|t| expected.contains(t))
        .ok_or_else(|| HmmError::WrongModelType {
            expected: expected.iter().map(|t| t.tag()).collect(),
            found,
        })
        .map_err(|e| {
            log::warn!("{path}: {e}");
            e
        })
}

/// Writes the `ContinuousPair` on-disk format (§6): header, flat transition
/// vector plus likelihood, flat gap-probability vector.
///
/// # Errors
///
/// The header line is always written first. If any transition, gap
/// probability, or the likelihood is non-finite, logs and returns
/// [`HmmError::NonFiniteParameter`] immediately after that header line,
/// leaving the rest of the file unwritten — matching the reference
/// implementation's `checkTransitions` guard (`continuousHmm.c`'s "GOT NaN
/// TRANS" diagnostic, logged here via [`log::error!`] rather than printed to
/// stdout), which prints the header before running the check.
pub fn write_continuous_pair(
    model_type: ModelType,
    state_number: usize,
    transitions: &[f64],
    likelihood: f64,
    gap_probs: &[f64],
    mut w: impl Write,
    path: &str,
) -> Result<()> {
    writeln!(w, "{}\t{state_number}\t{}", model_type.tag(), gap_probs.len()).map_err(|e| io_err(path, e))?;

    if transitions.iter().any(|v| !v.is_finite()) || !likelihood.is_finite() {
        log::error!("{path}: GOT NaN TRANS, refusing to write");
        return Err(HmmError::NonFiniteParameter {
            path: path.to_string(),
            detail: "transition vector or likelihood".to_string(),
        });
    }
    if gap_probs.iter().any(|v| !v.is_finite()) {
        log::error!("{path}: GOT NaN TRANS, refusing to write");
        return Err(HmmError::NonFiniteParameter {
            path: path.to_string(),
            detail: "gap probability table".to_string(),
        });
    }

    for v in transitions {
        write!(w, "{v:.6}\t").map_err(|e| io_err(path, e))?;
    }
    writeln!(w, "{likelihood:.6}").map_err(|e| io_err(path, e))?;
    for (i, v) in gap_probs.iter().enumerate() {
        if i + 1 == gap_probs.len() {
            writeln!(w, "{v:.6}").map_err(|e| io_err(path, e))?;
        } else {
            write!(w, "{v:.6}\t").map_err(|e| io_err(path, e))?;
        }
    }
    log::debug!("{path}: wrote continuous pair hmm, type={:?}", model_type);
    Ok(())
}

/// Result of reading a `ContinuousPair` file: the raw header fields plus the
/// flat transition and gap-probability vectors, not yet folded into an
/// accumulator (the caller picks 3-state vs. 5-state interpretation from
/// `model_type`).
pub struct ContinuousPairFile {
    /// Type tag found in the file.
    pub model_type: ModelType,
    /// `stateNumber` field from the header.
    pub state_number: usize,
    /// Flat transition vector (length `state_number²`, reference
    /// implementation layout).
    pub transitions: Vec<f64>,
    /// Forward likelihood recorded at the end of line 1.
    pub likelihood: f64,
    /// Flat per-k-mer gap-probability vector (length `symbolSetSize`).
    pub gap_probs: Vec<f64>,
}

/// Reads the `ContinuousPair` on-disk format.
///
/// # Errors
///
/// Returns [`HmmError::WrongModelType`] if the header's type tag isn't one
/// of `expected`, and [`HmmError::MalformedFile`] on any missing line, short
/// token count, or unparsable numeric field (naming the file and field).
pub fn read_continuous_pair(
    mut r: impl BufRead,
    path: &str,
    expected: &[ModelType],
) -> Result<ContinuousPairFile> {
    let header = read_line(&mut r, path)?;
    let header_tokens = parse_tokens(&header, path, 3, "header fields")?;
    let tag = parse_u32(header_tokens[0], path, "type")?;
    let model_type = check_type_tag(tag, expected, path)?;
    let state_number = parse_usize(header_tokens[1], path, "stateNumber")?;
    let symbol_set_size = parse_usize(header_tokens[2], path, "symbolSetSize")?;

    let transitions_line = read_line(&mut r, path)?;
    let transition_count = state_number * state_number;
    let tokens = parse_tokens(&transitions_line, path, transition_count + 1, "transition fields")?;
    let transitions = tokens[..transition_count]
        .iter()
        .enumerate()
        .map(|(i, t)| parse_f64(t, path, &format!("transition[{i}]")))
        .collect::<Result<Vec<_>>>()?;
    let likelihood = parse_f64(tokens[transition_count], path, "likelihood")?;

    let gap_line = read_line(&mut r, path)?;
    let tokens = parse_tokens(&gap_line, path, symbol_set_size, "gap probability fields")?;
    let gap_probs = tokens[..symbol_set_size]
        .iter()
        .enumerate()
        .map(|(i, t)| parse_f64(t, path, &format!("gap_probs[{i}]")))
        .collect::<Result<Vec<_>>>()?;

    log::debug!("{path}: read continuous pair hmm, type={model_type:?}");
    Ok(ContinuousPairFile {
        model_type,
        state_number,
        transitions,
        likelihood,
        gap_probs,
    })
}

/// Flattens a [`ContinuousPairHmm`] accumulator's counts into the reference
/// implementation's row-major `state × state` transition layout, for
/// [`write_continuous_pair`]. Column/row order follows [`State::ALL_FIVE`]
/// (3-state callers only populate the first three rows/columns).
#[must_use]
pub fn flatten_transitions(hmm: &ContinuousPairHmm, state_number: usize) -> Vec<f64> {
    let five = State::ALL_FIVE;
    let three = State::ALL_THREE;
    let states: &[State] = if state_number == 5 { &five } else { &three };
    let mut out = vec![0.0; state_number * state_number];
    for (i, j) in itertools::iproduct!(0..states.len(), 0..states.len()) {
        out[i * state_number + j] = hmm.raw_transition(states[i], states[j]);
    }
    out
}

/// Writes the `Vanilla` on-disk format (§6): header, 60 skip bins (30 open +
/// 30 extend) plus likelihood, primary pore model line, scaled pore model
/// line.
///
/// # Errors
///
/// Writes the header line first; refuses to write anything further on any
/// non-finite value, returning [`HmmError::NonFiniteParameter`] after that
/// header line. Propagates I/O failures as [`HmmError::MalformedFile`].
pub fn write_vanilla(
    state_number: usize,
    alpha_bins: &[f64; NUM_SKIP_BINS],
    beta_bins: &[f64; NUM_SKIP_BINS],
    likelihood: f64,
    primary: &crate::pore_model::PoreModel,
    scaled: &crate::pore_model::PoreModel,
    mut w: impl Write,
    path: &str,
) -> Result<()> {
    writeln!(w, "{}\t{state_number}\t{}", ModelType::Vanilla.tag(), num_of_kmers())
        .map_err(|e| io_err(path, e))?;

    if alpha_bins.iter().chain(beta_bins).any(|v| !v.is_finite()) || !likelihood.is_finite() {
        log::error!("{path}: GOT NaN TRANS, refusing to write");
        return Err(HmmError::NonFiniteParameter {
            path: path.to_string(),
            detail: "skip bins or likelihood".to_string(),
        });
    }

    for v in alpha_bins.iter().chain(beta_bins) {
        write!(w, "{v:.6}\t").map_err(|e| io_err(path, e))?;
    }
    writeln!(w, "{likelihood:.6}").map_err(|e| io_err(path, e))?;
    primary.write_line(&mut w, path)?;
    scaled.write_line(&mut w, path)?;
    log::debug!("{path}: wrote vanilla hmm");
    Ok(())
}

/// Result of reading a `Vanilla` file.
pub struct VanillaFile {
    /// `stateNumber` field from the header.
    pub state_number: usize,
    /// First 30 skip bins (skip-open).
    pub alpha_bins: [f64; NUM_SKIP_BINS],
    /// Second 30 skip bins (skip-extend), accumulated but unused by the
    /// cell kernel (see [`crate::hmm::VanillaHmm`]).
    pub beta_bins: [f64; NUM_SKIP_BINS],
    /// Forward likelihood.
    pub likelihood: f64,
    /// Primary (match) pore model.
    pub primary: crate::pore_model::PoreModel,
    /// Scaled (extra-event) pore model.
    pub scaled: crate::pore_model::PoreModel,
}

/// Reads the `Vanilla` on-disk format.
///
/// # Errors
///
/// Returns [`HmmError::WrongModelType`] if the header's type tag isn't
/// [`ModelType::Vanilla`], and [`HmmError::MalformedFile`] on any malformed
/// line.
pub fn read_vanilla(mut r: impl BufRead, path: &str) -> Result<VanillaFile> {
    let header = read_line(&mut r, path)?;
    let header_tokens = parse_tokens(&header, path, 3, "header fields")?;
    let tag = parse_u32(header_tokens[0], path, "type")?;
    check_type_tag(tag, &[ModelType::Vanilla], path)?;
    let state_number = parse_usize(header_tokens[1], path, "stateNumber")?;

    let bins_line = read_line(&mut r, path)?;
    let tokens = parse_tokens(&bins_line, path, 2 * NUM_SKIP_BINS + 1, "skip bin fields")?;
    let mut alpha_bins = [0.0; NUM_SKIP_BINS];
    let mut beta_bins = [0.0; NUM_SKIP_BINS];
    for (i, slot) in alpha_bins.iter_mut().enumerate() {
        *slot = parse_f64(tokens[i], path, &format!("alpha_bins[{i}]"))?;
    }
    for (i, slot) in beta_bins.iter_mut().enumerate() {
        *slot = parse_f64(tokens[NUM_SKIP_BINS + i], path, &format!("beta_bins[{i}]"))?;
    }
    let likelihood = parse_f64(tokens[2 * NUM_SKIP_BINS], path, "likelihood")?;

    let primary_line = read_line(&mut r, path)?;
    let primary = crate::pore_model::PoreModel::read_line(primary_line.trim_end(), path)?;
    let scaled_line = read_line(&mut r, path)?;
    let scaled = crate::pore_model::PoreModel::read_line(scaled_line.trim_end(), path)?;

    log::debug!("{path}: read vanilla hmm");
    Ok(VanillaFile {
        state_number,
        alpha_bins,
        beta_bins,
        likelihood,
        primary,
        scaled,
    })
}

/// Writes the `Hdp` on-disk format (§6): header with threshold and
/// assignment count, transitions + likelihood, per-k-mer gap probs, observed
/// event means, and their paired k-mer strings.
///
/// # Errors
///
/// Writes the header line first; refuses to write anything further on any
/// non-finite value, returning [`HmmError::NonFiniteParameter`] after that
/// header line. Propagates I/O failures as [`HmmError::MalformedFile`].
pub fn write_hdp(
    state_number: usize,
    threshold: f64,
    transitions: &[f64],
    likelihood: f64,
    gap_probs: &[f64],
    assignments: &[(usize, f64)],
    mut w: impl Write,
    path: &str,
) -> Result<()> {
    writeln!(
        w,
        "{}\t{state_number}\t{}\t{threshold:.6}\t{}",
        ModelType::ThreeStateHdp.tag(),
        num_of_kmers(),
        assignments.len()
    )
    .map_err(|e| io_err(path, e))?;

    if transitions.iter().any(|v| !v.is_finite()) || !likelihood.is_finite() {
        log::error!("{path}: GOT NaN TRANS, refusing to write");
        return Err(HmmError::NonFiniteParameter {
            path: path.to_string(),
            detail: "transition vector or likelihood".to_string(),
        });
    }

    for v in transitions {
        write!(w, "{v:.6}\t").map_err(|e| io_err(path, e))?;
    }
    writeln!(w, "{likelihood:.6}").map_err(|e| io_err(path, e))?;

    for (i, v) in gap_probs.iter().enumerate() {
        if i + 1 == gap_probs.len() {
            writeln!(w, "{v:.6}").map_err(|e| io_err(path, e))?;
        } else {
            write!(w, "{v:.6}\t").map_err(|e| io_err(path, e))?;
        }
    }

    for (_, mean) in assignments {
        write!(w, "{mean:.6}\t").map_err(|e| io_err(path, e))?;
    }
    writeln!(w).map_err(|e| io_err(path, e))?;

    for (kmer_idx, _) in assignments {
        let kmer = kmer_from_index(*kmer_idx);
        w.write_all(&kmer).map_err(|e| io_err(path, e))?;
        write!(w, " ").map_err(|e| io_err(path, e))?;
    }
    writeln!(w).map_err(|e| io_err(path, e))?;

    log::debug!("{path}: wrote hdp hmm, {} assignments", assignments.len());
    Ok(())
}

/// Result of reading an `Hdp` file.
pub struct HdpFile {
    /// `stateNumber` field from the header.
    pub state_number: usize,
    /// Minimum posterior match probability at which an assignment was
    /// recorded.
    pub threshold: f64,
    /// Flat transition vector.
    pub transitions: Vec<f64>,
    /// Forward likelihood.
    pub likelihood: f64,
    /// Flat per-k-mer gap-probability vector.
    pub gap_probs: Vec<f64>,
    /// `(kmer_index, event_mean)` pairs, in file order.
    pub assignments: Vec<(usize, f64)>,
}

/// Reads the `Hdp` on-disk format.
///
/// # Errors
///
/// Returns [`HmmError::WrongModelType`] if the header's type tag isn't
/// [`ModelType::ThreeStateHdp`], and [`HmmError::MalformedFile`] on any
/// malformed line — including a kmer/event-mean count mismatch between line
/// 3 and line 4 (the reference implementation's historical self-compare
/// typo, corrected here to compare the two lists against each other).
pub fn read_hdp(mut r: impl BufRead, path: &str) -> Result<HdpFile> {
    let header = read_line(&mut r, path)?;
    let header_tokens = parse_tokens(&header, path, 5, "header fields")?;
    let tag = parse_u32(header_tokens[0], path, "type")?;
    check_type_tag(tag, &[ModelType::ThreeStateHdp], path)?;
    let state_number = parse_usize(header_tokens[1], path, "stateNumber")?;
    let symbol_set_size = parse_usize(header_tokens[2], path, "symbolSetSize")?;
    let threshold = parse_f64(header_tokens[3], path, "threshold")?;
    let num_assignments = parse_usize(header_tokens[4], path, "numberOfAssignments")?;

    let transitions_line = read_line(&mut r, path)?;
    let transition_count = state_number * state_number;
    let tokens = parse_tokens(&transitions_line, path, transition_count + 1, "transition fields")?;
    let transitions = tokens[..transition_count]
        .iter()
        .enumerate()
        .map(|(i, t)| parse_f64(t, path, &format!("transition[{i}]")))
        .collect::<Result<Vec<_>>>()?;
    let likelihood = parse_f64(tokens[transition_count], path, "likelihood")?;

    let gap_line = read_line(&mut r, path)?;
    let tokens = parse_tokens(&gap_line, path, symbol_set_size, "gap probability fields")?;
    let gap_probs = tokens[..symbol_set_size]
        .iter()
        .enumerate()
        .map(|(i, t)| parse_f64(t, path, &format!("gap_probs[{i}]")))
        .collect::<Result<Vec<_>>>()?;

    let means_line = read_line(&mut r, path)?;
    let mean_tokens: Vec<&str> = means_line.trim_end().split_whitespace().collect();
    let kmers_line = read_line(&mut r, path)?;
    let kmer_tokens: Vec<&str> = kmers_line.trim_end().split_whitespace().collect();

    if mean_tokens.len() != kmer_tokens.len() {
        return Err(malformed(
            path,
            format!(
                "assignment event means ({}) and kmers ({}) disagree in count",
                mean_tokens.len(),
                kmer_tokens.len()
            ),
        ));
    }
    if mean_tokens.len() != num_assignments {
        return Err(malformed(
            path,
            format!(
                "header declared {num_assignments} assignments, found {}",
                mean_tokens.len()
            ),
        ));
    }

    let mut assignments = Vec::with_capacity(num_assignments);
    for (i, (mean_tok, kmer_tok)) in mean_tokens.iter().zip(kmer_tokens.iter()).enumerate() {
        let mean = parse_f64(mean_tok, path, &format!("assignment_means[{i}]"))?;
        if kmer_tok.len() != KMER_LENGTH {
            return Err(malformed(
                path,
                format!("assignment kmer[{i}] has wrong length: {kmer_tok:?}"),
            ));
        }
        let kmer_idx = kmer_index(kmer_tok.as_bytes())?;
        assignments.push((kmer_idx, mean));
    }

    log::debug!("{path}: read hdp hmm, {} assignments", assignments.len());
    Ok(HdpFile {
        state_number,
        threshold,
        transitions,
        likelihood,
        gap_probs,
        assignments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::ContinuousPairHmm;

    #[test]
    fn continuous_pair_round_trips() {
        let transitions = vec![0.1_f64.ln(); 9];
        let gap_probs = vec![0.25_f64.ln(); 4];
        let mut buf = Vec::new();
        write_continuous_pair(
            ModelType::ThreeState,
            3,
            &transitions,
            -12.5,
            &gap_probs,
            &mut buf,
            "test",
        )
        .unwrap();
        let file = read_continuous_pair(&buf[..], "test", &[ModelType::ThreeState]).unwrap();
        assert_eq!(file.state_number, 3);
        assert!((file.likelihood - (-12.5)).abs() < 1e-6);
        assert!((file.transitions[0] - transitions[0]).abs() < 1e-6);
    }

    #[test]
    fn continuous_pair_rejects_wrong_type() {
        let transitions = vec![0.0; 9];
        let gap_probs = vec![0.0; 4];
        let mut buf = Vec::new();
        write_continuous_pair(ModelType::ThreeState, 3, &transitions, -1.0, &gap_probs, &mut buf, "test").unwrap();
        let err = read_continuous_pair(&buf[..], "test", &[ModelType::FiveState]).unwrap_err();
        assert!(matches!(err, HmmError::WrongModelType { .. }));
    }

    #[test]
    fn continuous_pair_write_refuses_nan() {
        let transitions = vec![f64::NAN; 9];
        let gap_probs = vec![0.0; 4];
        let mut buf = Vec::new();
        let err = write_continuous_pair(ModelType::ThreeState, 3, &transitions, -1.0, &gap_probs, &mut buf, "test");
        assert!(err.is_err());
        let written = String::from_utf8(buf).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert_eq!(written.trim_end(), format!("{}\t3\t4", ModelType::ThreeState.tag()));
    }

    #[test]
    fn hdp_rejects_mismatched_assignment_counts() {
        let text = "4\t3\t4096\t10.0\t2\n0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 -1.0\n0.0 0.0 0.0 0.0\n80.0 81.0\nAAAAAA\n";
        let err = read_hdp(text.as_bytes(), "test").unwrap_err();
        assert!(matches!(err, HmmError::MalformedFile { .. }));
    }

    #[test]
    fn hdp_round_trips_assignments() {
        let transitions = vec![0.0_f64; 9];
        let gap_probs = vec![0.0_f64; 4096];
        let assignments = vec![(0usize, 80.5), (17, 81.2)];
        let mut buf = Vec::new();
        write_hdp(3, 5.0, &transitions, -1.0, &gap_probs, &assignments, &mut buf, "test").unwrap();
        let file = read_hdp(&buf[..], "test").unwrap();
        assert_eq!(file.assignments.len(), 2);
        assert_eq!(file.assignments[0].0, 0);
        assert!((file.assignments[1].1 - 81.2).abs() < 1e-6);
    }

    #[test]
    fn flatten_transitions_uses_state_order() {
        let mut hmm = ContinuousPairHmm::new();
        hmm.add_to_transition(State::Match, State::Match, 5.0);
        let flat = flatten_transitions(&hmm, 3);
        assert_eq!(flat.len(), 9);
    }
}
