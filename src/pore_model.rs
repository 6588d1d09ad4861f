//! The per-k-mer expected-current Gaussian parameters ("pore model") that
//! characterize a sequencing chemistry, independent of any one HMM variant.
//!
//! Layout, per §3/§6: one scalar correlation coefficient between level and
//! fluctuation, followed by four doubles per k-mer (`level_mean, level_sd,
//! fluct_mean, fluct_sd`), for a flat table of `1 + 4*S` doubles.

use crate::error::{HmmError, Result};
use crate::kmer::num_of_kmers;
use ndarray::Array1;
use std::io::{BufRead, Write};

/// Number of doubles stored per k-mer in a pore model table (level mean/sd,
/// fluctuation mean/sd).
pub const MODEL_PARAMS: usize = 4;

/// A pore model: one correlation coefficient plus a flat `[level_mean,
/// level_sd, fluct_mean, fluct_sd] × S` table.
///
/// Pore-model reference data is copied into a state machine at load time —
/// this type has no shared ownership with anything downstream of it.
#[derive(Clone, Debug)]
pub struct PoreModel {
    corr: f64,
    table: Array1<f64>,
}

impl PoreModel {
    /// Builds a pore model from a correlation coefficient and a flat
    /// `4 * num_of_kmers()`-length parameter table.
    ///
    /// # Errors
    ///
    /// Returns [`HmmError::IndexOutOfRange`] if `table.len()` doesn't match
    /// `MODEL_PARAMS * num_of_kmers()`.
    pub fn new(corr: f64, table: Array1<f64>) -> Result<Self> {
        let expected = MODEL_PARAMS * num_of_kmers();
        if table.len() != expected {
            return Err(HmmError::IndexOutOfRange {
                what: "pore model table length",
                value: table.len() as i64,
                bound: expected as i64,
            });
        }
        Ok(Self { corr, table })
    }

    /// Correlation coefficient between level and fluctuation.
    #[must_use]
    pub const fn corr(&self) -> f64 {
        self.corr
    }

    fn param(&self, kmer_index: usize, offset: usize) -> f64 {
        self.table[kmer_index * MODEL_PARAMS + offset]
    }

    /// Expected (mean) current level for the given k-mer index.
    #[must_use]
    pub fn level_mean(&self, kmer_index: usize) -> f64 {
        self.param(kmer_index, 0)
    }

    /// Standard deviation of the current level for the given k-mer index.
    #[must_use]
    pub fn level_sd(&self, kmer_index: usize) -> f64 {
        self.param(kmer_index, 1)
    }

    /// Expected (mean) current fluctuation (noise) for the given k-mer index.
    #[must_use]
    pub fn fluct_mean(&self, kmer_index: usize) -> f64 {
        self.param(kmer_index, 2)
    }

    /// Standard deviation of the current fluctuation for the given k-mer
    /// index.
    #[must_use]
    pub fn fluct_sd(&self, kmer_index: usize) -> f64 {
        self.param(kmer_index, 3)
    }

    /// Returns the affinely-rescaled copy of this pore model used to adapt a
    /// generic chemistry model to one particular read. Per §4.3:
    /// `μ' = μ·scale + shift; σ' = σ·var; μ_f' = μ_f·scale_sd;
    /// σ_f' = σ_f·√(scale_sd³/var_sd)`.
    #[must_use]
    pub fn rescaled(&self, scale: f64, shift: f64, var: f64, scale_sd: f64, var_sd: f64) -> Self {
        let mut table = self.table.clone();
        let fluct_factor = (scale_sd.powi(3) / var_sd).sqrt();
        for i in 0..num_of_kmers() {
            table[i * MODEL_PARAMS] = table[i * MODEL_PARAMS] * scale + shift;
            table[i * MODEL_PARAMS + 1] *= var;
            table[i * MODEL_PARAMS + 2] *= scale_sd;
            table[i * MODEL_PARAMS + 3] *= fluct_factor;
        }
        Self {
            corr: self.corr,
            table,
        }
    }

    pub(crate) fn write_line(&self, mut w: impl Write, path: &str) -> Result<()> {
        if !self.corr.is_finite() || self.table.iter().any(|v| !v.is_finite()) {
            return Err(HmmError::NonFiniteParameter {
                path: path.to_string(),
                detail: "pore model table".to_string(),
            });
        }
        write!(w, "{:.6}", self.corr).map_err(|e| io_err(path, e))?;
        for v in &self.table {
            write!(w, " {v:.6}").map_err(|e| io_err(path, e))?;
        }
        writeln!(w).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    pub(crate) fn read_line(line: &str, path: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let corr: f64 = parse_field(tokens.next(), path, "corr")?;
        let expected = MODEL_PARAMS * num_of_kmers();
        let mut table = Array1::zeros(expected);
        for (i, slot) in table.iter_mut().enumerate() {
            let tok = tokens.next().ok_or_else(|| HmmError::MalformedFile {
                path: path.to_string(),
                detail: format!("expected {expected} table values, missing at index {i}"),
            })?;
            *slot = tok.parse::<f64>().map_err(|_| HmmError::MalformedFile {
                path: path.to_string(),
                detail: format!("could not parse table value at index {i}: {tok:?}"),
            })?;
        }
        Ok(Self { corr, table })
    }
}

fn io_err(path: &str, e: std::io::Error) -> HmmError {
    HmmError::MalformedFile {
        path: path.to_string(),
        detail: e.to_string(),
    }
}

fn parse_field(tok: Option<&str>, path: &str, field: &str) -> Result<f64> {
    let tok = tok.ok_or_else(|| HmmError::MalformedFile {
        path: path.to_string(),
        detail: format!("missing field {field}"),
    })?;
    tok.parse::<f64>().map_err(|_| HmmError::MalformedFile {
        path: path.to_string(),
        detail: format!("could not parse field {field}: {tok:?}"),
    })
}

/// A pore model plus its scaled (extra-event) counterpart and a learned
/// skip-probability table, as loaded from the standalone on-disk pore-model
/// format described in §6.
pub struct PoreModelFile {
    /// Primary (match) pore model.
    pub primary: PoreModel,
    /// 30 skip-probability bins.
    pub skip_bins: [f64; crate::kmer::NUM_SKIP_BINS],
    /// Scaled pore model, used for the extra-event (Y-gap) emission.
    pub scaled: PoreModel,
}

impl PoreModelFile {
    /// Writes the 3-line on-disk pore-model format: primary table, skip
    /// bins, scaled table.
    ///
    /// # Errors
    ///
    /// Returns [`HmmError::NonFiniteParameter`] (writing nothing) if any
    /// value in either table or the skip bins is non-finite, and
    /// [`HmmError::MalformedFile`] if the underlying writer fails.
    pub fn write(&self, mut w: impl Write, path: &str) -> Result<()> {
        if self.skip_bins.iter().any(|v| !v.is_finite()) {
            return Err(HmmError::NonFiniteParameter {
                path: path.to_string(),
                detail: "skip bins".to_string(),
            });
        }
        self.primary.write_line(&mut w, path)?;
        let mut bins = self.skip_bins.iter();
        write!(w, "{:.6}", bins.next().unwrap()).map_err(|e| io_err(path, e))?;
        for v in bins {
            write!(w, " {v:.6}").map_err(|e| io_err(path, e))?;
        }
        writeln!(w).map_err(|e| io_err(path, e))?;
        self.scaled.write_line(&mut w, path)?;
        Ok(())
    }

    /// Reads the 3-line on-disk pore-model format.
    ///
    /// # Errors
    ///
    /// Returns [`HmmError::MalformedFile`] on any missing line, wrong token
    /// count, or unparsable numeric field, naming the file and field.
    pub fn read(mut r: impl BufRead, path: &str) -> Result<Self> {
        let mut line = String::new();
        r.read_line(&mut line).map_err(|e| io_err(path, e))?;
        let primary = PoreModel::read_line(line.trim_end(), path)?;

        line.clear();
        r.read_line(&mut line).map_err(|e| io_err(path, e))?;
        let mut skip_bins = [0.0; crate::kmer::NUM_SKIP_BINS];
        let mut tokens = line.trim_end().split_whitespace();
        for (i, slot) in skip_bins.iter_mut().enumerate() {
            let tok = tokens.next().ok_or_else(|| HmmError::MalformedFile {
                path: path.to_string(),
                detail: format!("expected 30 skip bins, missing at index {i}"),
            })?;
            *slot = tok.parse::<f64>().map_err(|_| HmmError::MalformedFile {
                path: path.to_string(),
                detail: format!("could not parse skip bin {i}: {tok:?}"),
            })?;
        }

        line.clear();
        r.read_line(&mut line).map_err(|e| io_err(path, e))?;
        let scaled = PoreModel::read_line(line.trim_end(), path)?;

        Ok(Self {
            primary,
            skip_bins,
            scaled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_model(value: f64) -> PoreModel {
        let table = Array1::from_elem(MODEL_PARAMS * num_of_kmers(), value);
        PoreModel::new(0.5, table).unwrap()
    }

    #[test]
    fn rejects_wrong_length_table() {
        let table = Array1::from_elem(3, 0.0);
        assert!(PoreModel::new(0.5, table).is_err());
    }

    #[test]
    fn rescale_applies_affine_transform() {
        let model = flat_model(2.0);
        let rescaled = model.rescaled(2.0, 1.0, 3.0, 4.0, 16.0);
        // level_mean' = 2*2 + 1 = 5
        assert!((rescaled.level_mean(0) - 5.0).abs() < 1e-9);
        // level_sd' = 2*3 = 6
        assert!((rescaled.level_sd(0) - 6.0).abs() < 1e-9);
        // fluct_mean' = 2*4 = 8
        assert!((rescaled.fluct_mean(0) - 8.0).abs() < 1e-9);
        // fluct_sd' = 2*sqrt(4^3/16) = 2*sqrt(4) = 4
        assert!((rescaled.fluct_sd(0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn round_trips_through_text_format() {
        let file = PoreModelFile {
            primary: flat_model(1.5),
            skip_bins: [0.1; crate::kmer::NUM_SKIP_BINS],
            scaled: flat_model(2.5),
        };
        let mut buf = Vec::new();
        file.write(&mut buf, "test").unwrap();
        let read_back = PoreModelFile::read(&buf[..], "test").unwrap();
        assert!((read_back.primary.level_mean(0) - 1.5).abs() < 1e-6);
        assert!((read_back.scaled.level_mean(0) - 2.5).abs() < 1e-6);
        assert!((read_back.skip_bins[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn write_refuses_nan() {
        let mut table = Array1::from_elem(MODEL_PARAMS * num_of_kmers(), 1.0);
        table[0] = f64::NAN;
        let model = PoreModel::new(0.5, table).unwrap();
        let file = PoreModelFile {
            primary: model,
            skip_bins: [0.1; crate::kmer::NUM_SKIP_BINS],
            scaled: flat_model(1.0),
        };
        let mut buf = Vec::new();
        assert!(file.write(&mut buf, "test").is_err());
        assert!(buf.is_empty());
    }
}
