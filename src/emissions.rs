//! Emission functions: pure closures that, given a table and an observation,
//! return a log-probability. One function per (state machine, axis)
//! combination named in §4.2.

use crate::kmer::is_n;
use crate::pore_model::PoreModel;
use ndarray::{Array1, Array2};
use std::f64::consts::PI;

/// Log of the uniform match probability used whenever either symbol is `N`:
/// `1 / 16` (there are 16 possible `(x, y)` symbol pairs).
pub(crate) const LOG_UNIFORM_MATCH: f64 = -2.772_588_722_239_781; // ln(0.0625)

/// Log of the uniform gap probability used whenever the gapped symbol is
/// `N`: `1 / 4`.
pub(crate) const LOG_UNIFORM_GAP: f64 = -1.386_294_361_119_890_6; // ln(0.25)

/// Match emission for the symbol (discrete-alphabet) state machines:
/// `log M[x, y]`, falling back to the uniform log-probability if either
/// symbol is the out-of-range `N` sentinel.
#[must_use]
pub fn symbol_match_log_prob(table: &Array2<f64>, x: usize, y: usize) -> f64 {
    if is_n(x) || is_n(y) {
        return LOG_UNIFORM_MATCH;
    }
    table[[x, y]]
}

/// Gap emission for the symbol state machines: `log G[x]`, falling back to
/// the uniform log-probability if `x` is `N`.
#[must_use]
pub fn symbol_gap_log_prob(table: &Array1<f64>, x: usize) -> f64 {
    if is_n(x) {
        return LOG_UNIFORM_GAP;
    }
    table[x]
}

/// Standard normal log-density, used by both Gaussian emission functions.
fn log_std_normal_pdf(z: f64) -> f64 {
    -0.5 * z.mul_add(z, (2.0 * PI).ln())
}

/// Gaussian match emission for the vanilla signal state machine: given an
/// event's mean current `event_mean` and a k-mer index, returns
/// `log φ((e − μ) / σ) − log σ`.
#[must_use]
pub fn gaussian_match_log_prob(event_mean: f64, kmer_index: usize, model: &PoreModel) -> f64 {
    let mu = model.level_mean(kmer_index);
    let sigma = model.level_sd(kmer_index);
    let z = (event_mean - mu) / sigma;
    log_std_normal_pdf(z) - sigma.ln()
}

/// Bivariate-Gaussian match emission used on the extra-event (Y-gap) edge of
/// the vanilla state machine: the full 2-D normal density over `(mean,
/// noise)` using the stored level/fluctuation correlation `ρ`.
#[must_use]
pub fn bivariate_gaussian_match_log_prob(
    event_mean: f64,
    event_noise: f64,
    kmer_index: usize,
    model: &PoreModel,
) -> f64 {
    let mu_l = model.level_mean(kmer_index);
    let sigma_l = model.level_sd(kmer_index);
    let mu_f = model.fluct_mean(kmer_index);
    let sigma_f = model.fluct_sd(kmer_index);
    let rho = model.corr();

    let zl = (event_mean - mu_l) / sigma_l;
    let zf = (event_noise - mu_f) / sigma_f;
    let one_minus_rho2 = 1.0 - rho * rho;

    let quad = (zl * zl - 2.0 * rho * zl * zf + zf * zf) / one_minus_rho2;
    let norm_const = (2.0 * PI * sigma_l * sigma_f * one_minus_rho2.sqrt()).ln();

    -0.5 * quad - norm_const
}

/// Skip-probability emission for the vanilla state machine: a direct (not
/// log-space) table lookup of the learned skip probability for the given
/// bin, consumed by the cell kernel before the logarithm is taken (§4.3).
#[must_use]
pub fn skip_probability(skip_bins: &[f64], bin: usize) -> f64 {
    skip_bins[bin]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::{num_of_kmers, SYMBOL_NUMBER};
    use crate::pore_model::MODEL_PARAMS;

    #[test]
    fn symbol_match_falls_back_to_uniform_for_n() {
        let table = Array2::zeros((SYMBOL_NUMBER, SYMBOL_NUMBER));
        assert!((symbol_match_log_prob(&table, SYMBOL_NUMBER, 0) - LOG_UNIFORM_MATCH).abs() < 1e-12);
        assert!((symbol_match_log_prob(&table, 0, SYMBOL_NUMBER) - LOG_UNIFORM_MATCH).abs() < 1e-12);
    }

    #[test]
    fn symbol_gap_falls_back_to_uniform_for_n() {
        let table = Array1::zeros(SYMBOL_NUMBER);
        assert!((symbol_gap_log_prob(&table, SYMBOL_NUMBER) - LOG_UNIFORM_GAP).abs() < 1e-12);
    }

    #[test]
    fn gaussian_match_peaks_at_mean() {
        let table = Array1::from_elem(MODEL_PARAMS * num_of_kmers(), 0.0);
        let mut table = table;
        table[0] = 80.0; // level_mean
        table[1] = 1.0; // level_sd
        let model = PoreModel::new(0.0, table).unwrap();
        let at_mean = gaussian_match_log_prob(80.0, 0, &model);
        let off_mean = gaussian_match_log_prob(90.0, 0, &model);
        assert!(at_mean > off_mean);
    }

    #[test]
    fn bivariate_reduces_towards_product_when_uncorrelated() {
        let mut table = Array1::from_elem(MODEL_PARAMS * num_of_kmers(), 0.0);
        table[0] = 80.0;
        table[1] = 2.0;
        table[2] = 1.5;
        table[3] = 0.5;
        let model = PoreModel::new(0.0, table).unwrap();
        let joint = bivariate_gaussian_match_log_prob(80.0, 1.5, 0, &model);
        let product = gaussian_match_log_prob(80.0, 0, &model)
            + log_std_normal_pdf((1.5 - model.fluct_mean(0)) / model.fluct_sd(0))
            - model.fluct_sd(0).ln();
        assert!((joint - product).abs() < 1e-9);
    }
}
