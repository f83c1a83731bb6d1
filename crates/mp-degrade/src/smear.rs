//! Gaussian resolution smearing of jets and missing Et.

use crate::config::{JetSmearingConfig, MetSmearingConfig};
use crate::truth::TruthMissingEt;
use mp_core::{Error, MeasuredMissingEt, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};

fn gaussian(mean: f64, sigma: f64) -> Result<Normal<f64>> {
    Normal::new(mean, sigma).map_err(|e| {
        Error::Validation(format!("invalid Gaussian (mean {mean}, sigma {sigma}): {e}"))
    })
}

/// Jet pt smearing with `sigma = coeff * sqrt(max(1, pt))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JetSmearer {
    enabled: bool,
    coeff: f64,
}

impl JetSmearer {
    /// Smearer from the jet section of the config.
    pub fn new(cfg: &JetSmearingConfig) -> Self {
        Self { enabled: cfg.enabled, coeff: cfg.coeff }
    }

    /// Resolution at a given true pt.
    pub fn sigma(&self, pt: f64) -> f64 {
        self.coeff * pt.max(1.0).sqrt()
    }

    /// Smeared pt; the input unchanged when disabled (no draw is taken).
    pub fn smear<R: Rng + ?Sized>(&self, rng: &mut R, pt: f64) -> Result<f64> {
        if !self.enabled {
            return Ok(pt);
        }
        Ok(gaussian(pt, self.sigma(pt))?.sample(rng))
    }
}

/// Independent Gaussian smearing of the missing-Et components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetSmearer {
    enabled: bool,
    sigma_x: f64,
    sigma_y: f64,
}

impl MetSmearer {
    /// Smearer from the missing-Et section of the config.
    pub fn new(cfg: &MetSmearingConfig) -> Self {
        Self { enabled: cfg.enabled, sigma_x: cfg.sigma_x, sigma_y: cfg.sigma_y }
    }

    /// Measured missing Et with covariance `diag(sigma_x², sigma_y²)`.
    ///
    /// The covariance is attached whether or not smearing is enabled.
    pub fn smear<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        met: &TruthMissingEt,
    ) -> Result<MeasuredMissingEt> {
        let (px, py) = if self.enabled {
            let px = gaussian(met.px, self.sigma_x)?.sample(rng);
            let py = gaussian(met.py, self.sigma_y)?.sample(rng);
            (px, py)
        } else {
            (met.px, met.py)
        };
        Ok(MeasuredMissingEt::with_resolution(px, py, self.sigma_x, self.sigma_y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_disabled_is_identity() {
        let jets = JetSmearer::new(&JetSmearingConfig { enabled: false, coeff: 3.0 });
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(jets.smear(&mut rng, 80.0).unwrap(), 80.0);

        let cfg = MetSmearingConfig { enabled: false, sigma_x: 10.0, sigma_y: 20.0 };
        let met = MetSmearer::new(&cfg);
        let m = met.smear(&mut rng, &TruthMissingEt { px: 3.0, py: -4.0 }).unwrap();
        assert_eq!((m.px, m.py), (3.0, -4.0));
        assert_relative_eq!(m.cov[(1, 1)], 400.0);
    }

    #[test]
    fn test_sigma_floor() {
        let jets = JetSmearer::new(&JetSmearingConfig { enabled: true, coeff: 2.0 });
        assert_relative_eq!(jets.sigma(0.25), 2.0);
        assert_relative_eq!(jets.sigma(100.0), 20.0);
    }

    #[test]
    fn test_jet_smearing_moments() {
        let jets = JetSmearer::new(&JetSmearingConfig { enabled: true, coeff: 1.0 });
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| jets.smear(&mut rng, 64.0).unwrap()).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        assert_relative_eq!(mean, 64.0, epsilon = 0.25);
        assert_relative_eq!(var.sqrt(), 8.0, epsilon = 0.2);
    }

    #[test]
    fn test_met_smearing_moments() {
        let cfg = MetSmearingConfig { enabled: true, sigma_x: 10.0, sigma_y: 5.0 };
        let met = MetSmearer::new(&cfg);
        let mut rng = StdRng::seed_from_u64(17);
        let truth = TruthMissingEt { px: 20.0, py: -30.0 };
        let n = 20_000;
        let (mut sx, mut sy, mut sxx) = (0.0, 0.0, 0.0);
        for _ in 0..n {
            let m = met.smear(&mut rng, &truth).unwrap();
            sx += m.px;
            sy += m.py;
            sxx += (m.px - 20.0).powi(2);
        }
        assert_relative_eq!(sx / n as f64, 20.0, epsilon = 0.3);
        assert_relative_eq!(sy / n as f64, -30.0, epsilon = 0.15);
        assert_relative_eq!((sxx / n as f64).sqrt(), 10.0, epsilon = 0.25);
    }
}
