//! Four-vector helpers in collider coordinates.

use std::f64::consts::PI;
use std::ops::Add;

/// Four-momentum stored in Cartesian components `(px, py, pz, E)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LorentzVector {
    /// x component [GeV]
    pub px: f64,
    /// y component [GeV]
    pub py: f64,
    /// z component [GeV]
    pub pz: f64,
    /// Energy [GeV]
    pub e: f64,
}

impl LorentzVector {
    /// Build from `(pt, eta, phi, mass)`.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = pt * pt + pz * pz;
        Self { px, py, pz, e: (p2 + mass * mass).sqrt() }
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    /// Magnitude of the three-momentum.
    pub fn p(&self) -> f64 {
        (self.px * self.px + self.py * self.py + self.pz * self.pz).sqrt()
    }

    /// Pseudorapidity; `0` for a vector along the beam with zero pt.
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            return 0.0;
        }
        (self.pz / pt).asinh()
    }

    /// Azimuth in `(-π, π]`.
    pub fn phi(&self) -> f64 {
        self.py.atan2(self.px)
    }

    /// Invariant mass; space-like vectors return `0`.
    pub fn mass(&self) -> f64 {
        let m2 = self.e * self.e - self.p() * self.p();
        if m2 > 0.0 { m2.sqrt() } else { 0.0 }
    }

    /// Euclidean distance between the three-momenta of `self` and `other`.
    pub fn momentum_distance(&self, other: &Self) -> f64 {
        let dx = self.px - other.px;
        let dy = self.py - other.py;
        let dz = self.pz - other.pz;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl Add for LorentzVector {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
            e: self.e + rhs.e,
        }
    }
}

/// Azimuthal difference wrapped into `[-π, π]`.
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let mut d = phi1 - phi2;
    while d > PI {
        d -= 2.0 * PI;
    }
    while d < -PI {
        d += 2.0 * PI;
    }
    d
}

/// Angular separation `ΔR = sqrt(Δη² + Δφ²)`.
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let deta = eta1 - eta2;
    let dphi = delta_phi(phi1, phi2);
    deta.hypot(dphi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_round_trip_pt_eta_phi_m() {
        let v = LorentzVector::from_pt_eta_phi_m(45.0, -1.3, 2.1, 4.8);
        assert_relative_eq!(v.pt(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(v.eta(), -1.3, epsilon = 1e-9);
        assert_relative_eq!(v.phi(), 2.1, epsilon = 1e-9);
        assert_relative_eq!(v.mass(), 4.8, epsilon = 1e-6);
    }

    #[test]
    fn test_back_to_back_pair_mass() {
        let a = LorentzVector::from_pt_eta_phi_m(50.0, 0.0, 0.0, 0.0);
        let b = LorentzVector::from_pt_eta_phi_m(50.0, 0.0, PI, 0.0);
        assert_relative_eq!((a + b).mass(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_delta_phi_wraps() {
        assert_relative_eq!(delta_phi(3.0, -3.0), 6.0 - 2.0 * PI, epsilon = 1e-12);
        assert_relative_eq!(delta_phi(-3.0, 3.0), 2.0 * PI - 6.0, epsilon = 1e-12);
        assert_relative_eq!(delta_r(0.0, 0.1, 0.3, -0.3), 0.5, epsilon = 1e-12);
    }
}
