//! Van der Waals combining rules.
//!
//! Each atom class carries a radius `r` (nm, at minimum energy) and a well
//! depth `e` (kJ/mol); a combining rule maps the parameters of two classes
//! to the effective pair `(dmin, emin)` with `dmin = 2 * rmin`. The rules
//! differ substantially in quality: Lorentz-Berthelot is the most common
//! and the least accurate; Waldman-Hagler performs best for unlike pairs
//! and is the default. Kong shares Waldman-Hagler's well-depth formula but
//! derives the radius from the Tang-Toennies combination of `e * r^12`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VdwMixingRule {
    /// Arithmetic mean radius, geometric mean well depth (AMBER, CHARMM).
    LorentzBerthelot,
    /// Geometric mean for both (OPLS).
    Jorgensen,
    /// Cubic mean radius, harmonic-of-harmonic-and-geometric well depth (MMFF).
    HalgrenHHG,
    /// J. Comput. Chem. 14(9):1077 (1993).
    WaldmanHagler,
    /// J. Chem. Phys. 59(5):2464 (1973).
    Kong,
}

impl Default for VdwMixingRule {
    fn default() -> Self {
        VdwMixingRule::WaldmanHagler
    }
}

impl VdwMixingRule {
    pub fn name(self) -> &'static str {
        match self {
            VdwMixingRule::LorentzBerthelot => "Lorentz-Berthelot",
            VdwMixingRule::Jorgensen => "Jorgensen",
            VdwMixingRule::HalgrenHHG => "Halgren-HHG",
            VdwMixingRule::WaldmanHagler => "Waldman-Hagler",
            VdwMixingRule::Kong => "Kong",
        }
    }

    /// Mixes two per-class parameter sets, returning `(dmin, emin)` where
    /// `dmin` is the pair separation at minimum energy (nm) and `emin` the
    /// pair well depth (kJ/mol).
    pub fn combine(self, ri: f64, rj: f64, ei: f64, ej: f64) -> (f64, f64) {
        let (rmin, emin) = match self {
            VdwMixingRule::LorentzBerthelot => (arithmetic_mean(ri, rj), geometric_mean(ei, ej)),
            VdwMixingRule::Jorgensen => (geometric_mean(ri, rj), geometric_mean(ei, ej)),
            VdwMixingRule::HalgrenHHG => (cubic_mean(ri, rj), hhg_mean(ei, ej)),
            VdwMixingRule::WaldmanHagler => {
                let ri6 = ri.powi(6);
                let rj6 = rj.powi(6);
                let er6 = geometric_mean(ei * ri6, ej * rj6);
                let r6 = arithmetic_mean(ri6, rj6);
                (r6.powf(1.0 / 6.0), er6 / r6)
            }
            VdwMixingRule::Kong => {
                let ri6 = ri.powi(6);
                let rj6 = rj.powi(6);
                let er6 = geometric_mean(ei * ri6, ej * rj6);
                let eri12_13 = (ei * ri6 * ri6).powf(1.0 / 13.0);
                let erj12_13 = (ej * rj6 * rj6).powf(1.0 / 13.0);
                let r6 = arithmetic_mean(eri12_13, erj12_13).powi(13) / er6;
                (r6.powf(1.0 / 6.0), er6 / r6)
            }
        };
        (2.0 * rmin, emin)
    }
}

#[inline]
fn arithmetic_mean(a: f64, b: f64) -> f64 {
    0.5 * (a + b)
}

#[inline]
fn geometric_mean(a: f64, b: f64) -> f64 {
    (a * b).sqrt()
}

#[inline]
fn harmonic_mean(a: f64, b: f64) -> f64 {
    (2.0 * a * b) / (a + b)
}

// (a^3 + b^3) / (a^2 + b^2)
#[inline]
fn cubic_mean(a: f64, b: f64) -> f64 {
    (a * a * a + b * b * b) / (a * a + b * b)
}

// Harmonic mean of the harmonic and geometric means: 4ab/(sqrt(a)+sqrt(b))^2
#[inline]
fn hhg_mean(a: f64, b: f64) -> f64 {
    harmonic_mean(harmonic_mean(a, b), geometric_mean(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: [VdwMixingRule; 5] = [
        VdwMixingRule::LorentzBerthelot,
        VdwMixingRule::Jorgensen,
        VdwMixingRule::HalgrenHHG,
        VdwMixingRule::WaldmanHagler,
        VdwMixingRule::Kong,
    ];

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn default_rule_is_waldman_hagler() {
        assert_eq!(VdwMixingRule::default(), VdwMixingRule::WaldmanHagler);
    }

    #[test]
    fn every_rule_is_symmetric_in_its_arguments() {
        let (ri, rj, ei, ej) = (0.17, 0.155, 0.65, 0.28);
        for rule in RULES {
            let (dij, eij) = rule.combine(ri, rj, ei, ej);
            let (dji, eji) = rule.combine(rj, ri, ej, ei);
            assert!(approx(dij, dji), "{} dmin asymmetric", rule.name());
            assert!(approx(eij, eji), "{} emin asymmetric", rule.name());
        }
    }

    #[test]
    fn every_rule_reduces_to_identity_for_like_classes() {
        let (r, e) = (0.154, 0.3598);
        for rule in RULES {
            let (dmin, emin) = rule.combine(r, r, e, e);
            assert!(approx(dmin, 2.0 * r), "{} dmin off-diagonal", rule.name());
            assert!(approx(emin, e), "{} emin off-diagonal", rule.name());
        }
    }

    #[test]
    fn lorentz_berthelot_matches_hand_values() {
        let (dmin, emin) = VdwMixingRule::LorentzBerthelot.combine(0.1, 0.3, 0.4, 0.9);
        assert!(approx(dmin, 2.0 * 0.2));
        assert!(approx(emin, 0.6));
    }

    #[test]
    fn waldman_hagler_matches_direct_formula() {
        let (ri, rj, ei, ej): (f64, f64, f64, f64) = (0.12, 0.21, 0.5, 0.11);
        let ri6 = ri.powi(6);
        let rj6 = rj.powi(6);
        let r6 = 0.5 * (ri6 + rj6);
        let er6 = (ei * ri6 * ej * rj6).sqrt();
        let (dmin, emin) = VdwMixingRule::WaldmanHagler.combine(ri, rj, ei, ej);
        assert!(approx(dmin, 2.0 * r6.powf(1.0 / 6.0)));
        assert!(approx(emin, er6 / r6));
    }

    #[test]
    fn kong_shares_waldman_hagler_well_depth_form() {
        // For like parameters the two rules coincide exactly.
        let (d_wh, e_wh) = VdwMixingRule::WaldmanHagler.combine(0.16, 0.16, 0.7, 0.7);
        let (d_k, e_k) = VdwMixingRule::Kong.combine(0.16, 0.16, 0.7, 0.7);
        assert!(approx(d_wh, d_k));
        assert!(approx(e_wh, e_k));
    }
}
