//! Force-field parameter records.
//!
//! Atom classes and charged atom types live in integer-indexed registries
//! whose slots are chosen by the caller; both support partial definition
//! (an atom class may be declared before its van der Waals parameters are
//! known, a charged type before its partial charge is). Bond terms are
//! keyed by canonical tuples of atom-class indices.

use crate::core::models::ids::{AtomClassId, ChargedTypeId};
use crate::core::models::tuples::{Pair, Quad, Triple};

/// An atom class: element, expected valence, and Lennard-Jones parameters.
///
/// `vdw_radius` is the radius at minimum energy in nm (half the dmin used
/// in the 12-6 formula), `vdw_well_depth` the well depth in kJ/mol. Both
/// may be filled in after the class is declared.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomClass {
    pub class_id: AtomClassId,
    pub name: String,
    pub element: u32,
    pub valence: u32,
    pub vdw_radius: Option<f64>,
    pub vdw_well_depth: Option<f64>,

    // Realization caches: mixed vdW parameters against this class and every
    // higher-numbered complete class, indexed by (other - this). dij is the
    // mixed minimum-energy separation (nm), eij the mixed well depth (kJ/mol).
    pub vdw_dij: Vec<f64>,
    pub vdw_eij: Vec<f64>,
}

impl AtomClass {
    pub fn new(
        class_id: AtomClassId,
        name: &str,
        element: u32,
        valence: u32,
        vdw_radius: Option<f64>,
        vdw_well_depth: Option<f64>,
    ) -> Self {
        Self {
            class_id,
            name: name.to_string(),
            element,
            valence,
            vdw_radius,
            vdw_well_depth,
            vdw_dij: Vec::new(),
            vdw_eij: Vec::new(),
        }
    }

    /// Complete classes participate in the mixed vdW table.
    pub fn is_complete(&self) -> bool {
        self.vdw_radius.is_some() && self.vdw_well_depth.is_some()
    }

    pub fn invalidate_topological_cache(&mut self) {
        self.vdw_dij.clear();
        self.vdw_eij.clear();
    }
}

/// A charged atom type: a chemical environment binding an atom class to a
/// partial charge (in units of the proton charge).
#[derive(Debug, Clone, PartialEq)]
pub struct ChargedAtomType {
    pub type_id: ChargedTypeId,
    pub name: String,
    pub atom_class: AtomClassId,
    pub partial_charge: Option<f64>,
}

impl ChargedAtomType {
    pub fn new(
        type_id: ChargedTypeId,
        name: &str,
        atom_class: AtomClassId,
        partial_charge: Option<f64>,
    ) -> Self {
        Self {
            type_id,
            name: name.to_string(),
            atom_class,
            partial_charge,
        }
    }
}

/// Harmonic bond-stretch term for a canonical pair of atom classes.
///
/// The energy is `k (d - d0)^2` with no factor of one half; `k` is in
/// kJ/mol per nm^2 and `d0` in nm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondStretch {
    pub classes: Pair<AtomClassId>,
    pub k: f64,
    pub d0: f64,
}

/// Harmonic bond-bend term for a canonical triple of atom classes, the
/// central atom in the middle. `k` is in kJ/mol per rad^2, `theta0` in
/// radians within [0, pi].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondBend {
    pub classes: Triple<AtomClassId>,
    pub k: f64,
    pub theta0: f64,
}

/// One Fourier term of a periodic torsion: energy
/// `amplitude * (1 + cos(periodicity * theta - phase))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorsionTerm {
    /// 1 = 360 degree period, 2 = 180, 3 = 120, up to 6.
    pub periodicity: u32,
    /// kJ/mol, nonnegative.
    pub amplitude: f64,
    /// Radians in (-pi, pi].
    pub phase: f64,
}

impl TorsionTerm {
    pub fn energy(&self, theta: f64) -> f64 {
        self.amplitude * (1.0 + (self.periodicity as f64 * theta - self.phase).cos())
    }

    /// Torque about the torsion axis; the negative derivative of the energy
    /// with respect to theta.
    pub fn torque(&self, theta: f64) -> f64 {
        self.periodicity as f64 * self.amplitude * (self.periodicity as f64 * theta - self.phase).sin()
    }
}

/// A torsion (or improper torsion) over a quad of atom classes: up to three
/// Fourier terms with distinct periodicities.
///
/// Proper torsions key on the canonical quad; improper torsions key on the
/// quad as given, with the central atom in the third slot.
#[derive(Debug, Clone, PartialEq)]
pub struct BondTorsion {
    pub classes: Quad<AtomClassId>,
    pub terms: Vec<TorsionTerm>,
}

impl BondTorsion {
    pub fn new(classes: Quad<AtomClassId>, terms: Vec<TorsionTerm>) -> Self {
        Self { classes, terms }
    }

    pub fn has_term_with_periodicity(&self, periodicity: u32) -> bool {
        self.terms.iter().any(|t| t.periodicity == periodicity)
    }

    /// Term-set equality, ignoring term order. Used to let a caller
    /// innocently re-define an identical torsion without an error.
    pub fn same_terms(&self, other: &BondTorsion) -> bool {
        if self.terms.len() != other.terms.len() {
            return false;
        }
        self.terms.iter().all(|mine| {
            other
                .terms
                .iter()
                .any(|theirs| mine == theirs)
        })
    }
}
