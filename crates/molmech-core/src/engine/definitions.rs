//! Parameter definition API: atom classes, charged atom types, and the
//! four bond-term tables.
//!
//! Slots are chosen by the caller; defining into an occupied slot is an
//! error. Angles arrive in degrees and are stored in radians. Every
//! successful write invalidates the realized topology.

use crate::core::forcefield::params::{
    AtomClass, BondBend, BondStretch, BondTorsion, ChargedAtomType, TorsionTerm,
};
use crate::core::models::ids::{AtomClassId, ChargedTypeId};
use crate::core::models::tuples::{Pair, Quad, Triple};
use crate::engine::error::ForceFieldError;
use crate::engine::subsystem::ForceFieldSubsystem;
use std::f64::consts::PI;

/// One torsion term as supplied through the API: phase in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorsionTermSpec {
    pub periodicity: u32,
    pub amplitude: f64,
    pub phase_deg: f64,
}

impl ForceFieldSubsystem {
    // ----- atom classes -----------------------------------------------

    /// Declares an atom class whose van der Waals parameters are not yet
    /// known. The class cannot enter the mixed vdW table until
    /// [`set_atom_class_vdw_parameters`](Self::set_atom_class_vdw_parameters)
    /// completes it.
    pub fn define_incomplete_atom_class(
        &mut self,
        class: AtomClassId,
        name: &str,
        element: u32,
        valence: u32,
    ) -> Result<(), ForceFieldError> {
        self.install_atom_class(class, name, element, valence, None, None)
    }

    /// Declares a fully specified atom class. Radius in nm (at minimum
    /// energy), well depth in kJ/mol, both nonnegative.
    pub fn define_atom_class(
        &mut self,
        class: AtomClassId,
        name: &str,
        element: u32,
        valence: u32,
        vdw_radius: f64,
        vdw_well_depth: f64,
    ) -> Result<(), ForceFieldError> {
        if vdw_radius < 0.0 {
            return Err(ForceFieldError::Range {
                name: "vdw radius",
                value: vdw_radius,
                requirement: "must be nonnegative",
            });
        }
        if vdw_well_depth < 0.0 {
            return Err(ForceFieldError::Range {
                name: "vdw well depth",
                value: vdw_well_depth,
                requirement: "must be nonnegative",
            });
        }
        self.install_atom_class(
            class,
            name,
            element,
            valence,
            Some(vdw_radius),
            Some(vdw_well_depth),
        )
    }

    pub(crate) fn install_atom_class(
        &mut self,
        class: AtomClassId,
        name: &str,
        element: u32,
        valence: u32,
        vdw_radius: Option<f64>,
        vdw_well_depth: Option<f64>,
    ) -> Result<(), ForceFieldError> {
        if !self.is_valid_element(element) {
            return Err(ForceFieldError::InvalidKey {
                kind: "element",
                index: element as usize,
            });
        }
        if self.atom_classes.len() <= class.index() {
            self.atom_classes.resize(class.index() + 1, None);
        }
        if let Some(existing) = &self.atom_classes[class.index()] {
            return Err(ForceFieldError::DuplicateKey {
                kind: "atom class",
                detail: format!("slot {} is already in use for '{}'", class, existing.name),
            });
        }
        self.invalidate_topology_cache();
        self.atom_classes[class.index()] = Some(AtomClass::new(
            class,
            name,
            element,
            valence,
            vdw_radius,
            vdw_well_depth,
        ));
        Ok(())
    }

    /// Completes (or updates) the van der Waals parameters of a declared
    /// atom class.
    pub fn set_atom_class_vdw_parameters(
        &mut self,
        class: AtomClassId,
        vdw_radius: f64,
        vdw_well_depth: f64,
    ) -> Result<(), ForceFieldError> {
        if vdw_radius < 0.0 {
            return Err(ForceFieldError::Range {
                name: "vdw radius",
                value: vdw_radius,
                requirement: "must be nonnegative",
            });
        }
        if vdw_well_depth < 0.0 {
            return Err(ForceFieldError::Range {
                name: "vdw well depth",
                value: vdw_well_depth,
                requirement: "must be nonnegative",
            });
        }
        self.checked_atom_class(class)?;
        self.invalidate_topology_cache();
        if let Some(slot) = self.atom_classes[class.index()].as_mut() {
            slot.vdw_radius = Some(vdw_radius);
            slot.vdw_well_depth = Some(vdw_well_depth);
        }
        Ok(())
    }

    // ----- charged atom types -----------------------------------------

    /// Declares a charged atom type whose partial charge is not yet known.
    pub fn define_incomplete_charged_atom_type(
        &mut self,
        charged_type: ChargedTypeId,
        name: &str,
        class: AtomClassId,
    ) -> Result<(), ForceFieldError> {
        self.install_charged_type(charged_type, name, class, None)
    }

    /// Declares a charged atom type: a chemical environment binding an
    /// atom class to a partial charge in units of the proton charge.
    pub fn define_charged_atom_type(
        &mut self,
        charged_type: ChargedTypeId,
        name: &str,
        class: AtomClassId,
        partial_charge: f64,
    ) -> Result<(), ForceFieldError> {
        self.install_charged_type(charged_type, name, class, Some(partial_charge))
    }

    pub(crate) fn install_charged_type(
        &mut self,
        charged_type: ChargedTypeId,
        name: &str,
        class: AtomClassId,
        partial_charge: Option<f64>,
    ) -> Result<(), ForceFieldError> {
        self.checked_atom_class(class)?;
        if self.charged_types.len() <= charged_type.index() {
            self.charged_types.resize(charged_type.index() + 1, None);
        }
        if let Some(existing) = &self.charged_types[charged_type.index()] {
            return Err(ForceFieldError::DuplicateKey {
                kind: "charged atom type",
                detail: format!(
                    "slot {} is already in use for '{}'",
                    charged_type, existing.name
                ),
            });
        }
        self.invalidate_topology_cache();
        self.charged_types[charged_type.index()] = Some(ChargedAtomType::new(
            charged_type,
            name,
            class,
            partial_charge,
        ));
        Ok(())
    }

    /// Completes (or updates) the partial charge of a declared type.
    pub fn set_charged_atom_type_charge(
        &mut self,
        charged_type: ChargedTypeId,
        partial_charge: f64,
    ) -> Result<(), ForceFieldError> {
        self.checked_charged_type(charged_type)?;
        self.invalidate_topology_cache();
        if let Some(slot) = self.charged_types[charged_type.index()].as_mut() {
            slot.partial_charge = Some(partial_charge);
        }
        Ok(())
    }

    // ----- bond stretch -----------------------------------------------

    /// Defines the harmonic stretch term for a pair of atom classes.
    /// Stiffness in kJ/mol per nm^2, nominal length in nm; the energy
    /// carries no factor of one half.
    pub fn define_bond_stretch(
        &mut self,
        class1: AtomClassId,
        class2: AtomClassId,
        stiffness: f64,
        nominal_length: f64,
    ) -> Result<(), ForceFieldError> {
        self.checked_atom_class(class1)?;
        self.checked_atom_class(class2)?;
        if stiffness < 0.0 {
            return Err(ForceFieldError::Range {
                name: "stiffness",
                value: stiffness,
                requirement: "must be nonnegative",
            });
        }
        if nominal_length < 0.0 {
            return Err(ForceFieldError::Range {
                name: "nominal length",
                value: nominal_length,
                requirement: "must be nonnegative",
            });
        }
        let key = Pair::canonical(class1, class2);
        if self.bond_stretch.contains_key(&key) {
            return Err(ForceFieldError::DuplicateKey {
                kind: "bond stretch",
                detail: format!("atom class pair ({},{})", key.0[0], key.0[1]),
            });
        }
        self.invalidate_topology_cache();
        self.bond_stretch.insert(
            key,
            BondStretch {
                classes: key,
                k: stiffness,
                d0: nominal_length,
            },
        );
        Ok(())
    }

    // ----- bond bend --------------------------------------------------

    /// Defines the harmonic bend term for a triple of atom classes, the
    /// central class in the middle. Stiffness in kJ/mol per rad^2, nominal
    /// angle in degrees within [0, 180].
    pub fn define_bond_bend(
        &mut self,
        class1: AtomClassId,
        class2: AtomClassId,
        class3: AtomClassId,
        stiffness: f64,
        nominal_angle_deg: f64,
    ) -> Result<(), ForceFieldError> {
        if !(0.0..=180.0).contains(&nominal_angle_deg) {
            return Err(ForceFieldError::Range {
                name: "nominal angle",
                value: nominal_angle_deg,
                requirement: "must be between 0 and 180 degrees, inclusive",
            });
        }
        self.define_bond_bend_rad(
            class1,
            class2,
            class3,
            stiffness,
            nominal_angle_deg.to_radians(),
        )
    }

    pub(crate) fn define_bond_bend_rad(
        &mut self,
        class1: AtomClassId,
        class2: AtomClassId,
        class3: AtomClassId,
        stiffness: f64,
        nominal_angle: f64,
    ) -> Result<(), ForceFieldError> {
        self.checked_atom_class(class1)?;
        self.checked_atom_class(class2)?;
        self.checked_atom_class(class3)?;
        if stiffness < 0.0 {
            return Err(ForceFieldError::Range {
                name: "stiffness",
                value: stiffness,
                requirement: "must be nonnegative",
            });
        }
        if !(0.0..=PI).contains(&nominal_angle) {
            return Err(ForceFieldError::Range {
                name: "nominal angle",
                value: nominal_angle,
                requirement: "must be between 0 and pi radians, inclusive",
            });
        }
        let key = Triple::canonical(class1, class2, class3);
        if self.bond_bend.contains_key(&key) {
            return Err(ForceFieldError::DuplicateKey {
                kind: "bond bend",
                detail: format!(
                    "atom class triple ({},{},{})",
                    key.0[0], key.0[1], key.0[2]
                ),
            });
        }
        self.invalidate_topology_cache();
        self.bond_bend.insert(
            key,
            BondBend {
                classes: key,
                k: stiffness,
                theta0: nominal_angle,
            },
        );
        Ok(())
    }

    // ----- torsions ---------------------------------------------------

    /// Invariant checks shared by the degree-based API and script replay:
    /// one to three terms, periodicities 1..=6 and pairwise distinct,
    /// nonnegative amplitudes, phases within [0, pi].
    pub(crate) fn check_torsion_terms(terms: &[TorsionTerm]) -> Result<(), ForceFieldError> {
        if terms.is_empty() || terms.len() > 3 {
            return Err(ForceFieldError::Range {
                name: "torsion term count",
                value: terms.len() as f64,
                requirement: "must supply between one and three torsion terms",
            });
        }
        for (i, term) in terms.iter().enumerate() {
            if !(1..=6).contains(&term.periodicity) {
                return Err(ForceFieldError::Range {
                    name: "periodicity",
                    value: term.periodicity as f64,
                    requirement: "must satisfy 1 <= periodicity <= 6",
                });
            }
            if term.amplitude < 0.0 {
                return Err(ForceFieldError::Range {
                    name: "amplitude",
                    value: term.amplitude,
                    requirement: "must be nonnegative",
                });
            }
            if !(0.0..=PI).contains(&term.phase) {
                return Err(ForceFieldError::Range {
                    name: "phase angle",
                    value: term.phase,
                    requirement: "must be between 0 and pi radians, inclusive",
                });
            }
            if terms[..i].iter().any(|t| t.periodicity == term.periodicity) {
                return Err(ForceFieldError::Range {
                    name: "periodicity",
                    value: term.periodicity as f64,
                    requirement: "only one term with a given periodicity may be specified",
                });
            }
        }
        Ok(())
    }

    fn validated_terms(terms: &[TorsionTermSpec]) -> Result<Vec<TorsionTerm>, ForceFieldError> {
        if terms.is_empty() || terms.len() > 3 {
            return Err(ForceFieldError::Range {
                name: "torsion term count",
                value: terms.len() as f64,
                requirement: "must supply between one and three torsion terms",
            });
        }
        let mut out = Vec::with_capacity(terms.len());
        for (i, term) in terms.iter().enumerate() {
            if !(1..=6).contains(&term.periodicity) {
                return Err(ForceFieldError::Range {
                    name: "periodicity",
                    value: term.periodicity as f64,
                    requirement: "must satisfy 1 <= periodicity <= 6",
                });
            }
            if term.amplitude < 0.0 {
                return Err(ForceFieldError::Range {
                    name: "amplitude",
                    value: term.amplitude,
                    requirement: "must be nonnegative",
                });
            }
            if !(0.0..=180.0).contains(&term.phase_deg) {
                return Err(ForceFieldError::Range {
                    name: "phase angle",
                    value: term.phase_deg,
                    requirement: "must be between 0 and 180 degrees, inclusive",
                });
            }
            if terms[..i].iter().any(|t| t.periodicity == term.periodicity) {
                return Err(ForceFieldError::Range {
                    name: "periodicity",
                    value: term.periodicity as f64,
                    requirement: "only one term with a given periodicity may be specified",
                });
            }
            out.push(TorsionTerm {
                periodicity: term.periodicity,
                amplitude: term.amplitude,
                phase: term.phase_deg.to_radians(),
            });
        }
        Ok(out)
    }

    /// Defines a proper torsion over four atom classes, canonicalized so a
    /// quad and its reversal share one entry. Re-defining an existing
    /// torsion with an identical term set is accepted silently; any
    /// difference is an error.
    pub fn define_bond_torsion(
        &mut self,
        class1: AtomClassId,
        class2: AtomClassId,
        class3: AtomClassId,
        class4: AtomClassId,
        terms: &[TorsionTermSpec],
    ) -> Result<(), ForceFieldError> {
        let terms = Self::validated_terms(terms)?;
        self.define_bond_torsion_rad(class1, class2, class3, class4, terms)
    }

    pub(crate) fn define_bond_torsion_rad(
        &mut self,
        class1: AtomClassId,
        class2: AtomClassId,
        class3: AtomClassId,
        class4: AtomClassId,
        terms: Vec<TorsionTerm>,
    ) -> Result<(), ForceFieldError> {
        Self::check_torsion_terms(&terms)?;
        self.checked_atom_class(class1)?;
        self.checked_atom_class(class2)?;
        self.checked_atom_class(class3)?;
        self.checked_atom_class(class4)?;

        let key = Quad::canonical(class1, class2, class3, class4);
        let torsion = BondTorsion::new(key, terms);
        if let Some(existing) = self.bond_torsion.get(&key) {
            if existing.same_terms(&torsion) {
                return Ok(());
            }
            return Err(ForceFieldError::DuplicateKey {
                kind: "bond torsion",
                detail: format!(
                    "atom class quad ({},{},{},{}) with differing terms",
                    key.0[0], key.0[1], key.0[2], key.0[3]
                ),
            });
        }
        self.invalidate_topology_cache();
        self.bond_torsion.insert(key, torsion);
        Ok(())
    }

    /// Defines an AMBER-style improper torsion. The quad is *not*
    /// canonicalized: atom order matters, and the third slot names the
    /// central (three-coordinate) atom class by convention.
    pub fn define_amber_improper_torsion(
        &mut self,
        class1: AtomClassId,
        class2: AtomClassId,
        class3: AtomClassId,
        class4: AtomClassId,
        terms: &[TorsionTermSpec],
    ) -> Result<(), ForceFieldError> {
        let terms = Self::validated_terms(terms)?;
        self.define_amber_improper_torsion_rad(class1, class2, class3, class4, terms)
    }

    pub(crate) fn define_amber_improper_torsion_rad(
        &mut self,
        class1: AtomClassId,
        class2: AtomClassId,
        class3: AtomClassId,
        class4: AtomClassId,
        terms: Vec<TorsionTerm>,
    ) -> Result<(), ForceFieldError> {
        Self::check_torsion_terms(&terms)?;
        self.checked_atom_class(class1)?;
        self.checked_atom_class(class2)?;
        self.checked_atom_class(class3)?;
        self.checked_atom_class(class4)?;

        let key = Quad::new(class1, class2, class3, class4);
        if self.amber_improper_torsion.contains_key(&key) {
            return Err(ForceFieldError::DuplicateKey {
                kind: "amber improper torsion",
                detail: format!(
                    "atom class quad ({},{},{},{})",
                    key.0[0], key.0[1], key.0[2], key.0[3]
                ),
            });
        }
        self.invalidate_topology_cache();
        self.amber_improper_torsion
            .insert(key, BondTorsion::new(key, terms));
        Ok(())
    }
}
