//! Parameter persistence.
//!
//! The only serialization format of the subsystem is a self-describing
//! sequence of API calls: emitting walks the registries in a fixed order
//! and produces a TOML document of `[[call]]` entries; replaying parses
//! the document and pushes every call back through the definition API.
//! Replaying an emission into a fresh subsystem reproduces the parameter
//! set exactly, so a second emission is byte-identical to the first.
//!
//! Angles are recorded in radians, the subsystem's internal unit, so the
//! emit/replay cycle never converts a value.

use crate::core::forcefield::mixing::VdwMixingRule;
use crate::core::forcefield::params::TorsionTerm;
use crate::core::models::ids::{AtomClassId, ChargedTypeId};
use crate::engine::error::ForceFieldError;
use crate::engine::subsystem::ForceFieldSubsystem;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ScriptTorsionTerm {
    periodicity: u32,
    amplitude: f64,
    /// Radians.
    phase: f64,
}

impl From<&TorsionTerm> for ScriptTorsionTerm {
    fn from(term: &TorsionTerm) -> Self {
        Self {
            periodicity: term.periodicity,
            amplitude: term.amplitude,
            phase: term.phase,
        }
    }
}

impl From<ScriptTorsionTerm> for TorsionTerm {
    fn from(term: ScriptTorsionTerm) -> Self {
        Self {
            periodicity: term.periodicity,
            amplitude: term.amplitude,
            phase: term.phase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GlobalTerm {
    Vdw,
    Coulomb,
    BondStretch,
    BondBend,
    BondTorsion,
    AmberImproperTorsion,
    Gbsa,
}

/// One recorded API call. The `op` tag makes the sequence self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ApiCall {
    DefineAtomClass {
        class: usize,
        name: String,
        element: u32,
        valence: u32,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        vdw_radius: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        vdw_well_depth: Option<f64>,
    },
    DefineChargedAtomType {
        charged_type: usize,
        name: String,
        class: usize,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        partial_charge: Option<f64>,
    },
    DefineBondStretch {
        class1: usize,
        class2: usize,
        stiffness: f64,
        nominal_length: f64,
    },
    DefineBondBend {
        class1: usize,
        class2: usize,
        class3: usize,
        stiffness: f64,
        /// Radians.
        nominal_angle: f64,
    },
    DefineBondTorsion {
        class1: usize,
        class2: usize,
        class3: usize,
        class4: usize,
        terms: Vec<ScriptTorsionTerm>,
    },
    DefineAmberImproperTorsion {
        class1: usize,
        class2: usize,
        class3: usize,
        class4: usize,
        terms: Vec<ScriptTorsionTerm>,
    },
    SetVdwMixingRule {
        rule: VdwMixingRule,
    },
    SetVdwScaleFactor {
        separation: u32,
        factor: f64,
    },
    SetCoulombScaleFactor {
        separation: u32,
        factor: f64,
    },
    SetGlobalScaleFactor {
        term: GlobalTerm,
        factor: f64,
    },
    SetGbsaIncludeAceApproximation {
        include: bool,
    },
    SetGbsaSoluteDielectric {
        dielectric: f64,
    },
    SetGbsaSolventDielectric {
        dielectric: f64,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ParameterScript {
    call: Vec<ApiCall>,
}

impl ForceFieldSubsystem {
    /// Emits the full parameter set (registries, bond tables, mixing
    /// rule, every scale factor and GB setting) as a replayable script.
    pub fn emit_parameters(&self) -> Result<String, ForceFieldError> {
        let mut call = Vec::new();

        for class in self.atom_classes.iter().flatten() {
            call.push(ApiCall::DefineAtomClass {
                class: class.class_id.index(),
                name: class.name.clone(),
                element: class.element,
                valence: class.valence,
                vdw_radius: class.vdw_radius,
                vdw_well_depth: class.vdw_well_depth,
            });
        }
        for charged in self.charged_types.iter().flatten() {
            call.push(ApiCall::DefineChargedAtomType {
                charged_type: charged.type_id.index(),
                name: charged.name.clone(),
                class: charged.atom_class.index(),
                partial_charge: charged.partial_charge,
            });
        }
        for entry in self.bond_stretch.values() {
            call.push(ApiCall::DefineBondStretch {
                class1: entry.classes.0[0].index(),
                class2: entry.classes.0[1].index(),
                stiffness: entry.k,
                nominal_length: entry.d0,
            });
        }
        for entry in self.bond_bend.values() {
            call.push(ApiCall::DefineBondBend {
                class1: entry.classes.0[0].index(),
                class2: entry.classes.0[1].index(),
                class3: entry.classes.0[2].index(),
                stiffness: entry.k,
                nominal_angle: entry.theta0,
            });
        }
        for entry in self.bond_torsion.values() {
            call.push(ApiCall::DefineBondTorsion {
                class1: entry.classes.0[0].index(),
                class2: entry.classes.0[1].index(),
                class3: entry.classes.0[2].index(),
                class4: entry.classes.0[3].index(),
                terms: entry.terms.iter().map(ScriptTorsionTerm::from).collect(),
            });
        }
        for entry in self.amber_improper_torsion.values() {
            call.push(ApiCall::DefineAmberImproperTorsion {
                class1: entry.classes.0[0].index(),
                class2: entry.classes.0[1].index(),
                class3: entry.classes.0[2].index(),
                class4: entry.classes.0[3].index(),
                terms: entry.terms.iter().map(ScriptTorsionTerm::from).collect(),
            });
        }

        call.push(ApiCall::SetVdwMixingRule {
            rule: self.vdw_mixing_rule,
        });
        for (separation, factor) in [
            (2, self.vdw_scale12),
            (3, self.vdw_scale13),
            (4, self.vdw_scale14),
            (5, self.vdw_scale15),
        ] {
            call.push(ApiCall::SetVdwScaleFactor { separation, factor });
        }
        for (separation, factor) in [
            (2, self.coulomb_scale12),
            (3, self.coulomb_scale13),
            (4, self.coulomb_scale14),
            (5, self.coulomb_scale15),
        ] {
            call.push(ApiCall::SetCoulombScaleFactor { separation, factor });
        }
        for (term, factor) in [
            (GlobalTerm::Vdw, self.vdw_global_scale),
            (GlobalTerm::Coulomb, self.coulomb_global_scale),
            (GlobalTerm::BondStretch, self.bond_stretch_global_scale),
            (GlobalTerm::BondBend, self.bond_bend_global_scale),
            (GlobalTerm::BondTorsion, self.bond_torsion_global_scale),
            (
                GlobalTerm::AmberImproperTorsion,
                self.amber_improper_torsion_global_scale,
            ),
            (GlobalTerm::Gbsa, self.gbsa_global_scale),
        ] {
            call.push(ApiCall::SetGlobalScaleFactor { term, factor });
        }
        call.push(ApiCall::SetGbsaIncludeAceApproximation {
            include: self.gbsa_include_ace,
        });
        call.push(ApiCall::SetGbsaSoluteDielectric {
            dielectric: self.gbsa_solute_dielectric,
        });
        call.push(ApiCall::SetGbsaSolventDielectric {
            dielectric: self.gbsa_solvent_dielectric,
        });

        Ok(toml::to_string(&ParameterScript { call })?)
    }

    /// Replays a parameter script through the definition API. Typically
    /// applied to a fresh subsystem; replaying into one that already
    /// holds conflicting definitions fails like the equivalent calls.
    pub fn replay_parameters(&mut self, script: &str) -> Result<(), ForceFieldError> {
        let script: ParameterScript = toml::from_str(script)?;
        for call in script.call {
            self.apply_call(call)?;
        }
        Ok(())
    }

    fn apply_call(&mut self, call: ApiCall) -> Result<(), ForceFieldError> {
        match call {
            ApiCall::DefineAtomClass {
                class,
                name,
                element,
                valence,
                vdw_radius,
                vdw_well_depth,
            } => self.install_atom_class(
                AtomClassId(class),
                &name,
                element,
                valence,
                vdw_radius,
                vdw_well_depth,
            ),
            ApiCall::DefineChargedAtomType {
                charged_type,
                name,
                class,
                partial_charge,
            } => self.install_charged_type(
                ChargedTypeId(charged_type),
                &name,
                AtomClassId(class),
                partial_charge,
            ),
            ApiCall::DefineBondStretch {
                class1,
                class2,
                stiffness,
                nominal_length,
            } => self.define_bond_stretch(
                AtomClassId(class1),
                AtomClassId(class2),
                stiffness,
                nominal_length,
            ),
            ApiCall::DefineBondBend {
                class1,
                class2,
                class3,
                stiffness,
                nominal_angle,
            } => self.define_bond_bend_rad(
                AtomClassId(class1),
                AtomClassId(class2),
                AtomClassId(class3),
                stiffness,
                nominal_angle,
            ),
            ApiCall::DefineBondTorsion {
                class1,
                class2,
                class3,
                class4,
                terms,
            } => self.define_bond_torsion_rad(
                AtomClassId(class1),
                AtomClassId(class2),
                AtomClassId(class3),
                AtomClassId(class4),
                terms.into_iter().map(TorsionTerm::from).collect(),
            ),
            ApiCall::DefineAmberImproperTorsion {
                class1,
                class2,
                class3,
                class4,
                terms,
            } => self.define_amber_improper_torsion_rad(
                AtomClassId(class1),
                AtomClassId(class2),
                AtomClassId(class3),
                AtomClassId(class4),
                terms.into_iter().map(TorsionTerm::from).collect(),
            ),
            ApiCall::SetVdwMixingRule { rule } => {
                self.set_vdw_mixing_rule(rule);
                Ok(())
            }
            ApiCall::SetVdwScaleFactor { separation, factor } => {
                self.set_vdw_scale_factor(separation, factor)
            }
            ApiCall::SetCoulombScaleFactor { separation, factor } => {
                self.set_coulomb_scale_factor(separation, factor)
            }
            ApiCall::SetGlobalScaleFactor { term, factor } => match term {
                GlobalTerm::Vdw => self.set_vdw_global_scale_factor(factor),
                GlobalTerm::Coulomb => self.set_coulomb_global_scale_factor(factor),
                GlobalTerm::BondStretch => self.set_bond_stretch_global_scale_factor(factor),
                GlobalTerm::BondBend => self.set_bond_bend_global_scale_factor(factor),
                GlobalTerm::BondTorsion => self.set_bond_torsion_global_scale_factor(factor),
                GlobalTerm::AmberImproperTorsion => {
                    self.set_amber_improper_torsion_global_scale_factor(factor)
                }
                GlobalTerm::Gbsa => self.set_gbsa_global_scale_factor(factor),
            },
            ApiCall::SetGbsaIncludeAceApproximation { include } => {
                self.set_gbsa_include_ace_approximation(include);
                Ok(())
            }
            ApiCall::SetGbsaSoluteDielectric { dielectric } => {
                self.set_gbsa_solute_dielectric(dielectric)
            }
            ApiCall::SetGbsaSolventDielectric { dielectric } => {
                self.set_gbsa_solvent_dielectric(dielectric)
            }
        }
    }
}
