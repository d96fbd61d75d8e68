//! The force-field subsystem: registries, molecule stores, scale factors,
//! and the realization-stage state machine.
//!
//! The subsystem owns everything it references: parameter registries keyed
//! by caller-chosen slots, the atom/bond/cluster stores, and one body view
//! per host body that carries atoms. The multibody host owns the bodies
//! themselves; the subsystem only maps host body indices to its views.
//!
//! Derived state is rebuilt in three observable stages. Topology realizes
//! the permanent caches (neighborhood lists, mixed vdW table, per-atom
//! parameter pointers). Position installs the per-body transforms and marks
//! the force cache invalid. Dynamics computes the kernel on first demand
//! and memoizes energy and per-body spatial forces until the next position
//! write. Any parameter or topology edit drops all three stages.

use crate::core::forcefield::mixing::VdwMixingRule;
use crate::core::forcefield::params::{AtomClass, BondBend, BondStretch, BondTorsion, ChargedAtomType};
use crate::core::models::atom::{Atom, Bond};
use crate::core::models::body::{BodyView, HostBodyIndex, SpatialForce};
use crate::core::models::cluster::Cluster;
use crate::core::models::element::{Color, Element, ElementTable};
use crate::core::models::ids::{AtomClassId, AtomId, BodyId, BondId, ChargedTypeId, ClusterId};
use crate::core::models::tuples::{Pair, Quad, Triple};
use crate::engine::error::ForceFieldError;
use crate::engine::gbsa::ImplicitSolvent;
use nalgebra::{Isometry3, Point3};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Coulomb's constant 1/(4 pi e0) in units that convert e^2/nm to kJ/mol.
pub const COULOMB_CONSTANT: f64 = 138.935456;

/// The realization stage the subsystem has currently reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Edits in progress; no derived caches are valid.
    Construction,
    /// Topology caches are realized.
    Topology,
    /// Per-body transforms are installed; forces not yet computed.
    Position,
    /// Energy and per-body forces are memoized.
    Dynamics,
}

pub struct ForceFieldSubsystem {
    pub(crate) elements: ElementTable,

    // Parameter registries, indexed by caller-chosen slots.
    pub(crate) atom_classes: Vec<Option<AtomClass>>,
    pub(crate) charged_types: Vec<Option<ChargedAtomType>>,
    pub(crate) bond_stretch: BTreeMap<Pair<AtomClassId>, BondStretch>,
    pub(crate) bond_bend: BTreeMap<Triple<AtomClassId>, BondBend>,
    pub(crate) bond_torsion: BTreeMap<Quad<AtomClassId>, BondTorsion>,
    pub(crate) amber_improper_torsion: BTreeMap<Quad<AtomClassId>, BondTorsion>,

    pub(crate) vdw_mixing_rule: VdwMixingRule,

    // Scale factors for nonbonded interactions between atoms nearby in the
    // bond graph. 1-2 and 1-3 default to 0, 1-4 and 1-5 to 1.
    pub(crate) vdw_scale12: f64,
    pub(crate) vdw_scale13: f64,
    pub(crate) vdw_scale14: f64,
    pub(crate) vdw_scale15: f64,
    pub(crate) coulomb_scale12: f64,
    pub(crate) coulomb_scale13: f64,
    pub(crate) coulomb_scale14: f64,
    pub(crate) coulomb_scale15: f64,

    // Global per-term scale factors, for disabling or fiddling with
    // individual contributions.
    pub(crate) vdw_global_scale: f64,
    pub(crate) coulomb_global_scale: f64,
    pub(crate) bond_stretch_global_scale: f64,
    pub(crate) bond_bend_global_scale: f64,
    pub(crate) bond_torsion_global_scale: f64,
    pub(crate) amber_improper_torsion_global_scale: f64,
    pub(crate) gbsa_global_scale: f64,

    pub(crate) gbsa_include_ace: bool,
    pub(crate) gbsa_solute_dielectric: f64,
    pub(crate) gbsa_solvent_dielectric: f64,
    pub(crate) solvent: Option<Box<dyn ImplicitSolvent>>,

    // Molecule stores.
    pub(crate) atoms: Vec<Atom>,
    pub(crate) bonds: Vec<Bond>,
    pub(crate) clusters: Vec<Cluster>,
    pub(crate) bodies: Vec<BodyView>,
    pub(crate) body_by_host: BTreeMap<HostBodyIndex, BodyId>,

    // Stage caches.
    pub(crate) topology_realized: bool,
    pub(crate) position_realized: bool,
    pub(crate) body_transforms: Vec<Isometry3<f64>>,
    pub(crate) force_valid: bool,
    pub(crate) energy_cache: f64,
    pub(crate) force_cache: Vec<SpatialForce>,
}

impl Default for ForceFieldSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ForceFieldSubsystem {
    pub fn new() -> Self {
        let mut subsystem = Self {
            elements: ElementTable::standard(),
            atom_classes: Vec::new(),
            charged_types: Vec::new(),
            bond_stretch: BTreeMap::new(),
            bond_bend: BTreeMap::new(),
            bond_torsion: BTreeMap::new(),
            amber_improper_torsion: BTreeMap::new(),
            vdw_mixing_rule: VdwMixingRule::default(),
            vdw_scale12: 0.0,
            vdw_scale13: 0.0,
            vdw_scale14: 1.0,
            vdw_scale15: 1.0,
            coulomb_scale12: 0.0,
            coulomb_scale13: 0.0,
            coulomb_scale14: 1.0,
            coulomb_scale15: 1.0,
            vdw_global_scale: 1.0,
            coulomb_global_scale: 1.0,
            bond_stretch_global_scale: 1.0,
            bond_bend_global_scale: 1.0,
            bond_torsion_global_scale: 1.0,
            amber_improper_torsion_global_scale: 1.0,
            gbsa_global_scale: 1.0,
            gbsa_include_ace: false,
            gbsa_solute_dielectric: 1.0,
            gbsa_solvent_dielectric: 80.0,
            solvent: None,
            atoms: Vec::new(),
            bonds: Vec::new(),
            clusters: Vec::new(),
            bodies: Vec::new(),
            body_by_host: BTreeMap::new(),
            topology_realized: false,
            position_realized: false,
            body_transforms: Vec::new(),
            force_valid: false,
            energy_cache: 0.0,
            force_cache: Vec::new(),
        };
        // Cluster 0 is reserved for atoms and groups not yet placed.
        let free = subsystem.add_cluster_entry("free atoms and groups");
        debug_assert_eq!(free, ClusterId(0));
        subsystem
    }

    /// Drops every derived cache. Called by all mutating API entries.
    pub(crate) fn invalidate_topology_cache(&mut self) {
        self.topology_realized = false;
        self.position_realized = false;
        self.force_valid = false;
    }

    pub fn stage(&self) -> Stage {
        if self.force_valid {
            Stage::Dynamics
        } else if self.position_realized {
            Stage::Position
        } else if self.topology_realized {
            Stage::Topology
        } else {
            Stage::Construction
        }
    }

    // ----- validity and checked lookups -------------------------------

    pub fn is_valid_element(&self, atomic_number: u32) -> bool {
        self.elements.contains(atomic_number)
    }

    pub fn is_valid_atom_class(&self, class: AtomClassId) -> bool {
        matches!(self.atom_classes.get(class.index()), Some(Some(_)))
    }

    pub fn is_valid_charged_type(&self, charged_type: ChargedTypeId) -> bool {
        matches!(self.charged_types.get(charged_type.index()), Some(Some(_)))
    }

    pub fn is_valid_atom(&self, atom: AtomId) -> bool {
        atom.index() < self.atoms.len()
    }

    pub fn is_valid_bond(&self, bond: BondId) -> bool {
        bond.index() < self.bonds.len()
    }

    pub fn is_valid_cluster(&self, cluster: ClusterId) -> bool {
        cluster.index() < self.clusters.len()
    }

    pub(crate) fn checked_atom(&self, atom: AtomId) -> Result<&Atom, ForceFieldError> {
        self.atoms
            .get(atom.index())
            .ok_or(ForceFieldError::InvalidKey {
                kind: "atom",
                index: atom.index(),
            })
    }

    pub(crate) fn checked_cluster(&self, cluster: ClusterId) -> Result<&Cluster, ForceFieldError> {
        self.clusters
            .get(cluster.index())
            .ok_or(ForceFieldError::InvalidKey {
                kind: "cluster",
                index: cluster.index(),
            })
    }

    pub(crate) fn checked_atom_class(
        &self,
        class: AtomClassId,
    ) -> Result<&AtomClass, ForceFieldError> {
        self.atom_classes
            .get(class.index())
            .and_then(|slot| slot.as_ref())
            .ok_or(ForceFieldError::InvalidKey {
                kind: "atom class",
                index: class.index(),
            })
    }

    pub(crate) fn checked_charged_type(
        &self,
        charged_type: ChargedTypeId,
    ) -> Result<&ChargedAtomType, ForceFieldError> {
        self.charged_types
            .get(charged_type.index())
            .and_then(|slot| slot.as_ref())
            .ok_or(ForceFieldError::InvalidKey {
                kind: "charged atom type",
                index: charged_type.index(),
            })
    }

    /// Atom class of an atom, through its charged type.
    pub(crate) fn class_of_atom(&self, atom: AtomId) -> Result<AtomClassId, ForceFieldError> {
        let charged_type = self.checked_atom(atom)?.charged_type;
        Ok(self.checked_charged_type(charged_type)?.atom_class)
    }

    pub(crate) fn element_of_atom(&self, atom: AtomId) -> Result<&Element, ForceFieldError> {
        let class = self.class_of_atom(atom)?;
        let atomic_number = self.checked_atom_class(class)?.element;
        self.elements
            .get(atomic_number)
            .ok_or(ForceFieldError::InvalidKey {
                kind: "element",
                index: atomic_number as usize,
            })
    }

    // ----- mixing rule and scale factors ------------------------------

    pub fn set_vdw_mixing_rule(&mut self, rule: VdwMixingRule) {
        self.invalidate_topology_cache();
        self.vdw_mixing_rule = rule;
    }

    pub fn vdw_mixing_rule(&self) -> VdwMixingRule {
        self.vdw_mixing_rule
    }

    fn check_fraction(
        name: &'static str,
        factor: f64,
    ) -> Result<(), ForceFieldError> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(ForceFieldError::Range {
                name,
                value: factor,
                requirement: "must be between 0 and 1, inclusive",
            });
        }
        Ok(())
    }

    fn check_nonnegative(name: &'static str, factor: f64) -> Result<(), ForceFieldError> {
        if factor < 0.0 {
            return Err(ForceFieldError::Range {
                name,
                value: factor,
                requirement: "must be nonnegative",
            });
        }
        Ok(())
    }

    /// Sets the van der Waals scale factor for atom pairs `separation`
    /// bonds apart (2 through 5).
    pub fn set_vdw_scale_factor(
        &mut self,
        separation: u32,
        factor: f64,
    ) -> Result<(), ForceFieldError> {
        Self::check_fraction("vdw scale factor", factor)?;
        self.invalidate_topology_cache();
        match separation {
            2 => self.vdw_scale12 = factor,
            3 => self.vdw_scale13 = factor,
            4 => self.vdw_scale14 = factor,
            5 => self.vdw_scale15 = factor,
            _ => {
                return Err(ForceFieldError::Range {
                    name: "bond separation",
                    value: separation as f64,
                    requirement: "must be 2, 3, 4 or 5",
                })
            }
        }
        Ok(())
    }

    /// Sets the Coulomb scale factor for atom pairs `separation` bonds
    /// apart (2 through 5).
    pub fn set_coulomb_scale_factor(
        &mut self,
        separation: u32,
        factor: f64,
    ) -> Result<(), ForceFieldError> {
        Self::check_fraction("coulomb scale factor", factor)?;
        self.invalidate_topology_cache();
        match separation {
            2 => self.coulomb_scale12 = factor,
            3 => self.coulomb_scale13 = factor,
            4 => self.coulomb_scale14 = factor,
            5 => self.coulomb_scale15 = factor,
            _ => {
                return Err(ForceFieldError::Range {
                    name: "bond separation",
                    value: separation as f64,
                    requirement: "must be 2, 3, 4 or 5",
                })
            }
        }
        Ok(())
    }

    pub fn set_vdw_global_scale_factor(&mut self, factor: f64) -> Result<(), ForceFieldError> {
        Self::check_nonnegative("global vdw scale factor", factor)?;
        self.invalidate_topology_cache();
        self.vdw_global_scale = factor;
        Ok(())
    }

    pub fn set_coulomb_global_scale_factor(&mut self, factor: f64) -> Result<(), ForceFieldError> {
        Self::check_nonnegative("global coulomb scale factor", factor)?;
        self.invalidate_topology_cache();
        self.coulomb_global_scale = factor;
        Ok(())
    }

    pub fn set_bond_stretch_global_scale_factor(
        &mut self,
        factor: f64,
    ) -> Result<(), ForceFieldError> {
        Self::check_nonnegative("global bond stretch scale factor", factor)?;
        self.invalidate_topology_cache();
        self.bond_stretch_global_scale = factor;
        Ok(())
    }

    pub fn set_bond_bend_global_scale_factor(
        &mut self,
        factor: f64,
    ) -> Result<(), ForceFieldError> {
        Self::check_nonnegative("global bond bend scale factor", factor)?;
        self.invalidate_topology_cache();
        self.bond_bend_global_scale = factor;
        Ok(())
    }

    pub fn set_bond_torsion_global_scale_factor(
        &mut self,
        factor: f64,
    ) -> Result<(), ForceFieldError> {
        Self::check_nonnegative("global bond torsion scale factor", factor)?;
        self.invalidate_topology_cache();
        self.bond_torsion_global_scale = factor;
        Ok(())
    }

    pub fn set_amber_improper_torsion_global_scale_factor(
        &mut self,
        factor: f64,
    ) -> Result<(), ForceFieldError> {
        Self::check_nonnegative("global improper torsion scale factor", factor)?;
        self.invalidate_topology_cache();
        self.amber_improper_torsion_global_scale = factor;
        Ok(())
    }

    pub fn set_gbsa_global_scale_factor(&mut self, factor: f64) -> Result<(), ForceFieldError> {
        Self::check_nonnegative("global generalized Born scale factor", factor)?;
        self.invalidate_topology_cache();
        self.gbsa_global_scale = factor;
        Ok(())
    }

    pub fn set_gbsa_include_ace_approximation(&mut self, include: bool) {
        self.invalidate_topology_cache();
        self.gbsa_include_ace = include;
    }

    pub fn set_gbsa_solute_dielectric(&mut self, dielectric: f64) -> Result<(), ForceFieldError> {
        Self::check_nonnegative("solute dielectric", dielectric)?;
        self.invalidate_topology_cache();
        self.gbsa_solute_dielectric = dielectric;
        Ok(())
    }

    pub fn set_gbsa_solvent_dielectric(&mut self, dielectric: f64) -> Result<(), ForceFieldError> {
        Self::check_nonnegative("solvent dielectric", dielectric)?;
        self.invalidate_topology_cache();
        self.gbsa_solvent_dielectric = dielectric;
        Ok(())
    }

    /// Installs the external generalized-Born evaluator. Required whenever
    /// the GB global scale factor is nonzero.
    pub fn set_implicit_solvent(&mut self, solvent: Box<dyn ImplicitSolvent>) {
        self.invalidate_topology_cache();
        self.solvent = Some(solvent);
    }

    // ----- stages ------------------------------------------------------

    /// Installs the ground-from-body transform of every host body,
    /// indexed by host body number, and invalidates the force cache.
    pub fn realize_position(
        &mut self,
        transforms: &[Isometry3<f64>],
    ) -> Result<(), ForceFieldError> {
        if !self.topology_realized {
            return Err(ForceFieldError::Stage {
                operation: "realize_position",
                requires: "Topology",
            });
        }
        for body in &self.bodies {
            if body.host_body >= transforms.len() {
                return Err(ForceFieldError::InvalidKey {
                    kind: "host body transform",
                    index: body.host_body,
                });
            }
        }
        self.body_transforms = transforms.to_vec();
        self.position_realized = true;
        self.force_valid = false;
        Ok(())
    }

    /// Computes energy and per-body spatial forces on first demand after a
    /// position change; afterwards the memoized caches are served.
    pub fn realize_dynamics(&mut self) -> Result<(), ForceFieldError> {
        if !self.position_realized {
            return Err(ForceFieldError::Stage {
                operation: "realize_dynamics",
                requires: "Position",
            });
        }
        if !self.force_valid {
            let (energy, forces) = self.compute_forces()?;
            self.energy_cache = energy;
            self.force_cache = forces;
            self.force_valid = true;
        }
        Ok(())
    }

    /// Accumulated potential energy, kJ/mol.
    pub fn potential_energy(&self) -> Result<f64, ForceFieldError> {
        if !self.force_valid {
            return Err(ForceFieldError::Stage {
                operation: "potential_energy",
                requires: "Dynamics",
            });
        }
        Ok(self.energy_cache)
    }

    /// Per-host-body spatial forces in the ground frame, indexed by host
    /// body number.
    pub fn body_spatial_forces(&self) -> Result<&[SpatialForce], ForceFieldError> {
        if !self.force_valid {
            return Err(ForceFieldError::Stage {
                operation: "body_spatial_forces",
                requires: "Dynamics",
            });
        }
        Ok(&self.force_cache)
    }

    /// Adds the memoized energy and forces into host-owned accumulators,
    /// the way the multibody host consumes this subsystem each step.
    pub fn accumulate_into(
        &self,
        potential_energy: &mut f64,
        body_forces: &mut [SpatialForce],
    ) -> Result<(), ForceFieldError> {
        if !self.force_valid {
            return Err(ForceFieldError::Stage {
                operation: "accumulate_into",
                requires: "Dynamics",
            });
        }
        if body_forces.len() < self.force_cache.len() {
            return Err(ForceFieldError::Range {
                name: "body_forces.len()",
                value: body_forces.len() as f64,
                requirement: "must cover every host body the subsystem knows",
            });
        }
        *potential_energy += self.energy_cache;
        for (slot, force) in body_forces.iter_mut().zip(self.force_cache.iter()) {
            *slot += *force;
        }
        Ok(())
    }

    // ----- queries -----------------------------------------------------

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn n_bonds(&self) -> usize {
        self.bonds.len()
    }

    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// One endpoint of a bond; `which` selects 0 or 1.
    pub fn bond_atom(&self, bond: BondId, which: usize) -> Result<AtomId, ForceFieldError> {
        if which > 1 {
            return Err(ForceFieldError::Range {
                name: "which",
                value: which as f64,
                requirement: "must be 0 or 1 to choose one of the two atoms",
            });
        }
        let entry = self
            .bonds
            .get(bond.index())
            .ok_or(ForceFieldError::InvalidKey {
                kind: "bond",
                index: bond.index(),
            })?;
        Ok(entry.atoms.0[which])
    }

    /// Mass in daltons, from the atom's element.
    pub fn atom_mass(&self, atom: AtomId) -> Result<f64, ForceFieldError> {
        Ok(self.element_of_atom(atom)?.mass)
    }

    /// Atomic number of the atom's element.
    pub fn atom_element(&self, atom: AtomId) -> Result<u32, ForceFieldError> {
        Ok(self.element_of_atom(atom)?.atomic_number)
    }

    pub fn atom_default_color(&self, atom: AtomId) -> Result<Color, ForceFieldError> {
        Ok(self.element_of_atom(atom)?.default_color)
    }

    /// Van der Waals radius in nm; requires the atom's class to be
    /// complete.
    pub fn atom_radius(&self, atom: AtomId) -> Result<f64, ForceFieldError> {
        let class = self.class_of_atom(atom)?;
        self.checked_atom_class(class)?
            .vdw_radius
            .ok_or_else(|| {
                ForceFieldError::MissingParameter(format!(
                    "atom class {} has no van der Waals radius",
                    class
                ))
            })
    }

    /// The atom's station fixed in its host body's frame, nm.
    pub fn atom_station_on_body(&self, atom: AtomId) -> Result<Point3<f64>, ForceFieldError> {
        let entry = self.checked_atom(atom)?;
        if !entry.is_attached_to_body() {
            return Err(ForceFieldError::Topology(format!(
                "atom {} is not attached to a body",
                atom
            )));
        }
        Ok(entry.station)
    }

    pub fn atom_body(&self, atom: AtomId) -> Result<HostBodyIndex, ForceFieldError> {
        let entry = self.checked_atom(atom)?;
        entry.body.ok_or_else(|| {
            ForceFieldError::Topology(format!("atom {} is not attached to a body", atom))
        })
    }

    /// The atom's station within a cluster that contains it (directly or
    /// through nesting), in the cluster's frame.
    pub fn atom_station_in_cluster(
        &self,
        atom: AtomId,
        cluster: ClusterId,
    ) -> Result<Point3<f64>, ForceFieldError> {
        self.checked_atom(atom)?;
        let entry = self.checked_cluster(cluster)?;
        entry.all_atoms.get(&atom).copied().ok_or_else(|| {
            ForceFieldError::Topology(format!(
                "cluster {} ('{}') does not contain atom {}",
                cluster, entry.name, atom
            ))
        })
    }

    pub fn cluster_placement_on_body(
        &self,
        cluster: ClusterId,
    ) -> Result<Isometry3<f64>, ForceFieldError> {
        let entry = self.checked_cluster(cluster)?;
        if !entry.is_attached_to_body() {
            return Err(ForceFieldError::Topology(format!(
                "cluster {} ('{}') is not attached to a body",
                cluster, entry.name
            )));
        }
        Ok(entry.placement_on_body)
    }

    pub fn cluster_body(&self, cluster: ClusterId) -> Result<HostBodyIndex, ForceFieldError> {
        let entry = self.checked_cluster(cluster)?;
        entry.body.ok_or_else(|| {
            ForceFieldError::Topology(format!(
                "cluster {} ('{}') is not attached to a body",
                cluster, entry.name
            ))
        })
    }

    /// Placement of a child cluster within a containing cluster, in the
    /// parent's frame.
    pub fn cluster_placement_in_cluster(
        &self,
        child: ClusterId,
        parent: ClusterId,
    ) -> Result<Isometry3<f64>, ForceFieldError> {
        self.checked_cluster(child)?;
        let parent_entry = self.checked_cluster(parent)?;
        parent_entry.all_clusters.get(&child).copied().ok_or_else(|| {
            ForceFieldError::Topology(format!(
                "cluster {} ('{}') does not contain cluster {}",
                parent, parent_entry.name, child
            ))
        })
    }

    /// A human-readable account of the subsystem state, for diagnostics.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "ForceFieldSubsystem: {} bodies, {} clusters, {} atoms, {} classes, {} charged types, {} bonds",
            self.bodies.len(),
            self.clusters.len(),
            self.atoms.len(),
            self.atom_classes.iter().flatten().count(),
            self.charged_types.iter().flatten().count(),
            self.bonds.len()
        );
        let _ = writeln!(out, "  mixing rule: {}", self.vdw_mixing_rule.name());
        for body in &self.bodies {
            let _ = writeln!(
                out,
                "  body {} (cluster {}): {} atoms",
                body.host_body,
                body.cluster,
                body.all_atoms.len()
            );
        }
        for atom in &self.atoms {
            let _ = writeln!(
                out,
                "  atom {}: type {}, body {:?}, 1-2 {:?}",
                atom.atom_id,
                atom.charged_type,
                atom.body,
                atom.bond12.iter().map(|a| a.index()).collect::<Vec<_>>()
            );
        }
        out
    }
}
