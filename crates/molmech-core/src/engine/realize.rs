//! Topology realization: builds every derived cache the kernel consumes.
//!
//! The pass validates the atom population, rebuilds the mixed van der
//! Waals table, flattens cluster trees into per-body atom lists, derives
//! the bonded neighborhoods of every atom, filters them down to the
//! cross-body subsets, and resolves bonded parameters so the kernel never
//! touches the parameter tables.
//!
//! Two neighborhood families are built side by side. The `bond1N` lists
//! enumerate every simple path (no repeated atom) of the given length; the
//! `short_path1N` lists record only the first path found to each atom by
//! breadth-first expansion, sharing one visited set so a target lands in
//! at most one of the three lists.

use crate::core::models::ids::{AtomClassId, AtomId};
use crate::core::models::body::AtomPlacement;
use crate::core::models::tuples::{Pair, Quad, Triple};
use crate::engine::error::ForceFieldError;
use crate::engine::subsystem::ForceFieldSubsystem;
use itertools::Itertools;
use std::collections::BTreeSet;
use tracing::{debug, instrument};

impl ForceFieldSubsystem {
    #[instrument(skip_all, name = "realize_topology")]
    pub fn realize_topology(&mut self) -> Result<(), ForceFieldError> {
        // Every atom needs a fully defined charged type, and the type's
        // class must be complete so the mixed vdW table covers it.
        for atom in &self.atoms {
            let charged = self.checked_charged_type(atom.charged_type)?;
            if charged.partial_charge.is_none() {
                return Err(ForceFieldError::MissingParameter(format!(
                    "charged atom type {} ('{}') has no partial charge",
                    charged.type_id, charged.name
                )));
            }
            let class = self.checked_atom_class(charged.atom_class)?;
            if !class.is_complete() {
                return Err(ForceFieldError::MissingParameter(format!(
                    "atom class {} ('{}') has no van der Waals parameters",
                    class.class_id, class.name
                )));
            }
        }

        for atom in &mut self.atoms {
            atom.invalidate_topological_cache();
        }
        for body in &mut self.bodies {
            body.invalidate_topological_cache();
        }
        for class in self.atom_classes.iter_mut().flatten() {
            class.invalidate_topological_cache();
        }

        self.build_mixed_vdw_table();
        self.flatten_bodies();
        self.assign_atom_bodies()?;
        self.build_neighborhoods();
        self.resolve_bonded_parameters()?;

        debug!(
            atoms = self.atoms.len(),
            bonds = self.bonds.len(),
            bodies = self.bodies.len(),
            "topology realized"
        );
        self.topology_realized = true;
        Ok(())
    }

    /// Mixed vdW parameters for every ordered pair of complete classes,
    /// stored on the lower-numbered class in a triangular layout indexed
    /// by the class-number difference.
    fn build_mixed_vdw_table(&mut self) {
        let n_classes = self.atom_classes.len();
        let rule = self.vdw_mixing_rule;
        for i in 0..n_classes {
            let (ri, ei) = match &self.atom_classes[i] {
                Some(class) => match (class.vdw_radius, class.vdw_well_depth) {
                    (Some(r), Some(e)) => (r, e),
                    _ => continue,
                },
                None => continue,
            };
            let mut dij = vec![f64::NAN; n_classes - i];
            let mut eij = vec![f64::NAN; n_classes - i];
            for j in i..n_classes {
                if let Some(other) = &self.atom_classes[j] {
                    if let (Some(rj), Some(ej)) = (other.vdw_radius, other.vdw_well_depth) {
                        let (d, e) = rule.combine(ri, rj, ei, ej);
                        dij[j - i] = d;
                        eij[j - i] = e;
                    }
                }
            }
            if let Some(class) = self.atom_classes[i].as_mut() {
                class.vdw_dij = dij;
                class.vdw_eij = eij;
            }
        }
    }

    /// Flattens each body's cluster closure into an atom-id-sorted list of
    /// placements in the body frame.
    fn flatten_bodies(&mut self) {
        for body in &mut self.bodies {
            let cluster = &self.clusters[body.cluster.index()];
            body.all_atoms = cluster
                .all_atoms
                .iter()
                .map(|(&atom, &station)| AtomPlacement { atom, station })
                .collect();
        }
    }

    /// Re-derives every atom's body assignment from the body views and
    /// fails if any atom is left without one (or claimed twice).
    fn assign_atom_bodies(&mut self) -> Result<(), ForceFieldError> {
        for atom in &mut self.atoms {
            atom.body = None;
        }
        for body_ix in 0..self.bodies.len() {
            let host = self.bodies[body_ix].host_body;
            for placement_ix in 0..self.bodies[body_ix].all_atoms.len() {
                let placement = self.bodies[body_ix].all_atoms[placement_ix];
                let atom = &mut self.atoms[placement.atom.index()];
                if atom.body.is_some() {
                    return Err(ForceFieldError::Topology(format!(
                        "atom {} is contained in more than one body",
                        placement.atom
                    )));
                }
                atom.body = Some(host);
                atom.station = placement.station;
            }
        }
        for atom in &self.atoms {
            if atom.body.is_none() {
                return Err(ForceFieldError::Topology(format!(
                    "atom {} is not attached to any body",
                    atom.atom_id
                )));
            }
        }
        Ok(())
    }

    /// Builds the 1-3 through 1-5 neighborhoods, the shortest-path
    /// variants, the three-neighbor center record, and their cross-body
    /// subsets.
    fn build_neighborhoods(&mut self) {
        for atom in &mut self.atoms {
            atom.bond12.sort_unstable();
        }
        let adjacency: Vec<Vec<AtomId>> = self.atoms.iter().map(|a| a.bond12.clone()).collect();
        let body_of: Vec<_> = self.atoms.iter().map(|a| a.body).collect();

        for anum in 0..self.atoms.len() {
            let focal = AtomId(anum);
            let neighbors = &adjacency[anum];

            // One visited set serves all three shortest-path lists, so
            // each reachable atom lands in exactly one of them.
            let mut visited: BTreeSet<AtomId> = BTreeSet::new();
            visited.insert(focal);
            visited.extend(neighbors.iter().copied());

            let mut bond13 = Vec::new();
            let mut short_path13 = Vec::new();
            for &a2 in neighbors {
                for &a3 in &adjacency[a2.index()] {
                    if a3 == focal {
                        continue; // no loop backs
                    }
                    bond13.push(Pair::new(a2, a3));
                    if visited.insert(a3) {
                        short_path13.push(Pair::new(a2, a3));
                    }
                }
            }
            bond13.sort_unstable();
            short_path13.sort_unstable();

            let mut bond14 = Vec::new();
            for path in &bond13 {
                let [a2, a3] = path.0;
                for &a4 in &adjacency[a3.index()] {
                    if a4 != focal && a4 != a2 {
                        bond14.push(Triple::new(a2, a3, a4));
                    }
                }
            }
            bond14.sort_unstable();

            let mut short_path14 = Vec::new();
            for path in &short_path13 {
                let [a2, a3] = path.0;
                for &a4 in &adjacency[a3.index()] {
                    if visited.insert(a4) {
                        short_path14.push(Triple::new(a2, a3, a4));
                    }
                }
            }
            short_path14.sort_unstable();

            let mut bond15 = Vec::new();
            for path in &bond14 {
                let [a2, a3, a4] = path.0;
                for &a5 in &adjacency[a4.index()] {
                    if a5 != focal && a5 != a2 && a5 != a3 {
                        bond15.push(Quad::new(a2, a3, a4, a5));
                    }
                }
            }
            bond15.sort_unstable();

            let mut short_path15 = Vec::new();
            for path in &short_path14 {
                let [a2, a3, a4] = path.0;
                for &a5 in &adjacency[a4.index()] {
                    if visited.insert(a5) {
                        short_path15.push(Quad::new(a2, a3, a4, a5));
                    }
                }
            }
            short_path15.sort_unstable();

            let bonds3_atoms = (neighbors.len() == 3)
                .then(|| Triple::new(neighbors[0], neighbors[1], neighbors[2]));

            // Cross-body subsets: keep a tuple iff any member rides a body
            // other than the focal atom's.
            let my_body = body_of[anum];
            let crosses1 = |a: &AtomId| body_of[a.index()] != my_body;
            let xbond12: Vec<_> = neighbors.iter().copied().filter(crosses1).collect();
            let cross2 = |p: &&Pair<AtomId>| p.0.iter().any(|a| body_of[a.index()] != my_body);
            let cross3 = |t: &&Triple<AtomId>| t.0.iter().any(|a| body_of[a.index()] != my_body);
            let cross4 = |q: &&Quad<AtomId>| q.0.iter().any(|a| body_of[a.index()] != my_body);

            let xbond13: Vec<_> = bond13.iter().filter(cross2).copied().collect();
            let xshort_path13: Vec<_> = short_path13.iter().filter(cross2).copied().collect();
            let xbond14: Vec<_> = bond14.iter().filter(cross3).copied().collect();
            let xshort_path14: Vec<_> = short_path14.iter().filter(cross3).copied().collect();
            let xbond15: Vec<_> = bond15.iter().filter(cross4).copied().collect();
            let xshort_path15: Vec<_> = short_path15.iter().filter(cross4).copied().collect();
            let xbonds3_atoms = bonds3_atoms
                .filter(|t| t.0.iter().any(|a| body_of[a.index()] != my_body));

            let atom = &mut self.atoms[anum];
            atom.bond13 = bond13;
            atom.bond14 = bond14;
            atom.bond15 = bond15;
            atom.short_path13 = short_path13;
            atom.short_path14 = short_path14;
            atom.short_path15 = short_path15;
            atom.bonds3_atoms = bonds3_atoms;
            atom.xbond12 = xbond12;
            atom.xbond13 = xbond13;
            atom.xbond14 = xbond14;
            atom.xbond15 = xbond15;
            atom.xshort_path13 = xshort_path13;
            atom.xshort_path14 = xshort_path14;
            atom.xshort_path15 = xshort_path15;
            atom.xbonds3_atoms = xbonds3_atoms;
        }
    }

    /// Looks up and stores a parameter entry for every cross-body bonded
    /// tuple; a gap in the tables is fatal here rather than in the kernel.
    fn resolve_bonded_parameters(&mut self) -> Result<(), ForceFieldError> {
        let mut class_of = Vec::with_capacity(self.atoms.len());
        for atom in &self.atoms {
            class_of.push(self.checked_charged_type(atom.charged_type)?.atom_class);
        }
        let class = |a: AtomId| -> AtomClassId { class_of[a.index()] };

        for anum in 0..self.atoms.len() {
            let focal_class = class_of[anum];

            let xbond12 = self.atoms[anum].xbond12.clone();
            let mut stretch = Vec::with_capacity(xbond12.len());
            for &a2 in &xbond12 {
                let key = Pair::canonical(focal_class, class(a2));
                let entry = self.bond_stretch.get(&key).copied().ok_or_else(|| {
                    ForceFieldError::MissingParameter(format!(
                        "no bond stretch term for cross-body atom class pair ({},{})",
                        key.0[0], key.0[1]
                    ))
                })?;
                stretch.push(entry);
            }

            let xbond13 = self.atoms[anum].xbond13.clone();
            let mut bend = Vec::with_capacity(xbond13.len());
            for path in &xbond13 {
                let key = Triple::canonical(focal_class, class(path.0[0]), class(path.0[1]));
                let entry = self.bond_bend.get(&key).copied().ok_or_else(|| {
                    ForceFieldError::MissingParameter(format!(
                        "no bond bend term for cross-body atom class triple ({},{},{})",
                        key.0[0], key.0[1], key.0[2]
                    ))
                })?;
                bend.push(entry);
            }

            let xbond14 = self.atoms[anum].xbond14.clone();
            let mut torsion = Vec::with_capacity(xbond14.len());
            for path in &xbond14 {
                let key = Quad::canonical(
                    focal_class,
                    class(path.0[0]),
                    class(path.0[1]),
                    class(path.0[2]),
                );
                let entry = self.bond_torsion.get(&key).cloned().ok_or_else(|| {
                    ForceFieldError::MissingParameter(format!(
                        "no bond torsion term for cross-body atom class quad ({},{},{},{})",
                        key.0[0], key.0[1], key.0[2], key.0[3]
                    ))
                })?;
                torsion.push(entry);
            }

            // Improper torsions: try all six orderings of the three
            // neighbors with this atom's class in the third slot. Every
            // match is kept, and the amplitudes are divided by the match
            // count, so a parameter that matches several orderings
            // contributes an averaged term rather than a multiple.
            let mut improper_atoms = Vec::new();
            let mut improper = Vec::new();
            if let Some(centers) = self.atoms[anum].xbonds3_atoms {
                for perm in (0..3usize).permutations(3) {
                    let (n2, n3, n4) = (
                        centers.0[perm[0]],
                        centers.0[perm[1]],
                        centers.0[perm[2]],
                    );
                    let key = Quad::new(class(n2), class(n3), focal_class, class(n4));
                    if let Some(entry) = self.amber_improper_torsion.get(&key) {
                        improper_atoms.push(Triple::new(n2, n3, n4));
                        improper.push(entry.clone());
                    }
                }
                let matches = improper.len() as f64;
                if matches > 1.0 {
                    for entry in &mut improper {
                        for term in &mut entry.terms {
                            term.amplitude /= matches;
                        }
                    }
                }
            }

            let atom = &mut self.atoms[anum];
            atom.stretch = stretch;
            atom.bend = bend;
            atom.torsion = torsion;
            atom.improper_atoms = improper_atoms;
            atom.improper = improper;
        }
        Ok(())
    }
}


#[cfg(test)]
impl ForceFieldSubsystem {
    /// Builds only the mixed vdW table, for parameter-level tests that
    /// have no molecule.
    fn realize_topology_parameters_only_for_tests(&mut self) {
        self.build_mixed_vdw_table();
    }
}
