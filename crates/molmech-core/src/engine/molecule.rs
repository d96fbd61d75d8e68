//! Molecule construction: atoms, bonds, clusters, and body attachment.
//!
//! Clusters form trees. Placing an atom or a child cluster folds the
//! newcomer into the receiving cluster's transitive closures under the
//! composed transform; attaching a root cluster to a host body walks the
//! tree once and stamps every contained atom with its body and station.
//! All checks run before any state is touched, so a failing call leaves
//! the subsystem unchanged.

use crate::core::models::atom::{Atom, Bond};
use crate::core::models::body::{BodyView, HostBodyIndex};
use crate::core::models::cluster::{Cluster, MassProperties};
use crate::core::models::ids::{AtomId, BodyId, BondId, ChargedTypeId, ClusterId};
use crate::engine::error::ForceFieldError;
use crate::engine::subsystem::ForceFieldSubsystem;
use nalgebra::{Isometry3, Point3};

impl ForceFieldSubsystem {
    // ----- atoms and bonds --------------------------------------------

    /// Adds an atom of the given charged atom type. The atom joins no
    /// cluster and no body until placed.
    pub fn add_atom(&mut self, charged_type: ChargedTypeId) -> Result<AtomId, ForceFieldError> {
        self.checked_charged_type(charged_type)?;
        self.invalidate_topology_cache();
        let atom_id = AtomId(self.atoms.len());
        self.atoms.push(Atom::new(atom_id, charged_type));
        Ok(atom_id)
    }

    /// Adds a covalent bond between two distinct atoms. The stored pair is
    /// canonicalized low index first, and both atoms' 1-2 lists are
    /// updated; a pair may be bonded at most once.
    pub fn add_bond(&mut self, atom1: AtomId, atom2: AtomId) -> Result<BondId, ForceFieldError> {
        self.checked_atom(atom1)?;
        self.checked_atom(atom2)?;
        if atom1 == atom2 {
            return Err(ForceFieldError::Topology(format!(
                "atom {} cannot be bonded to itself",
                atom1
            )));
        }
        let (low, high) = if atom1 < atom2 {
            (atom1, atom2)
        } else {
            (atom2, atom1)
        };
        if self.atoms[low.index()].is_bonded_to(high) {
            return Err(ForceFieldError::DuplicateKey {
                kind: "bond",
                detail: format!("atoms {} and {} are already bonded", low, high),
            });
        }
        self.invalidate_topology_cache();
        self.bonds.push(Bond::new(low, high));
        self.atoms[low.index()].bond12.push(high);
        self.atoms[high.index()].bond12.push(low);
        Ok(BondId(self.bonds.len() - 1))
    }

    // ----- clusters ---------------------------------------------------

    pub(crate) fn add_cluster_entry(&mut self, name: &str) -> ClusterId {
        self.invalidate_topology_cache();
        let cluster_id = ClusterId(self.clusters.len());
        self.clusters.push(Cluster::new(cluster_id, name));
        cluster_id
    }

    /// Creates an empty cluster. Names need not be unique.
    pub fn create_cluster(&mut self, name: &str) -> ClusterId {
        self.add_cluster_entry(name)
    }

    /// Places an atom at a fixed station in a top-level cluster. If the
    /// cluster is already attached to a body, the atom is attached too.
    pub fn place_atom_in_cluster(
        &mut self,
        atom: AtomId,
        cluster: ClusterId,
        station: Point3<f64>,
    ) -> Result<(), ForceFieldError> {
        self.checked_atom(atom)?;
        let entry = self.checked_cluster(cluster)?;
        if !entry.is_top_level() {
            return Err(ForceFieldError::Topology(format!(
                "cluster {} ('{}') is not a top-level cluster, so atoms cannot be placed in it now",
                cluster, entry.name
            )));
        }
        if entry.contains_atom(atom) {
            return Err(ForceFieldError::Topology(format!(
                "cluster {} ('{}') already contains atom {}",
                cluster, entry.name, atom
            )));
        }
        if self.atoms[atom.index()].is_attached_to_body() {
            return Err(ForceFieldError::Topology(format!(
                "atom {} is already attached to a body, so it cannot be placed in a cluster",
                atom
            )));
        }
        self.invalidate_topology_cache();

        let target = &mut self.clusters[cluster.index()];
        target.direct_atoms.insert(atom, station);
        target.all_atoms.insert(atom, station);

        if let Some(body) = target.body {
            let station_on_body = target.placement_on_body * station;
            self.atoms[atom.index()].attach_to_body(body, station_on_body);
        }
        Ok(())
    }

    /// Places a child cluster in a top-level parent under a rigid
    /// placement, folding the child's transitive content into the parent's
    /// closures. If the parent is attached to a body, the whole child tree
    /// attaches too.
    pub fn place_cluster_in_cluster(
        &mut self,
        child: ClusterId,
        parent: ClusterId,
        placement: Isometry3<f64>,
    ) -> Result<(), ForceFieldError> {
        self.checked_cluster(child)?;
        self.checked_cluster(parent)?;
        if child == parent {
            return Err(ForceFieldError::Topology(format!(
                "cluster {} cannot be placed inside itself",
                child
            )));
        }
        {
            let parent_entry = &self.clusters[parent.index()];
            let child_entry = &self.clusters[child.index()];
            if !parent_entry.is_top_level() {
                return Err(ForceFieldError::Topology(format!(
                    "parent cluster {} ('{}') is not a top-level cluster, so it cannot take a child now",
                    parent, parent_entry.name
                )));
            }
            if child_entry.is_attached_to_body() {
                return Err(ForceFieldError::Topology(format!(
                    "child cluster {} ('{}') is already attached to a body, so it cannot be placed in another cluster",
                    child, child_entry.name
                )));
            }
            if parent_entry.contains_cluster(child) {
                return Err(ForceFieldError::Topology(format!(
                    "parent cluster {} ('{}') already contains cluster {} ('{}')",
                    parent, parent_entry.name, child, child_entry.name
                )));
            }
            if child_entry.contains_cluster(parent) {
                return Err(ForceFieldError::Topology(format!(
                    "cluster {} ('{}') already contains would-be parent {} ('{}')",
                    child, child_entry.name, parent, parent_entry.name
                )));
            }
            if let Some(shared) = parent_entry.first_common_atom(child_entry) {
                return Err(ForceFieldError::Topology(format!(
                    "clusters {} ('{}') and {} ('{}') both contain atom {}, so they cannot nest",
                    parent, parent_entry.name, child, child_entry.name, shared
                )));
            }
            // A cluster reachable through both trees would end up with
            // two parents inside one tree.
            for &nested in child_entry.all_clusters.keys() {
                if parent_entry.contains_cluster(nested) {
                    return Err(ForceFieldError::Topology(format!(
                        "clusters {} ('{}') and {} ('{}') both contain cluster {}, so they cannot nest",
                        parent, parent_entry.name, child, child_entry.name, nested
                    )));
                }
            }
        }
        self.invalidate_topology_cache();

        let child_atoms: Vec<_> = self.clusters[child.index()]
            .all_atoms
            .iter()
            .map(|(&a, &s)| (a, s))
            .collect();
        let child_clusters: Vec<_> = self.clusters[child.index()]
            .all_clusters
            .iter()
            .map(|(&c, &p)| (c, p))
            .collect();

        let parent_entry = &mut self.clusters[parent.index()];
        for (atom, station) in child_atoms {
            parent_entry.all_atoms.insert(atom, placement * station);
        }
        for (cluster, child_placement) in child_clusters {
            parent_entry
                .all_clusters
                .insert(cluster, placement * child_placement);
        }
        parent_entry.direct_clusters.insert(child, placement);
        parent_entry.all_clusters.insert(child, placement);

        self.clusters[child.index()]
            .parent_clusters
            .insert(parent, placement);

        let parent_body = self.clusters[parent.index()].body;
        if let Some(body) = parent_body {
            let placement_on_body = self.clusters[parent.index()].placement_on_body * placement;
            self.attach_cluster_tree(child, body, placement_on_body);
        }
        Ok(())
    }

    /// Attaches a top-level cluster rigidly to a host body. Every atom the
    /// cluster transitively contains receives its body assignment and its
    /// station in the body frame.
    pub fn attach_cluster_to_body(
        &mut self,
        cluster: ClusterId,
        host_body: HostBodyIndex,
        placement: Isometry3<f64>,
    ) -> Result<(), ForceFieldError> {
        let entry = self.checked_cluster(cluster)?;
        if entry.is_attached_to_body() {
            return Err(ForceFieldError::Topology(format!(
                "cluster {} ('{}') is already attached to a body",
                cluster, entry.name
            )));
        }
        if !entry.is_top_level() {
            return Err(ForceFieldError::Topology(format!(
                "cluster {} ('{}') has a parent cluster, so it cannot attach to a body directly",
                cluster, entry.name
            )));
        }
        for &atom in entry.all_atoms.keys() {
            if let Some(body) = self.atoms[atom.index()].body {
                return Err(ForceFieldError::Topology(format!(
                    "cluster {} contains atom {} which is already attached to body {}",
                    cluster, atom, body
                )));
            }
        }
        let body_cluster = {
            let body_id = self.ensure_body_entry(host_body);
            self.bodies[body_id.index()].cluster
        };
        if self.clusters[body_cluster.index()].contains_cluster(cluster) {
            return Err(ForceFieldError::Topology(format!(
                "cluster {} is already attached (directly or indirectly) to body {}",
                cluster, host_body
            )));
        }
        self.place_cluster_in_cluster(cluster, body_cluster, placement)
    }

    /// Attaches a lone atom to a host body at a fixed station.
    pub fn attach_atom_to_body(
        &mut self,
        atom: AtomId,
        host_body: HostBodyIndex,
        station: Point3<f64>,
    ) -> Result<(), ForceFieldError> {
        let entry = self.checked_atom(atom)?;
        if let Some(body) = entry.body {
            return Err(ForceFieldError::Topology(format!(
                "atom {} is already attached to body {}",
                atom, body
            )));
        }
        let body_cluster = {
            let body_id = self.ensure_body_entry(host_body);
            self.bodies[body_id.index()].cluster
        };
        self.place_atom_in_cluster(atom, body_cluster, station)
    }

    /// Composite mass properties of everything a cluster contains,
    /// expressed in the frame given by `placement` (the cluster frame
    /// placed in the caller's frame).
    pub fn calc_cluster_mass_properties(
        &self,
        cluster: ClusterId,
        placement: &Isometry3<f64>,
    ) -> Result<MassProperties, ForceFieldError> {
        let entry = self.checked_cluster(cluster)?;
        let mut points = Vec::with_capacity(entry.all_atoms.len());
        for (&atom, &station) in &entry.all_atoms {
            points.push((self.atom_mass(atom)?, placement * station));
        }
        Ok(MassProperties::from_point_masses(points))
    }

    // ----- body bookkeeping -------------------------------------------

    /// The subsystem's view of a host body, created lazily the first time
    /// atoms attach to it. Each view is backed by a reserved top-level
    /// cluster pinned to the body with the identity placement.
    pub(crate) fn ensure_body_entry(&mut self, host_body: HostBodyIndex) -> BodyId {
        if let Some(&body_id) = self.body_by_host.get(&host_body) {
            return body_id;
        }
        let cluster = self.add_cluster_entry(&format!("body {}", host_body));
        self.clusters[cluster.index()].body = Some(host_body);
        let body_id = BodyId(self.bodies.len());
        self.bodies.push(BodyView::new(cluster, host_body));
        self.body_by_host.insert(host_body, body_id);
        body_id
    }

    /// Stamps body and station onto every atom in the tree rooted at
    /// `root`, whose frame is placed in the body frame by `placement`.
    fn attach_cluster_tree(
        &mut self,
        root: ClusterId,
        host_body: HostBodyIndex,
        placement: Isometry3<f64>,
    ) {
        let mut stack = vec![(root, placement)];
        while let Some((cluster, on_body)) = stack.pop() {
            let (direct_atoms, direct_clusters) = {
                let entry = &mut self.clusters[cluster.index()];
                debug_assert!(entry.body.is_none());
                entry.body = Some(host_body);
                entry.placement_on_body = on_body;
                (
                    entry
                        .direct_atoms
                        .iter()
                        .map(|(&a, &s)| (a, s))
                        .collect::<Vec<_>>(),
                    entry
                        .direct_clusters
                        .iter()
                        .map(|(&c, &p)| (c, p))
                        .collect::<Vec<_>>(),
                )
            };
            for (atom, station) in direct_atoms {
                self.atoms[atom.index()].attach_to_body(host_body, on_body * station);
            }
            for (child, child_placement) in direct_clusters {
                stack.push((child, on_body * child_placement));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ids::AtomClassId;
    use nalgebra::{Translation3, UnitQuaternion};

    fn subsystem_with_atoms(n: usize) -> (ForceFieldSubsystem, Vec<AtomId>) {
        let mut subsystem = ForceFieldSubsystem::new();
        subsystem
            .define_atom_class(AtomClassId(0), "CT", 6, 4, 0.17, 0.45)
            .unwrap();
        subsystem
            .define_charged_atom_type(ChargedTypeId(0), "CT-n", AtomClassId(0), 0.0)
            .unwrap();
        let atoms = (0..n)
            .map(|_| subsystem.add_atom(ChargedTypeId(0)).unwrap())
            .collect();
        (subsystem, atoms)
    }

    fn translation(x: f64, y: f64, z: f64) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity())
    }

    #[test]
    fn bonds_update_both_adjacency_lists_symmetrically() {
        let (mut subsystem, atoms) = subsystem_with_atoms(3);
        subsystem.add_bond(atoms[2], atoms[0]).unwrap();
        subsystem.add_bond(atoms[1], atoms[2]).unwrap();
        assert!(subsystem.atoms[0].is_bonded_to(atoms[2]));
        assert!(subsystem.atoms[2].is_bonded_to(atoms[0]));
        assert!(subsystem.atoms[2].is_bonded_to(atoms[1]));
        // The canonical order puts the lower atom first.
        assert_eq!(subsystem.bond_atom(BondId(0), 0).unwrap(), atoms[0]);
        assert_eq!(subsystem.bond_atom(BondId(0), 1).unwrap(), atoms[2]);
    }

    #[test]
    fn self_bond_and_duplicate_bond_are_rejected() {
        let (mut subsystem, atoms) = subsystem_with_atoms(2);
        assert!(matches!(
            subsystem.add_bond(atoms[0], atoms[0]),
            Err(ForceFieldError::Topology(_))
        ));
        subsystem.add_bond(atoms[0], atoms[1]).unwrap();
        assert!(matches!(
            subsystem.add_bond(atoms[1], atoms[0]),
            Err(ForceFieldError::DuplicateKey { .. })
        ));
        assert_eq!(subsystem.n_bonds(), 1);
    }

    #[test]
    fn placed_atom_appears_in_direct_and_transitive_sets() {
        let (mut subsystem, atoms) = subsystem_with_atoms(1);
        let cluster = subsystem.create_cluster("methyl");
        subsystem
            .place_atom_in_cluster(atoms[0], cluster, Point3::new(0.1, 0.0, 0.0))
            .unwrap();
        let entry = &subsystem.clusters[cluster.index()];
        assert!(entry.direct_atoms.contains_key(&atoms[0]));
        assert!(entry.contains_atom(atoms[0]));
        // Placing it again anywhere in the same tree fails.
        assert!(matches!(
            subsystem.place_atom_in_cluster(atoms[0], cluster, Point3::origin()),
            Err(ForceFieldError::Topology(_))
        ));
    }

    #[test]
    fn nested_cluster_content_is_folded_under_composed_transforms() {
        let (mut subsystem, atoms) = subsystem_with_atoms(2);
        let inner = subsystem.create_cluster("inner");
        let outer = subsystem.create_cluster("outer");
        subsystem
            .place_atom_in_cluster(atoms[0], inner, Point3::new(0.1, 0.0, 0.0))
            .unwrap();
        subsystem
            .place_atom_in_cluster(atoms[1], outer, Point3::new(0.0, 0.2, 0.0))
            .unwrap();
        subsystem
            .place_cluster_in_cluster(inner, outer, translation(1.0, 0.0, 0.0))
            .unwrap();

        let outer_entry = &subsystem.clusters[outer.index()];
        assert!(outer_entry.contains_cluster(inner));
        // The inner atom's station is re-expressed in the outer frame.
        let station = outer_entry.all_atoms[&atoms[0]];
        assert!((station - Point3::new(1.1, 0.0, 0.0)).norm() < 1e-12);
        // The inner cluster records its parent.
        assert!(subsystem.clusters[inner.index()]
            .parent_clusters
            .contains_key(&outer));
        assert!(!subsystem.clusters[inner.index()].is_top_level());
    }

    #[test]
    fn cluster_cycles_and_overlaps_are_rejected() {
        let (mut subsystem, atoms) = subsystem_with_atoms(1);
        let a = subsystem.create_cluster("a");
        let b = subsystem.create_cluster("b");
        assert!(matches!(
            subsystem.place_cluster_in_cluster(a, a, Isometry3::identity()),
            Err(ForceFieldError::Topology(_))
        ));
        subsystem
            .place_cluster_in_cluster(b, a, Isometry3::identity())
            .unwrap();
        // b is no longer top level, so it cannot take children now.
        let c = subsystem.create_cluster("c");
        assert!(matches!(
            subsystem.place_cluster_in_cluster(c, b, Isometry3::identity()),
            Err(ForceFieldError::Topology(_))
        ));
        // a cannot be placed under b: b already lives inside a.
        assert!(matches!(
            subsystem.place_cluster_in_cluster(a, b, Isometry3::identity()),
            Err(ForceFieldError::Topology(_))
        ));

        // Two top-level trees may mention the same atom, but they can
        // never be nested into one tree.
        let d = subsystem.create_cluster("d");
        let e = subsystem.create_cluster("e");
        subsystem
            .place_atom_in_cluster(atoms[0], d, Point3::origin())
            .unwrap();
        subsystem
            .place_atom_in_cluster(atoms[0], e, Point3::origin())
            .unwrap();
        assert!(matches!(
            subsystem.place_cluster_in_cluster(d, e, Isometry3::identity()),
            Err(ForceFieldError::Topology(_))
        ));
    }

    #[test]
    fn attaching_cluster_propagates_bodies_and_stations() {
        let (mut subsystem, atoms) = subsystem_with_atoms(2);
        let inner = subsystem.create_cluster("inner");
        let outer = subsystem.create_cluster("outer");
        subsystem
            .place_atom_in_cluster(atoms[0], inner, Point3::new(0.1, 0.0, 0.0))
            .unwrap();
        subsystem
            .place_cluster_in_cluster(inner, outer, translation(0.0, 0.5, 0.0))
            .unwrap();
        subsystem
            .place_atom_in_cluster(atoms[1], outer, Point3::new(0.2, 0.0, 0.0))
            .unwrap();
        subsystem
            .attach_cluster_to_body(outer, 3, translation(1.0, 0.0, 0.0))
            .unwrap();

        assert_eq!(subsystem.atom_body(atoms[1]).unwrap(), 3);
        let s1 = subsystem.atom_station_on_body(atoms[1]).unwrap();
        assert!((s1 - Point3::new(1.2, 0.0, 0.0)).norm() < 1e-12);
        let s0 = subsystem.atom_station_on_body(atoms[0]).unwrap();
        assert!((s0 - Point3::new(1.1, 0.5, 0.0)).norm() < 1e-12);
        // The inner cluster got its own body placement.
        assert_eq!(subsystem.cluster_body(inner).unwrap(), 3);

        // Re-attachment is refused.
        assert!(matches!(
            subsystem.attach_cluster_to_body(outer, 4, Isometry3::identity()),
            Err(ForceFieldError::Topology(_))
        ));
    }

    #[test]
    fn atom_placed_into_body_cluster_attaches_immediately() {
        let (mut subsystem, atoms) = subsystem_with_atoms(2);
        // The first attachment creates the body cluster, which stays top
        // level and attached; atoms placed into it attach on the spot.
        subsystem
            .attach_atom_to_body(atoms[0], 0, Point3::new(0.3, 0.0, 0.0))
            .unwrap();
        let body_cluster = subsystem.bodies[0].cluster;
        subsystem
            .place_atom_in_cluster(atoms[1], body_cluster, Point3::new(0.0, 0.4, 0.0))
            .unwrap();
        assert_eq!(subsystem.atom_body(atoms[1]).unwrap(), 0);
        let station = subsystem.atom_station_on_body(atoms[1]).unwrap();
        assert!((station - Point3::new(0.0, 0.4, 0.0)).norm() < 1e-12);
        // An attached atom can no longer be placed anywhere else.
        let other = subsystem.create_cluster("other");
        assert!(matches!(
            subsystem.place_atom_in_cluster(atoms[0], other, Point3::origin()),
            Err(ForceFieldError::Topology(_))
        ));
        // A cluster hanging under the body cluster is not top level, so
        // it cannot take atoms anymore.
        let grp = subsystem.create_cluster("grp");
        subsystem
            .attach_cluster_to_body(grp, 0, translation(0.0, 0.0, 1.0))
            .unwrap();
        assert!(matches!(
            subsystem.place_atom_in_cluster(atoms[1], grp, Point3::origin()),
            Err(ForceFieldError::Topology(_))
        ));
    }

    #[test]
    fn attach_atom_to_body_goes_through_the_body_cluster() {
        let (mut subsystem, atoms) = subsystem_with_atoms(1);
        subsystem
            .attach_atom_to_body(atoms[0], 5, Point3::new(0.0, 0.1, 0.0))
            .unwrap();
        assert_eq!(subsystem.atom_body(atoms[0]).unwrap(), 5);
        assert_eq!(subsystem.bodies.len(), 1);
        assert_eq!(subsystem.bodies[0].host_body, 5);
        // A second attachment of the same atom fails.
        assert!(matches!(
            subsystem.attach_atom_to_body(atoms[0], 5, Point3::origin()),
            Err(ForceFieldError::Topology(_))
        ));
    }

    #[test]
    fn transitive_atoms_equal_union_of_direct_and_child_content() {
        let (mut subsystem, atoms) = subsystem_with_atoms(3);
        let child = subsystem.create_cluster("child");
        let parent = subsystem.create_cluster("parent");
        subsystem
            .place_atom_in_cluster(atoms[0], child, Point3::origin())
            .unwrap();
        subsystem
            .place_atom_in_cluster(atoms[1], child, Point3::new(0.1, 0.0, 0.0))
            .unwrap();
        subsystem
            .place_atom_in_cluster(atoms[2], parent, Point3::new(0.2, 0.0, 0.0))
            .unwrap();
        subsystem
            .place_cluster_in_cluster(child, parent, translation(0.0, 1.0, 0.0))
            .unwrap();

        let parent_entry = &subsystem.clusters[parent.index()];
        let child_entry = &subsystem.clusters[child.index()];
        assert_eq!(parent_entry.all_atoms.len(), 3);
        for (&atom, &station) in &child_entry.all_atoms {
            let in_parent = parent_entry.all_atoms[&atom];
            assert!((in_parent - (translation(0.0, 1.0, 0.0) * station)).norm() < 1e-12);
        }
    }

    #[test]
    fn mass_properties_transform_with_the_supplied_frame() {
        let (mut subsystem, atoms) = subsystem_with_atoms(2);
        let cluster = subsystem.create_cluster("pair");
        subsystem
            .place_atom_in_cluster(atoms[0], cluster, Point3::new(0.0, 0.0, 0.0))
            .unwrap();
        subsystem
            .place_atom_in_cluster(atoms[1], cluster, Point3::new(0.2, 0.0, 0.0))
            .unwrap();
        let carbon_mass = subsystem.atom_mass(atoms[0]).unwrap();

        let props = subsystem
            .calc_cluster_mass_properties(cluster, &Isometry3::identity())
            .unwrap();
        assert!((props.mass - 2.0 * carbon_mass).abs() < 1e-9);
        assert!((props.center_of_mass - Point3::new(0.1, 0.0, 0.0)).norm() < 1e-12);

        let shifted = subsystem
            .calc_cluster_mass_properties(cluster, &translation(0.0, 0.3, 0.0))
            .unwrap();
        assert!((shifted.center_of_mass - Point3::new(0.1, 0.3, 0.0)).norm() < 1e-12);
    }
}
