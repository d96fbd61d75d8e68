//! Rigid clusters: hierarchically nestable groupings of atoms.
//!
//! A cluster is a rigid frame holding directly placed atoms (each with a
//! station) and directly placed child clusters (each with a rigid
//! placement). Alongside the direct content, every cluster maintains the
//! full recursive closure of both, re-expressed in its own frame, so that
//! containment queries and body flattening are O(log n) lookups instead of
//! tree walks. The closures are maintained incrementally on every insert.
//!
//! Clusters reference atoms and other clusters by index only; parents are
//! recorded as an index map, so the child/parent cross-references form no
//! ownership cycle.

use crate::core::models::body::HostBodyIndex;
use crate::core::models::ids::{AtomId, ClusterId};
use nalgebra::{Isometry3, Matrix3, Point3, Vector3};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Cluster {
    pub cluster_id: ClusterId,
    pub name: String,

    /// Atoms placed directly in this cluster, station in this frame (nm).
    pub direct_atoms: BTreeMap<AtomId, Point3<f64>>,
    /// Child clusters placed directly in this cluster.
    pub direct_clusters: BTreeMap<ClusterId, Isometry3<f64>>,

    /// Every atom contained here or in any descendant, in this frame.
    pub all_atoms: BTreeMap<AtomId, Point3<f64>>,
    /// Every cluster contained here or in any descendant, in this frame.
    pub all_clusters: BTreeMap<ClusterId, Isometry3<f64>>,

    /// Immediate parents and our placement within each. A cluster with no
    /// parents is top level. The body is not a parent; it is tracked below.
    pub parent_clusters: BTreeMap<ClusterId, Isometry3<f64>>,

    /// Host body this cluster is rigidly attached to, once bound.
    pub body: Option<HostBodyIndex>,
    /// Cluster frame fixed in the body frame (translation in nm).
    pub placement_on_body: Isometry3<f64>,
}

impl Cluster {
    pub fn new(cluster_id: ClusterId, name: &str) -> Self {
        Self {
            cluster_id,
            name: name.to_string(),
            direct_atoms: BTreeMap::new(),
            direct_clusters: BTreeMap::new(),
            all_atoms: BTreeMap::new(),
            all_clusters: BTreeMap::new(),
            parent_clusters: BTreeMap::new(),
            body: None,
            placement_on_body: Isometry3::identity(),
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_clusters.is_empty()
    }

    pub fn is_attached_to_body(&self) -> bool {
        self.body.is_some()
    }

    /// True when the atom lives anywhere in this cluster's tree.
    pub fn contains_atom(&self, atom: AtomId) -> bool {
        self.all_atoms.contains_key(&atom)
    }

    /// True when the cluster lives anywhere in this cluster's tree.
    pub fn contains_cluster(&self, cluster: ClusterId) -> bool {
        self.all_clusters.contains_key(&cluster)
    }

    /// First atom present in both trees, if any. Used to reject placements
    /// that would let two trees share an atom.
    pub fn first_common_atom(&self, other: &Cluster) -> Option<AtomId> {
        other
            .all_atoms
            .keys()
            .copied()
            .find(|atom| self.contains_atom(*atom))
    }
}

/// Composite mass properties of a point-mass collection: total mass (Da),
/// center of mass, and the inertia matrix about the frame origin
/// (Da nm^2), all in the frame the stations were supplied in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    pub mass: f64,
    pub center_of_mass: Point3<f64>,
    pub inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Accumulates point masses. Stations are positions in the target
    /// frame; a zero total mass yields a center of mass at the origin.
    pub fn from_point_masses<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (f64, Point3<f64>)>,
    {
        let mut mass = 0.0;
        let mut weighted = Vector3::zeros();
        let mut inertia = Matrix3::zeros();
        for (m, p) in points {
            let r = p.coords;
            mass += m;
            weighted += m * r;
            inertia += m * (Matrix3::identity() * r.norm_squared() - r * r.transpose());
        }
        let center_of_mass = if mass > 0.0 {
            Point3::from(weighted / mass)
        } else {
            Point3::origin()
        };
        Self {
            mass,
            center_of_mass,
            inertia,
        }
    }
}
