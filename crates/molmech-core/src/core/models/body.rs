//! Per-body views of the atom population, and the spatial-force type the
//! kernel reduces into.

use crate::core::models::ids::{AtomId, ClusterId};
use nalgebra::{Point3, Vector3};
use std::ops::{AddAssign, Neg, SubAssign};

/// Index of a mobile body owned by the multibody host. The host defines and
/// orders these; the subsystem only maps them to its internal body views.
pub type HostBodyIndex = usize;

/// An atom station expressed in some containing frame (cluster or body).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomPlacement {
    pub atom: AtomId,
    /// nm, in the containing frame.
    pub station: Point3<f64>,
}

/// The subsystem's view of one host body that carries atoms: the body's
/// backing cluster plus a flattened, atom-id-sorted list of every atom on
/// the body with its station in the body frame. The flat list is a
/// realization cache, rebuilt from the cluster tree.
#[derive(Debug, Clone)]
pub struct BodyView {
    pub cluster: ClusterId,
    pub host_body: HostBodyIndex,
    pub all_atoms: Vec<AtomPlacement>,
}

impl BodyView {
    pub fn new(cluster: ClusterId, host_body: HostBodyIndex) -> Self {
        Self {
            cluster,
            host_body,
            all_atoms: Vec::new(),
        }
    }

    pub fn invalidate_topological_cache(&mut self) {
        self.all_atoms.clear();
    }
}

/// A spatial force on a body: torque about the body origin plus a linear
/// force, both expressed in the ground frame. Torque is in kJ/mol, force in
/// kJ/(mol nm).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpatialForce {
    pub torque: Vector3<f64>,
    pub force: Vector3<f64>,
}

impl SpatialForce {
    pub fn zero() -> Self {
        Self::default()
    }

    /// The spatial force equivalent to `force` applied at `station`, where
    /// `station` is the application point relative to the body origin in
    /// the ground frame.
    pub fn applied_at(station: Vector3<f64>, force: Vector3<f64>) -> Self {
        Self {
            torque: station.cross(&force),
            force,
        }
    }
}

impl AddAssign for SpatialForce {
    fn add_assign(&mut self, rhs: Self) {
        self.torque += rhs.torque;
        self.force += rhs.force;
    }
}

impl SubAssign for SpatialForce {
    fn sub_assign(&mut self, rhs: Self) {
        self.torque -= rhs.torque;
        self.force -= rhs.force;
    }
}

impl Neg for SpatialForce {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            torque: -self.torque,
            force: -self.force,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applied_at_produces_moment_arm_torque() {
        let sf = SpatialForce::applied_at(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 2.0, 0.0));
        assert_eq!(sf.torque, Vector3::new(0.0, 0.0, 2.0));
        assert_eq!(sf.force, Vector3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn add_and_sub_assign_accumulate_componentwise() {
        let mut acc = SpatialForce::zero();
        let sf = SpatialForce::applied_at(Vector3::new(0.0, 1.0, 0.0), Vector3::new(3.0, 0.0, 0.0));
        acc += sf;
        acc += sf;
        acc -= sf;
        assert_eq!(acc, sf);
    }

    #[test]
    fn negation_flips_both_components() {
        let sf = SpatialForce {
            torque: Vector3::new(1.0, -2.0, 3.0),
            force: Vector3::new(-4.0, 5.0, -6.0),
        };
        let neg = -sf;
        assert_eq!(neg.torque, -sf.torque);
        assert_eq!(neg.force, -sf.force);
    }
}
