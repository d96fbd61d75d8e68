//! Generalized-Born implicit-solvent bridge.
//!
//! The numeric GB/ACE evaluator is an external collaborator hidden behind
//! [`ImplicitSolvent`]; it works in Angstroms and kcal/mol, the units of
//! the OBC literature. This module owns everything around it: the
//! element- and connectivity-dependent radius and scale-factor tables, the
//! packing of atom state into parallel arrays, and the unit conversions
//! back into the kernel's kJ/nm world.

use crate::core::models::body::SpatialForce;
use crate::engine::error::ForceFieldError;
use crate::engine::subsystem::ForceFieldSubsystem;
use nalgebra::{Point3, Vector3};

pub const ANGSTROMS_PER_NM: f64 = 10.0;
pub const KJ_PER_KCAL: f64 = 4.184;

/// The external generalized-Born evaluator.
///
/// Coordinates are in Angstroms, returned forces in kcal/(mol Angstrom),
/// energy in kcal/mol. Parameters installed through
/// [`set_obc_parameters`](ImplicitSolvent::set_obc_parameters) stay in
/// effect for subsequent [`calculate_forces`](ImplicitSolvent::calculate_forces)
/// calls.
pub trait ImplicitSolvent {
    /// OBC scale factor per atom. The default consults the element table
    /// in this module.
    fn obc_scale_factors(&self, atomic_numbers: &[u32]) -> Vec<f64> {
        obc_scale_factors(atomic_numbers)
    }

    /// Intrinsic GB radius per atom, Angstroms. The default consults the
    /// element- and connectivity-dependent table in this module.
    fn gbsa_radii(
        &self,
        atomic_numbers: &[u32],
        n_partners: &[usize],
        first_partner: &[Option<usize>],
    ) -> Vec<f64> {
        gbsa_radii(atomic_numbers, n_partners, first_partner)
    }

    fn set_obc_parameters(
        &mut self,
        radii: &[f64],
        scale_factors: &[f64],
        include_ace_approximation: bool,
        solute_dielectric: f64,
        solvent_dielectric: f64,
    );

    fn calculate_forces(
        &mut self,
        coordinates: &[Point3<f64>],
        charges: &[f64],
        update_born_radii: bool,
    ) -> (Vec<Vector3<f64>>, f64);
}

/// OBC scale factors by element.
pub fn obc_scale_factors(atomic_numbers: &[u32]) -> Vec<f64> {
    atomic_numbers
        .iter()
        .map(|z| match z {
            1 => 0.85,
            6 => 0.72,
            7 => 0.79,
            8 => 0.85,
            9 => 0.88,
            15 => 0.86,
            16 => 0.96,
            _ => 0.80,
        })
        .collect()
}

/// Intrinsic GB radii in Angstroms, by element and first covalent
/// partner: a hydrogen bound to nitrogen is larger than other hydrogens.
pub fn gbsa_radii(
    atomic_numbers: &[u32],
    n_partners: &[usize],
    first_partner: &[Option<usize>],
) -> Vec<f64> {
    atomic_numbers
        .iter()
        .enumerate()
        .map(|(i, z)| match z {
            1 => {
                let bound_to_nitrogen = n_partners[i] > 0
                    && first_partner[i]
                        .and_then(|p| atomic_numbers.get(p))
                        .is_some_and(|&pz| pz == 7);
                if bound_to_nitrogen {
                    1.30
                } else {
                    1.20
                }
            }
            6 => 1.70,
            7 => 1.55,
            8 => 1.50,
            9 => 1.50,
            15 => 1.85,
            16 => 1.80,
            17 => 1.70,
            _ => 1.50,
        })
        .collect()
}

impl ForceFieldSubsystem {
    /// Packs the realized atom state into the evaluator's parallel
    /// arrays, runs it, and folds the converted forces and energy into
    /// the kernel's accumulators.
    pub(crate) fn accumulate_gbsa(
        &mut self,
        energy: &mut f64,
        forces: &mut [SpatialForce],
        pos_g: &[Point3<f64>],
        station_g: &[Vector3<f64>],
        body_of: &[usize],
        charge: &[f64],
    ) -> Result<(), ForceFieldError> {
        let n_atoms = self.atoms.len();
        if n_atoms == 0 {
            return Ok(());
        }

        let mut coordinates = Vec::with_capacity(n_atoms);
        for position in pos_g {
            coordinates.push(Point3::from(position.coords * ANGSTROMS_PER_NM));
        }

        let mut atomic_numbers = Vec::with_capacity(n_atoms);
        let mut n_partners = Vec::with_capacity(n_atoms);
        let mut first_partner = Vec::with_capacity(n_atoms);
        for atom in &self.atoms {
            atomic_numbers.push(self.element_of_atom(atom.atom_id)?.atomic_number);
            n_partners.push(atom.bond12.len());
            first_partner.push(atom.bond12.first().map(|a| a.index()));
        }

        let include_ace = self.gbsa_include_ace;
        let solute_dielectric = self.gbsa_solute_dielectric;
        let solvent_dielectric = self.gbsa_solvent_dielectric;
        let global_scale = self.gbsa_global_scale;

        let solvent = self.solvent.as_mut().ok_or_else(|| {
            ForceFieldError::MissingParameter(
                "generalized Born scale factor is nonzero but no implicit solvent \
                 evaluator is installed"
                    .to_string(),
            )
        })?;
        let radii = solvent.gbsa_radii(&atomic_numbers, &n_partners, &first_partner);
        let scale_factors = solvent.obc_scale_factors(&atomic_numbers);
        solvent.set_obc_parameters(
            &radii,
            &scale_factors,
            include_ace,
            solute_dielectric,
            solvent_dielectric,
        );
        let (solvent_forces, solvent_energy) = solvent.calculate_forces(&coordinates, charge, true);

        // kcal/(mol A) -> kJ/(mol nm), then the global GB scale.
        let force_factor = KJ_PER_KCAL * ANGSTROMS_PER_NM * global_scale;
        for i in 0..n_atoms {
            let f = solvent_forces[i] * force_factor;
            forces[body_of[i]] += SpatialForce::applied_at(station_g[i], f);
        }
        *energy += solvent_energy * KJ_PER_KCAL * global_scale;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ids::{AtomClassId, ChargedTypeId};
    use nalgebra::{Isometry3, Translation3, UnitQuaternion};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Default)]
    struct RecordedCall {
        radii: Vec<f64>,
        scale_factors: Vec<f64>,
        include_ace: bool,
        solute_dielectric: f64,
        solvent_dielectric: f64,
        coordinates: Vec<Point3<f64>>,
        charges: Vec<f64>,
    }

    /// Evaluator stub: records what it was handed, returns a fixed force
    /// on every atom and a fixed energy, both in kcal units.
    struct StubSolvent {
        record: Rc<RefCell<RecordedCall>>,
        force_per_atom: Vector3<f64>,
        energy: f64,
    }

    impl ImplicitSolvent for StubSolvent {
        fn set_obc_parameters(
            &mut self,
            radii: &[f64],
            scale_factors: &[f64],
            include_ace_approximation: bool,
            solute_dielectric: f64,
            solvent_dielectric: f64,
        ) {
            let mut record = self.record.borrow_mut();
            record.radii = radii.to_vec();
            record.scale_factors = scale_factors.to_vec();
            record.include_ace = include_ace_approximation;
            record.solute_dielectric = solute_dielectric;
            record.solvent_dielectric = solvent_dielectric;
        }

        fn calculate_forces(
            &mut self,
            coordinates: &[Point3<f64>],
            charges: &[f64],
            _update_born_radii: bool,
        ) -> (Vec<Vector3<f64>>, f64) {
            let mut record = self.record.borrow_mut();
            record.coordinates = coordinates.to_vec();
            record.charges = charges.to_vec();
            (vec![self.force_per_atom; coordinates.len()], self.energy)
        }
    }

    fn translation(x: f64, y: f64, z: f64) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity())
    }

    #[test]
    fn scale_factor_table_matches_obc_parameterization() {
        let factors = obc_scale_factors(&[1, 6, 7, 8, 16, 26]);
        assert_eq!(factors, vec![0.85, 0.72, 0.79, 0.85, 0.96, 0.80]);
    }

    #[test]
    fn radius_table_distinguishes_hydrogen_on_nitrogen() {
        // N-H and C-H: the amide hydrogen gets the larger radius.
        let z = [7, 1, 6, 1];
        let n_partners = [1, 1, 1, 1];
        let first_partner = [Some(1), Some(0), Some(3), Some(2)];
        let radii = gbsa_radii(&z, &n_partners, &first_partner);
        assert_eq!(radii, vec![1.55, 1.30, 1.70, 1.20]);
    }

    #[test]
    fn lone_hydrogen_gets_generic_radius() {
        let radii = gbsa_radii(&[1], &[0], &[None]);
        assert_eq!(radii, vec![1.20]);
    }

    fn solvated_pair(
        record: Rc<RefCell<RecordedCall>>,
        force_per_atom: Vector3<f64>,
        energy_kcal: f64,
        gbsa_scale: f64,
    ) -> ForceFieldSubsystem {
        let mut subsystem = ForceFieldSubsystem::new();
        subsystem
            .define_atom_class(AtomClassId(0), "N3", 7, 3, 0.17, 0.7)
            .unwrap();
        subsystem
            .define_atom_class(AtomClassId(1), "H", 1, 1, 0.12, 0.02)
            .unwrap();
        subsystem
            .define_charged_atom_type(ChargedTypeId(0), "N3-q", AtomClassId(0), -0.3)
            .unwrap();
        subsystem
            .define_charged_atom_type(ChargedTypeId(1), "H-q", AtomClassId(1), 0.3)
            .unwrap();
        subsystem
            .define_bond_stretch(AtomClassId(0), AtomClassId(1), 400.0, 0.101)
            .unwrap();
        let n = subsystem.add_atom(ChargedTypeId(0)).unwrap();
        let h = subsystem.add_atom(ChargedTypeId(1)).unwrap();
        subsystem.add_bond(n, h).unwrap();
        subsystem
            .attach_atom_to_body(n, 0, Point3::origin())
            .unwrap();
        subsystem
            .attach_atom_to_body(h, 1, Point3::origin())
            .unwrap();
        subsystem.set_gbsa_global_scale_factor(gbsa_scale).unwrap();
        // Silence everything but GB.
        subsystem.set_vdw_global_scale_factor(0.0).unwrap();
        subsystem.set_coulomb_global_scale_factor(0.0).unwrap();
        subsystem.set_bond_stretch_global_scale_factor(0.0).unwrap();
        subsystem.set_implicit_solvent(Box::new(StubSolvent {
            record,
            force_per_atom,
            energy: energy_kcal,
        }));
        subsystem.realize_topology().unwrap();
        subsystem
            .realize_position(&[translation(0.0, 0.0, 0.0), translation(0.101, 0.0, 0.0)])
            .unwrap();
        subsystem
    }

    #[test]
    fn bridge_packs_coordinates_in_angstroms_and_element_tables() {
        let record = Rc::new(RefCell::new(RecordedCall::default()));
        let mut subsystem = solvated_pair(record.clone(), Vector3::zeros(), 0.0, 1.0);
        subsystem.realize_dynamics().unwrap();

        let call = record.borrow();
        // 0.101 nm -> 1.01 A.
        assert!((call.coordinates[1].x - 1.01).abs() < 1e-12);
        assert_eq!(call.charges, vec![-0.3, 0.3]);
        // N gets 1.55 A; its hydrogen partner 1.30 A.
        assert_eq!(call.radii, vec![1.55, 1.30]);
        assert_eq!(call.scale_factors, vec![0.79, 0.85]);
        // Defaults preserved: ACE off, dielectrics 1 and 80.
        assert!(!call.include_ace);
        assert_eq!(call.solute_dielectric, 1.0);
        assert_eq!(call.solvent_dielectric, 80.0);
    }

    #[test]
    fn bridge_converts_units_and_applies_global_scale() {
        let record = Rc::new(RefCell::new(RecordedCall::default()));
        let energy_kcal = 2.5;
        let force = Vector3::new(1.0, 0.0, 0.0);
        let scale = 0.5;
        let mut subsystem = solvated_pair(record, force, energy_kcal, scale);
        subsystem.realize_dynamics().unwrap();

        let expected_energy = energy_kcal * KJ_PER_KCAL * scale;
        assert!((subsystem.potential_energy().unwrap() - expected_energy).abs() < 1e-12);

        let forces = subsystem.body_spatial_forces().unwrap();
        let expected_force = 1.0 * KJ_PER_KCAL * ANGSTROMS_PER_NM * scale;
        assert!((forces[0].force.x - expected_force).abs() < 1e-9);
        assert!((forces[1].force.x - expected_force).abs() < 1e-9);
    }

    #[test]
    fn zero_gbsa_scale_skips_the_evaluator() {
        let record = Rc::new(RefCell::new(RecordedCall::default()));
        let mut subsystem = solvated_pair(record.clone(), Vector3::new(1.0, 0.0, 0.0), 9.9, 0.0);
        subsystem.realize_dynamics().unwrap();
        assert_eq!(subsystem.potential_energy().unwrap(), 0.0);
        assert!(record.borrow().coordinates.is_empty());
    }

    #[test]
    fn nonzero_gbsa_scale_without_evaluator_is_an_error() {
        let mut subsystem = ForceFieldSubsystem::new();
        subsystem
            .define_atom_class(AtomClassId(0), "C", 6, 4, 0.19, 0.45)
            .unwrap();
        subsystem
            .define_charged_atom_type(ChargedTypeId(0), "C-n", AtomClassId(0), 0.0)
            .unwrap();
        let atom = subsystem.add_atom(ChargedTypeId(0)).unwrap();
        subsystem
            .attach_atom_to_body(atom, 0, Point3::origin())
            .unwrap();
        subsystem.realize_topology().unwrap();
        subsystem
            .realize_position(&[translation(0.0, 0.0, 0.0)])
            .unwrap();
        assert!(matches!(
            subsystem.realize_dynamics(),
            Err(ForceFieldError::MissingParameter(_))
        ));
    }
}
