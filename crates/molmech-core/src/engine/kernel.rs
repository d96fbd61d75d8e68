//! The force/energy kernel.
//!
//! Consumes the realized topology plus the per-body transforms installed
//! at the Position stage, and produces the scalar potential energy and one
//! spatial force per host body.
//!
//! Counting discipline: every cross-body bonded tuple appears in the lists
//! of the atoms at both of its ends, so stretches and torsions are skipped
//! when the partner's atom index is below the focal atom's, and bends when
//! the *last* atom's index is. Improper torsions are never deduplicated
//! this way; their multi-match averaging happens at realization. Each
//! nonbonded pair is visited exactly once by pairing each body only with
//! higher-numbered bodies.
//!
//! Scaling protocol: before a focal atom's nonbonded loop, the per-atom
//! scale arrays are written from its cross-body *shortest-path* lists;
//! after the loop every write is undone, so the arrays sit at 1 between
//! focal atoms.

use crate::core::forcefield::potentials::{harmonic_bend, periodic_torsion};
use crate::core::models::body::SpatialForce;
use crate::core::models::ids::AtomClassId;
use crate::core::models::atom::Atom;
use crate::engine::error::ForceFieldError;
use crate::engine::subsystem::{ForceFieldSubsystem, COULOMB_CONSTANT};
use nalgebra::{Point3, Vector3};
use tracing::trace;

impl ForceFieldSubsystem {
    /// Precomputed mixed vdW pair for two classes; the entry lives on the
    /// lower-numbered class.
    fn mixed_vdw(&self, class1: AtomClassId, class2: AtomClassId) -> Option<(f64, f64)> {
        let (low, high) = if class1 <= class2 {
            (class1, class2)
        } else {
            (class2, class1)
        };
        let class = self.atom_classes.get(low.index())?.as_ref()?;
        let offset = high.index() - low.index();
        Some((
            *class.vdw_dij.get(offset)?,
            *class.vdw_eij.get(offset)?,
        ))
    }

    fn scale_bonded_atoms(&self, atom: &Atom, vdw_scale: &mut [f64], coulomb_scale: &mut [f64]) {
        for &a in &atom.xbond12 {
            // Directly bonded atoms are also the shortest paths.
            vdw_scale[a.index()] = self.vdw_scale12;
            coulomb_scale[a.index()] = self.coulomb_scale12;
        }
        for path in &atom.xshort_path13 {
            let ix = path.0[1].index();
            vdw_scale[ix] = self.vdw_scale13;
            coulomb_scale[ix] = self.coulomb_scale13;
        }
        if self.vdw_scale14 != 1.0 || self.coulomb_scale14 != 1.0 {
            for path in &atom.xshort_path14 {
                let ix = path.0[2].index();
                vdw_scale[ix] = self.vdw_scale14;
                coulomb_scale[ix] = self.coulomb_scale14;
            }
        }
        if self.vdw_scale15 != 1.0 || self.coulomb_scale15 != 1.0 {
            for path in &atom.xshort_path15 {
                let ix = path.0[3].index();
                vdw_scale[ix] = self.vdw_scale15;
                coulomb_scale[ix] = self.coulomb_scale15;
            }
        }
    }

    fn unscale_bonded_atoms(&self, atom: &Atom, vdw_scale: &mut [f64], coulomb_scale: &mut [f64]) {
        for &a in &atom.xbond12 {
            vdw_scale[a.index()] = 1.0;
            coulomb_scale[a.index()] = 1.0;
        }
        for path in &atom.xshort_path13 {
            let ix = path.0[1].index();
            vdw_scale[ix] = 1.0;
            coulomb_scale[ix] = 1.0;
        }
        if self.vdw_scale14 != 1.0 || self.coulomb_scale14 != 1.0 {
            for path in &atom.xshort_path14 {
                let ix = path.0[2].index();
                vdw_scale[ix] = 1.0;
                coulomb_scale[ix] = 1.0;
            }
        }
        if self.vdw_scale15 != 1.0 || self.coulomb_scale15 != 1.0 {
            for path in &atom.xshort_path15 {
                let ix = path.0[3].index();
                vdw_scale[ix] = 1.0;
                coulomb_scale[ix] = 1.0;
            }
        }
    }

    /// Evaluates every bonded and nonbonded contribution and reduces them
    /// into per-host-body spatial forces and a scalar energy.
    pub(crate) fn compute_forces(
        &mut self,
    ) -> Result<(f64, Vec<SpatialForce>), ForceFieldError> {
        let n_atoms = self.atoms.len();
        let mut energy = 0.0;
        let mut forces = vec![SpatialForce::zero(); self.body_transforms.len()];

        // Ground-frame geometry of every atom, plus flat copies of the
        // per-atom quantities the pair loops consult constantly.
        let mut station_g = vec![Vector3::zeros(); n_atoms];
        let mut pos_g = vec![Point3::origin(); n_atoms];
        let mut body_of = vec![0usize; n_atoms];
        for body in &self.bodies {
            let x_gb = &self.body_transforms[body.host_body];
            for placement in &body.all_atoms {
                let ix = placement.atom.index();
                let rotated = x_gb.rotation * self.atoms[ix].station.coords;
                station_g[ix] = rotated;
                pos_g[ix] = Point3::from(x_gb.translation.vector + rotated);
                body_of[ix] = body.host_body;
            }
        }

        let mut charge = vec![0.0; n_atoms];
        let mut class_of = vec![AtomClassId(0); n_atoms];
        for (ix, atom) in self.atoms.iter().enumerate() {
            let charged = self.checked_charged_type(atom.charged_type)?;
            charge[ix] = charged.partial_charge.ok_or_else(|| {
                ForceFieldError::MissingParameter(format!(
                    "charged atom type {} has no partial charge",
                    charged.type_id
                ))
            })?;
            class_of[ix] = charged.atom_class;
        }

        // Scratch scale arrays; every write below is matched by a reset
        // before the focal atom changes.
        let mut vdw_scale = vec![1.0; n_atoms];
        let mut coulomb_scale = vec![1.0; n_atoms];

        for (body_ix, body1) in self.bodies.iter().enumerate() {
            let host1 = body1.host_body;
            for placement in &body1.all_atoms {
                let a1 = placement.atom;
                let a1ix = a1.index();
                let atom1 = &self.atoms[a1ix];
                let q1_factor = self.coulomb_global_scale * COULOMB_CONSTANT * charge[a1ix];

                // Bond stretch (1-2). Each bond shows up on both end
                // atoms; the lower-indexed end processes it.
                for (i, &a2) in atom1.xbond12.iter().enumerate() {
                    if a2 < a1 {
                        continue;
                    }
                    let a2ix = a2.index();
                    let term = &atom1.stretch[i];
                    let r = pos_g[a2ix] - pos_g[a1ix];
                    // TODO: pick a defined force direction when the two
                    // atoms coincide; d == 0 currently yields NaN.
                    let d = r.norm();
                    let stretch = d - term.d0;
                    let k = self.bond_stretch_global_scale * term.k;
                    let f2 = (-2.0 * k * stretch / d) * r;
                    energy += k * stretch * stretch; // no factor of 1/2
                    forces[body_of[a2ix]] += SpatialForce::applied_at(station_g[a2ix], f2);
                    forces[host1] -= SpatialForce::applied_at(station_g[a1ix], f2);
                }

                // Bond bend (1-2-3); the focal atom is an outer atom and
                // the tuple is processed by the lower-indexed end.
                for (i, path) in atom1.xbond13.iter().enumerate() {
                    let [a2, a3] = path.0;
                    if a3 < a1 {
                        continue;
                    }
                    let (a2ix, a3ix) = (a2.index(), a3.index());
                    let term = &atom1.bend[i];
                    // Atom 2 is the central one.
                    let eval = harmonic_bend(
                        &pos_g[a2ix],
                        &pos_g[a1ix],
                        &pos_g[a3ix],
                        term.k,
                        term.theta0,
                        self.bond_bend_global_scale,
                    );
                    energy += eval.energy;
                    forces[host1] += SpatialForce::applied_at(station_g[a1ix], eval.force_on_first);
                    forces[body_of[a2ix]] +=
                        SpatialForce::applied_at(station_g[a2ix], eval.force_on_center);
                    forces[body_of[a3ix]] +=
                        SpatialForce::applied_at(station_g[a3ix], eval.force_on_second);
                }

                // Bond torsion (1-2-3-4).
                for (i, path) in atom1.xbond14.iter().enumerate() {
                    let [a2, a3, a4] = path.0;
                    if a4 < a1 {
                        continue;
                    }
                    let (a2ix, a3ix, a4ix) = (a2.index(), a3.index(), a4.index());
                    let term = &atom1.torsion[i];
                    let eval = periodic_torsion(
                        &pos_g[a1ix],
                        &pos_g[a2ix],
                        &pos_g[a3ix],
                        &pos_g[a4ix],
                        &term.terms,
                        self.bond_torsion_global_scale,
                    );
                    energy += eval.energy;
                    forces[host1] += SpatialForce::applied_at(station_g[a1ix], eval.force_on_r);
                    forces[body_of[a2ix]] +=
                        SpatialForce::applied_at(station_g[a2ix], eval.force_on_x);
                    forces[body_of[a3ix]] +=
                        SpatialForce::applied_at(station_g[a3ix], eval.force_on_y);
                    forces[body_of[a4ix]] +=
                        SpatialForce::applied_at(station_g[a4ix], eval.force_on_s);
                }

                // Amber improper torsion: the focal atom is the *third*
                // atom of the geometry call, and no index-order skip
                // applies; the multi-match averaging already happened.
                for (i, triple) in atom1.improper_atoms.iter().enumerate() {
                    let [a2, a3, a4] = triple.0;
                    let (a2ix, a3ix, a4ix) = (a2.index(), a3.index(), a4.index());
                    let term = &atom1.improper[i];
                    let eval = periodic_torsion(
                        &pos_g[a2ix],
                        &pos_g[a3ix],
                        &pos_g[a1ix],
                        &pos_g[a4ix],
                        &term.terms,
                        self.amber_improper_torsion_global_scale,
                    );
                    energy += eval.energy;
                    forces[body_of[a2ix]] +=
                        SpatialForce::applied_at(station_g[a2ix], eval.force_on_r);
                    forces[body_of[a3ix]] +=
                        SpatialForce::applied_at(station_g[a3ix], eval.force_on_x);
                    forces[host1] += SpatialForce::applied_at(station_g[a1ix], eval.force_on_y);
                    forces[body_of[a4ix]] +=
                        SpatialForce::applied_at(station_g[a4ix], eval.force_on_s);
                }

                // Nonbonded terms against every atom on a higher body.
                self.scale_bonded_atoms(atom1, &mut vdw_scale, &mut coulomb_scale);

                for body2 in &self.bodies[body_ix + 1..] {
                    let host2 = body2.host_body;
                    for placement2 in &body2.all_atoms {
                        let a2ix = placement2.atom.index();
                        let r = pos_g[a2ix] - pos_g[a1ix];
                        let d2 = r.norm_squared();
                        let ood = 1.0 / d2.sqrt();
                        let ood2 = ood * ood;

                        let qq = coulomb_scale[a2ix] * q1_factor * charge[a2ix];
                        let e_coulomb = qq * ood;
                        // The force magnitude shares the energy's form; a
                        // factor of 1/d^2 is folded in below.
                        let f_coulomb = e_coulomb;

                        let (dij, eij) = self
                            .mixed_vdw(class_of[a1ix], class_of[a2ix])
                            .ok_or_else(|| {
                                ForceFieldError::MissingParameter(format!(
                                    "no mixed vdW entry for atom class pair ({},{})",
                                    class_of[a1ix], class_of[a2ix]
                                ))
                            })?;
                        let ddij2 = dij * dij * ood2;
                        let ddij6 = ddij2 * ddij2 * ddij2;
                        let ddij12 = ddij6 * ddij6;

                        let eij_scale = self.vdw_global_scale * vdw_scale[a2ix] * eij;
                        let e_vdw = eij_scale * (ddij12 - 2.0 * ddij6);
                        let f_vdw = 12.0 * eij_scale * (ddij12 - ddij6);

                        let fj = ((f_coulomb + f_vdw) * ood2) * r;
                        energy += e_coulomb + e_vdw;
                        forces[host2] += SpatialForce::applied_at(station_g[a2ix], fj);
                        forces[host1] -= SpatialForce::applied_at(station_g[a1ix], fj);
                    }
                }

                self.unscale_bonded_atoms(atom1, &mut vdw_scale, &mut coulomb_scale);
            }
        }

        if self.gbsa_global_scale != 0.0 {
            self.accumulate_gbsa(&mut energy, &mut forces, &pos_g, &station_g, &body_of, &charge)?;
        }

        trace!(energy, "force kernel complete");
        Ok((energy, forces))
    }
}
