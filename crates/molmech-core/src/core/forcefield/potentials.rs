//! Geometry kernels for the bonded terms: the harmonic bend and the
//! periodic torsion. Both return the recovered angle, the potential energy,
//! and a force per atom, distributed so that the net force is zero and only
//! the intended torque remains.
//!
//! Every routine stays defined when the governing cross product degenerates
//! (collinear bend arms, a zero-length torsion axis): an arbitrary
//! perpendicular stands in for the missing direction and the emitted forces
//! still sum to zero. Energy minimization relies on this to escape such
//! configurations instead of diverging.

use crate::core::forcefield::params::TorsionTerm;
use nalgebra::{Point3, Vector3};

/// Result of a harmonic bend evaluation at a central atom `c` bonded to
/// outer atoms `r` and `s`.
#[derive(Debug, Clone, Copy)]
pub struct BendEvaluation {
    /// Recovered angle at the central atom, radians in [0, pi].
    pub theta: f64,
    /// kJ/mol.
    pub energy: f64,
    pub force_on_center: Vector3<f64>,
    pub force_on_first: Vector3<f64>,
    pub force_on_second: Vector3<f64>,
}

/// Result of a periodic torsion evaluation over atoms r-x-y-s.
#[derive(Debug, Clone, Copy)]
pub struct TorsionEvaluation {
    /// Dihedral angle in the polymer convention, radians in (-pi, pi].
    pub theta: f64,
    /// kJ/mol.
    pub energy: f64,
    pub force_on_r: Vector3<f64>,
    pub force_on_x: Vector3<f64>,
    pub force_on_y: Vector3<f64>,
    pub force_on_s: Vector3<f64>,
}

/// Some unit vector perpendicular to `v`, which must be nonzero.
fn any_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    // Cross against the coordinate axis least aligned with v.
    let abs = v.abs();
    let axis = if abs.x <= abs.y && abs.x <= abs.z {
        Vector3::x()
    } else if abs.y <= abs.z {
        Vector3::y()
    } else {
        Vector3::z()
    };
    v.cross(&axis).normalize()
}

/// Harmonic bend `k (theta - theta0)^2` (no factor of one half) at central
/// atom `c` with outer atoms at `r` and `s`, all in the ground frame.
///
/// The angle comes from `atan2(|r x s|, r . s)`, which stays accurate near
/// 0 and pi. Forces act in the plane of the two arms such that the net
/// force vanishes and the torque about the central atom matches
/// `-2 k (theta - theta0)`.
pub fn harmonic_bend(
    c: &Point3<f64>,
    r_pos: &Point3<f64>,
    s_pos: &Point3<f64>,
    k: f64,
    theta0: f64,
    scale: f64,
) -> BendEvaluation {
    let ks = scale * k;
    let r = r_pos - c;
    let s = s_pos - c;
    let rr = r.norm_squared();
    let ss = s.norm_squared();

    let rs = r.dot(&s);
    let rxs = r.cross(&s);
    let rxs_len = rxs.norm();
    let theta = rxs_len.atan2(rs);
    let bend = theta - theta0;
    let energy = ks * bend * bend;

    // p is a unit vector perpendicular to both arms. When the arms are
    // aligned or opposite the cross product vanishes and any perpendicular
    // to r serves.
    let p = if rxs_len != 0.0 {
        rxs / rxs_len
    } else {
        any_perpendicular(&r)
    };

    let ffac = -2.0 * ks * bend;
    let force_on_first = (ffac / rr) * r.cross(&p);
    let force_on_second = (ffac / ss) * p.cross(&s);
    let force_on_center = -(force_on_first + force_on_second);

    BendEvaluation {
        theta,
        energy,
        force_on_center,
        force_on_first,
        force_on_second,
    }
}

/// Periodic torsion over atoms bonded r-x-y-s, rotation about the axis
/// v = y - x, in the polymer convention (theta = 0 when r and s eclipse).
///
/// Energy is `sum amp_n (1 + cos(n theta - phase_n))` over the supplied
/// terms, and the matching pure torque is distributed to the four atoms so
/// that the net force and all torque components other than the axial one
/// cancel. The force distribution follows Tinker's `etors1`.
pub fn periodic_torsion(
    r_pos: &Point3<f64>,
    x_pos: &Point3<f64>,
    y_pos: &Point3<f64>,
    s_pos: &Point3<f64>,
    terms: &[TorsionTerm],
    scale: f64,
) -> TorsionEvaluation {
    // All vectors point along the r -> x -> y -> s direction.
    let r = x_pos - r_pos;
    let s = s_pos - y_pos;
    let xy = y_pos - x_pos;

    // Unit axis vector, with increasingly desperate fallbacks for
    // overlapping atoms. oov == 0 signals a missing axis.
    let vv = xy.norm_squared();
    let oov = if vv == 0.0 { 0.0 } else { 1.0 / vv.sqrt() };
    let v = if oov != 0.0 {
        xy * oov
    } else {
        let rxs = r.cross(&s);
        if rxs.norm() != 0.0 {
            rxs.normalize()
        } else {
            any_perpendicular(&r)
        }
    };

    // Plane normals: t for the r-x-y plane, u for the x-y-s plane. Theta is
    // zero when the normals align.
    let t = r.cross(&v);
    let u = v.cross(&s);
    let tt = t.norm_squared();
    let uu = u.norm_squared();

    // With r or s along the axis no torque can be generated.
    if tt == 0.0 || uu == 0.0 {
        return TorsionEvaluation {
            theta: 0.0,
            energy: 0.0,
            force_on_r: Vector3::zeros(),
            force_on_x: Vector3::zeros(),
            force_on_y: Vector3::zeros(),
            force_on_s: Vector3::zeros(),
        };
    }

    let txu = t.cross(&u);
    let oo_tu = 1.0 / (tt * uu).sqrt();
    let cos_theta = t.dot(&u) * oo_tu;
    let sin_theta = v.dot(&txu) * oo_tu;
    let theta = sin_theta.atan2(cos_theta);

    let mut energy = 0.0;
    let mut torque = 0.0;
    for term in terms {
        energy += term.energy(theta);
        torque += term.torque(theta);
    }
    energy *= scale;
    torque *= scale;

    let ry = y_pos - r_pos;
    let xs = s_pos - x_pos;
    let dedt = (torque / tt) * t.cross(&v);
    let dedu = -(torque / uu) * u.cross(&v);

    let force_on_r = dedt.cross(&v);
    let force_on_s = dedu.cross(&v);
    let (force_on_x, force_on_y) = if oov == 0.0 {
        // No axis; keep the forces summing to zero.
        (-force_on_r, -force_on_s)
    } else {
        (
            (ry.cross(&dedt) + dedu.cross(&s)) * oov,
            (dedt.cross(&r) + xs.cross(&dedu)) * oov,
        )
    };

    TorsionEvaluation {
        theta,
        energy,
        force_on_r,
        force_on_x,
        force_on_y,
        force_on_s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-9;

    fn term(periodicity: u32, amplitude: f64, phase: f64) -> TorsionTerm {
        TorsionTerm {
            periodicity,
            amplitude,
            phase,
        }
    }

    #[test]
    fn bend_recovers_right_angle() {
        let eval = harmonic_bend(
            &Point3::origin(),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
            100.0,
            PI / 2.0,
            1.0,
        );
        assert!((eval.theta - PI / 2.0).abs() < TOLERANCE);
        assert!(eval.energy.abs() < TOLERANCE);
        assert!(eval.force_on_first.norm() < TOLERANCE);
    }

    #[test]
    fn bend_energy_has_no_half_factor() {
        let k = 50.0;
        let theta0 = PI / 2.0;
        // Arms at 60 degrees.
        let eval = harmonic_bend(
            &Point3::origin(),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.5, 3.0_f64.sqrt() / 2.0, 0.0),
            k,
            theta0,
            1.0,
        );
        let bend = PI / 3.0 - theta0;
        assert!((eval.energy - k * bend * bend).abs() < 1e-9);
    }

    #[test]
    fn bend_forces_sum_to_zero() {
        let eval = harmonic_bend(
            &Point3::new(0.1, -0.2, 0.3),
            &Point3::new(1.0, 0.4, -0.1),
            &Point3::new(-0.3, 1.1, 0.6),
            75.0,
            1.9,
            1.0,
        );
        let net = eval.force_on_center + eval.force_on_first + eval.force_on_second;
        assert!(net.norm() < TOLERANCE);
    }

    #[test]
    fn bend_forces_match_finite_difference_gradient() {
        let c = Point3::new(0.0, 0.0, 0.0);
        let r = Point3::new(0.15, 0.01, -0.02);
        let s = Point3::new(-0.03, 0.14, 0.02);
        let (k, theta0) = (120.0, 1.8);
        let eval = harmonic_bend(&c, &r, &s, k, theta0, 1.0);

        let h = 1e-7;
        for axis in 0..3 {
            let mut plus = r;
            let mut minus = r;
            plus[axis] += h;
            minus[axis] -= h;
            let de = (harmonic_bend(&c, &plus, &s, k, theta0, 1.0).energy
                - harmonic_bend(&c, &minus, &s, k, theta0, 1.0).energy)
                / (2.0 * h);
            assert!(
                (eval.force_on_first[axis] + de).abs() < 1e-5,
                "axis {} force {} vs -dE {}",
                axis,
                eval.force_on_first[axis],
                -de
            );
        }
    }

    #[test]
    fn collinear_bend_still_produces_balanced_forces() {
        let eval = harmonic_bend(
            &Point3::origin(),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(-1.0, 0.0, 0.0),
            60.0,
            104.5_f64.to_radians(),
            1.0,
        );
        assert!((eval.theta - PI).abs() < TOLERANCE);
        assert!(eval.energy > 0.0);
        let net = eval.force_on_center + eval.force_on_first + eval.force_on_second;
        assert!(net.norm() < TOLERANCE);
        // The restoring forces themselves must not vanish.
        assert!(eval.force_on_first.norm() > 0.0);
    }

    // Chain r-x-y-s with the x->y axis along +z and a dihedral of the
    // requested sign in the polymer convention.
    fn staggered_chain(dihedral_deg: f64) -> [Point3<f64>; 4] {
        let phi = dihedral_deg.to_radians();
        [
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(phi.cos(), phi.sin(), 1.0),
        ]
    }

    #[test]
    fn torsion_angle_matches_constructed_dihedral() {
        for deg in [-150.0, -60.0, 0.0, 60.0, 120.0, 180.0] {
            let [r, x, y, s] = staggered_chain(deg);
            let eval = periodic_torsion(&r, &x, &y, &s, &[term(1, 1.0, 0.0)], 1.0);
            let expected = deg.to_radians();
            let diff = (eval.theta - expected + PI).rem_euclid(2.0 * PI) - PI;
            assert!(diff.abs() < 1e-9, "dihedral {} recovered {}", deg, eval.theta);
        }
    }

    #[test]
    fn torsion_energy_at_sixty_degrees_single_term() {
        let [r, x, y, s] = staggered_chain(60.0);
        let eval = periodic_torsion(&r, &x, &y, &s, &[term(3, 0.6, 0.0)], 1.0);
        // 0.6 * (1 + cos(180)) = 0; at 60 degrees a 3-fold term crosses zero.
        assert!(eval.energy.abs() < 1e-9);

        let [r, x, y, s] = staggered_chain(0.0);
        let eval = periodic_torsion(&r, &x, &y, &s, &[term(3, 0.6, 0.0)], 1.0);
        assert!((eval.energy - 1.2).abs() < 1e-9);
    }

    #[test]
    fn torsion_forces_sum_to_zero() {
        let [r, x, y, s] = staggered_chain(47.0);
        let eval = periodic_torsion(&r, &x, &y, &s, &[term(3, 0.6, 0.0), term(1, 0.2, 1.0)], 1.0);
        let net = eval.force_on_r + eval.force_on_x + eval.force_on_y + eval.force_on_s;
        assert!(net.norm() < TOLERANCE);
    }

    #[test]
    fn torsion_forces_match_finite_difference_gradient() {
        let r = Point3::new(0.9, 0.1, 1.1);
        let x = Point3::new(0.0, 0.0, 1.0);
        let y = Point3::new(0.1, -0.1, 0.0);
        let s = Point3::new(0.8, 0.5, -0.2);
        let terms = [term(3, 0.6, 0.0), term(2, 0.3, 0.5)];
        let eval = periodic_torsion(&r, &x, &y, &s, &terms, 1.0);

        let h = 1e-7;
        let positions = [r, x, y, s];
        let forces = [
            eval.force_on_r,
            eval.force_on_x,
            eval.force_on_y,
            eval.force_on_s,
        ];
        for (i, base) in positions.iter().enumerate() {
            for axis in 0..3 {
                let mut plus = positions;
                let mut minus = positions;
                plus[i][axis] = base[axis] + h;
                minus[i][axis] = base[axis] - h;
                let de = (periodic_torsion(&plus[0], &plus[1], &plus[2], &plus[3], &terms, 1.0)
                    .energy
                    - periodic_torsion(&minus[0], &minus[1], &minus[2], &minus[3], &terms, 1.0)
                        .energy)
                    / (2.0 * h);
                assert!(
                    (forces[i][axis] + de).abs() < 1e-5,
                    "atom {} axis {}",
                    i,
                    axis
                );
            }
        }
    }

    #[test]
    fn torsion_reversed_quad_gives_identical_energy() {
        let [r, x, y, s] = staggered_chain(60.0);
        let terms = [term(3, 0.6, 0.0)];
        let forward = periodic_torsion(&r, &x, &y, &s, &terms, 1.0);
        let reversed = periodic_torsion(&s, &y, &x, &r, &terms, 1.0);
        assert!((forward.energy - reversed.energy).abs() < TOLERANCE);
    }

    #[test]
    fn degenerate_axis_yields_zero_sum_placeholder_forces() {
        // x and y coincide: no axis exists.
        let x = Point3::new(0.0, 0.0, 0.0);
        let eval = periodic_torsion(
            &Point3::new(1.0, 0.0, 0.0),
            &x,
            &x,
            &Point3::new(0.0, 1.0, 0.0),
            &[term(2, 1.0, 0.0)],
            1.0,
        );
        let net = eval.force_on_r + eval.force_on_x + eval.force_on_y + eval.force_on_s;
        assert!(net.norm() < TOLERANCE);
    }

    #[test]
    fn arm_aligned_with_axis_short_circuits_to_zero() {
        // r lies along the x-y axis, so no torque is possible.
        let eval = periodic_torsion(
            &Point3::new(0.0, 0.0, 2.0),
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &[term(3, 0.6, 0.0)],
            1.0,
        );
        assert_eq!(eval.energy, 0.0);
        assert_eq!(eval.force_on_s.norm(), 0.0);
    }

    #[test]
    fn torsion_scale_multiplies_energy_and_forces() {
        let [r, x, y, s] = staggered_chain(25.0);
        let terms = [term(3, 0.6, 0.0)];
        let base = periodic_torsion(&r, &x, &y, &s, &terms, 1.0);
        let scaled = periodic_torsion(&r, &x, &y, &s, &terms, 2.5);
        assert!((scaled.energy - 2.5 * base.energy).abs() < 1e-9);
        assert!((scaled.force_on_r - base.force_on_r * 2.5).norm() < 1e-9);
    }
}
