use nalgebra::Point3;
use std::fmt::Debug;

/// Energy returned when particles coincide and a form has no finite limit.
const OVERLAP_ENERGY: f64 = 1e10;

/// Tang–Toennies damping function of order `n`,
/// fₙ(x) = 1 − e⁻ˣ Σₖ₌₀ⁿ xᵏ/k!.
///
/// For small `x` the subtraction loses all precision, so the complementary
/// tail e⁻ˣ Σₖ₌ₙ₊₁^∞ xᵏ/k! is summed instead.
pub fn tang_toennies_damping(order: u32, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }

    if x < f64::from(order) + 1.0 {
        let mut term = 1.0;
        for k in 1..=order + 1 {
            term *= x / f64::from(k);
        }
        let mut tail = 0.0;
        let mut k = order + 1;
        for _ in 0..256 {
            tail += term;
            k += 1;
            term *= x / f64::from(k);
            if term <= tail * f64::EPSILON {
                break;
            }
        }
        (-x).exp() * tail
    } else {
        let mut term = 1.0;
        let mut partial = 1.0;
        for k in 1..=order {
            term *= x / f64::from(k);
            partial += term;
        }
        1.0 - (-x).exp() * partial
    }
}

/// Damped Buckingham 6-8 energy,
/// E(r) = A·e^(−Br) − f₆(γr)·C₆/r⁶ − f₈(γr)·C₈/r⁸.
///
/// The damping removes the dispersion singularity, so E(0) = A.
#[inline]
pub fn damped_buckingham_68(r: f64, a: f64, b: f64, c6: f64, c8: f64, gamma: f64) -> f64 {
    if r <= 0.0 {
        return a;
    }
    let gr = gamma * r;
    a * (-b * r).exp()
        - tang_toennies_damping(6, gr) * c6 / r.powi(6)
        - tang_toennies_damping(8, gr) * c8 / r.powi(8)
}

/// Prefactors `(B, A)` of the double exponential so that its minimum is −ε at r = rₘ.
///
/// B = β·e^α/(α−β), A = α·e^β/(α−β).
pub fn double_exponential_prefactors(alpha: f64, beta: f64) -> (f64, f64) {
    let denominator = alpha - beta;
    (
        beta * alpha.exp() / denominator,
        alpha * beta.exp() / denominator,
    )
}

/// Double exponential energy, E(r) = ε·[B·e^(−αr/rₘ) − A·e^(−βr/rₘ)].
#[inline]
pub fn double_exponential(r: f64, epsilon: f64, r_min: f64, alpha: f64, beta: f64) -> f64 {
    let (repulsion, attraction) = double_exponential_prefactors(alpha, beta);
    let x = r / r_min;
    epsilon * (repulsion * (-alpha * x).exp() - attraction * (-beta * x).exp())
}

/// Damped exponential 6-8-10 energy,
/// E(r) = (F₀/β)·e^(−β(r−ρ)) − Σₙ fₙ(βr)·Cₙ/rⁿ for n = 6, 8, 10.
#[inline]
pub fn damped_exp_6810(
    r: f64,
    rho: f64,
    beta: f64,
    c6: f64,
    c8: f64,
    c10: f64,
    force_at_zero: f64,
) -> f64 {
    let repulsion = force_at_zero / beta * (-beta * (r.max(0.0) - rho)).exp();
    if r <= 0.0 {
        return repulsion;
    }
    let br = beta * r;
    repulsion
        - tang_toennies_damping(6, br) * c6 / r.powi(6)
        - tang_toennies_damping(8, br) * c8 / r.powi(8)
        - tang_toennies_damping(10, br) * c10 / r.powi(10)
}

/// Axilrod–Teller triple-dipole energy,
/// E = C₉·(1 + 3·cos γ₁·cos γ₂·cos γ₃)/(r₁₂·r₁₃·r₂₃)³.
pub fn axilrod_teller(c9: f64, p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> f64 {
    let v12 = p2 - p1;
    let v13 = p3 - p1;
    let v23 = p3 - p2;
    let (d12, d13, d23) = (v12.norm(), v13.norm(), v23.norm());
    if d12 < 1e-6 || d13 < 1e-6 || d23 < 1e-6 {
        return OVERLAP_ENERGY;
    }

    let cos1 = v12.dot(&v13) / (d12 * d13);
    let cos2 = -v12.dot(&v23) / (d12 * d23);
    let cos3 = v13.dot(&v23) / (d13 * d23);

    c9 * (1.0 + 3.0 * cos1 * cos2 * cos3) / (d12 * d13 * d23).powi(3)
}

/// Potential energy of an isotropic pair as a function of distance (nm).
pub trait PairPotential: Debug {
    /// Interaction energy in kJ/mol.
    fn energy(&self, r: f64) -> f64;

    /// Force magnitude, F(r) = −dU/dr.
    ///
    /// The default implementation uses a central difference and should be
    /// overridden where an analytical derivative is cheap.
    fn force(&self, r: f64) -> f64 {
        let h = 1e-6 * r.max(1e-3);
        -(self.energy(r + h) - self.energy(r - h)) / (2.0 * h)
    }
}

/// Mixed damped Buckingham 6-8 parameters for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampedBuckingham68 {
    pub a: f64,
    pub b: f64,
    pub c6: f64,
    pub c8: f64,
    pub gamma: f64,
}

impl PairPotential for DampedBuckingham68 {
    #[inline]
    fn energy(&self, r: f64) -> f64 {
        damped_buckingham_68(r, self.a, self.b, self.c6, self.c8, self.gamma)
    }
}

/// Mixed double exponential parameters for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleExponential {
    pub epsilon: f64,
    pub r_min: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl PairPotential for DoubleExponential {
    #[inline]
    fn energy(&self, r: f64) -> f64 {
        double_exponential(r, self.epsilon, self.r_min, self.alpha, self.beta)
    }

    fn force(&self, r: f64) -> f64 {
        let (repulsion, attraction) = double_exponential_prefactors(self.alpha, self.beta);
        let x = r / self.r_min;
        self.epsilon / self.r_min
            * (self.alpha * repulsion * (-self.alpha * x).exp()
                - self.beta * attraction * (-self.beta * x).exp())
    }
}

/// Mixed damped exponential 6-8-10 parameters for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampedExp6810 {
    pub rho: f64,
    pub beta: f64,
    pub c6: f64,
    pub c8: f64,
    pub c10: f64,
    pub force_at_zero: f64,
}

impl PairPotential for DampedExp6810 {
    #[inline]
    fn energy(&self, r: f64) -> f64 {
        damped_exp_6810(
            r,
            self.rho,
            self.beta,
            self.c6,
            self.c8,
            self.c10,
            self.force_at_zero,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn buckingham() -> DampedBuckingham68 {
        DampedBuckingham68 {
            a: 1.0e5,
            b: 35.0,
            c6: 1.0e-3,
            c8: 5.0e-5,
            gamma: 35.8967,
        }
    }

    #[test]
    fn tang_toennies_damping_is_zero_at_origin_and_one_at_infinity() {
        assert_eq!(tang_toennies_damping(6, 0.0), 0.0);
        assert!(f64_approx_equal(tang_toennies_damping(6, 200.0), 1.0));
    }

    #[test]
    fn tang_toennies_damping_branches_agree_at_the_switch_point() {
        for order in [6u32, 8, 10] {
            let x = f64::from(order) + 1.0;
            let below = tang_toennies_damping(order, x - 1e-9);
            let above = tang_toennies_damping(order, x);
            assert!((below - above).abs() < 1e-8, "order {order}");
        }
    }

    #[test]
    fn tang_toennies_damping_small_argument_matches_leading_term() {
        // f6(x) ≈ x⁷/7! for x → 0.
        let x: f64 = 1e-4;
        let expected = x.powi(7) / 5040.0;
        let actual = tang_toennies_damping(6, x);
        assert!((actual - expected).abs() / expected < 1e-3);
    }

    #[test]
    fn tang_toennies_damping_is_monotonic() {
        let mut previous = 0.0;
        for i in 1..200 {
            let value = tang_toennies_damping(8, f64::from(i) * 0.1);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn damped_buckingham_is_finite_for_positive_distances() {
        let potential = buckingham();
        for i in 1..=500 {
            let r = f64::from(i) * 0.005;
            assert!(potential.energy(r).is_finite(), "r = {r}");
        }
    }

    #[test]
    fn damped_buckingham_approaches_repulsive_prefactor_at_short_range() {
        let potential = buckingham();
        let energy = potential.energy(1e-6);
        assert!((energy - potential.a).abs() / potential.a < 1e-3);
        assert_eq!(potential.energy(0.0), potential.a);
        assert!(potential.energy(1e-4) > potential.energy(0.2));
    }

    #[test]
    fn damped_buckingham_vanishes_at_long_range() {
        let energy = buckingham().energy(50.0);
        assert!(energy.abs() < 1e-12);
    }

    #[test]
    fn damped_buckingham_without_dispersion_is_pure_exponential() {
        let energy = damped_buckingham_68(0.3, 100.0, 10.0, 0.0, 0.0, 35.0);
        assert!(f64_approx_equal(energy, 100.0 * (-3.0f64).exp()));
    }

    #[test]
    fn double_exponential_minimum_is_minus_epsilon_at_r_min() {
        let potential = DoubleExponential {
            epsilon: 0.5,
            r_min: 0.35,
            alpha: 18.7,
            beta: 3.3,
        };
        assert!(f64_approx_equal(potential.energy(0.35), -0.5));
        assert!(potential.force(0.35).abs() < 1e-8);
        assert!(potential.energy(0.34) > -0.5);
        assert!(potential.energy(0.36) > -0.5);
    }

    #[test]
    fn double_exponential_analytical_force_matches_central_difference() {
        let potential = DoubleExponential {
            epsilon: 0.5,
            r_min: 0.35,
            alpha: 18.7,
            beta: 3.3,
        };
        let r = 0.41;
        let h = 1e-7;
        let numerical = -(potential.energy(r + h) - potential.energy(r - h)) / (2.0 * h);
        assert!((potential.force(r) - numerical).abs() < 1e-5);
    }

    #[test]
    fn double_exponential_vanishes_at_long_range() {
        let energy = double_exponential(100.0, 0.5, 0.35, 18.7, 3.3);
        assert!(energy.abs() < 1e-12);
    }

    #[test]
    fn double_exponential_is_repulsive_at_short_range() {
        let energy = double_exponential(0.1, 0.5, 0.35, 18.7, 3.3);
        assert!(energy > 0.0);
    }

    #[test]
    fn double_exponential_prefactors_satisfy_force_balance() {
        let (alpha, beta): (f64, f64) = (18.7, 3.3);
        let (b, a) = double_exponential_prefactors(alpha, beta);
        // dE/dr at r = r_min: α·B·e^(−α) = β·A·e^(−β)
        let lhs = alpha * b * (-alpha).exp();
        let rhs = beta * a * (-beta).exp();
        assert!((lhs - rhs).abs() < 1e-9);
        // E(r_min) = −ε: B·e^(−α) − A·e^(−β) = −1
        assert!(f64_approx_equal(b * (-alpha).exp() - a * (-beta).exp(), -1.0));
    }

    #[test]
    fn damped_exp_6810_is_finite_at_origin_and_vanishes_far_away() {
        let potential = DampedExp6810 {
            rho: 0.35,
            beta: 38.0,
            c6: 1.0e-3,
            c8: 1.0e-4,
            c10: 1.0e-5,
            force_at_zero: 49.6144931952,
        };
        let at_zero = potential.energy(0.0);
        assert!(at_zero.is_finite());
        assert!(f64_approx_equal(
            at_zero,
            49.6144931952 / 38.0 * (38.0f64 * 0.35).exp()
        ));
        assert!(potential.energy(50.0).abs() < 1e-12);
    }

    #[test]
    fn damped_exp_6810_force_at_zero_sets_repulsive_slope() {
        let potential = DampedExp6810 {
            rho: 0.35,
            beta: 38.0,
            c6: 0.0,
            c8: 0.0,
            c10: 0.0,
            force_at_zero: 49.6144931952,
        };
        // With no dispersion the force at r = ρ equals F₀.
        assert!((potential.force(0.35) - 49.6144931952).abs() < 1e-4);
    }

    #[test]
    fn axilrod_teller_equilateral_triangle_matches_closed_form() {
        let d: f64 = 0.4;
        let p1 = Point3::new(0.0, 0.0, 0.0);
        let p2 = Point3::new(d, 0.0, 0.0);
        let p3 = Point3::new(d / 2.0, d * 3f64.sqrt() / 2.0, 0.0);
        let c9 = 2.0e-3;
        let expected = c9 * (1.0 + 3.0 * 0.125) / d.powi(9);
        assert!((axilrod_teller(c9, &p1, &p2, &p3) - expected).abs() < 1e-6 * expected);
    }

    #[test]
    fn axilrod_teller_is_attractive_for_collinear_triples() {
        let p1 = Point3::new(0.0, 0.0, 0.0);
        let p2 = Point3::new(0.3, 0.0, 0.0);
        let p3 = Point3::new(0.6, 0.0, 0.0);
        // cos γ = (1, -1, 1) for the end, middle, end atoms.
        assert!(axilrod_teller(1.0e-3, &p1, &p2, &p3) < 0.0);
    }

    #[test]
    fn axilrod_teller_coincident_particles_return_large_energy() {
        let p = Point3::new(0.1, 0.2, 0.3);
        let q = Point3::new(0.5, 0.2, 0.3);
        assert_eq!(axilrod_teller(1.0, &p, &p, &q), OVERLAP_ENERGY);
    }
}
