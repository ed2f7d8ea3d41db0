/// Rule combining the per-particle coefficients of two unlike particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationRule {
    /// (x₁ + x₂)/2
    Arithmetic,
    /// √(x₁·x₂)
    Geometric,
    /// 2·x₁·x₂/(x₁ + x₂)
    Harmonic,
}

impl CombinationRule {
    #[inline]
    pub fn mix(self, a: f64, b: f64) -> f64 {
        match self {
            CombinationRule::Arithmetic => 0.5 * (a + b),
            CombinationRule::Geometric => (a * b).sqrt(),
            CombinationRule::Harmonic => {
                if a + b == 0.0 {
                    0.0
                } else {
                    2.0 * a * b / (a + b)
                }
            }
        }
    }

    /// Definition of the mixed `name` in terms of `name1` and `name2`, in
    /// custom-force expression syntax.
    pub fn expression(self, name: &str) -> String {
        match self {
            CombinationRule::Arithmetic => format!("{name}=0.5*({name}1+{name}2)"),
            CombinationRule::Geometric => format!("{name}=sqrt({name}1*{name}2)"),
            CombinationRule::Harmonic => format!("{name}=2*{name}1*{name}2/({name}1+{name}2)"),
        }
    }
}
