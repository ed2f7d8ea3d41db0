//! Builders for custom-force energy expressions.
//!
//! Expressions follow the host engine's syntax: the first statement is the
//! energy, later `name=value` statements define intermediate variables, and
//! statements are separated by `;`.

use super::mixing::CombinationRule;

/// Σₖ₌₀ⁿ xᵏ/k! written out for the variable `x`.
pub fn tang_toennies_sum(order: u32, x: &str) -> String {
    let mut terms = vec!["1".to_string()];
    let mut factorial: u64 = 1;
    for k in 1..=u64::from(order) {
        factorial *= k;
        terms.push(match k {
            1 => x.to_string(),
            _ => format!("{x}^{k}/{factorial}"),
        });
    }
    terms.join("+")
}

/// `name=1-exp(-x)*(Σₖ₌₀ⁿ xᵏ/k!)`
pub fn tang_toennies_definition(name: &str, order: u32, x: &str) -> String {
    format!("{name}=1-exp(-{x})*({})", tang_toennies_sum(order, x))
}

/// One definition per mixed coefficient.
pub fn combination_definitions(rules: &[(&str, CombinationRule)]) -> Vec<String> {
    rules
        .iter()
        .map(|(name, rule)| rule.expression(name))
        .collect()
}

pub fn join(statements: &[String]) -> String {
    statements.join("; ")
}

/// Wraps a pair energy expression so that it is multiplied by a per-bond `scale`.
pub fn scaled(energy_expression: &str) -> String {
    format!("scale*pair_energy; pair_energy={energy_expression}")
}
