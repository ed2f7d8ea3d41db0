//! Double exponential handler.
//!
//! U(r) = ε·[β·e^α/(α−β)·exp(−α·r/r_m) − α·e^β/(α−β)·exp(−β·r/r_m)]
//!
//! The minimum sits at r = r_m with depth −ε for any α > β > 0.

use super::attributes::{AttributeReader, ParseOptions, write_cosmetic};
use super::error::HandlerError;
use super::nonbonded::{CustomNonbondedSettings, PairForceSpec, SETTINGS_TOLERANCE, emit_pair_forces};
use super::{
    DEFAULT_SECTION_VERSION, ForceContext, ParameterHandler, ParameterList, ParameterType,
    PluginHandler, merge_peer,
};
use crate::core::forcefield::expressions;
use crate::core::forcefield::mixing::CombinationRule;
use crate::core::forcefield::potentials::DoubleExponential;
use crate::core::io::section::Section;
use crate::core::models::system::{GlobalParameter, System};
use crate::core::smirks::Smirks;
use crate::core::units::{Dimension, Quantity, format_number};
use std::any::Any;
use tracing::{debug, instrument};

pub const DEFAULT_ALPHA: f64 = 18.7;
pub const DEFAULT_BETA: f64 = 3.3;

const PARAMETER_NAMES: [&str; 2] = ["r_min", "epsilon"];
const COMBINATION_RULES: [(&str, CombinationRule); 2] = [
    ("r_min", CombinationRule::Arithmetic),
    ("epsilon", CombinationRule::Geometric),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DoubleExponentialType {
    pub smirks: Smirks,
    pub id: Option<String>,
    /// Distance of the energy minimum.
    pub r_min: Quantity,
    /// Well depth.
    pub epsilon: Quantity,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl DoubleExponentialType {
    pub fn new(smirks: Smirks, r_min: Quantity, epsilon: Quantity) -> Result<Self, HandlerError> {
        for (name, quantity, dimension) in [
            ("r_min", &r_min, Dimension::LENGTH),
            ("epsilon", &epsilon, Dimension::MOLAR_ENERGY),
        ] {
            if quantity.dimension() != dimension {
                return Err(HandlerError::UnitMismatch {
                    element: Self::ELEMENT_NAME.to_string(),
                    attribute: name.to_string(),
                    value: quantity.to_string(),
                    expected: dimension,
                    found: quantity.dimension(),
                });
            }
        }
        Ok(Self {
            smirks,
            id: None,
            r_min,
            epsilon,
            cosmetic_attributes: Vec::new(),
        })
    }

    pub fn values(&self) -> Vec<f64> {
        vec![self.r_min.canonical(), self.epsilon.canonical()]
    }
}

impl ParameterType for DoubleExponentialType {
    fn smirks(&self) -> &Smirks {
        &self.smirks
    }

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let mut reader = AttributeReader::new(section);
        let smirks = reader.smirks(Self::MAX_TAGGED_ATOMS)?;
        let id = reader.string("id");
        let r_min = reader.required_quantity("r_min", Dimension::LENGTH)?;
        let epsilon = reader.required_quantity("epsilon", Dimension::MOLAR_ENERGY)?;
        let cosmetic_attributes = reader.finish(options)?;
        Ok(Self {
            smirks,
            id,
            r_min,
            epsilon,
            cosmetic_attributes,
        })
    }

    fn to_section(&self) -> Section {
        let mut section = Section::new(Self::ELEMENT_NAME).with_attribute("smirks", &self.smirks);
        if let Some(id) = &self.id {
            section.set_attribute("id", id);
        }
        section.set_attribute("r_min", &self.r_min);
        section.set_attribute("epsilon", &self.epsilon);
        write_cosmetic(&mut section, &self.cosmetic_attributes);
        section
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoubleExponentialHandler {
    pub version: String,
    pub settings: CustomNonbondedSettings,
    /// Repulsive exponent.
    pub alpha: f64,
    /// Attractive exponent.
    pub beta: f64,
    pub parameters: ParameterList<DoubleExponentialType>,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl Default for DoubleExponentialHandler {
    fn default() -> Self {
        Self {
            version: DEFAULT_SECTION_VERSION.to_string(),
            settings: CustomNonbondedSettings::default(),
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            parameters: ParameterList::new(),
            cosmetic_attributes: Vec::new(),
        }
    }
}

impl DoubleExponentialHandler {
    pub fn add_parameter(&mut self, parameter: DoubleExponentialType) -> Result<(), HandlerError> {
        self.parameters.push(Self::TAG_NAME, parameter)
    }

    pub fn energy_expression() -> String {
        let mut statements = vec![
            "epsilon*(repulsion_factor*exp(-alpha*x)-attraction_factor*exp(-beta*x))".to_string(),
            "x=r/r_min".to_string(),
            "repulsion_factor=beta*exp(alpha)/(alpha-beta)".to_string(),
            "attraction_factor=alpha*exp(beta)/(alpha-beta)".to_string(),
        ];
        statements.extend(expressions::combination_definitions(&COMBINATION_RULES));
        expressions::join(&statements)
    }

    pub fn pair_potential(
        &self,
        first: &DoubleExponentialType,
        second: &DoubleExponentialType,
    ) -> DoubleExponential {
        DoubleExponential {
            r_min: CombinationRule::Arithmetic
                .mix(first.r_min.canonical(), second.r_min.canonical()),
            epsilon: CombinationRule::Geometric
                .mix(first.epsilon.canonical(), second.epsilon.canonical()),
            alpha: self.alpha,
            beta: self.beta,
        }
    }

    fn validate(&self) -> Result<(), HandlerError> {
        self.settings.validate(Self::TAG_NAME)?;
        if !(self.beta > 0.0 && self.alpha > self.beta) {
            return Err(HandlerError::InvalidSettings {
                tag: Self::TAG_NAME.to_string(),
                detail: format!(
                    "exponents must satisfy alpha > beta > 0, got alpha={} beta={}",
                    self.alpha, self.beta
                ),
            });
        }
        Ok(())
    }
}

impl ParameterHandler for DoubleExponentialHandler {
    fn tag_name(&self) -> &'static str {
        Self::TAG_NAME
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn to_section(&self) -> Section {
        let mut section = Section::new(Self::TAG_NAME).with_attribute("version", &self.version);
        self.settings.write(&mut section);
        section.set_attribute("alpha", format_number(self.alpha));
        section.set_attribute("beta", format_number(self.beta));
        write_cosmetic(&mut section, &self.cosmetic_attributes);
        self.parameters.write_children(&mut section);
        section
    }

    fn merge(&mut self, other: &dyn ParameterHandler) -> Result<(), HandlerError> {
        let other = merge_peer::<Self>(Self::TAG_NAME, other)?;
        self.settings
            .check_compatible(Self::TAG_NAME, &other.settings)?;
        for (name, ours, theirs) in [
            ("alpha", self.alpha, other.alpha),
            ("beta", self.beta, other.beta),
        ] {
            if (ours - theirs).abs() > SETTINGS_TOLERANCE {
                return Err(HandlerError::Incompatible {
                    tag: Self::TAG_NAME.to_string(),
                    detail: format!("{name} differs ({ours} vs {theirs})"),
                });
            }
        }
        self.parameters
            .extend_from(Self::TAG_NAME, &other.parameters)
    }

    #[instrument(skip_all, fields(tag = Self::TAG_NAME, atoms = context.topology.atom_count()))]
    fn create_forces(
        &self,
        context: &ForceContext<'_>,
        system: &mut System,
    ) -> Result<(), HandlerError> {
        self.validate()?;
        let assignments = self
            .parameters
            .assign(Self::TAG_NAME, context.topology, context.matcher)?;

        let spec = PairForceSpec {
            energy_expression: Self::energy_expression(),
            per_particle_parameters: PARAMETER_NAMES.iter().map(|s| s.to_string()).collect(),
            global_parameters: vec![
                GlobalParameter::new("alpha", self.alpha),
                GlobalParameter::new("beta", self.beta),
            ],
            particles: assignments.iter().map(|a| a.parameter.values()).collect(),
        };
        emit_pair_forces(Self::TAG_NAME, &self.settings, spec, context, system);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl PluginHandler for DoubleExponentialHandler {
    const TAG_NAME: &'static str = "DoubleExponential";

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let mut reader = AttributeReader::new(section);
        let version = reader
            .string("version")
            .unwrap_or_else(|| DEFAULT_SECTION_VERSION.to_string());
        let settings = CustomNonbondedSettings::read(Self::TAG_NAME, &mut reader)?;
        let alpha = reader.float_or("alpha", DEFAULT_ALPHA)?;
        let beta = reader.float_or("beta", DEFAULT_BETA)?;
        let cosmetic_attributes = reader.finish(options)?;
        let parameters = ParameterList::from_children(Self::TAG_NAME, section, options)?;

        let handler = Self {
            version,
            settings,
            alpha,
            beta,
            parameters,
            cosmetic_attributes,
        };
        handler.validate()?;
        debug!(
            parameters = handler.parameters.len(),
            alpha, beta, "Loaded <{}> section", Self::TAG_NAME
        );
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::potentials::PairPotential;
    use crate::core::handlers::test_support::{TableMatcher, carbon_chain};
    use crate::core::models::system::Force;
    use crate::core::units::Unit;

    fn f64_approx_equal(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() < tolerance
    }

    fn section(alpha: &str, beta: &str) -> Section {
        let mut section = Section::new("DoubleExponential")
            .with_attribute("version", "0.3")
            .with_attribute("alpha", alpha)
            .with_attribute("beta", beta)
            .with_attribute("scale14", "0.5");
        section.push_child(
            Section::new("Atom")
                .with_attribute("smirks", "[#6:1]")
                .with_attribute("r_min", "3.816 * angstrom")
                .with_attribute("epsilon", "0.1094 * kilocalorie_per_mole"),
        );
        section
    }

    #[test]
    fn parses_exponents_and_parameters() {
        let handler =
            DoubleExponentialHandler::from_section(&section("18.7", "3.3"), &ParseOptions::default())
                .unwrap();
        assert!(f64_approx_equal(handler.alpha, 18.7, 1e-12));
        let carbon = handler.parameters.find("[#6:1]").unwrap();
        assert!(f64_approx_equal(carbon.r_min.canonical(), 0.3816, 1e-12));
        assert!(f64_approx_equal(carbon.epsilon.canonical(), 0.1094 * 4.184, 1e-12));
        assert_eq!(carbon.r_min.unit(), &Unit::ANGSTROM);
    }

    #[test]
    fn alpha_not_greater_than_beta_is_rejected() {
        let result =
            DoubleExponentialHandler::from_section(&section("3.0", "3.3"), &ParseOptions::default());
        assert!(matches!(result, Err(HandlerError::InvalidSettings { .. })));
    }

    #[test]
    fn round_trip_keeps_original_units() {
        let handler =
            DoubleExponentialHandler::from_section(&section("18.7", "3.3"), &ParseOptions::default())
                .unwrap();
        let written = handler.to_section();
        assert_eq!(written.children[0].attribute("r_min"), Some("3.816 * angstrom"));
        let reparsed =
            DoubleExponentialHandler::from_section(&written, &ParseOptions::default()).unwrap();
        assert_eq!(reparsed, handler);
    }

    #[test]
    fn merge_rejects_different_exponents() {
        let mut ours =
            DoubleExponentialHandler::from_section(&section("18.7", "3.3"), &ParseOptions::default())
                .unwrap();
        let theirs = DoubleExponentialHandler {
            alpha: 16.0,
            ..DoubleExponentialHandler::default()
        };
        assert!(matches!(
            ours.merge(&theirs),
            Err(HandlerError::Incompatible { .. })
        ));
    }

    #[test]
    fn merge_rejects_duplicate_smirks() {
        let mut ours =
            DoubleExponentialHandler::from_section(&section("18.7", "3.3"), &ParseOptions::default())
                .unwrap();
        let theirs = ours.clone();
        assert!(matches!(
            ours.merge(&theirs),
            Err(HandlerError::DuplicateParameter { .. })
        ));
        assert_eq!(ours.parameter_count(), 1);
    }

    #[test]
    fn pair_potential_has_minimum_at_mixed_r_min() {
        let mut handler = DoubleExponentialHandler::default();
        let a = DoubleExponentialType::new(
            Smirks::new("[#6:1]").unwrap(),
            Quantity::new(0.38, Unit::NANOMETER),
            Quantity::new(0.4, Unit::KILOJOULE_PER_MOLE),
        )
        .unwrap();
        let b = DoubleExponentialType::new(
            Smirks::new("[#1:1]").unwrap(),
            Quantity::new(0.26, Unit::NANOMETER),
            Quantity::new(0.1, Unit::KILOJOULE_PER_MOLE),
        )
        .unwrap();
        handler.add_parameter(a.clone()).unwrap();
        handler.add_parameter(b.clone()).unwrap();

        let pair = handler.pair_potential(&a, &b);
        assert!(f64_approx_equal(pair.r_min, 0.32, 1e-12));
        assert!(f64_approx_equal(pair.energy(0.32), -0.2, 1e-9));
        assert!(f64_approx_equal(pair.force(0.32), 0.0, 1e-9));
    }

    #[test]
    fn create_forces_passes_exponents_as_globals() {
        let handler =
            DoubleExponentialHandler::from_section(&section("18.7", "3.3"), &ParseOptions::default())
                .unwrap();
        let topology = carbon_chain(3);
        let matcher = TableMatcher(vec![("[#6:1]", vec![vec![0], vec![1], vec![2]])]);
        let context = ForceContext {
            topology: &topology,
            matcher: &matcher,
            periodic: true,
            use_switching_function: false,
            long_range_correction: true,
        };
        let mut system = System::new(3);
        handler.create_forces(&context, &mut system).unwrap();

        assert_eq!(system.forces().len(), 1);
        let Force::CustomNonbonded(force) = &system.forces()[0] else {
            panic!("expected a custom nonbonded force");
        };
        assert_eq!(force.per_particle_parameters, vec!["r_min", "epsilon"]);
        assert_eq!(force.global_parameters[0], GlobalParameter::new("alpha", 18.7));
        assert_eq!(force.global_parameters[1], GlobalParameter::new("beta", 3.3));
        assert_eq!(force.switching_distance, None);
        assert!(force.long_range_correction);
        assert!(force.energy_expression.contains("r_min=0.5*(r_min1+r_min2)"));
    }
}
