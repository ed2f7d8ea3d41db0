//! Damped Buckingham exp-6-8 handler.
//!
//! U(r) = A·exp(−B·r) − f₆(γr)·C₆/r⁶ − f₈(γr)·C₈/r⁸, where fₙ is the
//! Tang–Toennies damping function and γ is a single handler-wide constant.

use super::attributes::{AttributeReader, ParseOptions, write_cosmetic};
use super::error::HandlerError;
use super::nonbonded::{CustomNonbondedSettings, PairForceSpec, SETTINGS_TOLERANCE, emit_pair_forces};
use super::{
    DEFAULT_SECTION_VERSION, ForceContext, ParameterHandler, ParameterList, ParameterType,
    PluginHandler, merge_peer,
};
use crate::core::forcefield::expressions;
use crate::core::forcefield::mixing::CombinationRule;
use crate::core::forcefield::potentials::DampedBuckingham68;
use crate::core::io::section::Section;
use crate::core::models::system::{GlobalParameter, System};
use crate::core::smirks::Smirks;
use crate::core::units::{Dimension, Quantity, Unit};
use std::any::Any;
use tracing::{debug, instrument};

const INVERSE_LENGTH: Dimension = Dimension::NONE.per(Dimension::LENGTH);
const C6_DIMENSION: Dimension = Dimension::MOLAR_ENERGY.times(Dimension::LENGTH.powi(6));
const C8_DIMENSION: Dimension = Dimension::MOLAR_ENERGY.times(Dimension::LENGTH.powi(8));

pub const DEFAULT_GAMMA: Quantity =
    Quantity::new(35.8967, Unit::named("nanometer ** -1", 1.0, INVERSE_LENGTH));

const PARAMETER_NAMES: [&str; 4] = ["a", "b", "c6", "c8"];
const COMBINATION_RULES: [(&str, CombinationRule); 4] = [
    ("a", CombinationRule::Geometric),
    ("b", CombinationRule::Harmonic),
    ("c6", CombinationRule::Geometric),
    ("c8", CombinationRule::Geometric),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DampedBuckingham68Type {
    pub smirks: Smirks,
    pub id: Option<String>,
    /// Repulsion prefactor (energy/mol).
    pub a: Quantity,
    /// Repulsion decay rate (1/length).
    pub b: Quantity,
    pub c6: Quantity,
    pub c8: Quantity,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl DampedBuckingham68Type {
    pub fn new(
        smirks: Smirks,
        a: Quantity,
        b: Quantity,
        c6: Quantity,
        c8: Quantity,
    ) -> Result<Self, HandlerError> {
        let parameter = Self {
            smirks,
            id: None,
            a,
            b,
            c6,
            c8,
            cosmetic_attributes: Vec::new(),
        };
        parameter.check_dimensions()?;
        Ok(parameter)
    }

    fn check_dimensions(&self) -> Result<(), HandlerError> {
        let expected = [
            ("a", &self.a, Dimension::MOLAR_ENERGY),
            ("b", &self.b, INVERSE_LENGTH),
            ("c6", &self.c6, C6_DIMENSION),
            ("c8", &self.c8, C8_DIMENSION),
        ];
        for (name, quantity, dimension) in expected {
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
        Ok(())
    }

    /// Canonical values ordered like the per-particle parameters.
    pub fn values(&self) -> Vec<f64> {
        vec![
            self.a.canonical(),
            self.b.canonical(),
            self.c6.canonical(),
            self.c8.canonical(),
        ]
    }
}

impl ParameterType for DampedBuckingham68Type {
    fn smirks(&self) -> &Smirks {
        &self.smirks
    }

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let mut reader = AttributeReader::new(section);
        let smirks = reader.smirks(Self::MAX_TAGGED_ATOMS)?;
        let id = reader.string("id");
        let a = reader.required_quantity("a", Dimension::MOLAR_ENERGY)?;
        let b = reader.required_quantity("b", INVERSE_LENGTH)?;
        let c6 = reader.required_quantity("c6", C6_DIMENSION)?;
        let c8 = reader.required_quantity("c8", C8_DIMENSION)?;
        let cosmetic_attributes = reader.finish(options)?;
        Ok(Self {
            smirks,
            id,
            a,
            b,
            c6,
            c8,
            cosmetic_attributes,
        })
    }

    fn to_section(&self) -> Section {
        let mut section = Section::new(Self::ELEMENT_NAME).with_attribute("smirks", &self.smirks);
        if let Some(id) = &self.id {
            section.set_attribute("id", id);
        }
        section.set_attribute("a", &self.a);
        section.set_attribute("b", &self.b);
        section.set_attribute("c6", &self.c6);
        section.set_attribute("c8", &self.c8);
        write_cosmetic(&mut section, &self.cosmetic_attributes);
        section
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DampedBuckingham68Handler {
    pub version: String,
    pub settings: CustomNonbondedSettings,
    pub gamma: Quantity,
    pub parameters: ParameterList<DampedBuckingham68Type>,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl Default for DampedBuckingham68Handler {
    fn default() -> Self {
        Self {
            version: DEFAULT_SECTION_VERSION.to_string(),
            settings: CustomNonbondedSettings::default(),
            gamma: DEFAULT_GAMMA,
            parameters: ParameterList::new(),
            cosmetic_attributes: Vec::new(),
        }
    }
}

impl DampedBuckingham68Handler {
    pub fn add_parameter(&mut self, parameter: DampedBuckingham68Type) -> Result<(), HandlerError> {
        self.parameters.push(Self::TAG_NAME, parameter)
    }

    /// The energy expression, with mixing rules applied to `name1`/`name2`.
    pub fn energy_expression() -> String {
        let mut statements = vec![
            "a*exp(-b*r)-f6*c6/r^6-f8*c8/r^8".to_string(),
            expressions::tang_toennies_definition("f6", 6, "gr"),
            expressions::tang_toennies_definition("f8", 8, "gr"),
            "gr=gamma*r".to_string(),
        ];
        statements.extend(expressions::combination_definitions(&COMBINATION_RULES));
        expressions::join(&statements)
    }

    /// The mixed potential between two parameter types.
    pub fn pair_potential(
        &self,
        first: &DampedBuckingham68Type,
        second: &DampedBuckingham68Type,
    ) -> DampedBuckingham68 {
        let (p, q) = (first.values(), second.values());
        let mixed: Vec<f64> = COMBINATION_RULES
            .iter()
            .enumerate()
            .map(|(i, (_, rule))| rule.mix(p[i], q[i]))
            .collect();
        DampedBuckingham68 {
            a: mixed[0],
            b: mixed[1],
            c6: mixed[2],
            c8: mixed[3],
            gamma: self.gamma.canonical(),
        }
    }

    fn validate(&self) -> Result<(), HandlerError> {
        self.settings.validate(Self::TAG_NAME)?;
        if self.gamma.canonical() <= 0.0 {
            return Err(HandlerError::InvalidSettings {
                tag: Self::TAG_NAME.to_string(),
                detail: format!("gamma must be positive, got {}", self.gamma),
            });
        }
        Ok(())
    }
}

impl ParameterHandler for DampedBuckingham68Handler {
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
        section.set_attribute("gamma", &self.gamma);
        write_cosmetic(&mut section, &self.cosmetic_attributes);
        self.parameters.write_children(&mut section);
        section
    }

    fn merge(&mut self, other: &dyn ParameterHandler) -> Result<(), HandlerError> {
        let other = merge_peer::<Self>(Self::TAG_NAME, other)?;
        self.settings
            .check_compatible(Self::TAG_NAME, &other.settings)?;
        if !self.gamma.approx_eq(&other.gamma, SETTINGS_TOLERANCE) {
            return Err(HandlerError::Incompatible {
                tag: Self::TAG_NAME.to_string(),
                detail: format!("gamma differs ({} vs {})", self.gamma, other.gamma),
            });
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
        debug!(
            atoms = assignments.len(),
            "Assigned damped Buckingham parameters"
        );

        let spec = PairForceSpec {
            energy_expression: Self::energy_expression(),
            per_particle_parameters: PARAMETER_NAMES.iter().map(|s| s.to_string()).collect(),
            global_parameters: vec![GlobalParameter::new("gamma", self.gamma.canonical())],
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

impl PluginHandler for DampedBuckingham68Handler {
    const TAG_NAME: &'static str = "DampedBuckingham68";

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let mut reader = AttributeReader::new(section);
        let version = reader
            .string("version")
            .unwrap_or_else(|| DEFAULT_SECTION_VERSION.to_string());
        let settings = CustomNonbondedSettings::read(Self::TAG_NAME, &mut reader)?;
        let gamma = reader.quantity_or("gamma", DEFAULT_GAMMA)?;
        let cosmetic_attributes = reader.finish(options)?;
        let parameters = ParameterList::from_children(Self::TAG_NAME, section, options)?;

        let handler = Self {
            version,
            settings,
            gamma,
            parameters,
            cosmetic_attributes,
        };
        handler.validate()?;
        debug!(
            parameters = handler.parameters.len(),
            "Loaded <{}> section",
            Self::TAG_NAME
        );
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::potentials::PairPotential;
    use crate::core::handlers::test_support::{carbon_chain, methane};
    use crate::core::matching::AtomicNumberMatcher;
    use crate::core::models::system::NonbondedMethod;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn parameter(smirks: &str, a: f64, b: f64, c6: f64, c8: f64) -> DampedBuckingham68Type {
        DampedBuckingham68Type::new(
            Smirks::new(smirks).unwrap(),
            Quantity::new(a, Unit::KILOJOULE_PER_MOLE),
            format!("{b} * nanometer ** -1").parse().unwrap(),
            format!("{c6} * kilojoule_per_mole * nanometer ** 6").parse().unwrap(),
            format!("{c8} * kilojoule_per_mole * nanometer ** 8").parse().unwrap(),
        )
        .unwrap()
    }

    fn handler() -> DampedBuckingham68Handler {
        let mut handler = DampedBuckingham68Handler::default();
        handler
            .add_parameter(parameter("[#1:1]", 2.0e4, 40.0, 1.0e-4, 1.0e-6))
            .unwrap();
        handler
            .add_parameter(parameter("[#6:1]", 4.0e4, 36.0, 2.0e-3, 3.0e-5))
            .unwrap();
        handler
    }

    fn context<'a>(
        topology: &'a crate::core::models::topology::Topology,
        periodic: bool,
    ) -> ForceContext<'a> {
        ForceContext {
            topology,
            matcher: &AtomicNumberMatcher,
            periodic,
            use_switching_function: true,
            long_range_correction: false,
        }
    }

    #[test]
    fn section_without_units_on_a_is_rejected() {
        let mut section = Section::new("DampedBuckingham68");
        section.push_child(
            Section::new("Atom")
                .with_attribute("smirks", "[#1:1]")
                .with_attribute("a", "1.0")
                .with_attribute("b", "1.0 * nanometer ** -1")
                .with_attribute("c6", "1.0 * kilojoule_per_mole * nanometer ** 6")
                .with_attribute("c8", "1.0 * kilojoule_per_mole * nanometer ** 8"),
        );
        let result = DampedBuckingham68Handler::from_section(&section, &ParseOptions::default());
        assert!(matches!(result, Err(HandlerError::MissingUnits { .. })));
    }

    #[test]
    fn gamma_defaults_when_absent() {
        let section = Section::new("DampedBuckingham68");
        let handler =
            DampedBuckingham68Handler::from_section(&section, &ParseOptions::default()).unwrap();
        assert!(f64_approx_equal(handler.gamma.canonical(), 35.8967));
        assert_eq!(handler.version, "0.3");
    }

    #[test]
    fn section_round_trip_preserves_handler() {
        let original = handler();
        let reparsed =
            DampedBuckingham68Handler::from_section(&original.to_section(), &ParseOptions::default())
                .unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn parameters_with_wrong_dimensions_are_rejected() {
        let result = DampedBuckingham68Type::new(
            Smirks::new("[#1:1]").unwrap(),
            Quantity::new(1.0, Unit::NANOMETER),
            "1.0 * nanometer ** -1".parse().unwrap(),
            "1.0 * kilojoule_per_mole * nanometer ** 6".parse().unwrap(),
            "1.0 * kilojoule_per_mole * nanometer ** 8".parse().unwrap(),
        );
        assert!(matches!(result, Err(HandlerError::UnitMismatch { .. })));
    }

    #[test]
    fn merge_appends_parameters_when_settings_agree() {
        let mut ours = handler();
        let mut theirs = DampedBuckingham68Handler::default();
        theirs
            .add_parameter(parameter("[#8:1]", 5.0e4, 38.0, 1.5e-3, 2.0e-5))
            .unwrap();

        ours.merge(&theirs).unwrap();
        assert_eq!(ours.parameter_count(), 3);
        assert!(ours.parameters.find("[#8:1]").is_some());
    }

    #[test]
    fn merge_rejects_different_gamma() {
        let mut ours = handler();
        let theirs = DampedBuckingham68Handler {
            gamma: "30.0 * nanometer ** -1".parse().unwrap(),
            ..DampedBuckingham68Handler::default()
        };
        let result = ours.merge(&theirs);
        assert!(matches!(result, Err(HandlerError::Incompatible { .. })));
        assert_eq!(ours.parameter_count(), 2);
    }

    #[test]
    fn energy_expression_contains_damping_and_mixing() {
        let expression = DampedBuckingham68Handler::energy_expression();
        assert!(expression.starts_with("a*exp(-b*r)-f6*c6/r^6-f8*c8/r^8; "));
        assert!(expression.contains("f8=1-exp(-gr)*("));
        assert!(expression.contains("gr^8/40320"));
        assert!(expression.contains("b=2*b1*b2/(b1+b2)"));
        assert!(expression.contains("c6=sqrt(c61*c62)"));
    }

    #[test]
    fn pair_potential_mixes_coefficients() {
        let handler = handler();
        let h = handler.parameters.find("[#1:1]").unwrap();
        let c = handler.parameters.find("[#6:1]").unwrap();
        let pair = handler.pair_potential(h, c);

        assert!(f64_approx_equal(pair.a, (2.0e4_f64 * 4.0e4).sqrt()));
        assert!(f64_approx_equal(pair.b, 2.0 * 40.0 * 36.0 / 76.0));
        assert!(f64_approx_equal(pair.gamma, 35.8967));
        assert!(pair.energy(0.4).is_finite());
        assert!(pair.force(0.1) > 0.0);
    }

    #[test]
    fn create_forces_emits_nonbonded_force_with_canonical_parameters() {
        let topology = methane();
        let mut system = System::new(topology.atom_count());
        handler()
            .create_forces(&context(&topology, false), &mut system)
            .unwrap();

        let force = system.custom_nonbonded("DampedBuckingham68").unwrap();
        assert_eq!(force.per_particle_parameters, vec!["a", "b", "c6", "c8"]);
        assert_eq!(force.particles.len(), 5);
        assert_eq!(force.particles[0], vec![4.0e4, 36.0, 2.0e-3, 3.0e-5]);
        assert_eq!(force.nonbonded_method, NonbondedMethod::NoCutoff);
        assert_eq!(force.switching_distance, None);
        assert_eq!(force.global_parameters[0].name, "gamma");
        // 1-2 and 1-3 pairs are excluded; methane has no 1-4 pairs.
        assert_eq!(force.exclusions.len(), 10);
        assert!(system.custom_bond("DampedBuckingham68").is_none());
    }

    #[test]
    fn periodic_systems_use_cutoff_and_switching() {
        let topology = methane();
        let mut system = System::new(topology.atom_count());
        handler()
            .create_forces(&context(&topology, true), &mut system)
            .unwrap();

        let force = system.custom_nonbonded("DampedBuckingham68").unwrap();
        assert_eq!(force.nonbonded_method, NonbondedMethod::CutoffPeriodic);
        assert!(f64_approx_equal(force.cutoff, 0.9));
        assert!(f64_approx_equal(force.switching_distance.unwrap(), 0.8));
    }

    #[test]
    fn scaled_one_four_pairs_become_bond_terms() {
        let topology = carbon_chain(4);
        let mut system = System::new(topology.atom_count());
        handler()
            .create_forces(&context(&topology, false), &mut system)
            .unwrap();

        let bonds = system.custom_bond("DampedBuckingham68").unwrap();
        assert_eq!(bonds.bonds.len(), 1);
        assert_eq!(bonds.bonds[0].atoms, (0, 3));
        assert_eq!(bonds.bonds[0].parameters[0], 0.5);
        assert_eq!(bonds.per_bond_parameters[0], "scale");
        assert_eq!(bonds.per_bond_parameters[1], "a1");
        assert_eq!(bonds.per_bond_parameters[5], "a2");
        assert!(bonds.energy_expression.starts_with("scale*pair_energy; pair_energy=a*exp"));

        let force = system.custom_nonbonded("DampedBuckingham68").unwrap();
        assert!(force.exclusions.contains(&(0, 3)));
        assert_eq!(force.exclusions.len(), 6);
    }

    #[test]
    fn unmatched_atoms_fail_force_creation() {
        let mut handler = DampedBuckingham68Handler::default();
        handler
            .add_parameter(parameter("[#6:1]", 4.0e4, 36.0, 2.0e-3, 3.0e-5))
            .unwrap();
        let topology = methane();
        let mut system = System::new(topology.atom_count());
        let result = handler.create_forces(&context(&topology, false), &mut system);
        assert!(matches!(result, Err(HandlerError::UnassignedAtom { atom: 1, .. })));
        assert!(system.forces().is_empty());
    }

    #[test]
    fn invalid_settings_set_in_code_fail_force_creation() {
        let topology = methane();
        let mut system = System::new(topology.atom_count());

        let mut negative_gamma = handler();
        negative_gamma.gamma = "-1.0 * nanometer ** -1".parse().unwrap();
        let result = negative_gamma.create_forces(&context(&topology, false), &mut system);
        assert!(matches!(result, Err(HandlerError::InvalidSettings { .. })));

        let mut wide_switch = handler();
        wide_switch.settings.switch_width = "10.0 * angstrom".parse().unwrap();
        let result = wide_switch.create_forces(&context(&topology, true), &mut system);
        assert!(matches!(result, Err(HandlerError::InvalidSettings { .. })));
        assert!(system.forces().is_empty());
    }
}
