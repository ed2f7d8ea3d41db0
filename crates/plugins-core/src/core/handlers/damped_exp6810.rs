//! Damped exponential 6-8-10 handler.
//!
//! U(r) = (F₀/β)·exp(−β(r−ρ)) − Σₙ fₙ(βr)·Cₙ/rⁿ for n = 6, 8, 10, with
//! Tang–Toennies damping driven by the mixed exponent β.

use super::attributes::{AttributeReader, ParseOptions, write_cosmetic};
use super::error::HandlerError;
use super::nonbonded::{CustomNonbondedSettings, PairForceSpec, SETTINGS_TOLERANCE, emit_pair_forces};
use super::{
    DEFAULT_SECTION_VERSION, ForceContext, ParameterHandler, ParameterList, ParameterType,
    PluginHandler, merge_peer,
};
use crate::core::forcefield::expressions;
use crate::core::forcefield::mixing::CombinationRule;
use crate::core::forcefield::potentials::DampedExp6810;
use crate::core::io::section::Section;
use crate::core::models::system::{GlobalParameter, System};
use crate::core::smirks::Smirks;
use crate::core::units::{Dimension, Quantity, Unit};
use std::any::Any;
use tracing::{debug, instrument};

const INVERSE_LENGTH: Dimension = Dimension::NONE.per(Dimension::LENGTH);
const FORCE_DIMENSION: Dimension = Dimension::MOLAR_ENERGY.per(Dimension::LENGTH);

const fn dispersion_dimension(power: i8) -> Dimension {
    Dimension::MOLAR_ENERGY.times(Dimension::LENGTH.powi(power))
}

pub const DEFAULT_FORCE_AT_ZERO: Quantity = Quantity::new(
    49.6144931952,
    Unit::named("kilojoule_per_mole * nanometer ** -1", 1.0, FORCE_DIMENSION),
);

const PARAMETER_NAMES: [&str; 5] = ["rho", "beta", "c6", "c8", "c10"];
const COMBINATION_RULES: [(&str, CombinationRule); 5] = [
    ("rho", CombinationRule::Arithmetic),
    ("beta", CombinationRule::Geometric),
    ("c6", CombinationRule::Geometric),
    ("c8", CombinationRule::Geometric),
    ("c10", CombinationRule::Geometric),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DampedExp6810Type {
    pub smirks: Smirks,
    pub id: Option<String>,
    pub rho: Quantity,
    pub beta: Quantity,
    pub c6: Quantity,
    pub c8: Quantity,
    pub c10: Quantity,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl DampedExp6810Type {
    fn expected_dimensions() -> [(&'static str, Dimension); 5] {
        [
            ("rho", Dimension::LENGTH),
            ("beta", INVERSE_LENGTH),
            ("c6", dispersion_dimension(6)),
            ("c8", dispersion_dimension(8)),
            ("c10", dispersion_dimension(10)),
        ]
    }

    fn quantities(&self) -> [&Quantity; 5] {
        [&self.rho, &self.beta, &self.c6, &self.c8, &self.c10]
    }

    pub fn values(&self) -> Vec<f64> {
        self.quantities().iter().map(|q| q.canonical()).collect()
    }
}

impl ParameterType for DampedExp6810Type {
    fn smirks(&self) -> &Smirks {
        &self.smirks
    }

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let mut reader = AttributeReader::new(section);
        let smirks = reader.smirks(Self::MAX_TAGGED_ATOMS)?;
        let id = reader.string("id");
        let [rho, beta, c6, c8, c10] = Self::expected_dimensions()
            .map(|(name, dimension)| reader.required_quantity(name, dimension));
        let (rho, beta, c6, c8, c10) = (rho?, beta?, c6?, c8?, c10?);
        let cosmetic_attributes = reader.finish(options)?;
        Ok(Self {
            smirks,
            id,
            rho,
            beta,
            c6,
            c8,
            c10,
            cosmetic_attributes,
        })
    }

    fn to_section(&self) -> Section {
        let mut section = Section::new(Self::ELEMENT_NAME).with_attribute("smirks", &self.smirks);
        if let Some(id) = &self.id {
            section.set_attribute("id", id);
        }
        for ((name, _), quantity) in Self::expected_dimensions().iter().zip(self.quantities()) {
            section.set_attribute(*name, quantity);
        }
        write_cosmetic(&mut section, &self.cosmetic_attributes);
        section
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DampedExp6810Handler {
    pub version: String,
    pub settings: CustomNonbondedSettings,
    /// Magnitude of the repulsive force at r = ρ.
    pub force_at_zero: Quantity,
    pub parameters: ParameterList<DampedExp6810Type>,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl Default for DampedExp6810Handler {
    fn default() -> Self {
        Self {
            version: DEFAULT_SECTION_VERSION.to_string(),
            settings: CustomNonbondedSettings::default(),
            force_at_zero: DEFAULT_FORCE_AT_ZERO,
            parameters: ParameterList::new(),
            cosmetic_attributes: Vec::new(),
        }
    }
}

impl DampedExp6810Handler {
    pub fn add_parameter(&mut self, parameter: DampedExp6810Type) -> Result<(), HandlerError> {
        self.parameters.push(Self::TAG_NAME, parameter)
    }

    pub fn energy_expression() -> String {
        let mut statements = vec![
            "repulsion-f6*c6/r^6-f8*c8/r^8-f10*c10/r^10".to_string(),
            "repulsion=force_at_zero/beta*exp(-beta*(r-rho))".to_string(),
            expressions::tang_toennies_definition("f6", 6, "br"),
            expressions::tang_toennies_definition("f8", 8, "br"),
            expressions::tang_toennies_definition("f10", 10, "br"),
            "br=beta*r".to_string(),
        ];
        statements.extend(expressions::combination_definitions(&COMBINATION_RULES));
        expressions::join(&statements)
    }

    pub fn pair_potential(
        &self,
        first: &DampedExp6810Type,
        second: &DampedExp6810Type,
    ) -> DampedExp6810 {
        let (p, q) = (first.values(), second.values());
        let mixed: Vec<f64> = COMBINATION_RULES
            .iter()
            .enumerate()
            .map(|(i, (_, rule))| rule.mix(p[i], q[i]))
            .collect();
        DampedExp6810 {
            rho: mixed[0],
            beta: mixed[1],
            c6: mixed[2],
            c8: mixed[3],
            c10: mixed[4],
            force_at_zero: self.force_at_zero.canonical(),
        }
    }

    fn validate(&self) -> Result<(), HandlerError> {
        self.settings.validate(Self::TAG_NAME)?;
        if self.force_at_zero.canonical() <= 0.0 {
            return Err(HandlerError::InvalidSettings {
                tag: Self::TAG_NAME.to_string(),
                detail: format!("force_at_zero must be positive, got {}", self.force_at_zero),
            });
        }
        Ok(())
    }
}

impl ParameterHandler for DampedExp6810Handler {
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
        section.set_attribute("force_at_zero", &self.force_at_zero);
        write_cosmetic(&mut section, &self.cosmetic_attributes);
        self.parameters.write_children(&mut section);
        section
    }

    fn merge(&mut self, other: &dyn ParameterHandler) -> Result<(), HandlerError> {
        let other = merge_peer::<Self>(Self::TAG_NAME, other)?;
        self.settings
            .check_compatible(Self::TAG_NAME, &other.settings)?;
        if !self
            .force_at_zero
            .approx_eq(&other.force_at_zero, SETTINGS_TOLERANCE)
        {
            return Err(HandlerError::Incompatible {
                tag: Self::TAG_NAME.to_string(),
                detail: format!(
                    "force_at_zero differs ({} vs {})",
                    self.force_at_zero, other.force_at_zero
                ),
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

        let spec = PairForceSpec {
            energy_expression: Self::energy_expression(),
            per_particle_parameters: PARAMETER_NAMES.iter().map(|s| s.to_string()).collect(),
            global_parameters: vec![GlobalParameter::new(
                "force_at_zero",
                self.force_at_zero.canonical(),
            )],
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

impl PluginHandler for DampedExp6810Handler {
    const TAG_NAME: &'static str = "DampedExp6810";

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let mut reader = AttributeReader::new(section);
        let version = reader
            .string("version")
            .unwrap_or_else(|| DEFAULT_SECTION_VERSION.to_string());
        let settings = CustomNonbondedSettings::read(Self::TAG_NAME, &mut reader)?;
        let force_at_zero = reader.quantity_or("force_at_zero", DEFAULT_FORCE_AT_ZERO)?;
        let cosmetic_attributes = reader.finish(options)?;
        let parameters = ParameterList::from_children(Self::TAG_NAME, section, options)?;

        let handler = Self {
            version,
            settings,
            force_at_zero,
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
