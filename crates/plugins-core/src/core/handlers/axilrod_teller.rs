//! Axilrod–Teller three-body dispersion handler.

use super::attributes::{AttributeReader, ParseOptions, write_cosmetic};
use super::error::HandlerError;
use super::nonbonded::SETTINGS_TOLERANCE;
use super::{
    DEFAULT_SECTION_VERSION, ForceContext, ParameterHandler, ParameterList, ParameterType,
    PluginHandler, merge_peer,
};
use crate::core::forcefield::potentials::axilrod_teller;
use crate::core::io::section::Section;
use crate::core::models::system::{CustomManyParticleForce, Force, NonbondedMethod, System};
use crate::core::smirks::Smirks;
use crate::core::units::{Dimension, Quantity, Unit};
use nalgebra::Point3;
use std::any::Any;
use tracing::{debug, instrument};

const C9_DIMENSION: Dimension = Dimension::MOLAR_ENERGY.times(Dimension::LENGTH.powi(9));

pub const DEFAULT_CUTOFF: Quantity = Quantity::new(9.0, Unit::ANGSTROM);
pub const PERIODIC_METHODS: &[&str] = &["cutoff-periodic"];
pub const NONPERIODIC_METHODS: &[&str] = &["no-cutoff", "cutoff-nonperiodic"];

/// Pairs at most this many bonds apart never share a triple.
const EXCLUDED_SEPARATION: u8 = 3;

pub const ENERGY_EXPRESSION: &str = "c9*(1+3*cos(theta1)*cos(theta2)*cos(theta3))/(r12*r13*r23)^3; \
theta1=angle(p2,p1,p3); theta2=angle(p1,p2,p3); theta3=angle(p1,p3,p2); \
r12=distance(p1,p2); r13=distance(p1,p3); r23=distance(p2,p3); \
c9=(c91*c92*c93)^(1/3)";

#[derive(Debug, Clone, PartialEq)]
pub struct AxilrodTellerType {
    pub smirks: Smirks,
    pub id: Option<String>,
    pub c9: Quantity,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl ParameterType for AxilrodTellerType {
    fn smirks(&self) -> &Smirks {
        &self.smirks
    }

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let mut reader = AttributeReader::new(section);
        let smirks = reader.smirks(Self::MAX_TAGGED_ATOMS)?;
        let id = reader.string("id");
        let c9 = reader.required_quantity("c9", C9_DIMENSION)?;
        let cosmetic_attributes = reader.finish(options)?;
        Ok(Self {
            smirks,
            id,
            c9,
            cosmetic_attributes,
        })
    }

    fn to_section(&self) -> Section {
        let mut section = Section::new(Self::ELEMENT_NAME).with_attribute("smirks", &self.smirks);
        if let Some(id) = &self.id {
            section.set_attribute("id", id);
        }
        section.set_attribute("c9", &self.c9);
        write_cosmetic(&mut section, &self.cosmetic_attributes);
        section
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxilrodTellerHandler {
    pub version: String,
    pub cutoff: Quantity,
    pub periodic_method: String,
    pub nonperiodic_method: String,
    pub parameters: ParameterList<AxilrodTellerType>,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl Default for AxilrodTellerHandler {
    fn default() -> Self {
        Self {
            version: DEFAULT_SECTION_VERSION.to_string(),
            cutoff: DEFAULT_CUTOFF,
            periodic_method: PERIODIC_METHODS[0].to_string(),
            nonperiodic_method: "cutoff-nonperiodic".to_string(),
            parameters: ParameterList::new(),
            cosmetic_attributes: Vec::new(),
        }
    }
}

impl AxilrodTellerHandler {
    pub fn add_parameter(&mut self, parameter: AxilrodTellerType) -> Result<(), HandlerError> {
        self.parameters.push(Self::TAG_NAME, parameter)
    }

    pub fn nonbonded_method(&self, periodic: bool) -> NonbondedMethod {
        match (periodic, self.nonperiodic_method.as_str()) {
            (true, _) => NonbondedMethod::CutoffPeriodic,
            (false, "no-cutoff") => NonbondedMethod::NoCutoff,
            (false, _) => NonbondedMethod::CutoffNonPeriodic,
        }
    }

    /// Energy of one triple with the mixed coefficient (c9ᵢ·c9ⱼ·c9ₖ)^(1/3).
    pub fn triple_energy(
        &self,
        parameters: [&AxilrodTellerType; 3],
        positions: [&Point3<f64>; 3],
    ) -> f64 {
        let c9 = parameters
            .iter()
            .map(|p| p.c9.canonical())
            .product::<f64>()
            .cbrt();
        axilrod_teller(c9, positions[0], positions[1], positions[2])
    }
}

impl ParameterHandler for AxilrodTellerHandler {
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
        let mut section = Section::new(Self::TAG_NAME)
            .with_attribute("version", &self.version)
            .with_attribute("cutoff", &self.cutoff)
            .with_attribute("periodic_method", &self.periodic_method)
            .with_attribute("nonperiodic_method", &self.nonperiodic_method);
        write_cosmetic(&mut section, &self.cosmetic_attributes);
        self.parameters.write_children(&mut section);
        section
    }

    fn merge(&mut self, other: &dyn ParameterHandler) -> Result<(), HandlerError> {
        let other = merge_peer::<Self>(Self::TAG_NAME, other)?;
        let incompatible = |detail: String| HandlerError::Incompatible {
            tag: Self::TAG_NAME.to_string(),
            detail,
        };
        if !self.cutoff.approx_eq(&other.cutoff, SETTINGS_TOLERANCE) {
            return Err(incompatible(format!(
                "cutoff differs ({} vs {})",
                self.cutoff, other.cutoff
            )));
        }
        if self.periodic_method != other.periodic_method
            || self.nonperiodic_method != other.nonperiodic_method
        {
            return Err(incompatible("nonbonded methods differ".to_string()));
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
        let assignments = self
            .parameters
            .assign(Self::TAG_NAME, context.topology, context.matcher)?;
        let exclusions: Vec<(usize, usize)> = context
            .topology
            .bond_separations(EXCLUDED_SEPARATION)
            .into_iter()
            .map(|(i, j, _)| (i, j))
            .collect();
        let method = self.nonbonded_method(context.periodic);

        debug!(
            particles = assignments.len(),
            exclusions = exclusions.len(),
            ?method,
            "Emitting Axilrod-Teller force"
        );

        system.add_force(Force::CustomManyParticle(CustomManyParticleForce {
            name: Self::TAG_NAME.to_string(),
            particles_per_set: 3,
            energy_expression: ENERGY_EXPRESSION.to_string(),
            per_particle_parameters: vec!["c9".to_string()],
            global_parameters: Vec::new(),
            particles: assignments
                .iter()
                .map(|a| vec![a.parameter.c9.canonical()])
                .collect(),
            exclusions,
            nonbonded_method: method,
            cutoff: self.cutoff.canonical(),
        }));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl PluginHandler for AxilrodTellerHandler {
    const TAG_NAME: &'static str = "AxilrodTeller";

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let defaults = Self::default();
        let mut reader = AttributeReader::new(section);
        let version = reader.string("version").unwrap_or(defaults.version);
        let cutoff = reader.quantity_or("cutoff", defaults.cutoff)?;
        let periodic_method =
            reader.choice_or("periodic_method", PERIODIC_METHODS, &defaults.periodic_method)?;
        let nonperiodic_method = reader.choice_or(
            "nonperiodic_method",
            NONPERIODIC_METHODS,
            &defaults.nonperiodic_method,
        )?;
        let cosmetic_attributes = reader.finish(options)?;
        let parameters = ParameterList::from_children(Self::TAG_NAME, section, options)?;

        if cutoff.canonical() <= 0.0 {
            return Err(HandlerError::InvalidSettings {
                tag: Self::TAG_NAME.to_string(),
                detail: format!("cutoff must be positive, got {cutoff}"),
            });
        }
        debug!(
            parameters = parameters.len(),
            "Loaded <{}> section",
            Self::TAG_NAME
        );
        Ok(Self {
            version,
            cutoff,
            periodic_method,
            nonperiodic_method,
            parameters,
            cosmetic_attributes,
        })
    }
}
