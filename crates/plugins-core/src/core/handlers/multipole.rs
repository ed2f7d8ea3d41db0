//! AMOEBA-style multipole and polarizability handler.
//!
//! Each atom receives a permanent dipole and quadrupole in a local frame
//! defined by up to three axis atoms taken from its SMIRKS match, plus an
//! isotropic polarizability. Partial charges are not parameters of this
//! handler; they are read from the topology after the charge handlers ran.

use super::attributes::{AttributeReader, ParseOptions, write_cosmetic};
use super::error::HandlerError;
use super::nonbonded::SETTINGS_TOLERANCE;
use super::{
    Assignment, DEFAULT_SECTION_VERSION, ForceContext, ParameterHandler, ParameterList,
    ParameterType, PluginHandler, merge_peer,
};
use crate::core::io::section::Section;
use crate::core::models::system::{
    AmoebaMultipoleForce, AxisType, CovalentMap, Force, MultipoleParticle, NonbondedMethod,
    PolarizationType, System,
};
use crate::core::models::topology::Topology;
use crate::core::smirks::Smirks;
use crate::core::units::{Dimension, Quantity, Unit, format_number};
use std::any::Any;
use tracing::{debug, instrument, warn};

const DIPOLE_DIMENSION: Dimension = Dimension::CHARGE.times(Dimension::LENGTH);
const QUADRUPOLE_DIMENSION: Dimension = Dimension::CHARGE.times(Dimension::LENGTH.powi(2));
const POLARITY_DIMENSION: Dimension = Dimension::LENGTH.powi(3);

const ZERO_DIPOLE: Quantity = Quantity::new(
    0.0,
    Unit::named("elementary_charge * nanometer", 1.0, DIPOLE_DIMENSION),
);
const ZERO_QUADRUPOLE: Quantity = Quantity::new(
    0.0,
    Unit::named("elementary_charge * nanometer ** 2", 1.0, QUADRUPOLE_DIMENSION),
);
const ZERO_POLARITY: Quantity = Quantity::new(
    0.0,
    Unit::named("nanometer ** 3", 1.0, POLARITY_DIMENSION),
);

const DIPOLE_NAMES: [&str; 3] = ["dipoleX", "dipoleY", "dipoleZ"];
const QUADRUPOLE_NAMES: [&str; 9] = [
    "quadrupoleXX",
    "quadrupoleXY",
    "quadrupoleXZ",
    "quadrupoleYX",
    "quadrupoleYY",
    "quadrupoleYZ",
    "quadrupoleZX",
    "quadrupoleZY",
    "quadrupoleZZ",
];
const AXIS_ATOM_NAMES: [&str; 3] = ["multipoleAtomZ", "multipoleAtomX", "multipoleAtomY"];

/// Marks an unused axis atom.
pub const NO_AXIS_ATOM: i64 = -1;

pub const PERIODIC_METHODS: &[&str] = &["PME"];
pub const NONPERIODIC_METHODS: &[&str] = &["no-cutoff"];
pub const POLARIZATION_TYPES: &[&str] = &["mutual", "direct", "extrapolated"];

#[derive(Debug, Clone, PartialEq)]
pub struct MultipoleType {
    pub smirks: Smirks,
    pub id: Option<String>,
    pub dipole: [Quantity; 3],
    /// Row-major, `XX` through `ZZ`.
    pub quadrupole: [Quantity; 9],
    pub axis_type: AxisType,
    /// Tag indices (1-based) of the Z, X and Y axis atoms in the SMIRKS
    /// match, or [`NO_AXIS_ATOM`].
    pub axis_atoms: [i64; 3],
    pub polarity: Quantity,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl MultipoleType {
    /// A site with no permanent moments and no polarizability.
    pub fn new(smirks: Smirks) -> Self {
        Self {
            smirks,
            id: None,
            dipole: [ZERO_DIPOLE; 3],
            quadrupole: [ZERO_QUADRUPOLE; 9],
            axis_type: AxisType::NoAxisType,
            axis_atoms: [NO_AXIS_ATOM; 3],
            polarity: ZERO_POLARITY,
            cosmetic_attributes: Vec::new(),
        }
    }

    /// Maps the axis tags onto topology indices using the atom's match.
    fn resolve_axis_atoms(&self, tag: &str, matched: &[usize]) -> Result<[i64; 3], HandlerError> {
        let mut resolved = [NO_AXIS_ATOM; 3];
        for ((slot, &axis_tag), name) in resolved.iter_mut().zip(&self.axis_atoms).zip(AXIS_ATOM_NAMES)
        {
            if axis_tag == NO_AXIS_ATOM {
                continue;
            }
            let atom = usize::try_from(axis_tag - 1)
                .ok()
                .and_then(|index| matched.get(index))
                .ok_or_else(|| HandlerError::InvalidSettings {
                    tag: tag.to_string(),
                    detail: format!(
                        "{name}={axis_tag} of '{}' is outside its match of {} atoms",
                        self.smirks,
                        matched.len()
                    ),
                })?;
            *slot = *atom as i64;
        }
        Ok(resolved)
    }
}

impl ParameterType for MultipoleType {
    const MAX_TAGGED_ATOMS: usize = 4;

    fn smirks(&self) -> &Smirks {
        &self.smirks
    }

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let mut reader = AttributeReader::new(section);
        let mut parameter = Self::new(reader.smirks(Self::MAX_TAGGED_ATOMS)?);
        parameter.id = reader.string("id");

        for (slot, name) in parameter.dipole.iter_mut().zip(DIPOLE_NAMES) {
            *slot = reader.quantity_or(name, ZERO_DIPOLE)?;
        }
        for (slot, name) in parameter.quadrupole.iter_mut().zip(QUADRUPOLE_NAMES) {
            *slot = reader.quantity_or(name, ZERO_QUADRUPOLE)?;
        }

        if let Some(name) = reader.string("axisType") {
            parameter.axis_type =
                AxisType::from_name(&name).ok_or_else(|| HandlerError::InvalidChoice {
                    element: Self::ELEMENT_NAME.to_string(),
                    attribute: "axisType".to_string(),
                    value: name.clone(),
                    allowed: AxisType::ALL.iter().map(|a| a.name().to_string()).collect(),
                })?;
        }

        let tag_count = parameter.smirks.tagged_atom_count() as i64;
        for (slot, name) in parameter.axis_atoms.iter_mut().zip(AXIS_ATOM_NAMES) {
            let value = reader.int_or(name, NO_AXIS_ATOM)?;
            if value != NO_AXIS_ATOM && !(2..=tag_count).contains(&value) {
                return Err(HandlerError::MalformedValue {
                    element: Self::ELEMENT_NAME.to_string(),
                    attribute: name.to_string(),
                    value: value.to_string(),
                    reason: format!(
                        "must be -1 or a tag between 2 and {tag_count} of '{}'",
                        parameter.smirks
                    ),
                });
            }
            *slot = value;
        }

        parameter.polarity = reader.quantity_or("polarity", ZERO_POLARITY)?;
        if parameter.polarity.canonical() < 0.0 {
            return Err(HandlerError::MalformedValue {
                element: Self::ELEMENT_NAME.to_string(),
                attribute: "polarity".to_string(),
                value: parameter.polarity.to_string(),
                reason: "polarizability cannot be negative".to_string(),
            });
        }
        parameter.cosmetic_attributes = reader.finish(options)?;
        Ok(parameter)
    }

    fn to_section(&self) -> Section {
        let mut section = Section::new(Self::ELEMENT_NAME).with_attribute("smirks", &self.smirks);
        if let Some(id) = &self.id {
            section.set_attribute("id", id);
        }
        for (name, quantity) in DIPOLE_NAMES.iter().zip(&self.dipole) {
            section.set_attribute(*name, quantity);
        }
        for (name, quantity) in QUADRUPOLE_NAMES.iter().zip(&self.quadrupole) {
            section.set_attribute(*name, quantity);
        }
        section.set_attribute("axisType", self.axis_type.name());
        for (name, value) in AXIS_ATOM_NAMES.iter().zip(self.axis_atoms) {
            section.set_attribute(*name, value);
        }
        section.set_attribute("polarity", &self.polarity);
        write_cosmetic(&mut section, &self.cosmetic_attributes);
        section
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipoleHandler {
    pub version: String,
    pub cutoff: Quantity,
    pub periodic_method: String,
    pub nonperiodic_method: String,
    pub polarization_type: String,
    pub ewald_error_tolerance: f64,
    pub thole: f64,
    pub target_epsilon: f64,
    pub max_iter: i64,
    pub parameters: ParameterList<MultipoleType>,
    pub cosmetic_attributes: Vec<(String, String)>,
}

impl Default for MultipoleHandler {
    fn default() -> Self {
        Self {
            version: DEFAULT_SECTION_VERSION.to_string(),
            cutoff: Quantity::new(0.9, Unit::NANOMETER),
            periodic_method: PERIODIC_METHODS[0].to_string(),
            nonperiodic_method: NONPERIODIC_METHODS[0].to_string(),
            polarization_type: "extrapolated".to_string(),
            ewald_error_tolerance: 1e-4,
            thole: 0.39,
            target_epsilon: 1e-5,
            max_iter: 60,
            parameters: ParameterList::new(),
            cosmetic_attributes: Vec::new(),
        }
    }
}

impl MultipoleHandler {
    pub fn add_parameter(&mut self, parameter: MultipoleType) -> Result<(), HandlerError> {
        self.parameters.push(Self::TAG_NAME, parameter)
    }

    pub fn polarization(&self) -> PolarizationType {
        match self.polarization_type.as_str() {
            "mutual" => PolarizationType::Mutual,
            "direct" => PolarizationType::Direct,
            _ => PolarizationType::Extrapolated,
        }
    }

    fn particle(
        &self,
        topology: &Topology,
        assignment: &Assignment<'_, MultipoleType>,
    ) -> Result<MultipoleParticle, HandlerError> {
        let parameter = assignment.parameter;
        let atom = assignment.atoms[0];
        let [atom_z, atom_x, atom_y] =
            parameter.resolve_axis_atoms(Self::TAG_NAME, &assignment.atoms)?;
        let polarity = parameter.polarity.canonical();

        Ok(MultipoleParticle {
            charge: topology.atom(atom).map_or(0.0, |a| a.partial_charge),
            dipole: parameter.dipole.each_ref().map(Quantity::canonical),
            quadrupole: parameter.quadrupole.each_ref().map(Quantity::canonical),
            axis_type: parameter.axis_type,
            atom_z,
            atom_x,
            atom_y,
            thole: self.thole,
            damping_factor: polarity.powf(1.0 / 6.0),
            polarity,
        })
    }

    fn covalent_maps(topology: &Topology) -> Vec<CovalentMap> {
        let mut maps = vec![CovalentMap::default(); topology.atom_count()];
        for (i, j, separation) in topology.bond_separations(4) {
            for (from, to) in [(i, j), (j, i)] {
                let map = &mut maps[from];
                let list = match separation {
                    1 => &mut map.covalent12,
                    2 => &mut map.covalent13,
                    3 => &mut map.covalent14,
                    _ => &mut map.covalent15,
                };
                list.push(to);
            }
        }
        for map in &mut maps {
            for list in [
                &mut map.covalent12,
                &mut map.covalent13,
                &mut map.covalent14,
                &mut map.covalent15,
            ] {
                list.sort_unstable();
            }
        }
        maps
    }

    fn validate(&self) -> Result<(), HandlerError> {
        let invalid = |detail: String| HandlerError::InvalidSettings {
            tag: Self::TAG_NAME.to_string(),
            detail,
        };
        if self.cutoff.canonical() <= 0.0 {
            return Err(invalid(format!("cutoff must be positive, got {}", self.cutoff)));
        }
        if self.max_iter <= 0 || self.max_iter > i64::from(u32::MAX) {
            return Err(invalid(format!(
                "max_iter must be a positive integer, got {}",
                self.max_iter
            )));
        }
        for (name, value) in [
            ("ewald_error_tolerance", self.ewald_error_tolerance),
            ("target_epsilon", self.target_epsilon),
        ] {
            if value <= 0.0 {
                return Err(invalid(format!("{name} must be positive, got {value}")));
            }
        }
        Ok(())
    }
}

impl ParameterHandler for MultipoleHandler {
    fn tag_name(&self) -> &'static str {
        Self::TAG_NAME
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[
            "VirtualSites",
            "vdW",
            "Electrostatics",
            "ToolkitAM1BCC",
            "LibraryCharges",
        ]
    }

    fn to_section(&self) -> Section {
        let mut section = Section::new(Self::TAG_NAME)
            .with_attribute("version", &self.version)
            .with_attribute("cutoff", &self.cutoff)
            .with_attribute("periodic_method", &self.periodic_method)
            .with_attribute("nonperiodic_method", &self.nonperiodic_method)
            .with_attribute("polarization_type", &self.polarization_type)
            .with_attribute(
                "ewald_error_tolerance",
                format_number(self.ewald_error_tolerance),
            )
            .with_attribute("thole", format_number(self.thole))
            .with_attribute("target_epsilon", format_number(self.target_epsilon))
            .with_attribute("max_iter", self.max_iter);
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
        for (name, ours, theirs) in [
            ("periodic_method", &self.periodic_method, &other.periodic_method),
            ("nonperiodic_method", &self.nonperiodic_method, &other.nonperiodic_method),
            ("polarization_type", &self.polarization_type, &other.polarization_type),
        ] {
            if ours != theirs {
                return Err(incompatible(format!("{name} differs ({ours} vs {theirs})")));
            }
        }
        for (name, ours, theirs) in [
            ("ewald_error_tolerance", self.ewald_error_tolerance, other.ewald_error_tolerance),
            ("thole", self.thole, other.thole),
            ("target_epsilon", self.target_epsilon, other.target_epsilon),
        ] {
            if (ours - theirs).abs() > SETTINGS_TOLERANCE * ours.abs().max(theirs.abs()).max(1.0) {
                return Err(incompatible(format!("{name} differs ({ours} vs {theirs})")));
            }
        }
        if self.max_iter != other.max_iter {
            return Err(incompatible(format!(
                "max_iter differs ({} vs {})",
                self.max_iter, other.max_iter
            )));
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
        let topology = context.topology;
        let assignments = self
            .parameters
            .assign(Self::TAG_NAME, topology, context.matcher)?;

        if topology.atoms().iter().all(|atom| atom.partial_charge == 0.0) {
            warn!("All partial charges are zero; were the charge handlers applied first?");
        }

        let particles = assignments
            .iter()
            .map(|assignment| self.particle(topology, assignment))
            .collect::<Result<Vec<_>, _>>()?;
        let nonbonded_method = if context.periodic {
            NonbondedMethod::Pme
        } else {
            NonbondedMethod::NoCutoff
        };

        debug!(
            particles = particles.len(),
            ?nonbonded_method,
            polarization = self.polarization_type.as_str(),
            "Emitting AMOEBA multipole force"
        );

        system.add_force(Force::AmoebaMultipole(AmoebaMultipoleForce {
            name: Self::TAG_NAME.to_string(),
            nonbonded_method,
            cutoff: self.cutoff.canonical(),
            polarization_type: self.polarization(),
            ewald_error_tolerance: self.ewald_error_tolerance,
            mutual_induced_target_epsilon: self.target_epsilon,
            mutual_induced_max_iterations: u32::try_from(self.max_iter).unwrap_or(u32::MAX),
            particles,
            covalent_maps: Self::covalent_maps(topology),
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

impl PluginHandler for MultipoleHandler {
    const TAG_NAME: &'static str = "Multipole";

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError> {
        let defaults = Self::default();
        let mut reader = AttributeReader::new(section);
        let handler = Self {
            version: reader.string("version").unwrap_or(defaults.version),
            cutoff: reader.quantity_or("cutoff", defaults.cutoff)?,
            periodic_method: reader.choice_or(
                "periodic_method",
                PERIODIC_METHODS,
                &defaults.periodic_method,
            )?,
            nonperiodic_method: reader.choice_or(
                "nonperiodic_method",
                NONPERIODIC_METHODS,
                &defaults.nonperiodic_method,
            )?,
            polarization_type: reader.choice_or(
                "polarization_type",
                POLARIZATION_TYPES,
                &defaults.polarization_type,
            )?,
            ewald_error_tolerance: reader
                .float_or("ewald_error_tolerance", defaults.ewald_error_tolerance)?,
            thole: reader.float_or("thole", defaults.thole)?,
            target_epsilon: reader.float_or("target_epsilon", defaults.target_epsilon)?,
            max_iter: reader.int_or("max_iter", defaults.max_iter)?,
            parameters: ParameterList::from_children(Self::TAG_NAME, section, options)?,
            cosmetic_attributes: Vec::new(),
        };
        let handler = Self {
            cosmetic_attributes: reader.finish(options)?,
            ..handler
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
    use crate::core::handlers::test_support::{TableMatcher, methane};

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn section() -> Section {
        let mut section = Section::new("Multipole")
            .with_attribute("version", "0.3")
            .with_attribute("polarization_type", "mutual");
        section.push_child(
            Section::new("Atom")
                .with_attribute("smirks", "[#6:1]-[#1:2]")
                .with_attribute("dipoleZ", "0.02 * elementary_charge * nanometer")
                .with_attribute("quadrupoleZZ", "-0.001 * elementary_charge * nanometer ** 2")
                .with_attribute("axisType", "ZOnly")
                .with_attribute("multipoleAtomZ", "2")
                .with_attribute("polarity", "1.334 * angstrom ** 3"),
        );
        section.push_child(
            Section::new("Atom")
                .with_attribute("smirks", "[#1:1]-[#6:2]")
                .with_attribute("axisType", "ZOnly")
                .with_attribute("multipoleAtomZ", "2")
                .with_attribute("polarity", "0.000496 * nanometer ** 3"),
        );
        section
    }

    fn matcher() -> TableMatcher {
        TableMatcher(vec![
            ("[#6:1]-[#1:2]", vec![vec![0, 1], vec![0, 2], vec![0, 3], vec![0, 4]]),
            ("[#1:1]-[#6:2]", vec![vec![1, 0], vec![2, 0], vec![3, 0], vec![4, 0]]),
        ])
    }

    #[test]
    fn parses_moments_axis_and_polarity() {
        let handler = MultipoleHandler::from_section(&section(), &ParseOptions::default()).unwrap();
        let carbon = handler.parameters.find("[#6:1]-[#1:2]").unwrap();
        assert!(f64_approx_equal(carbon.dipole[2].canonical(), 0.02));
        assert!(f64_approx_equal(carbon.dipole[0].canonical(), 0.0));
        assert!(f64_approx_equal(carbon.quadrupole[8].canonical(), -0.001));
        assert_eq!(carbon.axis_type, AxisType::ZOnly);
        assert_eq!(carbon.axis_atoms, [2, NO_AXIS_ATOM, NO_AXIS_ATOM]);
        assert!((carbon.polarity.canonical() - 1.334e-3).abs() < 1e-15);
        assert_eq!(handler.polarization(), PolarizationType::Mutual);
        assert_eq!(handler.max_iter, 60);
    }

    #[test]
    fn unknown_axis_type_is_rejected() {
        let mut section = Section::new("Multipole");
        section.push_child(
            Section::new("Atom")
                .with_attribute("smirks", "[#6:1]")
                .with_attribute("axisType", "Sideways"),
        );
        let result = MultipoleHandler::from_section(&section, &ParseOptions::default());
        assert!(matches!(result, Err(HandlerError::InvalidChoice { .. })));
    }

    #[test]
    fn axis_atom_must_refer_to_a_tagged_neighbor() {
        let mut section = Section::new("Multipole");
        section.push_child(
            Section::new("Atom")
                .with_attribute("smirks", "[#6:1]-[#1:2]")
                .with_attribute("multipoleAtomZ", "3"),
        );
        let result = MultipoleHandler::from_section(&section, &ParseOptions::default());
        assert!(matches!(result, Err(HandlerError::MalformedValue { .. })));
    }

    #[test]
    fn section_round_trip_preserves_handler() {
        let handler = MultipoleHandler::from_section(&section(), &ParseOptions::default()).unwrap();
        let reparsed =
            MultipoleHandler::from_section(&handler.to_section(), &ParseOptions::default()).unwrap();
        assert_eq!(reparsed, handler);
    }

    #[test]
    fn depends_on_charge_handlers() {
        let handler = MultipoleHandler::default();
        assert!(handler.dependencies().contains(&"Electrostatics"));
        assert!(handler.dependencies().contains(&"LibraryCharges"));
    }

    #[test]
    fn create_forces_resolves_axis_atoms_and_charges() {
        let handler = MultipoleHandler::from_section(&section(), &ParseOptions::default()).unwrap();
        let topology = methane();
        let matcher = matcher();
        let context = ForceContext {
            topology: &topology,
            matcher: &matcher,
            periodic: true,
            use_switching_function: false,
            long_range_correction: false,
        };
        let mut system = System::new(topology.atom_count());
        handler.create_forces(&context, &mut system).unwrap();

        let Force::AmoebaMultipole(force) = &system.forces()[0] else {
            panic!("expected an AMOEBA multipole force");
        };
        assert_eq!(force.nonbonded_method, NonbondedMethod::Pme);
        assert_eq!(force.polarization_type, PolarizationType::Mutual);
        assert_eq!(force.mutual_induced_max_iterations, 60);

        let carbon = &force.particles[0];
        assert!(f64_approx_equal(carbon.charge, -0.4));
        // The last matching row for atom 0 is [0, 4].
        assert_eq!((carbon.atom_z, carbon.atom_x, carbon.atom_y), (4, -1, -1));
        assert!((carbon.damping_factor - 1.334e-3_f64.powf(1.0 / 6.0)).abs() < 1e-12);

        let hydrogen = &force.particles[3];
        assert_eq!(hydrogen.atom_z, 0);
        assert!(f64_approx_equal(hydrogen.charge, 0.1));

        assert_eq!(force.covalent_maps[0].covalent12, vec![1, 2, 3, 4]);
        assert_eq!(force.covalent_maps[1].covalent12, vec![0]);
        assert_eq!(force.covalent_maps[1].covalent13, vec![2, 3, 4]);
        assert!(force.covalent_maps[1].covalent14.is_empty());
    }

    #[test]
    fn nonperiodic_systems_use_no_cutoff() {
        let handler = MultipoleHandler::from_section(&section(), &ParseOptions::default()).unwrap();
        let topology = methane();
        let matcher = matcher();
        let context = ForceContext {
            topology: &topology,
            matcher: &matcher,
            periodic: false,
            use_switching_function: false,
            long_range_correction: false,
        };
        let mut system = System::new(topology.atom_count());
        handler.create_forces(&context, &mut system).unwrap();
        let Force::AmoebaMultipole(force) = &system.forces()[0] else {
            panic!("expected an AMOEBA multipole force");
        };
        assert_eq!(force.nonbonded_method, NonbondedMethod::NoCutoff);
    }
}
