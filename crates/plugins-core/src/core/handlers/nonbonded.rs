//! Settings and force emission shared by the pairwise custom-nonbonded
//! handlers.
//!
//! Pairs closer than five bonds are scaled by `scale12` to `scale15`. A pair
//! with scale 1 is left to the nonbonded force. Any other scale excludes the
//! pair there, and a nonzero scale adds it back as an explicit bond term
//! multiplied by that scale.

use super::attributes::AttributeReader;
use super::error::HandlerError;
use super::ForceContext;
use crate::core::forcefield::expressions;
use crate::core::io::section::Section;
use crate::core::models::system::{
    BondTerm, CustomBondForce, CustomNonbondedForce, Force, GlobalParameter, NonbondedMethod,
    System,
};
use crate::core::units::{Quantity, Unit, format_number};
use tracing::debug;

/// Relative tolerance used when comparing section-level settings.
pub const SETTINGS_TOLERANCE: f64 = 1e-5;

pub const PERIODIC_METHODS: &[&str] = &["cutoff"];
pub const NONPERIODIC_METHODS: &[&str] = &["no-cutoff"];

pub const DEFAULT_CUTOFF: Quantity = Quantity::new(9.0, Unit::ANGSTROM);
pub const DEFAULT_SWITCH_WIDTH: Quantity = Quantity::new(1.0, Unit::ANGSTROM);

#[derive(Debug, Clone, PartialEq)]
pub struct CustomNonbondedSettings {
    pub scale12: f64,
    pub scale13: f64,
    pub scale14: f64,
    pub scale15: f64,
    pub cutoff: Quantity,
    pub periodic_method: String,
    pub nonperiodic_method: String,
    pub switch_width: Quantity,
}

impl Default for CustomNonbondedSettings {
    fn default() -> Self {
        Self {
            scale12: 0.0,
            scale13: 0.0,
            scale14: 0.5,
            scale15: 1.0,
            cutoff: DEFAULT_CUTOFF,
            periodic_method: PERIODIC_METHODS[0].to_string(),
            nonperiodic_method: NONPERIODIC_METHODS[0].to_string(),
            switch_width: DEFAULT_SWITCH_WIDTH,
        }
    }
}

impl CustomNonbondedSettings {
    pub fn read(tag: &str, reader: &mut AttributeReader<'_>) -> Result<Self, HandlerError> {
        let defaults = Self::default();
        let settings = Self {
            scale12: reader.float_or("scale12", defaults.scale12)?,
            scale13: reader.float_or("scale13", defaults.scale13)?,
            scale14: reader.float_or("scale14", defaults.scale14)?,
            scale15: reader.float_or("scale15", defaults.scale15)?,
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
            switch_width: reader.quantity_or("switch_width", defaults.switch_width)?,
        };
        settings.validate(tag)?;
        Ok(settings)
    }

    pub fn validate(&self, tag: &str) -> Result<(), HandlerError> {
        let invalid = |detail: String| HandlerError::InvalidSettings {
            tag: tag.to_string(),
            detail,
        };
        let scales = [
            ("scale12", self.scale12),
            ("scale13", self.scale13),
            ("scale14", self.scale14),
            ("scale15", self.scale15),
        ];
        if let Some((name, value)) = scales.iter().find(|(_, value)| *value < 0.0) {
            return Err(invalid(format!("{name} must not be negative, got {value}")));
        }
        let cutoff = self.cutoff.canonical();
        if cutoff <= 0.0 {
            return Err(invalid(format!("cutoff must be positive, got {}", self.cutoff)));
        }
        let switch_width = self.switch_width.canonical();
        if switch_width < 0.0 || switch_width >= cutoff {
            return Err(invalid(format!(
                "switch_width {} must lie in [0, cutoff {})",
                self.switch_width, self.cutoff
            )));
        }
        Ok(())
    }

    pub fn write(&self, section: &mut Section) {
        section.set_attribute("scale12", format_number(self.scale12));
        section.set_attribute("scale13", format_number(self.scale13));
        section.set_attribute("scale14", format_number(self.scale14));
        section.set_attribute("scale15", format_number(self.scale15));
        section.set_attribute("cutoff", &self.cutoff);
        section.set_attribute("periodic_method", &self.periodic_method);
        section.set_attribute("nonperiodic_method", &self.nonperiodic_method);
        section.set_attribute("switch_width", &self.switch_width);
    }

    pub fn check_compatible(&self, tag: &str, other: &Self) -> Result<(), HandlerError> {
        let incompatible = |detail: String| HandlerError::Incompatible {
            tag: tag.to_string(),
            detail,
        };
        let scales = [
            ("scale12", self.scale12, other.scale12),
            ("scale13", self.scale13, other.scale13),
            ("scale14", self.scale14, other.scale14),
            ("scale15", self.scale15, other.scale15),
        ];
        for (name, ours, theirs) in scales {
            if (ours - theirs).abs() > SETTINGS_TOLERANCE {
                return Err(incompatible(format!("{name} differs ({ours} vs {theirs})")));
            }
        }
        for (name, ours, theirs) in [
            ("cutoff", &self.cutoff, &other.cutoff),
            ("switch_width", &self.switch_width, &other.switch_width),
        ] {
            if !ours.approx_eq(theirs, SETTINGS_TOLERANCE) {
                return Err(incompatible(format!("{name} differs ({ours} vs {theirs})")));
            }
        }
        for (name, ours, theirs) in [
            ("periodic_method", &self.periodic_method, &other.periodic_method),
            ("nonperiodic_method", &self.nonperiodic_method, &other.nonperiodic_method),
        ] {
            if ours != theirs {
                return Err(incompatible(format!("{name} differs ({ours} vs {theirs})")));
            }
        }
        Ok(())
    }

    /// Scale applied to a pair `bonds` bonds apart.
    pub fn scale_for_separation(&self, bonds: u8) -> f64 {
        match bonds {
            1 => self.scale12,
            2 => self.scale13,
            3 => self.scale14,
            4 => self.scale15,
            _ => 1.0,
        }
    }

    pub fn nonbonded_method(&self, periodic: bool) -> NonbondedMethod {
        if periodic {
            NonbondedMethod::CutoffPeriodic
        } else {
            NonbondedMethod::NoCutoff
        }
    }

    /// Distance in nm where switching starts, if switching applies.
    pub fn switching_distance(
        &self,
        method: NonbondedMethod,
        use_switching_function: bool,
    ) -> Option<f64> {
        let width = self.switch_width.canonical();
        (use_switching_function && method.uses_cutoff() && width > 0.0)
            .then(|| self.cutoff.canonical() - width)
    }
}

/// Per-handler inputs to [`emit_pair_forces`].
#[derive(Debug, Clone)]
pub struct PairForceSpec {
    pub energy_expression: String,
    pub per_particle_parameters: Vec<String>,
    pub global_parameters: Vec<GlobalParameter>,
    /// Canonical parameter values, one row per atom.
    pub particles: Vec<Vec<f64>>,
}

/// Adds the nonbonded force and, when needed, the scaled 1-n bond force.
pub fn emit_pair_forces(
    tag: &str,
    settings: &CustomNonbondedSettings,
    spec: PairForceSpec,
    context: &ForceContext<'_>,
    system: &mut System,
) {
    let method = settings.nonbonded_method(context.periodic);

    let mut exclusions = Vec::new();
    let mut bonds = Vec::new();
    for (i, j, separation) in context.topology.bond_separations(4) {
        let scale = settings.scale_for_separation(separation);
        if scale == 1.0 {
            continue;
        }
        exclusions.push((i, j));
        if scale != 0.0 {
            let mut parameters = Vec::with_capacity(1 + 2 * spec.per_particle_parameters.len());
            parameters.push(scale);
            parameters.extend_from_slice(&spec.particles[i]);
            parameters.extend_from_slice(&spec.particles[j]);
            bonds.push(BondTerm {
                atoms: (i, j),
                parameters,
            });
        }
    }

    debug!(
        tag,
        particles = spec.particles.len(),
        exclusions = exclusions.len(),
        scaled_pairs = bonds.len(),
        ?method,
        "Emitting custom nonbonded force"
    );

    if !bonds.is_empty() {
        let mut per_bond_parameters = vec!["scale".to_string()];
        for suffix in ["1", "2"] {
            per_bond_parameters.extend(
                spec.per_particle_parameters
                    .iter()
                    .map(|name| format!("{name}{suffix}")),
            );
        }
        system.add_force(Force::CustomBond(CustomBondForce {
            name: tag.to_string(),
            energy_expression: expressions::scaled(&spec.energy_expression),
            per_bond_parameters,
            global_parameters: spec.global_parameters.clone(),
            bonds,
        }));
    }

    system.add_force(Force::CustomNonbonded(CustomNonbondedForce {
        name: tag.to_string(),
        energy_expression: spec.energy_expression,
        per_particle_parameters: spec.per_particle_parameters,
        global_parameters: spec.global_parameters,
        particles: spec.particles,
        exclusions,
        nonbonded_method: method,
        cutoff: settings.cutoff.canonical(),
        switching_distance: settings.switching_distance(method, context.use_switching_function),
        long_range_correction: context.long_range_correction && method.uses_cutoff(),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn read(attributes: &[(&str, &str)]) -> Result<CustomNonbondedSettings, HandlerError> {
        let mut section = Section::new("Test");
        for (key, value) in attributes {
            section.set_attribute(*key, *value);
        }
        let mut reader = AttributeReader::new(&section);
        CustomNonbondedSettings::read("Test", &mut reader)
    }

    #[test]
    fn defaults_apply_when_attributes_are_absent() {
        let settings = read(&[]).unwrap();
        assert_eq!(settings, CustomNonbondedSettings::default());
        assert!(f64_approx_equal(settings.cutoff.canonical(), 0.9));
        assert!(f64_approx_equal(settings.switch_width.canonical(), 0.1));
    }

    #[test]
    fn settings_written_and_read_back_are_equal() {
        let settings = read(&[
            ("scale14", "0.8333"),
            ("cutoff", "1.2 * nanometer"),
            ("switch_width", "0.5 * angstrom"),
        ])
        .unwrap();
        let mut section = Section::new("Test");
        settings.write(&mut section);
        let mut reader = AttributeReader::new(&section);
        assert_eq!(
            CustomNonbondedSettings::read("Test", &mut reader).unwrap(),
            settings
        );
    }

    #[test]
    fn switch_width_must_be_smaller_than_cutoff() {
        let result = read(&[("cutoff", "5 * angstrom"), ("switch_width", "6 * angstrom")]);
        assert!(matches!(result, Err(HandlerError::InvalidSettings { .. })));
    }

    #[test]
    fn negative_scale_is_rejected() {
        let result = read(&[("scale13", "-0.5")]);
        assert!(matches!(result, Err(HandlerError::InvalidSettings { .. })));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let result = read(&[("periodic_method", "PME")]);
        assert!(matches!(result, Err(HandlerError::InvalidChoice { .. })));
    }

    #[test]
    fn compatibility_uses_tolerance_and_unit_conversion() {
        let ours = CustomNonbondedSettings::default();
        let mut theirs = ours.clone();
        theirs.cutoff = Quantity::new(0.9, Unit::NANOMETER);
        theirs.scale14 = 0.5 + 1e-7;
        assert!(ours.check_compatible("Test", &theirs).is_ok());

        theirs.scale14 = 0.6;
        assert!(matches!(
            ours.check_compatible("Test", &theirs),
            Err(HandlerError::Incompatible { .. })
        ));
    }

    #[test]
    fn switching_distance_requires_cutoff_and_flag() {
        let settings = CustomNonbondedSettings::default();
        let distance = settings
            .switching_distance(NonbondedMethod::CutoffPeriodic, true)
            .unwrap();
        assert!(f64_approx_equal(distance, 0.8));
        assert_eq!(
            settings.switching_distance(NonbondedMethod::CutoffPeriodic, false),
            None
        );
        assert_eq!(settings.switching_distance(NonbondedMethod::NoCutoff, true), None);
    }

    #[test]
    fn scale_for_separation_maps_bond_counts() {
        let settings = CustomNonbondedSettings::default();
        assert_eq!(settings.scale_for_separation(1), 0.0);
        assert_eq!(settings.scale_for_separation(3), 0.5);
        assert_eq!(settings.scale_for_separation(4), 1.0);
        assert_eq!(settings.scale_for_separation(7), 1.0);
    }
}
