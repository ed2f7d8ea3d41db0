//! Engine-facing force descriptions.
//!
//! The handlers never evaluate energies over a whole system. Instead they emit
//! the forces below: an energy expression in the host engine's custom-force
//! syntax, per-particle parameter tables in canonical units (nm, kJ/mol, e),
//! exclusions and cutoff settings. The physics engine consumes a [`System`]
//! directly or through its TOML serialization.

use serde::{Deserialize, Serialize};

/// How long-range interactions are truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonbondedMethod {
    NoCutoff,
    CutoffNonPeriodic,
    CutoffPeriodic,
    Pme,
}

impl NonbondedMethod {
    pub fn uses_cutoff(self) -> bool {
        !matches!(self, NonbondedMethod::NoCutoff)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalParameter {
    pub name: String,
    pub value: f64,
}

impl GlobalParameter {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Pairwise interaction between all non-excluded particle pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomNonbondedForce {
    /// Tag of the handler that produced the force.
    pub name: String,
    pub energy_expression: String,
    pub per_particle_parameters: Vec<String>,
    pub global_parameters: Vec<GlobalParameter>,
    /// One row per particle, ordered like `per_particle_parameters`.
    pub particles: Vec<Vec<f64>>,
    pub exclusions: Vec<(usize, usize)>,
    pub nonbonded_method: NonbondedMethod,
    /// Cutoff distance in nm.
    pub cutoff: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switching_distance: Option<f64>,
    pub long_range_correction: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondTerm {
    pub atoms: (usize, usize),
    pub parameters: Vec<f64>,
}

/// Explicit pair terms, used for scaled 1-n interactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomBondForce {
    pub name: String,
    pub energy_expression: String,
    pub per_bond_parameters: Vec<String>,
    pub global_parameters: Vec<GlobalParameter>,
    pub bonds: Vec<BondTerm>,
}

/// Interaction over sets of `particles_per_set` particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomManyParticleForce {
    pub name: String,
    pub particles_per_set: usize,
    pub energy_expression: String,
    pub per_particle_parameters: Vec<String>,
    pub global_parameters: Vec<GlobalParameter>,
    pub particles: Vec<Vec<f64>>,
    pub exclusions: Vec<(usize, usize)>,
    pub nonbonded_method: NonbondedMethod,
    pub cutoff: f64,
}

/// Local frame convention used to orient a site's multipoles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisType {
    ZThenX,
    Bisector,
    ZBisect,
    ThreeFold,
    ZOnly,
    NoAxisType,
}

impl AxisType {
    pub const ALL: [AxisType; 6] = [
        AxisType::ZThenX,
        AxisType::Bisector,
        AxisType::ZBisect,
        AxisType::ThreeFold,
        AxisType::ZOnly,
        AxisType::NoAxisType,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AxisType::ZThenX => "ZThenX",
            AxisType::Bisector => "Bisector",
            AxisType::ZBisect => "ZBisect",
            AxisType::ThreeFold => "ThreeFold",
            AxisType::ZOnly => "ZOnly",
            AxisType::NoAxisType => "NoAxisType",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|axis| axis.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolarizationType {
    Mutual,
    Direct,
    Extrapolated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipoleParticle {
    /// Partial charge in e.
    pub charge: f64,
    /// Dipole in e·nm.
    pub dipole: [f64; 3],
    /// Quadrupole in e·nm², row-major.
    pub quadrupole: [f64; 9],
    pub axis_type: AxisType,
    /// Axis-defining atoms, -1 when unused.
    pub atom_z: i64,
    pub atom_x: i64,
    pub atom_y: i64,
    pub thole: f64,
    pub damping_factor: f64,
    /// Polarizability in nm³.
    pub polarity: f64,
}

/// Atoms one to four bonds away from a particle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CovalentMap {
    pub covalent12: Vec<usize>,
    pub covalent13: Vec<usize>,
    pub covalent14: Vec<usize>,
    pub covalent15: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmoebaMultipoleForce {
    pub name: String,
    pub nonbonded_method: NonbondedMethod,
    pub cutoff: f64,
    pub polarization_type: PolarizationType,
    pub ewald_error_tolerance: f64,
    pub mutual_induced_target_epsilon: f64,
    pub mutual_induced_max_iterations: u32,
    pub particles: Vec<MultipoleParticle>,
    pub covalent_maps: Vec<CovalentMap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Force {
    CustomNonbonded(CustomNonbondedForce),
    CustomBond(CustomBondForce),
    CustomManyParticle(CustomManyParticleForce),
    AmoebaMultipole(AmoebaMultipoleForce),
}

impl Force {
    pub fn name(&self) -> &str {
        match self {
            Force::CustomNonbonded(f) => &f.name,
            Force::CustomBond(f) => &f.name,
            Force::CustomManyParticle(f) => &f.name,
            Force::AmoebaMultipole(f) => &f.name,
        }
    }
}

/// The assembled system handed to the physics engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct System {
    particle_count: usize,
    forces: Vec<Force>,
}

impl System {
    pub fn new(particle_count: usize) -> Self {
        Self {
            particle_count,
            forces: Vec::new(),
        }
    }

    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    pub fn add_force(&mut self, force: Force) {
        self.forces.push(force);
    }

    pub fn forces(&self) -> &[Force] {
        &self.forces
    }

    /// Forces emitted by the handler with the given tag.
    pub fn forces_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Force> + 'a {
        self.forces.iter().filter(move |f| f.name() == name)
    }

    pub fn custom_nonbonded(&self, name: &str) -> Option<&CustomNonbondedForce> {
        self.forces.iter().find_map(|f| match f {
            Force::CustomNonbonded(force) if force.name == name => Some(force),
            _ => None,
        })
    }

    pub fn custom_bond(&self, name: &str) -> Option<&CustomBondForce> {
        self.forces.iter().find_map(|f| match f {
            Force::CustomBond(force) if force.name == name => Some(force),
            _ => None,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}
