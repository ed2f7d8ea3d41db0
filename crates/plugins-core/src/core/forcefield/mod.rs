//! # Force Field Module
//!
//! The mathematical side of the plugins and the force-field container that
//! holds their handlers.
//!
//! ## Key Components
//!
//! - [`potentials`] - Closed-form pair and triple energies, evaluated in
//!   canonical units (nm, kJ/mol)
//! - [`mixing`] - Combination rules for unlike particle pairs
//! - [`expressions`] - Builders for the engine's custom-force energy expressions
//! - [`params`] - The [`params::ForceField`] container: `.offxml` loading,
//!   section merging and serialization
//!
//! ## Usage
//!
//! ```ignore
//! use smirnoff_plugins::core::forcefield::params::ForceField;
//! use smirnoff_plugins::core::handlers::attributes::ParseOptions;
//! use smirnoff_plugins::core::handlers::registry::HandlerRegistry;
//!
//! let force_field = ForceField::load(path, &HandlerRegistry::builtin(), &ParseOptions::default())?;
//! ```

pub mod expressions;
pub mod mixing;
pub mod params;
pub mod potentials;
