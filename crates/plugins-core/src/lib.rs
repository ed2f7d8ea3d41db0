//! # SMIRNOFF Plugins
//!
//! Custom parameter handlers for SMIRNOFF force fields that go beyond the
//! Lennard-Jones and point-charge functional forms: damped Buckingham 6-8,
//! double exponential, damped exponential 6-8-10, Axilrod-Teller three-body
//! dispersion and AMOEBA-style multipoles.
//!
//! ## Architectural Philosophy
//!
//! - **[`core`]: The Foundation.** Units, SMIRKS validation, the `.offxml`
//!   reader and writer, the topology and system models, the pair potentials
//!   and the handlers themselves.
//!
//! - **[`engine`]: The Entry Point.** Orders the plugin handlers of a force
//!   field and emits their forces for one topology.

pub mod core;
pub mod engine;
