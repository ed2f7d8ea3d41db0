//! # Core Module
//!
//! Stateless building blocks of the plugins: units, SMIRKS patterns, the
//! molecular topology, the emitted force model, the potential functions and
//! the parameter handlers themselves.
//!
//! ## Architecture
//!
//! - **Physical Quantities** ([`units`]) - Unit-expression parsing and conversion to canonical units
//! - **Chemical Patterns** ([`smirks`], [`matching`]) - SMIRKS validation and the matcher seam
//! - **Molecular Representation** ([`models`]) - Topology in, engine forces out
//! - **Functional Forms** ([`forcefield`]) - Potentials, combination rules and the force-field container
//! - **Parameter Handlers** ([`handlers`]) - Typed parameter tables and force emission
//! - **File I/O** ([`io`]) - `.offxml` reading and writing

pub mod forcefield;
pub mod handlers;
pub mod io;
pub mod matching;
pub mod models;
pub mod smirks;
pub mod units;
