//! # Engine Module
//!
//! Turns a loaded [`ForceField`](crate::core::forcefield::params::ForceField)
//! and a host topology into engine force descriptions.
//!
//! ## Overview
//!
//! The host toolkit runs its own handlers (bonds, vdW, electrostatics, charges)
//! first. This module then runs the plugin handlers in dependency order and
//! appends their forces to the system.
//!
//! - **Configuration** ([`config`]) - Periodicity, switching and long-range correction options
//! - **System Assembly** ([`builder`]) - Handler ordering and force emission
//! - **Error Handling** ([`error`]) - Failures tagged with the handler that raised them

pub mod builder;
pub mod config;
pub mod error;
