//! Molecular graph consumed by the handlers and the force descriptions they
//! produce.

pub mod system;
pub mod topology;
