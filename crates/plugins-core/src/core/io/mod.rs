//! # Force-Field I/O
//!
//! Reading and writing SMIRNOFF `.offxml` documents. The XML text is mapped
//! onto a generic [`section::Section`] tree; turning sections into typed
//! parameter handlers is the job of [`crate::core::handlers`].

pub mod offxml;
pub mod section;
