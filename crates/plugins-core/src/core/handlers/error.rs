use crate::core::matching::MatchError;
use crate::core::smirks::SmirksError;
use crate::core::units::{Dimension, UnitError};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandlerError {
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error(
        "<{element}> has unexpected attribute '{attribute}' (allow cosmetic attributes to keep it)"
    )]
    UnexpectedAttribute { element: String, attribute: String },

    #[error("<{element}> attribute '{attribute}' = '{value}' is not a valid quantity: {source}")]
    MalformedQuantity {
        element: String,
        attribute: String,
        value: String,
        #[source]
        source: UnitError,
    },

    #[error("<{element}> attribute '{attribute}' = '{value}' is invalid: {reason}")]
    MalformedValue {
        element: String,
        attribute: String,
        value: String,
        reason: String,
    },

    #[error("<{element}> attribute '{attribute}' = '{value}' has no units; expected {expected}")]
    MissingUnits {
        element: String,
        attribute: String,
        value: String,
        expected: Dimension,
    },

    #[error(
        "<{element}> attribute '{attribute}' = '{value}' has units of {found}; expected {expected}"
    )]
    UnitMismatch {
        element: String,
        attribute: String,
        value: String,
        expected: Dimension,
        found: Dimension,
    },

    #[error("<{element}> attribute '{attribute}' = '{value}' must be one of {allowed:?}")]
    InvalidChoice {
        element: String,
        attribute: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("<{element}> has an invalid SMIRKS pattern: {source}")]
    InvalidSmirks {
        element: String,
        #[source]
        source: SmirksError,
    },

    #[error("<{handler}> cannot contain <{element}> elements")]
    UnexpectedElement { handler: String, element: String },

    #[error("<{handler}> already has a parameter with SMIRKS '{smirks}'")]
    DuplicateParameter { handler: String, smirks: String },

    #[error("Cannot combine <{tag}> sections: {detail}")]
    Incompatible { tag: String, detail: String },

    #[error("<{tag}> has invalid settings: {detail}")]
    InvalidSettings { tag: String, detail: String },

    #[error("<{tag}> assigned no parameter to atom {atom} ('{atom_name}')")]
    UnassignedAtom {
        tag: String,
        atom: usize,
        atom_name: String,
    },

    #[error("<{tag}> could not match SMIRKS '{smirks}': {source}")]
    Matching {
        tag: String,
        smirks: String,
        #[source]
        source: MatchError,
    },
}
