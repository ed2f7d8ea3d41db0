//! # Parameter Handlers
//!
//! One handler per plugin section of an `.offxml` document. A handler owns
//! its section-level settings plus an ordered [`ParameterList`] of typed
//! parameters, and knows how to:
//!
//! - parse itself from a [`Section`] and write itself back,
//! - merge a second section with the same tag when the settings agree,
//! - assign parameters to the atoms of a [`Topology`] and emit the
//!   corresponding engine forces into a [`System`].

use crate::core::io::section::Section;
use crate::core::matching::EnvironmentMatcher;
use crate::core::models::system::System;
use crate::core::models::topology::Topology;
use crate::core::smirks::Smirks;
use std::any::Any;
use std::fmt::Debug;
use tracing::trace;

pub mod attributes;
pub mod axilrod_teller;
pub mod buckingham;
pub mod damped_exp6810;
pub mod double_exponential;
pub mod error;
pub mod multipole;
pub mod nonbonded;
pub mod registry;

use attributes::ParseOptions;
use error::HandlerError;

/// Section version written when a handler is built programmatically.
pub const DEFAULT_SECTION_VERSION: &str = "0.3";

/// Everything a handler needs to emit forces for one topology.
#[derive(Clone, Copy)]
pub struct ForceContext<'a> {
    pub topology: &'a Topology,
    pub matcher: &'a dyn EnvironmentMatcher,
    pub periodic: bool,
    pub use_switching_function: bool,
    pub long_range_correction: bool,
}

/// Object-safe interface shared by every plugin handler.
pub trait ParameterHandler: Debug + Any + HandlerClone {
    fn tag_name(&self) -> &'static str;

    fn version(&self) -> &str;

    fn parameter_count(&self) -> usize;

    /// Tags of handlers whose forces must be created before this one.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    fn to_section(&self) -> Section;

    /// Folds the parameters of `other` into `self`.
    ///
    /// Fails without modifying `self` when the section-level settings differ
    /// or when `other` repeats a SMIRKS pattern already present.
    fn merge(&mut self, other: &dyn ParameterHandler) -> Result<(), HandlerError>;

    fn create_forces(
        &self,
        context: &ForceContext<'_>,
        system: &mut System,
    ) -> Result<(), HandlerError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Cloning through a `Box<dyn ParameterHandler>`.
pub trait HandlerClone {
    fn clone_boxed(&self) -> Box<dyn ParameterHandler>;
}

impl<T: ParameterHandler + Clone + 'static> HandlerClone for T {
    fn clone_boxed(&self) -> Box<dyn ParameterHandler> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ParameterHandler> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// A concrete handler that can be constructed from its `.offxml` section.
pub trait PluginHandler: ParameterHandler + Sized {
    const TAG_NAME: &'static str;

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError>;
}

/// One `<Atom>`-style entry of a handler's parameter list.
pub trait ParameterType: Clone + Debug + Sized {
    const ELEMENT_NAME: &'static str = "Atom";
    /// Maximum number of tagged atoms allowed in the SMIRKS pattern.
    const MAX_TAGGED_ATOMS: usize = 1;

    fn smirks(&self) -> &Smirks;

    fn from_section(section: &Section, options: &ParseOptions) -> Result<Self, HandlerError>;

    fn to_section(&self) -> Section;
}

/// The parameter chosen for one atom, with the full SMIRKS match that chose it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<'a, T> {
    pub parameter: &'a T,
    /// Matched atoms ordered by tag; `atoms[0]` is the assigned atom.
    pub atoms: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterList<T> {
    parameters: Vec<T>,
}

impl<T> Default for ParameterList<T> {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }
}

impl<T: ParameterType> ParameterList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every child element of a handler section.
    pub fn from_children(
        handler: &str,
        section: &Section,
        options: &ParseOptions,
    ) -> Result<Self, HandlerError> {
        let mut list = Self::new();
        for child in &section.children {
            if child.tag != T::ELEMENT_NAME {
                return Err(HandlerError::UnexpectedElement {
                    handler: handler.to_string(),
                    element: child.tag.clone(),
                });
            }
            list.push(handler, T::from_section(child, options)?)?;
        }
        Ok(list)
    }

    pub fn write_children(&self, section: &mut Section) {
        section
            .children
            .extend(self.parameters.iter().map(ParameterType::to_section));
    }

    pub fn push(&mut self, handler: &str, parameter: T) -> Result<(), HandlerError> {
        if self.find(parameter.smirks().as_str()).is_some() {
            return Err(HandlerError::DuplicateParameter {
                handler: handler.to_string(),
                smirks: parameter.smirks().to_string(),
            });
        }
        self.parameters.push(parameter);
        Ok(())
    }

    /// Appends all of `other`, failing before any change on a repeated SMIRKS.
    pub fn extend_from(&mut self, handler: &str, other: &ParameterList<T>) -> Result<(), HandlerError> {
        if let Some(duplicate) = other
            .iter()
            .find(|p| self.find(p.smirks().as_str()).is_some())
        {
            return Err(HandlerError::DuplicateParameter {
                handler: handler.to_string(),
                smirks: duplicate.smirks().to_string(),
            });
        }
        self.parameters.extend(other.iter().cloned());
        Ok(())
    }

    pub fn find(&self, smirks: &str) -> Option<&T> {
        self.parameters.iter().find(|p| p.smirks().as_str() == smirks)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.parameters.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Assigns one parameter to every atom of `topology`.
    ///
    /// Parameters are tried in order and a later match overrides an earlier
    /// one, so the last matching parameter wins. Every atom must end up with
    /// a parameter.
    pub fn assign<'a>(
        &'a self,
        handler: &str,
        topology: &Topology,
        matcher: &dyn EnvironmentMatcher,
    ) -> Result<Vec<Assignment<'a, T>>, HandlerError> {
        let atom_count = topology.atom_count();
        let mut slots: Vec<Option<(usize, Vec<usize>)>> = vec![None; atom_count];

        for (index, parameter) in self.parameters.iter().enumerate() {
            let matching_error = |source| HandlerError::Matching {
                tag: handler.to_string(),
                smirks: parameter.smirks().to_string(),
                source,
            };
            let matches = matcher
                .find_matches(topology, parameter.smirks())
                .map_err(matching_error)?;

            for atoms in matches {
                if let Some(&bad) = atoms.iter().find(|&&atom| atom >= atom_count) {
                    return Err(matching_error(crate::core::matching::MatchError::Backend(
                        format!("matched atom {bad} but the topology has {atom_count} atoms"),
                    )));
                }
                let Some(&primary) = atoms.first() else {
                    continue;
                };
                trace!(
                    handler,
                    smirks = parameter.smirks().as_str(),
                    atom = primary,
                    "Parameter matched"
                );
                slots[primary] = Some((index, atoms));
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(atom, slot)| match slot {
                Some((index, atoms)) => Ok(Assignment {
                    parameter: &self.parameters[index],
                    atoms,
                }),
                None => Err(HandlerError::UnassignedAtom {
                    tag: handler.to_string(),
                    atom,
                    atom_name: topology
                        .atom(atom)
                        .map(|a| a.name.clone())
                        .unwrap_or_default(),
                }),
            })
            .collect()
    }
}

impl<'a, T> IntoIterator for &'a ParameterList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}

/// Downcasts the peer of a merge to the handler's own type.
pub(crate) fn merge_peer<'a, H: ParameterHandler>(
    tag: &str,
    other: &'a dyn ParameterHandler,
) -> Result<&'a H, HandlerError> {
    other
        .as_any()
        .downcast_ref::<H>()
        .ok_or_else(|| HandlerError::Incompatible {
            tag: tag.to_string(),
            detail: format!("cannot merge a <{}> section", other.tag_name()),
        })
}
