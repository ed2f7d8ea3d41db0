//! Plugin discovery.
//!
//! Maps section tags to constructors. The built-in set covers every handler in
//! this crate; hosts can register further [`PluginHandler`] types at runtime.

use super::attributes::ParseOptions;
use super::axilrod_teller::AxilrodTellerHandler;
use super::buckingham::DampedBuckingham68Handler;
use super::damped_exp6810::DampedExp6810Handler;
use super::double_exponential::DoubleExponentialHandler;
use super::error::HandlerError;
use super::multipole::MultipoleHandler;
use super::{ParameterHandler, PluginHandler};
use crate::core::io::section::Section;
use std::collections::HashMap;
use tracing::debug;

pub type HandlerConstructor =
    fn(&Section, &ParseOptions) -> Result<Box<dyn ParameterHandler>, HandlerError>;

fn construct<H: PluginHandler>(
    section: &Section,
    options: &ParseOptions,
) -> Result<Box<dyn ParameterHandler>, HandlerError> {
    Ok(Box::new(H::from_section(section, options)?))
}

#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    constructors: HashMap<&'static str, HandlerConstructor>,
}

impl HandlerRegistry {
    /// An empty registry; every section will be treated as foreign.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register::<DampedBuckingham68Handler>()
            .register::<DoubleExponentialHandler>()
            .register::<DampedExp6810Handler>()
            .register::<AxilrodTellerHandler>()
            .register::<MultipoleHandler>();
        registry
    }

    /// Registers `H` under its tag, replacing any previous registration.
    pub fn register<H: PluginHandler>(&mut self) -> &mut Self {
        if self
            .constructors
            .insert(H::TAG_NAME, construct::<H>)
            .is_some()
        {
            debug!(tag = H::TAG_NAME, "Replaced handler registration");
        }
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Registered tags in alphabetical order.
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.constructors.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    /// Builds the handler for `section`, or `None` if its tag is not registered.
    pub fn construct(
        &self,
        section: &Section,
        options: &ParseOptions,
    ) -> Option<Result<Box<dyn ParameterHandler>, HandlerError>> {
        self.constructors
            .get(section.tag.as_str())
            .map(|constructor| constructor(section, options))
    }
}
