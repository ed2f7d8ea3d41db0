use crate::core::handlers::attributes::ParseOptions;
use crate::core::handlers::error::HandlerError;
use crate::core::handlers::registry::HandlerRegistry;
use crate::core::handlers::{ParameterHandler, PluginHandler};
use crate::core::io::offxml::{self, OffxmlError, ROOT_TAG};
use crate::core::io::section::Section;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_FORCE_FIELD_VERSION: &str = "0.3";
pub const DEFAULT_AROMATICITY_MODEL: &str = "OEAroModel_MDL";

#[derive(Debug, Error)]
pub enum ForceFieldError {
    #[error(transparent)]
    Offxml(#[from] OffxmlError),
    #[error("Failed to load <{tag}> section: {source}")]
    Handler { tag: String, source: HandlerError },
    #[error(
        "Conflicting aromaticity models: force field uses '{existing}', document uses '{found}'"
    )]
    AromaticityModel { existing: String, found: String },
}

/// A top-level section of a force field.
#[derive(Debug, Clone)]
pub enum ForceFieldSection {
    /// A section handled by a registered plugin.
    Plugin(Box<dyn ParameterHandler>),
    /// A section owned by the host toolkit, kept verbatim.
    Foreign(Section),
}

impl ForceFieldSection {
    pub fn tag(&self) -> &str {
        match self {
            ForceFieldSection::Plugin(handler) => handler.tag_name(),
            ForceFieldSection::Foreign(section) => &section.tag,
        }
    }

    fn to_section(&self) -> Section {
        match self {
            ForceFieldSection::Plugin(handler) => handler.to_section(),
            ForceFieldSection::Foreign(section) => section.clone(),
        }
    }
}

/// An ordered collection of force-field sections.
///
/// Plugin sections are parsed into handlers; everything else is preserved so
/// that writing the force field back reproduces the host's sections too.
#[derive(Debug, Clone)]
pub struct ForceField {
    version: String,
    aromaticity_model: String,
    root_attributes: Vec<(String, String)>,
    sections: Vec<ForceFieldSection>,
    loaded_documents: usize,
}

impl Default for ForceField {
    fn default() -> Self {
        Self {
            version: DEFAULT_FORCE_FIELD_VERSION.to_string(),
            aromaticity_model: DEFAULT_AROMATICITY_MODEL.to_string(),
            root_attributes: Vec::new(),
            sections: Vec::new(),
            loaded_documents: 0,
        }
    }
}

impl ForceField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_offxml_str(
        xml: &str,
        registry: &HandlerRegistry,
        options: &ParseOptions,
    ) -> Result<Self, ForceFieldError> {
        let mut force_field = Self::new();
        force_field.extend_from_offxml_str(xml, registry, options)?;
        Ok(force_field)
    }

    pub fn load(
        path: &Path,
        registry: &HandlerRegistry,
        options: &ParseOptions,
    ) -> Result<Self, ForceFieldError> {
        let mut force_field = Self::new();
        force_field.extend_from_file(path, registry, options)?;
        Ok(force_field)
    }

    pub fn extend_from_file(
        &mut self,
        path: &Path,
        registry: &HandlerRegistry,
        options: &ParseOptions,
    ) -> Result<(), ForceFieldError> {
        let root = offxml::read_file(path)?;
        info!(path = %path.display(), "Loading force field document");
        self.extend_from_root(&root, registry, options)
    }

    /// Adds the sections of another document to this force field.
    ///
    /// Plugin sections whose tag is already present are merged into the
    /// existing handler; all other sections are appended in document order.
    pub fn extend_from_offxml_str(
        &mut self,
        xml: &str,
        registry: &HandlerRegistry,
        options: &ParseOptions,
    ) -> Result<(), ForceFieldError> {
        let root = offxml::parse_str(xml)?;
        self.extend_from_root(&root, registry, options)
    }

    /// Applies a whole document to a staged copy, committing only on success.
    fn extend_from_root(
        &mut self,
        root: &Section,
        registry: &HandlerRegistry,
        options: &ParseOptions,
    ) -> Result<(), ForceFieldError> {
        let mut staged = self.clone();
        staged.absorb_root_attributes(root)?;

        for child in &root.children {
            match registry.construct(child, options) {
                Some(result) => {
                    let handler = result.map_err(|source| ForceFieldError::Handler {
                        tag: child.tag.clone(),
                        source,
                    })?;
                    staged.register_handler(handler)?;
                }
                None => {
                    debug!(tag = child.tag.as_str(), "Keeping foreign section");
                    staged.sections.push(ForceFieldSection::Foreign(child.clone()));
                }
            }
        }
        staged.loaded_documents += 1;
        *self = staged;
        Ok(())
    }

    fn absorb_root_attributes(&mut self, root: &Section) -> Result<(), ForceFieldError> {
        let first_document = self.loaded_documents == 0;
        for (key, value) in &root.attributes {
            match key.as_str() {
                "version" if first_document => self.version = value.clone(),
                "version" => {
                    if *value != self.version {
                        warn!(
                            existing = self.version.as_str(),
                            found = value.as_str(),
                            "Force field documents declare different versions"
                        );
                    }
                }
                "aromaticity_model" if first_document => self.aromaticity_model = value.clone(),
                "aromaticity_model" => {
                    if *value != self.aromaticity_model {
                        return Err(ForceFieldError::AromaticityModel {
                            existing: self.aromaticity_model.clone(),
                            found: value.clone(),
                        });
                    }
                }
                _ => {
                    if !self.root_attributes.iter().any(|(k, _)| k == key) {
                        self.root_attributes.push((key.clone(), value.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Adds a handler, merging it into an existing handler with the same tag.
    pub fn register_handler(
        &mut self,
        handler: Box<dyn ParameterHandler>,
    ) -> Result<(), ForceFieldError> {
        let tag = handler.tag_name();
        let existing = self.sections.iter_mut().find_map(|section| match section {
            ForceFieldSection::Plugin(existing) if existing.tag_name() == tag => Some(existing),
            _ => None,
        });

        match existing {
            Some(existing) => {
                existing
                    .merge(handler.as_ref())
                    .map_err(|source| ForceFieldError::Handler {
                        tag: tag.to_string(),
                        source,
                    })?;
                debug!(
                    tag,
                    parameters = existing.parameter_count(),
                    "Merged handler section"
                );
            }
            None => self.sections.push(ForceFieldSection::Plugin(handler)),
        }
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn aromaticity_model(&self) -> &str {
        &self.aromaticity_model
    }

    pub fn sections(&self) -> &[ForceFieldSection] {
        &self.sections
    }

    /// Plugin handlers in document order.
    pub fn handlers(&self) -> impl Iterator<Item = &dyn ParameterHandler> + '_ {
        self.sections.iter().filter_map(|section| match section {
            ForceFieldSection::Plugin(handler) => Some(handler.as_ref()),
            ForceFieldSection::Foreign(_) => None,
        })
    }

    pub fn handler(&self, tag: &str) -> Option<&dyn ParameterHandler> {
        self.handlers().find(|handler| handler.tag_name() == tag)
    }

    pub fn handler_as<H: PluginHandler>(&self) -> Option<&H> {
        self.handler(H::TAG_NAME)
            .and_then(|handler| handler.as_any().downcast_ref::<H>())
    }

    pub fn handler_as_mut<H: PluginHandler>(&mut self) -> Option<&mut H> {
        self.sections.iter_mut().find_map(|section| match section {
            ForceFieldSection::Plugin(handler) if handler.tag_name() == H::TAG_NAME => {
                handler.as_any_mut().downcast_mut::<H>()
            }
            _ => None,
        })
    }

    pub fn foreign_section(&self, tag: &str) -> Option<&Section> {
        self.sections.iter().find_map(|section| match section {
            ForceFieldSection::Foreign(section) if section.tag == tag => Some(section),
            _ => None,
        })
    }

    pub fn has_section(&self, tag: &str) -> bool {
        self.sections.iter().any(|section| section.tag() == tag)
    }

    pub fn to_section(&self) -> Section {
        let mut root = Section::new(ROOT_TAG)
            .with_attribute("version", &self.version)
            .with_attribute("aromaticity_model", &self.aromaticity_model);
        for (key, value) in &self.root_attributes {
            root.set_attribute(key.as_str(), value);
        }
        root.children = self.sections.iter().map(ForceFieldSection::to_section).collect();
        root
    }

    pub fn to_offxml_string(&self) -> Result<String, ForceFieldError> {
        Ok(offxml::to_string(&self.to_section())?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ForceFieldError> {
        offxml::write_file(&self.to_section(), path)?;
        info!(path = %path.display(), sections = self.sections.len(), "Saved force field");
        Ok(())
    }
}
