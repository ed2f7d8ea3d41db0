//! Typed access to the attributes of a [`Section`].
//!
//! Each `take`-style call consumes the attribute it reads. Whatever is left
//! when [`AttributeReader::finish`] runs is either kept as a cosmetic
//! attribute or rejected, depending on [`ParseOptions`].

use super::error::HandlerError;
use crate::core::io::section::Section;
use crate::core::smirks::Smirks;
use crate::core::units::{Dimension, Quantity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Keep unrecognized attributes instead of failing.
    pub allow_cosmetic_attributes: bool,
}

impl ParseOptions {
    pub fn permissive() -> Self {
        Self {
            allow_cosmetic_attributes: true,
        }
    }
}

pub struct AttributeReader<'a> {
    element: &'a str,
    remaining: Vec<(&'a str, &'a str)>,
}

impl<'a> AttributeReader<'a> {
    pub fn new(section: &'a Section) -> Self {
        Self {
            element: &section.tag,
            remaining: section
                .attributes
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect(),
        }
    }

    fn take(&mut self, name: &str) -> Option<&'a str> {
        let index = self.remaining.iter().position(|(key, _)| *key == name)?;
        Some(self.remaining.remove(index).1)
    }

    fn missing(&self, name: &str) -> HandlerError {
        HandlerError::MissingAttribute {
            element: self.element.to_string(),
            attribute: name.to_string(),
        }
    }

    fn malformed(&self, name: &str, value: &str, reason: impl Into<String>) -> HandlerError {
        HandlerError::MalformedValue {
            element: self.element.to_string(),
            attribute: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn string(&mut self, name: &str) -> Option<String> {
        self.take(name).map(str::to_string)
    }

    pub fn required_string(&mut self, name: &str) -> Result<String, HandlerError> {
        self.string(name).ok_or_else(|| self.missing(name))
    }

    /// Reads the `smirks` attribute, allowing at most `max_tags` tagged atoms.
    pub fn smirks(&mut self, max_tags: usize) -> Result<Smirks, HandlerError> {
        let pattern = self.take("smirks").ok_or_else(|| self.missing("smirks"))?;
        Smirks::new(pattern)
            .and_then(|smirks| smirks.ensure_max_tags(max_tags).map(|()| smirks))
            .map_err(|source| HandlerError::InvalidSmirks {
                element: self.element.to_string(),
                source,
            })
    }

    pub fn required_quantity(
        &mut self,
        name: &str,
        dimension: Dimension,
    ) -> Result<Quantity, HandlerError> {
        let value = self.take(name).ok_or_else(|| self.missing(name))?;
        self.parse_quantity(name, value, dimension)
    }

    /// Reads an optional quantity with the dimension of `default`.
    pub fn quantity_or(&mut self, name: &str, default: Quantity) -> Result<Quantity, HandlerError> {
        match self.take(name) {
            Some(value) => self.parse_quantity(name, value, default.dimension()),
            None => Ok(default),
        }
    }

    pub fn optional_quantity(
        &mut self,
        name: &str,
        dimension: Dimension,
    ) -> Result<Option<Quantity>, HandlerError> {
        self.take(name)
            .map(|value| self.parse_quantity(name, value, dimension))
            .transpose()
    }

    /// Reads a dimensionless number. `"0.5"` and `"0.5 * dimensionless"` are
    /// both accepted.
    pub fn float_or(&mut self, name: &str, default: f64) -> Result<f64, HandlerError> {
        match self.take(name) {
            Some(value) => Ok(self.parse_quantity(name, value, Dimension::NONE)?.canonical()),
            None => Ok(default),
        }
    }

    pub fn int_or(&mut self, name: &str, default: i64) -> Result<i64, HandlerError> {
        let Some(value) = self.take(name) else {
            return Ok(default);
        };
        let number = self.parse_quantity(name, value, Dimension::NONE)?.canonical();
        if number.fract() != 0.0 || number.abs() > i64::MAX as f64 {
            return Err(self.malformed(name, value, "expected an integer"));
        }
        Ok(number as i64)
    }

    pub fn choice_or(
        &mut self,
        name: &str,
        allowed: &[&str],
        default: &str,
    ) -> Result<String, HandlerError> {
        let value = self.take(name).unwrap_or(default);
        if !allowed.contains(&value) {
            return Err(HandlerError::InvalidChoice {
                element: self.element.to_string(),
                attribute: name.to_string(),
                value: value.to_string(),
                allowed: allowed.iter().map(|s| s.to_string()).collect(),
            });
        }
        Ok(value.to_string())
    }

    /// Returns the unread attributes as cosmetic attributes.
    pub fn finish(self, options: &ParseOptions) -> Result<Vec<(String, String)>, HandlerError> {
        if !options.allow_cosmetic_attributes {
            if let Some((key, _)) = self.remaining.first() {
                return Err(HandlerError::UnexpectedAttribute {
                    element: self.element.to_string(),
                    attribute: key.to_string(),
                });
            }
        }
        Ok(self
            .remaining
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect())
    }

    fn parse_quantity(
        &self,
        name: &str,
        value: &str,
        expected: Dimension,
    ) -> Result<Quantity, HandlerError> {
        let quantity: Quantity = value.parse().map_err(|source| HandlerError::MalformedQuantity {
            element: self.element.to_string(),
            attribute: name.to_string(),
            value: value.to_string(),
            source,
        })?;

        let found = quantity.dimension();
        if found == expected {
            return Ok(quantity);
        }
        if found.is_dimensionless() {
            return Err(HandlerError::MissingUnits {
                element: self.element.to_string(),
                attribute: name.to_string(),
                value: value.to_string(),
                expected,
            });
        }
        Err(HandlerError::UnitMismatch {
            element: self.element.to_string(),
            attribute: name.to_string(),
            value: value.to_string(),
            expected,
            found,
        })
    }
}

/// Writes cosmetic attributes back after the recognized ones.
pub fn write_cosmetic(section: &mut Section, cosmetic: &[(String, String)]) {
    for (key, value) in cosmetic {
        section.set_attribute(key.as_str(), value);
    }
}
