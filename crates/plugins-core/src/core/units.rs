//! Physical quantities and unit expressions.
//!
//! Force-field files carry every coefficient as a string such as
//! `"1.0 * kilojoule_per_mole * nanometer ** 6"`. This module parses those
//! strings, checks their physical dimension, and converts magnitudes into the
//! canonical engine units.
//!
//! Canonical units:
//! - Length: nanometer (nm)
//! - Energy: kilojoule (kJ)
//! - Amount: mole (mol)
//! - Charge: elementary charge (e)
//!
//! A [`Quantity`] remembers the unit it was written in, so writing it back out
//! reproduces the original text exactly.

use phf::{Map, phf_map};
use std::borrow::Cow;
use std::fmt;
use std::ops::{Div, Mul};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unknown unit symbol '{0}'")]
    UnknownSymbol(String),
    #[error("Malformed unit expression '{expression}': {reason}")]
    Syntax { expression: String, reason: String },
    #[error("Invalid quantity magnitude '{0}'")]
    InvalidMagnitude(String),
    #[error("Cannot convert '{from}' to '{to}': incompatible dimensions")]
    Incompatible { from: String, to: String },
}

/// Exponents of the base dimensions of a physical quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimension {
    pub length: i8,
    pub energy: i8,
    pub amount: i8,
    pub charge: i8,
}

impl Dimension {
    pub const NONE: Self = Self::new(0, 0, 0, 0);
    pub const LENGTH: Self = Self::new(1, 0, 0, 0);
    pub const ENERGY: Self = Self::new(0, 1, 0, 0);
    pub const AMOUNT: Self = Self::new(0, 0, 1, 0);
    pub const CHARGE: Self = Self::new(0, 0, 0, 1);
    /// Energy per amount of substance, e.g. kJ/mol.
    pub const MOLAR_ENERGY: Self = Self::new(0, 1, -1, 0);

    pub const fn new(length: i8, energy: i8, amount: i8, charge: i8) -> Self {
        Self {
            length,
            energy,
            amount,
            charge,
        }
    }

    pub const fn times(self, other: Self) -> Self {
        Self::new(
            self.length + other.length,
            self.energy + other.energy,
            self.amount + other.amount,
            self.charge + other.charge,
        )
    }

    pub const fn per(self, other: Self) -> Self {
        Self::new(
            self.length - other.length,
            self.energy - other.energy,
            self.amount - other.amount,
            self.charge - other.charge,
        )
    }

    pub const fn powi(self, n: i8) -> Self {
        Self::new(
            self.length * n,
            self.energy * n,
            self.amount * n,
            self.charge * n,
        )
    }

    /// Like [`Dimension::times`], but `None` if an exponent leaves the `i8` range.
    pub fn checked_times(self, other: Self) -> Option<Self> {
        Some(Self::new(
            self.length.checked_add(other.length)?,
            self.energy.checked_add(other.energy)?,
            self.amount.checked_add(other.amount)?,
            self.charge.checked_add(other.charge)?,
        ))
    }

    pub fn checked_per(self, other: Self) -> Option<Self> {
        Some(Self::new(
            self.length.checked_sub(other.length)?,
            self.energy.checked_sub(other.energy)?,
            self.amount.checked_sub(other.amount)?,
            self.charge.checked_sub(other.charge)?,
        ))
    }

    pub fn checked_powi(self, n: i8) -> Option<Self> {
        Some(Self::new(
            self.length.checked_mul(n)?,
            self.energy.checked_mul(n)?,
            self.amount.checked_mul(n)?,
            self.charge.checked_mul(n)?,
        ))
    }

    pub const fn is_dimensionless(self) -> bool {
        self.length == 0 && self.energy == 0 && self.amount == 0 && self.charge == 0
    }
}

impl Mul for Dimension {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.times(rhs)
    }
}

impl Div for Dimension {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        self.per(rhs)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }
        let parts: Vec<String> = [
            ("length", self.length),
            ("energy", self.energy),
            ("amount", self.amount),
            ("charge", self.charge),
        ]
        .iter()
        .filter(|(_, exponent)| *exponent != 0)
        .map(|(name, exponent)| match exponent {
            1 => format!("[{name}]"),
            n => format!("[{name}]^{n}"),
        })
        .collect();
        write!(f, "{}", parts.join("*"))
    }
}

/// Known unit symbols: conversion factor to canonical units and dimension.
static UNIT_SYMBOLS: Map<&'static str, (f64, Dimension)> = phf_map! {
    "dimensionless" => (1.0, Dimension::NONE),
    "nanometer" => (1.0, Dimension::LENGTH),
    "nanometers" => (1.0, Dimension::LENGTH),
    "nm" => (1.0, Dimension::LENGTH),
    "angstrom" => (0.1, Dimension::LENGTH),
    "angstroms" => (0.1, Dimension::LENGTH),
    "picometer" => (1.0e-3, Dimension::LENGTH),
    "picometers" => (1.0e-3, Dimension::LENGTH),
    "bohr" => (0.052_917_721_090_3, Dimension::LENGTH),
    "kilojoule" => (1.0, Dimension::ENERGY),
    "kilojoules" => (1.0, Dimension::ENERGY),
    "kJ" => (1.0, Dimension::ENERGY),
    "joule" => (1.0e-3, Dimension::ENERGY),
    "joules" => (1.0e-3, Dimension::ENERGY),
    "kilocalorie" => (4.184, Dimension::ENERGY),
    "kilocalories" => (4.184, Dimension::ENERGY),
    "kcal" => (4.184, Dimension::ENERGY),
    "calorie" => (4.184e-3, Dimension::ENERGY),
    "calories" => (4.184e-3, Dimension::ENERGY),
    "mole" => (1.0, Dimension::AMOUNT),
    "moles" => (1.0, Dimension::AMOUNT),
    "mol" => (1.0, Dimension::AMOUNT),
    "kilojoule_per_mole" => (1.0, Dimension::MOLAR_ENERGY),
    "kilojoules_per_mole" => (1.0, Dimension::MOLAR_ENERGY),
    "kilocalorie_per_mole" => (4.184, Dimension::MOLAR_ENERGY),
    "kilocalories_per_mole" => (4.184, Dimension::MOLAR_ENERGY),
    "elementary_charge" => (1.0, Dimension::CHARGE),
    "elementary_charges" => (1.0, Dimension::CHARGE),
};

/// A unit expression together with its conversion factor to canonical units.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    symbol: Cow<'static, str>,
    factor: f64,
    dimension: Dimension,
}

impl Unit {
    pub const DIMENSIONLESS: Unit = Unit::named("dimensionless", 1.0, Dimension::NONE);
    pub const NANOMETER: Unit = Unit::named("nanometer", 1.0, Dimension::LENGTH);
    pub const ANGSTROM: Unit = Unit::named("angstrom", 0.1, Dimension::LENGTH);
    pub const KILOJOULE_PER_MOLE: Unit =
        Unit::named("kilojoule_per_mole", 1.0, Dimension::MOLAR_ENERGY);
    pub const ELEMENTARY_CHARGE: Unit =
        Unit::named("elementary_charge", 1.0, Dimension::CHARGE);

    /// Builds a unit from an already-normalized expression.
    ///
    /// The symbol must be written the way [`Unit::parse`] normalizes it
    /// (single spaces around `*`, `/` and `**`) for parsed and constructed
    /// units to compare equal.
    pub const fn named(symbol: &'static str, factor: f64, dimension: Dimension) -> Self {
        Self {
            symbol: Cow::Borrowed(symbol),
            factor,
            dimension,
        }
    }

    pub fn parse(expression: &str) -> Result<Self, UnitError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err(UnitError::Syntax {
                expression: expression.to_string(),
                reason: "empty unit expression".to_string(),
            });
        }
        let mut parser = UnitParser {
            tokens: &tokens,
            pos: 0,
            expression,
        };
        let (factor, dimension) = parser.expression()?;
        if parser.pos != tokens.len() {
            return Err(parser.error("unexpected trailing tokens"));
        }
        Ok(Self {
            symbol: Cow::Owned(normalize(&tokens)),
            factor,
            dimension,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Multiplier converting a magnitude in this unit into canonical units.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dimension == other.dimension
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// A magnitude carrying an explicit unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    magnitude: f64,
    unit: Unit,
}

impl Quantity {
    pub const fn new(magnitude: f64, unit: Unit) -> Self {
        Self { magnitude, unit }
    }

    pub const fn dimensionless(magnitude: f64) -> Self {
        Self::new(magnitude, Unit::DIMENSIONLESS)
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn dimension(&self) -> Dimension {
        self.unit.dimension
    }

    /// The magnitude expressed in canonical units (nm, kJ, mol, e).
    #[inline]
    pub fn canonical(&self) -> f64 {
        self.magnitude * self.unit.factor
    }

    pub fn value_in(&self, unit: &Unit) -> Result<f64, UnitError> {
        if !self.unit.is_compatible(unit) {
            return Err(UnitError::Incompatible {
                from: self.unit.symbol.to_string(),
                to: unit.symbol.to_string(),
            });
        }
        Ok(self.canonical() / unit.factor)
    }

    /// Compares two quantities in canonical units with a relative tolerance.
    pub fn approx_eq(&self, other: &Quantity, tolerance: f64) -> bool {
        if self.dimension() != other.dimension() {
            return false;
        }
        let (a, b) = (self.canonical(), other.canonical());
        (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0)
    }
}

impl FromStr for Quantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (number, unit) = match text.find('*') {
            Some(index) => {
                let rest = &text[index + 1..];
                if rest.starts_with('*') {
                    return Err(UnitError::Syntax {
                        expression: text.to_string(),
                        reason: "magnitude cannot be raised to a power".to_string(),
                    });
                }
                (text[..index].trim(), Unit::parse(rest)?)
            }
            None => (text, Unit::DIMENSIONLESS),
        };
        let magnitude: f64 = number
            .parse()
            .map_err(|_| UnitError::InvalidMagnitude(number.to_string()))?;
        if !magnitude.is_finite() {
            return Err(UnitError::InvalidMagnitude(number.to_string()));
        }
        Ok(Self { magnitude, unit })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit == Unit::DIMENSIONLESS {
            write!(f, "{}", format_number(self.magnitude))
        } else {
            write!(f, "{} * {}", format_number(self.magnitude), self.unit)
        }
    }
}

/// Shortest text that parses back to the same `f64`.
pub fn format_number(value: f64) -> String {
    format!("{value:?}")
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Integer(String),
    Star,
    Power,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, UnitError> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Power);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '^' => {
                chars.next();
                tokens.push(Token::Power);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                let mut number = String::new();
                number.push(c);
                chars.next();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Integer(number));
            }
            other => {
                return Err(UnitError::Syntax {
                    expression: expression.to_string(),
                    reason: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}

fn normalize(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Ident(s) | Token::Integer(s) => out.push_str(s),
            Token::Star => out.push_str(" * "),
            Token::Power => out.push_str(" ** "),
            Token::Slash => out.push_str(" / "),
            Token::LParen => out.push('('),
            Token::RParen => out.push(')'),
        }
    }
    out
}

struct UnitParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    expression: &'a str,
}

impl UnitParser<'_> {
    fn error(&self, reason: &str) -> UnitError {
        UnitError::Syntax {
            expression: self.expression.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<(f64, Dimension), UnitError> {
        let (mut factor, mut dimension) = self.power()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    let (f, d) = self.power()?;
                    factor *= f;
                    dimension = dimension
                        .checked_times(d)
                        .ok_or_else(|| self.error("exponent out of range"))?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let (f, d) = self.power()?;
                    factor /= f;
                    dimension = dimension
                        .checked_per(d)
                        .ok_or_else(|| self.error("exponent out of range"))?;
                }
                _ => break,
            }
        }
        Ok((factor, dimension))
    }

    fn power(&mut self) -> Result<(f64, Dimension), UnitError> {
        let (factor, dimension) = self.atom()?;
        if self.peek() == Some(&Token::Power) {
            self.pos += 1;
            let exponent = self.exponent()?;
            let dimension = dimension
                .checked_powi(exponent)
                .ok_or_else(|| self.error("exponent out of range"))?;
            return Ok((factor.powi(exponent.into()), dimension));
        }
        Ok((factor, dimension))
    }

    fn atom(&mut self) -> Result<(f64, Dimension), UnitError> {
        match self.next().cloned() {
            Some(Token::Ident(name)) => UNIT_SYMBOLS
                .get(name.as_str())
                .copied()
                .ok_or(UnitError::UnknownSymbol(name)),
            Some(Token::Integer(n)) if n == "1" => Ok((1.0, Dimension::NONE)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("unbalanced parenthesis")),
                }
            }
            Some(_) => Err(self.error("expected a unit symbol")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn exponent(&mut self) -> Result<i8, UnitError> {
        let parenthesized = self.peek() == Some(&Token::LParen);
        if parenthesized {
            self.pos += 1;
        }
        let exponent = match self.next().cloned() {
            Some(Token::Integer(n)) => n
                .parse::<i8>()
                .ok()
                .filter(|e| (-24..=24).contains(e))
                .ok_or_else(|| self.error("exponent out of range"))?,
            _ => return Err(self.error("expected an integer exponent")),
        };
        if parenthesized && self.next() != Some(&Token::RParen) {
            return Err(self.error("unbalanced parenthesis"));
        }
        Ok(exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn parse_simple_length_unit_converts_to_nanometers() {
        let q: Quantity = "9.0 * angstrom".parse().unwrap();
        assert_eq!(q.dimension(), Dimension::LENGTH);
        assert!(f64_approx_equal(q.canonical(), 0.9));
        assert_eq!(q.magnitude(), 9.0);
    }

    #[test]
    fn parse_compound_unit_with_power() {
        let unit = Unit::parse("kilojoule_per_mole * nanometer**6").unwrap();
        assert_eq!(unit.symbol(), "kilojoule_per_mole * nanometer ** 6");
        assert_eq!(
            unit.dimension(),
            Dimension::MOLAR_ENERGY * Dimension::LENGTH.powi(6)
        );
        assert!(f64_approx_equal(unit.factor(), 1.0));
    }

    #[test]
    fn parse_inverse_length_in_several_spellings() {
        let a = Unit::parse("nanometer ** -1").unwrap();
        let b = Unit::parse("1 / nanometer").unwrap();
        let c = Unit::parse("nm^-1").unwrap();
        assert_eq!(a.dimension(), Dimension::NONE / Dimension::LENGTH);
        assert!(a.is_compatible(&b));
        assert!(b.is_compatible(&c));
    }

    #[test]
    fn kilocalories_per_mole_convert_to_kilojoules_per_mole() {
        let q: Quantity = "1.0 * kilocalorie / mole".parse().unwrap();
        let kj = q.value_in(&Unit::KILOJOULE_PER_MOLE).unwrap();
        assert!(f64_approx_equal(kj, 4.184));
    }

    #[test]
    fn parenthesized_expression_is_supported() {
        let unit = Unit::parse("(kilocalorie / mole) / angstrom ** 2").unwrap();
        assert_eq!(
            unit.dimension(),
            Dimension::MOLAR_ENERGY / Dimension::LENGTH.powi(2)
        );
        assert!((unit.factor() - 418.4).abs() < 1e-9);
    }

    #[test]
    fn value_in_rejects_incompatible_units() {
        let q: Quantity = "1.0 * nanometer".parse().unwrap();
        let result = q.value_in(&Unit::KILOJOULE_PER_MOLE);
        assert!(matches!(result, Err(UnitError::Incompatible { .. })));
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let result: Result<Quantity, _> = "1.0 * furlong".parse();
        assert_eq!(result, Err(UnitError::UnknownSymbol("furlong".to_string())));
    }

    #[test]
    fn bare_number_parses_as_dimensionless() {
        let q: Quantity = "0.5".parse().unwrap();
        assert_eq!(q, Quantity::dimensionless(0.5));
        assert_eq!(q.to_string(), "0.5");
    }

    #[test]
    fn invalid_magnitude_is_rejected() {
        let result: Result<Quantity, _> = "abc * nanometer".parse();
        assert!(matches!(result, Err(UnitError::InvalidMagnitude(_))));
        let result: Result<Quantity, _> = "inf * nanometer".parse();
        assert!(matches!(result, Err(UnitError::InvalidMagnitude(_))));
    }

    #[test]
    fn dangling_operator_is_a_syntax_error() {
        assert!(matches!(
            Unit::parse("nanometer *"),
            Err(UnitError::Syntax { .. })
        ));
        assert!(matches!(
            Unit::parse("(nanometer"),
            Err(UnitError::Syntax { .. })
        ));
        assert!(matches!(
            Unit::parse("nanometer ** x"),
            Err(UnitError::Syntax { .. })
        ));
    }

    #[test]
    fn overflowing_dimension_exponents_are_syntax_errors() {
        for expression in [
            "(nanometer ** 24) ** 24",
            "nanometer ** 24 * nanometer ** 24 * nanometer ** 24 * nanometer ** 24 * nanometer ** 24 * nanometer ** 24",
            "1 / nanometer ** 24 / nanometer ** 24 / nanometer ** 24 / nanometer ** 24 / nanometer ** 24 / nanometer ** 24",
        ] {
            match Unit::parse(expression) {
                Err(UnitError::Syntax { reason, .. }) => assert_eq!(reason, "exponent out of range"),
                other => panic!("expected an exponent range error for '{expression}', got {other:?}"),
            }
        }
        let q: Quantity = "2.0 * (nanometer ** 24) ** -1 * nanometer ** 24".parse().unwrap();
        assert!(q.dimension().is_dimensionless());
    }

    #[test]
    fn display_then_parse_reproduces_the_same_quantity() {
        let original: Quantity = "35.8967 * nanometer**-1".parse().unwrap();
        let text = original.to_string();
        assert_eq!(text, "35.8967 * nanometer ** -1");
        let reparsed: Quantity = text.parse().unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn named_units_match_their_parsed_counterparts() {
        assert_eq!(Unit::parse("angstrom").unwrap(), Unit::ANGSTROM);
        assert_eq!(
            Unit::parse("kilojoule_per_mole").unwrap(),
            Unit::KILOJOULE_PER_MOLE
        );
        assert_eq!(Unit::parse("dimensionless").unwrap(), Unit::DIMENSIONLESS);
    }

    #[test]
    fn approx_eq_compares_in_canonical_units() {
        let a: Quantity = "9.0 * angstrom".parse().unwrap();
        let b: Quantity = "0.9 * nanometer".parse().unwrap();
        let c: Quantity = "0.9 * kilojoule_per_mole".parse().unwrap();
        assert!(a.approx_eq(&b, 1e-9));
        assert!(!a.approx_eq(&c, 1e-9));
    }

    #[test]
    fn dimension_display_lists_nonzero_exponents() {
        let dim = Dimension::MOLAR_ENERGY * Dimension::LENGTH.powi(6);
        assert_eq!(dim.to_string(), "[length]^6*[energy]*[amount]^-1");
        assert_eq!(Dimension::NONE.to_string(), "dimensionless");
    }
}
