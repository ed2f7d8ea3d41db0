//! SMIRKS pattern wrapper.
//!
//! Substructure matching itself belongs to the host toolkit (see
//! [`crate::core::matching`]). This module only checks that a pattern is
//! structurally sound before it is stored in a parameter table: brackets and
//! parentheses balance, and the tagged atoms are numbered `:1`, `:2`, ...
//! without gaps.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SmirksError {
    #[error("SMIRKS pattern is empty")]
    Empty,
    #[error("SMIRKS '{0}' contains whitespace")]
    Whitespace(String),
    #[error("Unbalanced '{delimiter}' in SMIRKS '{pattern}'")]
    Unbalanced { pattern: String, delimiter: char },
    #[error("SMIRKS '{0}' does not tag atom ':1'")]
    MissingPrimaryTag(String),
    #[error(
        "SMIRKS '{pattern}' tags atoms {found:?}; indices must be unique and contiguous from 1"
    )]
    NonContiguousTags { pattern: String, found: Vec<u32> },
    #[error("SMIRKS '{pattern}' tags {found} atoms but at most {max} are allowed here")]
    TooManyTags {
        pattern: String,
        found: usize,
        max: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Smirks {
    pattern: String,
    tagged_atoms: usize,
}

impl Smirks {
    pub fn new(pattern: impl Into<String>) -> Result<Self, SmirksError> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(SmirksError::Empty);
        }
        if pattern.chars().any(char::is_whitespace) {
            return Err(SmirksError::Whitespace(pattern));
        }

        let mut tags = collect_tags(&pattern)?;
        if tags.is_empty() || !tags.contains(&1) {
            return Err(SmirksError::MissingPrimaryTag(pattern));
        }
        tags.sort_unstable();
        let contiguous = tags.iter().enumerate().all(|(i, &t)| t as usize == i + 1);
        if !contiguous {
            return Err(SmirksError::NonContiguousTags {
                pattern,
                found: tags,
            });
        }

        Ok(Self {
            tagged_atoms: tags.len(),
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Number of atoms carrying a map index (`:n`) in the pattern.
    pub fn tagged_atom_count(&self) -> usize {
        self.tagged_atoms
    }

    pub fn ensure_max_tags(&self, max: usize) -> Result<(), SmirksError> {
        if self.tagged_atoms > max {
            return Err(SmirksError::TooManyTags {
                pattern: self.pattern.clone(),
                found: self.tagged_atoms,
                max,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Smirks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn collect_tags(pattern: &str) -> Result<Vec<u32>, SmirksError> {
    let mut tags = Vec::new();
    let mut bracket_depth = 0usize;
    let mut paren_depth = 0usize;
    let mut atom = String::new();

    for c in pattern.chars() {
        match c {
            '[' => {
                bracket_depth += 1;
                if bracket_depth == 1 {
                    atom.clear();
                    continue;
                }
            }
            ']' => {
                if bracket_depth == 0 {
                    return Err(unbalanced(pattern, ']'));
                }
                bracket_depth -= 1;
                if bracket_depth == 0 {
                    if let Some(tag) = map_index(&atom) {
                        tags.push(tag);
                    }
                    continue;
                }
            }
            '(' => paren_depth += 1,
            ')' => {
                paren_depth = paren_depth
                    .checked_sub(1)
                    .ok_or_else(|| unbalanced(pattern, ')'))?;
            }
            _ => {}
        }
        if bracket_depth > 0 {
            atom.push(c);
        }
    }

    if bracket_depth != 0 {
        return Err(unbalanced(pattern, '['));
    }
    if paren_depth != 0 {
        return Err(unbalanced(pattern, '('));
    }
    Ok(tags)
}

/// Map index at the end of a bracket atom body, e.g. `#6X4:1` -> 1.
fn map_index(atom: &str) -> Option<u32> {
    let (_, digits) = atom.rsplit_once(':')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn unbalanced(pattern: &str, delimiter: char) -> SmirksError {
    SmirksError::Unbalanced {
        pattern: pattern.to_string(),
        delimiter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tagged_atom_is_accepted() {
        let smirks = Smirks::new("[#6X4:1]").unwrap();
        assert_eq!(smirks.tagged_atom_count(), 1);
        assert_eq!(smirks.as_str(), "[#6X4:1]");
    }

    #[test]
    fn untagged_neighbors_are_ignored() {
        let smirks = Smirks::new("[#1:1]-[#8X2H2+0]-[#1]").unwrap();
        assert_eq!(smirks.tagged_atom_count(), 1);
    }

    #[test]
    fn recursive_smarts_inside_brackets_does_not_count_as_tag() {
        let smirks = Smirks::new("[#6;$([#6]=[#8:2]):1]").unwrap();
        assert_eq!(smirks.tagged_atom_count(), 1);
    }

    #[test]
    fn multiple_contiguous_tags_are_counted() {
        let smirks = Smirks::new("[#8:1]-[#1:2].[#1:3]").unwrap();
        assert_eq!(smirks.tagged_atom_count(), 3);
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert_eq!(Smirks::new(""), Err(SmirksError::Empty));
    }

    #[test]
    fn missing_primary_tag_is_rejected() {
        assert!(matches!(
            Smirks::new("[#6]"),
            Err(SmirksError::MissingPrimaryTag(_))
        ));
        assert!(matches!(
            Smirks::new("[#6:2]"),
            Err(SmirksError::MissingPrimaryTag(_))
        ));
    }

    #[test]
    fn gaps_in_tag_numbering_are_rejected() {
        let result = Smirks::new("[#6:1]-[#6:3]");
        assert!(matches!(
            result,
            Err(SmirksError::NonContiguousTags { ref found, .. }) if found == &vec![1, 3]
        ));
    }

    #[test]
    fn unbalanced_brackets_are_rejected() {
        assert!(matches!(
            Smirks::new("[#6:1"),
            Err(SmirksError::Unbalanced { delimiter: '[', .. })
        ));
        assert!(matches!(
            Smirks::new("[#6:1](-[#1]"),
            Err(SmirksError::Unbalanced { delimiter: '(', .. })
        ));
        assert!(matches!(
            Smirks::new("[#6:1]]"),
            Err(SmirksError::Unbalanced { delimiter: ']', .. })
        ));
    }

    #[test]
    fn whitespace_is_rejected() {
        assert!(matches!(
            Smirks::new("[#6:1] "),
            Err(SmirksError::Whitespace(_))
        ));
    }

    #[test]
    fn ensure_max_tags_limits_tag_count() {
        let smirks = Smirks::new("[#6:1]-[#1:2]").unwrap();
        assert!(smirks.ensure_max_tags(2).is_ok());
        assert!(matches!(
            smirks.ensure_max_tags(1),
            Err(SmirksError::TooManyTags { found: 2, max: 1, .. })
        ));
    }
}
