//! Chemical environment matching seam.
//!
//! Matching SMIRKS patterns against a molecular graph is the host toolkit's
//! job. Handlers only see the [`EnvironmentMatcher`] trait; the host plugs its
//! cheminformatics backend in behind it. [`AtomicNumberMatcher`] covers the
//! common single-element patterns (`[#6:1]`, `[*:1]`) without any backend.

use super::models::topology::Topology;
use super::smirks::Smirks;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("Pattern '{pattern}' is not supported by this matcher: {reason}")]
    Unsupported { pattern: String, reason: String },
    #[error("Matching backend failed: {0}")]
    Backend(String),
}

/// Finds the atoms matched by a SMIRKS pattern.
pub trait EnvironmentMatcher {
    /// Returns every match of `smirks` in `topology`.
    ///
    /// Each match lists the matched atom indices ordered by map index, so the
    /// atom tagged `:1` comes first.
    fn find_matches(
        &self,
        topology: &Topology,
        smirks: &Smirks,
    ) -> Result<Vec<Vec<usize>>, MatchError>;
}

impl<F> EnvironmentMatcher for F
where
    F: Fn(&Topology, &Smirks) -> Result<Vec<Vec<usize>>, MatchError>,
{
    fn find_matches(
        &self,
        topology: &Topology,
        smirks: &Smirks,
    ) -> Result<Vec<Vec<usize>>, MatchError> {
        self(topology, smirks)
    }
}

/// Matches single bracket-atom patterns by atomic number.
///
/// Accepts `[#N:1]` and the wildcard `[*:1]`; anything else is reported as
/// unsupported rather than silently mismatched.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicNumberMatcher;

impl AtomicNumberMatcher {
    fn element_filter(smirks: &Smirks) -> Result<Option<u8>, MatchError> {
        let unsupported = |reason: &str| MatchError::Unsupported {
            pattern: smirks.as_str().to_string(),
            reason: reason.to_string(),
        };

        let body = smirks
            .as_str()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(":1]"))
            .ok_or_else(|| unsupported("expected a single tagged bracket atom"))?;

        if body == "*" {
            return Ok(None);
        }
        body.strip_prefix('#')
            .and_then(|n| n.parse::<u8>().ok())
            .map(Some)
            .ok_or_else(|| unsupported("only '#<atomic number>' and '*' primitives are understood"))
    }
}

impl EnvironmentMatcher for AtomicNumberMatcher {
    fn find_matches(
        &self,
        topology: &Topology,
        smirks: &Smirks,
    ) -> Result<Vec<Vec<usize>>, MatchError> {
        let element = Self::element_filter(smirks)?;
        Ok(topology
            .atoms()
            .iter()
            .enumerate()
            .filter(|(_, atom)| element.is_none_or(|z| atom.atomic_number == z))
            .map(|(index, _)| vec![index])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::topology::TopologyAtom;

    fn water() -> Topology {
        let mut topology = Topology::new();
        let o = topology.add_atom(TopologyAtom::new("O", 8));
        let h1 = topology.add_atom(TopologyAtom::new("H1", 1));
        let h2 = topology.add_atom(TopologyAtom::new("H2", 1));
        topology.add_bond(o, h1).unwrap();
        topology.add_bond(o, h2).unwrap();
        topology
    }

    #[test]
    fn atomic_number_matcher_finds_all_atoms_of_an_element() {
        let smirks = Smirks::new("[#1:1]").unwrap();
        let matches = AtomicNumberMatcher.find_matches(&water(), &smirks).unwrap();
        assert_eq!(matches, vec![vec![1], vec![2]]);
    }

    #[test]
    fn wildcard_matches_every_atom() {
        let smirks = Smirks::new("[*:1]").unwrap();
        let matches = AtomicNumberMatcher.find_matches(&water(), &smirks).unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn complex_patterns_are_reported_as_unsupported() {
        let smirks = Smirks::new("[#1:1]-[#8]").unwrap();
        let result = AtomicNumberMatcher.find_matches(&water(), &smirks);
        assert!(matches!(result, Err(MatchError::Unsupported { .. })));

        let smirks = Smirks::new("[#6X4:1]").unwrap();
        let result = AtomicNumberMatcher.find_matches(&water(), &smirks);
        assert!(matches!(result, Err(MatchError::Unsupported { .. })));
    }

    #[test]
    fn closures_can_act_as_matchers() {
        let matcher = |_: &Topology, _: &Smirks| -> Result<Vec<Vec<usize>>, MatchError> {
            Ok(vec![vec![0]])
        };
        let smirks = Smirks::new("[#8:1]").unwrap();
        assert_eq!(
            matcher.find_matches(&water(), &smirks).unwrap(),
            vec![vec![0]]
        );
    }
}
