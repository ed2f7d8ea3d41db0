use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Atom index {index} is out of range for a topology with {count} atoms")]
    AtomOutOfRange { index: usize, count: usize },
    #[error("Atom {0} cannot be bonded to itself")]
    SelfBond(usize),
    #[error("Bond between atoms {0} and {1} already exists")]
    DuplicateBond(usize, usize),
    #[error("Expected {expected} partial charges but received {found}")]
    ChargeCountMismatch { expected: usize, found: usize },
}

/// A single atom as seen by the parameter handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyAtom {
    /// Atom name, used only for diagnostics.
    pub name: String,
    /// Atomic number (1 for hydrogen, 6 for carbon, ...).
    pub atomic_number: u8,
    /// Partial charge in elementary charges, as assigned by the host's charge handlers.
    pub partial_charge: f64,
}

impl TopologyAtom {
    pub fn new(name: impl Into<String>, atomic_number: u8) -> Self {
        Self {
            name: name.into(),
            atomic_number,
            partial_charge: 0.0,
        }
    }

    pub fn with_charge(mut self, partial_charge: f64) -> Self {
        self.partial_charge = partial_charge;
        self
    }
}

/// The molecular graph handed over by the host toolkit.
///
/// Atoms are indexed in insertion order. Only connectivity is stored; the
/// handlers need bond separations to build exclusions and covalent maps, never
/// coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    atoms: Vec<TopologyAtom>,
    bonds: Vec<(usize, usize)>,
    neighbors: Vec<Vec<usize>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, atom: TopologyAtom) -> usize {
        self.atoms.push(atom);
        self.neighbors.push(Vec::new());
        self.atoms.len() - 1
    }

    pub fn add_bond(&mut self, i: usize, j: usize) -> Result<(), TopologyError> {
        self.check_index(i)?;
        self.check_index(j)?;
        if i == j {
            return Err(TopologyError::SelfBond(i));
        }
        if self.neighbors[i].contains(&j) {
            return Err(TopologyError::DuplicateBond(i.min(j), i.max(j)));
        }
        self.bonds.push((i.min(j), i.max(j)));
        self.neighbors[i].push(j);
        self.neighbors[j].push(i);
        Ok(())
    }

    pub fn set_partial_charges(&mut self, charges: &[f64]) -> Result<(), TopologyError> {
        if charges.len() != self.atoms.len() {
            return Err(TopologyError::ChargeCountMismatch {
                expected: self.atoms.len(),
                found: charges.len(),
            });
        }
        for (atom, &charge) in self.atoms.iter_mut().zip(charges) {
            atom.partial_charge = charge;
        }
        Ok(())
    }

    pub fn atom(&self, index: usize) -> Option<&TopologyAtom> {
        self.atoms.get(index)
    }

    pub fn atoms(&self) -> &[TopologyAtom] {
        &self.atoms
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bonds(&self) -> &[(usize, usize)] {
        &self.bonds
    }

    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.neighbors.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All atom pairs `(i, j, n)` with `i < j` separated by `n <= max_bonds` bonds.
    ///
    /// `n` is the length of the shortest bond path between the atoms. Pairs are
    /// sorted by `(i, j)`.
    pub fn bond_separations(&self, max_bonds: u8) -> Vec<(usize, usize, u8)> {
        let mut pairs = Vec::new();
        let mut distance = vec![u8::MAX; self.atoms.len()];
        let mut queue = VecDeque::new();

        for start in 0..self.atoms.len() {
            distance.iter_mut().for_each(|d| *d = u8::MAX);
            distance[start] = 0;
            queue.clear();
            queue.push_back(start);

            while let Some(current) = queue.pop_front() {
                let next_distance = distance[current].saturating_add(1);
                if next_distance > max_bonds {
                    continue;
                }
                for &neighbor in &self.neighbors[current] {
                    if distance[neighbor] == u8::MAX {
                        distance[neighbor] = next_distance;
                        queue.push_back(neighbor);
                    }
                }
            }

            for (other, &d) in distance.iter().enumerate().skip(start + 1) {
                if d != u8::MAX && d > 0 {
                    pairs.push((start, other, d));
                }
            }
        }

        pairs
    }

    fn check_index(&self, index: usize) -> Result<(), TopologyError> {
        if index >= self.atoms.len() {
            return Err(TopologyError::AtomOutOfRange {
                index,
                count: self.atoms.len(),
            });
        }
        Ok(())
    }
}
