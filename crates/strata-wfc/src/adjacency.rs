//! Allowed-neighbour matrix.

use strata_common::{ConfigError, Direction};

use crate::state::{State, StateSet};

/// Read-only matrix `allowed[s1, s2, dir]`: may state `s2` sit in direction
/// `dir` from a cell holding `s1`?
///
/// Immutable after construction. The symmetry invariant
/// `allowed(a, b, d) == allowed(b, a, opposite(d))` is enforced at build
/// time; an asymmetric table is a configuration error.
///
/// Internally the table stores one support mask per `(state, direction)`
/// pair so arc consistency reduces to bitset unions and intersections.
#[derive(Debug, Clone)]
pub struct AdjacencyTable {
    /// `support[s * 6 + dir]` = set of states allowed next to `s` in `dir`.
    support: Vec<StateSet>,
    num_states: u16,
}

impl AdjacencyTable {
    /// Builds a table from a flat boolean matrix indexed
    /// `[s1 * S * 6 + s2 * 6 + dir]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AdjacencySize`] when the slice has the wrong
    /// length and [`ConfigError::AsymmetricAdjacency`] when the symmetry
    /// invariant does not hold.
    pub fn from_flat(num_states: u16, allowed: &[bool]) -> Result<Self, ConfigError> {
        let s = num_states as usize;
        let expected = s * s * Direction::COUNT;
        if allowed.len() != expected {
            return Err(ConfigError::AdjacencySize {
                expected,
                actual: allowed.len(),
            });
        }

        let at = |a: usize, b: usize, d: usize| allowed[(a * s + b) * Direction::COUNT + d];

        for a in 0..s {
            for b in 0..s {
                for dir in Direction::ALL {
                    let d = dir.as_index();
                    if at(a, b, d) != at(b, a, dir.opposite().as_index()) {
                        return Err(ConfigError::AsymmetricAdjacency {
                            a: a as u16,
                            b: b as u16,
                            dir: d,
                        });
                    }
                }
            }
        }

        let mut support = Vec::with_capacity(s * Direction::COUNT);
        for a in 0..s {
            for d in 0..Direction::COUNT {
                let mut mask = StateSet::empty(num_states);
                for b in 0..s {
                    if at(a, b, d) {
                        mask.insert(b as State);
                    }
                }
                support.push(mask);
            }
        }

        Ok(Self {
            support,
            num_states,
        })
    }

    /// Builds a table where every state pair is allowed in every direction.
    #[must_use]
    pub fn fully_permissive(num_states: u16) -> Self {
        let s = num_states as usize;
        let support = vec![StateSet::all(num_states); s * Direction::COUNT];
        Self {
            support,
            num_states,
        }
    }

    /// Returns the state count.
    #[must_use]
    pub const fn num_states(&self) -> u16 {
        self.num_states
    }

    /// Checks whether `b` may sit in direction `dir` from `a`.
    #[must_use]
    pub fn allowed(&self, a: State, b: State, dir: Direction) -> bool {
        self.support_mask(a, dir).contains(b)
    }

    /// Returns the set of states allowed next to `state` in `dir`.
    #[must_use]
    pub fn support_mask(&self, state: State, dir: Direction) -> &StateSet {
        &self.support[state as usize * Direction::COUNT + dir.as_index()]
    }

    /// Computes the union of support masks over every state in `source`:
    /// the states a neighbour in direction `dir` may still take.
    #[must_use]
    pub fn neighbour_mask(&self, source: &StateSet, dir: Direction) -> StateSet {
        let mut mask = StateSet::empty(self.num_states);
        for state in source.iter() {
            mask.union_with(self.support_mask(state, dir));
        }
        mask
    }

    /// Serialises the table back to the flat boolean matrix layout.
    #[must_use]
    pub fn to_flat(&self) -> Vec<bool> {
        let s = self.num_states as usize;
        let mut flat = vec![false; s * s * Direction::COUNT];
        for a in 0..s {
            for dir in Direction::ALL {
                let mask = self.support_mask(a as State, dir);
                for b in mask.iter() {
                    flat[(a * s + b as usize) * Direction::COUNT + dir.as_index()] = true;
                }
            }
        }
        flat
    }
}

/// Convenience builder for tests and hosts assembling tables by pair.
#[derive(Debug, Clone)]
pub struct AdjacencyBuilder {
    allowed: Vec<bool>,
    num_states: u16,
}

impl AdjacencyBuilder {
    /// Creates a builder with every pair disallowed.
    #[must_use]
    pub fn new(num_states: u16) -> Self {
        let s = num_states as usize;
        Self {
            allowed: vec![false; s * s * Direction::COUNT],
            num_states,
        }
    }

    /// Allows `b` next to `a` in `dir` and records the symmetric entry.
    pub fn allow(&mut self, a: State, b: State, dir: Direction) -> &mut Self {
        let s = self.num_states as usize;
        self.allowed[(a as usize * s + b as usize) * Direction::COUNT + dir.as_index()] = true;
        self.allowed
            [(b as usize * s + a as usize) * Direction::COUNT + dir.opposite().as_index()] = true;
        self
    }

    /// Allows `b` next to `a` in every direction (symmetric entries
    /// included).
    pub fn allow_all_directions(&mut self, a: State, b: State) -> &mut Self {
        for dir in Direction::ALL {
            self.allow(a, b, dir);
        }
        self
    }

    /// Finalises the table.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the assembled matrix is invalid; the
    /// builder keeps entries symmetric, so this only fires on misuse of the
    /// raw matrix path.
    pub fn build(&self) -> Result<AdjacencyTable, ConfigError> {
        AdjacencyTable::from_flat(self.num_states, &self.allowed)
    }
}
