//! Shared types used across the agent runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Resource vocabulary
// ---------------------------------------------------------------------------

/// Every item the server places on tiles or keeps in an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Food,
    Linemate,
    Deraumere,
    Sibur,
    Mendiane,
    Phiras,
    Thystame,
}

impl Resource {
    /// All resources, in inventory-reply order.
    pub const ALL: [Resource; 7] = [
        Self::Food,
        Self::Linemate,
        Self::Deraumere,
        Self::Sibur,
        Self::Mendiane,
        Self::Phiras,
        Self::Thystame,
    ];

    /// Elevation stones ordered by how early they are needed.
    pub const STONES: [Resource; 6] = [
        Self::Linemate,
        Self::Deraumere,
        Self::Sibur,
        Self::Mendiane,
        Self::Phiras,
        Self::Thystame,
    ];

    /// Wire name of the resource.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Linemate => "linemate",
            Self::Deraumere => "deraumere",
            Self::Sibur => "sibur",
            Self::Mendiane => "mendiane",
            Self::Phiras => "phiras",
            Self::Thystame => "thystame",
        }
    }

    pub fn is_stone(&self) -> bool {
        *self != Self::Food
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = UnknownResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownResource(s.to_string()))
    }
}

/// A name outside the fixed resource vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource: {0}")]
pub struct UnknownResource(pub String);

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Resource counts, either held by an agent or pooled in a depot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    counts: BTreeMap<Resource, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: Resource) -> u32 {
        self.counts.get(&resource).copied().unwrap_or(0)
    }

    pub fn set(&mut self, resource: Resource, count: u32) {
        self.counts.insert(resource, count);
    }

    pub fn add(&mut self, resource: Resource, count: u32) {
        *self.counts.entry(resource).or_insert(0) += count;
    }

    /// Remove up to `count` units; returns how many were actually removed.
    pub fn remove(&mut self, resource: Resource, count: u32) -> u32 {
        let entry = self.counts.entry(resource).or_insert(0);
        let taken = (*entry).min(count);
        *entry -= taken;
        taken
    }

    /// Total number of stones (food excluded).
    pub fn stone_count(&self) -> u32 {
        Resource::STONES.iter().map(|r| self.get(*r)).sum()
    }

    /// Iterate over non-zero entries.
    pub fn iter(&self) -> impl Iterator<Item = (Resource, u32)> + '_ {
        self.counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(r, n)| (*r, *n))
    }
}

impl FromIterator<(Resource, u32)> for Inventory {
    fn from_iter<I: IntoIterator<Item = (Resource, u32)>>(iter: I) -> Self {
        let mut inv = Inventory::new();
        for (r, n) in iter {
            inv.add(r, n);
        }
        inv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names_round_trip_through_from_str() {
        for r in Resource::ALL {
            assert_eq!(r.as_str().parse::<Resource>().unwrap(), r);
        }
        assert!("players".parse::<Resource>().is_err());
    }

    #[test]
    fn inventory_remove_saturates_at_zero() {
        let mut inv = Inventory::new();
        inv.add(Resource::Sibur, 2);
        assert_eq!(inv.remove(Resource::Sibur, 5), 2);
        assert_eq!(inv.get(Resource::Sibur), 0);
        assert_eq!(inv.remove(Resource::Phiras, 1), 0);
    }

    #[test]
    fn stone_count_ignores_food() {
        let inv: Inventory = [(Resource::Food, 9), (Resource::Linemate, 1), (Resource::Thystame, 2)]
            .into_iter()
            .collect();
        assert_eq!(inv.stone_count(), 3);
    }
}
