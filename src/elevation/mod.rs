//! Elevation requirement table.
//!
//! Keyed by *target* level. Each entry lists the stones that must lie on the
//! tile and the minimum number of same-level agents standing on it. The file
//! form is JSON: `{"2": {"players": 1, "linemate": 1}, ...}`; `players` is a
//! reserved key and never a consumable resource.

use crate::types::{Inventory, Resource};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Reserved key holding the headcount requirement.
pub const PLAYERS_KEY: &str = "players";

/// Highest level reachable in the game.
pub const MAX_LEVEL: u32 = 8;

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("failed to read elevation table: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse elevation table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid level key {0:?}")]
    BadLevel(String),

    #[error("level {level}: {source}")]
    BadResource {
        level: u32,
        #[source]
        source: crate::types::UnknownResource,
    },

    #[error("level {0} has no \"players\" entry")]
    MissingPlayers(u32),
}

/// Requirement for one elevation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Same-level agents that must share the tile.
    pub players: u32,
    /// Stones consumed by the ritual.
    pub stones: Inventory,
}

impl Requirement {
    /// Stones still missing from `held`.
    pub fn missing(&self, held: &Inventory) -> Inventory {
        self.stones
            .iter()
            .filter_map(|(r, n)| {
                let have = held.get(r);
                (have < n).then(|| (r, n - have))
            })
            .collect()
    }

    pub fn satisfied_by(&self, held: &Inventory) -> bool {
        self.stones.iter().all(|(r, n)| held.get(r) >= n)
    }
}

/// Level-indexed requirement table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationTable {
    levels: BTreeMap<u32, Requirement>,
}

impl Default for ElevationTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ElevationTable {
    /// The rules the game server enforces.
    pub fn standard() -> Self {
        // players, linemate, deraumere, sibur, mendiane, phiras, thystame
        const ROWS: [(u32, [u32; 7]); 7] = [
            (2, [1, 1, 0, 0, 0, 0, 0]),
            (3, [2, 1, 1, 1, 0, 0, 0]),
            (4, [2, 2, 0, 1, 0, 2, 0]),
            (5, [4, 1, 1, 2, 0, 1, 0]),
            (6, [4, 1, 2, 1, 3, 0, 0]),
            (7, [6, 1, 2, 3, 0, 1, 0]),
            (8, [6, 2, 2, 2, 2, 2, 1]),
        ];

        let levels = ROWS
            .iter()
            .map(|(level, row)| {
                let stones = Resource::STONES
                    .iter()
                    .zip(&row[1..])
                    .filter(|(_, n)| **n > 0)
                    .map(|(r, n)| (*r, *n))
                    .collect();
                (
                    *level,
                    Requirement {
                        players: row[0],
                        stones,
                    },
                )
            })
            .collect();

        Self { levels }
    }

    /// Load a JSON table from disk.
    pub fn load(path: &Path) -> Result<Self, ElevationError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ElevationError> {
        let raw: BTreeMap<String, BTreeMap<String, u32>> = serde_json::from_str(json)?;
        let mut levels = BTreeMap::new();

        for (key, entry) in raw {
            let level = key
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|l| (2..=MAX_LEVEL).contains(l))
                .ok_or_else(|| ElevationError::BadLevel(key.clone()))?;

            let mut players = None;
            let mut stones = Inventory::new();
            for (name, count) in entry {
                if name == PLAYERS_KEY {
                    players = Some(count);
                    continue;
                }
                let resource = name
                    .parse::<Resource>()
                    .map_err(|source| ElevationError::BadResource { level, source })?;
                if count > 0 {
                    stones.set(resource, count);
                }
            }

            let players = players.ok_or(ElevationError::MissingPlayers(level))?;
            levels.insert(level, Requirement { players, stones });
        }

        Ok(Self { levels })
    }

    /// Requirement to reach `target_level`, if that level exists.
    pub fn requirement(&self, target_level: u32) -> Option<&Requirement> {
        self.levels.get(&target_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_matches_server_rules() {
        let table = ElevationTable::standard();
        let first = table.requirement(2).unwrap();
        assert_eq!(first.players, 1);
        assert_eq!(first.stones.get(Resource::Linemate), 1);
        assert_eq!(first.stones.stone_count(), 1);

        let last = table.requirement(8).unwrap();
        assert_eq!(last.players, 6);
        assert_eq!(last.stones.get(Resource::Thystame), 1);
        assert!(table.requirement(1).is_none());
        assert!(table.requirement(9).is_none());
    }

    #[test]
    fn json_table_keeps_players_out_of_stones() {
        let table = ElevationTable::from_json(
            r#"{"2": {"players": 1, "linemate": 1}, "3": {"players": 2, "linemate": 1, "sibur": 1, "phiras": 0}}"#,
        )
        .unwrap();
        let req = table.requirement(3).unwrap();
        assert_eq!(req.players, 2);
        assert_eq!(req.stones.stone_count(), 2);
        assert_eq!(req.stones.get(Resource::Phiras), 0);
    }

    #[test]
    fn json_table_rejects_unknown_resources_and_missing_headcount() {
        assert!(matches!(
            ElevationTable::from_json(r#"{"2": {"players": 1, "gold": 1}}"#),
            Err(ElevationError::BadResource { level: 2, .. })
        ));
        assert!(matches!(
            ElevationTable::from_json(r#"{"2": {"linemate": 1}}"#),
            Err(ElevationError::MissingPlayers(2))
        ));
        assert!(matches!(
            ElevationTable::from_json(r#"{"two": {"players": 1}}"#),
            Err(ElevationError::BadLevel(_))
        ));
        assert!(matches!(
            ElevationTable::from_json(r#"{"9": {"players": 1}}"#),
            Err(ElevationError::BadLevel(_))
        ));
    }

    #[test]
    fn missing_reports_only_the_shortfall() {
        let req = ElevationTable::standard().requirement(4).unwrap().clone();
        let held: Inventory = [(Resource::Linemate, 1), (Resource::Sibur, 3)]
            .into_iter()
            .collect();
        let missing = req.missing(&held);
        assert_eq!(missing.get(Resource::Linemate), 1);
        assert_eq!(missing.get(Resource::Sibur), 0);
        assert_eq!(missing.get(Resource::Phiras), 2);
        assert!(!req.satisfied_by(&held));
    }
}
