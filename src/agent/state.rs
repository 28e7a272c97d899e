//! Mutable per-agent state owned by the controller.

use crate::jobs::{JobInfo, JobKind};
use crate::types::Inventory;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct AgentState {
    /// Starts at 1 and only ever grows.
    pub level: u32,
    pub food_stock: u32,
    /// Stones held. Food lives in `food_stock`.
    pub resources: Inventory,
    /// Last public job summary heard from each teammate.
    pub known_players: HashMap<u16, JobInfo>,
    /// Roles this agent held before the current one, oldest first.
    pub job_history: Vec<JobKind>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            level: 1,
            food_stock: 0,
            resources: Inventory::new(),
            known_players: HashMap::new(),
            job_history: Vec::new(),
        }
    }
}

impl AgentState {
    /// Record a level reported by the server. Lower values are ignored.
    pub fn raise_level(&mut self, level: u32) -> bool {
        if level > self.level {
            self.level = level;
            true
        } else {
            false
        }
    }

    pub fn players_with_job(&self, job: JobKind) -> Vec<u16> {
        self.known_players
            .iter()
            .filter(|(_, info)| info.job == job)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn has_elder(&self) -> bool {
        self.known_players.values().any(|info| info.job == JobKind::Elder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_never_decreases() {
        let mut state = AgentState::default();
        assert_eq!(state.level, 1);
        assert!(state.raise_level(3));
        assert!(!state.raise_level(2));
        assert_eq!(state.level, 3);
    }

    #[test]
    fn elder_lookup_uses_known_players() {
        let mut state = AgentState::default();
        assert!(!state.has_elder());
        state
            .known_players
            .insert(12, JobInfo::new(JobKind::Collector, 1, 12));
        state
            .known_players
            .insert(40, JobInfo::new(JobKind::Elder, 4, 40));
        assert!(state.has_elder());
        assert_eq!(state.players_with_job(JobKind::Elder), vec![40]);
    }
}
