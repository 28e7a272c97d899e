//! Behavior engine.
//!
//! Each agent runs exactly one role (`Job`) at a time. The `JobManager` ticks
//! it, asks it whether to hand over to another role, and performs the
//! hand-over: `on_job_end` on the old role, then `on_job_start` on the new one,
//! then a `job_update` broadcast so teammates can track who does what.

pub mod basic;
pub mod collector;
pub mod elder;
pub mod garbler;
pub mod messages;
pub mod newcomer;

pub use messages::{Incoming, TeamMessage};

use crate::agent::player::Player;
use crate::transport::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// At or below this much food a role drops what it does and feeds.
pub const CRITICAL_FOOD_THRESHOLD: u32 = 5;

// ---------------------------------------------------------------------------
// Role catalog
// ---------------------------------------------------------------------------

/// The closed set of roles an agent can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Newcomer,
    Basic,
    Elder,
    Garbler,
    Collector,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        Self::Newcomer,
        Self::Basic,
        Self::Elder,
        Self::Garbler,
        Self::Collector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newcomer => "newcomer",
            Self::Basic => "basic",
            Self::Elder => "elder",
            Self::Garbler => "garbler",
            Self::Collector => "collector",
        }
    }

    /// Fresh role instance with default private state.
    pub fn instantiate(&self) -> Box<dyn Job> {
        match self {
            Self::Newcomer => Box::new(newcomer::Newcomer::new()),
            Self::Basic => Box::new(basic::Basic::new()),
            Self::Elder => Box::new(elder::Elder::new()),
            Self::Garbler => Box::new(garbler::Garbler::new()),
            Self::Collector => Box::new(collector::Collector::new()),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|j| j.as_str() == s)
            .ok_or_else(|| format!("unknown job: {}", s))
    }
}

/// Public summary a role broadcasts when it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job: JobKind,
    pub level: u32,
    pub player_id: u16,
    /// Role-specific fields.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl JobInfo {
    pub fn new(job: JobKind, level: u32, player_id: u16) -> Self {
        Self {
            job,
            level,
            player_id,
            details: Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Role contract
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Job: Send + Sync {
    fn kind(&self) -> JobKind;

    /// One tick's worth of action.
    async fn execute_behavior(&mut self, player: &mut Player) -> Result<(), TransportError>;

    /// The role to switch to, if any.
    fn should_transition(&mut self, player: &mut Player) -> Option<JobKind>;

    async fn on_message_received(
        &mut self,
        player: &mut Player,
        incoming: &Incoming,
    ) -> Result<(), TransportError>;

    /// A broadcast that did not decode with our team key.
    async fn on_unknown_broadcast(
        &mut self,
        _player: &mut Player,
        _direction: u8,
        _content: &str,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn on_job_start(&mut self, player: &mut Player) -> Result<(), TransportError> {
        debug!("Player {} starting job: {}", player.id(), self.kind());
        Ok(())
    }

    async fn on_job_end(&mut self, player: &mut Player) -> Result<(), TransportError> {
        debug!("Player {} ending job: {}", player.id(), self.kind());
        Ok(())
    }

    /// Extra fields for the public summary.
    fn details(&self, _player: &Player) -> Map<String, Value> {
        Map::new()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct JobManager {
    current: Box<dyn Job>,
}

impl JobManager {
    /// Start the first role and announce it.
    pub async fn start(player: &mut Player, initial: JobKind) -> Result<Self, TransportError> {
        let mut current = initial.instantiate();
        current.on_job_start(player).await?;
        let manager = Self { current };
        manager.announce(player).await?;
        Ok(manager)
    }

    pub fn current(&self) -> JobKind {
        self.current.kind()
    }

    pub fn job_info(&self, player: &Player) -> JobInfo {
        JobInfo {
            details: self.current.details(player),
            ..JobInfo::new(self.current.kind(), player.state.level, player.id())
        }
    }

    pub async fn set_job(&mut self, player: &mut Player, next: JobKind) -> Result<(), TransportError> {
        let previous = self.current.kind();
        self.current.on_job_end(player).await?;
        player.state.job_history.push(previous);

        self.current = next.instantiate();
        self.current.on_job_start(player).await?;
        info!("Player {} switched job: {} -> {}", player.id(), previous, next);

        self.announce(player).await
    }

    async fn announce(&self, player: &mut Player) -> Result<(), TransportError> {
        let update = TeamMessage::JobUpdate(self.job_info(player));
        player.broadcast(&update.to_string()).await?;
        Ok(())
    }

    pub async fn execute_current_job(&mut self, player: &mut Player) -> Result<(), TransportError> {
        self.current.execute_behavior(player).await
    }

    /// Ask the active role whether to switch, and switch if so.
    pub async fn check_transitions(
        &mut self,
        player: &mut Player,
    ) -> Result<Option<JobKind>, TransportError> {
        match self.current.should_transition(player) {
            Some(next) => {
                self.set_job(player, next).await?;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Update the team registry, then let the active role react.
    pub async fn handle_message(
        &mut self,
        player: &mut Player,
        incoming: &Incoming,
    ) -> Result<(), TransportError> {
        let sender = incoming.sender_id;
        let known = &mut player.state.known_players;
        match &incoming.message {
            TeamMessage::JobUpdate(info) => {
                known.insert(sender, info.clone());
            }
            TeamMessage::ElderAnnounce { .. } => {
                known
                    .entry(sender)
                    .and_modify(|info| info.job = JobKind::Elder)
                    .or_insert_with(|| JobInfo::new(JobKind::Elder, 0, sender));
            }
            TeamMessage::ElderSteppingDown => {
                if known.get(&sender).is_some_and(|info| info.job == JobKind::Elder) {
                    known.remove(&sender);
                }
            }
            _ => {}
        }

        self.current.on_message_received(player, incoming).await
    }

    pub async fn handle_unknown(
        &mut self,
        player: &mut Player,
        direction: u8,
        content: &str,
    ) -> Result<(), TransportError> {
        self.current.on_unknown_broadcast(player, direction, content).await
    }
}

// ---------------------------------------------------------------------------
// Weighted selection
// ---------------------------------------------------------------------------

pub fn total_weight<T>(entries: &[(T, u32)]) -> u32 {
    entries.iter().map(|(_, w)| *w).sum()
}

/// Cumulative-weight pick: the first entry whose running total reaches `draw`.
///
/// `draw` is expected in `1..=total_weight`.
pub fn pick_weighted<T>(entries: &[(T, u32)], draw: u32) -> Option<&T> {
    let mut cumulative = 0;
    for (item, weight) in entries {
        cumulative += weight;
        if draw <= cumulative {
            return Some(item);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fixtures::{sent_team_messages, test_player};
    use crate::transport::testing::ScriptedLink;
    use std::sync::Arc;

    #[test]
    fn weighted_pick_walks_cumulative_weights() {
        let modes = [("raven", 50), ("mimicry", 40), ("parrot", 10)];
        assert_eq!(total_weight(&modes), 100);
        assert_eq!(pick_weighted(&modes, 1), Some(&"raven"));
        assert_eq!(pick_weighted(&modes, 50), Some(&"raven"));
        assert_eq!(pick_weighted(&modes, 51), Some(&"mimicry"));
        assert_eq!(pick_weighted(&modes, 90), Some(&"mimicry"));
        assert_eq!(pick_weighted(&modes, 91), Some(&"parrot"));
        assert_eq!(pick_weighted(&modes, 101), None);
    }

    #[test]
    fn catalog_names_round_trip() {
        for kind in JobKind::ALL {
            assert_eq!(kind.to_string().parse::<JobKind>().unwrap(), kind);
            assert_eq!(kind.instantiate().kind(), kind);
        }
        assert!("scout".parse::<JobKind>().is_err());
    }

    #[tokio::test]
    async fn transition_ends_old_role_before_starting_new_one() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        let mut manager = JobManager::start(&mut player, JobKind::Elder).await.unwrap();
        manager.set_job(&mut player, JobKind::Basic).await.unwrap();

        let said = sent_team_messages(&link);
        let stepping_down = said.iter().position(|m| m == "elder_stepping_down").unwrap();
        let basic_update = said
            .iter()
            .position(|m| m.starts_with("job_update") && m.contains("\"basic\""))
            .unwrap();
        assert!(stepping_down < basic_update);
        assert_eq!(said.iter().filter(|m| *m == "elder_stepping_down").count(), 1);
        assert_eq!(manager.current(), JobKind::Basic);
        assert_eq!(player.state.job_history, vec![JobKind::Elder]);
    }

    #[tokio::test]
    async fn manager_tracks_elders_and_job_updates() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        let mut manager = JobManager::start(&mut player, JobKind::Basic).await.unwrap();

        let incoming = |sender, message| Incoming {
            direction: 3,
            sender_id: sender,
            counter: 1,
            timestamp: 0,
            message,
        };

        manager
            .handle_message(&mut player, &incoming(5, TeamMessage::ElderAnnounce { elder_id: 5 }))
            .await
            .unwrap();
        assert!(player.has_elder());

        let update = TeamMessage::JobUpdate(JobInfo::new(JobKind::Collector, 2, 8));
        manager
            .handle_message(&mut player, &incoming(8, update))
            .await
            .unwrap();
        assert_eq!(player.state.known_players[&8].job, JobKind::Collector);

        manager
            .handle_message(&mut player, &incoming(5, TeamMessage::ElderSteppingDown))
            .await
            .unwrap();
        assert!(!player.has_elder());
        assert!(player.state.known_players.contains_key(&8));
    }

    #[tokio::test]
    async fn start_announces_the_first_role() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        JobManager::start(&mut player, JobKind::Newcomer).await.unwrap();
        let said = sent_team_messages(&link);
        assert_eq!(said[0], "newcomer_joined");
        assert!(said[1].starts_with("job_update {\"job\":\"newcomer\""));
    }
}
