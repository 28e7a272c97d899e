//! Default role of a freshly connected agent: wait for an Elder's orders.

use super::{Incoming, Job, JobKind, TeamMessage, CRITICAL_FOOD_THRESHOLD};
use crate::agent::player::Player;
use crate::transport::TransportError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Ticks without Elder contact before the newcomer starts fending for itself.
pub const MAX_TICKS_WITHOUT_ELDER: u32 = 50;

/// Lowest level at which a newcomer may take the lead itself.
pub const MIN_ELDER_LEVEL: u32 = 3;

#[derive(Debug, Default)]
pub struct Newcomer {
    elder_id: Option<u16>,
    elder_location: Option<(i64, i64)>,
    assigned: Option<JobKind>,
    survival_mode: bool,
    ticks_without_elder: u32,
}

impl Newcomer {
    pub fn new() -> Self {
        Self::default()
    }

    fn waiting_for_assignment(&self) -> bool {
        self.assigned.is_none()
    }
}

#[async_trait]
impl Job for Newcomer {
    fn kind(&self) -> JobKind {
        JobKind::Newcomer
    }

    async fn execute_behavior(&mut self, player: &mut Player) -> Result<(), TransportError> {
        if self.waiting_for_assignment() {
            let ask = TeamMessage::NewcomerSeekingAssignment {
                level: player.state.level,
            };
            player.broadcast(&ask.to_string()).await?;
        }

        self.ticks_without_elder += 1;
        if !self.survival_mode
            && self.elder_id.is_none()
            && self.ticks_without_elder > MAX_TICKS_WITHOUT_ELDER
        {
            debug!("Newcomer {} entering survival mode", player.id());
            self.survival_mode = true;
        }

        if self.survival_mode
            || self.elder_id.is_none()
            || player.state.food_stock <= CRITICAL_FOOD_THRESHOLD
        {
            player.search_food().await?;
        }
        Ok(())
    }

    fn should_transition(&mut self, player: &mut Player) -> Option<JobKind> {
        if let Some(job) = self.assigned {
            return Some(job);
        }

        let elder_known = self.elder_id.is_some() || player.has_elder();
        if self.survival_mode
            && !elder_known
            && self.ticks_without_elder > MAX_TICKS_WITHOUT_ELDER * 2
        {
            return Some(if player.state.level >= MIN_ELDER_LEVEL {
                JobKind::Elder
            } else {
                JobKind::Basic
            });
        }
        None
    }

    async fn on_message_received(
        &mut self,
        player: &mut Player,
        incoming: &Incoming,
    ) -> Result<(), TransportError> {
        match &incoming.message {
            TeamMessage::ElderAnnounce { elder_id } => {
                debug!("Newcomer {} found elder: {}", player.id(), elder_id);
                self.elder_id = Some(*elder_id);
                self.ticks_without_elder = 0;
                self.survival_mode = false;
            }
            TeamMessage::ElderSteppingDown if self.elder_id == Some(incoming.sender_id) => {
                self.elder_id = None;
                self.ticks_without_elder = 0;
            }
            TeamMessage::AssignJob { player_id, job } if *player_id == player.id() => {
                debug!("Newcomer {} assigned job: {}", player.id(), job);
                self.assigned = Some(*job);
            }
            TeamMessage::ElderLocation { x, y } => {
                self.elder_location = Some((*x, *y));
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_job_start(&mut self, player: &mut Player) -> Result<(), TransportError> {
        debug!("Player {} starting job: {}", player.id(), self.kind());
        player
            .broadcast(&TeamMessage::NewcomerJoined.to_string())
            .await?;
        Ok(())
    }

    fn details(&self, _player: &Player) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("seeking_assignment".into(), json!(self.waiting_for_assignment()));
        details.insert("elder_id".into(), json!(self.elder_id));
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fixtures::{sent_team_messages, test_player};
    use crate::transport::testing::ScriptedLink;
    use std::sync::Arc;

    fn from(sender: u16, message: TeamMessage) -> Incoming {
        Incoming {
            direction: 2,
            sender_id: sender,
            counter: 1,
            timestamp: 0,
            message,
        }
    }

    #[tokio::test]
    async fn asks_for_assignment_every_tick() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        let mut job = Newcomer::new();
        job.execute_behavior(&mut player).await.unwrap();
        job.execute_behavior(&mut player).await.unwrap();
        assert_eq!(
            sent_team_messages(&link),
            vec!["newcomer_seeking_assignment 1"; 2]
        );
    }

    #[tokio::test]
    async fn takes_the_job_an_elder_assigns() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        let mut job = Newcomer::new();
        let me = player.id();

        let other = TeamMessage::AssignJob {
            player_id: me + 1,
            job: JobKind::Garbler,
        };
        job.on_message_received(&mut player, &from(1, other)).await.unwrap();
        assert_eq!(job.should_transition(&mut player), None);

        let mine = TeamMessage::AssignJob {
            player_id: me,
            job: JobKind::Collector,
        };
        job.on_message_received(&mut player, &from(1, mine)).await.unwrap();
        assert_eq!(job.should_transition(&mut player), Some(JobKind::Collector));
    }

    #[tokio::test]
    async fn never_self_promotes_while_an_elder_is_known() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        player.state.level = 5;
        let mut job = Newcomer::new();
        job.on_message_received(&mut player, &from(3, TeamMessage::ElderAnnounce { elder_id: 3 }))
            .await
            .unwrap();

        for _ in 0..(MAX_TICKS_WITHOUT_ELDER * 3) {
            job.execute_behavior(&mut player).await.unwrap();
            assert_eq!(job.should_transition(&mut player), None);
        }
    }

    #[tokio::test]
    async fn leads_when_abandoned_at_high_level() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        player.state.level = 3;
        let mut job = Newcomer::new();

        let mut promoted = None;
        for _ in 0..=(MAX_TICKS_WITHOUT_ELDER * 2) {
            job.execute_behavior(&mut player).await.unwrap();
            promoted = job.should_transition(&mut player);
            if promoted.is_some() {
                break;
            }
        }
        assert_eq!(promoted, Some(JobKind::Elder));
    }

    #[tokio::test]
    async fn settles_as_basic_when_abandoned_at_low_level() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        let mut job = Newcomer::new();

        let mut next = None;
        for _ in 0..=(MAX_TICKS_WITHOUT_ELDER * 2) {
            job.execute_behavior(&mut player).await.unwrap();
            next = job.should_transition(&mut player);
            if next.is_some() {
                break;
            }
        }
        assert_eq!(next, Some(JobKind::Basic));
    }
}
