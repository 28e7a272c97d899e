//! Gathers stones and hauls them to the Elder's tile.

use super::{Incoming, Job, JobKind, TeamMessage, CRITICAL_FOOD_THRESHOLD};
use crate::agent::player::Player;
use crate::transport::TransportError;
use crate::types::Resource;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Stones carried before heading back to the depot.
pub const CARRYING_CAPACITY: u32 = 20;

#[derive(Debug, Default)]
pub struct Collector {
    carrying_load: u32,
    returning_to_depot: bool,
    /// Direction the last Elder broadcast came from.
    elder_direction: Option<u8>,
    elder_location: Option<(i64, i64)>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    async fn gather(&mut self, player: &mut Player) -> Result<(), TransportError> {
        let tiles = player.look().await?;
        let here = tiles.first().cloned().unwrap_or_default();

        if here.iter().any(|item| item.parse::<Resource>().is_ok()) {
            for item in &here {
                if self.carrying_load >= CARRYING_CAPACITY {
                    break;
                }
                let Ok(resource) = item.parse::<Resource>() else {
                    continue;
                };
                if player.take(resource).await? && resource.is_stone() {
                    self.carrying_load += 1;
                    debug!("Collector {} took {}", player.id(), resource);
                }
            }
            return Ok(());
        }

        let nearest = tiles
            .iter()
            .position(|tile| tile.iter().any(|item| item.parse::<Resource>().is_ok()));
        match nearest {
            Some(index) => player.move_to_tile(index).await,
            None => player.random_movement().await,
        }
    }

    async fn return_to_depot(&mut self, player: &mut Player) -> Result<(), TransportError> {
        match self.elder_direction {
            None => player.random_movement().await,
            Some(0) => self.deliver(player).await,
            Some(direction) => player.move_towards(direction).await,
        }
    }

    /// Drop every stone on the Elder's tile and report what was dropped.
    async fn deliver(&mut self, player: &mut Player) -> Result<(), TransportError> {
        for stone in Resource::STONES {
            let mut dropped = 0;
            for _ in 0..player.state.resources.get(stone) {
                if !player.set(stone).await? {
                    break;
                }
                dropped += 1;
            }
            if dropped > 0 {
                let report = TeamMessage::ResourceDelivery {
                    resource: stone,
                    amount: dropped,
                };
                player.broadcast(&report.to_string()).await?;
            }
        }
        info!("Collector {} delivered its load", player.id());
        self.carrying_load = 0;
        self.returning_to_depot = false;
        // A bearing serves one trip only.
        self.elder_direction = None;
        Ok(())
    }
}

#[async_trait]
impl Job for Collector {
    fn kind(&self) -> JobKind {
        JobKind::Collector
    }

    async fn execute_behavior(&mut self, player: &mut Player) -> Result<(), TransportError> {
        if self.returning_to_depot {
            return self.return_to_depot(player).await;
        }
        if self.carrying_load >= CARRYING_CAPACITY {
            self.returning_to_depot = true;
            return self.return_to_depot(player).await;
        }
        self.gather(player).await
    }

    fn should_transition(&mut self, player: &mut Player) -> Option<JobKind> {
        (player.state.food_stock <= CRITICAL_FOOD_THRESHOLD).then_some(JobKind::Basic)
    }

    async fn on_message_received(
        &mut self,
        player: &mut Player,
        incoming: &Incoming,
    ) -> Result<(), TransportError> {
        let from_elder = player
            .state
            .known_players
            .get(&incoming.sender_id)
            .is_some_and(|info| info.job == JobKind::Elder);

        match &incoming.message {
            TeamMessage::ElderLocation { x, y } => {
                self.elder_location = Some((*x, *y));
                self.elder_direction = Some(incoming.direction);
            }
            TeamMessage::ElderAnnounce { .. } => {
                self.elder_direction = Some(incoming.direction);
            }
            _ if from_elder => {
                self.elder_direction = Some(incoming.direction);
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_job_start(&mut self, player: &mut Player) -> Result<(), TransportError> {
        self.carrying_load = player.state.resources.stone_count().min(CARRYING_CAPACITY);
        info!("Collector {} started resource collection", player.id());
        Ok(())
    }

    fn details(&self, _player: &Player) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("carrying_load".into(), json!(self.carrying_load));
        details.insert("carrying_capacity".into(), json!(CARRYING_CAPACITY));
        details.insert("returning_to_depot".into(), json!(self.returning_to_depot));
        details.insert("elder_location".into(), json!(self.elder_location));
        details
    }
}
