//! Self-reliant forager that gathers what its next elevation needs.

use super::{Incoming, Job, JobKind, TeamMessage};
use crate::agent::player::{EvolutionOutcome, Player};
use crate::protocol::Tile;
use crate::transport::TransportError;
use crate::types::{Inventory, Resource};
use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Below this much food, foraging switches to food only.
pub const FOOD_PRIORITY_THRESHOLD: u32 = 3;

/// Ticks between two status digests.
pub const STATUS_INTERVAL: u64 = 25;

/// Lowest level at which a Basic may take the lead.
pub const MIN_ELDER_LEVEL: u32 = 4;

/// Chance per tick of stepping up when no Elder is known.
pub const PROMOTION_CHANCE: f64 = 0.1;

#[derive(Debug)]
pub struct Basic {
    /// Stones still owed for the next level.
    target: Inventory,
    evolution_announced: bool,
    last_level: u32,
    assigned: Option<JobKind>,
    enemy_reported: bool,
}

impl Default for Basic {
    fn default() -> Self {
        Self {
            target: Inventory::new(),
            evolution_announced: false,
            last_level: 1,
            assigned: None,
            enemy_reported: false,
        }
    }
}

impl Basic {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_target(&mut self, player: &Player) {
        self.target = player
            .elevation()
            .requirement(player.state.level + 1)
            .map(|req| req.missing(&player.state.resources))
            .unwrap_or_default();
    }

    async fn collect_resources(&mut self, player: &mut Player) -> Result<(), TransportError> {
        let tiles = player.look().await?;
        match best_tile(&tiles, &self.target) {
            Some(0) => {
                player.take_all(&tiles[0]).await?;
            }
            Some(index) => player.move_to_tile(index).await?,
            None => player.random_movement().await?,
        }
        Ok(())
    }

    async fn broadcast_status(&self, player: &mut Player) -> Result<(), TransportError> {
        let status = TeamMessage::BasicStatus {
            level: player.state.level,
            needs: self.target.stone_count(),
            food: player.state.food_stock,
        };
        player.broadcast(&status.to_string()).await?;
        Ok(())
    }
}

/// Tile holding the most urgent still-needed stone, nearest first on ties.
fn best_tile(tiles: &[Tile], target: &Inventory) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (index, tile) in tiles.iter().enumerate() {
        let priority = Resource::STONES
            .iter()
            .position(|stone| target.get(*stone) > 0 && tile.iter().any(|i| i == stone.as_str()));
        if let Some(priority) = priority {
            if best.map_or(true, |(p, _)| priority < p) {
                best = Some((priority, index));
            }
        }
    }
    best.map(|(_, index)| index)
}

#[async_trait]
impl Job for Basic {
    fn kind(&self) -> JobKind {
        JobKind::Basic
    }

    async fn execute_behavior(&mut self, player: &mut Player) -> Result<(), TransportError> {
        self.update_target(player);

        if player.state.food_stock < FOOD_PRIORITY_THRESHOLD {
            player.search_food().await?;
        } else {
            self.collect_resources(player).await?;
        }

        if player.can_evolve() {
            if !self.evolution_announced {
                let ready = TeamMessage::EvolutionReady {
                    level: player.state.level,
                };
                player.broadcast(&ready.to_string()).await?;
                self.evolution_announced = true;
            }

            let outcome = player.evolve().await?;
            debug!("Basic {} evolution attempt: {}", player.id(), outcome);
            if let EvolutionOutcome::Elevated(level) = outcome {
                if level > self.last_level {
                    self.evolution_announced = false;
                    self.last_level = level;
                    self.update_target(player);
                }
            }
        }

        if player.tick % STATUS_INTERVAL == 0 {
            self.broadcast_status(player).await?;
        }
        Ok(())
    }

    fn should_transition(&mut self, player: &mut Player) -> Option<JobKind> {
        if let Some(job) = self.assigned.take() {
            return Some(job);
        }
        if player.state.level >= MIN_ELDER_LEVEL
            && !player.has_elder()
            && player.rng.gen_bool(PROMOTION_CHANCE)
        {
            return Some(JobKind::Elder);
        }
        None
    }

    async fn on_message_received(
        &mut self,
        player: &mut Player,
        incoming: &Incoming,
    ) -> Result<(), TransportError> {
        match &incoming.message {
            TeamMessage::AssignJob { player_id, job } if *player_id == player.id() => {
                debug!("Basic {} reassigned to {}", player.id(), job);
                self.assigned = Some(*job);
            }
            TeamMessage::EvolutionCall { level, .. } => {
                let answer = TeamMessage::EvolutionResponse {
                    player_id: player.id(),
                };
                player.broadcast(&answer.to_string()).await?;
                if *level == player.state.level + 1 {
                    player.move_towards(incoming.direction).await?;
                }
            }
            TeamMessage::StatusReportRequest => {
                self.broadcast_status(player).await?;
            }
            TeamMessage::ResourceRequest { resource, amount } => {
                let held = player.state.resources.get(*resource);
                let needed = player
                    .elevation()
                    .requirement(player.state.level + 1)
                    .map_or(0, |req| req.stones.get(*resource));
                let spare = held.saturating_sub(needed).min(*amount);
                if spare > 0 && player.set(*resource).await? {
                    let offer = TeamMessage::ResourceAvailable {
                        resource: *resource,
                    };
                    player.broadcast(&offer.to_string()).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_unknown_broadcast(
        &mut self,
        player: &mut Player,
        direction: u8,
        _content: &str,
    ) -> Result<(), TransportError> {
        if !self.enemy_reported {
            debug!("Basic {} heard a foreign broadcast from {}", player.id(), direction);
            player
                .broadcast(&TeamMessage::EnemyDetected.to_string())
                .await?;
            self.enemy_reported = true;
        }
        Ok(())
    }

    async fn on_job_start(&mut self, player: &mut Player) -> Result<(), TransportError> {
        debug!("Player {} starting job: {}", player.id(), self.kind());
        self.last_level = player.state.level;
        self.update_target(player);
        Ok(())
    }

    fn details(&self, player: &Player) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("target_resources".into(), json!(self.target));
        details.insert("food_stock".into(), json!(player.state.food_stock));
        details.insert("evolution_ready".into(), json!(player.can_evolve()));
        details
    }
}
