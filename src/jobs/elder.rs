//! Team lead: hands out roles, keeps a depot, calls group incantations.

use super::{Incoming, Job, JobKind, TeamMessage, CRITICAL_FOOD_THRESHOLD};
use crate::agent::player::{EvolutionOutcome, Player};
use crate::transport::TransportError;
use crate::types::{Inventory, Resource};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

pub const ANNOUNCE_INTERVAL: u64 = 20;
pub const STATUS_REQUEST_INTERVAL: u64 = 30;

/// Role handed out once every quota is met.
pub const DEFAULT_JOB: JobKind = JobKind::Collector;

/// Garbler share once an enemy has been heard.
pub const ENEMY_GARBLER_QUOTA: f64 = 0.30;

#[derive(Debug)]
pub struct Elder {
    managed: HashMap<u16, JobKind>,
    assignments: BTreeMap<JobKind, Vec<u16>>,
    pending: Vec<u16>,
    /// Target share of the managed team per role.
    quotas: Vec<(JobKind, f64)>,
    /// Items dropped on our tile by teammates and not yet picked up.
    depot: Inventory,
    enemy_detected: bool,
    base_announced: bool,
    last_fork_tick: u64,
}

impl Default for Elder {
    fn default() -> Self {
        Self {
            managed: HashMap::new(),
            assignments: BTreeMap::new(),
            pending: Vec::new(),
            quotas: vec![
                (JobKind::Collector, 0.30),
                (JobKind::Basic, 0.40),
                (JobKind::Garbler, 0.0),
            ],
            depot: Inventory::new(),
            enemy_detected: false,
            base_announced: false,
            last_fork_tick: 0,
        }
    }
}

impl Elder {
    pub fn new() -> Self {
        Self::default()
    }

    fn assigned_count(&self) -> usize {
        self.assignments.values().map(Vec::len).sum()
    }

    fn count(&self, job: JobKind) -> usize {
        self.assignments.get(&job).map_or(0, Vec::len)
    }

    /// The role furthest below its quota once one more agent joins.
    fn best_job(&self) -> JobKind {
        let team = (self.assigned_count() + 1) as f64;
        self.quotas
            .iter()
            .map(|(job, quota)| (*job, quota * team - self.count(*job) as f64))
            .filter(|(_, deficit)| *deficit > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(job, _)| job)
            .unwrap_or(DEFAULT_JOB)
    }

    async fn process_newcomers(&mut self, player: &mut Player) -> Result<(), TransportError> {
        for newcomer in std::mem::take(&mut self.pending) {
            let job = self.best_job();
            let order = TeamMessage::AssignJob {
                player_id: newcomer,
                job,
            };
            player.broadcast(&order.to_string()).await?;
            self.managed.insert(newcomer, job);
            self.assignments.entry(job).or_default().push(newcomer);
            debug!("Elder assigned {} to player {}", job, newcomer);
        }
        Ok(())
    }

    async fn manage_assignments(&mut self, player: &mut Player) -> Result<(), TransportError> {
        let known = &player.state.known_players;
        for members in self.assignments.values_mut() {
            members.retain(|id| known.contains_key(id));
        }

        if self.enemy_detected {
            for (job, quota) in self.quotas.iter_mut() {
                if *job == JobKind::Garbler {
                    *quota = ENEMY_GARBLER_QUOTA;
                }
            }
        }

        if player.tick % STATUS_REQUEST_INTERVAL == 0 {
            player
                .broadcast(&TeamMessage::StatusReportRequest.to_string())
                .await?;
        }
        Ok(())
    }

    /// Pick up delivered stones, keep delivered food as a reserve.
    async fn manage_base(&mut self, player: &mut Player) -> Result<(), TransportError> {
        if !self.base_announced {
            let here = TeamMessage::ElderLocation { x: 0, y: 0 };
            player.broadcast(&here.to_string()).await?;
            self.base_announced = true;
        }

        let tiles = player.look().await?;
        let here = tiles.into_iter().next().unwrap_or_default();
        let food_here = here.iter().filter(|i| *i == Resource::Food.as_str()).count();
        self.depot.set(Resource::Food, food_here as u32);

        for item in &here {
            let Ok(stone) = item.parse::<Resource>() else {
                continue;
            };
            if stone.is_stone() && player.take(stone).await? {
                self.depot.remove(stone, 1);
            }
        }

        if player.state.food_stock <= CRITICAL_FOOD_THRESHOLD
            && self.depot.get(Resource::Food) > 0
            && player.take(Resource::Food).await?
        {
            self.depot.remove(Resource::Food, 1);
            debug!("Elder ate from the depot ({} food left)", self.depot.get(Resource::Food));
        }
        Ok(())
    }

    async fn coordinate_evolution(&mut self, player: &mut Player) -> Result<(), TransportError> {
        let target = player.state.level + 1;
        let Some(requirement) = player.elevation().requirement(target).cloned() else {
            return Ok(());
        };

        let mut pooled = player.state.resources.clone();
        for (resource, count) in self.depot.iter() {
            if resource.is_stone() {
                pooled.add(resource, count);
            }
        }
        let team = self.assigned_count() as u32 + 1;
        if team < requirement.players || !requirement.satisfied_by(&pooled) {
            return Ok(());
        }

        let outcome = player.evolve().await?;
        debug!("Elder evolution attempt: {}", outcome);
        // Pooled stones still sit in the depot: bring the team over anyway.
        if outcome == EvolutionOutcome::NotReady && requirement.players > 1 {
            let here = player.players_on_tile().await?;
            if here < requirement.players {
                let call = TeamMessage::EvolutionCall {
                    level: target,
                    needed: requirement.players - here,
                };
                player.broadcast(&call.to_string()).await?;
            }
        }
        Ok(())
    }

    async fn maybe_reproduce(&mut self, player: &mut Player) -> Result<(), TransportError> {
        let interval = player.settings().fork_interval_ticks;
        if interval == 0 || player.tick.saturating_sub(self.last_fork_tick) < interval {
            return Ok(());
        }
        self.last_fork_tick = player.tick;
        player.reproduce().await?;
        Ok(())
    }
}

#[async_trait]
impl Job for Elder {
    fn kind(&self) -> JobKind {
        JobKind::Elder
    }

    async fn execute_behavior(&mut self, player: &mut Player) -> Result<(), TransportError> {
        if player.tick % ANNOUNCE_INTERVAL == 0 {
            let announce = TeamMessage::ElderAnnounce {
                elder_id: player.id(),
            };
            player.broadcast(&announce.to_string()).await?;
        }

        self.process_newcomers(player).await?;
        self.manage_assignments(player).await?;
        self.manage_base(player).await?;
        self.coordinate_evolution(player).await?;
        self.maybe_reproduce(player).await
    }

    fn should_transition(&mut self, player: &mut Player) -> Option<JobKind> {
        if player.state.food_stock <= CRITICAL_FOOD_THRESHOLD && self.depot.get(Resource::Food) == 0 {
            return Some(JobKind::Basic);
        }
        None
    }

    async fn on_message_received(
        &mut self,
        _player: &mut Player,
        incoming: &Incoming,
    ) -> Result<(), TransportError> {
        let sender = incoming.sender_id;
        match &incoming.message {
            TeamMessage::NewcomerSeekingAssignment { .. } => {
                if !self.pending.contains(&sender) && !self.managed.contains_key(&sender) {
                    debug!("Elder received newcomer {}", sender);
                    self.pending.push(sender);
                }
            }
            TeamMessage::ResourceDelivery { resource, amount } => {
                self.depot.add(*resource, *amount);
                debug!("Elder received {} {} from player {}", amount, resource, sender);
            }
            TeamMessage::EnemyDetected => {
                debug!("Elder received enemy detection report");
                self.enemy_detected = true;
            }
            TeamMessage::BasicStatus { level, needs, food } => {
                debug!(
                    "Status from {}: level {}, needs {}, food {}",
                    sender, level, needs, food
                );
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_unknown_broadcast(
        &mut self,
        _player: &mut Player,
        _direction: u8,
        _content: &str,
    ) -> Result<(), TransportError> {
        self.enemy_detected = true;
        Ok(())
    }

    async fn on_job_start(&mut self, player: &mut Player) -> Result<(), TransportError> {
        let announce = TeamMessage::ElderAnnounce {
            elder_id: player.id(),
        };
        player.broadcast(&announce.to_string()).await?;
        self.last_fork_tick = player.tick;
        info!("Player {} became Elder", player.id());
        Ok(())
    }

    async fn on_job_end(&mut self, player: &mut Player) -> Result<(), TransportError> {
        player
            .broadcast(&TeamMessage::ElderSteppingDown.to_string())
            .await?;
        info!("Player {} stepped down as Elder", player.id());
        Ok(())
    }

    fn details(&self, _player: &Player) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("managed_players".into(), json!(self.managed.len()));
        details.insert(
            "base_location".into(),
            json!(self.base_announced.then_some("current")),
        );
        details.insert("resource_depot".into(), json!(self.depot));
        details
    }
}
