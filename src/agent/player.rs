//! The command surface roles act through.
//!
//! `Player` bundles the link, the team secret, the agent's state and the
//! elevation table. Every game action is one `CommandLink` round trip; a `ko`
//! reply comes back as `Ok(false)` and only a dead connection is an error.

use crate::agent::state::AgentState;
use crate::cipher::{self, TeamSecret};
use crate::config::AgentConfig;
use crate::elevation::ElevationTable;
use crate::protocol::{self, Command, Tile, ELEVATION_UNDERWAY};
use crate::replication::Replicator;
use crate::transport::{CommandLink, TransportError};
use crate::types::Resource;
use rand::rngs::StdRng;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables the command surface needs from the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSettings {
    pub incantation_wait_limit: u32,
    pub rally_poll_limit: u32,
    pub fork_interval_ticks: u64,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for PlayerSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            incantation_wait_limit: config.incantation_wait_limit,
            rally_poll_limit: config.rally_poll_limit,
            fork_interval_ticks: config.fork_interval_ticks,
        }
    }
}

/// How an evolution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolutionOutcome {
    /// Stones missing, or no higher level exists.
    NotReady,
    /// Called teammates this tick; `needed` more must join before we incant.
    Rallying { needed: u32 },
    /// Not enough teammates gathered before the rally gave up.
    NoQuorum,
    /// The server refused, or never reported a new level.
    Rejected,
    Elevated(u32),
}

impl fmt::Display for EvolutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "not ready"),
            Self::Rallying { needed } => write!(f, "rallying ({} more needed)", needed),
            Self::NoQuorum => write!(f, "no quorum"),
            Self::Rejected => write!(f, "rejected"),
            Self::Elevated(level) => write!(f, "elevated to {}", level),
        }
    }
}

pub struct Player {
    link: Arc<dyn CommandLink>,
    secret: Arc<TeamSecret>,
    id: u16,
    counter: u8,
    elevation: ElevationTable,
    settings: PlayerSettings,
    replicator: Option<Replicator>,
    /// Rally in progress: target level and rounds called so far.
    rally: Option<(u32, u32)>,
    pub state: AgentState,
    pub rng: StdRng,
    /// Ticks run by the controller so far.
    pub tick: u64,
}

impl Player {
    pub fn new(
        link: Arc<dyn CommandLink>,
        secret: Arc<TeamSecret>,
        id: u16,
        elevation: ElevationTable,
        rng: StdRng,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            link,
            secret,
            id,
            counter: 0,
            elevation,
            settings,
            replicator: None,
            rally: None,
            state: AgentState::default(),
            rng,
            tick: 0,
        }
    }

    pub fn with_replicator(mut self, replicator: Replicator) -> Self {
        self.replicator = Some(replicator);
        self
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn secret(&self) -> &TeamSecret {
        &self.secret
    }

    pub fn elevation(&self) -> &ElevationTable {
        &self.elevation
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    pub fn has_elder(&self) -> bool {
        self.state.has_elder()
    }

    async fn run(&self, command: Command) -> Result<String, TransportError> {
        self.link.send_command(&command.to_string()).await
    }

    async fn run_ok(&self, command: Command) -> Result<bool, TransportError> {
        Ok(protocol::is_ok(&self.run(command).await?))
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    pub async fn forward(&self) -> Result<bool, TransportError> {
        self.run_ok(Command::Forward).await
    }

    pub async fn left(&self) -> Result<bool, TransportError> {
        self.run_ok(Command::Left).await
    }

    pub async fn right(&self) -> Result<bool, TransportError> {
        self.run_ok(Command::Right).await
    }

    /// One step forward, or a quarter turn either way.
    pub async fn random_movement(&mut self) -> Result<(), TransportError> {
        match self.rng.gen_range(0..3) {
            0 => self.forward().await?,
            1 => self.left().await?,
            _ => self.right().await?,
        };
        Ok(())
    }

    /// Walk to a tile of the last `Look`.
    ///
    /// Row `r` of the vision cone holds tiles `r*r ..= r*r + 2r`, its middle
    /// tile straight ahead.
    pub async fn move_to_tile(&self, index: usize) -> Result<(), TransportError> {
        let mut row = 0usize;
        while (row + 1) * (row + 1) <= index {
            row += 1;
        }
        let offset = index as i64 - (row * row + row) as i64;

        for _ in 0..row {
            self.forward().await?;
        }
        if offset < 0 {
            self.left().await?;
        } else if offset > 0 {
            self.right().await?;
        }
        for _ in 0..offset.unsigned_abs() {
            self.forward().await?;
        }
        Ok(())
    }

    /// One step toward a broadcast direction (1 ahead, counter-clockwise to 8).
    pub async fn move_towards(&self, direction: u8) -> Result<(), TransportError> {
        match direction {
            0 => return Ok(()),
            1 | 2 | 8 => {}
            3 | 4 => {
                self.left().await?;
            }
            5 => {
                self.left().await?;
                self.left().await?;
            }
            _ => {
                self.right().await?;
            }
        }
        self.forward().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // World view
    // -----------------------------------------------------------------------

    pub async fn look(&self) -> Result<Vec<Tile>, TransportError> {
        Ok(protocol::parse_look(&self.run(Command::Look).await?))
    }

    /// Sync food and stones with the server. `false` if the reply was garbled.
    pub async fn refresh_inventory(&mut self) -> Result<bool, TransportError> {
        let reply = self.run(Command::Inventory).await?;
        let Some(inventory) = protocol::parse_inventory(&reply) else {
            debug!("Unexpected inventory reply: {}", reply);
            return Ok(false);
        };
        self.state.food_stock = inventory.get(Resource::Food);
        for stone in Resource::STONES {
            self.state.resources.set(stone, inventory.get(stone));
        }
        Ok(true)
    }

    pub async fn players_on_tile(&self) -> Result<u32, TransportError> {
        let tiles = self.look().await?;
        Ok(tiles.first().map(|t| protocol::players_on(t)).unwrap_or(0))
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    pub async fn take(&mut self, resource: Resource) -> Result<bool, TransportError> {
        let taken = self.run_ok(Command::Take(resource)).await?;
        if taken {
            if resource == Resource::Food {
                self.state.food_stock += 1;
            } else {
                self.state.resources.add(resource, 1);
            }
        }
        Ok(taken)
    }

    pub async fn set(&mut self, resource: Resource) -> Result<bool, TransportError> {
        let dropped = self.run_ok(Command::Set(resource)).await?;
        if dropped {
            if resource == Resource::Food {
                self.state.food_stock = self.state.food_stock.saturating_sub(1);
            } else {
                self.state.resources.remove(resource, 1);
            }
        }
        Ok(dropped)
    }

    /// Take every item listed on a tile. Returns how many were picked up.
    pub async fn take_all(&mut self, tile: &[String]) -> Result<u32, TransportError> {
        let mut taken = 0;
        for item in tile {
            let Ok(resource) = item.parse::<Resource>() else {
                continue;
            };
            if self.take(resource).await? {
                taken += 1;
            }
        }
        Ok(taken)
    }

    /// Eat what is underfoot, walk to the nearest visible food, or wander.
    pub async fn search_food(&mut self) -> Result<(), TransportError> {
        let tiles = self.look().await?;
        let nearest = tiles
            .iter()
            .position(|tile| tile.iter().any(|item| item == Resource::Food.as_str()));

        match nearest {
            Some(0) => {
                self.take(Resource::Food).await?;
            }
            Some(index) => self.move_to_tile(index).await?,
            None => self.random_movement().await?,
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Team channel
    // -----------------------------------------------------------------------

    /// Encrypt and broadcast a team message.
    pub async fn broadcast(&mut self, text: &str) -> Result<bool, TransportError> {
        self.counter = (self.counter + 1) % 255;
        let envelope = match cipher::encode(self.id, self.counter, text.as_bytes(), &self.secret) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Cannot encode broadcast ({}): {}", e, text);
                return Ok(false);
            }
        };
        debug!("Broadcasting #{}: {}", self.counter, text);
        self.run_ok(Command::Broadcast(envelope)).await
    }

    /// Broadcast text as-is, bypassing the cipher.
    pub async fn broadcast_raw(&self, text: &str) -> Result<bool, TransportError> {
        self.run_ok(Command::Broadcast(text.to_string())).await
    }

    pub fn counter(&self) -> u8 {
        self.counter
    }

    // -----------------------------------------------------------------------
    // Reproduction
    // -----------------------------------------------------------------------

    /// Free slots left in the team; an unparsable reply counts as none.
    pub async fn connect_nbr(&self) -> Result<u32, TransportError> {
        let reply = self.run(Command::ConnectNbr).await?;
        Ok(reply.trim().parse().unwrap_or(0))
    }

    pub async fn fork(&self) -> Result<bool, TransportError> {
        self.run_ok(Command::Fork).await
    }

    pub async fn eject(&self) -> Result<bool, TransportError> {
        self.run_ok(Command::Eject).await
    }

    /// Lay an egg if no slot is free, then start a new agent process.
    pub async fn reproduce(&mut self) -> Result<bool, TransportError> {
        match &self.replicator {
            None => return Ok(false),
            Some(replicator) if !replicator.has_capacity() => {
                debug!("Child limit reached ({})", replicator.active());
                return Ok(false);
            }
            Some(_) => {}
        }

        if self.connect_nbr().await? == 0 && !self.fork().await? {
            debug!("Fork refused");
            return Ok(false);
        }

        let Some(replicator) = self.replicator.as_mut() else {
            return Ok(false);
        };
        match replicator.spawn() {
            Ok(pid) => {
                info!("Spawned child agent (pid {})", pid);
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to spawn child agent: {:#}", e);
                Ok(false)
            }
        }
    }

    pub fn reap_children(&mut self) {
        if let Some(replicator) = self.replicator.as_mut() {
            replicator.reap();
        }
    }

    // -----------------------------------------------------------------------
    // Evolution
    // -----------------------------------------------------------------------

    /// Whether the stones for the next level are in hand.
    pub fn can_evolve(&self) -> bool {
        self.elevation
            .requirement(self.state.level + 1)
            .is_some_and(|req| req.satisfied_by(&self.state.resources))
    }

    /// Take one step of the incantation protocol for the next level.
    ///
    /// Group levels need a rally first. Each call polls the tile once and,
    /// while teammates are missing, broadcasts one call and returns
    /// `Rallying`; the rally is abandoned after `rally_poll_limit` calls.
    /// Once enough players stand here the stones are dropped and the
    /// incantation runs in the same call.
    pub async fn evolve(&mut self) -> Result<EvolutionOutcome, TransportError> {
        let target = self.state.level + 1;
        let Some(requirement) = self.elevation.requirement(target).cloned() else {
            self.rally = None;
            return Ok(EvolutionOutcome::NotReady);
        };
        if !requirement.satisfied_by(&self.state.resources) {
            self.rally = None;
            return Ok(EvolutionOutcome::NotReady);
        }

        if requirement.players > 1 {
            let here = self.players_on_tile().await?;
            if here < requirement.players {
                return self.rally_step(target, requirement.players - here).await;
            }
        }
        self.rally = None;

        for (stone, count) in requirement.stones.iter() {
            for _ in 0..count {
                if !self.set(stone).await? {
                    warn!("Server refused to take {} for the ritual", stone);
                    return Ok(EvolutionOutcome::Rejected);
                }
            }
        }

        let max_lines = 1 + self.settings.incantation_wait_limit as usize;
        let lines = self
            .link
            .send_command_until(
                &Command::Incantation.to_string(),
                max_lines,
                |line| line != ELEVATION_UNDERWAY,
            )
            .await?;

        if lines.first().map(String::as_str) != Some(ELEVATION_UNDERWAY) {
            debug!("Incantation refused: {:?}", lines.first());
            return Ok(EvolutionOutcome::Rejected);
        }

        match lines.iter().skip(1).find_map(|l| protocol::parse_level(l)) {
            Some(level) => {
                self.state.raise_level(level);
                info!("Player {} reached level {}", self.id, self.state.level);
                Ok(EvolutionOutcome::Elevated(self.state.level))
            }
            None => {
                debug!("Incantation ended without a new level: {:?}", lines.last());
                Ok(EvolutionOutcome::Rejected)
            }
        }
    }

    async fn rally_step(&mut self, target: u32, needed: u32) -> Result<EvolutionOutcome, TransportError> {
        let rounds = match self.rally {
            Some((level, rounds)) if level == target => rounds + 1,
            _ => 1,
        };
        if rounds > self.settings.rally_poll_limit.max(1) {
            self.rally = None;
            info!("Gave up gathering players for level {}", target);
            return Ok(EvolutionOutcome::NoQuorum);
        }
        self.rally = Some((target, rounds));

        let call = crate::jobs::TeamMessage::EvolutionCall {
            level: target,
            needed,
        };
        self.broadcast(&call.to_string()).await?;
        Ok(EvolutionOutcome::Rallying { needed })
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("counter", &self.counter)
            .field("tick", &self.tick)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
