//! Agent controller: the tick loop.
//!
//! Every tick the agent:
//! 1. Drains queued server events (team broadcasts, elevation notices)
//! 2. Refreshes its inventory
//! 3. Runs one step of the active role
//! 4. Drains events again and lets the role hand over if it wants to
//! 5. Reaps finished child processes
//!
//! The transport's event sink only enqueues, so role callbacks always run
//! here, between commands, with the send gate free.

use crate::agent::player::{Player, PlayerSettings};
use crate::cipher;
use crate::config::AgentConfig;
use crate::elevation::ElevationTable;
use crate::jobs::{Incoming, JobKind, JobManager};
use crate::replication::Replicator;
use crate::transport::{EventSink, ServerEvent, Transport, TransportError};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The server closed the session or reported our death.
    Died,
    /// Interrupted from outside.
    Cancelled,
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Died => write!(f, "died"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

pub struct Agent {
    player: Player,
    manager: JobManager,
    inbox: mpsc::UnboundedReceiver<ServerEvent>,
    relay_probability: f64,
}

impl Agent {
    /// Start the initial role and announce it to the team.
    pub async fn new(
        mut player: Player,
        inbox: mpsc::UnboundedReceiver<ServerEvent>,
        initial: JobKind,
        relay_probability: f64,
    ) -> Result<Self, TransportError> {
        let manager = JobManager::start(&mut player, initial).await?;
        Ok(Self {
            player,
            manager,
            inbox,
            relay_probability,
        })
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn current_job(&self) -> JobKind {
        self.manager.current()
    }

    pub async fn tick(&mut self) -> Result<(), TransportError> {
        self.player.tick += 1;

        self.drain_events().await?;
        if !self.player.refresh_inventory().await? {
            warn!("Inventory refresh failed; keeping last known counts");
        }

        self.manager.execute_current_job(&mut self.player).await?;
        self.drain_events().await?;
        self.manager.check_transitions(&mut self.player).await?;

        self.player.reap_children();
        Ok(())
    }

    /// Handle every event queued so far. Returns how many were handled.
    pub async fn drain_events(&mut self) -> Result<usize, TransportError> {
        let mut handled = 0;
        while let Ok(event) = self.inbox.try_recv() {
            handled += 1;
            match event {
                ServerEvent::Broadcast { direction, content } => {
                    self.dispatch_broadcast(direction, &content).await?;
                }
                ServerEvent::ElevationUnderway => {
                    debug!("Taking part in a teammate's incantation");
                }
                ServerEvent::LevelReached(level) => {
                    if self.player.state.raise_level(level) {
                        info!("Player {} reached level {}", self.player.id(), level);
                    }
                }
            }
        }
        Ok(handled)
    }

    async fn dispatch_broadcast(&mut self, direction: u8, content: &str) -> Result<(), TransportError> {
        match cipher::decode(content, self.player.secret()) {
            Ok(decoded) => {
                let incoming = Incoming::new(direction, decoded);
                debug!(
                    "Team message from {} (dir {}): {}",
                    incoming.sender_id, direction, incoming.message
                );
                self.manager.handle_message(&mut self.player, &incoming).await
            }
            Err(e) => {
                debug!("Foreign broadcast from dir {} ({}): {}", direction, e, content);
                self.manager
                    .handle_unknown(&mut self.player, direction, content)
                    .await?;
                if self.relay_probability > 0.0 && self.player.rng.gen_bool(self.relay_probability) {
                    self.player.broadcast_raw(content).await?;
                }
                Ok(())
            }
        }
    }

    /// Tick until the server ends the session or `cancel` fires.
    pub async fn run(&mut self, tick_interval: Duration, cancel: &CancellationToken) -> Shutdown {
        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => return Shutdown::Cancelled,
                result = self.tick() => result,
            };
            if let Err(e) = step {
                info!(
                    "Player {} is gone ({}) at level {} after {} ticks",
                    self.player.id(),
                    e,
                    self.player.state.level,
                    self.player.tick
                );
                return Shutdown::Died;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Shutdown::Cancelled,
                _ = tokio::time::sleep(tick_interval) => {}
            }
        }
    }
}

/// Connect, join the team and run the agent until it dies or is cancelled.
pub async fn run_agent_loop(config: AgentConfig, cancel: CancellationToken) -> Result<Shutdown> {
    let elevation = match config.resolved_elevation_table() {
        Some(path) => ElevationTable::load(&path)
            .with_context(|| format!("Failed to load elevation table {}", path.display()))?,
        None => ElevationTable::standard(),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let sink: EventSink = Box::new(move |event| {
        let _ = events_tx.send(event);
    });

    let transport = Transport::connect_with_retry(
        &config.host,
        config.port,
        config.connect_retries,
        config.connect_delay(),
        sink,
    )
    .await
    .context("Failed to reach the game server")?
    .with_reply_timeout(config.reply_timeout());

    let session = transport
        .handshake(&config.team)
        .await
        .context("Failed to join the game")?;
    info!(
        "Session open: {} free slots on a {}x{} map",
        session.slots, session.map_width, session.map_height
    );
    let transport = Arc::new(transport);

    let team = config.team.clone();
    let secret = tokio::task::spawn_blocking(move || cipher::derive_key(&team))
        .await
        .context("Key derivation task failed")?;

    let mut rng = StdRng::from_entropy();
    let id: u16 = rng.gen();
    info!("Playing as agent {} on team '{}'", id, config.team);

    let mut player = Player::new(
        transport.clone(),
        Arc::new(secret),
        id,
        elevation,
        rng,
        PlayerSettings::from(&config),
    );
    match Replicator::from_current_process(config.max_children) {
        Ok(replicator) => player = player.with_replicator(replicator),
        Err(e) => warn!("Reproduction disabled: {:#}", e),
    }

    let shutdown = match Agent::new(player, events_rx, JobKind::Newcomer, config.relay_probability).await {
        Ok(mut agent) => agent.run(config.tick_interval(), &cancel).await,
        Err(e) => {
            info!("Connection lost before the first tick: {}", e);
            Shutdown::Died
        }
    };

    transport.close().await;
    Ok(shutdown)
}
