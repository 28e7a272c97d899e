//! Infiltrator that wanders off and jams other teams' channels.

use super::{pick_weighted, total_weight, Incoming, Job, JobKind, CRITICAL_FOOD_THRESHOLD};
use crate::agent::player::Player;
use crate::transport::TransportError;
use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Ticks between two mode draws.
pub const MODE_SWITCH_INTERVAL: u64 = 15;

/// Only every n-th eligible tick actually emits something.
pub const SEND_EVERY: u64 = 5;

/// Foreign broadcasts kept for replay.
pub const INTERCEPT_CAPACITY: usize = 20;

/// Replays draw from this many of the most recent intercepts.
pub const REPLAY_WINDOW: usize = 5;

/// Infiltration ticks before heading home as a Collector.
pub const MAX_INFILTRATION_TICKS: u32 = 100;

const NOISE: &[&str] = &[
    "\u{feff}", "\\x00", "\\xff", "\\x7f", "\\x1b", "\\x08", "\u{fffd}", "♠", "§", "¤", "¶", "‼",
    "¿", "¡",
];

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GarbleMode {
    /// Random garbage.
    Raven,
    /// Verbatim replay of an intercepted broadcast.
    Mimicry,
    /// Replay with every number blown up.
    Parrot,
}

impl fmt::Display for GarbleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raven => write!(f, "raven"),
            Self::Mimicry => write!(f, "mimicry"),
            Self::Parrot => write!(f, "parrot"),
        }
    }
}

pub const MODE_WEIGHTS: [(GarbleMode, u32); 3] = [
    (GarbleMode::Raven, 50),
    (GarbleMode::Mimicry, 40),
    (GarbleMode::Parrot, 10),
];

#[derive(Debug)]
pub struct Garbler {
    mode: GarbleMode,
    intercepted: VecDeque<String>,
    last_mode_switch: u64,
    messages_sent: u64,
    survival_priority: bool,
    infiltration_depth: u32,
    target_depth: u32,
    infiltration_ticks: u32,
    circle_step: u32,
}

impl Default for Garbler {
    fn default() -> Self {
        Self {
            mode: GarbleMode::Raven,
            intercepted: VecDeque::with_capacity(INTERCEPT_CAPACITY + 1),
            last_mode_switch: 0,
            messages_sent: 0,
            survival_priority: false,
            infiltration_depth: 0,
            target_depth: 15,
            infiltration_ticks: 0,
            circle_step: 0,
        }
    }
}

impl Garbler {
    pub fn new() -> Self {
        Self::default()
    }

    async fn infiltrate(&mut self, player: &mut Player) -> Result<(), TransportError> {
        self.infiltration_ticks += 1;
        if self.infiltration_depth < self.target_depth {
            player.forward().await?;
            self.infiltration_depth += 1;
            if player.rng.gen_bool(0.2) {
                if player.rng.gen_bool(0.5) {
                    player.left().await?;
                } else {
                    player.right().await?;
                }
            }
        } else if player.rng.gen_bool(0.5) {
            if self.circle_step % 8 < 4 {
                player.forward().await?;
            } else {
                player.right().await?;
            }
            self.circle_step += 1;
        } else {
            player.random_movement().await?;
        }
        Ok(())
    }

    fn switch_mode(&mut self, player: &mut Player) {
        let draw = player.rng.gen_range(1..=total_weight(&MODE_WEIGHTS));
        if let Some(mode) = pick_weighted(&MODE_WEIGHTS, draw) {
            self.mode = *mode;
        }
        self.last_mode_switch = player.tick;
        debug!("Garbler switched to mode: {}", self.mode);
    }

    async fn send_disruptive_message(&mut self, player: &mut Player) -> Result<(), TransportError> {
        let eligible = self.messages_sent % SEND_EVERY == 0;
        self.messages_sent += 1;
        if !eligible {
            return Ok(());
        }

        let text = match (self.mode, self.pick_intercept(player)) {
            (GarbleMode::Mimicry, Some(original)) => original,
            (GarbleMode::Parrot, Some(original)) => corrupt_numbers(&original),
            _ => noise(player),
        };
        player.broadcast_raw(&text).await?;
        Ok(())
    }

    fn pick_intercept(&self, player: &mut Player) -> Option<String> {
        let recent = self.intercepted.len().min(REPLAY_WINDOW);
        if recent == 0 {
            return None;
        }
        let skip = self.intercepted.len() - recent;
        let pick = player.rng.gen_range(0..recent);
        self.intercepted.get(skip + pick).cloned()
    }

    fn remember(&mut self, content: &str) {
        let content = content.trim();
        if content.is_empty() || self.intercepted.iter().any(|m| m == content) {
            return;
        }
        self.intercepted.push_back(content.to_string());
        while self.intercepted.len() > INTERCEPT_CAPACITY {
            self.intercepted.pop_front();
        }
    }
}

/// Replace every run of digits with an absurdly large number.
pub fn corrupt_numbers(message: &str) -> String {
    DIGITS
        .replace_all(message, "99999999999999999999999")
        .into_owned()
}

/// 50 to 75 glyphs of garbage, free of quotes and line breaks.
fn noise(player: &mut Player) -> String {
    let length = player.rng.gen_range(50..=75);
    let mut garbage = String::new();
    for _ in 0..length {
        if player.rng.gen_bool(0.4) {
            garbage.push_str(NOISE[player.rng.gen_range(0..NOISE.len())]);
        } else {
            let c = loop {
                let candidate = char::from(player.rng.gen_range(0x20u8..=0xFF));
                if candidate != '"' && !candidate.is_control() {
                    break candidate;
                }
            };
            garbage.push(c);
        }
    }
    garbage
}

#[async_trait]
impl Job for Garbler {
    fn kind(&self) -> JobKind {
        JobKind::Garbler
    }

    async fn execute_behavior(&mut self, player: &mut Player) -> Result<(), TransportError> {
        let food = player.state.food_stock;
        if food <= CRITICAL_FOOD_THRESHOLD {
            self.survival_priority = true;
        } else if food >= CRITICAL_FOOD_THRESHOLD * 2 {
            self.survival_priority = false;
        }

        if self.survival_priority {
            player.search_food().await?;
        } else {
            self.infiltrate(player).await?;
        }

        if player.tick.saturating_sub(self.last_mode_switch) > MODE_SWITCH_INTERVAL {
            self.switch_mode(player);
        }
        self.send_disruptive_message(player).await
    }

    fn should_transition(&mut self, player: &mut Player) -> Option<JobKind> {
        if player.state.food_stock <= CRITICAL_FOOD_THRESHOLD {
            return Some(JobKind::Basic);
        }
        if self.infiltration_ticks > MAX_INFILTRATION_TICKS {
            return Some(JobKind::Collector);
        }
        None
    }

    async fn on_message_received(
        &mut self,
        _player: &mut Player,
        _incoming: &Incoming,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn on_unknown_broadcast(
        &mut self,
        _player: &mut Player,
        _direction: u8,
        content: &str,
    ) -> Result<(), TransportError> {
        self.remember(content);
        Ok(())
    }

    async fn on_job_start(&mut self, player: &mut Player) -> Result<(), TransportError> {
        self.target_depth = player.rng.gen_range(10..=20);
        self.last_mode_switch = player.tick;
        info!("Player {} started infiltration mission", player.id());
        Ok(())
    }

    fn details(&self, _player: &Player) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("garble_mode".into(), json!(self.mode));
        details.insert("infiltration_depth".into(), json!(self.infiltration_depth));
        details.insert("messages_intercepted".into(), json!(self.intercepted.len()));
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fixtures::test_player;
    use crate::transport::testing::ScriptedLink;
    use std::sync::Arc;

    fn raw_broadcasts(link: &ScriptedLink) -> Vec<String> {
        link.sent_starting_with("Broadcast \"")
            .into_iter()
            .filter_map(|c| Some(c.strip_prefix("Broadcast \"")?.strip_suffix('"')?.to_string()))
            .collect()
    }

    #[test]
    fn parrot_inflates_every_number() {
        assert_eq!(
            corrupt_numbers("assign_job 12 collector at 3"),
            "assign_job 99999999999999999999999 collector at 99999999999999999999999"
        );
        assert_eq!(corrupt_numbers("no digits"), "no digits");
    }

    #[test]
    fn weight_table_matches_the_draw_rule() {
        assert_eq!(pick_weighted(&MODE_WEIGHTS, 91), Some(&GarbleMode::Parrot));
        assert_eq!(pick_weighted(&MODE_WEIGHTS, 90), Some(&GarbleMode::Mimicry));
    }

    #[test]
    fn intercept_ring_is_bounded_and_deduplicated() {
        let mut garbler = Garbler::new();
        garbler.remember("same");
        garbler.remember("same");
        garbler.remember("   ");
        assert_eq!(garbler.intercepted.len(), 1);
        for i in 0..30 {
            garbler.remember(&format!("msg {}", i));
        }
        assert_eq!(garbler.intercepted.len(), INTERCEPT_CAPACITY);
        assert_eq!(garbler.intercepted.back().unwrap(), "msg 29");
    }

    #[tokio::test]
    async fn only_every_fifth_tick_is_noisy() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        player.state.food_stock = 50;
        let mut garbler = Garbler::new();
        garbler.on_job_start(&mut player).await.unwrap();
        for tick in 1..=10 {
            player.tick = tick;
            garbler.execute_behavior(&mut player).await.unwrap();
        }
        let sent = raw_broadcasts(&link);
        assert_eq!(sent.len(), 2);
        for noise in sent {
            assert!(!noise.contains('"') && !noise.contains('\n'));
            assert!(noise.chars().count() >= 50);
        }
    }

    #[tokio::test]
    async fn mimicry_replays_recent_intercepts() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        player.state.food_stock = 50;
        let mut garbler = Garbler::new();
        garbler
            .on_unknown_broadcast(&mut player, 2, "enemy plan 42")
            .await
            .unwrap();

        garbler.mode = GarbleMode::Mimicry;
        garbler.send_disruptive_message(&mut player).await.unwrap();
        garbler.messages_sent = 0;
        garbler.mode = GarbleMode::Parrot;
        garbler.send_disruptive_message(&mut player).await.unwrap();

        assert_eq!(
            raw_broadcasts(&link),
            vec![
                "enemy plan 42".to_string(),
                "enemy plan 99999999999999999999999".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn survival_mode_has_hysteresis() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        let mut garbler = Garbler::new();

        player.state.food_stock = 4;
        garbler.execute_behavior(&mut player).await.unwrap();
        assert!(garbler.survival_priority);

        player.state.food_stock = 8;
        garbler.execute_behavior(&mut player).await.unwrap();
        assert!(garbler.survival_priority);

        player.state.food_stock = 10;
        garbler.execute_behavior(&mut player).await.unwrap();
        assert!(!garbler.survival_priority);
    }

    #[tokio::test]
    async fn heads_home_after_a_long_mission() {
        let link = Arc::new(ScriptedLink::new());
        let mut player = test_player(link.clone());
        player.state.food_stock = 50;
        let mut garbler = Garbler::new();
        garbler.on_job_start(&mut player).await.unwrap();
        for tick in 1..=u64::from(MAX_INFILTRATION_TICKS) {
            player.tick = tick;
            garbler.execute_behavior(&mut player).await.unwrap();
            assert_eq!(garbler.should_transition(&mut player), None);
        }
        player.tick += 1;
        garbler.execute_behavior(&mut player).await.unwrap();
        assert_eq!(garbler.should_transition(&mut player), Some(JobKind::Collector));

        player.state.food_stock = 5;
        assert_eq!(garbler.should_transition(&mut player), Some(JobKind::Basic));
    }
}
