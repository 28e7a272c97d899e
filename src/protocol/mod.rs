//! Command vocabulary and reply parsers for the game's line protocol.

use crate::types::{Inventory, Resource};
use std::fmt;
use thiserror::Error;

/// Generic acceptance reply.
pub const OK: &str = "ok";

/// Generic rejection reply.
pub const KO: &str = "ko";

/// First reply line of an accepted incantation.
pub const ELEVATION_UNDERWAY: &str = "Elevation underway";

/// Line the server sends when the agent starves.
pub const DEAD: &str = "dead";

/// Greeting that opens every session.
pub const WELCOME: &str = "WELCOME";

const LEVEL_PREFIX: &str = "Current level:";

/// Largest broadcast direction: 1..=8 around the agent, 0 on its own tile.
pub const MAX_DIRECTION: u32 = 8;

/// Why a line could not be read as a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    #[error("not a broadcast line")]
    NotABroadcast,

    #[error("direction {0:?} is not a number")]
    BadDirection(String),

    #[error("direction {0} is outside 0..=8")]
    DirectionOutOfRange(u32),
}

/// One command of the player protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Forward,
    Left,
    Right,
    Look,
    Inventory,
    Broadcast(String),
    ConnectNbr,
    Fork,
    Eject,
    Incantation,
    Take(Resource),
    Set(Resource),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "Forward"),
            Self::Left => write!(f, "Left"),
            Self::Right => write!(f, "Right"),
            Self::Look => write!(f, "Look"),
            Self::Inventory => write!(f, "Inventory"),
            Self::Broadcast(text) => write!(f, "Broadcast \"{}\"", text),
            Self::ConnectNbr => write!(f, "Connect_nbr"),
            Self::Fork => write!(f, "Fork"),
            Self::Eject => write!(f, "Eject"),
            Self::Incantation => write!(f, "Incantation"),
            Self::Take(r) => write!(f, "Take {}", r),
            Self::Set(r) => write!(f, "Set {}", r),
        }
    }
}

pub fn is_ok(reply: &str) -> bool {
    reply.trim() == OK
}

pub fn is_ko(reply: &str) -> bool {
    reply.trim() == KO
}

/// Items visible on one tile, space-separated on the wire.
pub type Tile = Vec<String>;

/// Parse a `Look` reply. Tile 0 is the agent's own tile.
pub fn parse_look(reply: &str) -> Vec<Tile> {
    let body = reply.trim().trim_start_matches('[').trim_end_matches(']');
    body.split(',')
        .map(|tile| tile.split_whitespace().map(str::to_string).collect())
        .collect()
}

/// Parse an `Inventory` reply; unknown or malformed entries are skipped.
pub fn parse_inventory(reply: &str) -> Option<Inventory> {
    let body = reply.trim();
    if !body.starts_with('[') || !body.ends_with(']') {
        return None;
    }
    let body = &body[1..body.len() - 1];
    let mut inventory = Inventory::new();
    for entry in body.split(',') {
        let mut parts = entry.split_whitespace();
        let (Some(name), Some(count)) = (parts.next(), parts.next()) else {
            continue;
        };
        if let (Ok(resource), Ok(count)) = (name.parse::<Resource>(), count.parse::<u32>()) {
            inventory.set(resource, count);
        }
    }
    Some(inventory)
}

/// Parse `Current level: k`.
pub fn parse_level(line: &str) -> Option<u32> {
    line.trim()
        .strip_prefix(LEVEL_PREFIX)
        .and_then(|rest| rest.trim().parse().ok())
}

/// Number of `player` tokens on a tile, the agent itself included.
pub fn players_on(tile: &[String]) -> u32 {
    tile.iter().filter(|item| *item == "player").count() as u32
}

/// Parse a `message <direction>, <content>` line.
///
/// Surrounding quotes on the content are stripped.
pub fn parse_broadcast(line: &str) -> Result<(u8, String), BroadcastError> {
    let (direction, content) = line
        .strip_prefix("message ")
        .and_then(|rest| rest.split_once(','))
        .ok_or(BroadcastError::NotABroadcast)?;

    let direction = direction.trim();
    let direction = direction
        .parse::<u32>()
        .map_err(|_| BroadcastError::BadDirection(direction.to_string()))?;
    let direction = u8::try_from(direction)
        .ok()
        .filter(|d| u32::from(*d) <= MAX_DIRECTION)
        .ok_or(BroadcastError::DirectionOutOfRange(direction))?;

    let content = content.strip_prefix(' ').unwrap_or(content);
    let content = if content.len() >= 2 && content.starts_with('"') && content.ends_with('"') {
        &content[1..content.len() - 1]
    } else {
        content
    };
    Ok((direction, content.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_render_wire_text() {
        assert_eq!(Command::ConnectNbr.to_string(), "Connect_nbr");
        assert_eq!(Command::Take(Resource::Food).to_string(), "Take food");
        assert_eq!(Command::Set(Resource::Phiras).to_string(), "Set phiras");
        assert_eq!(
            Command::Broadcast("AIOU".into()).to_string(),
            "Broadcast \"AIOU\""
        );
    }

    #[test]
    fn look_reply_keeps_empty_tiles() {
        let tiles = parse_look("[player food,,deraumere]");
        assert_eq!(
            tiles,
            vec![
                vec!["player".to_string(), "food".to_string()],
                vec![],
                vec!["deraumere".to_string()],
            ]
        );
    }

    #[test]
    fn look_reply_tolerates_padding() {
        let tiles = parse_look("[ player , food food ]\n");
        assert_eq!(tiles.len(), 2);
        assert_eq!(players_on(&tiles[0]), 1);
        assert_eq!(tiles[1], vec!["food", "food"]);
    }

    #[test]
    fn inventory_reply_parses_counts() {
        let inv = parse_inventory(
            "[food 10, linemate 1, deraumere 0, sibur 2, mendiane 0, phiras 0, thystame 3]",
        )
        .unwrap();
        assert_eq!(inv.get(Resource::Food), 10);
        assert_eq!(inv.get(Resource::Sibur), 2);
        assert_eq!(inv.get(Resource::Thystame), 3);
        assert!(parse_inventory("ko").is_none());
    }

    #[test]
    fn level_line_parses() {
        assert_eq!(parse_level("Current level: 3"), Some(3));
        assert_eq!(parse_level("Current level: x"), None);
        assert_eq!(parse_level("ko"), None);
    }

    #[test]
    fn broadcast_lines_parse_and_strip_quotes() {
        assert_eq!(
            parse_broadcast("message 3, \"hello there\""),
            Ok((3, "hello there".to_string()))
        );
        assert_eq!(parse_broadcast("message 0, raw"), Ok((0, "raw".to_string())));
        assert_eq!(parse_broadcast("message 8, edge"), Ok((8, "edge".to_string())));
        assert_eq!(
            parse_broadcast("message -1, nope"),
            Err(BroadcastError::BadDirection("-1".into()))
        );
        assert_eq!(
            parse_broadcast("message x, nope"),
            Err(BroadcastError::BadDirection("x".into()))
        );
        assert_eq!(parse_broadcast("ok"), Err(BroadcastError::NotABroadcast));
        assert_eq!(parse_broadcast("message 3"), Err(BroadcastError::NotABroadcast));
    }

    #[test]
    fn broadcast_direction_beyond_the_compass_is_out_of_range() {
        assert_eq!(
            parse_broadcast("message 9, hi"),
            Err(BroadcastError::DirectionOutOfRange(9))
        );
        assert_eq!(
            parse_broadcast("message 300, hi"),
            Err(BroadcastError::DirectionOutOfRange(300))
        );
    }
}
