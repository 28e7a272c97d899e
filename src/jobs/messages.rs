//! Typed team messages carried inside encrypted broadcasts.

use crate::cipher::DecodedMessage;
use crate::jobs::{JobInfo, JobKind};
use crate::types::Resource;
use std::fmt;

/// One plaintext line of the team channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TeamMessage {
    NewcomerSeekingAssignment { level: u32 },
    NewcomerJoined,
    ElderAnnounce { elder_id: u16 },
    ElderSteppingDown,
    /// Opaque position placeholder; only broadcast direction is meaningful.
    ElderLocation { x: i64, y: i64 },
    AssignJob { player_id: u16, job: JobKind },
    EvolutionReady { level: u32 },
    /// Rally for an incantation targeting `level`, `needed` more agents wanted.
    EvolutionCall { level: u32, needed: u32 },
    EvolutionResponse { player_id: u16 },
    StatusReportRequest,
    BasicStatus { level: u32, needs: u32, food: u32 },
    ResourceRequest { resource: Resource, amount: u32 },
    ResourceAvailable { resource: Resource },
    ResourceDelivery { resource: Resource, amount: u32 },
    EnemyDetected,
    JobUpdate(JobInfo),
    /// Anything not in the vocabulary, or a known verb with bad arguments.
    Other(String),
}

impl TeamMessage {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        Self::parse_known(text).unwrap_or_else(|| Self::Other(text.to_string()))
    }

    fn parse_known(text: &str) -> Option<Self> {
        let (verb, rest) = text.split_once(' ').unwrap_or((text, ""));
        let rest = rest.trim();
        let args: Vec<&str> = rest.split_whitespace().collect();
        let arg = |i: usize| args.get(i).copied();

        let message = match verb {
            "newcomer_seeking_assignment" => Self::NewcomerSeekingAssignment {
                level: arg(0)?.parse().ok()?,
            },
            "newcomer_joined" => Self::NewcomerJoined,
            "elder_announce" => Self::ElderAnnounce {
                elder_id: arg(0)?.parse().ok()?,
            },
            "elder_stepping_down" => Self::ElderSteppingDown,
            "elder_location" => Self::ElderLocation {
                x: arg(0)?.parse().ok()?,
                y: arg(1)?.parse().ok()?,
            },
            "assign_job" => Self::AssignJob {
                player_id: arg(0)?.parse().ok()?,
                job: arg(1)?.parse().ok()?,
            },
            "evolution_ready" => Self::EvolutionReady {
                level: arg(0)?.parse().ok()?,
            },
            "evolution_call" => Self::EvolutionCall {
                level: arg(0)?.parse().ok()?,
                needed: arg(1)?.parse().ok()?,
            },
            "evolution_response" => Self::EvolutionResponse {
                player_id: arg(0)?.parse().ok()?,
            },
            "status_report_request" => Self::StatusReportRequest,
            "basic_status" => {
                let field = |name: &str| -> Option<u32> {
                    args.iter()
                        .find_map(|a| a.strip_prefix(name)?.strip_prefix(':'))?
                        .parse()
                        .ok()
                };
                Self::BasicStatus {
                    level: field("level")?,
                    needs: field("needs")?,
                    food: field("food")?,
                }
            }
            "resource_request" => Self::ResourceRequest {
                resource: arg(0)?.parse().ok()?,
                amount: arg(1)?.parse().ok()?,
            },
            "resource_available" => Self::ResourceAvailable {
                resource: arg(0)?.parse().ok()?,
            },
            "resource_delivery" => Self::ResourceDelivery {
                resource: arg(0)?.parse().ok()?,
                amount: arg(1)?.parse().ok()?,
            },
            "enemy_detected" => Self::EnemyDetected,
            "job_update" => Self::JobUpdate(serde_json::from_str(rest).ok()?),
            _ => return None,
        };
        Some(message)
    }
}

impl fmt::Display for TeamMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewcomerSeekingAssignment { level } => {
                write!(f, "newcomer_seeking_assignment {}", level)
            }
            Self::NewcomerJoined => write!(f, "newcomer_joined"),
            Self::ElderAnnounce { elder_id } => write!(f, "elder_announce {}", elder_id),
            Self::ElderSteppingDown => write!(f, "elder_stepping_down"),
            Self::ElderLocation { x, y } => write!(f, "elder_location {} {}", x, y),
            Self::AssignJob { player_id, job } => write!(f, "assign_job {} {}", player_id, job),
            Self::EvolutionReady { level } => write!(f, "evolution_ready {}", level),
            Self::EvolutionCall { level, needed } => {
                write!(f, "evolution_call {} {}", level, needed)
            }
            Self::EvolutionResponse { player_id } => {
                write!(f, "evolution_response {}", player_id)
            }
            Self::StatusReportRequest => write!(f, "status_report_request"),
            Self::BasicStatus { level, needs, food } => {
                write!(f, "basic_status level:{} needs:{} food:{}", level, needs, food)
            }
            Self::ResourceRequest { resource, amount } => {
                write!(f, "resource_request {} {}", resource, amount)
            }
            Self::ResourceAvailable { resource } => write!(f, "resource_available {}", resource),
            Self::ResourceDelivery { resource, amount } => {
                write!(f, "resource_delivery {} {}", resource, amount)
            }
            Self::EnemyDetected => write!(f, "enemy_detected"),
            Self::JobUpdate(info) => {
                let json = serde_json::to_string(info).map_err(|_| fmt::Error)?;
                write!(f, "job_update {}", json)
            }
            Self::Other(text) => f.write_str(text),
        }
    }
}

/// A decoded teammate broadcast, ready for the roles.
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    /// Where the sound came from; 0 means the sender shares our tile.
    pub direction: u8,
    pub sender_id: u16,
    pub counter: u8,
    pub timestamp: u32,
    pub message: TeamMessage,
}

impl Incoming {
    pub fn new(direction: u8, decoded: DecodedMessage) -> Self {
        Self {
            direction,
            sender_id: decoded.sender_id,
            counter: decoded.counter,
            timestamp: decoded.timestamp,
            message: TeamMessage::parse(&decoded.content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_text_parses_back_to_the_same_message() {
        let messages = [
            TeamMessage::NewcomerSeekingAssignment { level: 2 },
            TeamMessage::ElderAnnounce { elder_id: 513 },
            TeamMessage::ElderLocation { x: 0, y: -3 },
            TeamMessage::AssignJob {
                player_id: 9,
                job: JobKind::Collector,
            },
            TeamMessage::EvolutionCall { level: 4, needed: 1 },
            TeamMessage::BasicStatus {
                level: 3,
                needs: 2,
                food: 11,
            },
            TeamMessage::ResourceDelivery {
                resource: Resource::Phiras,
                amount: 4,
            },
            TeamMessage::JobUpdate(JobInfo::new(JobKind::Garbler, 5, 300)),
        ];
        for message in messages {
            assert_eq!(TeamMessage::parse(&message.to_string()), message);
        }
    }

    #[test]
    fn bad_arguments_fall_back_to_other() {
        assert_eq!(
            TeamMessage::parse("assign_job 9 wizard"),
            TeamMessage::Other("assign_job 9 wizard".into())
        );
        assert_eq!(
            TeamMessage::parse("elder_announce"),
            TeamMessage::Other("elder_announce".into())
        );
        assert_eq!(
            TeamMessage::parse("resource_request gold 1"),
            TeamMessage::Other("resource_request gold 1".into())
        );
        assert_eq!(
            TeamMessage::parse("Evolving to level 3"),
            TeamMessage::Other("Evolving to level 3".into())
        );
    }

    #[test]
    fn job_update_carries_role_details() {
        let parsed = TeamMessage::parse(
            r#"job_update {"job":"collector","level":2,"player_id":14,"carrying_load":3}"#,
        );
        let TeamMessage::JobUpdate(info) = parsed else {
            panic!("expected a job update, got {:?}", parsed);
        };
        assert_eq!(info.job, JobKind::Collector);
        assert_eq!(info.player_id, 14);
        assert_eq!(info.details["carrying_load"], 3);
    }
}
