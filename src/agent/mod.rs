pub mod loop_;
pub mod player;
pub mod state;

#[cfg(test)]
pub(crate) mod fixtures;

pub use loop_::{run_agent_loop, Agent, Shutdown};
pub use player::{EvolutionOutcome, Player, PlayerSettings};
pub use state::AgentState;
