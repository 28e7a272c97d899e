//! Shared builders for controller and role tests.

use crate::agent::player::{Player, PlayerSettings};
use crate::cipher::{self, TeamSecret};
use crate::elevation::ElevationTable;
use crate::transport::testing::ScriptedLink;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, OnceLock};

pub(crate) const TEST_TEAM: &str = "testers";
pub(crate) const TEST_ID: u16 = 77;

pub(crate) fn test_secret() -> Arc<TeamSecret> {
    static KEY: OnceLock<Arc<TeamSecret>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(cipher::derive_key(TEST_TEAM)))
        .clone()
}

pub(crate) fn test_player(link: Arc<ScriptedLink>) -> Player {
    Player::new(
        link,
        test_secret(),
        TEST_ID,
        ElevationTable::standard(),
        StdRng::seed_from_u64(7),
        PlayerSettings::default(),
    )
}

/// Encrypt `text` as teammate `sender` would.
pub(crate) fn team_envelope(sender: u16, text: &str) -> String {
    cipher::encode(sender, 1, text.as_bytes(), &test_secret()).unwrap()
}

/// Plaintext of every encrypted broadcast the link carried, in order.
pub(crate) fn sent_team_messages(link: &ScriptedLink) -> Vec<String> {
    let secret = test_secret();
    link.sent_starting_with("Broadcast \"")
        .iter()
        .filter_map(|cmd| {
            let body = cmd.strip_prefix("Broadcast \"")?.strip_suffix('"')?;
            cipher::decode(body, &secret).ok().map(|m| m.content)
        })
        .collect()
}
