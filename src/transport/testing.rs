//! In-memory `CommandLink` for exercising roles without a server.

use super::{CommandLink, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Records every command and answers from a queue, then from a fallback.
pub(crate) struct ScriptedLink {
    queued: Mutex<VecDeque<String>>,
    fallback: Responder,
    sent: Mutex<Vec<String>>,
    dead: AtomicBool,
}

impl ScriptedLink {
    /// Answers `Look` with an empty own tile, `Inventory` with ten food,
    /// `Connect_nbr` with `0`, and everything else with `ok`.
    pub fn new() -> Self {
        Self::with(|cmd| match cmd {
            "Look" => "[player]".into(),
            "Inventory" => "[food 10, linemate 0, deraumere 0, sibur 0, mendiane 0, phiras 0, thystame 0]".into(),
            "Connect_nbr" => "0".into(),
            _ => "ok".into(),
        })
    }

    pub fn with(fallback: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Box::new(fallback),
            sent: Mutex::new(Vec::new()),
            dead: AtomicBool::new(false),
        }
    }

    /// Queue replies consumed in order before the fallback applies.
    pub fn push_replies<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queued = self.queued.lock().unwrap();
        queued.extend(replies.into_iter().map(Into::into));
    }

    /// Every later command fails as if the server hung up.
    pub fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_starting_with(&self, prefix: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn next(&self, command: &str) -> String {
        let queued = self.queued.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| (self.fallback)(command))
    }

    fn record(&self, command: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(command.to_string());
        if self.dead.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }
}

#[async_trait]
impl CommandLink for ScriptedLink {
    async fn send_command(&self, command: &str) -> Result<String, TransportError> {
        self.record(command)?;
        Ok(self.next(command))
    }

    async fn send_command_until(
        &self,
        command: &str,
        max_lines: usize,
        is_terminal: for<'a> fn(&'a str) -> bool,
    ) -> Result<Vec<String>, TransportError> {
        self.record(command)?;
        let mut lines = Vec::new();
        while lines.len() < max_lines.max(1) {
            let line = self.next(command);
            let done = is_terminal(&line);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    }
}
