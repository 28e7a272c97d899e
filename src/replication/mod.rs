//! Reproduction: start sibling agents as independent processes.
//!
//! A child shares nothing with its parent beyond its command line. The parent
//! keeps the process handle only to reap it.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Replicator {
    program: PathBuf,
    args: Vec<String>,
    max_children: usize,
    children: Vec<Child>,
}

impl Replicator {
    pub fn new(program: PathBuf, args: Vec<String>, max_children: u32) -> Self {
        Self {
            program,
            args,
            max_children: max_children as usize,
            children: Vec::new(),
        }
    }

    /// Re-run this very binary with the arguments it was started with.
    pub fn from_current_process(max_children: u32) -> Result<Self> {
        let program = std::env::current_exe().context("Failed to locate own executable")?;
        let args = std::env::args().skip(1).collect();
        Ok(Self::new(program, args, max_children))
    }

    pub fn active(&self) -> usize {
        self.children.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.children.len() < self.max_children
    }

    /// Launch one child and return its pid.
    pub fn spawn(&mut self) -> Result<u32> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;
        let pid = child.id().unwrap_or(0);
        self.children.push(child);
        debug!("Child {} started ({} active)", pid, self.children.len());
        Ok(pid)
    }

    /// Drop handles of children that have exited. Returns how many were reaped.
    pub fn reap(&mut self) -> usize {
        let before = self.children.len();
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!("Child agent exited: {}", status);
                false
            }
            Err(e) => {
                warn!("Lost track of child agent: {}", e);
                false
            }
        });
        before - self.children.len()
    }
}
