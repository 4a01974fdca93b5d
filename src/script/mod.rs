//! Trigger scripts and their resumable runs.
//!
//! A script is a list of steps parsed once when content loads. Immediate
//! scripts only run console commands. Suspendable scripts may also wait:
//!
//! - `wait <seconds>`: resume once the session clock passes the deadline
//! - `yield`: resume on the next tick
//! - `waituntil exist <tile>` / `waituntil notexist <tile>`: poll every tick
//!
//! Any other line is a console command.

use std::sync::Arc;

use tracing::debug;

use crate::console::ConsoleCommand;
use crate::error::LevelError;
use crate::tile::{ChunkId, TileId};

/// Condition polled by `waituntil`
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    TileExists(String),
    TileMissing(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Run(ConsoleCommand),
    Wait(f32),
    NextTick,
    WaitUntil(Condition),
}

impl ScriptStep {
    pub fn suspends(&self) -> bool {
        !matches!(self, ScriptStep::Run(_))
    }

    fn parse(line: &str) -> Result<Self, LevelError> {
        let mut words = line.split_whitespace();
        match words.next().map(str::to_ascii_lowercase).as_deref() {
            Some("yield") => Ok(ScriptStep::NextTick),
            Some("wait") => {
                let secs = words
                    .next()
                    .and_then(|w| w.parse::<f32>().ok())
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .ok_or_else(|| LevelError::InvalidWait(line.to_string()))?;
                Ok(ScriptStep::Wait(secs))
            }
            Some("waituntil") => {
                let mode = words.next().map(str::to_ascii_lowercase);
                let name = words.collect::<Vec<_>>().join(" ");
                match (mode.as_deref(), name.is_empty()) {
                    (Some("exist"), false) => Ok(ScriptStep::WaitUntil(Condition::TileExists(name))),
                    (Some("notexist"), false) => {
                        Ok(ScriptStep::WaitUntil(Condition::TileMissing(name)))
                    }
                    _ => Err(LevelError::Script {
                        line: line.to_string(),
                        source: crate::console::ConsoleError::MissingArgument {
                            command: "waituntil",
                            argument: "'exist <tile>' or 'notexist <tile>'",
                        },
                    }),
                }
            }
            _ => line
                .parse::<ConsoleCommand>()
                .map(ScriptStep::Run)
                .map_err(|source| LevelError::Script {
                    line: line.to_string(),
                    source,
                }),
        }
    }
}

/// Parsed handler attached to a trigger
#[derive(Debug, Clone)]
pub enum TriggerScript {
    /// Runs to completion inside the activation
    Immediate(Arc<[ScriptStep]>),
    /// Runs as a cooperative sequence pumped by the session
    Sequence(Arc<[ScriptStep]>),
}

impl TriggerScript {
    /// Parse newline or `;` separated lines. Blank lines and `--` comments
    /// are skipped.
    pub fn parse(source: &str, suspendable: bool) -> Result<Self, LevelError> {
        let mut steps = Vec::new();
        for line in source.split(['\n', ';']) {
            let line = line.trim();
            if line.is_empty() || line.starts_with("--") {
                continue;
            }
            let step = ScriptStep::parse(line)?;
            if step.suspends() && !suspendable {
                return Err(LevelError::SuspendInImmediateScript(line.to_string()));
            }
            steps.push(step);
        }
        let steps: Arc<[ScriptStep]> = steps.into();
        Ok(if suspendable {
            TriggerScript::Sequence(steps)
        } else {
            TriggerScript::Immediate(steps)
        })
    }

    pub fn is_suspendable(&self) -> bool {
        matches!(self, TriggerScript::Sequence(_))
    }

    pub fn steps(&self) -> &[ScriptStep] {
        match self {
            TriggerScript::Immediate(steps) | TriggerScript::Sequence(steps) => steps,
        }
    }
}

/// Trigger a run belongs to, released when the run ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOwner {
    Tile { tile: TileId, index: usize },
    ChunkSpawn(ChunkId),
}

/// When a suspended run wants to continue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Wake {
    Now,
    NextTick,
    At(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Suspended,
    Finished,
}

/// What a run needs from the session while it executes
pub trait ScriptHost {
    fn run_command(&mut self, command: &ConsoleCommand);
    fn tile_exists(&self, name: &str) -> bool;
}

/// A script in progress
#[derive(Debug, Clone)]
pub struct ScriptRun {
    pub owner: TriggerOwner,
    steps: Arc<[ScriptStep]>,
    cursor: usize,
    wake: Wake,
}

impl ScriptRun {
    pub fn new(owner: TriggerOwner, script: &TriggerScript) -> Self {
        let steps = match script {
            TriggerScript::Immediate(steps) | TriggerScript::Sequence(steps) => Arc::clone(steps),
        };
        Self {
            owner,
            steps,
            cursor: 0,
            wake: Wake::Now,
        }
    }

    pub fn wake(&self) -> Wake {
        self.wake
    }

    pub fn is_due(&self, now: f64) -> bool {
        match self.wake {
            Wake::Now | Wake::NextTick => true,
            Wake::At(deadline) => now >= deadline,
        }
    }

    /// Execute steps until the script suspends or ends
    pub fn advance(&mut self, now: f64, host: &mut impl ScriptHost) -> RunStatus {
        if !self.is_due(now) {
            return RunStatus::Suspended;
        }

        while let Some(step) = self.steps.get(self.cursor) {
            match step {
                ScriptStep::Run(command) => {
                    host.run_command(command);
                    self.cursor += 1;
                }
                ScriptStep::Wait(secs) => {
                    self.cursor += 1;
                    self.wake = Wake::At(now + f64::from(*secs));
                    return RunStatus::Suspended;
                }
                ScriptStep::NextTick => {
                    self.cursor += 1;
                    self.wake = Wake::NextTick;
                    return RunStatus::Suspended;
                }
                ScriptStep::WaitUntil(condition) => {
                    let satisfied = match condition {
                        Condition::TileExists(name) => host.tile_exists(name),
                        Condition::TileMissing(name) => !host.tile_exists(name),
                    };
                    if !satisfied {
                        self.wake = Wake::NextTick;
                        return RunStatus::Suspended;
                    }
                    self.cursor += 1;
                }
            }
        }

        debug!(owner = ?self.owner, "script run finished");
        RunStatus::Finished
    }
}

/// Suspended runs waiting for the per-tick pump
#[derive(Debug, Default)]
pub struct ScriptScheduler {
    runs: Vec<ScriptRun>,
}

impl ScriptScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, run: ScriptRun) {
        self.runs.push(run);
    }

    /// Take every pending run; runs pushed while they execute land in the
    /// emptied scheduler and are merged back by `restore`
    pub fn take(&mut self) -> Vec<ScriptRun> {
        std::mem::take(&mut self.runs)
    }

    pub fn restore(&mut self, mut survivors: Vec<ScriptRun>) {
        survivors.append(&mut self.runs);
        self.runs = survivors;
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn is_running(&self, owner: TriggerOwner) -> bool {
        self.runs.iter().any(|r| r.owner == owner)
    }

    /// Drop every run that belongs to a removed tile or chunk
    pub fn cancel_where(&mut self, mut dead: impl FnMut(&TriggerOwner) -> bool) -> usize {
        let before = self.runs.len();
        self.runs.retain(|r| !dead(&r.owner));
        before - self.runs.len()
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }
}
