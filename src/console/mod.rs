//! Console command surface exposed to scripts and the host.
//!
//! Commands are parsed here and executed by `GameSession::execute`, which
//! owns everything they touch.

use std::fmt;
use std::str::FromStr;

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Destroy a tile by name
    TileDestroy(String),
    /// Query whether a tile with this name exists
    TileExist(String),
    /// Replace the remaining chunk queue of the active segment
    LevChunkSeq(Vec<String>),
    /// Jump the scheduler to a segment index
    SetSegCfg(i64),
    /// Read (`None`) or write the game speed multiplier
    Speed(Option<f32>),
    /// Log a message at info level
    Print(String),
}

/// Result of a successfully executed command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleOutput {
    Done,
    Bool(bool),
    Speed(f32),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("'{command}' expects {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("'{command}': '{value}' is not a valid number")]
    InvalidNumber { command: &'static str, value: String },
    #[error("no tile named '{0}'")]
    TileNotFound(String),
    #[error("tile '{0}' is under the walker and cannot be destroyed")]
    TileOccupied(String),
    #[error("speed must be finite and non-negative, got {0}")]
    InvalidSpeed(f32),
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "" => Err(ConsoleError::Empty),
            "tiledestroy" => Ok(ConsoleCommand::TileDestroy(single_name("tiledestroy", rest)?)),
            "tileexist" => Ok(ConsoleCommand::TileExist(single_name("tileexist", rest)?)),
            "levchunkseq" => {
                let names: Vec<String> = rest
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if names.is_empty() {
                    return Err(ConsoleError::MissingArgument {
                        command: "levchunkseq",
                        argument: "at least one chunk name",
                    });
                }
                Ok(ConsoleCommand::LevChunkSeq(names))
            }
            "setsegcfg" => {
                if rest.is_empty() {
                    return Err(ConsoleError::MissingArgument {
                        command: "setsegcfg",
                        argument: "a segment index",
                    });
                }
                rest.parse::<i64>()
                    .map(ConsoleCommand::SetSegCfg)
                    .map_err(|_| ConsoleError::InvalidNumber {
                        command: "setsegcfg",
                        value: rest.to_string(),
                    })
            }
            "speed" => {
                if rest.is_empty() {
                    return Ok(ConsoleCommand::Speed(None));
                }
                let value = rest.parse::<f32>().map_err(|_| ConsoleError::InvalidNumber {
                    command: "speed",
                    value: rest.to_string(),
                })?;
                if !value.is_finite() || value < 0.0 {
                    return Err(ConsoleError::InvalidSpeed(value));
                }
                Ok(ConsoleCommand::Speed(Some(value)))
            }
            "print" => Ok(ConsoleCommand::Print(rest.to_string())),
            other => Err(ConsoleError::UnknownCommand(other.to_string())),
        }
    }
}

fn single_name(command: &'static str, rest: &str) -> Result<String, ConsoleError> {
    if rest.is_empty() {
        return Err(ConsoleError::MissingArgument {
            command,
            argument: "a tile name",
        });
    }
    Ok(rest.to_string())
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleCommand::TileDestroy(name) => write!(f, "tiledestroy {name}"),
            ConsoleCommand::TileExist(name) => write!(f, "tileexist {name}"),
            ConsoleCommand::LevChunkSeq(names) => write!(f, "levchunkseq {}", names.join(" ")),
            ConsoleCommand::SetSegCfg(index) => write!(f, "setsegcfg {index}"),
            ConsoleCommand::Speed(None) => write!(f, "speed"),
            ConsoleCommand::Speed(Some(v)) => write!(f, "speed {v}"),
            ConsoleCommand::Print(msg) => write!(f, "print {msg}"),
        }
    }
}
