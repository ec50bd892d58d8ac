//! Line-oriented command scripts driving an `RBTree<i64>`.
//!
//! One command per line, `#` starts a comment:
//!
//! ```text
//! insert 10 20 30
//! erase 20
//! find 10
//! min | max | len | check | clear
//! dump [limit]
//! ```

use std::fmt;
use std::io::{self, Write};

use log::{debug, info};
use rbt_config::TreeSettings;
use rbt_core::{Color, Handle, InvariantViolation, RBError, RBTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Insert(Vec<i64>),
    Erase(Vec<i64>),
    Find(i64),
    Min,
    Max,
    Dump(Option<usize>),
    Check,
    Len,
    Clear,
}

impl Command {
    /// Parse one script line. Blank and comment-only lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.split_once('#').map_or(line, |(code, _)| code);
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match name {
            "insert" | "erase" => {
                if args.is_empty() {
                    return Err(format!("'{}' needs at least one key", name));
                }
                let keys = args.iter().map(|a| parse_key(a)).collect::<Result<Vec<_>, _>>()?;
                if name == "insert" {
                    Command::Insert(keys)
                } else {
                    Command::Erase(keys)
                }
            }
            "find" => match args.as_slice() {
                [key] => Command::Find(parse_key(key)?),
                _ => return Err("'find' takes exactly one key".to_string()),
            },
            "dump" => match args.as_slice() {
                [] => Command::Dump(None),
                [limit] => Command::Dump(Some(
                    limit
                        .parse::<usize>()
                        .map_err(|_| format!("invalid limit '{}'", limit))?,
                )),
                _ => return Err("'dump' takes at most one limit".to_string()),
            },
            "min" | "max" | "check" | "len" | "clear" => {
                if !args.is_empty() {
                    return Err(format!("'{}' takes no arguments", name));
                }
                match name {
                    "min" => Command::Min,
                    "max" => Command::Max,
                    "check" => Command::Check,
                    "len" => Command::Len,
                    _ => Command::Clear,
                }
            }
            other => return Err(format!("unknown command '{}'", other)),
        };

        Ok(Some(command))
    }
}

fn parse_key(word: &str) -> Result<i64, String> {
    word.parse::<i64>()
        .map_err(|_| format!("invalid key '{}'", word))
}

/// Errors that abort a script
#[derive(Debug)]
pub enum ScriptError {
    /// Writing output failed
    Io(io::Error),
    /// A line could not be parsed
    Parse { line: usize, message: String },
    /// The tree rejected an operation
    Tree { line: usize, source: RBError },
    /// A step-by-step validation found a broken invariant
    Invariant {
        line: usize,
        source: InvariantViolation,
    },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Io(e) => write!(f, "I/O error: {}", e),
            ScriptError::Parse { line, message } => write!(f, "line {}: {}", line, message),
            ScriptError::Tree { line, source } => write!(f, "line {}: {}", line, source),
            ScriptError::Invariant { line, source } => {
                write!(f, "line {}: invariant violated: {}", line, source)
            }
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::Io(e) => Some(e),
            ScriptError::Tree { source, .. } => Some(source),
            ScriptError::Invariant { source, .. } => Some(source),
            ScriptError::Parse { .. } => None,
        }
    }
}

impl From<io::Error> for ScriptError {
    fn from(err: io::Error) -> Self {
        ScriptError::Io(err)
    }
}

/// A tree plus the settings that drive it
pub struct Session {
    tree: RBTree<i64>,
    settings: TreeSettings,
}

impl Session {
    pub fn new(settings: TreeSettings) -> Result<Self, RBError> {
        let tree = RBTree::with_capacity(settings.initial_capacity as usize)?;
        Ok(Self { tree, settings })
    }

    /// Runs every line of `script`, writing command output to `out`.
    /// Returns the number of commands executed.
    pub fn run<W: Write>(&mut self, script: &str, out: &mut W) -> Result<usize, ScriptError> {
        let mut executed = 0;

        for (idx, raw) in script.lines().enumerate() {
            let line = idx + 1;
            let command =
                Command::parse(raw).map_err(|message| ScriptError::Parse { line, message })?;
            let Some(command) = command else { continue };
            self.execute(line, &command, out)?;
            executed += 1;
        }

        info!(
            "executed {} commands, {} keys remain",
            executed,
            self.tree.len()
        );
        Ok(executed)
    }

    pub fn execute<W: Write>(
        &mut self,
        line: usize,
        command: &Command,
        out: &mut W,
    ) -> Result<(), ScriptError> {
        debug!("line {}: {:?}", line, command);

        match command {
            Command::Insert(keys) => {
                for &key in keys {
                    self.tree
                        .insert(key)
                        .map_err(|source| ScriptError::Tree { line, source })?;
                    self.check_step(line)?;
                }
            }
            Command::Erase(keys) => {
                for &key in keys {
                    let Some(handle) = self.tree.find(&key) else {
                        writeln!(out, "absent {}", key)?;
                        continue;
                    };
                    self.tree
                        .erase(handle)
                        .map_err(|source| ScriptError::Tree { line, source })?;
                    self.check_step(line)?;
                }
            }
            Command::Find(key) => match self.tree.find(key) {
                Some(handle) => {
                    let color = match self.tree.color(handle) {
                        Some(Color::Red) => "red",
                        _ => "black",
                    };
                    writeln!(out, "found {} ({})", key, color)?;
                }
                None => writeln!(out, "absent {}", key)?,
            },
            Command::Min => self.print_key(self.tree.min(), out)?,
            Command::Max => self.print_key(self.tree.max(), out)?,
            Command::Dump(limit) => {
                let limit = limit.unwrap_or(self.settings.dump_limit as usize);
                let keys = self.tree.to_sorted_vec(limit);
                if keys.is_empty() {
                    writeln!(out, "empty")?;
                } else {
                    let rendered: Vec<String> = keys.iter().map(i64::to_string).collect();
                    writeln!(out, "{}", rendered.join(" "))?;
                }
            }
            Command::Check => match self.tree.validate() {
                Ok(()) => writeln!(out, "ok")?,
                Err(violation) => writeln!(out, "violation: {}", violation)?,
            },
            Command::Len => writeln!(out, "{}", self.tree.len())?,
            Command::Clear => {
                let released = self.tree.clear();
                writeln!(out, "cleared {}", released)?;
            }
        }

        Ok(())
    }

    fn print_key<W: Write>(&self, handle: Option<Handle>, out: &mut W) -> io::Result<()> {
        match handle.and_then(|h| self.tree.key(h)) {
            Some(key) => writeln!(out, "{}", key),
            None => writeln!(out, "empty"),
        }
    }

    fn check_step(&self, line: usize) -> Result<(), ScriptError> {
        if self.settings.validate_each_step {
            self.tree
                .validate()
                .map_err(|source| ScriptError::Invariant { line, source })?;
        }
        Ok(())
    }
}
