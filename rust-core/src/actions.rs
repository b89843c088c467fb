//! Key commands fired when a mapped motion is detected.
//!
//! A motion can be mapped to a key combination (`"ctrl+shift+a"`) with one of
//! three behaviors:
//! - **PressRelease**: press now, release after a short delay
//! - **Hold**: release every held key, then press and keep holding
//! - **Toggle**: alternate between press and release on each detection
//!
//! Commands leave the engine through [`ActionDispatcher`]. A failed dispatch
//! is logged and never interrupts detection.

use std::io::Write;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MotionError, Result};

/// How a mapped key reacts to a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBehavior {
    #[default]
    PressRelease,
    Hold,
    Toggle,
}

/// Key combination and behavior bound to one motion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapping {
    /// `+`-separated combination; the last part is the main key.
    pub key: String,
    #[serde(default)]
    pub behavior: KeyBehavior,
}

impl KeyMapping {
    pub fn new(key: impl Into<String>, behavior: KeyBehavior) -> Self {
        Self {
            key: key.into(),
            behavior,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Press,
    Release,
}

/// One key event, in the wire form consumed by the input server.
///
/// Serializes as
/// `{"type":"motion_key_command","key":"a","modifiers":["ctrl"],"action":"press"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "motion_key_command")]
pub struct KeyCommand {
    pub key: String,
    pub modifiers: Vec<String>,
    pub action: KeyAction,
}

impl KeyCommand {
    /// Split a combination like `"Ctrl+Shift+A"` into main key and modifiers.
    pub fn parse(combination: &str, action: KeyAction) -> Self {
        let lowered = combination.to_lowercase();
        let mut parts: Vec<String> = lowered.split('+').map(str::to_string).collect();
        let key = parts.pop().unwrap_or_default();
        Self {
            key,
            modifiers: parts,
            action,
        }
    }
}

/// Receives key commands. Implemented by whatever forwards them to the OS.
pub trait ActionDispatcher {
    fn dispatch(&mut self, command: &KeyCommand) -> Result<()>;
}

impl<F> ActionDispatcher for F
where
    F: FnMut(&KeyCommand) -> Result<()>,
{
    fn dispatch(&mut self, command: &KeyCommand) -> Result<()> {
        self(command)
    }
}

/// Keeps every dispatched command in memory.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    pub commands: Vec<KeyCommand>,
}

impl ActionDispatcher for CommandLog {
    fn dispatch(&mut self, command: &KeyCommand) -> Result<()> {
        self.commands.push(command.clone());
        Ok(())
    }
}

/// Writes each command as one JSON line.
#[derive(Debug)]
pub struct JsonLineDispatcher<W: Write> {
    writer: W,
}

impl<W: Write> JsonLineDispatcher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ActionDispatcher for JsonLineDispatcher<W> {
    fn dispatch(&mut self, command: &KeyCommand) -> Result<()> {
        let line = serde_json::to_string(command)?;
        writeln!(self.writer, "{}", line).map_err(|e| MotionError::Dispatch(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingRelease {
    key: String,
    due_ms: u64,
}

/// Motion-to-key mappings plus held / toggled / pending-release state.
#[derive(Debug, Clone)]
pub struct KeyMapper {
    mappings: IndexMap<String, KeyMapping>,
    held: IndexSet<String>,
    toggled: IndexSet<String>,
    pending: Vec<PendingRelease>,
    release_delay_ms: u64,
}

impl Default for KeyMapper {
    fn default() -> Self {
        Self::new(100)
    }
}

impl KeyMapper {
    pub fn new(release_delay_ms: u64) -> Self {
        Self {
            mappings: IndexMap::new(),
            held: IndexSet::new(),
            toggled: IndexSet::new(),
            pending: Vec::new(),
            release_delay_ms,
        }
    }

    pub fn set_mapping(&mut self, motion: &str, mapping: KeyMapping) {
        info!(motion, key = %mapping.key, behavior = ?mapping.behavior, "Mapped motion to key");
        self.mappings.insert(motion.to_string(), mapping);
    }

    pub fn mapping(&self, motion: &str) -> Option<&KeyMapping> {
        self.mappings.get(motion)
    }

    /// All mappings in insertion order.
    pub fn mappings(&self) -> impl Iterator<Item = (&str, &KeyMapping)> {
        self.mappings.iter().map(|(motion, mapping)| (motion.as_str(), mapping))
    }

    pub fn remove_mapping(&mut self, motion: &str) -> bool {
        let removed = self.mappings.shift_remove(motion).is_some();
        if removed {
            debug!(motion, "Removed key mapping");
        }
        removed
    }

    pub fn held_keys(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(String::as_str)
    }

    pub fn toggled_keys(&self) -> impl Iterator<Item = &str> {
        self.toggled.iter().map(String::as_str)
    }

    pub fn pending_releases(&self) -> usize {
        self.pending.len()
    }

    /// Run the mapping of `motion`, if any. Returns false when unmapped.
    pub fn execute(&mut self, motion: &str, now_ms: u64, dispatcher: &mut dyn ActionDispatcher) -> bool {
        let Some(mapping) = self.mappings.get(motion).cloned() else {
            debug!(motion, "No key mapping for motion");
            return false;
        };

        debug!(motion, key = %mapping.key, behavior = ?mapping.behavior, "Executing key mapping");

        match mapping.behavior {
            KeyBehavior::PressRelease => {
                send(dispatcher, &mapping.key, KeyAction::Press);
                self.pending.push(PendingRelease {
                    key: mapping.key,
                    due_ms: now_ms.saturating_add(self.release_delay_ms),
                });
            }
            KeyBehavior::Hold => {
                self.release_all_held(dispatcher);
                send(dispatcher, &mapping.key, KeyAction::Press);
                self.held.insert(mapping.key);
            }
            KeyBehavior::Toggle => {
                if self.toggled.shift_remove(&mapping.key) {
                    send(dispatcher, &mapping.key, KeyAction::Release);
                } else {
                    send(dispatcher, &mapping.key, KeyAction::Press);
                    self.toggled.insert(mapping.key);
                }
            }
        }

        true
    }

    /// Dispatch every queued release that is due at `now_ms`.
    pub fn tick(&mut self, now_ms: u64, dispatcher: &mut dyn ActionDispatcher) -> usize {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.due_ms <= now_ms);
        self.pending = waiting;

        for release in &due {
            send(dispatcher, &release.key, KeyAction::Release);
        }
        due.len()
    }

    pub fn release_all_held(&mut self, dispatcher: &mut dyn ActionDispatcher) {
        for key in self.held.drain(..) {
            send(dispatcher, &key, KeyAction::Release);
        }
    }
}

fn send(dispatcher: &mut dyn ActionDispatcher, combination: &str, action: KeyAction) -> bool {
    let command = KeyCommand::parse(combination, action);
    match dispatcher.dispatch(&command) {
        Ok(()) => {
            debug!(key = %combination, action = ?action, "Sent key command");
            true
        }
        Err(e) => {
            warn!(key = %combination, action = ?action, error = %e, "Key command failed");
            false
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
