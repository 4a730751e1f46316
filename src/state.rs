/*
 * Chirp - Scheduled Mention Responder
 * File Path: src/state.rs
 * Responsibility: The cursor. Remembers how far mentions were read and which ones got a reply.
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How many replied identifiers survive a save by default.
pub const DEFAULT_RETENTION: usize = 5000;

/// A platform item identifier. Travels as a decimal string, orders as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawId", into = "String")]
pub struct MentionId(u64);

#[derive(Debug, thiserror::Error)]
#[error("invalid mention identifier `{0}`")]
pub struct InvalidMentionId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl MentionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for MentionId {
    type Err = InvalidMentionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(MentionId)
            .map_err(|_| InvalidMentionId(s.to_string()))
    }
}

impl TryFrom<RawId> for MentionId {
    type Error = InvalidMentionId;

    fn try_from(raw: RawId) -> Result<Self, Self::Error> {
        match raw {
            RawId::Text(text) => text.parse(),
            RawId::Number(n) => Ok(MentionId(n)),
        }
    }
}

impl From<MentionId> for String {
    fn from(id: MentionId) -> Self {
        id.0.to_string()
    }
}

impl fmt::Display for MentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted progress. Field names match the `state.json` layout written by earlier bot versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    #[serde(rename = "since_mention_id", default)]
    pub last_seen_id: Option<MentionId>,
    #[serde(rename = "replied_mentions", default)]
    pub replied_ids: Vec<MentionId>,
}

impl CursorState {
    pub fn has_replied(&self, id: MentionId) -> bool {
        self.replied_ids.contains(&id)
    }

    /// Dedupe, sort ascending and keep only the `retention` highest identifiers.
    pub fn compact(&mut self, retention: usize) {
        self.replied_ids.sort_unstable();
        self.replied_ids.dedup();
        if self.replied_ids.len() > retention {
            let overflow = self.replied_ids.len() - retention;
            self.replied_ids.drain(..overflow);
        }
    }
}

/// Whole-document JSON store for [`CursorState`].
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state falls back to the empty cursor.
    pub fn load(&self) -> CursorState {
        if !self.path.exists() {
            log::info!("📭 No cursor at {:?}, starting from scratch.", self.path);
            return CursorState::default();
        }

        let parsed = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cursor at {:?}", self.path))
            .and_then(|raw| {
                serde_json::from_str::<CursorState>(&raw)
                    .with_context(|| format!("Failed to parse cursor at {:?}", self.path))
            });

        match parsed {
            Ok(state) => state,
            Err(e) => {
                log::warn!("⚠️ {:#}. Falling back to an empty cursor.", e);
                CursorState::default()
            }
        }
    }

    /// Replaces the whole record. Writes a sibling temp file first, then renames it over the old one.
    pub fn save(&self, state: &CursorState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create state directory {:?}", parent))?;
            }
        }

        let mut payload = serde_json::to_string_pretty(state).context("Failed to serialize cursor")?;
        payload.push('\n');

        let file_name = self
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("state.json");
        let tmp_path = self.path.with_file_name(format!("{}.tmp", file_name));

        fs::write(&tmp_path, payload)
            .with_context(|| format!("Failed to write cursor to {:?}", tmp_path))?;
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).with_context(|| format!("Failed to move cursor into place at {:?}", self.path));
        }
        Ok(())
    }
}
