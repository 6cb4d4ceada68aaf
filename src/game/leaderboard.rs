use std::fs;
use std::path::PathBuf;

use crate::game::PersistenceError;

pub const MAX_ENTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Entry {
    pub pseudo: String,
    pub score: u32,
}

/// Durable slot for the serialized leaderboard.
///
/// `load` never fails the caller: an absent or unreadable slot is an
/// empty leaderboard. `save` replaces the whole slot or leaves the
/// previous value intact.
pub trait LeaderboardStore {
    fn load(&self) -> Vec<Entry>;
    fn save(&self, entries: &[Entry]) -> Result<(), PersistenceError>;
}

/// One JSON file, written atomically (temp file, then rename).
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LeaderboardStore for JsonFileStore {
    fn load(&self) -> Vec<Entry> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::info!("no leaderboard at {:?} ({err}), starting empty", self.path);
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("unreadable leaderboard at {:?} ({err}), starting empty", self.path);
                Vec::new()
            }
        }
    }

    fn save(&self, entries: &[Entry]) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Ranked, size-bounded record of past players' final scores.
#[derive(Debug)]
pub struct Leaderboard<S> {
    store: S,
    entries: Vec<Entry>,
}

impl<S: LeaderboardStore> Leaderboard<S> {
    pub fn load(store: S) -> Self {
        let entries = store.load();
        Self { store, entries }
    }

    /// Ranks a finished run and persists the result. On a persistence
    /// failure the in-memory leaderboard keeps the update but the error
    /// is surfaced so the caller can flag the non-durable result.
    pub fn record_score(&mut self, pseudo: &str, score: u32) -> Result<(), PersistenceError> {
        self.entries.push(Entry {
            pseudo: pseudo.to_string(),
            score,
        });
        // Stable sort: equal scores keep insertion order.
        self.entries.sort_by(|a, b| b.score.cmp(&a.score));
        self.entries.truncate(MAX_ENTRIES);
        self.store.save(&self.entries)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}
