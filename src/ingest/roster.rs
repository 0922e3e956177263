//! User roster the generator iterates over.
//!
//! The roster is owned by another subsystem; this side only reads it, either
//! from a JSON file (`[{"user_id": "...", "name": "...", ...}]`) or as a
//! generated `user-0001..user-N` sequence for demo runs.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Display attributes passed through untouched
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl RosterEntry {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            attributes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Build a roster, dropping duplicate ids and refusing empty ones.
    pub fn new(entries: Vec<RosterEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.user_id.trim().is_empty() {
                return Err(Error::Config("roster entry with empty user_id".into()));
            }
            if seen.insert(entry.user_id.clone()) {
                unique.push(entry);
            }
        }
        Ok(Self { entries: unique })
    }

    /// `user-0001` through `user-{size}`.
    pub fn generated(size: usize) -> Self {
        let entries = (1..=size)
            .map(|i| RosterEntry::new(format!("user-{:04}", i)))
            .collect();
        Self { entries }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let entries: Vec<RosterEntry> = serde_json::from_str(&contents)?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.user_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
