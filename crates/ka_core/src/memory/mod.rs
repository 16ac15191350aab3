//! Session-scoped conversation memory.
//!
//! Each session key owns one append-only history. The outer map is only
//! write-locked while a new session is inserted; appends take the per-session
//! mutex, so writers on the same key serialize and different keys never block
//! each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::domain::{Role, Turn};
use crate::normalize::now_rfc3339_utc;

/// Default number of turns fed to memory-aware prompts.
pub const DEFAULT_HISTORY_WINDOW: usize = 3;

/// Subsidiary model output kept for debugging (term extraction, dictionary outcome).
/// Not part of the user-visible turn sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub step: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Default)]
struct ConversationHistory {
    turns: Vec<Turn>,
    audit: Vec<AuditEntry>,
}

#[derive(Debug, Default)]
pub struct ConversationMemory {
    sessions: RwLock<HashMap<String, Arc<Mutex<ConversationHistory>>>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn history(&self, session_id: &str) -> Arc<Mutex<ConversationHistory>> {
        {
            let map = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            if let Some(h) = map.get(session_id) {
                return Arc::clone(h);
            }
        }
        let mut map = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(map.entry(session_id.to_string()).or_default())
    }

    pub fn append(&self, session_id: &str, role: Role, text: &str) {
        let history = self.history(session_id);
        let mut h = history.lock().unwrap_or_else(|e| e.into_inner());
        h.turns.push(Turn {
            role,
            text: text.to_string(),
            created_at: now_rfc3339_utc(),
        });
    }

    /// Last `window` turns in chronological order.
    pub fn recent(&self, session_id: &str, window: usize) -> Vec<Turn> {
        let history = self.history(session_id);
        let h = history.lock().unwrap_or_else(|e| e.into_inner());
        let start = h.turns.len().saturating_sub(window);
        h.turns[start..].to_vec()
    }

    pub fn all(&self, session_id: &str) -> Vec<Turn> {
        let history = self.history(session_id);
        let h = history.lock().unwrap_or_else(|e| e.into_inner());
        h.turns.clone()
    }

    pub fn record_audit(&self, session_id: &str, step: &str, text: &str) {
        let history = self.history(session_id);
        let mut h = history.lock().unwrap_or_else(|e| e.into_inner());
        h.audit.push(AuditEntry {
            step: step.to_string(),
            text: text.to_string(),
            created_at: now_rfc3339_utc(),
        });
    }

    pub fn audit(&self, session_id: &str) -> Vec<AuditEntry> {
        let history = self.history(session_id);
        let h = history.lock().unwrap_or_else(|e| e.into_inner());
        h.audit.clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Render turns as `role: text` lines for prompt context.
pub fn format_turns(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "(no prior conversation)".to_string();
    }
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}
