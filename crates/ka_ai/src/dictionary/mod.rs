//! Definition oracle: dictionary lookups behind an LRU cache.
//!
//! `define` never fails. Missing entries, bad statuses and malformed payloads all
//! come back as `None`, so a dictionary outage can only downgrade the definition
//! branch, never fail the query.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use ka_core::error::AppError;
use ka_core::normalize::normalize_term;
use lru::LruCache;

pub mod oxford;

pub use oxford::OxfordDictionary;

/// External definitional data source, keyed by an already-normalized term.
///
/// `Ok(None)` means the source answered and has no entry. `Err` is reserved for
/// transport failures; those are not cached.
pub trait DictionarySource: Send + Sync {
    fn lookup(&self, term: &str) -> Result<Option<String>, AppError>;
}

pub struct DefinitionOracle {
    source: Arc<dyn DictionarySource>,
    cache: Mutex<LruCache<String, Option<String>>>,
}

impl DefinitionOracle {
    pub fn new(source: Arc<dyn DictionarySource>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn define(&self, word: &str) -> Option<String> {
        let key = normalize_term(word);
        if key.is_empty() {
            return None;
        }
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cache.get(&key) {
                tracing::debug!(term = %key, found = hit.is_some(), "definition cache hit");
                return hit.clone();
            }
        }

        // Lock is not held across the network call; concurrent misses on the same
        // key may both reach the source, and the last writer wins.
        match self.source.lookup(&key) {
            Ok(found) => {
                let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                cache.put(key, found.clone());
                found
            }
            Err(e) => {
                tracing::warn!(
                    term = %key,
                    error = %e,
                    "dictionary lookup failed; treating as not found"
                );
                None
            }
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
