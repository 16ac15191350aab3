use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use ka_ai::dictionary::{DefinitionOracle, DictionarySource};
use ka_core::error::AppError;

struct CountingSource {
    calls: AtomicUsize,
    entries: HashMap<String, String>,
    /// Number of leading calls that fail at the transport level.
    failures: AtomicUsize,
    seen: std::sync::Mutex<Vec<String>>,
}

impl CountingSource {
    fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            entries: entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            failures: AtomicUsize::new(0),
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn failing_first(self, n: usize) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DictionarySource for CountingSource {
    fn lookup(&self, term: &str) -> Result<Option<String>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().expect("lock").push(term.to_string());
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::transient("AI_DICTIONARY_UNREACHABLE", "timeout"));
        }
        Ok(self.entries.get(term).cloned())
    }
}

const PHOTOSYNTHESIS: &str = "the process by which green plants use sunlight to synthesize foods";

#[test]
fn normalized_spellings_share_one_lookup() {
    let source = Arc::new(CountingSource::new(&[("photosynthesis", PHOTOSYNTHESIS)]));
    let oracle = DefinitionOracle::new(source.clone(), 16);

    assert_eq!(oracle.define("Photosynthesis").as_deref(), Some(PHOTOSYNTHESIS));
    assert_eq!(oracle.define("photosynthesis ").as_deref(), Some(PHOTOSYNTHESIS));
    assert_eq!(oracle.define("  PHOTOSYNTHESIS").as_deref(), Some(PHOTOSYNTHESIS));
    assert_eq!(source.calls(), 1);
    assert_eq!(source.seen.lock().expect("lock").as_slice(), ["photosynthesis"]);
}

#[test]
fn not_found_is_cached_too() {
    let source = Arc::new(CountingSource::new(&[]));
    let oracle = DefinitionOracle::new(source.clone(), 16);

    assert_eq!(oracle.define("zyzzyva"), None);
    assert_eq!(oracle.define("Zyzzyva"), None);
    assert_eq!(source.calls(), 1);
    assert_eq!(oracle.cached_len(), 1);
}

#[test]
fn transport_failures_read_as_not_found_and_are_retried_next_time() {
    let source =
        Arc::new(CountingSource::new(&[("photosynthesis", PHOTOSYNTHESIS)]).failing_first(1));
    let oracle = DefinitionOracle::new(source.clone(), 16);

    assert_eq!(oracle.define("photosynthesis"), None);
    assert_eq!(oracle.cached_len(), 0);
    assert_eq!(oracle.define("photosynthesis").as_deref(), Some(PHOTOSYNTHESIS));
    assert_eq!(source.calls(), 2);
}

#[test]
fn least_recently_used_entry_is_evicted() {
    let entries = [("alpha", "first"), ("beta", "second"), ("gamma", "third")];
    let source = Arc::new(CountingSource::new(&entries));
    let oracle = DefinitionOracle::new(source.clone(), 2);

    oracle.define("alpha");
    oracle.define("beta");
    oracle.define("alpha"); // refresh alpha; beta is now oldest
    oracle.define("gamma");
    assert_eq!(source.calls(), 3);
    assert_eq!(oracle.cached_len(), 2);

    oracle.define("alpha");
    assert_eq!(source.calls(), 3, "alpha survived eviction");
    oracle.define("beta");
    assert_eq!(source.calls(), 4, "beta was evicted");
}

#[test]
fn blank_terms_never_reach_the_source() {
    let source = Arc::new(CountingSource::new(&[]));
    let oracle = DefinitionOracle::new(source.clone(), 4);
    assert_eq!(oracle.define("   "), None);
    assert_eq!(source.calls(), 0);
}

#[test]
fn cache_is_shared_across_threads() {
    let source = Arc::new(CountingSource::new(&[("photosynthesis", PHOTOSYNTHESIS)]));
    let oracle = Arc::new(DefinitionOracle::new(source.clone(), 8));
    oracle.define("photosynthesis");

    thread::scope(|s| {
        for _ in 0..8 {
            let oracle = Arc::clone(&oracle);
            s.spawn(move || {
                assert_eq!(oracle.define("Photosynthesis").as_deref(), Some(PHOTOSYNTHESIS));
            });
        }
    });
    assert_eq!(source.calls(), 1);
}
