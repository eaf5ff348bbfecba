//! Whitelist matching for discovered topic and service names.
//!
//! A whitelist is an ordered list of regex patterns compiled once at
//! startup and immutable for the process lifetime. Names that matched a
//! pattern are remembered in a caller-owned cache so the (potentially
//! large, largely stable) universe of approved names is not re-matched
//! against every pattern once per second. Negative results are never
//! cached: a name that fails today is re-evaluated on the next poll.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use regex::Regex;

/// Names that have already matched a whitelist pattern.
///
/// Grows monotonically for the process lifetime; entries are never
/// invalidated. Each poller keeps its own cache per category so the
/// caches stay independent per domain.
pub type MatchCache = HashSet<String>;

/// Names that have already triggered a one-time notification.
///
/// Distinct from [`MatchCache`]: this set only suppresses repeated log
/// output. The name itself is still offered to the matcher (or the
/// capability lookup) on every cycle, so a corrected pattern or a newly
/// registered capability takes effect without a restart.
#[derive(Debug, Default)]
pub struct WarnOnce {
    seen: HashSet<String>,
}

impl WarnOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per name; later calls with the same name
    /// return false.
    pub fn first(&mut self, name: &str) -> bool {
        if self.seen.contains(name) {
            return false;
        }
        self.seen.insert(name.to_string());
        true
    }

    /// Whether the name has already been reported.
    pub fn seen(&self, name: &str) -> bool {
        self.seen.contains(name)
    }
}

/// An ordered, immutable list of compiled whole-name patterns.
pub struct Whitelist {
    patterns: Vec<Regex>,
    /// Number of individual pattern evaluations performed. Lets tests
    /// observe that cached names short-circuit without regex work.
    evaluations: AtomicUsize,
}

impl Whitelist {
    /// Compile a list of pattern strings.
    ///
    /// Patterns are anchored so they must match the whole name, not a
    /// substring. Invalid patterns are logged and dropped; the rest of
    /// the list stays usable.
    pub fn compile(patterns: &[String]) -> Self {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(re) => compiled.push(re),
                Err(error) => {
                    tracing::error!(
                        pattern = pattern.as_str(),
                        error = %error,
                        "invalid whitelist pattern, ignoring"
                    );
                }
            }
        }
        Self {
            patterns: compiled,
            evaluations: AtomicUsize::new(0),
        }
    }

    /// Check whether `name` is whitelisted.
    ///
    /// A cache hit returns true without evaluating any pattern. On a
    /// first-time match the name is inserted into `cache`. A miss is
    /// not cached.
    pub fn matches(&self, name: &str, cache: &mut MatchCache) -> bool {
        if cache.contains(name) {
            return true;
        }
        for pattern in &self.patterns {
            self.evaluations.fetch_add(1, Ordering::Relaxed);
            if pattern.is_match(name) {
                cache.insert(name.to_string());
                return true;
            }
        }
        false
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Total pattern evaluations since startup.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }
}
