//! In-memory, capped coverage store.
//!
//! Events are parsed from the right (`rsplitn`), so file paths may themselves
//! contain `:`. Recording the same `(file, function, line)` twice stores it once;
//! at capacity the oldest record is evicted.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;

use super::Recorder;
use crate::error::StoreError;

/// One parsed coverage event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoverageRecord {
    /// Source file path.
    pub file: String,
    /// Function name.
    pub function: String,
    /// Line the function was entered at.
    pub line: u32,
}

impl FromStr for CoverageRecord {
    type Err = StoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || StoreError::Malformed(raw.to_string());

        let mut parts = raw.rsplitn(3, ':');
        let line = parts.next().ok_or_else(malformed)?;
        let function = parts.next().ok_or_else(malformed)?;
        let file = parts.next().ok_or_else(malformed)?;
        if file.is_empty() || function.is_empty() {
            return Err(malformed());
        }
        let line = line.trim().parse().map_err(|_| malformed())?;

        Ok(Self {
            file: file.to_string(),
            function: function.to_string(),
            line,
        })
    }
}

impl fmt::Display for CoverageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.function, self.line)
    }
}

#[derive(Default)]
struct Store {
    order: VecDeque<CoverageRecord>,
    seen: HashSet<CoverageRecord>,
}

/// Capped in-memory recorder.
pub struct MemoryRecorder {
    capacity: usize,
    store: Mutex<Store>,
}

impl MemoryRecorder {
    /// Creates a store holding at most `capacity` distinct records (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            store: Mutex::new(Store::default()),
        }
    }

    /// Number of distinct records held.
    pub fn len(&self) -> usize {
        self.store.lock().order.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the stored records, oldest first.
    pub fn records(&self) -> Vec<CoverageRecord> {
        self.store.lock().order.iter().cloned().collect()
    }

    /// `true` if some record pairs `file` with `function`.
    pub fn likely_belongs(&self, file: &str, function: &str) -> bool {
        self.store
            .lock()
            .order
            .iter()
            .any(|r| r.file == file && r.function == function)
    }

    /// Function recorded in `file` at the smallest line `>= line`.
    pub fn next_function(&self, file: &str, line: u32) -> Option<String> {
        self.store
            .lock()
            .order
            .iter()
            .filter(|r| r.file == file && r.line >= line)
            .min_by_key(|r| r.line)
            .map(|r| r.function.clone())
    }

    /// `true` if `function`, declared in `file` at `line`, has been called.
    pub fn was_called(&self, file: &str, function: &str, line: u32) -> bool {
        self.likely_belongs(file, function)
            && self.next_function(file, line).as_deref() == Some(function)
    }
}

impl Recorder for MemoryRecorder {
    fn record(&self, raw: &str) -> Result<(), StoreError> {
        let rec: CoverageRecord = raw.parse()?;

        let mut store = self.store.lock();
        if store.seen.contains(&rec) {
            return Ok(());
        }
        if store.order.len() >= self.capacity {
            if let Some(old) = store.order.pop_front() {
                store.seen.remove(&old);
            }
        }
        store.seen.insert(rec.clone());
        store.order.push_back(rec);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_from_the_right() {
        let rec: CoverageRecord = "C:/www/a.php:foo:10".parse().unwrap();
        assert_eq!(rec.file, "C:/www/a.php");
        assert_eq!(rec.function, "foo");
        assert_eq!(rec.line, 10);
        assert_eq!(rec.to_string(), "C:/www/a.php:foo:10");

        for bad in ["", "foo:10", ":foo:10", "/a.php::10", "/a.php:foo:ten"] {
            assert!(
                matches!(bad.parse::<CoverageRecord>(), Err(StoreError::Malformed(_))),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn upsert_keeps_one_copy() {
        let store = MemoryRecorder::new(10);
        store.record("/a/b.php:foo:10").unwrap();
        store.record("/a/b.php:foo:10").unwrap();
        store.record("/a/b.php:bar:20").unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let store = MemoryRecorder::new(2);
        store.record("/a.php:one:1").unwrap();
        store.record("/a.php:two:2").unwrap();
        store.record("/a.php:three:3").unwrap();

        let functions: Vec<String> = store.records().into_iter().map(|r| r.function).collect();
        assert_eq!(functions, vec!["two", "three"]);

        // The evicted record can come back.
        store.record("/a.php:one:1").unwrap();
        assert!(store.likely_belongs("/a.php", "one"));
        assert!(!store.likely_belongs("/a.php", "two"));
    }

    #[test]
    fn coverage_queries() {
        let store = MemoryRecorder::new(100);
        store.record("/a.php:foo:10").unwrap();
        store.record("/a.php:bar:30").unwrap();
        store.record("/b.php:baz:5").unwrap();

        assert!(store.likely_belongs("/a.php", "foo"));
        assert!(!store.likely_belongs("/b.php", "foo"));

        assert_eq!(store.next_function("/a.php", 1).as_deref(), Some("foo"));
        assert_eq!(store.next_function("/a.php", 11).as_deref(), Some("bar"));
        assert_eq!(store.next_function("/a.php", 31), None);

        assert!(store.was_called("/a.php", "foo", 10));
        assert!(store.was_called("/a.php", "bar", 25));
        // `qux` sits between foo and bar but was never recorded.
        assert!(!store.was_called("/a.php", "qux", 20));
    }
}
