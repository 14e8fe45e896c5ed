//! Unique identifier generation, with a deterministic fallback when the
//! entropy source fails.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

static CRYPTO_FAILURE_COUNT: AtomicUsize = AtomicUsize::new(0);
static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Total number of times the entropy source has failed, process-wide.
pub fn crypto_failure_count() -> usize {
    CRYPTO_FAILURE_COUNT.load(Ordering::Relaxed)
}

/// How the generator behaves when the entropy source fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdMode {
    /// Produce a deterministic fallback id on entropy failure.
    #[default]
    Fallback,
    /// Return an error on entropy failure instead of falling back.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntropyError;

impl std::fmt::Display for EntropyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entropy source failed while generating an id")
    }
}

impl std::error::Error for EntropyError {}

/// Something that can supply random bytes; the production path uses the OS
/// CSPRNG via `uuid`, tests inject a source that always fails.
pub trait EntropySource: Send + Sync + std::fmt::Debug {
    fn generate(&self) -> Result<String, EntropyError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn generate(&self) -> Result<String, EntropyError> {
        Ok(Uuid::new_v4().to_string())
    }
}

/// Generates unique ids for ingestion events, traces, and observations.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    mode: IdMode,
    source: std::sync::Arc<dyn EntropySource>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self { mode: IdMode::Fallback, source: std::sync::Arc::new(OsEntropy) }
    }
}

impl IdGenerator {
    pub fn new(mode: IdMode) -> Self {
        Self { mode, source: std::sync::Arc::new(OsEntropy) }
    }

    pub fn with_source(mut self, source: std::sync::Arc<dyn EntropySource>) -> Self {
        self.source = source;
        self
    }

    /// Generate an id, falling back (or erroring, in strict mode) on entropy failure.
    pub fn generate(&self) -> Result<String, EntropyError> {
        match self.source.generate() {
            Ok(id) => Ok(id),
            Err(e) => {
                CRYPTO_FAILURE_COUNT.fetch_add(1, Ordering::Relaxed);
                match self.mode {
                    IdMode::Fallback => Ok(fallback_id()),
                    IdMode::Strict => Err(e),
                }
            }
        }
    }

    /// Generate an id, panicking in strict mode on entropy failure.
    pub fn must_generate(&self) -> String {
        match self.generate() {
            Ok(id) => id,
            Err(e) => panic!("id generation failed: {e}"),
        }
    }
}

fn fallback_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let suffix: u16 = (counter & 0xFFFF) as u16 ^ ((nanos & 0xFFFF) as u16);
    format!("fb-{nanos}-{counter}-{suffix:04x}")
}

/// Recognizes canonical 36-char hyphenated UUIDs and compact 32-char hex UUIDs.
pub fn is_valid_uuid_form(id: &str) -> bool {
    let hex_only: String = id.chars().filter(|c| *c != '-').collect();
    if hex_only.len() != 32 || !hex_only.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    match id.len() {
        32 => true,
        36 => {
            let bytes = id.as_bytes();
            [8, 13, 18, 23].iter().all(|&i| bytes[i] == b'-')
        }
        _ => false,
    }
}

/// Recognizes fallback ids of the form `fb-<nanos>-<counter>-<4 hex>`.
pub fn is_fallback_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("fb-") else { return false };
    let parts: Vec<&str> = rest.split('-').collect();
    let [nanos, counter, suffix] = parts.as_slice() else { return false };
    !nanos.is_empty()
        && nanos.chars().all(|c| c.is_ascii_digit())
        && !counter.is_empty()
        && counter.chars().all(|c| c.is_ascii_digit())
        && suffix.len() == 4
        && suffix.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, Default)]
    struct FailingEntropy;

    impl EntropySource for FailingEntropy {
        fn generate(&self) -> Result<String, EntropyError> {
            Err(EntropyError)
        }
    }

    #[test]
    fn default_generator_produces_canonical_uuids() {
        let gen = IdGenerator::default();
        let id = gen.generate().unwrap();
        assert!(is_valid_uuid_form(&id));
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn fallback_mode_produces_fallback_ids_on_entropy_failure() {
        let gen = IdGenerator::new(IdMode::Fallback).with_source(std::sync::Arc::new(FailingEntropy));
        let before = crypto_failure_count();
        let id = gen.generate().unwrap();
        assert!(is_fallback_id(&id), "id {id} should match fallback format");
        assert_eq!(crypto_failure_count(), before + 1);
    }

    #[test]
    fn strict_mode_errors_on_entropy_failure() {
        let gen = IdGenerator::new(IdMode::Strict).with_source(std::sync::Arc::new(FailingEntropy));
        assert!(gen.generate().is_err());
    }

    #[test]
    #[should_panic]
    fn must_generate_panics_in_strict_mode_on_failure() {
        let gen = IdGenerator::new(IdMode::Strict).with_source(std::sync::Arc::new(FailingEntropy));
        gen.must_generate();
    }

    #[test]
    fn fallback_ids_are_unique_under_concurrency() {
        let gen = IdGenerator::new(IdMode::Fallback).with_source(std::sync::Arc::new(FailingEntropy));
        let gen = std::sync::Arc::new(gen);
        let mut handles = vec![];
        for _ in 0..10 {
            let gen = gen.clone();
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| gen.generate().unwrap()).collect::<Vec<_>>()
            }));
        }
        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id), "duplicate fallback id generated");
            }
        }
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn compact_hex_form_is_recognized() {
        assert!(is_valid_uuid_form("00000000000000000000000000000000"));
        assert!(!is_valid_uuid_form("zz000000000000000000000000000000"));
    }
}
