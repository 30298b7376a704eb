//! Organization access codes and where a guest's code is remembered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::redis::RedisStore;

/// Fixed key a guest's access code is stored under.
pub const ACCESS_KEY: &str = "org_access";

pub const ACCESS_CODE_LEN: usize = 6;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static CODE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Six uppercase ASCII letters or digits.
pub fn is_valid_access_code(code: &str) -> bool {
    let re = Regex::new(r"^[A-Z0-9]{6}$").expect("valid regex");
    re.is_match(code)
}

/// Trims and uppercases user input before validation.
pub fn normalize_access_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// A new access code derived from the current time, the process id and a
/// process-wide counter.
pub fn generate_access_code() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let counter = CODE_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(counter.to_le_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(ACCESS_CODE_LEN)
        .map(|b| CODE_ALPHABET[*b as usize % CODE_ALPHABET.len()] as char)
        .collect()
}

/// Persists the access code a guest entered.
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn load(&self) -> Option<String>;
    async fn save(&self, code: &str);
    async fn clear(&self);
}

#[derive(Default)]
pub struct MemoryAccessStore {
    code: Mutex<Option<String>>,
}

impl MemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(code: &str) -> Self {
        Self {
            code: Mutex::new(Some(code.to_string())),
        }
    }
}

#[async_trait]
impl AccessStore for MemoryAccessStore {
    async fn load(&self) -> Option<String> {
        self.code.lock().ok().and_then(|c| c.clone())
    }

    async fn save(&self, code: &str) {
        if let Ok(mut slot) = self.code.lock() {
            *slot = Some(code.to_string());
        }
    }

    async fn clear(&self) {
        if let Ok(mut slot) = self.code.lock() {
            *slot = None;
        }
    }
}

/// Redis-backed store. Reads as "no stored code" when Redis is down.
pub struct RedisAccessStore {
    redis: RedisStore,
}

impl RedisAccessStore {
    pub fn new(redis: RedisStore) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl AccessStore for RedisAccessStore {
    async fn load(&self) -> Option<String> {
        let code = self.redis.get(ACCESS_KEY).await?;
        if is_valid_access_code(&code) {
            Some(code)
        } else {
            warn!(key = ACCESS_KEY, "ignoring malformed stored access code");
            None
        }
    }

    async fn save(&self, code: &str) {
        self.redis.set(ACCESS_KEY, code).await;
    }

    async fn clear(&self) {
        self.redis.delete(ACCESS_KEY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_code_shape() {
        assert!(is_valid_access_code("AB12CD"));
        assert!(!is_valid_access_code("ab12cd"));
        assert!(!is_valid_access_code("AB12C"));
        assert!(!is_valid_access_code("AB12CD7"));
        assert!(!is_valid_access_code("AB-2CD"));
        assert_eq!(normalize_access_code(" ab12cd\n"), "AB12CD");
    }

    #[test]
    fn generated_codes_are_valid_and_distinct() {
        let a = generate_access_code();
        let b = generate_access_code();
        assert!(is_valid_access_code(&a), "{a}");
        assert!(is_valid_access_code(&b), "{b}");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryAccessStore::new();
        assert_eq!(store.load().await, None);
        store.save("AB12CD").await;
        assert_eq!(store.load().await.as_deref(), Some("AB12CD"));
        store.clear().await;
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn redis_store_without_redis_has_no_code() {
        let store = RedisAccessStore::new(RedisStore::new(None, "portal:"));
        store.save("AB12CD").await;
        assert_eq!(store.load().await, None);
    }
}
