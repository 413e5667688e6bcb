// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake for testing without filesystem I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use weft_app_core::config::{ConfigError, ConfigStore};

/// In-memory [`ConfigStore`] that counts calls and can simulate failures.
///
/// # Example
///
/// ```
/// use weft_dry_tests::InMemoryConfigStore;
/// use weft_app_core::config::ConfigService;
/// use weft_app_core::prefs::{ServerPrefs, SERVER_PREFS_KEY};
///
/// let store = InMemoryConfigStore::new();
/// let service = ConfigService::new(store.clone());
///
/// let (_, wrote) = service.load_or_init::<ServerPrefs>(SERVER_PREFS_KEY).unwrap();
/// assert!(wrote);
/// assert!(store.contains_key(SERVER_PREFS_KEY));
/// assert_eq!(store.save_count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    data: HashMap<String, Vec<u8>>,
    load_count: usize,
    save_count: usize,
    fail_on_load: bool,
    fail_on_save: bool,
}

impl InMemoryConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding one JSON blob under `key`.
    pub fn with_json(key: &str, json: &str) -> Self {
        let store = Self::new();
        store.lock().data.insert(key.to_owned(), json.as_bytes().to_vec());
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make every `load_raw` fail.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.lock().fail_on_load = fail;
    }

    /// Make every `save_raw` fail.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.lock().fail_on_save = fail;
    }

    /// `load_raw` attempts, failed ones included.
    pub fn load_count(&self) -> usize {
        self.lock().load_count
    }

    /// `save_raw` attempts, failed ones included.
    pub fn save_count(&self) -> usize {
        self.lock().save_count
    }

    /// Whether `key` holds a blob.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }

    /// Blob under `key` as UTF-8, if any.
    pub fn raw_text(&self, key: &str) -> Option<String> {
        self.lock()
            .data
            .get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let mut inner = self.lock();
        inner.load_count += 1;
        if inner.fail_on_load {
            return Err(ConfigError::Other("simulated load failure".into()));
        }
        inner.data.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut inner = self.lock();
        inner.save_count += 1;
        if inner.fail_on_save {
            return Err(ConfigError::Other("simulated save failure".into()));
        }
        inner.data.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_app_core::config::ConfigService;
    use weft_app_core::prefs::{Environment, ServerPrefs, SERVER_PREFS_KEY};

    #[test]
    fn existing_prefs_are_not_overwritten() {
        let store = InMemoryConfigStore::with_json(SERVER_PREFS_KEY, r#"{"environment":"staging"}"#);
        let service = ConfigService::new(store.clone());
        let (prefs, wrote) = service.load_or_init::<ServerPrefs>(SERVER_PREFS_KEY).unwrap();
        assert!(!wrote);
        assert_eq!(prefs.environment, Environment::Staging);
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn empty_blob_loads_as_none() {
        let store = InMemoryConfigStore::with_json(SERVER_PREFS_KEY, "");
        let service = ConfigService::new(store);
        assert!(service.load::<ServerPrefs>(SERVER_PREFS_KEY).unwrap().is_none());
    }

    #[test]
    fn load_failure_propagates() {
        let store = InMemoryConfigStore::new();
        store.set_fail_on_load(true);
        let service = ConfigService::new(store.clone());
        let err = service.load_or_init::<ServerPrefs>(SERVER_PREFS_KEY).unwrap_err();
        assert!(matches!(err, ConfigError::Other(_)));
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn saved_prefs_are_pretty_json() {
        let store = InMemoryConfigStore::new();
        let service = ConfigService::new(store.clone());
        service.save(SERVER_PREFS_KEY, &ServerPrefs::default()).unwrap();
        let text = store.raw_text(SERVER_PREFS_KEY).unwrap();
        assert!(text.contains("\n  \"listen\""));
        let back: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back["environment"], "production");
    }

    #[test]
    fn save_failure_counts_attempt() {
        let store = InMemoryConfigStore::new();
        store.set_fail_on_save(true);
        assert!(store.save_raw("k", b"v").is_err());
        assert_eq!(store.save_count(), 1);
        assert!(!store.contains_key("k"));
    }
}
