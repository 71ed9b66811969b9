//! The credential registry: durable CRUD, selection and outcome reporting.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::*;
use secrecy::{ExposeSecret, SecretString};
use service::config::Config;
use service::store::{KeyValueStore, CREDENTIALS_KEY};

use crate::credential::{CredentialId, CredentialRecord, StoredCredential};
use crate::encryption::SecretCipher;
use crate::error::{not_found_error, storage_error, validation_error, Error, StorageErrorKind};
use crate::selection::SelectionPolicy;

/// Tuning values of the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Consecutive failures after which a credential is no longer selected.
    pub failure_threshold: u32,
    /// Estimated USD per one million tokens.
    pub cost_per_million_tokens: f64,
    pub selection_policy: SelectionPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cost_per_million_tokens: 0.10,
            selection_policy: SelectionPolicy::FirstHealthy,
        }
    }
}

impl Options {
    /// Reads the tuning values from the service configuration.
    pub fn from_config(config: &Config) -> Self {
        let selection_policy = config
            .credential_selection
            .parse::<SelectionPolicy>()
            .unwrap_or_else(|e| {
                warn!("{e}, using {}", SelectionPolicy::default());
                SelectionPolicy::default()
            });
        let default_rate = Self::default().cost_per_million_tokens;
        let rate = config.cost_per_million_tokens;
        let cost_per_million_tokens = if rate.is_finite() && rate >= 0.0 {
            rate
        } else {
            warn!("Invalid cost per million tokens {rate}, using {default_rate}");
            default_rate
        };
        Self {
            failure_threshold: config.credential_failure_threshold,
            cost_per_million_tokens,
            selection_policy,
        }
    }
}

struct State {
    credentials: Vec<CredentialRecord>,
    cursor: usize,
}

/// Sole owner of the persisted credential collection.
///
/// The collection is cached in memory and written through to the store on
/// every mutation. Mutations are applied to a copy, persisted, and only then
/// committed, so a storage fault leaves both the cache and the store unchanged.
pub struct KeyRegistry<S: KeyValueStore> {
    store: Arc<S>,
    cipher: Option<SecretCipher>,
    options: Options,
    state: Mutex<State>,
}

impl<S: KeyValueStore> KeyRegistry<S> {
    /// Loads the credential collection from `store`.
    ///
    /// `cipher` must be the same one the secrets were written with; encrypted
    /// secrets cannot be loaded without it.
    pub fn load(
        store: Arc<S>,
        options: Options,
        cipher: Option<SecretCipher>,
    ) -> Result<Self, Error> {
        let credentials = match store.get(CREDENTIALS_KEY)? {
            Some(blob) => {
                let stored: Vec<StoredCredential> = serde_json::from_str(&blob)?;
                stored
                    .into_iter()
                    .map(|entry| decode(entry, cipher.as_ref()))
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => Vec::new(),
        };

        debug!(
            "Loaded {} credentials (policy: {}, threshold: {})",
            credentials.len(),
            options.selection_policy,
            options.failure_threshold
        );

        Ok(Self {
            store,
            cipher,
            options,
            state: Mutex::new(State {
                credentials,
                cursor: 0,
            }),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// All credentials in insertion order.
    pub fn list_credentials(&self) -> Result<Vec<CredentialRecord>, Error> {
        Ok(self.lock()?.credentials.clone())
    }

    pub fn get_credential(&self, id: CredentialId) -> Result<Option<CredentialRecord>, Error> {
        Ok(self
            .lock()?
            .credentials
            .iter()
            .find(|c| c.id() == id)
            .cloned())
    }

    /// Number of credentials currently eligible for selection.
    pub fn healthy_count(&self) -> Result<usize, Error> {
        let threshold = self.options.failure_threshold;
        Ok(self
            .lock()?
            .credentials
            .iter()
            .filter(|c| c.is_healthy(threshold))
            .count())
    }

    /// Adds a new active credential with zeroed usage.
    pub fn add_credential(&self, secret: &str, label: &str) -> Result<CredentialRecord, Error> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(validation_error("credential secret must not be empty"));
        }

        let record = CredentialRecord::new(
            SecretString::new(secret.to_string()),
            label.trim().to_string(),
            Utc::now(),
        );

        let added = record.clone();
        self.mutate(move |credentials| {
            credentials.push(record);
        })?;

        info!(
            "Added credential {} ({}, {})",
            added.id(),
            added.label(),
            added.masked_secret()
        );
        Ok(added)
    }

    /// Removes a credential. Unknown ids are ignored.
    pub fn remove_credential(&self, id: CredentialId) -> Result<(), Error> {
        let removed = self.mutate(|credentials| {
            let before = credentials.len();
            credentials.retain(|c| c.id() != id);
            before != credentials.len()
        })?;

        if removed {
            info!("Removed credential {id}");
        } else {
            debug!("Remove ignored, credential {id} not present");
        }
        Ok(())
    }

    /// Explicit user control of the `active` flag.
    pub fn set_active(&self, id: CredentialId, active: bool) -> Result<CredentialRecord, Error> {
        let updated = self.mutate(|credentials| {
            credentials.iter_mut().find(|c| c.id() == id).map(|c| {
                c.set_active(active);
                c.clone()
            })
        })?;

        updated.ok_or_else(|| not_found_error(&format!("credential {id} does not exist")))
    }

    /// Picks a healthy credential according to the configured policy.
    ///
    /// `None` means no healthy credential exists; the caller decides whether
    /// to fall back to another credential source.
    pub fn select_credential(&self) -> Result<Option<CredentialRecord>, Error> {
        self.select_credential_excluding(&[])
    }

    /// Like [`select_credential`](Self::select_credential), skipping the given
    /// ids. Used when retrying a call with a different credential.
    pub fn select_credential_excluding(
        &self,
        exclude: &[CredentialId],
    ) -> Result<Option<CredentialRecord>, Error> {
        let mut state = self.lock()?;
        let State {
            credentials,
            cursor,
        } = &mut *state;

        let selected = self
            .options
            .selection_policy
            .select(credentials, self.options.failure_threshold, exclude, cursor)
            .map(|index| credentials[index].clone());

        if selected.is_none() && !credentials.is_empty() && exclude.is_empty() {
            warn!("No healthy credentials available");
        }
        Ok(selected)
    }

    /// Records a successful call: meters usage and resets the failure count.
    /// Unknown ids are ignored, the credential may have been removed meanwhile.
    pub fn log_success(&self, id: CredentialId, tokens_consumed: u64) -> Result<(), Error> {
        let rate = self.options.cost_per_million_tokens;
        let now = Utc::now();
        let found = self.mutate(|credentials| {
            credentials
                .iter_mut()
                .find(|c| c.id() == id)
                .map(|c| c.record_success(tokens_consumed, rate, now))
                .is_some()
        })?;

        if !found {
            debug!("Usage for unknown credential {id} dropped");
        }
        Ok(())
    }

    /// Records a failed call. Does not touch `active`; exclusion happens purely
    /// through the failure threshold. Unknown ids are ignored.
    pub fn log_failure(&self, id: CredentialId, message: &str) -> Result<(), Error> {
        let threshold = self.options.failure_threshold;
        let error_count = self.mutate(|credentials| {
            credentials.iter_mut().find(|c| c.id() == id).map(|c| {
                c.record_failure(message);
                c.error_count()
            })
        })?;

        match error_count {
            Some(count) if count >= threshold => {
                warn!("Credential {id} quarantined after {count} consecutive failures: {message}")
            }
            Some(count) => debug!("Credential {id} failure {count}/{threshold}: {message}"),
            None => debug!("Failure for unknown credential {id} dropped"),
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, Error> {
        self.state
            .lock()
            .map_err(|_| storage_error(StorageErrorKind::Poisoned, "credential lock poisoned"))
    }

    /// Applies `change` to a copy of the collection, persists it, then commits it.
    fn mutate<T>(&self, change: impl FnOnce(&mut Vec<CredentialRecord>) -> T) -> Result<T, Error> {
        let mut state = self.lock()?;
        let mut next = state.credentials.clone();
        let result = change(&mut next);
        self.persist(&next)?;
        state.credentials = next;
        Ok(result)
    }

    fn persist(&self, credentials: &[CredentialRecord]) -> Result<(), Error> {
        let stored = credentials
            .iter()
            .map(|record| encode(record, self.cipher.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let blob = serde_json::to_string(&stored)?;
        self.store.set(CREDENTIALS_KEY, &blob)?;
        Ok(())
    }
}

fn encode(record: &CredentialRecord, cipher: Option<&SecretCipher>) -> Result<StoredCredential, Error> {
    let plaintext = record.secret().expose_secret();
    match cipher {
        Some(cipher) => Ok(StoredCredential::from_record(
            record,
            cipher.encrypt(plaintext)?,
            true,
        )),
        None => Ok(StoredCredential::from_record(record, plaintext.clone(), false)),
    }
}

fn decode(stored: StoredCredential, cipher: Option<&SecretCipher>) -> Result<CredentialRecord, Error> {
    let secret = match (stored.encrypted, cipher) {
        (true, Some(cipher)) => cipher.decrypt(&stored.secret)?,
        (true, None) => {
            return Err(storage_error(
                StorageErrorKind::DecryptionFailed,
                "credential secret is encrypted but no encryption key is configured",
            ))
        }
        (false, _) => stored.secret.clone(),
    };
    Ok(stored.into_record(SecretString::new(secret)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use service::store::{self, MemoryStore, StoreErrorKind};
    use std::sync::atomic::{AtomicBool, Ordering};

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn registry() -> KeyRegistry<MemoryStore> {
        KeyRegistry::load(Arc::new(MemoryStore::new()), Options::default(), None).unwrap()
    }

    /// Store whose writes can be switched to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        broken: AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, store::Error> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), store::Error> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(store::Error {
                    source: Some("disk full".to_string().into()),
                    error_kind: StoreErrorKind::Io,
                });
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), store::Error> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_options_follow_config() {
        use clap::Parser;

        let config = Config::try_parse_from([
            "second_brain",
            "--credential-failure-threshold",
            "5",
            "--credential-selection",
            "least-recently-used",
        ])
        .unwrap();
        let options = Options::from_config(&config);
        assert_eq!(options.failure_threshold, 5);
        assert_eq!(options.selection_policy, SelectionPolicy::LeastRecentlyUsed);
        assert!((options.cost_per_million_tokens - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_cost_rate_falls_back_to_default() {
        use clap::Parser;

        for rate in ["-1.0", "NaN", "inf"] {
            let flag = format!("--cost-per-million-tokens={rate}");
            let config = Config::try_parse_from(["second_brain", flag.as_str()]).unwrap();
            let options = Options::from_config(&config);
            assert!((options.cost_per_million_tokens - 0.10).abs() < 1e-9);

            let registry =
                KeyRegistry::load(Arc::new(MemoryStore::new()), options, None).unwrap();
            let id = registry.add_credential("abc", "Primary").unwrap().id();
            registry.log_success(id, 0).unwrap();
            let before = registry.get_credential(id).unwrap().unwrap().usage().cost;
            registry.log_success(id, 1_000_000).unwrap();
            let after = registry.get_credential(id).unwrap().unwrap().usage().cost;
            assert!(after >= before, "cost fell from {before} to {after} with rate {rate}");
        }
    }

    #[test]
    fn test_three_failures_quarantine_until_success() {
        let registry = registry();
        let k1 = registry.add_credential("abc", "Primary").unwrap();
        assert_eq!(registry.select_credential().unwrap().unwrap().id(), k1.id());

        for _ in 0..3 {
            registry.log_failure(k1.id(), "rate limited").unwrap();
        }
        assert!(registry.select_credential().unwrap().is_none());

        registry.log_success(k1.id(), 500).unwrap();
        let selected = registry.select_credential().unwrap().unwrap();
        assert_eq!(selected.id(), k1.id());
        assert_eq!(selected.error_count(), 0);
        assert_eq!(selected.usage().total_tokens, 500);
        assert_eq!(selected.usage().total_requests, 1);
        assert_eq!(selected.last_error(), Some("rate limited"));
    }

    #[test]
    fn test_failure_does_not_deactivate() {
        let registry = registry();
        let k1 = registry.add_credential("abc", "Primary").unwrap();
        for _ in 0..5 {
            registry.log_failure(k1.id(), "expired").unwrap();
        }
        let stored = registry.get_credential(k1.id()).unwrap().unwrap();
        assert!(stored.is_active());
        assert_eq!(stored.error_count(), 5);
        assert_eq!(registry.healthy_count().unwrap(), 0);
    }

    #[test]
    fn test_selection_falls_through_to_next_healthy() {
        let registry = registry();
        let k1 = registry.add_credential("abc", "Primary").unwrap();
        let k2 = registry.add_credential("def", "Backup").unwrap();

        for _ in 0..3 {
            registry.log_failure(k1.id(), "quota").unwrap();
        }
        assert_eq!(registry.select_credential().unwrap().unwrap().id(), k2.id());

        registry.set_active(k2.id(), false).unwrap();
        assert!(registry.select_credential().unwrap().is_none());
    }

    #[test]
    fn test_round_robin_registry_rotates_and_excludes() {
        let registry = KeyRegistry::load(
            Arc::new(MemoryStore::new()),
            Options {
                selection_policy: SelectionPolicy::RoundRobin,
                ..Options::default()
            },
            None,
        )
        .unwrap();
        let k1 = registry.add_credential("abc", "Primary").unwrap();
        let k2 = registry.add_credential("def", "Backup").unwrap();

        assert_eq!(registry.select_credential().unwrap().unwrap().id(), k1.id());
        assert_eq!(registry.select_credential().unwrap().unwrap().id(), k2.id());
        assert_eq!(registry.select_credential().unwrap().unwrap().id(), k1.id());
        assert!(registry
            .select_credential_excluding(&[k1.id(), k2.id()])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_add_rejects_empty_secret() {
        let registry = registry();
        let err = registry.add_credential("   ", "Blank").unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Validation);
        assert!(registry.list_credentials().unwrap().is_empty());
    }

    #[test]
    fn test_list_preserves_insertion_order_and_removal() {
        let registry = registry();
        let ids: Vec<_> = ["a1", "b2", "c3"]
            .iter()
            .map(|secret| registry.add_credential(secret, secret).unwrap().id())
            .collect();

        let listed: Vec<_> = registry
            .list_credentials()
            .unwrap()
            .iter()
            .map(|c| c.id())
            .collect();
        assert_eq!(listed, ids);

        registry.remove_credential(ids[1]).unwrap();
        let listed: Vec<_> = registry
            .list_credentials()
            .unwrap()
            .iter()
            .map(|c| c.id())
            .collect();
        assert_eq!(listed, vec![ids[0], ids[2]]);
    }

    #[test]
    fn test_unknown_ids_are_benign() {
        let registry = registry();
        registry.add_credential("abc", "Primary").unwrap();
        let missing = CredentialId::new_v4();

        registry.remove_credential(missing).unwrap();
        registry.log_success(missing, 10).unwrap();
        registry.log_failure(missing, "gone").unwrap();
        assert_eq!(registry.list_credentials().unwrap().len(), 1);

        let err = registry.set_active(missing, false).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_usage_is_monotonic_and_cost_follows_tokens() {
        let registry = KeyRegistry::load(
            Arc::new(MemoryStore::new()),
            Options {
                cost_per_million_tokens: 2.0,
                ..Options::default()
            },
            None,
        )
        .unwrap();
        let k1 = registry.add_credential("abc", "Primary").unwrap();

        let mut previous = (0, 0, 0.0);
        for tokens in [0, 250_000, 0, 750_000] {
            registry.log_success(k1.id(), tokens).unwrap();
            registry.log_failure(k1.id(), "transient").unwrap();
            let usage = registry.get_credential(k1.id()).unwrap().unwrap().usage().clone();
            assert!(usage.total_requests > previous.0);
            assert!(usage.total_tokens >= previous.1);
            assert!(usage.cost >= previous.2);
            previous = (usage.total_requests, usage.total_tokens, usage.cost);
        }
        assert_eq!(previous.1, 1_000_000);
        assert!((previous.2 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_custom_threshold_is_honored() {
        let registry = KeyRegistry::load(
            Arc::new(MemoryStore::new()),
            Options {
                failure_threshold: 1,
                ..Options::default()
            },
            None,
        )
        .unwrap();
        let k1 = registry.add_credential("abc", "Primary").unwrap();
        registry.log_failure(k1.id(), "denied").unwrap();
        assert!(registry.select_credential().unwrap().is_none());
    }

    #[test]
    fn test_collection_survives_reload() {
        let store = Arc::new(MemoryStore::new());
        let first = KeyRegistry::load(store.clone(), Options::default(), None).unwrap();
        let k1 = first.add_credential("abc", "Primary").unwrap();
        first.log_success(k1.id(), 42).unwrap();
        first.log_failure(k1.id(), "blip").unwrap();

        let reloaded = KeyRegistry::load(store, Options::default(), None).unwrap();
        let credential = reloaded.get_credential(k1.id()).unwrap().unwrap();
        assert_eq!(credential.secret().expose_secret(), "abc");
        assert_eq!(credential.label(), "Primary");
        assert_eq!(credential.usage().total_tokens, 42);
        assert_eq!(credential.error_count(), 1);
        assert_eq!(credential.last_error(), Some("blip"));
    }

    #[test]
    fn test_encrypted_secrets_never_hit_the_store_in_plaintext() {
        let store = Arc::new(MemoryStore::new());
        let cipher = SecretCipher::from_hex(TEST_KEY).unwrap();
        let registry =
            KeyRegistry::load(store.clone(), Options::default(), Some(cipher.clone())).unwrap();
        registry
            .add_credential("AIzaSy-very-secret", "Primary")
            .unwrap();

        let blob = store.get(CREDENTIALS_KEY).unwrap().unwrap();
        assert!(!blob.contains("AIzaSy-very-secret"));

        let reloaded = KeyRegistry::load(store.clone(), Options::default(), Some(cipher)).unwrap();
        let credential = reloaded.select_credential().unwrap().unwrap();
        assert_eq!(credential.secret().expose_secret(), "AIzaSy-very-secret");

        let err = KeyRegistry::load(store, Options::default(), None)
            .err()
            .expect("loading without the key should fail");
        assert_eq!(
            err.error_kind,
            ErrorKind::Storage(StorageErrorKind::DecryptionFailed)
        );
    }

    #[test]
    fn test_storage_fault_leaves_registry_unchanged() {
        let store = Arc::new(FlakyStore::default());
        let registry = KeyRegistry::load(store.clone(), Options::default(), None).unwrap();
        let k1 = registry.add_credential("abc", "Primary").unwrap();

        store.broken.store(true, Ordering::SeqCst);
        let err = registry.add_credential("def", "Backup").unwrap_err();
        assert!(err.is_storage());
        assert!(registry.log_failure(k1.id(), "boom").unwrap_err().is_storage());

        let listed = registry.list_credentials().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].error_count(), 0);
    }

    #[test]
    fn test_corrupt_blob_is_a_storage_error() {
        let store = Arc::new(MemoryStore::new());
        store.set(CREDENTIALS_KEY, "{not json").unwrap();
        let err = KeyRegistry::load(store, Options::default(), None)
            .err()
            .expect("corrupt data should not load");
        assert_eq!(
            err.error_kind,
            ErrorKind::Storage(StorageErrorKind::Serialization)
        );
    }

    #[test]
    fn test_concurrent_adds_are_all_kept() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .add_credential(&format!("secret-{i}"), &format!("key {i}"))
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.list_credentials().unwrap().len(), 8);
        let reloaded =
            KeyRegistry::load(Arc::clone(&registry.store), Options::default(), None).unwrap();
        assert_eq!(reloaded.list_credentials().unwrap().len(), 8);
    }
}
