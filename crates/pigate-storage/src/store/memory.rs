use super::{BatchOutcome, CredentialStore};
use crate::error::{StorageError, StorageResult};
use pigate_core::{AccessTime, Credential, GateLog};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryState {
    credentials: BTreeMap<String, Credential>,
    access_times: HashMap<i64, AccessTime>,
    gate_logs: Vec<GateLog>,
    failing_codes: HashSet<String>,
    unavailable: bool,
    latency: Option<Duration>,
}

/// In-process [`CredentialStore`].
///
/// Clones share state. Besides backing `storage.backend = "memory"`, it can
/// inject failures: per-code write failures, whole-store outages, and added
/// latency for exercising timeouts.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make writes and deletes of `code` fail.
    pub fn fail_on(&self, code: impl Into<String>) {
        self.lock().failing_codes.insert(code.into());
    }

    /// Make every call fail (`true`) or recover.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Guard taken at the start of every call: applies latency, then checks
    /// availability.
    async fn enter(&self) -> StorageResult<()> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.lock().unavailable {
            return Err(StorageError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn check_code(state: &MemoryState, code: &str) -> StorageResult<()> {
        if state.failing_codes.contains(code) {
            return Err(StorageError::Unavailable(format!("write of {code} rejected")));
        }
        Ok(())
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn put_credential(&self, credential: &Credential) -> StorageResult<()> {
        self.enter().await?;
        let mut state = self.lock();
        Self::check_code(&state, credential.code.as_str())?;
        state
            .credentials
            .insert(credential.code.as_str().to_string(), credential.clone());
        Ok(())
    }

    async fn put_credentials(&self, credentials: &[Credential]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for credential in credentials {
            let result = self.put_credential(credential).await;
            outcome.record(credential.code.as_str(), result);
        }
        outcome
    }

    async fn get_credential(&self, code: &str) -> StorageResult<Option<Credential>> {
        self.enter().await?;
        Ok(self.lock().credentials.get(code).cloned())
    }

    async fn get_all_credentials(&self) -> StorageResult<Vec<Credential>> {
        self.enter().await?;
        Ok(self.lock().credentials.values().cloned().collect())
    }

    async fn delete_credential(&self, code: &str) -> StorageResult<()> {
        self.enter().await?;
        let mut state = self.lock();
        Self::check_code(&state, code)?;
        state.credentials.remove(code);
        Ok(())
    }

    async fn delete_credentials(&self, codes: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for code in codes {
            let result = self.delete_credential(code).await;
            outcome.record(code, result);
        }
        outcome
    }

    async fn put_access_time(&self, access_time: &AccessTime) -> StorageResult<()> {
        self.enter().await?;
        self.lock()
            .access_times
            .insert(access_time.access_group, access_time.clone());
        Ok(())
    }

    async fn get_access_time(&self, access_group: i64) -> StorageResult<Option<AccessTime>> {
        self.enter().await?;
        Ok(self.lock().access_times.get(&access_group).cloned())
    }

    async fn delete_access_time(&self, access_group: i64) -> StorageResult<()> {
        self.enter().await?;
        self.lock().access_times.remove(&access_group);
        Ok(())
    }

    async fn put_gate_log(&self, log: &GateLog) -> StorageResult<()> {
        self.enter().await?;
        self.lock().gate_logs.push(log.clone());
        Ok(())
    }

    async fn get_gate_logs(&self) -> StorageResult<Vec<GateLog>> {
        self.enter().await?;
        Ok(self.lock().gate_logs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pigate_core::Code;

    fn credential(code: &str) -> Credential {
        Credential::new(Code::new(code).unwrap(), "", 1)
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryCredentialStore::new();
        let clone = store.clone();

        store.put_credential(&credential("1")).await.unwrap();

        assert!(clone.get_credential("1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_reports_failing_codes() {
        let store = MemoryCredentialStore::new();
        store.fail_on("B");

        let outcome = store
            .put_credentials(&[credential("A"), credential("B"), credential("C")])
            .await;

        assert_eq!(outcome.succeeded, vec!["A", "C"]);
        assert_eq!(outcome.failed_codes(), vec!["B"]);
        assert_eq!(store.get_all_credentials().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryCredentialStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.get_credential("1").await,
            Err(StorageError::Unavailable(_))
        ));

        store.set_unavailable(false);
        assert!(store.get_credential("1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_injection() {
        let store = MemoryCredentialStore::new();
        store.set_latency(Some(Duration::from_secs(5)));

        let start = tokio::time::Instant::now();
        store.get_all_credentials().await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
