use super::{BatchOutcome, CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
use crate::error::StorageResult;
use pigate_core::{AccessTime, Credential, GateLog};

/// Enum wrapper for store dispatch, selected from configuration.
#[derive(Debug, Clone)]
pub enum AnyCredentialStore {
    Sqlite(SqliteCredentialStore),
    Memory(MemoryCredentialStore),
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyCredentialStore::Sqlite($store) => $call,
            AnyCredentialStore::Memory($store) => $call,
        }
    };
}

impl CredentialStore for AnyCredentialStore {
    async fn put_credential(&self, credential: &Credential) -> StorageResult<()> {
        dispatch!(self, store => store.put_credential(credential).await)
    }

    async fn put_credentials(&self, credentials: &[Credential]) -> BatchOutcome {
        dispatch!(self, store => store.put_credentials(credentials).await)
    }

    async fn get_credential(&self, code: &str) -> StorageResult<Option<Credential>> {
        dispatch!(self, store => store.get_credential(code).await)
    }

    async fn get_all_credentials(&self) -> StorageResult<Vec<Credential>> {
        dispatch!(self, store => store.get_all_credentials().await)
    }

    async fn delete_credential(&self, code: &str) -> StorageResult<()> {
        dispatch!(self, store => store.delete_credential(code).await)
    }

    async fn delete_credentials(&self, codes: &[String]) -> BatchOutcome {
        dispatch!(self, store => store.delete_credentials(codes).await)
    }

    async fn put_access_time(&self, access_time: &AccessTime) -> StorageResult<()> {
        dispatch!(self, store => store.put_access_time(access_time).await)
    }

    async fn get_access_time(&self, access_group: i64) -> StorageResult<Option<AccessTime>> {
        dispatch!(self, store => store.get_access_time(access_group).await)
    }

    async fn delete_access_time(&self, access_group: i64) -> StorageResult<()> {
        dispatch!(self, store => store.delete_access_time(access_group).await)
    }

    async fn put_gate_log(&self, log: &GateLog) -> StorageResult<()> {
        dispatch!(self, store => store.put_gate_log(log).await)
    }

    async fn get_gate_logs(&self) -> StorageResult<Vec<GateLog>> {
        dispatch!(self, store => store.get_gate_logs().await)
    }
}
