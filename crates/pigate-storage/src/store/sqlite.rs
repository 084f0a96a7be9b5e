use super::{BatchOutcome, CredentialStore};
use crate::connection::Database;
use crate::error::StorageResult;
use crate::models::{AccessTimeRow, CredentialRow, GateLogRow};
use pigate_core::{AccessTime, Credential, GateLog};
use sqlx::SqlitePool;
use tracing::debug;

/// SQLite implementation of [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }
}

impl CredentialStore for SqliteCredentialStore {
    async fn put_credential(&self, credential: &Credential) -> StorageResult<()> {
        let row = CredentialRow::from(credential);
        sqlx::query(
            r#"
            INSERT INTO credentials (code, username, access_group, locked_out, auto_update, open_mode)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(code) DO UPDATE SET
                username = excluded.username,
                access_group = excluded.access_group,
                locked_out = excluded.locked_out,
                auto_update = excluded.auto_update,
                open_mode = excluded.open_mode
            "#,
        )
        .bind(&row.code)
        .bind(&row.username)
        .bind(row.access_group)
        .bind(row.locked_out)
        .bind(row.auto_update)
        .bind(&row.open_mode)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn put_credentials(&self, credentials: &[Credential]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for credential in credentials {
            let result = self.put_credential(credential).await;
            outcome.record(credential.code.as_str(), result);
        }
        debug!(
            applied = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Credential batch written"
        );
        outcome
    }

    async fn get_credential(&self, code: &str) -> StorageResult<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT code, username, access_group, locked_out, auto_update, open_mode
            FROM credentials
            WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    async fn get_all_credentials(&self) -> StorageResult<Vec<Credential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT code, username, access_group, locked_out, auto_update, open_mode
            FROM credentials
            ORDER BY code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Credential::try_from).collect()
    }

    async fn delete_credential(&self, code: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM credentials WHERE code = ?")
            .bind(code)
            .execute(&self.pool)
            .await?;
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
        let row = AccessTimeRow::from(access_time);
        sqlx::query(
            r#"
            INSERT INTO access_times (access_group, start_time, end_time, start_weekday, end_weekday)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(access_group) DO UPDATE SET
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                start_weekday = excluded.start_weekday,
                end_weekday = excluded.end_weekday
            "#,
        )
        .bind(row.access_group)
        .bind(&row.start_time)
        .bind(&row.end_time)
        .bind(row.start_weekday)
        .bind(row.end_weekday)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_access_time(&self, access_group: i64) -> StorageResult<Option<AccessTime>> {
        let row = sqlx::query_as::<_, AccessTimeRow>(
            r#"
            SELECT access_group, start_time, end_time, start_weekday, end_weekday
            FROM access_times
            WHERE access_group = ?
            "#,
        )
        .bind(access_group)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AccessTime::try_from).transpose()
    }

    async fn delete_access_time(&self, access_group: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM access_times WHERE access_group = ?")
            .bind(access_group)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_gate_log(&self, log: &GateLog) -> StorageResult<()> {
        let row = GateLogRow::from(log);
        sqlx::query("INSERT INTO gate_request_log (code, time, status) VALUES (?, ?, ?)")
            .bind(&row.code)
            .bind(row.time)
            .bind(&row.status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_gate_logs(&self) -> StorageResult<Vec<GateLog>> {
        let rows = sqlx::query_as::<_, GateLogRow>(
            "SELECT code, time, status FROM gate_request_log ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GateLog::try_from).collect()
    }
}
