//! Row types of the SQLite schema and their conversion to domain types.
//!
//! Columns hold plain SQL values (text times, integer weekdays, Unix
//! timestamps); converting a row into a domain value validates it, so a
//! hand-edited database cannot smuggle an empty code or an unknown open mode
//! past the evaluator.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use pigate_core::{
    AccessTime, Code, Credential, GateLog, format_time_of_day, parse_time_of_day,
    weekday_from_number, weekday_to_number,
};

/// Row of the `credentials` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CredentialRow {
    pub code: String,
    pub username: String,
    pub access_group: i64,
    pub locked_out: bool,
    pub auto_update: bool,
    pub open_mode: String,
}

impl From<&Credential> for CredentialRow {
    fn from(credential: &Credential) -> Self {
        Self {
            code: credential.code.as_str().to_string(),
            username: credential.username.clone(),
            access_group: credential.access_group,
            locked_out: credential.locked_out,
            auto_update: credential.auto_update,
            open_mode: credential.open_mode.as_str().to_string(),
        }
    }
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StorageError;

    fn try_from(row: CredentialRow) -> StorageResult<Self> {
        let code = Code::new(&row.code).map_err(|e| StorageError::corrupt("credential", e.to_string()))?;
        let open_mode = row
            .open_mode
            .parse()
            .map_err(|e: pigate_core::Error| StorageError::corrupt("credential", e.to_string()))?;

        Ok(Credential {
            code,
            username: row.username,
            access_group: row.access_group,
            locked_out: row.locked_out,
            auto_update: row.auto_update,
            open_mode,
        })
    }
}

/// Row of the `access_times` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccessTimeRow {
    pub access_group: i64,
    pub start_time: String,
    pub end_time: String,
    pub start_weekday: Option<i64>,
    pub end_weekday: Option<i64>,
}

impl From<&AccessTime> for AccessTimeRow {
    fn from(access_time: &AccessTime) -> Self {
        Self {
            access_group: access_time.access_group,
            start_time: format_time_of_day(access_time.start_time),
            end_time: format_time_of_day(access_time.end_time),
            start_weekday: access_time.start_weekday.map(weekday_to_number),
            end_weekday: access_time.end_weekday.map(weekday_to_number),
        }
    }
}

impl TryFrom<AccessTimeRow> for AccessTime {
    type Error = StorageError;

    fn try_from(row: AccessTimeRow) -> StorageResult<Self> {
        let corrupt = |e: pigate_core::Error| StorageError::corrupt("access_time", e.to_string());

        Ok(AccessTime {
            access_group: row.access_group,
            start_time: parse_time_of_day(&row.start_time).map_err(corrupt)?,
            end_time: parse_time_of_day(&row.end_time).map_err(corrupt)?,
            start_weekday: row.start_weekday.map(weekday_from_number).transpose().map_err(corrupt)?,
            end_weekday: row.end_weekday.map(weekday_from_number).transpose().map_err(corrupt)?,
        })
    }
}

/// Row of the `gate_request_log` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GateLogRow {
    pub code: String,
    pub time: i64,
    pub status: String,
}

impl From<&GateLog> for GateLogRow {
    fn from(log: &GateLog) -> Self {
        Self {
            code: log.code.clone(),
            time: log.time.timestamp(),
            status: log.status.as_str().to_string(),
        }
    }
}

impl TryFrom<GateLogRow> for GateLog {
    type Error = StorageError;

    fn try_from(row: GateLogRow) -> StorageResult<Self> {
        let time = DateTime::<Utc>::from_timestamp(row.time, 0)
            .ok_or_else(|| StorageError::corrupt("gate_log", format!("timestamp {}", row.time)))?;
        let status = row
            .status
            .parse()
            .map_err(|e: pigate_core::Error| StorageError::corrupt("gate_log", e.to_string()))?;

        Ok(GateLog {
            code: row.code,
            time,
            status,
        })
    }
}
