//! Access decision for a presented code.
//!
//! Checks run in a fixed order and the first failure decides:
//!
//! 1. the code must exist
//! 2. the credential must not be locked out
//! 3. its access group must have a window
//! 4. the local time of day must fall inside that window
//!
//! Every store call is bounded by a deadline. A store error or timeout is a
//! deny (fail-closed), distinguishable from the other reasons so the caller
//! can audit it as an error.

use crate::store::{CredentialStore, with_timeout};
use chrono::{Local, NaiveDateTime};
use pigate_core::OpenMode;
use pigate_core::constants::DEFAULT_STORE_TIMEOUT_SECS;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Why a code was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    UnknownCode,
    LockedOut,
    NoAccessWindow,
    OutsideWindow,
    StoreError,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            DenyReason::UnknownCode => "unknown code",
            DenyReason::LockedOut => "locked out",
            DenyReason::NoAccessWindow => "no access window for group",
            DenyReason::OutsideWindow => "outside access window",
            DenyReason::StoreError => "credential store error",
        };
        f.write_str(text)
    }
}

/// Outcome of validating a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted { open_mode: OpenMode },
    Denied(DenyReason),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted { .. })
    }
}

#[derive(Debug)]
pub struct AccessEvaluator<S> {
    store: Arc<S>,
    store_timeout: Duration,
}

impl<S> Clone for AccessEvaluator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            store_timeout: self.store_timeout,
        }
    }
}

impl<S: CredentialStore> AccessEvaluator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }

    /// Bound every store call by `timeout`.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decide whether `code` may open the gate at local time `now`.
    ///
    /// Only the time of day of `now` is used.
    pub async fn validate_credential(&self, code: &str, now: NaiveDateTime) -> Decision {
        let code = code.trim();
        if code.is_empty() {
            return Decision::Denied(DenyReason::UnknownCode);
        }

        let credential = match with_timeout(
            "get_credential",
            self.store_timeout,
            self.store.get_credential(code),
        )
        .await
        {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                info!(code, "Unknown code");
                return Decision::Denied(DenyReason::UnknownCode);
            }
            Err(e) => {
                error!(code, error = %e, "Credential lookup failed");
                return Decision::Denied(DenyReason::StoreError);
            }
        };

        if credential.locked_out {
            info!(code, user = %credential.username, "Credential is locked out");
            return Decision::Denied(DenyReason::LockedOut);
        }

        let window = match with_timeout(
            "get_access_time",
            self.store_timeout,
            self.store.get_access_time(credential.access_group),
        )
        .await
        {
            Ok(Some(window)) => window,
            Ok(None) => {
                info!(
                    code,
                    access_group = credential.access_group,
                    "No access window for group"
                );
                return Decision::Denied(DenyReason::NoAccessWindow);
            }
            Err(e) => {
                error!(
                    code,
                    access_group = credential.access_group,
                    error = %e,
                    "Access window lookup failed"
                );
                return Decision::Denied(DenyReason::StoreError);
            }
        };

        let time_of_day = now.time();
        if !window.permits(time_of_day) {
            info!(
                code,
                time = %time_of_day,
                start = %window.start_time,
                end = %window.end_time,
                "Outside access window"
            );
            return Decision::Denied(DenyReason::OutsideWindow);
        }

        debug!(code, user = %credential.username, open_mode = %credential.open_mode, "Access granted");
        Decision::Granted {
            open_mode: credential.open_mode,
        }
    }

    /// Validate against the current local time.
    pub async fn validate_now(&self, code: &str) -> Decision {
        self.validate_credential(code, Local::now().naive_local()).await
    }
}
