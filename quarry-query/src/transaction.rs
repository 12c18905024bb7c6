//! Transaction lifecycle on top of the executor.
//!
//! A transaction may carry a deadline: [`Driver::begin`] takes an
//! optional time-to-live, and every statement executed after the
//! deadline has passed forces a rollback and fails with
//! [`Error::TransactionExpired`](crate::Error::TransactionExpired).
//! The guard is checked before statements, never by a timer, so an
//! idle expired transaction is torn down by whichever statement
//! touches it next.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::driver::{Driver, MAX_RETRIES, RETRY_BACKOFF};
use crate::error::{Error, Result};
use crate::sqlstate::ErrorState;

impl Driver {
    /// Begin a transaction, optionally bounded by a time-to-live.
    ///
    /// Fails with a transaction-state error when one is already open.
    /// Lost-connection failures while beginning are retried on a fresh
    /// connection the same way statements are.
    pub fn begin(&mut self, ttl: Option<Duration>) -> Result<()> {
        self.clear_error();
        let mut attempts = 0u32;

        loop {
            self.reconnect()?;
            let Some(client) = self.client.as_deref_mut() else {
                return Err(Error::NotActivated);
            };
            if client.in_transaction() {
                return Err(Error::TransactionState(
                    "a transaction is already open".to_string(),
                ));
            }
            match client.begin() {
                Ok(()) => {
                    self.set_expire_at(ttl.map(|ttl| Instant::now() + ttl));
                    debug!(ttl = ?ttl, "transaction begun");
                    return Ok(());
                }
                Err(info) => {
                    let state = ErrorState::classify(&info.sqlstate);
                    error!(sqlstate = %info.sqlstate, message = %info.message, "begin failed");
                    self.record_error(info.clone());
                    if state.is_retryable() && attempts < MAX_RETRIES {
                        attempts += 1;
                        warn!(attempt = attempts, "reconnecting to begin transaction");
                        self.close(false);
                        thread::sleep(RETRY_BACKOFF);
                        continue;
                    }
                    return Err(Error::Backend(info));
                }
            }
        }
    }

    /// Commit the open transaction and clear its deadline.
    ///
    /// Failing to commit tears the connection down: the handle is in an
    /// unknown state and must not be reused.
    pub fn commit(&mut self) -> Result<()> {
        self.clear_error();
        let Some(client) = self.client.as_deref_mut() else {
            return Err(Error::TransactionState("no transaction is open".to_string()));
        };
        if !client.in_transaction() {
            return Err(Error::TransactionState("no transaction is open".to_string()));
        }
        match client.commit() {
            Ok(()) => {
                self.set_expire_at(None);
                debug!("transaction committed");
                Ok(())
            }
            Err(info) => {
                error!(sqlstate = %info.sqlstate, message = %info.message, "commit failed");
                self.record_error(info.clone());
                self.close(true);
                Err(Error::Backend(info))
            }
        }
    }

    /// Roll back the open transaction and clear its deadline.
    pub fn rollback(&mut self) -> Result<()> {
        self.clear_error();
        let Some(client) = self.client.as_deref_mut() else {
            return Err(Error::TransactionState("no transaction is open".to_string()));
        };
        if !client.in_transaction() {
            return Err(Error::TransactionState("no transaction is open".to_string()));
        }
        match client.rollback() {
            Ok(()) => {
                self.set_expire_at(None);
                debug!("transaction rolled back");
                Ok(())
            }
            Err(info) => {
                error!(sqlstate = %info.sqlstate, message = %info.message, "rollback failed");
                self.record_error(info.clone());
                self.close(true);
                Err(Error::Backend(info))
            }
        }
    }

    /// Run `actions` inside a transaction: commit on success, roll back
    /// on error. The rollback result is ignored; the original error is
    /// surfaced.
    pub fn action<T>(&mut self, actions: impl FnOnce(&mut Driver) -> Result<T>) -> Result<T> {
        self.begin(None)?;
        match actions(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.rollback();
                Err(err)
            }
        }
    }

    /// Remaining time before the transaction deadline, when one is set.
    pub fn time_to_expiry(&self) -> Option<Duration> {
        self.expire_at()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}
