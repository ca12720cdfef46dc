//! Install, activate and message handling for a worker version.
//!
//! Install fetches every fallback resource before anything is written, then
//! stores the whole batch in one call, so a failed install leaves no cache
//! behind. Activation garbage-collects the application's other cache
//! versions; each deletion is independent.

use std::sync::atomic::Ordering;

use futures_util::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use waystation_core::{EdgeRequest, Error, RequestKey};

use super::{EdgeWorker, MessageEffect, WorkerMessage, WorkerState};

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOutcome {
    pub cache_name: String,
    /// Number of fallback resources stored.
    pub stored: usize,
    /// The worker asks to activate without waiting for old pages to close.
    pub skip_waiting: bool,
}

/// Result of activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateReport {
    pub cache_name: String,
    /// Stale caches removed.
    pub deleted: Vec<String>,
    /// Stale caches whose deletion failed; activation went ahead anyway.
    pub failed: Vec<String>,
    /// Open pages are now controlled by this version.
    pub clients_claimed: bool,
}

impl EdgeWorker {
    /// Populate this version's cache from the fallback manifest.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` if any fallback resource cannot be
    /// fetched, is not a 2xx response or exceeds `max_entry_bytes`. Returns
    /// `Error::InvalidState` if the worker was already installed. A failed
    /// install leaves the worker `redundant`.
    pub async fn on_install(&self) -> Result<InstallOutcome, Error> {
        self.transition(WorkerState::Parsed, WorkerState::Installing).await?;
        tracing::info!(version = %self.config.version, cache = %self.cache_name, "installing worker");

        match self.populate_fallbacks().await {
            Ok(stored) => {
                self.set_state(WorkerState::Installed).await;
                self.skip_waiting.store(true, Ordering::SeqCst);
                tracing::info!(version = %self.config.version, stored, "worker installed");
                Ok(InstallOutcome { cache_name: self.cache_name.clone(), stored, skip_waiting: true })
            }
            Err(err) => {
                self.set_state(WorkerState::Redundant).await;
                tracing::warn!(version = %self.config.version, error = %err, "install failed; discarding worker");
                Err(err)
            }
        }
    }

    async fn populate_fallbacks(&self) -> Result<usize, Error> {
        let fetches = self.fallbacks.iter().map(|(path, url)| async move {
            let response = self
                .origin
                .fetch(&EdgeRequest::get(url.clone()))
                .await
                .map_err(|e| Error::InstallFailed { path: path.clone(), reason: e.to_string() })?;

            if !response.is_ok() {
                return Err(Error::InstallFailed {
                    path: path.clone(),
                    reason: format!("status {}", response.status.as_u16()),
                });
            }

            let limit = self.config.max_entry_bytes;
            if response.body.len() > limit {
                return Err(Error::InstallFailed {
                    path: path.clone(),
                    reason: format!("body of {} bytes exceeds {limit}", response.body.len()),
                });
            }

            Ok((RequestKey::get(url), response))
        });

        let entries = try_join_all(fetches).await?;
        let stored = entries.len();
        self.registry.put_all(&self.cache_name, entries).await?;
        Ok(stored)
    }

    /// Delete the application's stale cache versions and claim open pages.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the worker is `installed`.
    /// Cleanup failures never fail activation; they are listed in the report.
    pub async fn on_activate(&self) -> Result<ActivateReport, Error> {
        self.transition(WorkerState::Installed, WorkerState::Activating).await?;

        let (deleted, failed) = self.delete_stale_caches().await;

        self.set_state(WorkerState::Activated).await;
        tracing::info!(
            version = %self.config.version,
            deleted = deleted.len(),
            failed = failed.len(),
            "worker activated; claiming clients"
        );

        Ok(ActivateReport { cache_name: self.cache_name.clone(), deleted, failed, clients_claimed: true })
    }

    async fn delete_stale_caches(&self) -> (Vec<String>, Vec<String>) {
        let names = match self.registry.list().await {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(error = %err, "could not list caches; skipping cleanup");
                return (Vec::new(), Vec::new());
            }
        };

        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| *name != self.cache_name && self.config.owns_cache(name))
            .collect();

        let results = join_all(stale.iter().map(|name| self.registry.delete(name))).await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(true) => {
                    tracing::debug!(cache = %name, "deleted stale cache");
                    deleted.push(name);
                }
                Ok(false) => tracing::debug!(cache = %name, "stale cache already gone"),
                Err(err) => {
                    tracing::warn!(cache = %name, error = %err, "failed to delete stale cache");
                    failed.push(name);
                }
            }
        }

        (deleted, failed)
    }

    /// Mark this version as replaced. A retired worker never intercepts or
    /// activates again.
    pub async fn retire(&self) {
        let mut state = self.state.write().await;
        if *state != WorkerState::Redundant {
            tracing::info!(version = %self.config.version, from = %*state, "worker retired");
            *state = WorkerState::Redundant;
        }
    }

    /// Handle a message posted by a controlled page.
    ///
    /// Only `{"type": "skipWaiting"}` is recognized; empty or unknown payloads
    /// are ignored.
    pub fn on_message(&self, payload: &serde_json::Value) -> MessageEffect {
        if payload.is_null() {
            return MessageEffect::Ignored;
        }

        match WorkerMessage::deserialize(payload) {
            Ok(WorkerMessage::SkipWaiting) => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                tracing::info!(version = %self.config.version, "skip-waiting requested by page");
                MessageEffect::SkipWaiting
            }
            Err(err) => {
                tracing::debug!(error = %err, "ignoring unrecognized message");
                MessageEffect::Ignored
            }
        }
    }
}
