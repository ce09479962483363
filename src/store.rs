//! In-process reference store mapping content fingerprints to remote assets.
//!
//! The store only deduplicates uploads; the remote provider controls its own
//! caching and expiry, so a local record is advisory, never authoritative.
//! `resolve` re-validates a hit with the remote service before returning it
//! and lazily expires records the service no longer resolves.
//!
//! Invariant: at most one non-Expired, non-Failed record exists per
//! (fingerprint, model hint). Racing registrations for the same fingerprint
//! are serialized by a per-fingerprint gate so only one upload goes out; the
//! loser re-reads the map and reuses the winner's record.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::asset::{AssetStatus, RemoteAssetRecord};
use crate::backend::{BackendError, RemoteFileState, VideoBackend};
use crate::fingerprint::VideoFingerprint;
use crate::poller::{self, PollError, PollOptions, PollProgress};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("upload failed: {0}")]
    Upload(BackendError),

    #[error("remote processing failed: {0}")]
    Processing(String),

    #[error("asset not ready after {waited_secs}s")]
    Timeout { waited_secs: u64 },

    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

type Key = (VideoFingerprint, String);

pub struct AssetStore {
    records: Mutex<HashMap<Key, RemoteAssetRecord>>,
    register_gates: Mutex<HashMap<VideoFingerprint, Arc<tokio::sync::Mutex<()>>>>,
    poll: PollOptions,
}

impl AssetStore {
    pub fn new(poll: PollOptions) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            register_gates: Mutex::new(HashMap::new()),
            poll,
        }
    }

    /// Look up a usable record for this fingerprint/model pair, re-validating
    /// with the remote service before returning it.
    ///
    /// Returns `Ok(None)` when there is no record, the record is not Ready,
    /// or the remote service no longer resolves it (the record is then marked
    /// Expired). `Err` only when the service is unreachable, which callers
    /// should surface rather than treat as a miss.
    pub async fn resolve<B: VideoBackend>(
        &self,
        backend: &B,
        fingerprint: &VideoFingerprint,
        model_hint: &str,
    ) -> Result<Option<RemoteAssetRecord>, BackendError> {
        let key = (fingerprint.clone(), model_hint.to_string());
        let record = {
            let records = self.records.lock();
            match records.get(&key) {
                Some(r) if r.status.is_usable() => r.clone(),
                _ => return Ok(None),
            }
        };

        match backend.status(&record.remote_handle).await {
            Ok(RemoteFileState::Active) => {
                debug!("cache hit for {}: {}", fingerprint.short(), record.remote_handle);
                Ok(Some(record))
            }
            Ok(state) => {
                info!(
                    "remote reports {:?} for {}; expiring local record",
                    state, record.remote_handle
                );
                self.set_status(&key, AssetStatus::Expired);
                Ok(None)
            }
            Err(err) if err.is_unreachable() => Err(err),
            Err(err) => {
                // 404 and friends: the handle is gone on the remote side.
                warn!("re-validation of {} failed: {err}; expiring", record.remote_handle);
                self.set_status(&key, AssetStatus::Expired);
                Ok(None)
            }
        }
    }

    /// Register a novel fingerprint: upload the bytes and wait until the
    /// remote service reports the asset ready. A registration that fails at
    /// any step leaves a Failed record behind, never a dangling Registering.
    pub async fn register<B: VideoBackend>(
        &self,
        backend: &B,
        fingerprint: &VideoFingerprint,
        model_hint: &str,
        bytes: &[u8],
        display_name: &str,
        mut on_poll: impl FnMut(PollProgress),
    ) -> Result<RemoteAssetRecord, RegisterError> {
        let gate = self.gate_for(fingerprint);
        let _guard = gate.lock().await;

        let key = (fingerprint.clone(), model_hint.to_string());

        // A racing turn may have finished this registration while we waited
        // on the gate.
        {
            let records = self.records.lock();
            if let Some(existing) = records.get(&key)
                && existing.status.is_usable()
            {
                debug!("register coalesced onto {}", existing.remote_handle);
                return Ok(existing.clone());
            }
        }

        self.records
            .lock()
            .insert(key.clone(), RemoteAssetRecord::new(fingerprint.clone(), model_hint));

        let uploaded = match backend.upload(bytes, display_name).await {
            Ok(u) => u,
            Err(err) => {
                self.set_status(&key, AssetStatus::Failed);
                return Err(if err.is_unreachable() {
                    RegisterError::Unreachable(err.to_string())
                } else {
                    RegisterError::Upload(err)
                });
            }
        };

        info!(
            "registered {} as {} ({} bytes)",
            fingerprint.short(),
            uploaded.handle,
            bytes.len()
        );

        {
            let mut records = self.records.lock();
            if let Some(record) = records.get_mut(&key) {
                record.remote_handle = uploaded.handle.clone();
                record.remote_uri = uploaded.uri.clone();
                record.registered_at = Utc::now();
                record.status = AssetStatus::Processing;
            }
        }

        if uploaded.state != RemoteFileState::Active {
            let wait =
                poller::wait_until_ready(backend, &uploaded.handle, &self.poll, &mut on_poll).await;
            if let Err(err) = wait {
                self.set_status(&key, AssetStatus::Failed);
                return Err(match err {
                    PollError::Failed(msg) => RegisterError::Processing(msg),
                    PollError::Timeout(waited) => RegisterError::Timeout {
                        waited_secs: waited.as_secs(),
                    },
                    PollError::Backend(e) if e.is_unreachable() => {
                        RegisterError::Unreachable(e.to_string())
                    }
                    PollError::Backend(e) => RegisterError::Processing(e.to_string()),
                });
            }
        }

        let mut records = self.records.lock();
        match records.get_mut(&key) {
            Some(record) => {
                record.status = AssetStatus::Ready;
                Ok(record.clone())
            }
            // An invalidate raced the registration; treat it as lost.
            None => Err(RegisterError::Processing(
                "registration was cleared before it became ready".into(),
            )),
        }
    }

    /// Best-effort remote deletion followed by unconditional local removal,
    /// across all model hints for this fingerprint. Remote errors only affect
    /// future efficiency, so they are logged and swallowed.
    pub async fn invalidate<B: VideoBackend>(
        &self,
        backend: &B,
        fingerprint: &VideoFingerprint,
    ) -> usize {
        let removed: Vec<RemoteAssetRecord> = {
            let mut records = self.records.lock();
            let keys: Vec<Key> = records
                .keys()
                .filter(|(fp, _)| fp == fingerprint)
                .cloned()
                .collect();
            keys.iter().filter_map(|k| records.remove(k)).collect()
        };
        self.register_gates.lock().remove(fingerprint);

        for record in &removed {
            if record.remote_handle.is_empty() {
                continue;
            }
            if let Err(err) = backend.delete(&record.remote_handle).await {
                warn!("remote delete of {} failed: {err}", record.remote_handle);
            }
        }
        info!("invalidated {} record(s) for {}", removed.len(), fingerprint.short());
        removed.len()
    }

    /// Current record for display purposes, whatever its status. Does not
    /// re-validate.
    pub fn lookup(
        &self,
        fingerprint: &VideoFingerprint,
        model_hint: &str,
    ) -> Option<RemoteAssetRecord> {
        let key = (fingerprint.clone(), model_hint.to_string());
        self.records.lock().get(&key).cloned()
    }

    fn set_status(&self, key: &Key, status: AssetStatus) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(key) {
            record.status = status;
        }
    }

    fn gate_for(&self, fingerprint: &VideoFingerprint) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.register_gates.lock();
        gates.entry(fingerprint.clone()).or_default().clone()
    }
}
