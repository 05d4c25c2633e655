use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use common::logger::warn_if_slow;

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::key::KeyCodec;
use crate::model::Session;
use crate::store::SessionStore;
use crate::time::{Clock, system_clock};

pub type Result<T> = std::result::Result<T, RegistryError>;

/// What a sweep did with one scanned key.
#[derive(Debug)]
pub enum SweepOutcome {
    /// Matched the predicate and was deleted.
    Removed,
    /// Did not match, or was replaced concurrently before it could be deleted.
    Retained,
    /// Disappeared between enumeration and load.
    Vanished,
    /// Could not be loaded or deleted; the sweep carried on.
    Failed(RegistryError),
}

#[derive(Debug)]
pub struct SweepEntry {
    pub key: String,
    pub outcome: SweepOutcome,
}

impl SweepEntry {
    pub fn removed(&self) -> bool {
        matches!(self.outcome, SweepOutcome::Removed)
    }
}

/// Document written by `register_session`: the session plus an id unique to
/// the call, so a retried insert can recognise its own earlier write.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Registration<'a> {
    #[serde(flatten)]
    session: &'a Session,
    registration_id: &'a str,
}

enum Claim {
    Won,
    /// Lost to the occupant, if it was still there when read back.
    Taken(Option<String>),
}

/// Namespaced session registry over a shared document store.
///
/// Holds no mutable state of its own; every same-token race is settled by the
/// store's conditional primitives, so one instance can be shared across tasks.
pub struct SessionRegistry<S: SessionStore> {
    store: Arc<S>,
    codec: KeyCodec,
    config: RegistryConfig,
    clock: Clock,
}

impl<S: SessionStore> SessionRegistry<S> {
    pub fn new(store: Arc<S>, config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            codec: KeyCodec::new(config.prefix.clone()),
            config,
            clock: system_clock(),
        })
    }

    /// Replace the wall clock used for leases and expiry checks.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Presence probe on the physical key. Does not consult the lease.
    #[instrument(skip(self), target = "registry", fields(prefix = %self.codec.prefix()))]
    pub async fn is_session_registered(&self, token: &str) -> Result<bool> {
        let key = self.codec.physical_key(token);
        let key = key.as_str();
        self.call("exists", move || self.store.exists(key)).await
    }

    /// Register `session` under `token`; at most one concurrent caller wins.
    ///
    /// Returns the record as stored, including the lease stamped from
    /// `session_ttl` when the caller left `expires_at_ms` unset.
    #[instrument(skip(self, session), target = "registry", fields(prefix = %self.codec.prefix()))]
    pub async fn register_session(&self, token: &str, mut session: Session) -> Result<Session> {
        let key = self.codec.physical_key(token);
        if self.codec.physical_key(&session.token) != key {
            return Err(RegistryError::TokenMismatch {
                token: token.to_owned(),
                record_token: session.token,
            });
        }

        let now = (self.clock)();
        if session.expires_at_ms.is_none() {
            session.expires_at_ms = self.lease_from(now);
        }
        let registration_id = Uuid::new_v4().to_string();
        let document = serde_json::to_string(&Registration {
            session: &session,
            registration_id: &registration_id,
        })?;

        let occupant = match self.claim(&key, &document).await? {
            Claim::Won => {
                info!(user_id = session.user_id, "session registered");
                return Ok(session);
            }
            Claim::Taken(occupant) => occupant,
        };

        // Occupied. An expired lease may be reclaimed; anything else wins.
        if let Some(old) = occupant {
            let reclaimable = matches!(decode(&key, &old), Ok(s) if s.is_expired(now));
            if !reclaimable {
                debug!("token already registered");
                return Err(RegistryError::AlreadyRegistered(token.to_owned()));
            }
            let (k, o) = (key.as_str(), old.as_str());
            let evicted = self
                .call("delete_if_equals", move || self.store.delete_if_equals(k, o))
                .await?;
            if evicted {
                info!("reclaimed expired session");
            }
        }

        match self.claim(&key, &document).await? {
            Claim::Won => {
                info!(user_id = session.user_id, "session registered");
                Ok(session)
            }
            Claim::Taken(_) => Err(RegistryError::AlreadyRegistered(token.to_owned())),
        }
    }

    /// Load a live session. Missing and expired sessions are both `NotFound`.
    #[instrument(skip(self), target = "registry", fields(prefix = %self.codec.prefix()))]
    pub async fn get_session_info(&self, token: &str) -> Result<Session> {
        let key = self.codec.physical_key(token);
        let now = (self.clock)();

        let (session, _) = self
            .load_live(&key, now)
            .await?
            .ok_or_else(|| RegistryError::NotFound(token.to_owned()))?;
        Ok(session)
    }

    /// Delete a session. Deleting a missing token is a no-op that returns false.
    #[instrument(skip(self), target = "registry", fields(prefix = %self.codec.prefix()))]
    pub async fn del_session_info(&self, token: &str) -> Result<bool> {
        let key = self.codec.physical_key(token);
        let k = key.as_str();
        let (removed, retried) = self
            .call_tracked("delete", move || self.store.delete(k))
            .await?;

        if removed == 0 {
            if retried {
                warn!("session gone after a failed delete attempt; cannot tell who removed it");
                return Err(unknown_outcome("delete"));
            }
            debug!("delete of unregistered token ignored");
        }
        Ok(removed != 0)
    }

    /// Extend the lease of a live session to `now + session_ttl`.
    ///
    /// Uses compare-and-swap on the stored document, so a concurrent delete is
    /// never undone.
    #[instrument(skip(self), target = "registry", fields(prefix = %self.codec.prefix()))]
    pub async fn refresh_session(&self, token: &str) -> Result<Session> {
        let key = self.codec.physical_key(token);

        for _ in 0..self.config.retry.max_attempts.max(1) {
            let now = (self.clock)();
            let (mut session, current) = self
                .load_live(&key, now)
                .await?
                .ok_or_else(|| RegistryError::NotFound(token.to_owned()))?;

            let Some(expires_at_ms) = self.lease_from(now) else {
                return Ok(session);
            };
            session.expires_at_ms = Some(expires_at_ms);
            let document = serde_json::to_string(&session)?;

            let (k, c, d) = (key.as_str(), current.as_str(), document.as_str());
            let swapped = self
                .call("replace_if_equals", move || {
                    self.store.replace_if_equals(k, c, d)
                })
                .await?;
            if swapped {
                debug!(expires_at_ms, "lease extended");
                return Ok(session);
            }
        }

        warn!("lease refresh lost every compare-and-swap race");
        Err(RegistryError::Contended(token.to_owned()))
    }

    /// Delete every session in this namespace that matches `predicate`.
    ///
    /// Per-key failures do not abort the sweep: the result holds one entry per
    /// scanned key, in key order. Only the initial key scan can fail the call.
    #[instrument(skip(self, predicate), target = "registry", fields(prefix = %self.codec.prefix()))]
    pub async fn delete_sessions<F>(&self, predicate: F) -> Result<Vec<SweepEntry>>
    where
        F: Fn(&Session) -> bool + Send + Sync,
    {
        let keys = self.scan(self.codec.prefix()).await?;
        let scanned = keys.len();

        let predicate = &predicate;
        let entries: Vec<SweepEntry> = stream::iter(keys)
            .map(move |key| self.sweep_one(key, predicate))
            .buffered(self.config.sweep_concurrency)
            .collect()
            .await;

        let removed = entries.iter().filter(|e| e.removed()).count();
        let failed = entries
            .iter()
            .filter(|e| matches!(e.outcome, SweepOutcome::Failed(_)))
            .count();
        info!(scanned, removed, failed, "session sweep complete");

        Ok(entries)
    }

    /// Remove every session whose lease has passed.
    #[instrument(skip(self), target = "registry", fields(prefix = %self.codec.prefix()))]
    pub async fn purge_expired(&self) -> Result<Vec<SweepEntry>> {
        let now = (self.clock)();
        self.delete_sessions(move |s| s.is_expired(now)).await
    }

    /// Live sessions in this namespace matching `predicate`, in key order.
    ///
    /// Corrupt and expired entries are skipped. Store failures are returned
    /// rather than producing a partial listing.
    #[instrument(skip(self, predicate), target = "registry", fields(prefix = %self.codec.prefix()))]
    pub async fn list_registered_sessions<F>(&self, predicate: F) -> Result<Vec<Session>>
    where
        F: Fn(&Session) -> bool + Send + Sync,
    {
        let keys = self.scan(self.codec.prefix()).await?;
        self.collect_matching(keys, predicate).await
    }

    /// Cross-namespace admin view: scans the whole store and keeps every
    /// document that parses as a live session and matches `predicate`.
    /// Expired sessions outside this namespace are skipped but left in place.
    #[instrument(skip(self, predicate), target = "registry")]
    pub async fn list_all_sessions<F>(&self, predicate: F) -> Result<Vec<Session>>
    where
        F: Fn(&Session) -> bool + Send + Sync,
    {
        let keys = self.scan("").await?;
        self.collect_matching(keys, predicate).await
    }

    /// Release the store connection. Consumes the registry.
    #[instrument(skip(self), target = "registry", fields(prefix = %self.codec.prefix()))]
    pub async fn close(self) -> Result<()> {
        self.store
            .close()
            .await
            .map_err(|source| RegistryError::StoreUnavailable {
                operation: "close",
                source,
            })?;
        info!("registry closed");
        Ok(())
    }

    /* =========================
     * internals
     * ========================= */

    fn lease_from(&self, now_ms: u64) -> Option<u64> {
        self.config.session_ttl.map(|ttl| {
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            now_ms.saturating_add(ttl_ms)
        })
    }

    /// One store round trip under the configured deadline, retried on
    /// transport failures.
    async fn call<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.call_tracked(operation, op).await.map(|(v, _)| v)
    }

    /// Like `call`, also reporting whether an earlier attempt failed. A failed
    /// write may still have been applied, so "nothing changed" from a later
    /// attempt is not conclusive.
    async fn call_tracked<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<(T, bool)>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let op = &op;
        let deadline = self.config.op_timeout;
        let slow = self.config.slow_op_threshold;
        let failed = AtomicBool::new(false);
        let failed_ref = &failed;

        let value = self
            .config
            .retry
            .run(operation, move || async move {
                let result = match warn_if_slow(
                    operation,
                    slow,
                    tokio::time::timeout(deadline, op()),
                )
                .await
                {
                    Ok(Ok(v)) => Ok(v),
                    Ok(Err(source)) => Err(RegistryError::StoreUnavailable { operation, source }),
                    Err(_) => Err(RegistryError::StoreUnavailable {
                        operation,
                        source: anyhow::anyhow!("timed out after {deadline:?}"),
                    }),
                };
                if result.is_err() {
                    failed_ref.store(true, Ordering::Relaxed);
                }
                result
            })
            .await?;

        Ok((value, failed.load(Ordering::Relaxed)))
    }

    /// Conditional insert of `document`. Finding this exact document already
    /// in place counts as won: it carries an id unique to this registration,
    /// so only an earlier attempt of the same call can have written it.
    async fn claim(&self, key: &str, document: &str) -> Result<Claim> {
        let inserted = self
            .call("set_if_absent", move || {
                self.store.set_if_absent(key, document)
            })
            .await?;
        if inserted {
            return Ok(Claim::Won);
        }

        let occupant = self.fetch(key).await?;
        if occupant.as_deref() == Some(document) {
            debug!("insert had landed on an earlier attempt");
            return Ok(Claim::Won);
        }
        Ok(Claim::Taken(occupant))
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>> {
        self.call("get", move || self.store.get(key)).await
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        self.call("keys", move || self.store.keys(prefix)).await
    }

    /// Load and decode `key`, treating an expired lease as absent.
    ///
    /// Expired documents in this namespace are evicted with compare-and-delete;
    /// eviction failures are logged and left for the next sweep.
    async fn load_live(&self, key: &str, now_ms: u64) -> Result<Option<(Session, String)>> {
        let Some(document) = self.fetch(key).await? else {
            return Ok(None);
        };
        let session = decode(key, &document)?;

        if !session.is_expired(now_ms) {
            return Ok(Some((session, document)));
        }
        if !self.codec.owns(key) {
            return Ok(None);
        }

        let doc = document.as_str();
        match self
            .call("delete_if_equals", move || self.store.delete_if_equals(key, doc))
            .await
        {
            Ok(true) => debug!(key, "evicted expired session on read"),
            Ok(false) => {}
            Err(e) => warn!(key, error = %e, "failed to evict expired session"),
        }
        Ok(None)
    }

    async fn sweep_one<F>(&self, key: String, predicate: &F) -> SweepEntry
    where
        F: Fn(&Session) -> bool + Send + Sync,
    {
        let outcome = match self.sweep_key(&key, predicate).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(key = %key, error = %e, "sweep skipped entry");
                SweepOutcome::Failed(e)
            }
        };
        SweepEntry { key, outcome }
    }

    async fn sweep_key<F>(&self, key: &str, predicate: &F) -> Result<SweepOutcome>
    where
        F: Fn(&Session) -> bool + Send + Sync,
    {
        let Some(document) = self.fetch(key).await? else {
            return Ok(SweepOutcome::Vanished);
        };
        let session = decode(key, &document)?;
        if !predicate(&session) {
            return Ok(SweepOutcome::Retained);
        }

        let doc = document.as_str();
        let (removed, retried) = self
            .call_tracked("delete_if_equals", move || self.store.delete_if_equals(key, doc))
            .await?;
        if removed {
            return Ok(SweepOutcome::Removed);
        }

        // A failed attempt may have deleted the document before the one that
        // reported nothing to delete.
        if retried && self.fetch(key).await?.is_none() {
            return Err(unknown_outcome("delete_if_equals"));
        }
        Ok(SweepOutcome::Retained)
    }

    async fn collect_matching<F>(&self, keys: Vec<String>, predicate: F) -> Result<Vec<Session>>
    where
        F: Fn(&Session) -> bool + Send + Sync,
    {
        let now = (self.clock)();
        let scanned = keys.len();

        let loaded: Vec<Option<Session>> = stream::iter(keys)
            .map(move |key| async move {
                match self.load_live(&key, now).await {
                    Ok(found) => Ok(found.map(|(session, _)| session)),
                    Err(RegistryError::CorruptData { key, source }) => {
                        warn!(key = %key, error = %source, "skipping unreadable document");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .buffered(self.config.sweep_concurrency)
            .try_collect()
            .await?;

        let matched: Vec<Session> = loaded
            .into_iter()
            .flatten()
            .filter(|s| predicate(s))
            .collect();

        debug!(scanned, matched = matched.len(), "listing complete");
        Ok(matched)
    }
}

fn unknown_outcome(operation: &'static str) -> RegistryError {
    RegistryError::StoreUnavailable {
        operation,
        source: anyhow::anyhow!("an earlier attempt failed after reaching the store; outcome unknown"),
    }
}

fn decode(key: &str, document: &str) -> Result<Session> {
    serde_json::from_str(document).map_err(|source| RegistryError::CorruptData {
        key: key.to_owned(),
        source,
    })
}
