//! Bounded-latency access to the synchronous store.
//!
//! Every call runs on the blocking pool under a deadline. Reads that fail
//! transiently are retried. A write that times out may already have landed,
//! so the gateway re-reads before deciding whether to apply it again.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn, Instrument};

use charter_store::{CharterStore, MemberItem, ReadDecision, RetryPolicy, StoreError, WriteDecision};
use charter_types::{Chamber, LineageId, MemberId, Roster};

use crate::metrics::CharterMetrics;
use crate::tracing_spans::store_span;
use crate::NodeError;

type Put<S, K> = fn(&S, &K, &[u8]) -> Result<(), StoreError>;
type Get<S, K> = fn(&S, &K) -> Result<Vec<u8>, StoreError>;
type List<S, K> = fn(&S) -> Result<Vec<K>, StoreError>;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub struct StoreGateway<S> {
    store: Arc<S>,
    timeout: Duration,
    policy: RetryPolicy,
    metrics: Arc<CharterMetrics>,
}

impl<S: CharterStore + 'static> StoreGateway<S> {
    pub fn new(store: Arc<S>, timeout: Duration, policy: RetryPolicy, metrics: Arc<CharterMetrics>) -> Self {
        Self {
            store,
            timeout,
            policy,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// One call on the blocking pool, under the deadline.
    async fn attempt<T, F>(&self, op: &str, write: bool, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(&store));
        let result = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StoreError::Backend(format!("{op} task failed: {join}"))),
            Err(_) => Err(StoreError::Timeout {
                op: op.to_string(),
                write,
            }),
        };
        if let Err(StoreError::Timeout { .. }) = &result {
            self.metrics.storage_timeouts.inc();
            warn!(op, write, "storage call timed out");
        }
        result
    }

    /// Run a read, retrying transient failures.
    pub async fn read<T, F>(&self, op: &str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: Fn(&S) -> Result<T, StoreError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        async {
            let mut attempt = 1;
            loop {
                let f = Arc::clone(&f);
                match self.attempt(op, false, move |s| f(s)).await {
                    Ok(v) => return Ok(v),
                    Err(e) => match self.policy.on_read_error(attempt, &e) {
                        ReadDecision::Retry => {
                            debug!(attempt, error = %e, "retrying storage read");
                            attempt += 1;
                        }
                        ReadDecision::GiveUp => return Err(e),
                    },
                }
            }
        }
        .instrument(store_span(op))
        .await
    }

    /// Run a write. When its outcome is unknown, `confirm` re-reads to see
    /// whether it landed; it is applied again only if it did not.
    pub async fn write<A, C>(&self, op: &str, apply: A, confirm: C) -> Result<(), StoreError>
    where
        A: Fn(&S) -> Result<(), StoreError> + Send + Sync + 'static,
        C: Fn(&S) -> Result<bool, StoreError> + Send + Sync + 'static,
    {
        let apply = Arc::new(apply);
        let confirm = Arc::new(confirm);
        async {
            let mut attempt = 1;
            loop {
                let a = Arc::clone(&apply);
                let err = match self.attempt(op, true, move |s| a(s)).await {
                    Ok(()) => return Ok(()),
                    Err(e) => e,
                };
                let confirmed = if err.is_transient() {
                    let c = Arc::clone(&confirm);
                    self.read(op, move |s| c(s)).await.ok()
                } else {
                    None
                };
                match self.policy.on_write_error(attempt, &err, confirmed) {
                    WriteDecision::Confirmed => {
                        debug!(attempt, "write landed despite error");
                        return Ok(());
                    }
                    WriteDecision::Reapply => {
                        warn!(attempt, error = %err, "re-applying storage write");
                        attempt += 1;
                    }
                    WriteDecision::GiveUp => return Err(err),
                }
            }
        }
        .instrument(store_span(op))
        .await
    }

    /// A compound operation that touches the store once and must not be
    /// replayed. Runs under the deadline without retries.
    pub async fn call<T, E, F>(&self, op: &str, f: F) -> Result<T, NodeError>
    where
        T: Send + 'static,
        E: Into<NodeError> + Send + 'static,
        F: FnOnce(&S) -> Result<T, E> + Send + 'static,
    {
        self.attempt(op, true, move |s| Ok(f(s)))
            .instrument(store_span(op))
            .await?
            .map_err(Into::into)
    }

    // ── Keyed entities ──────────────────────────────────────────────────

    async fn put_keyed<K>(&self, op: &'static str, key: K, data: Vec<u8>, put: Put<S, K>, get: Get<S, K>) -> Result<(), StoreError>
    where
        K: Send + Sync + 'static,
    {
        let key = Arc::new(key);
        let data = Arc::new(data);
        let (k, d) = (Arc::clone(&key), Arc::clone(&data));
        self.write(
            op,
            move |s| put(s, &k, &d),
            move |s| match get(s, &key) {
                Ok(stored) => Ok(stored == *data),
                Err(StoreError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            },
        )
        .await
    }

    /// Encode and store an entity under its key.
    pub async fn put<K, T>(&self, op: &'static str, key: &K, value: &T, put: Put<S, K>, get: Get<S, K>) -> Result<(), StoreError>
    where
        K: Clone + Send + Sync + 'static,
        T: Serialize,
    {
        let data = encode(value)?;
        self.put_keyed(op, key.clone(), data, put, get).await
    }

    /// Load and decode every entity in one collection.
    pub async fn load_all<K, T>(&self, op: &'static str, list: List<S, K>, get: Get<S, K>) -> Result<Vec<T>, StoreError>
    where
        K: Send + Sync + 'static,
        T: DeserializeOwned,
    {
        let keys = self.read(op, list).await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let key = Arc::new(key);
            let data = self.read(op, move |s| get(s, &key)).await?;
            out.push(decode(&data)?);
        }
        Ok(out)
    }

    // ── Collections with their own shape ────────────────────────────────

    pub async fn roster(&self, chamber: Chamber) -> Result<Roster, StoreError> {
        self.read("roster", move |s| s.roster(chamber)).await
    }

    pub async fn put_roster(&self, chamber: Chamber, roster: Roster) -> Result<(), StoreError> {
        let roster = Arc::new(roster);
        let expected = Arc::clone(&roster);
        self.write(
            "put_roster",
            move |s| s.put_roster(chamber, &roster),
            move |s| Ok(s.roster(chamber)? == *expected),
        )
        .await
    }

    pub async fn put_delegations(&self, data: Vec<u8>) -> Result<(), StoreError> {
        let data = Arc::new(data);
        let expected = Arc::clone(&data);
        self.write(
            "put_delegation_graph",
            move |s| s.put_delegation_graph(&data),
            move |s| Ok(s.get_delegation_graph()?.as_deref() == Some(expected.as_slice())),
        )
        .await
    }

    pub async fn delegations(&self) -> Result<Option<Vec<u8>>, StoreError> {
        self.read("get_delegation_graph", |s| s.get_delegation_graph()).await
    }

    /// Append a version and point the lineage's current marker at it.
    pub async fn append_version<T: Serialize>(&self, lineage: &LineageId, version: String, value: &T) -> Result<(), StoreError> {
        let data = Arc::new(encode(value)?);
        let lineage = Arc::new(lineage.clone());
        let version = Arc::new(version);
        let (l, v, d) = (Arc::clone(&lineage), Arc::clone(&version), Arc::clone(&data));
        let (cl, cv) = (Arc::clone(&lineage), Arc::clone(&version));
        self.write(
            "append_version",
            move |s| s.append_version(&l, &v, &d),
            move |s| match s.get_version(&cl, &cv) {
                Ok(stored) => Ok(stored == *data),
                Err(StoreError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            },
        )
        .await?;
        let (l, v) = (Arc::clone(&lineage), Arc::clone(&version));
        self.write(
            "set_current_version",
            move |s| s.set_current_version(&l, &v),
            move |s| Ok(s.current_version(&lineage)?.as_deref() == Some(version.as_str())),
        )
        .await
    }

    pub async fn load_version<T: DeserializeOwned>(&self, lineage: &LineageId, version: String) -> Result<T, StoreError> {
        let lineage = lineage.clone();
        let data = self
            .read("get_version", move |s| s.get_version(&lineage, &version))
            .await?;
        decode(&data)
    }

    pub async fn load_versions<T: DeserializeOwned>(&self, lineage: &LineageId) -> Result<Vec<T>, StoreError> {
        let lineage = lineage.clone();
        let all = self
            .read("list_versions", move |s| s.list_versions(&lineage))
            .await?;
        all.iter().map(|data| decode(data)).collect()
    }

    /// Attribute a piece of data to a member for later export or erasure.
    pub async fn put_member_item(&self, member: &MemberId, item: MemberItem) -> Result<(), StoreError> {
        let member = Arc::new(member.clone());
        let item = Arc::new(item);
        let (m, i) = (Arc::clone(&member), Arc::clone(&item));
        self.write(
            "put_member_item",
            move |s| s.put_member_item(&m, (*i).clone()),
            move |s| Ok(s.export_member(&member)?.items.contains(&item)),
        )
        .await
    }
}
