//! In-memory storage for tests.
//!
//! Implements every storage trait the engine consumes. Faults can be
//! injected to exercise timeout and retry paths: reads that time out, writes
//! that time out before or after they land, and fixed per-call latency.

use charter_store::{
    DelegationStore, ExitStore, ForkStore, MemberDataStore, MemberExport, MemberItem,
    ProposalStore, RosterStore, RulingStore, StoreError, TimelockStore, VersionStore, VoteStore,
};
use charter_types::{Chamber, ExitId, ForkId, LineageId, MemberId, ProposalId, Roster, RulingId, SessionId};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Table = BTreeMap<String, Vec<u8>>;

#[derive(Default)]
struct Lineage {
    versions: Vec<(String, Vec<u8>)>,
    current: Option<String>,
}

/// An in-memory store for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullStore {
    tables: Mutex<HashMap<&'static str, Table>>,
    lineages: Mutex<HashMap<LineageId, Lineage>>,
    delegation_graph: Mutex<Option<Vec<u8>>>,
    rosters: Mutex<HashMap<Chamber, Roster>>,
    members: Mutex<HashMap<MemberId, Vec<MemberItem>>>,
    failing_reads: AtomicU32,
    failing_writes: AtomicU32,
    failing_writes_after_apply: AtomicU32,
    latency_ms: AtomicU64,
}

const PROPOSALS: &str = "proposals";
const SESSIONS: &str = "sessions";
const TIMELOCKS: &str = "timelocks";
const RULINGS: &str = "rulings";
const FORKS: &str = "forks";
const EXITS: &str = "exits";

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` reads fail with a read timeout.
    pub fn fail_next_reads(&self, n: u32) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// The next `n` writes fail with a write timeout without landing.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// The next `n` writes land, then report a write timeout anyway.
    pub fn fail_next_writes_after_apply(&self, n: u32) {
        self.failing_writes_after_apply.store(n, Ordering::SeqCst);
    }

    /// Every call blocks the calling thread for this long.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_roster(&self, chamber: Chamber, roster: Roster) {
        self.rosters.lock().unwrap().insert(chamber, roster);
    }

    /// Overwrite a stored version's bytes in place, bypassing append-only
    /// rules. Simulates tampering with the backing store.
    pub fn tamper_version(&self, lineage: &LineageId, version: &str, data: &[u8]) -> bool {
        let mut lineages = self.lineages.lock().unwrap();
        match lineages
            .get_mut(lineage)
            .and_then(|l| l.versions.iter_mut().find(|(v, _)| v == version))
        {
            Some((_, stored)) => {
                *stored = data.to_vec();
                true
            }
            None => false,
        }
    }

    fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }

    fn before_read(&self, op: &str) -> Result<(), StoreError> {
        self.simulate_latency();
        if take_one(&self.failing_reads) {
            return Err(StoreError::Timeout {
                op: op.to_string(),
                write: false,
            });
        }
        Ok(())
    }

    /// Runs `apply` subject to write fault injection.
    fn write<T>(
        &self,
        op: &str,
        apply: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.simulate_latency();
        let timeout = || StoreError::Timeout {
            op: op.to_string(),
            write: true,
        };
        if take_one(&self.failing_writes) {
            return Err(timeout());
        }
        let out = apply()?;
        if take_one(&self.failing_writes_after_apply) {
            return Err(timeout());
        }
        Ok(out)
    }

    fn put(&self, table: &'static str, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.write(table, || {
            self.tables
                .lock()
                .unwrap()
                .entry(table)
                .or_default()
                .insert(key.to_string(), data.to_vec());
            Ok(())
        })
    }

    fn get(&self, table: &'static str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.before_read(table)?;
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|t| t.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{table}/{key}")))
    }

    fn keys<K: From<String>>(&self, table: &'static str) -> Result<Vec<K>, StoreError> {
        self.before_read(table)?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.keys().cloned().map(K::from).collect())
            .unwrap_or_default())
    }
}

impl ProposalStore for NullStore {
    fn put_proposal(&self, id: &ProposalId, data: &[u8]) -> Result<(), StoreError> {
        self.put(PROPOSALS, id.as_str(), data)
    }

    fn get_proposal(&self, id: &ProposalId) -> Result<Vec<u8>, StoreError> {
        self.get(PROPOSALS, id.as_str())
    }

    fn list_proposals(&self) -> Result<Vec<ProposalId>, StoreError> {
        self.keys(PROPOSALS)
    }
}

impl VoteStore for NullStore {
    fn put_session(&self, id: &SessionId, data: &[u8]) -> Result<(), StoreError> {
        self.put(SESSIONS, id.as_str(), data)
    }

    fn get_session(&self, id: &SessionId) -> Result<Vec<u8>, StoreError> {
        self.get(SESSIONS, id.as_str())
    }

    fn list_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        self.keys(SESSIONS)
    }
}

impl TimelockStore for NullStore {
    fn put_timelock(&self, id: &ProposalId, data: &[u8]) -> Result<(), StoreError> {
        self.put(TIMELOCKS, id.as_str(), data)
    }

    fn get_timelock(&self, id: &ProposalId) -> Result<Vec<u8>, StoreError> {
        self.get(TIMELOCKS, id.as_str())
    }

    fn list_timelocks(&self) -> Result<Vec<ProposalId>, StoreError> {
        self.keys(TIMELOCKS)
    }
}

impl RulingStore for NullStore {
    fn put_ruling(&self, id: &RulingId, data: &[u8]) -> Result<(), StoreError> {
        self.put(RULINGS, id.as_str(), data)
    }

    fn get_ruling(&self, id: &RulingId) -> Result<Vec<u8>, StoreError> {
        self.get(RULINGS, id.as_str())
    }

    fn list_rulings(&self) -> Result<Vec<RulingId>, StoreError> {
        self.keys(RULINGS)
    }
}

impl ForkStore for NullStore {
    fn put_fork(&self, id: &ForkId, data: &[u8]) -> Result<(), StoreError> {
        self.put(FORKS, id.as_str(), data)
    }

    fn get_fork(&self, id: &ForkId) -> Result<Vec<u8>, StoreError> {
        self.get(FORKS, id.as_str())
    }

    fn list_forks(&self) -> Result<Vec<ForkId>, StoreError> {
        self.keys(FORKS)
    }
}

impl ExitStore for NullStore {
    fn put_exit(&self, id: &ExitId, data: &[u8]) -> Result<(), StoreError> {
        self.put(EXITS, id.as_str(), data)
    }

    fn get_exit(&self, id: &ExitId) -> Result<Vec<u8>, StoreError> {
        self.get(EXITS, id.as_str())
    }

    fn list_exits(&self) -> Result<Vec<ExitId>, StoreError> {
        self.keys(EXITS)
    }
}

impl DelegationStore for NullStore {
    fn put_delegation_graph(&self, data: &[u8]) -> Result<(), StoreError> {
        self.write("delegation_graph", || {
            *self.delegation_graph.lock().unwrap() = Some(data.to_vec());
            Ok(())
        })
    }

    fn get_delegation_graph(&self) -> Result<Option<Vec<u8>>, StoreError> {
        self.before_read("delegation_graph")?;
        Ok(self.delegation_graph.lock().unwrap().clone())
    }
}

impl VersionStore for NullStore {
    fn append_version(
        &self,
        lineage: &LineageId,
        version: &str,
        data: &[u8],
    ) -> Result<(), StoreError> {
        self.write("append_version", || {
            let mut lineages = self.lineages.lock().unwrap();
            let entry = lineages.entry(lineage.clone()).or_default();
            if entry.versions.iter().any(|(v, _)| v == version) {
                return Err(StoreError::Duplicate(format!("{lineage}@{version}")));
            }
            entry.versions.push((version.to_string(), data.to_vec()));
            Ok(())
        })
    }

    fn get_version(&self, lineage: &LineageId, version: &str) -> Result<Vec<u8>, StoreError> {
        self.before_read("get_version")?;
        self.lineages
            .lock()
            .unwrap()
            .get(lineage)
            .and_then(|l| l.versions.iter().find(|(v, _)| v == version))
            .map(|(_, data)| data.clone())
            .ok_or_else(|| StoreError::NotFound(format!("{lineage}@{version}")))
    }

    fn list_versions(&self, lineage: &LineageId) -> Result<Vec<Vec<u8>>, StoreError> {
        self.before_read("list_versions")?;
        Ok(self
            .lineages
            .lock()
            .unwrap()
            .get(lineage)
            .map(|l| l.versions.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default())
    }

    fn set_current_version(&self, lineage: &LineageId, version: &str) -> Result<(), StoreError> {
        self.write("set_current_version", || {
            let mut lineages = self.lineages.lock().unwrap();
            let entry = lineages
                .get_mut(lineage)
                .filter(|l| l.versions.iter().any(|(v, _)| v == version))
                .ok_or_else(|| StoreError::NotFound(format!("{lineage}@{version}")))?;
            entry.current = Some(version.to_string());
            Ok(())
        })
    }

    fn current_version(&self, lineage: &LineageId) -> Result<Option<String>, StoreError> {
        self.before_read("current_version")?;
        Ok(self
            .lineages
            .lock()
            .unwrap()
            .get(lineage)
            .and_then(|l| l.current.clone()))
    }
}

impl RosterStore for NullStore {
    fn roster(&self, chamber: Chamber) -> Result<Roster, StoreError> {
        self.before_read("roster")?;
        Ok(self
            .rosters
            .lock()
            .unwrap()
            .get(&chamber)
            .cloned()
            .unwrap_or_default())
    }

    fn put_roster(&self, chamber: Chamber, roster: &Roster) -> Result<(), StoreError> {
        self.write("put_roster", || {
            self.rosters.lock().unwrap().insert(chamber, roster.clone());
            Ok(())
        })
    }
}

impl MemberDataStore for NullStore {
    fn put_member_item(&self, member: &MemberId, item: MemberItem) -> Result<(), StoreError> {
        self.write("put_member_item", || {
            let mut members = self.members.lock().unwrap();
            let items = members.entry(member.clone()).or_default();
            items.retain(|i| !(i.kind == item.kind && i.key == item.key));
            items.push(item);
            Ok(())
        })
    }

    fn export_member(&self, member: &MemberId) -> Result<MemberExport, StoreError> {
        self.before_read("export_member")?;
        Ok(MemberExport {
            items: self
                .members
                .lock()
                .unwrap()
                .get(member)
                .cloned()
                .unwrap_or_default(),
        })
    }

    fn erase_member(&self, member: &MemberId) -> Result<usize, StoreError> {
        self.write("erase_member", || {
            Ok(self
                .members
                .lock()
                .unwrap()
                .remove(member)
                .map(|items| items.len())
                .unwrap_or(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_store::{CharterStore, MemberItemKind};

    fn assert_charter_store<S: CharterStore>(_: &S) {}

    #[test]
    fn implements_every_trait() {
        assert_charter_store(&NullStore::new());
    }

    #[test]
    fn test_put_get_proposal() {
        let store = NullStore::new();
        let id = ProposalId::new("p-1");
        store.put_proposal(&id, b"proposal").unwrap();
        assert_eq!(store.get_proposal(&id).unwrap(), b"proposal");
        assert_eq!(store.list_proposals().unwrap(), vec![id]);
    }

    #[test]
    fn test_missing_proposal() {
        let store = NullStore::new();
        assert!(matches!(
            store.get_proposal(&ProposalId::new("nope")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_versions_append_only_in_order() {
        let store = NullStore::new();
        let lineage = LineageId::new("main");
        store.append_version(&lineage, "1.0.0", b"a").unwrap();
        store.append_version(&lineage, "1.1.0", b"b").unwrap();
        assert!(matches!(
            store.append_version(&lineage, "1.0.0", b"c"),
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(
            store.list_versions(&lineage).unwrap(),
            vec![b"a".to_vec(), b"b".to_vec()]
        );
        store.set_current_version(&lineage, "1.1.0").unwrap();
        assert_eq!(
            store.current_version(&lineage).unwrap().as_deref(),
            Some("1.1.0")
        );
        assert!(store.set_current_version(&lineage, "9.9.9").is_err());
    }

    #[test]
    fn test_read_faults_are_consumed() {
        let store = NullStore::new();
        let id = ProposalId::new("p");
        store.put_proposal(&id, b"x").unwrap();
        store.fail_next_reads(2);
        assert!(store.get_proposal(&id).unwrap_err().is_transient());
        assert!(store.get_proposal(&id).is_err());
        assert!(store.get_proposal(&id).is_ok());
    }

    #[test]
    fn test_write_after_apply_fault_lands() {
        let store = NullStore::new();
        let id = ProposalId::new("p");
        store.fail_next_writes_after_apply(1);
        let err = store.put_proposal(&id, b"x").unwrap_err();
        assert!(err.is_ambiguous_write());
        assert_eq!(store.get_proposal(&id).unwrap(), b"x");
    }

    #[test]
    fn test_write_fault_does_not_land() {
        let store = NullStore::new();
        let id = ProposalId::new("p");
        store.fail_next_writes(1);
        assert!(store.put_proposal(&id, b"x").is_err());
        assert!(store.get_proposal(&id).is_err());
    }

    #[test]
    fn test_member_export_and_erase() {
        let store = NullStore::new();
        let alice = MemberId::new("alice");
        let item = |kind, key: &str| MemberItem {
            kind,
            key: key.into(),
            data: vec![1],
        };
        store
            .put_member_item(&alice, item(MemberItemKind::Profile, "profile"))
            .unwrap();
        store
            .put_member_item(&alice, item(MemberItemKind::Vote, "p-1:users"))
            .unwrap();
        store
            .put_member_item(&alice, item(MemberItemKind::Vote, "p-1:users"))
            .unwrap();
        let export = store.export_member(&alice).unwrap();
        assert_eq!(export.items.len(), 2);
        assert_eq!(export.count(MemberItemKind::Vote), 1);
        assert_eq!(store.erase_member(&alice).unwrap(), 2);
        assert!(store.export_member(&alice).unwrap().items.is_empty());
    }
}
