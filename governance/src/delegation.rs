//! Liquid delegation: entrust a fraction of voting weight to a representative.
//!
//! Supports:
//! - **Fractional delegation**: a member may split up to 1.0 of their weight
//!   across several delegates
//! - **Transitive resolution** (A→B→C carries A's share on to C)
//! - **Topic scoping**: topic edges replace a delegator's global edges when
//!   voting on that topic
//! - **Active windows** and explicit revocation
//!
//! Cycles are rejected when an edge is created. Resolution still guards
//! against them (and against chains longer than `max_depth`): a branch that
//! loops back contributes nothing.

use charter_types::{MemberId, Roster, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use crate::error::GovernanceError;

/// Slack for floating-point sums of delegated weight.
const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: MemberId,
    pub delegate: MemberId,
    /// `None` applies to every vote without a topic-specific delegation.
    pub topic: Option<String>,
    /// Fraction of the delegator's weight, in (0, 1].
    pub weight: f64,
    pub active_from: Timestamp,
    pub active_until: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
}

impl Delegation {
    pub fn new(delegator: impl Into<MemberId>, delegate: impl Into<MemberId>, weight: f64, now: Timestamp) -> Self {
        Self {
            delegator: delegator.into(),
            delegate: delegate.into(),
            topic: None,
            weight,
            active_from: now,
            active_until: None,
            revoked_at: None,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn until(mut self, until: Timestamp) -> Self {
        self.active_until = Some(until);
        self
    }

    pub fn is_active(&self, now: Timestamp) -> bool {
        self.revoked_at.is_none()
            && now >= self.active_from
            && self.active_until.map_or(true, |u| now < u)
    }

    /// Not revoked and not yet expired. Edges that only become active later
    /// still count for cycle and cap checks.
    fn is_live(&self, now: Timestamp) -> bool {
        self.revoked_at.is_none() && self.active_until.map_or(true, |u| now < u)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
struct EdgeKey {
    delegator: MemberId,
    topic: Option<String>,
    delegate: MemberId,
}

/// How a member's effective weight was assembled.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    /// Base stake kept plus everything received, before quadratic dampening.
    pub effective_weight: f64,
    /// Fraction of the member's own weight delegated away.
    pub delegated_away: f64,
    /// Every member whose weight reached this one, in id order.
    pub chain: Vec<MemberId>,
}

/// The delegation graph.
pub struct DelegationGraph {
    edges: BTreeMap<EdgeKey, Delegation>,
    /// Reverse index: delegate → keys of edges pointing at it.
    incoming: HashMap<MemberId, BTreeSet<EdgeKey>>,
    /// Maximum transitive chain depth followed during resolution.
    max_depth: usize,
}

impl DelegationGraph {
    pub fn new(max_depth: usize) -> Self {
        Self {
            edges: BTreeMap::new(),
            incoming: HashMap::new(),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Create or replace a delegation. Fails without mutating anything if the
    /// edge would close a cycle or push the delegator's total for the topic
    /// above 1.0.
    pub fn delegate(&mut self, delegation: Delegation, now: Timestamp) -> Result<(), GovernanceError> {
        if delegation.delegator == delegation.delegate {
            return Err(GovernanceError::SelfDelegation);
        }
        if !(delegation.weight > 0.0 && delegation.weight <= 1.0) {
            return Err(GovernanceError::InvalidDelegationWeight(delegation.weight));
        }
        let key = EdgeKey {
            delegator: delegation.delegator.clone(),
            topic: delegation.topic.clone(),
            delegate: delegation.delegate.clone(),
        };

        let total: f64 = self
            .edges
            .iter()
            .filter(|(k, d)| {
                **k != key
                    && k.delegator == key.delegator
                    && k.topic == key.topic
                    && d.is_live(now)
            })
            .map(|(_, d)| d.weight)
            .sum::<f64>()
            + delegation.weight;
        if total > 1.0 + WEIGHT_EPSILON {
            return Err(GovernanceError::DelegationCapExceeded {
                delegator: key.delegator,
                total,
            });
        }

        if self.would_cycle(&delegation, now) {
            return Err(GovernanceError::DelegationCycle {
                from: key.delegator,
                to: key.delegate,
            });
        }

        info!(
            from = %key.delegator,
            to = %key.delegate,
            topic = ?key.topic,
            weight = delegation.weight,
            "delegation recorded"
        );
        self.incoming
            .entry(key.delegate.clone())
            .or_default()
            .insert(key.clone());
        self.edges.insert(key, delegation);
        Ok(())
    }

    /// Revoke an active delegation. The record is kept for history.
    pub fn revoke(
        &mut self,
        from: &MemberId,
        to: &MemberId,
        topic: Option<&str>,
        now: Timestamp,
    ) -> Result<(), GovernanceError> {
        let key = EdgeKey {
            delegator: from.clone(),
            topic: topic.map(str::to_string),
            delegate: to.clone(),
        };
        match self.edges.get_mut(&key) {
            Some(d) if d.revoked_at.is_none() => {
                d.revoked_at = Some(now);
                info!(from = %from, to = %to, topic = ?topic, "delegation revoked");
                Ok(())
            }
            _ => Err(GovernanceError::DelegationNotFound {
                from: from.clone(),
                to: to.clone(),
            }),
        }
    }

    /// The edges a delegator's weight follows when voting on `topic`.
    ///
    /// Topic edges take priority: if the delegator has any for this topic,
    /// their global edges are ignored.
    fn outgoing_where<'a>(
        &'a self,
        delegator: &MemberId,
        topic: Option<&str>,
        keep: impl Fn(&Delegation) -> bool + 'a,
    ) -> Vec<&'a Delegation> {
        let of_scope = |scope: Option<&str>| -> Vec<&'a Delegation> {
            self.edges
                .iter()
                .filter(|(k, d)| {
                    &k.delegator == delegator && k.topic.as_deref() == scope && keep(d)
                })
                .map(|(_, d)| d)
                .collect()
        };
        if let Some(t) = topic {
            let scoped = of_scope(Some(t));
            if !scoped.is_empty() {
                return scoped;
            }
        }
        of_scope(None)
    }

    /// Active delegations from a member in a voting context.
    pub fn outgoing(&self, delegator: &MemberId, topic: Option<&str>, now: Timestamp) -> Vec<&Delegation> {
        self.outgoing_where(delegator, topic, move |d| d.is_active(now))
    }

    /// Total fraction a member has delegated away in a voting context.
    pub fn delegated_away(&self, member: &MemberId, topic: Option<&str>, now: Timestamp) -> f64 {
        self.outgoing(member, topic, now)
            .iter()
            .map(|d| d.weight)
            .sum::<f64>()
            .min(1.0)
    }

    /// Whether adding `candidate` would let its delegate reach its delegator
    /// in any voting context the edge takes part in.
    fn would_cycle(&self, candidate: &Delegation, now: Timestamp) -> bool {
        let mut contexts: BTreeSet<Option<String>> = BTreeSet::new();
        match &candidate.topic {
            Some(t) => {
                contexts.insert(Some(t.clone()));
            }
            None => {
                contexts.insert(None);
                for k in self.edges.keys() {
                    if let Some(t) = &k.topic {
                        contexts.insert(Some(t.clone()));
                    }
                }
            }
        }
        contexts.into_iter().any(|ctx| {
            let ctx = ctx.as_deref();
            let chosen = self.outgoing_where(&candidate.delegator, ctx, move |d| d.is_live(now));
            // A global edge does not apply in a topic where the delegator has
            // topic-specific edges.
            let applies = match (&candidate.topic, ctx) {
                (None, Some(_)) => chosen.iter().all(|d| d.topic.is_none()),
                _ => true,
            };
            applies && self.reaches(&candidate.delegate, &candidate.delegator, ctx, now)
        })
    }

    fn reaches(&self, from: &MemberId, target: &MemberId, topic: Option<&str>, now: Timestamp) -> bool {
        let mut stack = vec![from.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if &current == target {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            for d in self.outgoing_where(&current, topic, move |d| d.is_live(now)) {
                stack.push(d.delegate.clone());
            }
        }
        false
    }

    /// Resolve a member's effective weight in a voting context.
    ///
    /// `effective = (1 - delegated_away) * (base + received)`, where each
    /// delegator passes on `edge.weight * (base + received)` of their own.
    /// Base stake comes from `roster`; non-members contribute nothing.
    pub fn resolve(&self, member: &MemberId, roster: &Roster, topic: Option<&str>, now: Timestamp) -> Resolution {
        let mut chain = BTreeSet::new();
        let mut path = HashSet::new();
        path.insert(member.clone());
        let received = self.received(member, roster, topic, now, &mut path, &mut chain, 0);
        let delegated_away = self.delegated_away(member, topic, now);
        let effective_weight = (1.0 - delegated_away) * (roster.weight_of(member) + received);
        debug!(member = %member, effective_weight, received, delegated_away, "resolved weight");
        Resolution {
            effective_weight,
            delegated_away,
            chain: chain.into_iter().collect(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn received(
        &self,
        member: &MemberId,
        roster: &Roster,
        topic: Option<&str>,
        now: Timestamp,
        path: &mut HashSet<MemberId>,
        chain: &mut BTreeSet<MemberId>,
        depth: usize,
    ) -> f64 {
        if depth >= self.max_depth {
            return 0.0;
        }
        let Some(keys) = self.incoming.get(member) else {
            return 0.0;
        };
        let mut total = 0.0;
        let mut delegators: BTreeSet<&MemberId> = BTreeSet::new();
        for key in keys {
            delegators.insert(&key.delegator);
        }
        for delegator in delegators {
            // The edge that counts is the one the delegator's context selects.
            let share: f64 = self
                .outgoing(delegator, topic, now)
                .iter()
                .filter(|d| &d.delegate == member)
                .map(|d| d.weight)
                .sum();
            if share <= 0.0 {
                continue;
            }
            if !path.insert(delegator.clone()) {
                // Cycle: this branch contributes nothing.
                continue;
            }
            let upstream = self.received(delegator, roster, topic, now, path, chain, depth + 1);
            path.remove(delegator);
            chain.insert(delegator.clone());
            total += share * (roster.weight_of(delegator) + upstream);
        }
        total
    }

    /// Every recorded delegation, revoked ones included.
    pub fn delegations(&self) -> impl Iterator<Item = &Delegation> {
        self.edges.values()
    }
}

/// Serializable snapshot of the delegation graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegationSnapshot {
    pub delegations: Vec<Delegation>,
    pub max_depth: usize,
}

impl DelegationGraph {
    /// Serialize the graph for persistence.
    pub fn save_state(&self) -> Result<Vec<u8>, GovernanceError> {
        let snapshot = DelegationSnapshot {
            delegations: self.edges.values().cloned().collect(),
            max_depth: self.max_depth,
        };
        bincode::serialize(&snapshot).map_err(|e| GovernanceError::DelegationState(e.to_string()))
    }

    /// Restore the graph from serialized bytes.
    pub fn load_state(data: &[u8]) -> Result<Self, GovernanceError> {
        let snapshot: DelegationSnapshot =
            bincode::deserialize(data).map_err(|e| GovernanceError::DelegationState(e.to_string()))?;
        let mut graph = Self::new(snapshot.max_depth);
        for d in snapshot.delegations {
            let key = EdgeKey {
                delegator: d.delegator.clone(),
                topic: d.topic.clone(),
                delegate: d.delegate.clone(),
            };
            graph
                .incoming
                .entry(key.delegate.clone())
                .or_default()
                .insert(key.clone());
            graph.edges.insert(key, d);
        }
        Ok(graph)
    }
}

impl Default for DelegationGraph {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(name: &str) -> MemberId {
        MemberId::new(name)
    }

    fn t(secs: u64) -> Timestamp {
        Timestamp::new(secs)
    }

    fn roster(names: &[&str]) -> Roster {
        Roster::uniform(names.iter().copied())
    }

    fn full(from: &str, to: &str) -> Delegation {
        Delegation::new(from, to, 1.0, t(0))
    }

    // ── Transitive delegation ────────────────────────────────────────────

    #[test]
    fn test_simple_delegation() {
        let mut g = DelegationGraph::new(10);
        g.delegate(full("a", "b"), t(0)).unwrap();
        let r = roster(&["a", "b"]);
        assert_eq!(g.resolve(&m("b"), &r, None, t(1)).effective_weight, 2.0);
        assert_eq!(g.resolve(&m("a"), &r, None, t(1)).effective_weight, 0.0);
    }

    #[test]
    fn test_transitive_chain_a_b_c() {
        let mut g = DelegationGraph::new(10);
        g.delegate(full("a", "b"), t(0)).unwrap();
        g.delegate(full("b", "c"), t(0)).unwrap();
        let r = roster(&["a", "b", "c"]);
        let res = g.resolve(&m("c"), &r, None, t(1));
        assert_eq!(res.effective_weight, 3.0);
        assert_eq!(res.chain, vec![m("a"), m("b")]);
        assert_eq!(g.resolve(&m("b"), &r, None, t(1)).effective_weight, 0.0);
    }

    #[test]
    fn test_fractional_split() {
        let mut g = DelegationGraph::new(10);
        g.delegate(Delegation::new("a", "b", 0.25, t(0)), t(0)).unwrap();
        g.delegate(Delegation::new("a", "c", 0.5, t(0)), t(0)).unwrap();
        let r = Roster::new().with("a", 4.0).with("b", 1.0).with("c", 1.0);
        assert_eq!(g.resolve(&m("a"), &r, None, t(1)).effective_weight, 1.0);
        assert_eq!(g.resolve(&m("b"), &r, None, t(1)).effective_weight, 2.0);
        assert_eq!(g.resolve(&m("c"), &r, None, t(1)).effective_weight, 3.0);
    }

    #[test]
    fn test_cap_exceeded_rejected() {
        let mut g = DelegationGraph::new(10);
        g.delegate(Delegation::new("a", "b", 0.7, t(0)), t(0)).unwrap();
        let err = g.delegate(Delegation::new("a", "c", 0.4, t(0)), t(0));
        assert!(matches!(err, Err(GovernanceError::DelegationCapExceeded { .. })));
        // Replacing the same edge does not double count.
        g.delegate(Delegation::new("a", "b", 0.9, t(0)), t(0)).unwrap();
    }

    #[test]
    fn test_cycle_rejected_before_mutation() {
        let mut g = DelegationGraph::new(10);
        g.delegate(full("a", "b"), t(0)).unwrap();
        g.delegate(full("b", "c"), t(0)).unwrap();
        let before = g.delegations().count();
        let err = g.delegate(full("c", "a"), t(0));
        assert!(matches!(err, Err(GovernanceError::DelegationCycle { .. })));
        assert_eq!(g.delegations().count(), before);
    }

    #[test]
    fn test_topic_cycle_is_per_topic() {
        let mut g = DelegationGraph::new(10);
        g.delegate(full("a", "b").with_topic("economy"), t(0)).unwrap();
        // b→a in another topic is fine.
        g.delegate(full("b", "a").with_topic("privacy"), t(0)).unwrap();
        assert!(g.delegate(full("b", "a").with_topic("economy"), t(0)).is_err());
    }

    #[test]
    fn test_global_edge_cycling_through_topic_edge_rejected() {
        let mut g = DelegationGraph::new(10);
        g.delegate(full("a", "b").with_topic("economy"), t(0)).unwrap();
        // In the economy context b's global edge to a would close a→b→a.
        assert!(g.delegate(full("b", "a"), t(0)).is_err());
    }

    #[test]
    fn test_max_depth_limits_resolution() {
        let mut g = DelegationGraph::new(3);
        let names: Vec<String> = (0..6).map(|i| format!("w{i}")).collect();
        for i in 0..5 {
            g.delegate(full(names[i].as_str(), names[i + 1].as_str()), t(0)).unwrap();
        }
        let r = Roster::uniform(names.iter().map(String::as_str));
        // w5 receives w4, w3, w2 (depth 3) but nothing beyond.
        assert_eq!(g.resolve(&m("w5"), &r, None, t(1)).effective_weight, 4.0);
    }

    #[test]
    fn test_self_delegation_rejected() {
        let mut g = DelegationGraph::new(10);
        assert!(matches!(
            g.delegate(full("a", "a"), t(0)),
            Err(GovernanceError::SelfDelegation)
        ));
    }

    #[test]
    fn test_invalid_weight_rejected() {
        let mut g = DelegationGraph::new(10);
        for w in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(g.delegate(Delegation::new("a", "b", w, t(0)), t(0)).is_err());
        }
    }

    #[test]
    fn test_revoke_and_window() {
        let mut g = DelegationGraph::new(10);
        g.delegate(full("a", "b").until(t(100)), t(0)).unwrap();
        let r = roster(&["a", "b"]);
        assert_eq!(g.resolve(&m("b"), &r, None, t(50)).effective_weight, 2.0);
        assert_eq!(g.resolve(&m("b"), &r, None, t(100)).effective_weight, 1.0);

        g.delegate(full("a", "c"), t(100)).unwrap();
        g.revoke(&m("a"), &m("c"), None, t(101)).unwrap();
        assert_eq!(g.resolve(&m("a"), &r, None, t(102)).effective_weight, 1.0);
        assert!(g.revoke(&m("a"), &m("c"), None, t(103)).is_err());
    }

    // ── Scoped delegation ────────────────────────────────────────────────

    #[test]
    fn test_topic_overrides_global() {
        let mut g = DelegationGraph::new(10);
        g.delegate(full("a", "global"), t(0)).unwrap();
        g.delegate(full("a", "expert").with_topic("privacy"), t(0)).unwrap();
        let r = roster(&["a", "global", "expert"]);
        assert_eq!(g.resolve(&m("expert"), &r, Some("privacy"), t(1)).effective_weight, 2.0);
        assert_eq!(g.resolve(&m("global"), &r, Some("privacy"), t(1)).effective_weight, 1.0);
        assert_eq!(g.resolve(&m("global"), &r, Some("economy"), t(1)).effective_weight, 2.0);
        assert_eq!(g.resolve(&m("global"), &r, None, t(1)).effective_weight, 2.0);
    }

    #[test]
    fn test_non_members_contribute_nothing() {
        let mut g = DelegationGraph::new(10);
        g.delegate(full("outsider", "b"), t(0)).unwrap();
        let r = roster(&["b"]);
        assert_eq!(g.resolve(&m("b"), &r, None, t(1)).effective_weight, 1.0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut g = DelegationGraph::new(7);
        g.delegate(full("a", "b"), t(0)).unwrap();
        g.delegate(Delegation::new("c", "b", 0.5, t(0)).with_topic("x"), t(0)).unwrap();
        let restored = DelegationGraph::load_state(&g.save_state().unwrap()).unwrap();
        assert_eq!(restored.max_depth(), 7);
        let r = roster(&["a", "b", "c"]);
        assert_eq!(
            restored.resolve(&m("b"), &r, Some("x"), t(1)),
            g.resolve(&m("b"), &r, Some("x"), t(1))
        );
        assert!(DelegationGraph::load_state(b"garbage").is_err());
    }

    #[test]
    fn test_default_max_depth() {
        assert_eq!(DelegationGraph::default().max_depth(), 10);
    }
}
