//! Forks and member exits.
//!
//! Exits never wait on governance: they take no pipeline permit and no
//! proposal or lineage lock, so a halted timelock or a frozen lineage cannot
//! hold a member in.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, Instrument};

use charter_exit::{ExitRequest, ExitType, ExportSummary, ForkEvaluator, ForkRecord};
use charter_store::{CharterStore, MemberDataStore};
use charter_types::{ExitId, ForkId, MemberId};

use crate::charter::Charter;
use crate::tracing_spans::exit_span;
use crate::NodeError;

impl<S: CharterStore + 'static> Charter<S> {
    // ── Forks ───────────────────────────────────────────────────────────

    /// Assess `content` against the current constitution and record the fork.
    pub async fn register_fork(
        &self,
        id: ForkId,
        name: impl Into<String>,
        parent: Option<ForkId>,
        content: &Value,
    ) -> Result<ForkRecord, NodeError> {
        let record = self
            .forks
            .register(id, name, parent, content, self.clock.now())?;
        self.gateway
            .put("put_fork", &record.id, &record, S::put_fork, S::get_fork)
            .await?;
        Ok(record)
    }

    /// Judge every fork against a new canonical version and store the
    /// assessments that changed.
    pub(crate) async fn refresh_forks(&self, canonical: &Value) -> Result<(), NodeError> {
        let changed = self.forks.set_canonical(ForkEvaluator::new(canonical))?;
        for record in &changed {
            self.gateway
                .put("put_fork", &record.id, record, S::put_fork, S::get_fork)
                .await?;
        }
        Ok(())
    }

    pub fn fork(&self, id: &ForkId) -> Result<ForkRecord, NodeError> {
        Ok(self.forks.get(id)?)
    }

    pub fn forks(&self) -> Result<Vec<ForkRecord>, NodeError> {
        Ok(self.forks.list()?)
    }

    /// The fork's ancestry, starting with the fork itself.
    pub fn fork_lineage(&self, id: &ForkId) -> Result<Vec<ForkId>, NodeError> {
        Ok(self.forks.lineage(id)?)
    }

    pub async fn add_fork_note(&self, id: &ForkId, note: impl Into<String>) -> Result<ForkRecord, NodeError> {
        self.forks.add_note(id, note)?;
        let record = self.forks.get(id)?;
        self.gateway
            .put("put_fork", &record.id, &record, S::put_fork, S::get_fork)
            .await?;
        Ok(record)
    }

    // ── Exits ───────────────────────────────────────────────────────────

    async fn persist_exit(&self, request: &ExitRequest) -> Result<(), NodeError> {
        self.gateway
            .put("put_exit", &request.id, request, S::put_exit, S::get_exit)
            .await?;
        Ok(())
    }

    pub async fn request_exit(&self, member: MemberId, exit_type: ExitType) -> Result<ExitRequest, NodeError> {
        let span = exit_span(member.as_str());
        async {
            let _member = self.locks.lock(&format!("exit:{member}")).await;
            let request = self
                .exits
                .request(member.clone(), exit_type, &self.forks, self.clock.now())?;
            self.persist_exit(&request).await?;
            Ok::<_, NodeError>(request)
        }
        .instrument(span)
        .await
    }

    /// Collect the member's data and mark the request ready to complete.
    pub async fn prepare_exit(&self, id: &ExitId) -> Result<ExportSummary, NodeError> {
        let request = self.exits.get(id)?;
        async {
            let _member = self.locks.lock(&format!("exit:{}", request.member)).await;
            let exits = Arc::clone(&self.exits);
            let (exit, now) = (id.clone(), self.clock.now());
            let summary = self
                .gateway
                .call("prepare_exit", move |s: &S| {
                    exits.prepare_export(&exit, s as &dyn MemberDataStore, now)
                })
                .await?;
            self.persist_exit(&self.exits.get(id)?).await?;
            Ok::<_, NodeError>(summary)
        }
        .instrument(exit_span(request.member.as_str()))
        .await
    }

    /// Finish an exit. A complete exit erases everything attributed to the
    /// member; a pause stops their participation until resumed.
    pub async fn complete_exit(&self, id: &ExitId) -> Result<ExitRequest, NodeError> {
        let request = self.exits.get(id)?;
        async {
            let _member = self.locks.lock(&format!("exit:{}", request.member)).await;
            let exits = Arc::clone(&self.exits);
            let (exit, now) = (id.clone(), self.clock.now());
            let done = self
                .gateway
                .call("complete_exit", move |s: &S| {
                    exits.complete(&exit, s as &dyn MemberDataStore, now)
                })
                .await?;
            self.persist_exit(&done).await?;
            self.metrics.exits_completed.inc();
            info!(exit = %done.id, exit_type = ?done.exit_type, "member exit completed");
            Ok::<_, NodeError>(done)
        }
        .instrument(exit_span(request.member.as_str()))
        .await
    }

    pub async fn cancel_exit(&self, id: &ExitId, by: &MemberId) -> Result<ExitRequest, NodeError> {
        let _member = self.locks.lock(&format!("exit:{by}")).await;
        let request = self.exits.cancel(id, by, self.clock.now())?;
        self.persist_exit(&request).await?;
        Ok(request)
    }

    pub fn exit_request(&self, id: &ExitId) -> Result<ExitRequest, NodeError> {
        Ok(self.exits.get(id)?)
    }

    pub fn is_paused(&self, member: &MemberId) -> Result<bool, NodeError> {
        Ok(self.exits.is_paused(member)?)
    }

    /// Bring a paused member back. Returns false if they were not paused.
    pub fn resume(&self, member: &MemberId) -> Result<bool, NodeError> {
        Ok(self.exits.resume(member)?)
    }
}
