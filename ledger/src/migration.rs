//! Migrations: ordered content transformations with automatic rollback.
//!
//! Each step may carry a precondition and a rollback. The engine snapshots
//! the content before every step. When a step fails, the steps already
//! applied are rolled back in reverse order and the content is checked
//! against each snapshot; a rollback that does not restore its snapshot is
//! reported as [`LedgerError::RollbackFailed`].

use charter_consti::content::{append_to_set, get_path, remove_path, set_path};
use charter_consti::{ChangeKind, Proposal};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::diff::{diff, VersionDiff};
use crate::error::LedgerError;

type Transform = dyn Fn(&mut Value) -> Result<(), String> + Send + Sync;
type Check = dyn Fn(&Value) -> Result<(), String> + Send + Sync;

/// A named closure for transformations the built-in actions cannot express.
#[derive(Clone)]
pub struct CustomTransform {
    pub name: String,
    apply: Arc<Transform>,
}

impl CustomTransform {
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&mut Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Arc::new(apply),
        }
    }
}

impl fmt::Debug for CustomTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomTransform").field("name", &self.name).finish()
    }
}

#[derive(Clone)]
pub struct CustomCheck {
    pub name: String,
    check: Arc<Check>,
}

impl CustomCheck {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

impl fmt::Debug for CustomCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCheck").field("name", &self.name).finish()
    }
}

#[derive(Clone, Debug)]
pub enum StepAction {
    Set { path: String, value: Value },
    Remove { path: String },
    AppendToSet { path: String, item: Value },
    Custom(CustomTransform),
}

impl StepAction {
    fn apply(&self, content: &mut Value) -> Result<(), String> {
        match self {
            Self::Set { path, value } => set_path(content, path, value.clone())
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Self::Remove { path } => match remove_path(content, path) {
                Ok(Some(_)) => Ok(()),
                Ok(None) => Err(format!("nothing to remove at {path}")),
                Err(e) => Err(e.to_string()),
            },
            Self::AppendToSet { path, item } => append_to_set(content, path, item.clone())
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Self::Custom(t) => (t.apply)(content),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Precondition {
    ValueEquals { path: String, value: Value },
    PathExists { path: String },
    PathAbsent { path: String },
    Custom(CustomCheck),
}

impl Precondition {
    fn check(&self, content: &Value) -> Result<(), String> {
        match self {
            Self::ValueEquals { path, value } => match get_path(content, path) {
                Some(found) if found == value => Ok(()),
                Some(found) => Err(format!("{path} is {found}, expected {value}")),
                None => Err(format!("{path} is missing, expected {value}")),
            },
            Self::PathExists { path } => get_path(content, path)
                .map(|_| ())
                .ok_or_else(|| format!("{path} is missing")),
            Self::PathAbsent { path } => match get_path(content, path) {
                None => Ok(()),
                Some(_) => Err(format!("{path} already exists")),
            },
            Self::Custom(c) => (c.check)(content),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Rollback {
    /// Put back the snapshot taken before the step ran.
    RestoreSnapshot,
    Action(StepAction),
    Custom(CustomTransform),
}

#[derive(Clone, Debug)]
pub struct MigrationStep {
    pub name: String,
    pub action: StepAction,
    pub precondition: Option<Precondition>,
    pub rollback: Rollback,
}

impl MigrationStep {
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            precondition: None,
            rollback: Rollback::RestoreSnapshot,
        }
    }

    pub fn requires(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn rollback_with(mut self, rollback: Rollback) -> Self {
        self.rollback = rollback;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct MigrationPlan {
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn new(steps: Vec<MigrationStep>) -> Self {
        Self { steps }
    }

    /// One step per proposal change. A change with a null new value removes
    /// its target; anything else sets it. Each step requires the target to
    /// still hold the value the proposal was written against.
    pub fn from_proposal(proposal: &Proposal) -> Self {
        let steps = proposal
            .changes()
            .iter()
            .enumerate()
            .map(|(i, change)| {
                let path = change.target.clone();
                let action = if change.new_value.is_null() {
                    StepAction::Remove { path: path.clone() }
                } else {
                    StepAction::Set {
                        path: path.clone(),
                        value: change.new_value.clone(),
                    }
                };
                let precondition = if change.old_value.is_null() {
                    Precondition::PathAbsent { path }
                } else {
                    Precondition::ValueEquals {
                        path,
                        value: change.old_value.clone(),
                    }
                };
                let kind = match change.kind {
                    ChangeKind::InvariantModify | ChangeKind::InvariantAdd => "invariant",
                    ChangeKind::FeatureAdd | ChangeKind::FeatureModify => "feature",
                    ChangeKind::GovernanceModify => "governance",
                    ChangeKind::Documentation => "documentation",
                };
                MigrationStep::new(format!("{}:{kind}:{}", i + 1, change.target), action).requires(precondition)
            })
            .collect();
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MigrationOutcome {
    pub content: Value,
    pub steps_applied: usize,
    pub diff: VersionDiff,
}

/// Run a plan against a copy of `content`. The input is never modified.
pub fn run(plan: &MigrationPlan, content: &Value) -> Result<MigrationOutcome, LedgerError> {
    let mut working = content.clone();
    let mut snapshots: Vec<Value> = Vec::with_capacity(plan.len());

    for (index, step) in plan.steps.iter().enumerate() {
        let result = step
            .precondition
            .as_ref()
            .map_or(Ok(()), |p| p.check(&working).map_err(|e| format!("precondition: {e}")))
            .and_then(|()| {
                let before = working.clone();
                let applied = step.action.apply(&mut working);
                if applied.is_err() {
                    working = before.clone();
                }
                snapshots.push(before);
                applied
            });

        if let Err(reason) = result {
            // The failing step's own snapshot is only pushed if it got as far as running.
            if snapshots.len() > index {
                snapshots.pop();
            }
            warn!(index, step = %step.name, %reason, "migration step failed, rolling back");
            let rolled_back = roll_back(plan, &mut working, &snapshots)?;
            return Err(LedgerError::MigrationFailed {
                index,
                name: step.name.clone(),
                reason,
                rolled_back,
            });
        }
        debug!(index, step = %step.name, "migration step applied");
    }

    Ok(MigrationOutcome {
        diff: diff(content, &working),
        content: working,
        steps_applied: plan.len(),
    })
}

fn roll_back(plan: &MigrationPlan, working: &mut Value, snapshots: &[Value]) -> Result<usize, LedgerError> {
    for (index, snapshot) in snapshots.iter().enumerate().rev() {
        let step = &plan.steps[index];
        let result = match &step.rollback {
            Rollback::RestoreSnapshot => {
                *working = snapshot.clone();
                Ok(())
            }
            Rollback::Action(action) => action.apply(working),
            Rollback::Custom(t) => (t.apply)(working),
        };
        if result.is_err() || working != snapshot {
            return Err(LedgerError::RollbackFailed {
                index,
                name: step.name.clone(),
            });
        }
    }
    Ok(snapshots.len())
}
