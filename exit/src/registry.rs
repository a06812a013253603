//! Registered forks and their ancestry.

use charter_types::{ForkId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use tracing::{info, warn};

use crate::error::ExitError;
use crate::fork::{ForkAssessment, ForkEvaluator, Legitimacy};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForkRecord {
    pub id: ForkId,
    pub name: String,
    pub parent: Option<ForkId>,
    pub assessment: ForkAssessment,
    pub registered_at: Timestamp,
    #[serde(default)]
    pub notes: Vec<String>,
    /// The content the assessment was made from. Kept so the fork can be
    /// judged again when the canonical constitution changes.
    #[serde(default)]
    pub content: Value,
}

pub struct ForkRegistry {
    evaluator: RwLock<ForkEvaluator>,
    forks: RwLock<BTreeMap<ForkId, ForkRecord>>,
}

impl ForkRegistry {
    pub fn new(evaluator: ForkEvaluator) -> Self {
        Self {
            evaluator: RwLock::new(evaluator),
            forks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Assess a fork's content and record it.
    pub fn register(
        &self,
        id: ForkId,
        name: impl Into<String>,
        parent: Option<ForkId>,
        content: &Value,
        now: Timestamp,
    ) -> Result<ForkRecord, ExitError> {
        let assessment = self.evaluator.read()?.evaluate(content);
        let mut forks = self.forks.write()?;
        if forks.contains_key(&id) {
            return Err(ExitError::ForkExists(id));
        }
        if let Some(p) = &parent {
            if !forks.contains_key(p) {
                return Err(ExitError::UnknownFork(p.clone()));
            }
        }
        let record = ForkRecord {
            id: id.clone(),
            name: name.into(),
            parent,
            assessment,
            registered_at: now,
            notes: Vec::new(),
            content: content.clone(),
        };
        if record.assessment.legitimacy == Legitimacy::Illegitimate {
            warn!(fork = %id, issues = record.assessment.issues.len(), "illegitimate fork registered");
        } else {
            info!(fork = %id, legitimacy = %record.assessment.legitimacy, "fork registered");
        }
        forks.insert(id, record.clone());
        Ok(record)
    }

    /// Judge every fork against new canonical tables. Returns the records
    /// whose assessment changed so the caller can persist them. Records
    /// stored without content keep their assessment.
    pub fn set_canonical(&self, evaluator: ForkEvaluator) -> Result<Vec<ForkRecord>, ExitError> {
        let mut current = self.evaluator.write()?;
        *current = evaluator;
        let mut forks = self.forks.write()?;
        let mut changed = Vec::new();
        for record in forks.values_mut() {
            if reassess(&current, record) {
                changed.push(record.clone());
            }
        }
        if !changed.is_empty() {
            info!(forks = changed.len(), "fork assessments updated for new canonical version");
        }
        Ok(changed)
    }

    /// Load a stored record, judging it against the current canonical tables.
    pub fn restore(&self, mut record: ForkRecord) -> Result<(), ExitError> {
        reassess(&*self.evaluator.read()?, &mut record);
        self.forks.write()?.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn get(&self, id: &ForkId) -> Result<ForkRecord, ExitError> {
        self.forks
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| ExitError::UnknownFork(id.clone()))
    }

    pub fn legitimacy(&self, id: &ForkId) -> Result<Legitimacy, ExitError> {
        Ok(self.get(id)?.assessment.legitimacy)
    }

    pub fn add_note(&self, id: &ForkId, note: impl Into<String>) -> Result<(), ExitError> {
        let mut forks = self.forks.write()?;
        let record = forks
            .get_mut(id)
            .ok_or_else(|| ExitError::UnknownFork(id.clone()))?;
        record.notes.push(note.into());
        Ok(())
    }

    /// The fork followed by its ancestors, nearest first.
    pub fn lineage(&self, id: &ForkId) -> Result<Vec<ForkId>, ExitError> {
        let forks = self.forks.read()?;
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut next = Some(id.clone());
        while let Some(current) = next {
            if !seen.insert(current.clone()) {
                break;
            }
            let record = forks
                .get(&current)
                .ok_or_else(|| ExitError::UnknownFork(current.clone()))?;
            next = record.parent.clone();
            chain.push(current);
        }
        Ok(chain)
    }

    pub fn list(&self) -> Result<Vec<ForkRecord>, ExitError> {
        Ok(self.forks.read()?.values().cloned().collect())
    }
}

fn reassess(evaluator: &ForkEvaluator, record: &mut ForkRecord) -> bool {
    if record.content.is_null() {
        return false;
    }
    let assessment = evaluator.evaluate(&record.content);
    if assessment == record.assessment {
        return false;
    }
    if assessment.legitimacy != record.assessment.legitimacy {
        warn!(
            fork = %record.id,
            from = %record.assessment.legitimacy,
            to = %assessment.legitimacy,
            "fork legitimacy changed"
        );
    }
    record.assessment = assessment;
    true
}
