use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gate::error::GateError;

pub type StepIndex = u8;

/// Whether a step needs its predecessor verified before it can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ordering {
    Sequential,
    Independent,
}

/// One required external action and its verification record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub clicked: bool,
    #[serde(default)]
    pub window_opened: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepLedger {
    ordering: Ordering,
    steps: BTreeMap<StepIndex, Step>,
}

impl StepLedger {
    pub fn new(total: u8, ordering: Ordering) -> Self {
        let steps = (1..=total).map(|i| (i, Step::default())).collect();
        StepLedger { ordering, steps }
    }

    /// Rebuilds a ledger from persisted steps. Returns `None` if the steps do
    /// not describe `total` consecutive indices or break the ordering rule.
    pub fn from_steps(total: u8, ordering: Ordering, steps: BTreeMap<StepIndex, Step>) -> Option<Self> {
        let ledger = StepLedger { ordering, steps };
        if ledger.is_consistent(total) {
            Some(ledger)
        } else {
            None
        }
    }

    pub fn steps(&self) -> &BTreeMap<StepIndex, Step> {
        &self.steps
    }

    pub fn total(&self) -> u8 {
        self.steps.len() as u8
    }

    pub fn get(&self, index: StepIndex) -> Option<&Step> {
        self.steps.get(&index)
    }

    pub fn completed_count(&self) -> u8 {
        self.steps.values().filter(|s| s.verified).count() as u8
    }

    pub fn all_verified(&self) -> bool {
        self.completed_count() == self.total()
    }

    pub fn is_in_progress(&self, index: StepIndex) -> bool {
        self.get(index).map_or(false, |s| s.clicked && !s.verified)
    }

    /// The step that has to be verified before `index` may run, if any.
    pub fn blocking_prerequisite(&self, index: StepIndex) -> Option<StepIndex> {
        if self.ordering == Ordering::Independent || index <= 1 {
            return None;
        }
        let previous = index - 1;
        match self.get(previous) {
            Some(step) if step.verified => None,
            _ => Some(previous),
        }
    }

    pub fn is_unlocked(&self, index: StepIndex) -> bool {
        self.steps.contains_key(&index) && self.blocking_prerequisite(index).is_none()
    }

    /// Refusal rules applied before a step's action is opened.
    pub fn check_activation(&self, index: StepIndex) -> Result<(), GateError> {
        let step = self.get(index).ok_or(GateError::UnknownStep(index))?;
        if step.clicked && !step.verified {
            return Err(GateError::InProgress(index));
        }
        if let Some(requires) = self.blocking_prerequisite(index) {
            return Err(GateError::LockedStep { step: index, requires });
        }
        if step.verified {
            return Err(GateError::AlreadyCompleted(index));
        }
        Ok(())
    }

    pub fn mark_clicked(&mut self, index: StepIndex, now_ms: i64, window_opened: bool) -> Result<(), GateError> {
        let step = self.steps.get_mut(&index).ok_or(GateError::UnknownStep(index))?;
        step.clicked = true;
        step.window_opened = window_opened;
        step.timestamp = Some(now_ms);
        Ok(())
    }

    pub fn mark_verified(&mut self, index: StepIndex, now_ms: i64) -> Result<(), GateError> {
        if !self.steps.contains_key(&index) {
            return Err(GateError::UnknownStep(index));
        }
        if let Some(requires) = self.blocking_prerequisite(index) {
            return Err(GateError::LockedStep { step: index, requires });
        }
        if let Some(step) = self.steps.get_mut(&index) {
            step.verified = true;
            step.timestamp = Some(now_ms);
        }
        Ok(())
    }

    /// Clears the attempt flags so the visitor can try the step again.
    pub fn reset_attempt(&mut self, index: StepIndex) {
        if let Some(step) = self.steps.get_mut(&index) {
            step.clicked = false;
            step.window_opened = false;
        }
    }

    /// Drops attempts whose countdown belonged to an earlier page load.
    pub fn abandon_in_flight(&mut self) -> Vec<StepIndex> {
        let mut abandoned = Vec::new();
        for (index, step) in self.steps.iter_mut() {
            if step.clicked && !step.verified {
                step.clicked = false;
                step.window_opened = false;
                abandoned.push(*index);
            }
        }
        abandoned
    }

    pub fn is_consistent(&self, total: u8) -> bool {
        if self.total() != total || !self.steps.keys().copied().eq(1..=total) {
            return false;
        }
        if self.ordering == Ordering::Independent {
            return true;
        }
        // verified steps have to form a prefix
        let mut gap = false;
        for step in self.steps.values() {
            if !step.verified {
                gap = true;
            } else if gap {
                return false;
            }
        }
        true
    }

    pub fn verified_timestamps(&self) -> Vec<i64> {
        self.steps
            .values()
            .filter(|s| s.verified)
            .filter_map(|s| s.timestamp)
            .collect()
    }
}
