use std::collections::BTreeMap;

use serde::Serialize;

use super::labels::stage_label;
use super::{TransitionRule, TransitionTable, WorkflowAction, WorkflowStage};
use crate::error::WorkflowError;

/// Position of a stage in the progress view.
///
/// Main-path stages are numbered 1..=6. `needs_info` and `rejected` branch
/// off the review step and share its ordinal with `main_path = false`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StepDescriptor {
    pub stage: WorkflowStage,
    pub label: &'static str,
    pub order: u8,
    pub main_path: bool,
}

const STEPS: [(WorkflowStage, u8, bool); 8] = [
    (WorkflowStage::Draft, 1, true),
    (WorkflowStage::Submitted, 2, true),
    (WorkflowStage::UnderReview, 3, true),
    (WorkflowStage::NeedsInfo, 3, false),
    (WorkflowStage::Approved, 4, true),
    (WorkflowStage::Rejected, 3, false),
    (WorkflowStage::InDistribution, 5, true),
    (WorkflowStage::Completed, 6, true),
];

/// Read-only view over a transition table. Holds no mutable state, so one
/// instance can be shared across requests.
#[derive(Clone, Debug, Default)]
pub struct WorkflowEngine {
    table: TransitionTable,
}

impl WorkflowEngine {
    pub fn new(table: TransitionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn available_actions<S: AsRef<str>>(
        &self,
        stage: WorkflowStage,
        roles: &[S],
    ) -> Vec<WorkflowAction> {
        self.table
            .rules_from(stage)
            .filter(|rule| rule.allows(roles))
            .map(|rule| rule.action)
            .collect()
    }

    pub fn target_stage(
        &self,
        stage: WorkflowStage,
        action: WorkflowAction,
    ) -> Option<WorkflowStage> {
        self.table.find(stage, action).map(|rule| rule.to)
    }

    /// Resolves the rule for `(stage, action)` and checks the roles against it.
    pub fn check<S: AsRef<str>>(
        &self,
        stage: WorkflowStage,
        action: WorkflowAction,
        roles: &[S],
    ) -> Result<&TransitionRule, WorkflowError> {
        let rule = self
            .table
            .find(stage, action)
            .ok_or(WorkflowError::InvalidTransition { stage, action })?;
        if !rule.allows(roles) {
            return Err(WorkflowError::Forbidden(format!(
                "role is not permitted to {action} from {stage}"
            )));
        }
        Ok(rule)
    }

    pub fn can_perform<S: AsRef<str>>(
        &self,
        stage: WorkflowStage,
        action: WorkflowAction,
        roles: &[S],
    ) -> bool {
        self.check(stage, action, roles).is_ok()
    }

    pub fn workflow_steps(&self) -> Vec<StepDescriptor> {
        STEPS
            .into_iter()
            .map(|(stage, order, main_path)| StepDescriptor {
                stage,
                label: stage_label(stage).label,
                order,
                main_path,
            })
            .collect()
    }

    pub fn stage_order(&self, stage: WorkflowStage) -> u8 {
        step(stage).1
    }

    /// True when `check` lies on the main path strictly before `current`.
    pub fn is_stage_completed(&self, current: WorkflowStage, check: WorkflowStage) -> bool {
        let (_, check_order, on_main_path) = step(check);
        on_main_path && check_order < self.stage_order(current)
    }

    pub fn is_stage_active(&self, current: WorkflowStage, check: WorkflowStage) -> bool {
        current == check
    }

    pub fn is_terminal(&self, stage: WorkflowStage) -> bool {
        self.table.rules_from(stage).next().is_none()
    }

    /// Number of applications per stage, with every stage present.
    pub fn count_by_stage<I>(&self, stages: I) -> BTreeMap<WorkflowStage, usize>
    where
        I: IntoIterator<Item = WorkflowStage>,
    {
        let mut counts: BTreeMap<_, _> = WorkflowStage::ALL
            .into_iter()
            .map(|stage| (stage, 0))
            .collect();
        for stage in stages {
            *counts.entry(stage).or_insert(0) += 1;
        }
        counts
    }
}

fn step(stage: WorkflowStage) -> (WorkflowStage, u8, bool) {
    STEPS
        .into_iter()
        .find(|(candidate, _, _)| *candidate == stage)
        .unwrap_or((stage, 0, false))
}
