//! Aid application lifecycle.
//!
//! Applications start in [`WorkflowStage::Draft`] and move only through the
//! edges of a [`TransitionTable`]. [`WorkflowEngine`] answers questions about
//! the table; [`WorkflowService`] applies actions against an
//! [`ApplicationStore`](crate::ports::applications::ApplicationStore).

use std::fmt;

use serde::{Deserialize, Serialize};

mod engine;
mod labels;
mod service;
mod table;

pub use engine::{StepDescriptor, WorkflowEngine};
pub use labels::{ActionLabel, StageLabel, action_label, action_labels, stage_label, stage_labels};
pub use service::{TransitionOutcome, WorkflowConfig, WorkflowService};
pub use table::{TransitionRule, TransitionTable};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Draft,
    Submitted,
    UnderReview,
    NeedsInfo,
    Approved,
    Rejected,
    InDistribution,
    Completed,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 8] = [
        WorkflowStage::Draft,
        WorkflowStage::Submitted,
        WorkflowStage::UnderReview,
        WorkflowStage::NeedsInfo,
        WorkflowStage::Approved,
        WorkflowStage::Rejected,
        WorkflowStage::InDistribution,
        WorkflowStage::Completed,
    ];

    /// The only stage an application may be created in.
    pub const INITIAL: WorkflowStage = WorkflowStage::Draft;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::NeedsInfo => "needs_info",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InDistribution => "in_distribution",
            Self::Completed => "completed",
        }
    }

    /// Accepts `under_review` as well as `UNDER_REVIEW`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Submit,
    StartReview,
    RequestInfo,
    ProvideInfo,
    Approve,
    Reject,
    StartDistribution,
    Complete,
    Reopen,
}

impl WorkflowAction {
    pub const ALL: [WorkflowAction; 9] = [
        WorkflowAction::Submit,
        WorkflowAction::StartReview,
        WorkflowAction::RequestInfo,
        WorkflowAction::ProvideInfo,
        WorkflowAction::Approve,
        WorkflowAction::Reject,
        WorkflowAction::StartDistribution,
        WorkflowAction::Complete,
        WorkflowAction::Reopen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::StartReview => "start_review",
            Self::RequestInfo => "request_info",
            Self::ProvideInfo => "provide_info",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::StartDistribution => "start_distribution",
            Self::Complete => "complete",
            Self::Reopen => "reopen",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_parse_accepts_both_spellings() {
        assert_eq!(
            WorkflowStage::parse("UNDER_REVIEW"),
            Some(WorkflowStage::UnderReview)
        );
        assert_eq!(
            WorkflowStage::parse(" in_distribution "),
            Some(WorkflowStage::InDistribution)
        );
        assert_eq!(WorkflowStage::parse("cancelled"), None);
    }

    #[test]
    fn action_parse_rejects_unknown() {
        assert_eq!(WorkflowAction::parse("REOPEN"), Some(WorkflowAction::Reopen));
        assert_eq!(WorkflowAction::parse("cancel"), None);
        assert_eq!(WorkflowAction::parse(""), None);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&WorkflowStage::NeedsInfo).expect("json");
        assert_eq!(json, "\"needs_info\"");
        let action: WorkflowAction =
            serde_json::from_str("\"start_distribution\"").expect("action");
        assert_eq!(action, WorkflowAction::StartDistribution);
    }
}
