use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{WorkflowAction, WorkflowStage};
use crate::DomainResult;
use crate::error::DomainError;

/// One edge of the lifecycle graph together with the roles allowed to take it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: WorkflowStage,
    pub action: WorkflowAction,
    pub to: WorkflowStage,
    pub allowed_roles: Vec<String>,
    #[serde(default)]
    pub requires_note: bool,
}

impl TransitionRule {
    /// Role labels compare ASCII-case-insensitively after trimming.
    pub fn allows<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|role| {
            let role = role.as_ref().trim();
            !role.is_empty()
                && self
                    .allowed_roles
                    .iter()
                    .any(|allowed| allowed.trim().eq_ignore_ascii_case(role))
        })
    }
}

/// Ordered list of transition rules. Declaration order is the order in which
/// available actions are reported.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionTable {
    rules: Vec<TransitionRule>,
}

impl TransitionTable {
    pub fn new(rules: Vec<TransitionRule>) -> DomainResult<Self> {
        let table = Self { rules };
        table.validate()?;
        Ok(table)
    }

    pub fn standard() -> Self {
        use WorkflowAction as A;
        use WorkflowStage as S;

        Self {
            rules: vec![
                rule(S::Draft, A::Submit, S::Submitted, &["user", "editor", "admin"], false),
                rule(
                    S::Submitted,
                    A::StartReview,
                    S::UnderReview,
                    &["reviewer", "editor", "admin"],
                    false,
                ),
                rule(
                    S::UnderReview,
                    A::RequestInfo,
                    S::NeedsInfo,
                    &["reviewer", "editor", "admin"],
                    true,
                ),
                rule(
                    S::UnderReview,
                    A::Approve,
                    S::Approved,
                    &["reviewer", "approver", "admin"],
                    false,
                ),
                rule(
                    S::UnderReview,
                    A::Reject,
                    S::Rejected,
                    &["reviewer", "approver", "admin"],
                    true,
                ),
                rule(
                    S::NeedsInfo,
                    A::ProvideInfo,
                    S::UnderReview,
                    &["user", "editor", "admin"],
                    true,
                ),
                rule(
                    S::Approved,
                    A::StartDistribution,
                    S::InDistribution,
                    &["distributor", "editor", "admin"],
                    false,
                ),
                rule(
                    S::InDistribution,
                    A::Complete,
                    S::Completed,
                    &["distributor", "editor", "admin"],
                    false,
                ),
                rule(
                    S::Rejected,
                    A::Reopen,
                    S::UnderReview,
                    &["reviewer", "approver", "admin"],
                    true,
                ),
            ],
        }
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    pub fn find(&self, from: WorkflowStage, action: WorkflowAction) -> Option<&TransitionRule> {
        self.rules
            .iter()
            .find(|rule| rule.from == from && rule.action == action)
    }

    pub fn rules_from(&self, from: WorkflowStage) -> impl Iterator<Item = &TransitionRule> {
        self.rules.iter().filter(move |rule| rule.from == from)
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert((rule.from, rule.action)) {
                return Err(DomainError::Validation(format!(
                    "duplicate transition for stage '{}' and action '{}'",
                    rule.from, rule.action
                )));
            }
            if rule.from == WorkflowStage::Completed {
                return Err(DomainError::Validation(
                    "completed is terminal and cannot have outgoing transitions".into(),
                ));
            }
            if rule.from == rule.to {
                return Err(DomainError::Validation(format!(
                    "transition '{}' must change the stage",
                    rule.action
                )));
            }
            if rule
                .allowed_roles
                .iter()
                .all(|role| role.trim().is_empty())
            {
                return Err(DomainError::Validation(format!(
                    "transition '{}' from '{}' has no allowed roles",
                    rule.action, rule.from
                )));
            }
        }
        Ok(())
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn rule(
    from: WorkflowStage,
    action: WorkflowAction,
    to: WorkflowStage,
    allowed_roles: &[&str],
    requires_note: bool,
) -> TransitionRule {
    TransitionRule {
        from,
        action,
        to,
        allowed_roles: allowed_roles.iter().map(|role| role.to_string()).collect(),
        requires_note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_valid() {
        TransitionTable::standard().validate().expect("valid table");
    }

    #[test]
    fn standard_table_has_the_nine_edges() {
        use WorkflowAction as A;
        use WorkflowStage as S;

        let table = TransitionTable::standard();
        let edges: Vec<_> = table
            .rules()
            .iter()
            .map(|rule| (rule.from, rule.action, rule.to))
            .collect();
        assert_eq!(
            edges,
            vec![
                (S::Draft, A::Submit, S::Submitted),
                (S::Submitted, A::StartReview, S::UnderReview),
                (S::UnderReview, A::RequestInfo, S::NeedsInfo),
                (S::UnderReview, A::Approve, S::Approved),
                (S::UnderReview, A::Reject, S::Rejected),
                (S::NeedsInfo, A::ProvideInfo, S::UnderReview),
                (S::Approved, A::StartDistribution, S::InDistribution),
                (S::InDistribution, A::Complete, S::Completed),
                (S::Rejected, A::Reopen, S::UnderReview),
            ]
        );
    }

    #[test]
    fn every_stage_but_completed_has_an_exit() {
        let table = TransitionTable::standard();
        for stage in WorkflowStage::ALL {
            let exits = table.rules_from(stage).count();
            if stage == WorkflowStage::Completed {
                assert_eq!(exits, 0);
            } else {
                assert!(exits > 0, "{stage} has no outgoing transition");
            }
        }
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let mut rules = TransitionTable::standard().rules().to_vec();
        rules.push(rules[0].clone());
        let err = TransitionTable::new(rules).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn completed_cannot_have_exits() {
        let mut rules = TransitionTable::standard().rules().to_vec();
        rules.push(rule(
            WorkflowStage::Completed,
            WorkflowAction::Reopen,
            WorkflowStage::UnderReview,
            &["admin"],
            false,
        ));
        assert!(TransitionTable::new(rules).is_err());
    }

    #[test]
    fn rules_need_roles() {
        let rules = vec![rule(
            WorkflowStage::Draft,
            WorkflowAction::Submit,
            WorkflowStage::Submitted,
            &[" "],
            false,
        )];
        assert!(TransitionTable::new(rules).is_err());
    }

    #[test]
    fn role_matching_ignores_case_and_whitespace() {
        let table = TransitionTable::standard();
        let approve = table
            .find(WorkflowStage::UnderReview, WorkflowAction::Approve)
            .expect("approve rule");
        assert!(approve.allows(&["Reviewer"]));
        assert!(approve.allows(&[" ADMIN "]));
        assert!(!approve.allows(&["user"]));
        assert!(!approve.allows(&[""]));
        assert!(!approve.allows::<&str>(&[]));
    }

    #[test]
    fn table_loads_from_json() {
        let json = r#"{
            "rules": [
                {"from": "draft", "action": "submit", "to": "submitted", "allowed_roles": ["clerk"]}
            ]
        }"#;
        let table: TransitionTable = serde_json::from_str(json).expect("table");
        table.validate().expect("valid");
        let rule = table
            .find(WorkflowStage::Draft, WorkflowAction::Submit)
            .expect("rule");
        assert!(!rule.requires_note);
        assert!(rule.allows(&["clerk"]));
    }
}
