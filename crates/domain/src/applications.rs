use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::WorkflowActor;
use crate::ports::BoxFuture;
use crate::ports::applications::{ApplicationStore, StoreError, TransitionWrite};
use crate::util::is_valid_due_date;
use crate::workflow::{WorkflowAction, WorkflowStage};

const MAX_NAME_LENGTH: usize = 200;
const MAX_AID_TYPE_LENGTH: usize = 64;
const MAX_NOTES_LENGTH: usize = 2_000;
const MAX_ASSIGNEE_LENGTH: usize = 128;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str().eq_ignore_ascii_case(value))
    }
}

/// Optional handling details that ride along with a transition. Absent
/// fields leave the stored value untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl Assignment {
    pub fn is_empty(&self) -> bool {
        self.assigned_to.is_none() && self.due_date.is_none() && self.priority.is_none()
    }

    /// Trims text fields, treats blanks as absent and checks the due date.
    pub fn normalized(self) -> DomainResult<Self> {
        let assigned_to = trimmed(self.assigned_to);
        if assigned_to
            .as_ref()
            .is_some_and(|assignee| assignee.chars().count() > MAX_ASSIGNEE_LENGTH)
        {
            return Err(DomainError::Validation(format!(
                "assigned_to must be at most {MAX_ASSIGNEE_LENGTH} characters"
            )));
        }
        let due_date = trimmed(self.due_date);
        if let Some(due_date) = &due_date {
            if !is_valid_due_date(due_date) {
                return Err(DomainError::Validation(format!(
                    "due_date '{due_date}' must be YYYY-MM-DD or RFC 3339"
                )));
            }
        }
        Ok(Self {
            assigned_to,
            due_date,
            priority: self.priority,
        })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Immutable record of one executed transition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub entry_id: String,
    pub action: WorkflowAction,
    pub from_stage: WorkflowStage,
    pub to_stage: WorkflowStage,
    pub actor: WorkflowActor,
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Assignment::is_empty")]
    pub assignment: Assignment,
    pub occurred_at_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AidApplication {
    pub application_id: String,
    pub applicant_name: String,
    pub aid_type: String,
    pub requested_amount: Option<f64>,
    pub notes: Option<String>,
    pub stage: WorkflowStage,
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub created_by: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl AidApplication {
    /// Stage reached by replaying the history from draft. Used to reconcile
    /// records whose stored stage disagrees with their history.
    pub fn replayed_stage(&self) -> WorkflowStage {
        self.history
            .last()
            .map(|entry| entry.to_stage)
            .unwrap_or(WorkflowStage::INITIAL)
    }

    pub fn apply_assignment(&mut self, assignment: &Assignment) {
        if let Some(assigned_to) = &assignment.assigned_to {
            self.assigned_to = Some(assigned_to.clone());
        }
        if let Some(due_date) = &assignment.due_date {
            self.due_date = Some(due_date.clone());
        }
        if let Some(priority) = assignment.priority {
            self.priority = Some(priority);
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApplicationCreate {
    pub applicant_name: String,
    pub aid_type: String,
    pub requested_amount: Option<f64>,
    pub notes: Option<String>,
}

pub(crate) fn validate_application_create(
    input: ApplicationCreate,
) -> DomainResult<ApplicationCreate> {
    let applicant_name = input.applicant_name.trim().to_string();
    let aid_type = input.aid_type.trim().to_string();
    if applicant_name.is_empty() {
        return Err(DomainError::Validation("applicant_name is required".into()));
    }
    if applicant_name.chars().count() > MAX_NAME_LENGTH {
        return Err(DomainError::Validation(format!(
            "applicant_name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    if aid_type.is_empty() {
        return Err(DomainError::Validation("aid_type is required".into()));
    }
    if aid_type.chars().count() > MAX_AID_TYPE_LENGTH {
        return Err(DomainError::Validation(format!(
            "aid_type must be at most {MAX_AID_TYPE_LENGTH} characters"
        )));
    }
    if let Some(amount) = input.requested_amount {
        if !amount.is_finite() || amount < 0.0 {
            return Err(DomainError::Validation(
                "requested_amount must be a non-negative number".into(),
            ));
        }
    }
    let notes = input
        .notes
        .map(|notes| notes.trim().to_string())
        .filter(|notes| !notes.is_empty());
    if notes
        .as_ref()
        .is_some_and(|notes| notes.chars().count() > MAX_NOTES_LENGTH)
    {
        return Err(DomainError::Validation(format!(
            "notes must be at most {MAX_NOTES_LENGTH} characters"
        )));
    }

    Ok(ApplicationCreate {
        applicant_name,
        aid_type,
        requested_amount: input.requested_amount,
        notes,
    })
}

/// Process-local store. One `RwLock` guards the whole map, so the stage
/// check and the write in `apply_transition` cannot interleave.
#[derive(Clone, Default)]
pub struct InMemoryApplicationStore {
    items: Arc<RwLock<HashMap<String, AidApplication>>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApplicationStore for InMemoryApplicationStore {
    fn create(
        &self,
        application: &AidApplication,
    ) -> BoxFuture<'_, Result<AidApplication, StoreError>> {
        let application = application.clone();
        Box::pin(async move {
            let mut items = self.items.write().await;
            if items.contains_key(&application.application_id) {
                return Err(StoreError::Conflict(application.application_id));
            }
            items.insert(application.application_id.clone(), application.clone());
            Ok(application)
        })
    }

    fn get(
        &self,
        application_id: &str,
    ) -> BoxFuture<'_, Result<Option<AidApplication>, StoreError>> {
        let application_id = application_id.to_string();
        Box::pin(async move {
            let items = self.items.read().await;
            Ok(items.get(&application_id).cloned())
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<AidApplication>, StoreError>> {
        Box::pin(async move {
            let items = self.items.read().await;
            let mut applications: Vec<_> = items.values().cloned().collect();
            applications.sort_by(|left, right| {
                left.created_at_ms
                    .cmp(&right.created_at_ms)
                    .then_with(|| left.application_id.cmp(&right.application_id))
            });
            Ok(applications)
        })
    }

    fn apply_transition(
        &self,
        application_id: &str,
        write: &TransitionWrite,
    ) -> BoxFuture<'_, Result<AidApplication, StoreError>> {
        let application_id = application_id.to_string();
        let write = write.clone();
        Box::pin(async move {
            let mut items = self.items.write().await;
            let application = items
                .get_mut(&application_id)
                .ok_or_else(|| StoreError::NotFound(application_id.clone()))?;
            if application.stage != write.expected_stage {
                return Err(StoreError::StaleStage {
                    expected: write.expected_stage,
                    actual: application.stage,
                });
            }
            application.stage = write.stage;
            application.apply_assignment(&write.assignment);
            application.updated_at_ms = write.entry.occurred_at_ms;
            application.history.push(write.entry);
            Ok(application.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ApplicationCreate {
        ApplicationCreate {
            applicant_name: "  Ayşe Yılmaz ".to_string(),
            aid_type: "food".to_string(),
            requested_amount: Some(1500.0),
            notes: Some("   ".to_string()),
        }
    }

    #[test]
    fn create_input_is_trimmed() {
        let input = validate_application_create(input()).expect("valid");
        assert_eq!(input.applicant_name, "Ayşe Yılmaz");
        assert_eq!(input.notes, None);
    }

    #[test]
    fn create_input_requires_name_and_type() {
        let err = validate_application_create(ApplicationCreate {
            applicant_name: " ".to_string(),
            ..input()
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg == "applicant_name is required"));

        let err = validate_application_create(ApplicationCreate {
            aid_type: String::new(),
            ..input()
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg == "aid_type is required"));
    }

    #[test]
    fn negative_amount_is_rejected() {
        let result = validate_application_create(ApplicationCreate {
            requested_amount: Some(-1.0),
            ..input()
        });
        assert!(result.is_err());
        let result = validate_application_create(ApplicationCreate {
            requested_amount: Some(f64::NAN),
            ..input()
        });
        assert!(result.is_err());
    }

    #[test]
    fn assignment_blanks_are_absent() {
        let assignment = Assignment {
            assigned_to: Some("  u-5 ".into()),
            due_date: Some(" ".into()),
            priority: Some(Priority::Urgent),
        }
        .normalized()
        .expect("valid");
        assert_eq!(assignment.assigned_to.as_deref(), Some("u-5"));
        assert_eq!(assignment.due_date, None);
        assert!(!assignment.is_empty());
        assert!(Assignment::default().normalized().expect("empty").is_empty());
    }

    #[test]
    fn assignment_rejects_bad_due_date() {
        for due_date in ["tomorrow", "2026-13-01", "01.11.2026"] {
            let result = Assignment {
                due_date: Some(due_date.into()),
                ..Assignment::default()
            }
            .normalized();
            assert!(result.is_err(), "{due_date}");
        }
        for due_date in ["2026-11-01", "2026-11-01T09:00:00Z"] {
            let assignment = Assignment {
                due_date: Some(due_date.into()),
                ..Assignment::default()
            }
            .normalized()
            .expect("valid due date");
            assert_eq!(assignment.due_date.as_deref(), Some(due_date));
        }
    }

    #[test]
    fn priority_parses_any_case() {
        assert_eq!(Priority::parse("URGENT"), Some(Priority::Urgent));
        assert_eq!(Priority::parse(" normal "), Some(Priority::Normal));
        assert_eq!(Priority::parse("critical"), None);
    }

    #[test]
    fn absent_assignment_fields_keep_stored_values() {
        let mut application = AidApplication {
            application_id: "app-1".into(),
            applicant_name: "Ayşe Yılmaz".into(),
            aid_type: "food".into(),
            requested_amount: None,
            notes: None,
            stage: WorkflowStage::UnderReview,
            history: Vec::new(),
            assigned_to: Some("u-2".into()),
            due_date: Some("2026-11-01".into()),
            priority: Some(Priority::Low),
            created_by: "u-1".into(),
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        application.apply_assignment(&Assignment {
            priority: Some(Priority::High),
            ..Assignment::default()
        });
        assert_eq!(application.assigned_to.as_deref(), Some("u-2"));
        assert_eq!(application.due_date.as_deref(), Some("2026-11-01"));
        assert_eq!(application.priority, Some(Priority::High));
    }
}
