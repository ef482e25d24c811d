use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::applications::{
    AidApplication, ApplicationCreate, Assignment, HistoryEntry, validate_application_create,
};
use crate::auth::UserAccess;
use crate::error::WorkflowError;
use crate::identity::{ActorIdentity, WorkflowActor};
use crate::permissions::BENEFICIARIES_ACCESS;
use crate::ports::applications::{ApplicationStore, StoreError, TransitionWrite};
use crate::util::{now_ms, uuid_v7_without_dashes};

use super::{WorkflowAction, WorkflowEngine, WorkflowStage};

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Upper bound for a single store write. A write that exceeds it is
    /// reported as [`StoreError::Timeout`], not as a failure.
    pub write_timeout: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransitionOutcome {
    pub previous_stage: WorkflowStage,
    pub application: AidApplication,
}

#[derive(Clone)]
pub struct WorkflowService {
    engine: Arc<WorkflowEngine>,
    store: Arc<dyn ApplicationStore>,
    config: WorkflowConfig,
}

impl WorkflowService {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        store: Arc<dyn ApplicationStore>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub async fn create(
        &self,
        actor: ActorIdentity,
        access: &UserAccess,
        input: ApplicationCreate,
    ) -> Result<AidApplication, WorkflowError> {
        if !access.effective_permissions().contains(BENEFICIARIES_ACCESS) {
            return Err(WorkflowError::Forbidden(format!(
                "{BENEFICIARIES_ACCESS} is required to create applications"
            )));
        }
        let input = validate_application_create(input)?;
        let now = now_ms();
        let application = AidApplication {
            application_id: uuid_v7_without_dashes(),
            applicant_name: input.applicant_name,
            aid_type: input.aid_type,
            requested_amount: input.requested_amount,
            notes: input.notes,
            stage: WorkflowStage::INITIAL,
            history: Vec::new(),
            assigned_to: None,
            due_date: None,
            priority: None,
            created_by: actor.user_id,
            created_at_ms: now,
            updated_at_ms: now,
        };
        let created = self.bounded(self.store.create(&application)).await?;
        tracing::info!(
            application_id = %created.application_id,
            created_by = %created.created_by,
            "aid application created"
        );
        Ok(created)
    }

    pub async fn get(&self, application_id: &str) -> Result<AidApplication, WorkflowError> {
        self.store
            .get(application_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(application_id.to_string()).into())
    }

    pub async fn history(&self, application_id: &str) -> Result<Vec<HistoryEntry>, WorkflowError> {
        Ok(self.get(application_id).await?.history)
    }

    pub async fn stage_counts(&self) -> Result<BTreeMap<WorkflowStage, usize>, WorkflowError> {
        let applications = self.store.list().await?;
        Ok(self
            .engine
            .count_by_stage(applications.iter().map(|application| application.stage)))
    }

    /// Applies `action` to an application last seen in `current_stage`.
    ///
    /// Rule violations return before the store is touched. The write is
    /// conditional on the stored stage still being `current_stage`.
    pub async fn apply_action(
        &self,
        application_id: &str,
        current_stage: WorkflowStage,
        action: WorkflowAction,
        actor: &WorkflowActor,
        note: Option<String>,
    ) -> Result<WorkflowStage, WorkflowError> {
        let application = self
            .write_transition(
                application_id,
                current_stage,
                action,
                actor,
                note,
                Assignment::default(),
            )
            .await?;
        Ok(application.stage)
    }

    /// Like [`Self::apply_action`], also storing the provided assignment
    /// fields in the same conditional write.
    pub async fn apply_assigned_action(
        &self,
        application_id: &str,
        current_stage: WorkflowStage,
        action: WorkflowAction,
        actor: &WorkflowActor,
        note: Option<String>,
        assignment: Assignment,
    ) -> Result<AidApplication, WorkflowError> {
        self.write_transition(application_id, current_stage, action, actor, note, assignment)
            .await
    }

    /// Reads the stored stage, then applies `action` against it.
    pub async fn transition(
        &self,
        application_id: &str,
        action: WorkflowAction,
        actor: &WorkflowActor,
        note: Option<String>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let current = self.get(application_id).await?;
        let previous_stage = current.stage;
        let application = self
            .write_transition(
                application_id,
                previous_stage,
                action,
                actor,
                note,
                Assignment::default(),
            )
            .await?;
        Ok(TransitionOutcome {
            previous_stage,
            application,
        })
    }

    async fn write_transition(
        &self,
        application_id: &str,
        current_stage: WorkflowStage,
        action: WorkflowAction,
        actor: &WorkflowActor,
        note: Option<String>,
        assignment: Assignment,
    ) -> Result<AidApplication, WorkflowError> {
        let rule = match self.engine.check(current_stage, action, actor.roles.as_slice()) {
            Ok(rule) => rule,
            Err(err) => {
                tracing::warn!(
                    application_id,
                    action = %action,
                    stage = %current_stage,
                    user_id = %actor.user_id,
                    code = err.code(),
                    "workflow transition rejected"
                );
                return Err(err);
            }
        };
        let target = rule.to;
        let assignment = assignment.normalized()?;

        let entry = HistoryEntry {
            entry_id: uuid_v7_without_dashes(),
            action,
            from_stage: current_stage,
            to_stage: target,
            actor: actor.clone(),
            note: normalize_note(note),
            assignment: assignment.clone(),
            occurred_at_ms: now_ms(),
        };
        let write = TransitionWrite {
            expected_stage: current_stage,
            stage: target,
            entry,
            assignment,
        };

        let application = self
            .bounded(self.store.apply_transition(application_id, &write))
            .await?;
        tracing::info!(
            application_id,
            action = %action,
            from = %current_stage,
            to = %target,
            user_id = %actor.user_id,
            "workflow transition applied"
        );
        Ok(application)
    }

    async fn bounded<T, F>(&self, write: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.config.write_timeout.as_millis() as u64,
                    "store write timed out; outcome unknown"
                );
                Err(StoreError::Timeout)
            }
        }
    }
}

fn normalize_note(note: Option<String>) -> Option<String> {
    note.map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applications::{InMemoryApplicationStore, Priority};
    use crate::ports::BoxFuture;

    struct SlowStore;

    impl ApplicationStore for SlowStore {
        fn create(
            &self,
            application: &AidApplication,
        ) -> BoxFuture<'_, Result<AidApplication, StoreError>> {
            let application = application.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(application)
            })
        }

        fn get(
            &self,
            _application_id: &str,
        ) -> BoxFuture<'_, Result<Option<AidApplication>, StoreError>> {
            Box::pin(async { Ok(None) })
        }

        fn list(&self) -> BoxFuture<'_, Result<Vec<AidApplication>, StoreError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn apply_transition(
            &self,
            _application_id: &str,
            _write: &TransitionWrite,
        ) -> BoxFuture<'_, Result<AidApplication, StoreError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Err(StoreError::Operation("unreachable".into()))
            })
        }
    }

    fn staff() -> UserAccess {
        UserAccess::new("Personel", [BENEFICIARIES_ACCESS])
    }

    fn actor(roles: &[&str]) -> WorkflowActor {
        WorkflowActor::new(
            ActorIdentity::with_user_id("u-1"),
            roles.iter().map(|role| role.to_string()).collect(),
        )
    }

    fn input() -> ApplicationCreate {
        ApplicationCreate {
            applicant_name: "Ayşe Yılmaz".to_string(),
            aid_type: "food".to_string(),
            requested_amount: None,
            notes: None,
        }
    }

    fn service(store: Arc<dyn ApplicationStore>, write_timeout: Duration) -> WorkflowService {
        WorkflowService::new(
            Arc::new(WorkflowEngine::default()),
            store,
            WorkflowConfig { write_timeout },
        )
    }

    #[tokio::test]
    async fn create_starts_in_draft_with_empty_history() {
        let service = service(
            Arc::new(InMemoryApplicationStore::new()),
            Duration::from_secs(1),
        );
        let application = service
            .create(ActorIdentity::with_user_id("u-1"), &staff(), input())
            .await
            .expect("created");
        assert_eq!(application.stage, WorkflowStage::Draft);
        assert!(application.history.is_empty());
        assert_eq!(application.created_by, "u-1");
    }

    #[tokio::test]
    async fn create_requires_beneficiaries_access() {
        let service = service(
            Arc::new(InMemoryApplicationStore::new()),
            Duration::from_secs(1),
        );
        let access = UserAccess::new("Personel", ["donations:access"]);
        let err = service
            .create(ActorIdentity::with_user_id("u-1"), &access, input())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_role_may_create_without_explicit_grants() {
        let service = service(
            Arc::new(InMemoryApplicationStore::new()),
            Duration::from_secs(1),
        );
        let access = UserAccess::new("Başkan", Vec::<String>::new());
        service
            .create(ActorIdentity::with_user_id("u-2"), &access, input())
            .await
            .expect("created");
    }

    #[tokio::test]
    async fn transition_reads_current_stage() {
        let service = service(
            Arc::new(InMemoryApplicationStore::new()),
            Duration::from_secs(1),
        );
        let application = service
            .create(ActorIdentity::with_user_id("u-1"), &staff(), input())
            .await
            .expect("created");
        let outcome = service
            .transition(
                &application.application_id,
                WorkflowAction::Submit,
                &actor(&["user"]),
                Some("  ilk başvuru  ".to_string()),
            )
            .await
            .expect("submitted");
        assert_eq!(outcome.previous_stage, WorkflowStage::Draft);
        assert_eq!(outcome.application.stage, WorkflowStage::Submitted);
        assert_eq!(
            outcome.application.history[0].note.as_deref(),
            Some("ilk başvuru")
        );
    }

    #[tokio::test]
    async fn stage_counts_reflect_store() {
        let service = service(
            Arc::new(InMemoryApplicationStore::new()),
            Duration::from_secs(1),
        );
        for _ in 0..2 {
            service
                .create(ActorIdentity::with_user_id("u-1"), &staff(), input())
                .await
                .expect("created");
        }
        let counts = service.stage_counts().await.expect("counts");
        assert_eq!(counts[&WorkflowStage::Draft], 2);
        assert_eq!(counts[&WorkflowStage::Submitted], 0);
    }

    #[tokio::test]
    async fn slow_writes_surface_as_timeout() {
        let service = service(Arc::new(SlowStore), Duration::from_millis(20));
        let err = service
            .apply_action(
                "app-1",
                WorkflowStage::Draft,
                WorkflowAction::Submit,
                &actor(&["user"]),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Store(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn missing_application_is_not_found() {
        let service = service(
            Arc::new(InMemoryApplicationStore::new()),
            Duration::from_secs(1),
        );
        let err = service.get("missing").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Store(StoreError::NotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn assignment_is_written_with_the_stage() {
        let service = service(
            Arc::new(InMemoryApplicationStore::new()),
            Duration::from_secs(1),
        );
        let application = service
            .create(ActorIdentity::with_user_id("u-1"), &staff(), input())
            .await
            .expect("created");
        let updated = service
            .apply_assigned_action(
                &application.application_id,
                WorkflowStage::Draft,
                WorkflowAction::Submit,
                &actor(&["user"]),
                None,
                Assignment {
                    assigned_to: Some(" u-7 ".into()),
                    due_date: Some("2026-11-01".into()),
                    priority: Some(Priority::Urgent),
                },
            )
            .await
            .expect("submitted");
        assert_eq!(updated.stage, WorkflowStage::Submitted);
        assert_eq!(updated.assigned_to.as_deref(), Some("u-7"));
        assert_eq!(updated.due_date.as_deref(), Some("2026-11-01"));
        assert_eq!(updated.priority, Some(Priority::Urgent));
        assert_eq!(updated.history[0].assignment.assigned_to.as_deref(), Some("u-7"));
    }

    #[tokio::test]
    async fn invalid_due_date_writes_nothing() {
        let store = Arc::new(InMemoryApplicationStore::new());
        let service = service(store.clone(), Duration::from_secs(1));
        let application = service
            .create(ActorIdentity::with_user_id("u-1"), &staff(), input())
            .await
            .expect("created");
        let err = service
            .apply_assigned_action(
                &application.application_id,
                WorkflowStage::Draft,
                WorkflowAction::Submit,
                &actor(&["user"]),
                None,
                Assignment {
                    due_date: Some("next week".into()),
                    ..Assignment::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        let stored = service
            .get(&application.application_id)
            .await
            .expect("stored");
        assert_eq!(stored.stage, WorkflowStage::Draft);
        assert!(stored.history.is_empty());
    }
}
