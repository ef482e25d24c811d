use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dernek_domain::applications::{
    AidApplication, ApplicationCreate, Assignment, HistoryEntry, Priority,
};
use dernek_domain::idempotency::BeginOutcome;
use dernek_domain::identity::WorkflowActor;
use dernek_domain::ports::idempotency::{IdempotencyKey, IdempotencyResponse};
use dernek_domain::workflow::{WorkflowAction, WorkflowStage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use super::to_response;
use super::workflow::{AvailableActionView, StageInfo, available_action_views, stage_info};
use crate::middleware::{AuthContext, ClientRequestId};
use crate::{error::ApiError, observability, state::AppState, validation};

#[derive(Debug, Deserialize, Validate)]
pub(super) struct CreateApplicationRequest {
    #[validate(length(min = 1, max = 200))]
    applicant_name: String,
    #[validate(length(min = 1, max = 64))]
    aid_type: String,
    #[validate(range(min = 0.0))]
    requested_amount: Option<f64>,
    #[validate(length(max = 2000))]
    notes: Option<String>,
}

pub(super) async fn create_application(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateApplicationRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = auth.identity()?;
    let application = state
        .workflow
        .create(
            actor,
            &auth.access(),
            ApplicationCreate {
                applicant_name: payload.applicant_name,
                aid_type: payload.aid_type,
                requested_amount: payload.requested_amount,
                notes: payload.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(application)).into_response())
}

pub(super) async fn get_application(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
) -> Result<Json<AidApplication>, ApiError> {
    Ok(Json(state.workflow.get(&application_id).await?))
}

#[derive(Serialize)]
pub(super) struct StepView {
    stage: WorkflowStage,
    label: &'static str,
    order: u8,
    main_path: bool,
    completed: bool,
    active: bool,
}

#[derive(Serialize)]
pub(super) struct ApplicationWorkflowResponse {
    application_id: String,
    stage: WorkflowStage,
    stage_info: StageInfo,
    terminal: bool,
    steps: Vec<StepView>,
    available_actions: Vec<AvailableActionView>,
    assigned_to: Option<String>,
    due_date: Option<String>,
    priority: Option<Priority>,
    history: Vec<HistoryEntry>,
}

pub(super) async fn get_application_workflow(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<String>,
) -> Result<Json<ApplicationWorkflowResponse>, ApiError> {
    let application = state.workflow.get(&application_id).await?;
    let engine = state.workflow.engine();
    let stage = application.stage;
    let steps = engine
        .workflow_steps()
        .into_iter()
        .map(|step| StepView {
            completed: engine.is_stage_completed(stage, step.stage),
            active: engine.is_stage_active(stage, step.stage),
            stage: step.stage,
            label: step.label,
            order: step.order,
            main_path: step.main_path,
        })
        .collect();
    let roles = auth.access().workflow_roles();

    Ok(Json(ApplicationWorkflowResponse {
        application_id: application.application_id,
        stage,
        stage_info: stage_info(stage),
        terminal: engine.is_terminal(stage),
        steps,
        available_actions: available_action_views(engine, stage, &roles),
        assigned_to: application.assigned_to,
        due_date: application.due_date,
        priority: application.priority,
        history: application.history,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub(super) struct TransitionRequest {
    #[validate(length(min = 1, max = 32))]
    action: String,
    #[validate(length(max = 2000))]
    note: Option<String>,
    #[validate(length(max = 128))]
    assigned_to: Option<String>,
    #[validate(length(max = 64))]
    due_date: Option<String>,
    #[validate(length(max = 16))]
    priority: Option<String>,
}

impl TransitionRequest {
    fn note(&self) -> Option<String> {
        self.note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
            .map(str::to_string)
    }

    fn assignment(&self) -> Result<Assignment, ApiError> {
        let priority = self
            .priority
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                Priority::parse(value).ok_or_else(|| {
                    ApiError::Validation(format!(
                        "priority '{value}' must be one of low, normal, high, urgent"
                    ))
                })
            })
            .transpose()?;
        Assignment {
            assigned_to: self.assigned_to.clone(),
            due_date: self.due_date.clone(),
            priority,
        }
        .normalized()
        .map_err(|err| ApiError::Validation(err.to_string()))
    }

    /// Identifies the request body an idempotency key was first used with.
    fn fingerprint(&self, action: WorkflowAction, assignment: &Assignment) -> String {
        json!({
            "action": action,
            "note": self.note(),
            "assigned_to": assignment.assigned_to,
            "due_date": assignment.due_date,
            "priority": assignment.priority,
        })
        .to_string()
    }
}

pub(super) async fn transition_application(
    State(state): State<AppState>,
    client_request_id: Option<Extension<ClientRequestId>>,
    Extension(auth): Extension<AuthContext>,
    Path(application_id): Path<String>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Response, ApiError> {
    let Some(Extension(ClientRequestId(request_id))) = client_request_id else {
        return Err(ApiError::Validation("x-request-id header is required".into()));
    };
    validation::validate(&payload)?;
    let action = WorkflowAction::parse(&payload.action)
        .ok_or_else(|| ApiError::Validation(format!("unknown action '{}'", payload.action)))?;
    let assignment = payload.assignment()?;
    let actor = auth.workflow_actor()?;
    let key = IdempotencyKey::transition(application_id.clone(), actor.user_id.clone(), request_id);
    let fingerprint = payload.fingerprint(action, &assignment);

    let outcome = state
        .idempotency
        .begin(&key, &fingerprint)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "idempotency begin failed");
            ApiError::Internal
        })?;

    match outcome {
        BeginOutcome::Replay(response) => Ok(to_response(response)),
        BeginOutcome::InProgress => Err(ApiError::Conflict(
            "a request with this id is already in progress".into(),
        )),
        BeginOutcome::Mismatch => Err(ApiError::Conflict(
            "request id was already used for a different request".into(),
        )),
        BeginOutcome::Started => {
            let result = apply_transition(
                &state,
                &application_id,
                action,
                &actor,
                payload.note(),
                assignment,
            )
            .await;
            observability::register_workflow_transition(
                action,
                match &result {
                    Ok(_) => "applied",
                    Err(err) => err.error_code(),
                },
            );

            let response = match result {
                Ok(body) => IdempotencyResponse {
                    status_code: StatusCode::OK.as_u16(),
                    body,
                },
                Err(err) if err.is_transient() => {
                    if let Err(release_err) = state.idempotency.release(&key).await {
                        tracing::warn!(error = %release_err, "idempotency release failed");
                    }
                    return Err(err);
                }
                Err(err) => IdempotencyResponse {
                    status_code: err.status_code().as_u16(),
                    body: err.envelope(),
                },
            };
            state
                .idempotency
                .complete(&key, &fingerprint, response.clone())
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "idempotency complete failed");
                    ApiError::Internal
                })?;
            Ok(to_response(response))
        }
    }
}

/// Reads the stored stage, enforces note requirements, then applies the
/// action and assignment conditionally on that stage.
async fn apply_transition(
    state: &AppState,
    application_id: &str,
    action: WorkflowAction,
    actor: &WorkflowActor,
    note: Option<String>,
    assignment: Assignment,
) -> Result<serde_json::Value, ApiError> {
    let current = state.workflow.get(application_id).await?;
    let previous_stage = current.stage;

    if let Ok(rule) = state
        .workflow
        .engine()
        .check(previous_stage, action, actor.roles.as_slice())
    {
        if rule.requires_note && note.is_none() {
            return Err(ApiError::Validation(format!(
                "a note is required to {action}"
            )));
        }
    }

    let updated = state
        .workflow
        .apply_assigned_action(application_id, previous_stage, action, actor, note, assignment)
        .await?;
    Ok(json!({
        "application_id": application_id,
        "action": action,
        "previous_stage": previous_stage,
        "stage": updated.stage,
        "assigned_to": updated.assigned_to,
        "due_date": updated.due_date,
        "priority": updated.priority,
    }))
}
