use axum::{Extension, Json, extract::State};
use dernek_domain::workflow::{
    WorkflowAction, WorkflowEngine, WorkflowStage, action_label, action_labels, stage_label,
    stage_labels,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::middleware::AuthContext;
use crate::{error::ApiError, state::AppState, validation};

#[derive(Serialize)]
pub(super) struct StageView {
    stage: WorkflowStage,
    label: &'static str,
    description: &'static str,
    order: u8,
    main_path: bool,
    terminal: bool,
}

#[derive(Serialize)]
pub(super) struct ActionView {
    action: WorkflowAction,
    label: &'static str,
    icon: &'static str,
}

#[derive(Serialize)]
pub(super) struct RuleView {
    from: WorkflowStage,
    action: WorkflowAction,
    to: WorkflowStage,
    allowed_roles: Vec<String>,
    requires_note: bool,
}

#[derive(Serialize)]
pub(super) struct WorkflowConfigResponse {
    stages: Vec<StageView>,
    actions: Vec<ActionView>,
    rules: Vec<RuleView>,
}

pub(super) async fn workflow_config(State(state): State<AppState>) -> Json<WorkflowConfigResponse> {
    let engine = state.workflow.engine();
    let stages = engine
        .workflow_steps()
        .into_iter()
        .map(|step| StageView {
            stage: step.stage,
            label: step.label,
            description: stage_label(step.stage).description,
            order: step.order,
            main_path: step.main_path,
            terminal: engine.is_terminal(step.stage),
        })
        .collect();
    let actions = action_labels()
        .into_iter()
        .map(|(action, label)| ActionView {
            action,
            label: label.label,
            icon: label.icon,
        })
        .collect();
    let rules = engine
        .table()
        .rules()
        .iter()
        .map(|rule| RuleView {
            from: rule.from,
            action: rule.action,
            to: rule.to,
            allowed_roles: rule.allowed_roles.clone(),
            requires_note: rule.requires_note,
        })
        .collect();
    Json(WorkflowConfigResponse {
        stages,
        actions,
        rules,
    })
}

#[derive(Serialize)]
pub(super) struct StageInfo {
    label: &'static str,
    description: &'static str,
}

pub(super) fn stage_info(stage: WorkflowStage) -> StageInfo {
    let info = stage_label(stage);
    StageInfo {
        label: info.label,
        description: info.description,
    }
}

#[derive(Serialize)]
pub(super) struct AvailableActionView {
    action: WorkflowAction,
    label: &'static str,
    icon: &'static str,
    target_stage: WorkflowStage,
    requires_note: bool,
}

pub(super) fn available_action_views(
    engine: &WorkflowEngine,
    stage: WorkflowStage,
    roles: &[String],
) -> Vec<AvailableActionView> {
    engine
        .available_actions(stage, roles)
        .into_iter()
        .filter_map(|action| engine.table().find(stage, action))
        .map(|rule| {
            let label = action_label(rule.action);
            AvailableActionView {
                action: rule.action,
                label: label.label,
                icon: label.icon,
                target_stage: rule.to,
                requires_note: rule.requires_note,
            }
        })
        .collect()
}

#[derive(Debug, Deserialize, Validate)]
pub(super) struct AvailableActionsRequest {
    #[validate(length(min = 1, max = 32))]
    current_stage: String,
}

#[derive(Serialize)]
pub(super) struct AvailableActionsResponse {
    current_stage: WorkflowStage,
    current_stage_info: StageInfo,
    roles: Vec<String>,
    actions: Vec<AvailableActionView>,
}

pub(super) async fn available_actions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<AvailableActionsRequest>,
) -> Result<Json<AvailableActionsResponse>, ApiError> {
    validation::validate(&payload)?;
    let stage = WorkflowStage::parse(&payload.current_stage).ok_or_else(|| {
        ApiError::Validation(format!("unknown stage '{}'", payload.current_stage))
    })?;
    let roles = auth.access().workflow_roles();
    let actions = available_action_views(state.workflow.engine(), stage, &roles);
    Ok(Json(AvailableActionsResponse {
        current_stage: stage,
        current_stage_info: stage_info(stage),
        roles,
        actions,
    }))
}

#[derive(Serialize)]
pub(super) struct StageCountView {
    stage: WorkflowStage,
    label: &'static str,
    count: usize,
}

#[derive(Serialize)]
pub(super) struct StageCountsResponse {
    total: usize,
    stages: Vec<StageCountView>,
}

pub(super) async fn stage_counts(
    State(state): State<AppState>,
) -> Result<Json<StageCountsResponse>, ApiError> {
    let counts = state.workflow.stage_counts().await?;
    let stages: Vec<StageCountView> = stage_labels()
        .into_iter()
        .map(|(stage, label)| StageCountView {
            stage,
            label: label.label,
            count: counts.get(&stage).copied().unwrap_or(0),
        })
        .collect();
    Ok(Json(StageCountsResponse {
        total: stages.iter().map(|view| view.count).sum(),
        stages,
    }))
}
