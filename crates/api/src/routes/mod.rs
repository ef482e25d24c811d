mod applications;
mod workflow;

use axum::{
    Extension, Json, Router,
    extract::State,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use dernek_domain::permissions::permission_label;
use dernek_domain::ports::idempotency::IdempotencyResponse;
use serde::Serialize;
use std::time::Duration;

use crate::middleware::AuthContext;
use crate::{error::ApiError, middleware as app_middleware, observability, state::AppState};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RATE_LIMIT_PER_SECOND: u64 = 20;
const RATE_LIMIT_BURST: u32 = 60;

pub fn router(state: AppState) -> Router {
    let beneficiaries = Router::new()
        .route("/v1/workflow/config", get(workflow::workflow_config))
        .route(
            "/v1/workflow/available-actions",
            post(workflow::available_actions),
        )
        .route("/v1/workflow/stage-counts", get(workflow::stage_counts))
        .route("/v1/applications", post(applications::create_application))
        .route(
            "/v1/applications/:application_id",
            get(applications::get_application),
        )
        .route(
            "/v1/applications/:application_id/workflow",
            get(applications::get_application_workflow)
                .patch(applications::transition_application),
        )
        .route_layer(middleware::from_fn(
            app_middleware::require_beneficiaries_access,
        ));

    let protected = Router::new()
        .route("/v1/me/permissions", get(me_permissions))
        .merge(beneficiaries)
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer(REQUEST_TIMEOUT))
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(middleware::from_fn(
            app_middleware::client_request_id_middleware,
        ))
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.is_test() {
        app = app.layer(app_middleware::rate_limit_layer(
            RATE_LIMIT_PER_SECOND,
            RATE_LIMIT_BURST,
        ));
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

#[derive(Serialize)]
struct PermissionView {
    permission: String,
    label: Option<&'static str>,
}

#[derive(Serialize)]
struct MePermissionsResponse {
    user_id: String,
    username: String,
    role: String,
    is_admin: bool,
    permissions: Vec<PermissionView>,
    workflow_roles: Vec<String>,
}

async fn me_permissions(
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<MePermissionsResponse>, ApiError> {
    let identity = auth.identity()?;
    let access = auth.access();
    let permissions = access
        .effective_permissions()
        .into_vec()
        .into_iter()
        .map(|permission| PermissionView {
            label: permission_label(&permission),
            permission,
        })
        .collect();
    Ok(Json(MePermissionsResponse {
        user_id: identity.user_id,
        username: identity.username,
        is_admin: access.is_admin(),
        workflow_roles: access.workflow_roles(),
        role: access.role,
        permissions,
    }))
}

fn to_response(response: IdempotencyResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}
