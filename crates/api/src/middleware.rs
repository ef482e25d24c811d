use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dernek_domain::auth::UserAccess;
use dernek_domain::identity::{ActorIdentity, WorkflowActor};
use dernek_domain::permissions::BENEFICIARIES_ACCESS;
use governor::middleware::NoOpMiddleware;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_governor::GovernorLayer;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

use crate::error::ApiError;
use crate::observability;
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const SESSION_COOKIE: &str = "dk_session";

const MAX_CORRELATION_ID_LEN: usize = 128;

#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

/// The `x-request-id` the client sent, captured before a server id can be
/// minted in its place. Absent when the client sent none.
#[derive(Clone, Debug)]
pub struct ClientRequestId(pub String);

/// Who is calling. `access` is `None` for anonymous requests and for tokens
/// whose preferences blob failed validation.
#[derive(Clone, Debug, Default)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub access: Option<UserAccess>,
    pub is_authenticated: bool,
}

impl AuthContext {
    pub fn identity(&self) -> Result<ActorIdentity, ApiError> {
        let user_id = non_blank(self.user_id.as_deref()).ok_or(ApiError::Unauthorized)?;
        let username = non_blank(self.username.as_deref()).unwrap_or(user_id);
        Ok(ActorIdentity {
            user_id: user_id.to_string(),
            username: username.to_string(),
        })
    }

    /// Access for permission checks; a missing blob grants nothing.
    pub fn access(&self) -> UserAccess {
        self.access.clone().unwrap_or_default()
    }

    pub fn workflow_actor(&self) -> Result<WorkflowActor, ApiError> {
        let roles = self.access().workflow_roles();
        Ok(WorkflowActor::new(self.identity()?, roles))
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.access
            .as_ref()
            .is_some_and(|access| access.effective_permissions().contains(permission))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    prefs: Option<serde_json::Value>,
}

impl SessionClaims {
    fn into_context(self) -> AuthContext {
        let access = self
            .prefs
            .as_ref()
            .and_then(|prefs| match UserAccess::from_preferences(prefs) {
                Ok(access) => Some(access),
                Err(err) => {
                    tracing::warn!(user_id = %self.sub, error = %err, "ignoring malformed preferences");
                    None
                }
            });
        AuthContext {
            username: self.name.or_else(|| Some(self.sub.clone())),
            user_id: Some(self.sub),
            access,
            is_authenticated: true,
        }
    }
}

/// `exp` is required and checked by `Validation`.
fn decode_session(token: &str, secret: &str) -> Option<AuthContext> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    match decode::<SessionClaims>(token, &key, &Validation::new(Algorithm::HS256)) {
        Ok(data) => Some(data.claims.into_context()),
        Err(err) => {
            tracing::warn!(error = %err, "rejected session token");
            None
        }
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let context = session_token(req.headers())
        .and_then(|token| decode_session(token, &state.config.jwt_secret))
        .unwrap_or_default();
    req.extensions_mut().insert(context);
    next.run(req).await
}

fn auth_context(req: &Request<Body>) -> Option<&AuthContext> {
    req.extensions().get::<AuthContext>()
}

pub async fn require_auth_middleware(req: Request<Body>, next: Next) -> Response {
    if auth_context(&req).is_some_and(|ctx| ctx.is_authenticated) {
        return next.run(req).await;
    }
    ApiError::Unauthorized.into_response()
}

/// Gate for the beneficiaries module. Runs after `require_auth_middleware`.
pub async fn require_beneficiaries_access(req: Request<Body>, next: Next) -> Response {
    if auth_context(&req).is_some_and(|ctx| ctx.has_permission(BENEFICIARIES_ACCESS)) {
        return next.run(req).await;
    }
    ApiError::Forbidden(format!("{BENEFICIARIES_ACCESS} is required")).into_response()
}

/// Keeps a caller-supplied correlation id when it is printable and short,
/// otherwise mints a fresh one. Echoed on the response.
pub async fn correlation_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let name = HeaderName::from_static(CORRELATION_ID_HEADER);
    let value = req
        .headers()
        .get(&name)
        .filter(|value| value.len() <= MAX_CORRELATION_ID_LEN && value.to_str().is_ok())
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::now_v7().to_string()).ok());

    let Some(value) = value else {
        return next.run(req).await;
    };
    req.headers_mut().insert(name.clone(), value.clone());
    if let Ok(id) = value.to_str() {
        req.extensions_mut().insert(CorrelationId(id.to_string()));
    }

    let mut response = next.run(req).await;
    response.headers_mut().insert(name, value);
    response
}

/// Must sit outside `set_request_id_layer`.
pub async fn client_request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let supplied = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    if let Some(id) = supplied {
        req.extensions_mut().insert(ClientRequestId(id));
    }
    next.run(req).await
}

pub async fn metrics_layer(req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_string(), |path| path.as_str().to_string());
    let response = next.run(req).await;
    observability::register_http_request(
        method.as_str(),
        &route,
        response.status(),
        started.elapsed(),
    );
    response
}

#[derive(Clone)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::now_v7().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::x_request_id(UuidRequestId)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

#[derive(Clone, Default)]
pub(crate) struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, req: &Request<B>) -> Span {
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map_or("-", MatchedPath::as_str);
        let correlation_id = req
            .extensions()
            .get::<CorrelationId>()
            .map_or("-", |id| id.0.as_str());
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        info_span!(
            "http_request",
            method = %req.method(),
            uri = %req.uri(),
            route = %route,
            request_id = %request_id,
            correlation_id = %correlation_id
        )
    }
}

pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan> {
    TraceLayer::new_for_http().make_span_with(RequestSpan)
}

pub fn timeout_layer(limit: Duration) -> TimeoutLayer {
    TimeoutLayer::new(limit)
}

pub type RateLimitLayer = GovernorLayer<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per-peer-IP token bucket.
pub fn rate_limit_layer(per_second: u64, burst: u32) -> RateLimitLayer {
    let config = GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(burst)
        .finish()
        .unwrap_or_else(|| {
            tracing::error!(per_second, burst, "invalid rate limit; using governor defaults");
            GovernorConfig::default()
        });
    GovernorLayer {
        config: Arc::new(config),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE)
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
}

/// Bearer header first, then the session cookie.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; dk_session=xyz"),
        );
        assert_eq!(session_token(&headers), Some("abc"));
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; dk_session=xyz; lang=tr"),
        );
        assert_eq!(session_token(&headers), Some("xyz"));
    }

    #[test]
    fn empty_credentials_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert(header::COOKIE, HeaderValue::from_static("dk_session="));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn anonymous_context_has_no_identity() {
        let ctx = AuthContext::default();
        assert!(matches!(ctx.identity(), Err(ApiError::Unauthorized)));
        assert!(ctx.access().effective_permissions().is_empty());
        assert!(!ctx.has_permission(BENEFICIARIES_ACCESS));
    }

    #[test]
    fn claims_without_name_fall_back_to_subject() {
        let ctx = SessionClaims {
            sub: "u-7".into(),
            name: None,
            prefs: Some(json!({ "role": "Reviewer", "permissions": [BENEFICIARIES_ACCESS] })),
        }
        .into_context();
        let actor = ctx.workflow_actor().expect("actor");
        assert_eq!(actor.username, "u-7");
        assert!(actor.roles.iter().any(|role| role == "reviewer"));
        assert!(ctx.has_permission(BENEFICIARIES_ACCESS));
    }

    #[test]
    fn malformed_preferences_leave_access_empty() {
        let ctx = SessionClaims {
            sub: "u-7".into(),
            name: Some("Ayşe".into()),
            prefs: Some(json!(["not", "an", "object"])),
        }
        .into_context();
        assert!(ctx.is_authenticated);
        assert!(ctx.access.is_none());
    }
}
