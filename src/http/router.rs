//! Route table built from the API specification.
//!
//! # Responsibilities
//! - Register every declared operation
//! - Serve `GET /health` from the latest health snapshot
//! - Wire up middleware (tracing, request ID)

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, MethodFilter, MethodRouter},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::deps::Dependencies;
use crate::health::HealthState;
use crate::http::api_spec::{ApiSpec, Operation};

pub const HEALTH_PATH: &str = "/health";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthState>,
    /// Backing resources for request handlers.
    pub dependencies: Dependencies,
}

/// Build the Axum router with all middleware layers.
pub fn build_router(spec: &ApiSpec, state: AppState) -> Router {
    let mut routes: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();

    for operation in &spec.operations {
        let Some(filter) = method_filter(&operation.method) else {
            continue;
        };
        let operation = Arc::new(operation.clone());
        let route = operation.route.clone();

        let method_router = routes.remove(&route).unwrap_or_else(MethodRouter::new);
        routes.insert(
            route,
            method_router.on(filter, move || async move { not_implemented(&operation) }),
        );
    }

    if !spec.declares(&Method::GET, HEALTH_PATH) {
        let method_router = routes.remove(HEALTH_PATH).unwrap_or_else(MethodRouter::new);
        routes.insert(HEALTH_PATH.to_string(), method_router.merge(get(health)));
    }

    let mut router = Router::new();
    for (route, method_router) in routes {
        router = router.route(&route, method_router);
    }

    router
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn method_filter(method: &Method) -> Option<MethodFilter> {
    let filter = match method.as_str() {
        "GET" => MethodFilter::GET,
        "PUT" => MethodFilter::PUT,
        "POST" => MethodFilter::POST,
        "DELETE" => MethodFilter::DELETE,
        "OPTIONS" => MethodFilter::OPTIONS,
        "HEAD" => MethodFilter::HEAD,
        "PATCH" => MethodFilter::PATCH,
        "TRACE" => MethodFilter::TRACE,
        _ => return None,
    };
    Some(filter)
}

/// Request handling is provided by the API implementation, not this server.
fn not_implemented(operation: &Operation) -> Response {
    tracing::debug!(
        method = %operation.method,
        path = %operation.path,
        "Operation has no handler"
    );

    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "operation": operation.operation_id,
            "method": operation.method.as_str(),
            "path": operation.path,
            "message": "operation not implemented",
        })),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.health.snapshot();
    let status = if snapshot.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(snapshot.as_ref().clone())).into_response()
}
