//! Request handlers for the `/api/v1` routes.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keel_core::{node_set, AutoScalingGroup, CoreError};
use serde_json::json;
use tracing::info;

use crate::dto::{
    asg_id, AddMetricsRequest, AddNodeRequest, AsgQuery, ChangePolicyRequest, RemoveAsgRequest,
    RemoveNodeRequest, SetupAsgRequest,
};
use crate::ApiState;

/// Error payload: `{"error": "..."}` with a matching status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::ConstructionInvalid(_)
            | CoreError::NotSetUp(_)
            | CoreError::Deleted(_)
            | CoreError::UnknownId(_)
            | CoreError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            CoreError::Busy(_) => StatusCode::CONFLICT,
            CoreError::ProvisioningFailed(_)
            | CoreError::TerminationFailed(_)
            | CoreError::ExecutionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

fn unknown_asg(id: &str) -> ApiError {
    ApiError::bad_request(format!("unknown auto-scaling group '{id}'"))
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Create an ASG from the request payload and start its control loop.
pub async fn create_asg(
    State(state): State<ApiState>,
    Json(req): Json<SetupAsgRequest>,
) -> Result<Response, ApiError> {
    let mut policies = Vec::new();
    if let Some(dto) = req.health_policy {
        policies.push(dto.into_domain()?);
    }

    let mut nodes = Vec::new();
    for dto in req.nodes {
        nodes.push(dto.into_domain()?);
    }

    let asg = Arc::new(AutoScalingGroup::new(req.id.as_str()));
    asg.setup(node_set(nodes), policies)?;

    info!(asg = %req.id, "registering auto-scaling group");
    state.supervisor.add(asg);

    Ok((StatusCode::CREATED, Json(json!({}))).into_response())
}

/// Stop an ASG's control loop and drop it from the registry.
pub async fn remove_asg(
    State(state): State<ApiState>,
    Json(req): Json<RemoveAsgRequest>,
) -> Result<Response, ApiError> {
    info!(asg = %req.id, "removing auto-scaling group");
    state.supervisor.remove(&asg_id(&req.id));
    Ok((StatusCode::CREATED, Json(json!({}))).into_response())
}

pub async fn read_asg(
    State(state): State<ApiState>,
    Query(query): Query<AsgQuery>,
) -> Result<Response, ApiError> {
    let asg = state
        .supervisor
        .get(&asg_id(&query.id))
        .ok_or_else(|| unknown_asg(&query.id))?;
    Ok(Json(asg.snapshot()).into_response())
}

pub async fn add_metrics(
    State(state): State<ApiState>,
    Json(req): Json<AddMetricsRequest>,
) -> Result<Response, ApiError> {
    let asg = state
        .supervisor
        .get(&asg_id(&req.id))
        .ok_or_else(|| unknown_asg(&req.id))?;
    asg.add_metrics(&asg_id(&req.node_id), req.series())?;
    Ok(StatusCode::OK.into_response())
}

/// Replace (or install) the policy with the request's policy id.
pub async fn change_policy(
    State(state): State<ApiState>,
    Json(req): Json<ChangePolicyRequest>,
) -> Result<Response, ApiError> {
    let asg = state
        .supervisor
        .get(&asg_id(&req.id))
        .ok_or_else(|| unknown_asg(&req.id))?;
    asg.change_policy(req.health_policy.into_domain()?)?;
    Ok(StatusCode::OK.into_response())
}

pub async fn read_nodes(
    State(state): State<ApiState>,
    Query(query): Query<AsgQuery>,
) -> Result<Response, ApiError> {
    let asg = state
        .supervisor
        .get(&asg_id(&query.id))
        .ok_or_else(|| unknown_asg(&query.id))?;
    Ok(Json(asg.nodes_snapshot()).into_response())
}

pub async fn add_node(
    State(state): State<ApiState>,
    Json(req): Json<AddNodeRequest>,
) -> Result<Response, ApiError> {
    let asg = state
        .supervisor
        .get(&asg_id(&req.id))
        .ok_or_else(|| unknown_asg(&req.id))?;
    asg.add_node(req.node.into_domain()?)?;
    Ok(StatusCode::OK.into_response())
}

pub async fn remove_node(
    State(state): State<ApiState>,
    Json(req): Json<RemoveNodeRequest>,
) -> Result<Response, ApiError> {
    let asg = state
        .supervisor
        .get(&asg_id(&req.id))
        .ok_or_else(|| unknown_asg(&req.id))?;
    asg.remove_node(&asg_id(&req.node_id))?;
    Ok(StatusCode::OK.into_response())
}
