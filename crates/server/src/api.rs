use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use reimburse_core::domain::request::{
    NewRequest, RequestListing, RequestQuery, RequestRecord, RequestUpdate,
};
use reimburse_core::errors::{ApplicationError, DomainError, InterfaceError};
use reimburse_core::identity::{bearer_token, IdentityResolver};
use reimburse_core::lifecycle::Caller;

use crate::service::RequestService;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    service: Arc<RequestService>,
    identity: Arc<dyn IdentityResolver>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListParams {
    pub idir: Option<String>,
    pub after: Option<String>,
    pub before: Option<String>,
    #[serde(default)]
    pub minimal: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

/// Failure response. Only the fixed user message and the correlation id leave the server.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        if error.is_processing_failure() {
            error!(
                event_name = "api.request_failed",
                correlation_id,
                error = %error,
                "request processing failed"
            );
        } else {
            warn!(
                event_name = "api.request_rejected",
                correlation_id,
                error = %error,
                "request rejected"
            );
        }
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(service: Arc<RequestService>, identity: Arc<dyn IdentityResolver>) -> Router {
    Router::new()
        .route("/api/requests", post(create_request).get(list_requests))
        .route("/api/requests/{id}", get(get_request).patch(update_request))
        .with_state(ApiState { service, identity })
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn authenticate(state: &ApiState, headers: &HeaderMap) -> Result<Caller, ApplicationError> {
    let header = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    let token = bearer_token(header)?;
    Ok(state.identity.resolve(token).await?)
}

fn malformed_body(rejection: impl std::fmt::Display) -> ApplicationError {
    ApplicationError::Domain(DomainError::InvalidSubmission(rejection.to_string()))
}

async fn create_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<NewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RequestRecord>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let result: Result<_, ApplicationError> = async {
        let caller = authenticate(&state, &headers).await?;
        let Json(submission) = payload.map_err(malformed_body)?;
        state.service.create(&caller, submission, &correlation_id).await
    }
    .await;

    result
        .map(|record| (StatusCode::CREATED, Json(record)))
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<RequestListing>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let result: Result<_, ApplicationError> = async {
        let caller = authenticate(&state, &headers).await?;
        let Query(params) = params.map_err(|rejection| {
            ApplicationError::Domain(DomainError::InvalidFilter(rejection.to_string()))
        })?;
        let query = RequestQuery::from_params(
            params.idir,
            params.after.as_deref(),
            params.before.as_deref(),
        )?;
        state.service.list(&caller, query, params.minimal).await
    }
    .await;

    result.map(Json).map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn get_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RequestRecord>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let result: Result<_, ApplicationError> = async {
        let caller = authenticate(&state, &headers).await?;
        state.service.get(&caller, &id).await
    }
    .await;

    result.map(Json).map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn update_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<RequestUpdate>, JsonRejection>,
) -> Result<Json<RequestRecord>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let result: Result<_, ApplicationError> = async {
        let caller = authenticate(&state, &headers).await?;
        let Json(update) = payload.map_err(malformed_body)?;
        state.service.update(&caller, &id, update, &correlation_id).await
    }
    .await;

    result.map(Json).map_err(|error| ApiError::from_application(error, &correlation_id))
}
