use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use geochat_agent::runtime::{ChatRuntime, PreferencesView, RuntimeError, TurnReply};
use geochat_core::domain::message::Message;
use geochat_core::domain::user::UserId;
use geochat_core::errors::{ApplicationError, InterfaceError};
use geochat_core::validation::PreferencesInput;

use crate::identity;
use crate::rate_limit::{client_key, denial_response, RateLimiter};

const COMPLETION_UNAVAILABLE: &str = "Error communicating with the language model";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ChatRuntime>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub default_user: UserId,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamRequest {
    #[serde(default)]
    pub message: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/messages", get(messages))
        .route("/preferences", get(get_preferences).post(save_preferences))
        .route("/stream", post(stream))
        .with_state(state)
}

fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn api_error(error: RuntimeError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    let mapped = ApplicationError::from(error).into_interface(correlation_id);
    let status = match &mapped {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(
            event_name = "http.request.failed",
            correlation_id = %mapped.correlation_id(),
            error = %mapped,
            "request failed"
        );
    } else {
        info!(
            event_name = "http.request.rejected",
            correlation_id = %mapped.correlation_id(),
            error = %mapped,
            "request rejected"
        );
    }

    (
        status,
        Json(ApiError {
            error: mapped.user_message().to_string(),
            correlation_id: mapped.correlation_id().to_string(),
        }),
    )
}

fn malformed_body(rejection: JsonRejection, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    warn!(
        event_name = "http.request.malformed",
        correlation_id,
        error = %rejection,
        "request body could not be decoded"
    );
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: "Request body must be valid JSON".to_string(),
            correlation_id: correlation_id.to_string(),
        }),
    )
}

pub async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Message>>> {
    let correlation_id = correlation_id();
    let user = identity::user_id(&headers, &state.default_user);

    state.runtime.messages(&user).await.map(Json).map_err(|e| api_error(e, &correlation_id))
}

pub async fn get_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PreferencesView>> {
    let correlation_id = correlation_id();
    let user = identity::user_id(&headers, &state.default_user);

    state.runtime.preferences(&user).await.map(Json).map_err(|e| api_error(e, &correlation_id))
}

pub async fn save_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PreferencesInput>, JsonRejection>,
) -> ApiResult<Json<PreferencesView>> {
    let correlation_id = correlation_id();
    let user = identity::user_id(&headers, &state.default_user);
    let Json(input) = payload.map_err(|rejection| malformed_body(rejection, &correlation_id))?;

    state
        .runtime
        .save_preferences(&user, &input)
        .await
        .map(Json)
        .map_err(|e| api_error(e, &correlation_id))
}

pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<StreamRequest>, JsonRejection>,
) -> Response {
    let correlation_id = correlation_id();

    let decision = state.rate_limiter.check(&client_key(&headers)).await;
    if !decision.allowed {
        return denial_response(&decision);
    }

    let user = identity::user_id(&headers, &state.default_user);
    let mut response = match payload {
        Err(rejection) => malformed_body(rejection, &correlation_id).into_response(),
        Ok(Json(request)) => {
            match state.runtime.handle_message(&user, &request.message, &correlation_id).await {
                Ok(TurnReply::Directive(text)) => plain_text(StatusCode::OK, text),
                Ok(TurnReply::Stream(relay)) => {
                    let body = relay.body.map(Ok::<Bytes, Infallible>);
                    streaming_text(Body::from_stream(body))
                }
                Err(RuntimeError::CompletionUnavailable(error)) => {
                    error!(
                        event_name = "http.stream.completion_unavailable",
                        correlation_id = %correlation_id,
                        user_id = %user,
                        error = %error,
                        "could not start completion stream"
                    );
                    plain_text(StatusCode::INTERNAL_SERVER_ERROR, COMPLETION_UNAVAILABLE.to_string())
                }
                Err(error) => api_error(error, &correlation_id).into_response(),
            }
        }
    };

    decision.apply_headers(response.headers_mut());
    response
}

fn plain_text(status: StatusCode, text: String) -> Response {
    (status, [(header::CONTENT_TYPE, HeaderValue::from_static(PLAIN_TEXT))], text).into_response()
}

fn streaming_text(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(PLAIN_TEXT));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}
