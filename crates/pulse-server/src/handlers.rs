//! HTTP handlers for the plain JSON routes.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use metrics::counter;
use pulse_core::messages::POST_CREATED;
use pulse_core::{ClientId, PostId, WireMessage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::errors::HubError;
use crate::metrics::POSTS_CREATED_TOTAL;
use crate::server::AppState;

/// Header naming the WebSocket connection that made the request; that
/// connection is left out of the resulting broadcast.
pub const CLIENT_ID_HEADER: &str = "x-pulse-client-id";

/// Body of `POST /posts`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostRequest {
    /// Text of the post. Must not be blank.
    #[serde(default)]
    pub post_content: String,
}

/// A post as returned to the caller and broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Server-assigned identifier.
    pub id: PostId,
    /// Text of the post.
    pub post_content: String,
    /// When the server accepted the post.
    pub created_at: DateTime<Utc>,
}

/// Errors returned by the JSON handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body failed validation.
    #[error("{0}")]
    BadRequest(String),
    /// The broadcast could not be built.
    #[error(transparent)]
    Hub(#[from] HubError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Hub(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "message": self.to_string(), "status": false }));
        (status, body).into_response()
    }
}

/// `GET /`
pub async fn home() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to pulse", "status": true }))
}

/// `POST /posts`: validate, assign an id, and broadcast `Post_Created`.
pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    if request.post_content.trim().is_empty() {
        return Err(ApiError::BadRequest("post_content must not be empty".into()));
    }

    let post = Post {
        id: PostId::new(),
        post_content: request.post_content,
        created_at: Utc::now(),
    };
    let exclude = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ClientId::from);

    let message = WireMessage::new(POST_CREATED, &post).map_err(HubError::from)?;
    let outcome = state.hub.broadcast(&message, exclude.as_ref())?;
    counter!(POSTS_CREATED_TOTAL).increment(1);

    if outcome.dropped > 0 {
        warn!(post_id = %post.id, dropped = outcome.dropped, "post not delivered to every client");
    }
    info!(post_id = %post.id, recipients = outcome.recipients, "post created");
    debug!(excluded = ?exclude, "post broadcast");

    Ok((StatusCode::CREATED, Json(post)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn bad_request_maps_to_400() {
        let resp = ApiError::BadRequest("nope".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn hub_error_maps_to_500() {
        let resp = ApiError::from(HubError::Closed).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_content_deserializes_as_empty() {
        let req: CreatePostRequest = serde_json::from_str("{}").unwrap();
        assert!(req.post_content.is_empty());
    }

    #[test]
    fn post_wire_shape() {
        let post = Post {
            id: PostId::from("p1"),
            post_content: "hello".into(),
            created_at: Utc::now(),
        };
        let msg = WireMessage::new(POST_CREATED, &post).unwrap();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "Post_Created");
        assert_eq!(value["payload"]["id"], "p1");
        assert_eq!(value["payload"]["post_content"], "hello");
        assert_matches!(value["payload"]["created_at"], serde_json::Value::String(_));
    }
}
