use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use postboard_common::{
    model::{
        Id,
        auth::{AuthTokenDecodeError, AuthTokenHashError},
        post::{CommentMarker, LikeError, PostMarker},
        user::UserMarker,
    },
    util::PositiveDuration,
};
use postboard_db::store::{DbError, Store};
use serde::Serialize;
use std::{borrow::Cow, sync::Arc};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, error};

mod auth;
mod json;
mod routes;
#[cfg(test)]
mod testing;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub store: Arc<dyn Store>,
    /// Lifetime of newly issued tokens; `None` issues tokens that never expire.
    #[from_ref(skip)]
    pub token_lifetime: Option<PositiveDuration>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Malformed post id: {0}")]
    MalformedPostId(PathRejection),
    #[error("Malformed user id: {0}")]
    MalformedUserId(PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Request failed validation: {0:?}")]
    Validation(Vec<FieldError>),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error("Blocking task failed: {0}")]
    BlockingTask(#[from] JoinError),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error("User is not allowed to modify this resource")]
    NotAuthorized,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Like(#[from] LikeError),
    #[error("Post with id {0} was not found.")]
    PostNotFound(Id<PostMarker>),
    #[error("Comment with id {0} was not found.")]
    CommentNotFound(Id<CommentMarker>),
    #[error("User with id {0} was not found.")]
    UserNotFound(Id<UserMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::MalformedPostId(_)
            | ServerError::MalformedUserId(_)
            | ServerError::PostNotFound(_)
            | ServerError::CommentNotFound(_)
            | ServerError::UserNotFound(_)
            | ServerError::Like(LikeError::PostNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_)
            | ServerError::InvalidToken
            | ServerError::NotAuthorized => StatusCode::UNAUTHORIZED,
            ServerError::JsonRejection(_)
            | ServerError::Validation(_)
            | ServerError::Like(LikeError::AlreadyLiked | LikeError::NotLiked) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::BlockingTask(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to clients. Server-side failures stay opaque.
    fn message(&self) -> Cow<'static, str> {
        match self {
            ServerError::UnknownRoute(_) => "Not found".into(),
            ServerError::MalformedPostId(_)
            | ServerError::PostNotFound(_)
            | ServerError::Like(LikeError::PostNotFound(_)) => "Post not found.".into(),
            ServerError::CommentNotFound(_) => "Comment does not exist".into(),
            ServerError::MalformedUserId(_) | ServerError::UserNotFound(_) => {
                "User not found".into()
            }
            ServerError::JsonRejection(rejection) => rejection.body_text().into(),
            ServerError::Validation(_) => "Invalid request".into(),
            ServerError::InvalidAuthorizationHeader(rejection) if rejection.is_missing() => {
                "No token, authorization denied".into()
            }
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_)
            | ServerError::InvalidToken => "Token is not valid".into(),
            ServerError::NotAuthorized => "User not authorized".into(),
            ServerError::Like(like_error) => like_error.to_string().into(),
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::BlockingTask(_) => "Server error".into(),
        }
    }
}

/// A single failed field check, shaped like express-validator output.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct FieldError {
    pub msg: &'static str,
    pub param: &'static str,
    pub location: &'static str,
}

impl FieldError {
    #[must_use]
    pub fn body(param: &'static str, msg: &'static str) -> Self {
        Self {
            msg,
            param,
            location: "body",
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Message {
    pub msg: Cow<'static, str>,
}

impl Message {
    #[must_use]
    pub fn new(msg: impl Into<Cow<'static, str>>) -> Self {
        Self { msg: msg.into() }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(untagged)]
enum ErrorResponse {
    Fields { errors: Vec<FieldError> },
    Message(Message),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
        } else {
            debug!(error = %self, %status, "Rejecting request");
        }

        let error_response = match self {
            ServerError::Validation(errors) => ErrorResponse::Fields { errors },
            other => ErrorResponse::Message(Message::new(other.message())),
        };
        (status, Json(error_response)).into_response()
    }
}
