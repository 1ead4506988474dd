use crate::server::ServerRouter;
use axum::Router;

/// Wraps the path rejection of a typed path whose only dynamic parts are ids,
/// so that an unparsable id is answered like an unknown one.
macro_rules! id_path_rejection {
    ($name:ident => $variant:ident) => {
        pub struct $name(axum::extract::rejection::PathRejection);

        impl From<axum::extract::rejection::PathRejection> for $name {
            fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
                Self(rejection)
            }
        }

        impl axum::response::IntoResponse for $name {
            fn into_response(self) -> axum::response::Response {
                axum::response::IntoResponse::into_response(
                    crate::server::ServerError::$variant(self.0),
                )
            }
        }
    };
}

pub(crate) use id_path_rejection;

mod posts;
mod users;

/// `/api/posts/**` and `/api/users/**` together with `/api/auth`.
pub fn routes() -> ServerRouter {
    Router::new().merge(posts::routes()).merge(users::routes())
}
