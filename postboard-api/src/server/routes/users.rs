use crate::server::{
    FieldError, Result, ServerError, ServerRouter, ServerState,
    auth::{AuthenticatedUser, hash_token},
    json::Json,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::{
    Id,
    auth::{AuthToken, Authentication},
    user::{CreateUser, User, UserMarker, UserName},
};
use postboard_db::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(register)
        .typed_get(get_user)
        .typed_get(current_user)
}

super::id_path_rejection!(UserPathRejection => MalformedUserId);

#[derive(TypedPath)]
#[typed_path("/api/users")]
struct UsersPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/{id}", rejection(UserPathRejection))]
struct UserPath {
    id: Id<UserMarker>,
}

#[derive(TypedPath)]
#[typed_path("/api/auth")]
struct AuthPath;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct RegisterBody {
    name: Option<String>,
    avatar: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct Registration {
    user: User,
    token: String,
}

async fn register(
    UsersPath: UsersPath,
    State(state): State<ServerState>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<Registration>> {
    let name = UserName::new(body.name.unwrap_or_default()).map_err(|_| {
        ServerError::Validation(vec![FieldError::body(
            "name",
            "Name is required and may not exceed 50 characters",
        )])
    })?;
    let avatar = body.avatar.filter(|avatar| !avatar.trim().is_empty());

    let user = state.store.create_user(&CreateUser { name, avatar }).await?;

    let token = AuthToken::generate_random(user.id);
    let token_str = token.to_string();
    let authentication = Authentication {
        user: user.id,
        token_hash: hash_token(token).await?,
        created_at: OffsetDateTime::now_utc(),
        expires_after: state.token_lifetime,
    };
    state.store.create_auth(&authentication).await?;

    info!(user_id = %user.id, "Registered user");
    Ok(Json(Registration {
        user,
        token: token_str,
    }))
}

async fn get_user(
    UserPath { id }: UserPath,
    State(store): State<Arc<dyn Store>>,
    _user: AuthenticatedUser,
) -> Result<Json<User>> {
    let user = store
        .fetch_user(id)
        .await?
        .ok_or(ServerError::UserNotFound(id))?;

    Ok(Json(user))
}

async fn current_user(
    AuthPath: AuthPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Json<User>> {
    let user_id = user.user_id();
    let user = store
        .fetch_user(user_id)
        .await?
        .ok_or(ServerError::UserNotFound(user_id))?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use crate::server::{auth::hash_token, testing::TestApp};
    use axum::http::{Method, StatusCode};
    use postboard_common::{
        model::auth::{AuthToken, Authentication},
        util::PositiveDuration,
    };
    use postboard_db::store::Store;
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    #[tokio::test]
    async fn registered_token_authenticates() {
        let app = TestApp::new();
        let (user_id, token) = app.register("Ada").await;

        let (status, user) = app.request(Method::GET, "/api/auth", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user, json!({ "_id": user_id, "name": "Ada", "avatar": null }));

        let (status, fetched) = app
            .request(Method::GET, &format!("/api/users/{user_id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, user);
    }

    #[tokio::test]
    async fn registration_requires_name() {
        let app = TestApp::new();

        for body in [json!({}), json!({ "name": " " }), json!({ "name": "x".repeat(51) })] {
            let (status, response) = app
                .request(Method::POST, "/api/users", None, Some(body))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response["errors"][0]["param"], "name");
            assert_eq!(response["errors"][0]["location"], "body");
        }
    }

    #[tokio::test]
    async fn unknown_users_are_not_found() {
        let app = TestApp::new();
        let (_, token) = app.register("Ada").await;

        for uri in ["/api/users/1", "/api/users/ada"] {
            let (status, response) = app.request(Method::GET, uri, Some(&token), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(response["msg"], "User not found");
        }
    }

    #[tokio::test]
    async fn token_of_other_user_is_rejected() {
        let app = TestApp::new();
        let (_, token) = app.register("Ada").await;
        let (other_id, _) = app.register("Grace").await;

        let mut forged: AuthToken = token.parse().unwrap();
        forged.user_id = other_id.parse::<u64>().unwrap().into();
        let forged = forged.to_string();

        let (status, response) = app.request(Method::GET, "/api/auth", Some(&forged), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response["msg"], "Token is not valid");
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let app = TestApp::new();
        let (user_id, _) = app.register("Ada").await;

        let token = AuthToken::generate_random(user_id.parse::<u64>().unwrap().into());
        let authentication = Authentication {
            user: token.user_id,
            token_hash: hash_token(token.clone()).await.unwrap(),
            created_at: OffsetDateTime::now_utc() - Duration::hours(2),
            expires_after: Some(PositiveDuration::from_seconds(3600).unwrap()),
        };
        app.store.create_auth(&authentication).await.unwrap();

        let (status, _) = app
            .request(Method::GET, "/api/auth", Some(&token.to_string()), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = TestApp::new();

        let (status, response) = app.request(Method::GET, "/api/nothing", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(response, json!({ "msg": "Not found" }));
    }
}
