use crate::server::{
    FieldError, Message, Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::{
    Id,
    post::{Comment, CommentMarker, CreateComment, CreatePost, Like, Post, PostMarker, Text},
    user::User,
};
use postboard_db::store::Store;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_post)
        .typed_get(list_posts)
        .typed_get(get_post)
        .typed_delete(delete_post)
        .typed_put(like_post)
        .typed_put(unlike_post)
        .typed_post(create_comment)
        .typed_delete(delete_comment)
}

super::id_path_rejection!(PostPathRejection => MalformedPostId);

#[derive(TypedPath)]
#[typed_path("/api/posts")]
struct PostsPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}", rejection(PostPathRejection))]
struct PostPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/like/{id}", rejection(PostPathRejection))]
struct LikePath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/unlike/{id}", rejection(PostPathRejection))]
struct UnlikePath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/comment/{id}", rejection(PostPathRejection))]
struct CommentsPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/comment/{id}/{comment_id}", rejection(PostPathRejection))]
struct CommentPath {
    id: Id<PostMarker>,
    comment_id: Id<CommentMarker>,
}

/// Body of post and comment creation. Checked by hand so that a missing or
/// blank `text` produces a field error instead of a parse failure.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct TextBody {
    text: Option<String>,
}

impl TextBody {
    fn validate(self) -> Result<Text> {
        Text::new(self.text.unwrap_or_default())
            .map_err(|_| ServerError::Validation(vec![FieldError::body("text", "text is required.")]))
    }
}

async fn fetch_author(store: &dyn Store, user: AuthenticatedUser) -> Result<User> {
    let user_id = user.user_id();
    let author = store
        .fetch_user(user_id)
        .await?
        .ok_or(ServerError::UserNotFound(user_id))?;

    Ok(author)
}

async fn create_post(
    PostsPath: PostsPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(body): Json<TextBody>,
) -> Result<Json<Post>> {
    let text = body.validate()?;
    let author = fetch_author(&*store, user).await?;

    let post = store.create_post(&CreatePost { author, text }).await?;

    info!(post_id = %post.id, user_id = %post.user, "Post created");
    Ok(Json(post))
}

async fn list_posts(
    PostsPath: PostsPath,
    State(store): State<Arc<dyn Store>>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<Post>>> {
    let posts = store.fetch_posts().await?;

    Ok(Json(posts))
}

async fn get_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn Store>>,
    _user: AuthenticatedUser,
) -> Result<Json<Post>> {
    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostNotFound(id))?;

    Ok(Json(post))
}

async fn delete_post(
    PostPath { id }: PostPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Json<Message>> {
    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostNotFound(id))?;

    if !post.is_owned_by(user.user_id()) {
        return Err(ServerError::NotAuthorized);
    }

    if !store.delete_post(id).await? {
        return Err(ServerError::PostNotFound(id));
    }

    info!(post_id = %id, "Post removed");
    Ok(Json(Message::new("Post removed")))
}

async fn like_post(
    LikePath { id }: LikePath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Like>>> {
    let likes = store.like_post(id, user.user_id()).await??;

    Ok(Json(likes))
}

async fn unlike_post(
    UnlikePath { id }: UnlikePath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Like>>> {
    let likes = store.unlike_post(id, user.user_id()).await??;

    Ok(Json(likes))
}

async fn create_comment(
    CommentsPath { id }: CommentsPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
    Json(body): Json<TextBody>,
) -> Result<Json<Vec<Comment>>> {
    let text = body.validate()?;
    let author = fetch_author(&*store, user).await?;

    let comments = store
        .create_comment(id, &CreateComment { author, text })
        .await?
        .ok_or(ServerError::PostNotFound(id))?;

    Ok(Json(comments))
}

async fn delete_comment(
    CommentPath { id, comment_id }: CommentPath,
    State(store): State<Arc<dyn Store>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Comment>>> {
    let post = store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostNotFound(id))?;

    let comment = post
        .comment(comment_id)
        .ok_or(ServerError::CommentNotFound(comment_id))?;

    if comment.user != user.user_id() {
        return Err(ServerError::NotAuthorized);
    }

    let comments = store
        .delete_comment(id, comment_id)
        .await?
        .ok_or(ServerError::PostNotFound(id))?;

    Ok(Json(comments))
}
