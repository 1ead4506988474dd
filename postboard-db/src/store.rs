use async_trait::async_trait;
use postboard_common::{
    model::{
        Id, ModelValidationError, PostboardSnowflakeGenerator,
        auth::{AuthTokenHash, Authentication},
        post::{Comment, CommentMarker, CreateComment, CreatePost, Like, LikeError, Post, PostMarker},
        user::{CreateUser, User, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use std::{
    fmt::Debug,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence for users, credentials and posts.
///
/// Like and unlike report a rejected transition in the inner result; the
/// outer one is reserved for storage failures.
#[async_trait]
pub trait Store: Debug + Send + Sync {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn create_user(&self, user: &CreateUser) -> Result<User>;

    async fn create_auth(&self, authentication: &Authentication) -> Result<()>;

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>>;

    /// All posts, newest first.
    async fn fetch_posts(&self) -> Result<Vec<Post>>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    async fn create_post(&self, post: &CreatePost) -> Result<Post>;

    /// Returns whether a post was removed.
    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool>;

    async fn like_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Result<Vec<Like>, LikeError>>;

    async fn unlike_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Result<Vec<Like>, LikeError>>;

    /// The post's comments after adding, or `None` if the post does not exist.
    async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        comment: &CreateComment,
    ) -> Result<Option<Vec<Comment>>>;

    /// The post's remaining comments, or `None` if the post does not exist.
    async fn delete_comment(
        &self,
        post_id: Id<PostMarker>,
        comment_id: Id<CommentMarker>,
    ) -> Result<Option<Vec<Comment>>>;
}

/// Shared snowflake source for every record kind.
#[derive(Debug)]
pub(crate) struct IdGenerator(Mutex<PostboardSnowflakeGenerator>);

impl IdGenerator {
    pub(crate) fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self(Mutex::new(PostboardSnowflakeGenerator::new(
            worker_id, process_id,
        )))
    }

    pub(crate) fn next<Marker>(&self) -> Id<Marker> {
        // The generator holds no invariant a panicking holder could break.
        let mut generator = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        generator.generate().into()
    }
}
