use crate::store::{IdGenerator, Result, Store};
use async_trait::async_trait;
use postboard_common::{
    model::{
        Id,
        auth::{AuthTokenHash, Authentication},
        post::{
            Comment, CommentMarker, CreateComment, CreatePost, Like, LikeError, Post, PostMarker,
            sort_newest_first,
        },
        user::{CreateUser, User, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Id<UserMarker>, User>,
    authentications: HashMap<AuthTokenHash, Authentication>,
    posts: HashMap<Id<PostMarker>, Post>,
}

/// [`Store`] kept in process memory. Everything is lost on shutdown.
///
/// Every operation runs under one lock and never awaits while holding it, so
/// check-then-write sequences such as liking are atomic.
#[derive(Debug)]
pub struct MemoryStore {
    ids: IdGenerator,
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            ids: IdGenerator::new(worker_id, process_id),
            tables: Mutex::default(),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self.tables().users.get(&user_id).cloned())
    }

    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let user = User {
            id: self.ids.next(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
        };

        self.tables().users.insert(user.id, user.clone());
        debug!(user_id = %user.id, "Created user");
        Ok(user)
    }

    async fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        self.tables()
            .authentications
            .insert(authentication.token_hash.clone(), authentication.clone());
        Ok(())
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        Ok(self.tables().authentications.get(token_hash).cloned())
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self.tables().posts.values().cloned().collect();
        sort_newest_first(&mut posts);
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.tables().posts.get(&post_id).cloned())
    }

    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let post = Post::new(self.ids.next(), post.clone(), OffsetDateTime::now_utc());

        self.tables().posts.insert(post.id, post.clone());
        debug!(post_id = %post.id, "Created post");
        Ok(post)
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        Ok(self.tables().posts.remove(&post_id).is_some())
    }

    async fn like_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Result<Vec<Like>, LikeError>> {
        let mut tables = self.tables();
        let Some(post) = tables.posts.get_mut(&post_id) else {
            return Ok(Err(LikeError::PostNotFound(post_id)));
        };

        Ok(post.like(user_id).map(|()| post.likes.clone()))
    }

    async fn unlike_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Result<Vec<Like>, LikeError>> {
        let mut tables = self.tables();
        let Some(post) = tables.posts.get_mut(&post_id) else {
            return Ok(Err(LikeError::PostNotFound(post_id)));
        };

        Ok(post.unlike(user_id).map(|()| post.likes.clone()))
    }

    async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        comment: &CreateComment,
    ) -> Result<Option<Vec<Comment>>> {
        let comment = Comment::new(self.ids.next(), comment.clone(), OffsetDateTime::now_utc());

        let mut tables = self.tables();
        let comments = tables.posts.get_mut(&post_id).map(|post| {
            post.add_comment(comment);
            post.comments.clone()
        });
        Ok(comments)
    }

    async fn delete_comment(
        &self,
        post_id: Id<PostMarker>,
        comment_id: Id<CommentMarker>,
    ) -> Result<Option<Vec<Comment>>> {
        let mut tables = self.tables();
        let comments = tables.posts.get_mut(&post_id).map(|post| {
            post.remove_comment(comment_id);
            post.comments.clone()
        });
        Ok(comments)
    }
}
