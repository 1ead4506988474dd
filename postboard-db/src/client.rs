use crate::{
    record::{AuthenticationRecord, CommentRecord, LikeRecord, PostRecord, UserRecord},
    store::{IdGenerator, Result, Store},
};
use async_trait::async_trait;
use postboard_common::{
    model::{
        Id,
        auth::{AuthTokenHash, Authentication},
        post::{Comment, CommentMarker, CreateComment, CreatePost, Like, LikeError, Post, PostMarker},
        user::{CreateUser, User, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{PgExecutor, PgPool, postgres::PgPoolOptions, query, query_as, query_scalar};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// PostgreSQL backed [`Store`].
#[derive(Debug)]
pub struct DbClient {
    pool: PgPool,
    ids: IdGenerator,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            pool,
            ids: IdGenerator::new(worker_id, process_id),
        }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn fetch_likes<'e>(
        executor: impl PgExecutor<'e>,
        post_id: Id<PostMarker>,
    ) -> Result<Vec<Like>> {
        let records = query_as::<_, LikeRecord>(
            "
            SELECT
                likes.post_snowflake,
                likes.user_snowflake
            FROM
                posts.likes
            WHERE
                likes.post_snowflake = $1
            ORDER BY
                likes.like_snowflake DESC
            ",
        )
        .bind(post_id.to_db())
        .fetch_all(executor)
        .await?;

        Ok(records.into_iter().map(Like::from).collect())
    }

    async fn fetch_comments<'e>(
        executor: impl PgExecutor<'e>,
        post_id: Id<PostMarker>,
    ) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.comment_snowflake,
                comments.post_snowflake,
                comments.user_snowflake,
                comments.comment_text,
                comments.author_name,
                comments.author_avatar,
                comments.created_at
            FROM
                posts.comments
            WHERE
                comments.post_snowflake = $1
            ORDER BY
                comments.comment_snowflake DESC
            ",
        )
        .bind(post_id.to_db())
        .fetch_all(executor)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    /// Attaches likes and comments to post rows, keeping the row order.
    async fn assemble_posts(&self, records: Vec<PostRecord>) -> Result<Vec<Post>> {
        let post_snowflakes: Vec<i64> = records.iter().map(|post| post.post_snowflake).collect();

        let like_records = query_as::<_, LikeRecord>(
            "
            SELECT
                likes.post_snowflake,
                likes.user_snowflake
            FROM
                posts.likes
            WHERE
                likes.post_snowflake = ANY($1)
            ORDER BY
                likes.like_snowflake DESC
            ",
        )
        .bind(&post_snowflakes)
        .fetch_all(&self.pool)
        .await?;

        let comment_records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.comment_snowflake,
                comments.post_snowflake,
                comments.user_snowflake,
                comments.comment_text,
                comments.author_name,
                comments.author_avatar,
                comments.created_at
            FROM
                posts.comments
            WHERE
                comments.post_snowflake = ANY($1)
            ORDER BY
                comments.comment_snowflake DESC
            ",
        )
        .bind(&post_snowflakes)
        .fetch_all(&self.pool)
        .await?;

        let mut likes: HashMap<i64, Vec<Like>> = HashMap::new();
        for record in like_records {
            likes
                .entry(record.post_snowflake)
                .or_default()
                .push(record.into());
        }

        let mut comments: HashMap<i64, Vec<Comment>> = HashMap::new();
        for record in comment_records {
            comments
                .entry(record.post_snowflake)
                .or_default()
                .push(record.try_into()?);
        }

        let posts = records
            .into_iter()
            .map(|record| {
                let post_likes = likes.remove(&record.post_snowflake).unwrap_or_default();
                let post_comments = comments.remove(&record.post_snowflake).unwrap_or_default();
                record.into_post(post_likes, post_comments)
            })
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn post_exists<'e>(
        executor: impl PgExecutor<'e>,
        post_id: Id<PostMarker>,
    ) -> Result<bool> {
        let exists = query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM posts.posts WHERE posts.post_snowflake = $1)",
        )
        .bind(post_id.to_db())
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl Store for DbClient {
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_snowflake,
                users.name,
                users.avatar
            FROM
                users.users
            WHERE
                users.user_snowflake = $1
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let user_id = self.ids.next::<UserMarker>();

        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (user_snowflake, name, avatar)
            VALUES ($1, $2, $3)
            RETURNING user_snowflake, name, avatar
            ",
        )
        .bind(user_id.to_db())
        .bind(user.name.get())
        .bind(user.avatar.as_deref())
        .fetch_one(&self.pool)
        .await?;

        debug!(%user_id, "Created user");
        Ok(record.try_into()?)
    }

    async fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        query(
            "
            INSERT INTO auth.tokens (token_hash, user_snowflake, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&authentication.token_hash.0[..])
        .bind(authentication.user.to_db())
        .bind(authentication.created_at)
        .bind(
            authentication
                .expires_after
                .map(|lifetime| lifetime.whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT
                tokens.user_snowflake,
                tokens.token_hash,
                tokens.created_at,
                tokens.expires_after_seconds
            FROM
                auth.tokens
            WHERE
                tokens.token_hash = $1
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.user_snowflake,
                posts.post_text,
                posts.author_name,
                posts.author_avatar,
                posts.created_at
            FROM
                posts.posts
            ORDER BY
                posts.created_at DESC,
                posts.post_snowflake DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        self.assemble_posts(records).await
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.user_snowflake,
                posts.post_text,
                posts.author_name,
                posts.author_avatar,
                posts.created_at
            FROM
                posts.posts
            WHERE
                posts.post_snowflake = $1
            ",
        )
        .bind(post_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        let likes = Self::fetch_likes(&self.pool, post_id).await?;
        let comments = Self::fetch_comments(&self.pool, post_id).await?;
        Ok(Some(record.into_post(likes, comments)?))
    }

    #[instrument(skip(self))]
    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let post_id = self.ids.next::<PostMarker>();

        let record = query_as::<_, PostRecord>(
            "
            INSERT INTO posts.posts (post_snowflake, user_snowflake, post_text, author_name, author_avatar)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING post_snowflake, user_snowflake, post_text, author_name, author_avatar, created_at
            ",
        )
        .bind(post_id.to_db())
        .bind(post.author.id.to_db())
        .bind(post.text.get())
        .bind(post.author.name.get())
        .bind(post.author.avatar.as_deref())
        .fetch_one(&self.pool)
        .await?;

        debug!(%post_id, "Created post");
        Ok(record.into_post(Vec::new(), Vec::new())?)
    }

    #[instrument(skip(self))]
    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let deleted = query("DELETE FROM posts.posts WHERE posts.post_snowflake = $1")
            .bind(post_id.to_db())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    #[instrument(skip(self))]
    async fn like_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Result<Vec<Like>, LikeError>> {
        let like_snowflake = self.ids.next::<()>();
        let mut transaction = self.pool.begin().await?;

        if !Self::post_exists(&mut *transaction, post_id).await? {
            return Ok(Err(LikeError::PostNotFound(post_id)));
        }

        let inserted = query(
            "
            INSERT INTO posts.likes (post_snowflake, user_snowflake, like_snowflake)
            VALUES ($1, $2, $3)
            ON CONFLICT (post_snowflake, user_snowflake) DO NOTHING
            ",
        )
        .bind(post_id.to_db())
        .bind(user_id.to_db())
        .bind(like_snowflake.to_db())
        .execute(&mut *transaction)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(Err(LikeError::AlreadyLiked));
        }

        let likes = Self::fetch_likes(&mut *transaction, post_id).await?;
        transaction.commit().await?;

        Ok(Ok(likes))
    }

    #[instrument(skip(self))]
    async fn unlike_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<Result<Vec<Like>, LikeError>> {
        let mut transaction = self.pool.begin().await?;

        if !Self::post_exists(&mut *transaction, post_id).await? {
            return Ok(Err(LikeError::PostNotFound(post_id)));
        }

        let deleted = query(
            "
            DELETE FROM posts.likes
            WHERE likes.post_snowflake = $1 AND likes.user_snowflake = $2
            ",
        )
        .bind(post_id.to_db())
        .bind(user_id.to_db())
        .execute(&mut *transaction)
        .await?
        .rows_affected();

        if deleted == 0 {
            return Ok(Err(LikeError::NotLiked));
        }

        let likes = Self::fetch_likes(&mut *transaction, post_id).await?;
        transaction.commit().await?;

        Ok(Ok(likes))
    }

    #[instrument(skip(self))]
    async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        comment: &CreateComment,
    ) -> Result<Option<Vec<Comment>>> {
        let comment_id = self.ids.next::<CommentMarker>();
        let mut transaction = self.pool.begin().await?;

        let inserted = query(
            "
            INSERT INTO posts.comments
                (comment_snowflake, post_snowflake, user_snowflake, comment_text, author_name, author_avatar)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE EXISTS (SELECT 1 FROM posts.posts WHERE posts.post_snowflake = $2)
            ",
        )
        .bind(comment_id.to_db())
        .bind(post_id.to_db())
        .bind(comment.author.id.to_db())
        .bind(comment.text.get())
        .bind(comment.author.name.get())
        .bind(comment.author.avatar.as_deref())
        .execute(&mut *transaction)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(None);
        }

        let comments = Self::fetch_comments(&mut *transaction, post_id).await?;
        transaction.commit().await?;

        debug!(%comment_id, "Created comment");
        Ok(Some(comments))
    }

    #[instrument(skip(self))]
    async fn delete_comment(
        &self,
        post_id: Id<PostMarker>,
        comment_id: Id<CommentMarker>,
    ) -> Result<Option<Vec<Comment>>> {
        let mut transaction = self.pool.begin().await?;

        if !Self::post_exists(&mut *transaction, post_id).await? {
            return Ok(None);
        }

        query(
            "
            DELETE FROM posts.comments
            WHERE comments.comment_snowflake = $1 AND comments.post_snowflake = $2
            ",
        )
        .bind(comment_id.to_db())
        .bind(post_id.to_db())
        .execute(&mut *transaction)
        .await?;

        let comments = Self::fetch_comments(&mut *transaction, post_id).await?;
        transaction.commit().await?;

        Ok(Some(comments))
    }
}
