use crate::model::{
    Id,
    user::{User, UserMarker, UserName},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

/// Body of a post or comment. Never blank.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Text(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Text must not be empty")]
pub struct InvalidTextError;

impl Text {
    pub fn new(text: String) -> Result<Self, InvalidTextError> {
        if text.trim().is_empty() {
            Err(InvalidTextError)
        } else {
            Ok(Self(text))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Text {
    type Error = InvalidTextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Text> for String {
    fn from(value: Text) -> Self {
        value.0
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: Id<PostMarker>,
    pub user: Id<UserMarker>,
    pub text: Text,
    pub name: UserName,
    pub avatar: Option<String>,
    /// Most recent first. Holds each user at most once.
    pub likes: Vec<Like>,
    /// Most recent first.
    pub comments: Vec<Comment>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Like {
    pub user: Id<UserMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: Id<CommentMarker>,
    pub user: Id<UserMarker>,
    pub text: Text,
    pub name: UserName,
    pub avatar: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

/// A post about to be written. Author name and avatar are copied at creation.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub author: User,
    pub text: Text,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateComment {
    pub author: User,
    pub text: Text,
}

/// Why a like or unlike left the post untouched.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum LikeError {
    #[error("Post {0} does not exist")]
    PostNotFound(Id<PostMarker>),
    #[error("Post already liked")]
    AlreadyLiked,
    #[error("Post has not yet been liked")]
    NotLiked,
}

impl Post {
    #[must_use]
    pub fn new(id: Id<PostMarker>, post: CreatePost, date: OffsetDateTime) -> Self {
        Self {
            id,
            user: post.author.id,
            text: post.text,
            name: post.author.name,
            avatar: post.author.avatar,
            likes: Vec::new(),
            comments: Vec::new(),
            date,
        }
    }

    #[must_use]
    pub fn is_owned_by(&self, user: Id<UserMarker>) -> bool {
        self.user == user
    }

    #[must_use]
    pub fn is_liked_by(&self, user: Id<UserMarker>) -> bool {
        self.likes.iter().any(|like| like.user == user)
    }

    pub fn like(&mut self, user: Id<UserMarker>) -> Result<(), LikeError> {
        if self.is_liked_by(user) {
            return Err(LikeError::AlreadyLiked);
        }

        self.likes.insert(0, Like { user });
        Ok(())
    }

    pub fn unlike(&mut self, user: Id<UserMarker>) -> Result<(), LikeError> {
        let index = self
            .likes
            .iter()
            .position(|like| like.user == user)
            .ok_or(LikeError::NotLiked)?;

        self.likes.remove(index);
        Ok(())
    }

    #[must_use]
    pub fn comment(&self, id: Id<CommentMarker>) -> Option<&Comment> {
        self.comments.iter().find(|comment| comment.id == id)
    }

    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.insert(0, comment);
    }

    pub fn remove_comment(&mut self, id: Id<CommentMarker>) -> Option<Comment> {
        let index = self.comments.iter().position(|comment| comment.id == id)?;
        Some(self.comments.remove(index))
    }
}

impl Comment {
    #[must_use]
    pub fn new(id: Id<CommentMarker>, comment: CreateComment, date: OffsetDateTime) -> Self {
        Self {
            id,
            user: comment.author.id,
            text: comment.text,
            name: comment.author.name,
            avatar: comment.author.avatar,
            date,
        }
    }
}

/// Newest first; posts created in the same instant fall back to id order.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use crate::model::{
        post::{CreatePost, LikeError, Post, Text, sort_newest_first},
        user::{User, UserName},
    };
    use time::{Duration, macros::datetime};

    fn post(id: u64, author: u64) -> Post {
        let author = User {
            id: author.into(),
            name: UserName::new("Author".into()).unwrap(),
            avatar: None,
        };
        let text = Text::new("hello".into()).unwrap();
        Post::new(
            id.into(),
            CreatePost { author, text },
            datetime!(2025-06-01 12:00 UTC),
        )
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(Text::new(String::new()).is_err());
        assert!(Text::new(" \n\t".into()).is_err());
        assert_eq!(Text::new(" hi ".into()).unwrap().get(), " hi ");
        assert!(serde_json::from_str::<Text>("\"\"").is_err());
    }

    #[test]
    fn like_twice_is_rejected() {
        let mut post = post(1, 10);

        assert_eq!(post.like(20u64.into()), Ok(()));
        assert_eq!(post.like(20u64.into()), Err(LikeError::AlreadyLiked));
        assert_eq!(post.likes.len(), 1);
    }

    #[test]
    fn likes_are_most_recent_first() {
        let mut post = post(1, 10);
        for user in [20u64, 21, 22] {
            post.like(user.into()).unwrap();
        }

        let users: Vec<u64> = post.likes.iter().map(|like| u64::from(like.user)).collect();
        assert_eq!(users, [22, 21, 20]);
    }

    #[test]
    fn unlike_removes_only_the_caller() {
        let mut post = post(1, 10);
        for user in [20u64, 21, 22] {
            post.like(user.into()).unwrap();
        }

        post.unlike(21u64.into()).unwrap();
        let users: Vec<u64> = post.likes.iter().map(|like| u64::from(like.user)).collect();
        assert_eq!(users, [22, 20]);

        assert_eq!(post.unlike(21u64.into()), Err(LikeError::NotLiked));
        assert_eq!(post.likes.len(), 2);
    }

    #[test]
    fn like_then_unlike_restores_likes() {
        let mut post = post(1, 10);
        post.like(20u64.into()).unwrap();
        let before = post.likes.clone();

        post.like(10u64.into()).unwrap();
        post.unlike(10u64.into()).unwrap();

        assert_eq!(post.likes, before);
    }

    #[test]
    fn sorting_is_newest_first() {
        let mut older = post(1, 10);
        older.date -= Duration::hours(1);
        let mut newer = post(2, 10);
        newer.date += Duration::hours(1);
        let tie_low = post(3, 10);
        let tie_high = post(4, 10);

        let mut posts = vec![tie_low, older, newer, tie_high];
        sort_newest_first(&mut posts);

        let ids: Vec<u64> = posts.iter().map(|post| u64::from(post.id)).collect();
        assert_eq!(ids, [2, 4, 3, 1]);
    }

    #[test]
    fn post_wire_format() {
        let mut post = post(5, 10);
        post.like(11u64.into()).unwrap();

        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["_id"], "5");
        assert_eq!(json["user"], "10");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["likes"], serde_json::json!([{ "user": "11" }]));
        assert_eq!(json["comments"], serde_json::json!([]));
        assert_eq!(json["date"], "2025-06-01T12:00:00Z");
        assert_eq!(serde_json::from_value::<Post>(json).unwrap(), post);
    }
}
