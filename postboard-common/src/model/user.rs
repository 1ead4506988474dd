use crate::model::Id;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;

pub const USER_NAME_MAX_LEN: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id<UserMarker>,
    pub name: UserName,
    pub avatar: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreateUser {
    pub name: UserName,
    pub avatar: Option<String>,
}

/// Display name of a user: not blank and at most [`USER_NAME_MAX_LEN`] characters.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct UserName(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidUserNameError {
    #[error("The user name is empty")]
    Empty,
    #[error("The user name is longer than {USER_NAME_MAX_LEN} characters: {0}")]
    TooLong(String),
}

impl UserName {
    pub fn new(name: String) -> Result<Self, InvalidUserNameError> {
        if name.trim().is_empty() {
            Err(InvalidUserNameError::Empty)
        } else if name.chars().count() > USER_NAME_MAX_LEN {
            Err(InvalidUserNameError::TooLong(name))
        } else {
            Ok(UserName(name))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UserName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        UserName::new(inner.clone())
            .map_err(|_| Error::invalid_value(Unexpected::Str(&inner), &"a user name"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::user::{InvalidUserNameError, USER_NAME_MAX_LEN, User, UserName};

    #[test]
    fn user_name_bounds() {
        assert_eq!(UserName::new("   ".into()), Err(InvalidUserNameError::Empty));
        assert!(UserName::new("x".repeat(USER_NAME_MAX_LEN)).is_ok());
        assert!(matches!(
            UserName::new("x".repeat(USER_NAME_MAX_LEN + 1)),
            Err(InvalidUserNameError::TooLong(_))
        ));
    }

    #[test]
    fn user_wire_format() {
        let user: User =
            serde_json::from_str(r#"{"_id":"7","name":"Ada","avatar":null}"#).unwrap();
        assert_eq!(u64::from(user.id), 7);
        assert_eq!(user.name.get(), "Ada");

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["_id"], "7");

        assert!(serde_json::from_str::<User>(r#"{"_id":"7","name":"","avatar":null}"#).is_err());
    }
}
