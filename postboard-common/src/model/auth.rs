//! Bearer tokens.
//!
//! A token reads `pb.<user id>.<secret>.<salt>`, secret and salt being unpadded
//! url-safe base64. The server keeps only the argon2 hash of the secret salted
//! with the salt.

use crate::{
    model::{Id, user::UserMarker},
    util::PositiveDuration,
};
use argon2::{Argon2, Params};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_URL_SAFE_NO_PAD};
use std::{
    fmt::{Debug, Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::OffsetDateTime;

pub const AUTH_TOKEN_PREFIX: &str = "pb";
pub const AUTH_TOKEN_SECRET_LEN: usize = 24;
pub const AUTH_TOKEN_SALT_LEN: usize = 16;
pub const AUTH_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing auth token failed: {0}")]
pub struct AuthTokenHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum AuthTokenDecodeError {
    #[error("The token does not start with `{AUTH_TOKEN_PREFIX}.`")]
    MissingPrefix,
    #[error("Expected four parts separated by '.', found {0}")]
    PartCount(usize),
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The secret has {0} bytes instead of {AUTH_TOKEN_SECRET_LEN}")]
    SecretLength(usize),
    #[error("The salt has {0} bytes instead of {AUTH_TOKEN_SALT_LEN}")]
    SaltLength(usize),
}

/// A bearer token as handed to the client. Never persisted.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthToken {
    pub user_id: Id<UserMarker>,
    pub secret: [u8; AUTH_TOKEN_SECRET_LEN],
    pub salt: [u8; AUTH_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthTokenHash(pub Box<[u8; AUTH_TOKEN_HASH_LEN]>);

/// A stored credential.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Authentication {
    pub user: Id<UserMarker>,
    pub token_hash: AuthTokenHash,
    pub created_at: OffsetDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl Authentication {
    /// `None` for credentials that never expire.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_after
            .map(|lifetime| self.created_at + lifetime.get())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|expiry| expiry < now)
    }
}

impl AuthToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        Self {
            user_id,
            secret: rand::random(),
            salt: rand::random(),
        }
    }

    /// Argon2 with default parameters. CPU heavy, call it off the async workers.
    pub fn hash(&self) -> Result<AuthTokenHash, AuthTokenHashError> {
        let mut hash = Box::new([0; AUTH_TOKEN_HASH_LEN]);
        Argon2::default()
            .hash_password_into(&self.secret, &self.salt, &mut *hash)
            .map_err(AuthTokenHashError)?;

        Ok(AuthTokenHash(hash))
    }
}

impl Display for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{AUTH_TOKEN_PREFIX}.{}.{}.{}",
            self.user_id,
            Base64Display::new(&self.secret, &BASE64_URL_SAFE_NO_PAD),
            Base64Display::new(&self.salt, &BASE64_URL_SAFE_NO_PAD),
        )
    }
}

fn decode_exact<const N: usize>(
    part: &str,
    length_error: fn(usize) -> AuthTokenDecodeError,
) -> Result<[u8; N], AuthTokenDecodeError> {
    let bytes = BASE64_URL_SAFE_NO_PAD.decode(part)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| length_error(len))
}

impl FromStr for AuthToken {
    type Err = AuthTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let [prefix, user_id, secret, salt] = parts[..] else {
            return Err(Self::Err::PartCount(parts.len()));
        };

        if prefix != AUTH_TOKEN_PREFIX {
            return Err(Self::Err::MissingPrefix);
        }

        Ok(Self {
            user_id: user_id.parse().map_err(Self::Err::InvalidUserId)?,
            secret: decode_exact(secret, Self::Err::SecretLength)?,
            salt: decode_exact(salt, Self::Err::SaltLength)?,
        })
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("user_id", &self.user_id)
            .field("secret", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for AuthTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthTokenHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The auth token hash had an invalid length")]
pub struct InvalidAuthTokenHashError;

impl TryFrom<Vec<u8>> for AuthTokenHash {
    type Error = InvalidAuthTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let bytes: [u8; AUTH_TOKEN_HASH_LEN] =
            value.try_into().map_err(|_| InvalidAuthTokenHashError)?;
        Ok(Self(Box::new(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        model::auth::{AuthToken, AuthTokenDecodeError, AuthTokenHash, Authentication},
        util::PositiveDuration,
    };
    use time::{Duration, macros::datetime};

    #[test]
    fn token_string_round_trips() {
        let token = AuthToken::generate_random(1234u64.into());
        let token_str = token.to_string();

        assert!(token_str.starts_with("pb.1234."));
        assert_eq!(token_str.parse::<AuthToken>(), Ok(token));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(
            "pb.1234".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::PartCount(2))
        );
        assert_eq!(
            "xx.1.AAAA.AAAA".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::MissingPrefix)
        );
        assert!(matches!(
            "pb.abc.AAAA.AAAA".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::InvalidUserId(_))
        ));
        assert_eq!(
            "pb.1.AAAA.AAAA".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::SecretLength(3))
        );
        assert!(matches!(
            "pb.1.!!!!.AAAA".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::Decode(_))
        ));
    }

    #[test]
    fn hash_depends_on_secret_parts() {
        let token = AuthToken::generate_random(1u64.into());
        let mut other = token.clone();
        other.secret[0] ^= 1;

        assert_eq!(token.hash().unwrap(), token.hash().unwrap());
        assert_ne!(token.hash().unwrap(), other.hash().unwrap());
    }

    #[test]
    fn debug_output_is_redacted() {
        let token = AuthToken::generate_random(1u64.into());
        let debug = format!("{token:?}");

        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains(&format!("{:?}", token.secret)));
    }

    #[test]
    fn expiry() {
        let created_at = datetime!(2025-06-01 12:00 UTC);
        let mut authentication = Authentication {
            user: 1u64.into(),
            token_hash: AuthTokenHash::try_from(vec![0; 32]).unwrap(),
            created_at,
            expires_after: None,
        };
        assert_eq!(authentication.expires_at(), None);
        assert!(!authentication.is_expired_at(created_at + Duration::days(10_000)));

        authentication.expires_after = Some(PositiveDuration::from_seconds(60).unwrap());
        assert!(!authentication.is_expired_at(created_at + Duration::seconds(59)));
        assert!(authentication.is_expired_at(created_at + Duration::seconds(61)));
    }
}
