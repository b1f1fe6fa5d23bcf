use crate::{
    model::{Id, member::MemberMarker},
    util::PositiveDuration,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::OffsetDateTime;

pub const REFRESH_TOKEN_CORE_LEN: usize = 24;
pub const REFRESH_TOKEN_SALT_LEN: usize = 18;
pub const REFRESH_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

// Tokens carry 192 random bits, so a light Argon2 configuration is enough.
const REFRESH_TOKEN_M_COST: u32 = 1024;
const REFRESH_TOKEN_T_COST: u32 = 1;
const REFRESH_TOKEN_P_COST: u32 = 1;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing refresh token failed: {0}")]
pub struct RefreshTokenHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum RefreshTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid member id: {0}")]
    InvalidMemberId(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the core part is incorrect")]
    InvalidCoreLength,
    #[error("The length of the salt part is incorrect")]
    InvalidSaltLength,
}

/// The opaque token sent in the `Refresh-Token` header.
///
/// Only [`RefreshTokenHash`] is ever persisted.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct RefreshToken {
    pub member_id: Id<MemberMarker>,
    pub core: [u8; REFRESH_TOKEN_CORE_LEN],
    pub salt: [u8; REFRESH_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct RefreshTokenHash(pub Box<[u8; REFRESH_TOKEN_HASH_LEN]>);

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct StoredRefreshToken {
    pub member: Id<MemberMarker>,
    pub token_hash: RefreshTokenHash,
    pub created_at: OffsetDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl StoredRefreshToken {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_after
            .is_some_and(|expires_after| self.created_at + expires_after.get() < now)
    }
}

impl RefreshToken {
    #[must_use]
    pub fn generate_random(member_id: Id<MemberMarker>) -> Self {
        let core = rand::random();
        let salt = rand::random();

        Self {
            member_id,
            core,
            salt,
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        let member_id = self.member_id;
        let encoded_core = Base64Display::new(&self.core, &BASE64_STANDARD);
        let encoded_salt = Base64Display::new(&self.salt, &BASE64_STANDARD);

        format!("{member_id}:{encoded_core}:{encoded_salt}")
    }

    pub fn hash(&self) -> Result<RefreshTokenHash, RefreshTokenHashError> {
        let params = Params::new(
            REFRESH_TOKEN_M_COST,
            REFRESH_TOKEN_T_COST,
            REFRESH_TOKEN_P_COST,
            Some(REFRESH_TOKEN_HASH_LEN),
        )
        .map_err(RefreshTokenHashError)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut hash = Box::new([0; REFRESH_TOKEN_HASH_LEN]);
        argon2
            .hash_password_into(&self.core, &self.salt, &mut *hash)
            .map_err(RefreshTokenHashError)?;

        Ok(RefreshTokenHash(hash))
    }
}

impl FromStr for RefreshToken {
    type Err = RefreshTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');

        let member_id_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let core_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let salt_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;

        let member_id = u64::from_str(member_id_part)
            .map_err(Self::Err::InvalidMemberId)?
            .into();
        let core = BASE64_STANDARD
            .decode(core_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidCoreLength)?;
        let salt = BASE64_STANDARD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self {
            member_id,
            core,
            salt,
        })
    }
}

impl Debug for RefreshToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshToken")
            .field("member_id", &self.member_id)
            .field("core", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for RefreshTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RefreshTokenHash").field(&"[redacted]").finish()
    }
}

impl RefreshTokenHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The refresh token hash had an invalid length")]
pub struct InvalidRefreshTokenHashError;

impl TryFrom<Vec<u8>> for RefreshTokenHash {
    type Error = InvalidRefreshTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let hash: Box<[u8]> = value.into_boxed_slice();
        Ok(Self(
            hash.try_into().map_err(|_| InvalidRefreshTokenHashError)?,
        ))
    }
}

/// Claims of the access token carried in the `Authorization` header.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Member id.
    pub sub: String,
    pub nickname: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl Debug for TokenPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        model::{
            Id,
            auth::{RefreshToken, RefreshTokenDecodeError, StoredRefreshToken},
        },
        util::PositiveDuration,
    };
    use time::{Duration, macros::datetime};

    #[test]
    fn token_string_parses_back() {
        let token = RefreshToken::generate_random(Id::from(1234));
        let parsed: RefreshToken = token.as_token_str().parse().unwrap();

        assert_eq!(parsed, token);
        assert_eq!(parsed.hash().unwrap(), token.hash().unwrap());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(
            "1234:abc".parse::<RefreshToken>(),
            Err(RefreshTokenDecodeError::NotEnoughParts)
        );
        assert!(matches!(
            "nope:AAAA:AAAA".parse::<RefreshToken>(),
            Err(RefreshTokenDecodeError::InvalidMemberId(_))
        ));
        assert_eq!(
            "1:AAAA:AAAA".parse::<RefreshToken>(),
            Err(RefreshTokenDecodeError::InvalidCoreLength)
        );
    }

    #[test]
    fn expiry() {
        let token = RefreshToken::generate_random(Id::from(1));
        let created_at = datetime!(2025-06-01 12:00 UTC);
        let stored = StoredRefreshToken {
            member: token.member_id,
            token_hash: token.hash().unwrap(),
            created_at,
            expires_after: PositiveDuration::new(Duration::days(7)),
        };

        assert!(!stored.is_expired_at(created_at + Duration::days(6)));
        assert!(stored.is_expired_at(created_at + Duration::days(8)));
        assert!(
            !StoredRefreshToken {
                expires_after: None,
                ..stored
            }
            .is_expired_at(created_at + Duration::days(800))
        );
    }
}
