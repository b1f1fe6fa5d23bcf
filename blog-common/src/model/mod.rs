pub mod auth;
pub mod comment;
pub mod heart;
pub mod member;
pub mod post;
pub mod sub_comment;

use crate::{
    model::{
        auth::InvalidRefreshTokenHashError,
        member::{InvalidNicknameError, InvalidPasswordDigestError},
    },
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
    util::NonPositiveDurationError,
};
use derive_where::derive_where;
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Nickname(#[from] InvalidNicknameError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    RefreshTokenHash(#[from] InvalidRefreshTokenHashError),
    #[error(transparent)]
    PasswordDigest(#[from] InvalidPasswordDigestError),
    #[error("Heart count must not be negative: {0}")]
    NegativeHeartCount(i64),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct BlogEpoch;
impl Epoch for BlogEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type BlogSnowflake = Snowflake<BlogEpoch>;
pub type BlogSnowflakeGenerator = SnowflakeGenerator<BlogEpoch>;

#[derive_where(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize
)]
#[serde(transparent)]
pub struct Id<Marker>(BlogSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: BlogSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> BlogSnowflake {
        self.0
    }

    /// The id as stored in a `BIGINT` column.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self::from(value.cast_unsigned())
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<BlogSnowflake> for Id<Marker> {
    fn from(value: BlogSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(BlogSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}
