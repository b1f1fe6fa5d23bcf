use crate::model::Id;
use argon2::Argon2;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Debug, Formatter};
use thiserror::Error;
use time::OffsetDateTime;

pub const NICKNAME_MIN_LEN: usize = 2;
pub const NICKNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MIN_LEN: usize = 4;
pub const PASSWORD_MAX_LEN: usize = 32;
pub const PASSWORD_SALT_LEN: usize = 16;
pub const PASSWORD_HASH_LEN: usize = 32;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct MemberMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Member {
    pub id: Id<MemberMarker>,
    pub nickname: Nickname,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Nickname(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The nickname is invalid: {0}")]
pub struct InvalidNicknameError(String);

impl Nickname {
    pub fn new(nickname: String) -> Result<Self, InvalidNicknameError> {
        let len = nickname.chars().count();
        if (NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&len)
            && !nickname.chars().any(char::is_whitespace)
        {
            Ok(Nickname(nickname))
        } else {
            Err(InvalidNicknameError(nickname))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for Nickname {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Nickname::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Nickname"))
    }
}

#[derive(Clone, Eq, PartialEq)]
pub struct Password(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("A password must have between 4 and 32 characters")]
pub struct InvalidPasswordError;

impl Password {
    pub fn new(password: String) -> Result<Self, InvalidPasswordError> {
        let len = password.chars().count();
        (PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN)
            .contains(&len)
            .then_some(Password(password))
            .ok_or(InvalidPasswordError)
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Password").field(&"[redacted]").finish()
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Password::new(inner).map_err(Error::custom)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing password failed: {0}")]
pub struct PasswordHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The stored password digest had an invalid length")]
pub struct InvalidPasswordDigestError;

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordDigest {
    salt: [u8; PASSWORD_SALT_LEN],
    hash: [u8; PASSWORD_HASH_LEN],
}

impl PasswordDigest {
    pub fn create(password: &Password) -> Result<Self, PasswordHashError> {
        let salt: [u8; PASSWORD_SALT_LEN] = rand::random();
        let hash = Self::hash_with(password, &salt)?;

        Ok(Self { salt, hash })
    }

    pub fn from_parts(salt: &[u8], hash: &[u8]) -> Result<Self, InvalidPasswordDigestError> {
        Ok(Self {
            salt: salt.try_into().map_err(|_| InvalidPasswordDigestError)?,
            hash: hash.try_into().map_err(|_| InvalidPasswordDigestError)?,
        })
    }

    pub fn verify(&self, password: &Password) -> Result<bool, PasswordHashError> {
        Ok(Self::hash_with(password, &self.salt)? == self.hash)
    }

    #[must_use]
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    #[must_use]
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    fn hash_with(
        password: &Password,
        salt: &[u8; PASSWORD_SALT_LEN],
    ) -> Result<[u8; PASSWORD_HASH_LEN], PasswordHashError> {
        let mut hash = [0; PASSWORD_HASH_LEN];
        Argon2::default()
            .hash_password_into(password.get().as_bytes(), salt, &mut hash)
            .map_err(PasswordHashError)?;

        Ok(hash)
    }
}

impl Debug for PasswordDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordDigest").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
pub struct SignupRequest {
    pub nickname: Nickname,
    pub password: Password,
    pub password_confirm: Password,
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
pub struct LoginRequest {
    pub nickname: Nickname,
    pub password: Password,
}
