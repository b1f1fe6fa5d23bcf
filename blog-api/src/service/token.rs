use blog_common::{
    model::{
        Id,
        auth::{AccessClaims, RefreshToken, RefreshTokenHashError, StoredRefreshToken, TokenPair},
        member::{Member, MemberMarker},
    },
    util::{self, PositiveDuration},
};
use blog_db::{DbError, UnitOfWork};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;

pub const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Signing the access token failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    RefreshTokenHash(#[from] RefreshTokenHashError),
    #[error(transparent)]
    Database(#[from] DbError),
}

/// Issues and checks access and refresh tokens.
pub struct TokenProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_lifetime: PositiveDuration,
    refresh_token_lifetime: PositiveDuration,
}

impl TokenProvider {
    #[must_use]
    pub fn new(
        secret: &[u8],
        access_token_lifetime: PositiveDuration,
        refresh_token_lifetime: PositiveDuration,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_token_lifetime,
            refresh_token_lifetime,
        }
    }

    /// Signs an access token and stores a new refresh token for the member.
    pub async fn issue(
        &self,
        uow: &mut dyn UnitOfWork,
        member: &Member,
    ) -> Result<TokenPair, TokenError> {
        let now = util::now();
        let claims = AccessClaims {
            sub: member.id.to_string(),
            nickname: member.nickname.get().to_owned(),
            iat: now.unix_timestamp(),
            exp: (now + self.access_token_lifetime.get()).unix_timestamp(),
        };
        let access_token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        let refresh_token = RefreshToken::generate_random(member.id);
        uow.insert_refresh_token(&StoredRefreshToken {
            member: member.id,
            token_hash: refresh_token.hash()?,
            created_at: now,
            expires_after: Some(self.refresh_token_lifetime),
        })
        .await?;

        Ok(TokenPair {
            access_token: format!("{BEARER_PREFIX}{access_token}"),
            refresh_token: refresh_token.as_token_str(),
        })
    }

    /// The member owning the refresh token, if it is known and not expired.
    pub async fn validate_token(
        &self,
        uow: &mut dyn UnitOfWork,
        refresh_token: &str,
    ) -> Result<Option<Id<MemberMarker>>, TokenError> {
        let refresh_token: RefreshToken = match refresh_token.parse() {
            Ok(refresh_token) => refresh_token,
            Err(err) => {
                debug!(error = %err, "Refresh token could not be decoded");
                return Ok(None);
            }
        };

        let Some(stored) = uow.fetch_refresh_token(&refresh_token.hash()?).await? else {
            debug!(member = %refresh_token.member_id, "Refresh token is unknown");
            return Ok(None);
        };

        if stored.member != refresh_token.member_id || stored.is_expired_at(util::now()) {
            debug!(member = %stored.member, "Refresh token is expired or foreign");
            return Ok(None);
        }

        Ok(Some(stored.member))
    }

    /// Decodes the `Authorization` header value, checking signature and expiry.
    #[must_use]
    pub fn member_id_from_access_token(&self, authorization: &str) -> Option<Id<MemberMarker>> {
        let token = authorization.strip_prefix(BEARER_PREFIX)?;

        let claims = match jsonwebtoken::decode::<AccessClaims>(
            token,
            &self.decoding_key,
            &self.validation,
        ) {
            Ok(data) => data.claims,
            Err(err) => {
                debug!(error = %err, "Access token was rejected");
                return None;
            }
        };

        claims.sub.parse::<u64>().ok().map(Id::from)
    }
}
