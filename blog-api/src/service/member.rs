use crate::service::{AuthHeaders, Result, ServiceError, authenticate, token::TokenProvider};
use blog_common::{
    model::{
        auth::TokenPair,
        member::{LoginRequest, Member, PasswordDigest, SignupRequest},
    },
    util,
};
use blog_db::{DbError, Store};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct MemberService {
    store: Arc<dyn Store>,
    tokens: Arc<TokenProvider>,
}

impl MemberService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenProvider>) -> Self {
        Self { store, tokens }
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<Member> {
        if request.password != request.password_confirm {
            return Err(ServiceError::PasswordsNotEqual);
        }

        let mut uow = self.store.begin().await?;
        if uow
            .fetch_member_credentials(&request.nickname)
            .await?
            .is_some()
        {
            return Err(ServiceError::DuplicateNickname(request.nickname));
        }

        let digest = PasswordDigest::create(&request.password)?;
        let member = Member {
            id: self.store.generate_id()?,
            nickname: request.nickname,
            created_at: util::now(),
        };

        match uow.insert_member(&member, &digest).await {
            Ok(()) => {}
            // Lost a race against a concurrent signup
            Err(DbError::Conflict(_)) => {
                return Err(ServiceError::DuplicateNickname(member.nickname));
            }
            Err(err) => return Err(err.into()),
        }
        uow.commit().await?;

        info!(member = %member.id, nickname = member.nickname.get(), "Signed up");
        Ok(member)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<(Member, TokenPair)> {
        let mut uow = self.store.begin().await?;
        let Some((member, digest)) = uow.fetch_member_credentials(&request.nickname).await? else {
            debug!(nickname = request.nickname.get(), "Login for unknown nickname");
            return Err(ServiceError::BadCredentials);
        };

        if !digest.verify(&request.password)? {
            debug!(member = %member.id, "Login with wrong password");
            return Err(ServiceError::BadCredentials);
        }

        let pair = self.tokens.issue(&mut *uow, &member).await?;
        uow.commit().await?;

        info!(member = %member.id, "Logged in");
        Ok((member, pair))
    }

    /// Revokes every refresh token of the member.
    pub async fn logout(&self, headers: &AuthHeaders) -> Result<Member> {
        let credentials = headers.credentials()?;
        let mut uow = self.store.begin().await?;
        let member = authenticate(&self.tokens, &mut *uow, credentials).await?;

        let revoked = uow.delete_refresh_tokens(member.id).await?;
        uow.commit().await?;

        info!(member = %member.id, revoked, "Logged out");
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use crate::service::{AuthHeaders, ServiceError, test_support::Fixture};
    use blog_common::model::{
        member::{LoginRequest, Nickname, Password, SignupRequest},
        post::PostContent,
    };

    fn signup(nickname: &str, password: &str, confirm: &str) -> SignupRequest {
        SignupRequest {
            nickname: Nickname::new(nickname.to_owned()).unwrap(),
            password: Password::new(password.to_owned()).unwrap(),
            password_confirm: Password::new(confirm.to_owned()).unwrap(),
        }
    }

    fn login(nickname: &str, password: &str) -> LoginRequest {
        LoginRequest {
            nickname: Nickname::new(nickname.to_owned()).unwrap(),
            password: Password::new(password.to_owned()).unwrap(),
        }
    }

    #[tokio::test]
    async fn signup_checks_confirmation_and_uniqueness() {
        let fixture = Fixture::new();

        assert!(matches!(
            fixture
                .members
                .signup(signup("writer", "password", "passw0rd"))
                .await,
            Err(ServiceError::PasswordsNotEqual)
        ));

        let member = fixture
            .members
            .signup(signup("writer", "password", "password"))
            .await
            .unwrap();
        assert_eq!(member.nickname.get(), "writer");

        assert!(matches!(
            fixture
                .members
                .signup(signup("writer", "another", "another"))
                .await,
            Err(ServiceError::DuplicateNickname(_))
        ));
    }

    #[tokio::test]
    async fn login_needs_the_right_password() {
        let fixture = Fixture::new();
        let member = fixture
            .members
            .signup(signup("writer", "password", "password"))
            .await
            .unwrap();

        assert!(matches!(
            fixture.members.login(login("writer", "wrong")).await,
            Err(ServiceError::BadCredentials)
        ));
        assert!(matches!(
            fixture.members.login(login("nobody", "password")).await,
            Err(ServiceError::BadCredentials)
        ));

        let (logged_in, pair) = fixture
            .members
            .login(login("writer", "password"))
            .await
            .unwrap();
        assert_eq!(logged_in, member);
        assert!(pair.access_token.starts_with("Bearer "));
    }

    #[tokio::test]
    async fn logout_revokes_refresh_tokens() {
        let fixture = Fixture::new();
        let (member, headers) = fixture.login("writer").await;

        assert!(matches!(
            fixture.members.logout(&AuthHeaders::default()).await,
            Err(ServiceError::MissingCredentials)
        ));
        assert_eq!(fixture.members.logout(&headers).await.unwrap(), member);

        assert!(matches!(
            fixture
                .posts
                .create_post(PostContent::default(), None, &headers)
                .await,
            Err(ServiceError::InvalidToken)
        ));
        assert!(matches!(
            fixture.members.logout(&headers).await,
            Err(ServiceError::InvalidToken)
        ));
    }
}
