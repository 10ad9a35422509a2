use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, TokenData, Validation};
use log::debug;
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{common::UserId, user::Role};
use crate::store::Storage;

use super::principal::Principal;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";
const BEARER_PREFIX: &str = "Bearer ";

/// An identity asserted by the external identity provider: a specific user
/// acting with a specific role.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthToken<P> {
    #[serde(rename = "uid")]
    pub id: UserId,
    #[serde(rename = "rgt")]
    pub role: Role,
    #[serde(skip)]
    phantom: PhantomData<P>,
}

impl<P> AuthToken<P> {
    /// Does this token carry the given role?
    pub fn permits(&self, target: Role) -> bool {
        self.role == target
    }

    /// The ID of the user this token represents.
    pub fn id(&self) -> UserId {
        self.id
    }
}

impl<P> AuthToken<P>
where
    P: Principal,
{
    /// Verify and decode a signed token.
    pub fn decode(token: &str, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<P>>| claims.claims.token)?;
        Ok(token)
    }
}

/// Token claims: the identity plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<P> {
    #[serde(flatten, bound = "")]
    token: AuthToken<P>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// Find the raw token: the `Authorization: Bearer` header wins over the cookie.
fn raw_token<'r>(req: &'r Request<'_>) -> Option<&'r str> {
    if let Some(header) = req.headers().get_one("Authorization") {
        return header.strip_prefix(BEARER_PREFIX).map(str::trim);
    }
    req.cookies().get(AUTH_TOKEN_COOKIE).map(|cookie| cookie.value())
}

#[rocket::async_trait]
impl<'r, P> FromRequest<'r> for AuthToken<P>
where
    P: Principal + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the request and verify that it has the correct
    /// role for this principal type.
    ///
    /// Requests without a token, or with a token for another role, are
    /// forwarded so that less privileged routes can handle them. Tokens that
    /// fail verification are rejected outright.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        let raw = match raw_token(req) {
            Some(raw) => raw,
            None => return Outcome::Forward(()),
        };

        let token: Self = match Self::decode(raw, config) {
            Ok(token) => token,
            Err(e) => {
                debug!("Rejected identity token: {e}");
                return Outcome::Failure((Status::Unauthorized, e));
            }
        };

        if !token.permits(P::ROLE) {
            return Outcome::Forward(());
        }

        // Check the user actually exists with this role.
        let store = req.guard::<&State<Storage>>().await.unwrap();
        match store.user(token.id).await {
            Ok(Some(user)) if user.role == P::ROLE => Outcome::Success(token),
            Ok(_) => Outcome::Forward(()),
            Err(e) => Outcome::Failure((Status::InternalServerError, e.into())),
        }
    }
}

/// Tokens are minted by the identity provider; tests mint their own with the
/// shared secret.
#[cfg(test)]
pub mod examples {
    use super::*;

    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header};
    use rocket::http::{Cookie, SameSite};

    use crate::model::user::User;

    impl<P> AuthToken<P>
    where
        P: Principal,
    {
        /// A token for the given user, with the role of this principal type.
        pub fn new(user: &User) -> Self {
            Self {
                id: user.id,
                role: P::ROLE,
                phantom: PhantomData,
            }
        }

        /// Sign this token into a compact JWT valid for an hour.
        pub fn encode(self, config: &Config) -> String {
            let claims = Claims {
                token: self,
                expire_at: Utc::now() + Duration::hours(1),
            };
            jsonwebtoken::encode(
                &Header::default(),
                &claims,
                &EncodingKey::from_secret(config.jwt_secret()),
            )
            .unwrap()
        }

        /// Wrap a signed token in a cookie, as a browser would present it.
        pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
            Cookie::build(AUTH_TOKEN_COOKIE, self.encode(config))
                .http_only(true)
                .same_site(SameSite::Strict)
                .finish()
        }
    }
}
