use super::Caller;
use crate::error::{BlogError, BlogResult};
use crate::{GetConfig, System, UserId};

use axum_extra::TypedHeader;
use entrait::entrait_export as entrait;
use headers::authorization::Credentials;
use headers::Authorization;
use http::HeaderValue;
use jwt::SignWithKey;
use jwt::VerifyWithKey;

const DEFAULT_SESSION_LENGTH: time::Duration = time::Duration::weeks(2);

#[derive(serde::Serialize, serde::Deserialize)]
struct CallerClaims {
    user_id: i64,
    #[serde(default)]
    admin: bool,
    /// Standard JWT `exp` claim.
    exp: i64,
}

#[entrait(pub SignCaller, mock_api=SignCallerMock)]
fn sign_caller(deps: &(impl System + GetConfig), caller: Caller) -> String {
    CallerClaims {
        user_id: caller.user_id.0,
        admin: caller.is_admin,
        exp: (deps.get_current_time() + DEFAULT_SESSION_LENGTH).unix_timestamp(),
    }
    .sign_with_key(deps.get_jwt_signing_key())
    .expect("HMAC signing should be infallible")
}

#[entrait(pub Authenticate, mock_api=AuthenticateMock)]
fn authenticate(deps: &(impl System + GetConfig), token: Token) -> BlogResult<Caller> {
    let jwt = jwt::Token::<jwt::Header, CallerClaims, _>::parse_unverified(token.token())
        .map_err(|_| BlogError::Unauthorized)?;

    let jwt = jwt
        .verify_with_key(deps.get_jwt_signing_key())
        .map_err(|_| BlogError::Unauthorized)?;
    let (_header, claims) = jwt.into();

    if claims.exp < deps.get_current_time().unix_timestamp() {
        return Err(BlogError::Unauthorized);
    }

    Ok(Caller {
        user_id: UserId(claims.user_id),
        is_admin: claims.admin,
    })
}

///
/// Data for `Token` authorization scheme.
///
#[derive(Debug)]
pub struct Token(String);

impl Token {
    pub fn from_token(token: &str) -> Self {
        Self(format!("Token {token}"))
    }

    pub fn token(&self) -> &str {
        self.0.get("Token ".len()..).unwrap_or_default()
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        self.token()
    }
}

impl Credentials for Token {
    const SCHEME: &'static str = "Token";

    fn decode(value: &HeaderValue) -> Option<Self> {
        let auth_header = value.to_str().ok()?;

        Some(Token(auth_header.to_string()))
    }

    fn encode(&self) -> HeaderValue {
        HeaderValue::from_str(&self.0).expect("token was decoded from a header value")
    }
}

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for Token
where
    S: Send + Sync,
{
    type Rejection = BlogError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(token)) =
            TypedHeader::<Authorization<Token>>::from_request_parts(parts, state)
                .await
                .map_err(|_| BlogError::Unauthorized)?;

        Ok(token)
    }
}
