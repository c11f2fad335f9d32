use std::marker::PhantomData;
use std::ops::Deref;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::user::User;
use crate::data::Id;
use crate::resp::problem::{problems, stash, Problem};
use crate::role::policy::Policy;
use crate::role::Role;
use crate::util::date_time_as_unix_seconds;

pub static AUTH_HEADER_NAME: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// Seconds of clock skew tolerated when checking `exp`.
const LEEWAY: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRoleToken {
    #[serde(with = "date_time_as_unix_seconds")]
    pub iat: DateTime<Utc>,
    #[serde(with = "date_time_as_unix_seconds")]
    pub exp: DateTime<Utc>,
    pub sub: Id,
    pub name: String,
    pub role: Role,
}

impl UserRoleToken {
    pub fn user_id(&self) -> Id {
        self.sub
    }

    pub fn is(&self, user: Id) -> bool {
        self.sub == user
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    SignatureInvalid,
    #[error("unable to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl TokenError {
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed_token",
            TokenError::Expired => "expired_token",
            TokenError::SignatureInvalid => "invalid_signature",
            TokenError::Signing(_) => "signing_failed",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName => TokenError::SignatureInvalid,
            _ => TokenError::Malformed,
        }
    }
}

/// Issues and verifies HS256 tokens with a process wide secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: impl AsRef<[u8]>, lifetime: Duration) -> TokenService {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        TokenService {
            encoding: EncodingKey::from_secret(secret.as_ref()),
            decoding: DecodingKey::from_secret(secret.as_ref()),
            validation,
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_at(user.id, &user.username, user.role, Utc::now())
    }

    pub fn issue_at(
        &self,
        user: Id,
        name: impl ToString,
        role: Role,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let iat = issued_at.trunc_subsecs(0);
        let claims = UserRoleToken {
            iat,
            exp: iat + self.lifetime,
            sub: user,
            name: name.to_string(),
            role,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<UserRoleToken, TokenError> {
        let data = decode::<UserRoleToken>(token, &self.decoding, &self.validation)?;
        tracing::debug!("decoded user roles token for user: {}", data.claims.sub);
        Ok(data.claims)
    }
}

impl From<TokenError> for Problem {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(e) => {
                tracing::error!("unable to sign token: {}", e);
                problems::internal("Unable to issue token.")
            }
            other => auth_problem(&other),
        }
    }
}

pub fn auth_problem(error: &TokenError) -> Problem {
    let detail = match error {
        TokenError::Expired => "Token has expired. Log in again.",
        TokenError::SignatureInvalid => "Token signature couldn't be verified.",
        _ => "Token couldn't be parsed.",
    };
    problems::unauthenticated(error.reason(), detail)
}

pub fn extract_claims(
    header: Option<&str>,
    tokens: &TokenService,
) -> Result<UserRoleToken, Problem> {
    let header = match header {
        Some(it) => it,
        None => {
            return Err(problems::unauthenticated(
                "missing_token",
                "No Authorization header.",
            ))
        }
    };

    let token = match header.strip_prefix(BEARER_PREFIX) {
        Some(it) if !it.is_empty() && !it.contains(' ') => it,
        _ => {
            return Err(problems::unauthenticated(
                "malformed_header",
                "Authorization header must be 'Bearer <token>'.",
            ))
        }
    };
    tracing::trace!("extracted jwt from authorization header");

    tokens.verify(token).map_err(|e| auth_problem(&e))
}

/// Fails with 403 unless `token` carries one of the `allowed` roles.
pub fn require_role(token: &UserRoleToken, allowed: &[Role]) -> Result<(), Problem> {
    if allowed.contains(&token.role) {
        Ok(())
    } else {
        tracing::debug!(
            "user {} with role {} denied, needs one of {:?}",
            token.sub,
            token.role,
            allowed
        );
        Err(problems::forbidden())
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserRoleToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let tokens = match req.rocket().state::<TokenService>() {
            Some(it) => it,
            None => {
                tracing::error!("token service isn't managed");
                return Outcome::Error(stash(
                    req,
                    problems::internal("Authentication isn't configured."),
                ));
            }
        };

        tracing::trace!("extracting user roles token from request headers");
        match extract_claims(req.headers().get_one(AUTH_HEADER_NAME), tokens) {
            Ok(claims) => Outcome::Success(claims),
            Err(problem) => {
                tracing::debug!("unable to extract claims: {}", problem);
                Outcome::Error(stash(req, problem))
            }
        }
    }
}

/// Authenticated caller whose role satisfies `P`.
///
/// Authentication runs first so a bad token is always reported as 401, even
/// on operations the caller's role couldn't reach anyway.
pub struct Authorized<P: Policy> {
    token: UserRoleToken,
    _policy: PhantomData<P>,
}

impl<P: Policy> Authorized<P> {
    pub fn into_inner(self) -> UserRoleToken {
        self.token
    }
}

impl<P: Policy> Deref for Authorized<P> {
    type Target = UserRoleToken;

    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

#[rocket::async_trait]
impl<'r, P: Policy> FromRequest<'r> for Authorized<P> {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = match req.guard::<UserRoleToken>().await {
            Outcome::Success(it) => it,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(s) => {
                return Outcome::Error(stash(
                    req,
                    problems::unauthenticated("missing_token", s.reason().unwrap_or("")),
                ))
            }
        };

        match require_role(&token, P::ALLOWED) {
            Ok(()) => Outcome::Success(Authorized {
                token,
                _policy: PhantomData,
            }),
            Err(problem) => Outcome::Error(stash(req, problem)),
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> Self {
            let mut http = Http::new(HttpAuthScheme::Bearer);
            http.bearer_format = Some("JWT".to_string());
            SecurityScheme::Http(http)
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("jwt", *self)
            }
        }
    }
}
