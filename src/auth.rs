use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::{Role, TokenPairResponse, User},
    repository::RepositoryState,
};

/// TokenType
///
/// Distinguishes the short-lived access token from the refresh token so that one can
/// never be replayed in place of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims
///
/// The signed payload of both token kinds. Role and country travel in the token so that
/// validation needs no database round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub country: Option<String>,
    pub token_type: TokenType,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Expiration (seconds since epoch). Always validated.
    pub exp: i64,
}

/// TokenService
///
/// Issues and validates HS256 tokens. Validation is stateless and side-effect free.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::minutes(config.access_token_ttl_minutes),
            Duration::hours(config.refresh_token_ttl_hours),
        )
    }

    fn claims_for(&self, user: &User, token_type: TokenType) -> Claims {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            country: user.country.clone(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to encode token: {e}")))
    }

    pub fn issue_access(&self, user: &User) -> Result<String, AppError> {
        self.sign(&self.claims_for(user, TokenType::Access))
    }

    /// Access + refresh pair returned by the login endpoint.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPairResponse, AppError> {
        Ok(TokenPairResponse {
            access: self.issue_access(user)?,
            refresh: self.sign(&self.claims_for(user, TokenType::Refresh))?,
        })
    }

    /// Decodes a token and checks signature, expiry and kind.
    pub fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::authentication("token has expired"),
                _ => AppError::authentication("token is invalid"),
            }
        })?;

        if data.claims.token_type != expected {
            return Err(AppError::authentication("wrong token type"));
        }

        Ok(data.claims)
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Every service call takes it
/// explicitly as the caller context; nothing reads identity from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub country: Option<String>,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            country: user.country.clone(),
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local` only, an `x-user-id` header naming an existing, active
///    user resolves the caller from the database.
/// 2. Otherwise a `Bearer` access token is required. Its subject must still be an active
///    account, whose stored role and country describe the caller.
///
/// Rejection: `AppError::Authentication` (401).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id| Uuid::parse_str(id).ok());

            if let Some(user_id) = bypass_id {
                let repo = RepositoryState::from_ref(state);
                if let Some(user) = repo.find_user(user_id).await? {
                    if user.is_active {
                        tracing::debug!(user_id = %user.id, "resolved caller via local bypass header");
                        return Ok(AuthUser::from(&user));
                    }
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::authentication("missing bearer token"))?;

        let tokens = TokenService::from_ref(state);
        let claims = tokens.validate(token, TokenType::Access)?;

        let repo = RepositoryState::from_ref(state);
        match repo.find_user(claims.sub).await? {
            Some(user) if user.is_active => Ok(AuthUser::from(&user)),
            _ => {
                tracing::warn!(user_id = %claims.sub, "access token for inactive or missing account");
                Err(AppError::authentication("account is inactive or no longer exists"))
            }
        }
    }
}
