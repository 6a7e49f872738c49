//! Accounts, password hashing, and bearer-token authentication.
//!
//! Passwords are hashed with Argon2 (PHC string format). Sessions are
//! stateless HS256 JWTs carrying the user id and email; every protected
//! handler takes an [`AuthUser`] extractor which rejects the request with
//! 401 before the handler body runs.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/auth/register` | Create an account, returns `{ user, token }` |
//! | `POST` | `/api/auth/login` | Exchange credentials for `{ user, token }` |
//! | `GET`  | `/api/auth/me` | The authenticated user |

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::AuthConfig;
use crate::error::{bad_request, internal, not_found, unauthorized, ApiResult, AppError};
use crate::extract::ApiJson;
use crate::models::User;
use crate::server::AppState;

const MIN_PASSWORD: usize = 8;

// ============ Passwords ============

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Returns `false` for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ============ Tokens ============

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

pub fn issue_token(config: &AuthConfig, user_id: i64, email: &str) -> Result<String> {
    let now = chrono::Utc::now();
    let exp = now + chrono::Duration::days(config.token_ttl_days);
    let claims = Claims {
        user_id,
        email: email.to_string(),
        iat: now.timestamp() as usize,
        exp: exp.timestamp() as usize,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn decode_token(config: &AuthConfig, token: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| unauthorized("Authentication required"))?;

        let claims = decode_token(&state.config.auth, token)
            .map_err(|_| unauthorized("Invalid or expired token"))?;

        Ok(AuthUser {
            id: claims.user_id,
            email: claims.email,
        })
    }
}

// ============ Handlers ============

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/me", get(handle_me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Loose `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

async fn handle_register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let name = req.name.as_deref().map(str::trim).unwrap_or_default();
    let email = req.email.as_deref().map(str::trim).unwrap_or_default();
    let password = req.password.unwrap_or_default();

    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(bad_request("Name, email and password are required"));
    }
    if !is_valid_email(email) {
        return Err(bad_request("Invalid email format"));
    }
    if password.chars().count() < MIN_PASSWORD {
        return Err(bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD
        )));
    }

    let email = email.to_lowercase();
    let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| internal(e.to_string()))??;

    let inserted = sqlx::query(
        "INSERT INTO users (name, email, password, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(&email)
    .bind(&hashed)
    .bind(chrono::Utc::now().timestamp())
    .execute(&state.pool)
    .await;

    let user_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(bad_request("Email already registered"));
        }
        Err(e) => return Err(e.into()),
    };

    let token = issue_token(&state.config.auth, user_id, &email)?;
    tracing::info!(user_id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: User {
                id: user_id,
                name: name.to_string(),
                email,
            },
            token,
        }),
    ))
}

async fn handle_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.as_deref().map(str::trim).unwrap_or_default();
    let password = req.password.unwrap_or_default();

    if email.is_empty() || password.is_empty() {
        return Err(bad_request("Email and password are required"));
    }

    let row: Option<(i64, String, String, String)> =
        sqlx::query_as("SELECT id, name, email, password FROM users WHERE email = ?")
            .bind(email.to_lowercase())
            .fetch_optional(&state.pool)
            .await?;

    let Some((id, name, email, stored_hash)) = row else {
        return Err(unauthorized("Invalid email or password"));
    };

    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| internal(e.to_string()))?;
    if !valid {
        return Err(unauthorized("Invalid email or password"));
    }

    let token = issue_token(&state.config.auth, id, &email)?;
    Ok(Json(AuthResponse {
        user: User { id, name, email },
        token,
    }))
}

async fn handle_me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<User>> {
    let row: Option<User> = sqlx::query_as("SELECT id, name, email FROM users WHERE id = ?")
        .bind(user.id)
        .fetch_optional(&state.pool)
        .await?;
    row.map(Json).ok_or_else(|| not_found("User not found"))
}
