use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use hal_db::Database;
use hal_db::models::NewUser;
use hal_gateway::{Dispatcher, GatewayContext};
use hal_types::api::{
    AuthResponse, Claims, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, UserProfile,
    UserSummary,
};

use crate::error::{ApiError, ApiResult, JsonBody};
use crate::mailer::Mailer;
use crate::middleware::CurrentUser;
use crate::upload::UploadStore;
use crate::validate::{self, Validator};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub uploads: UploadStore,
    pub mailer: Mailer,
    /// Base URL of the web client, used in password reset links.
    pub frontend_url: String,
}

impl AppStateInner {
    /// Run blocking DB work off the async runtime.
    pub async fn query<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?
            .map_err(ApiError::from)
    }

    pub fn gateway_context(&self) -> GatewayContext {
        GatewayContext {
            dispatcher: self.dispatcher.clone(),
            db: self.db.clone(),
            jwt_secret: Arc::from(self.jwt_secret.as_str()),
        }
    }
}

/// Reset links stay valid this long.
const RESET_TOKEN_TTL_MINUTES: i64 = 10;

pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let reg = validate::registration(req)?;

    let email = reg.email.clone();
    if state.query(move |db| db.get_user_by_email(&email)).await?.is_some() {
        return Err(ApiError::bad_request("User already exists with this email"));
    }

    let password_hash = hash_password(&reg.password)?;
    let user = state
        .query(move |db| {
            db.create_user(&NewUser {
                name: &reg.name,
                email: &reg.email,
                password_hash: &password_hash,
                phone: &reg.phone,
                user_type: reg.user_type,
            })
        })
        .await?;

    let token = create_token(&state.jwt_secret, user.id).map_err(ApiError::Internal)?;
    info!("Registered {} as {}", user.email, user.user_type);

    // Welcome mail is best effort
    let mail_state = state.clone();
    let (to, name) = (user.email.clone(), user.name.clone());
    tokio::spawn(async move {
        if let Err(e) = mail_state.mailer.send_welcome(&to, &name).await {
            warn!("Welcome mail to {} failed: {}", to, e);
        }
    });

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".into(),
            token,
            user: UserSummary::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let mut v = Validator::new();
    v.check(validate::is_email(req.email.trim()), "email", "Please provide a valid email")
        .check(!req.password.is_empty(), "password", "Password is required");
    v.finish()?;

    let email = req.email.trim().to_lowercase();
    let user = state
        .query(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid credentials"))?;

    if !verify_password(&req.password, &user.password) {
        warn!("Failed login for {}", user.email);
        return Err(ApiError::bad_request("Invalid credentials"));
    }
    if !user.is_active {
        return Err(ApiError::bad_request("Account is deactivated"));
    }

    let token = create_token(&state.jwt_secret, user.id).map_err(ApiError::Internal)?;
    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        token,
        user: UserSummary::from(&user),
    }))
}

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> impl IntoResponse {
    Json(json!({ "user": UserProfile::from(user) }))
}

/// Tokens are stateless, the client just forgets its copy.
pub async fn logout(Extension(CurrentUser(user)): Extension<CurrentUser>) -> impl IntoResponse {
    info!("{} logged out", user.email);
    Json(json!({ "message": "Logout successful" }))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ForgotPasswordRequest>,
) -> ApiResult<Response> {
    let mut v = Validator::new();
    v.check(validate::is_email(req.email.trim()), "email", "Please provide a valid email");
    v.finish()?;

    let email = req.email.trim().to_lowercase();
    let user = state
        .query(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found with this email address"))?;

    let token = generate_reset_token();
    let token_hash = hash_reset_token(&token);
    let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
    let user_id = user.id;
    state
        .query(move |db| db.set_reset_token(user_id, &token_hash, expires_at))
        .await?;

    let reset_url = format!("{}/reset-password?token={}", state.frontend_url.trim_end_matches('/'), token);
    if let Err(e) = state.mailer.send_password_reset(&user.email, &user.name, &reset_url).await {
        error!("Reset mail to {} failed: {}", user.email, e);
        state.query(move |db| db.clear_reset_token(user_id)).await?;
        return Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Failed to send reset email. Please try again later." })),
        )
            .into_response());
    }

    Ok(Json(json!({ "message": "Password reset token sent to your email" })).into_response())
}

pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    v.check(!req.token.trim().is_empty(), "token", "Reset token is required")
        .check(req.password.chars().count() >= 6, "password", "Password must be at least 6 characters");
    v.finish()?;

    let token_hash = hash_reset_token(req.token.trim());
    let user = state
        .query(move |db| db.find_user_by_reset_token(&token_hash, Utc::now()))
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;

    let password_hash = hash_password(&req.password)?;
    let user_id = user.id;
    state.query(move |db| db.set_password(user_id, &password_hash)).await?;
    info!("Password reset for {}", user.email);

    Ok(Json(json!({ "message": "Password reset successful" })))
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

pub fn create_token(secret: &str, user_id: Uuid) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        exp: (Utc::now() + Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// 32 random bytes, hex encoded. Only the SHA-256 of it is stored.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-phc-string"));
    }

    #[test]
    fn token_carries_user_id() {
        let id = Uuid::new_v4();
        let token = create_token("test-secret", id).unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, id);
        let days = (data.claims.exp as i64 - Utc::now().timestamp()) / 86_400;
        assert!((29..=30).contains(&days));
    }

    #[test]
    fn reset_tokens_are_random_hex() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_reset_token(&a), hash_reset_token(&a));
        assert_ne!(hash_reset_token(&a), a);
    }
}
