use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::warn;
use uuid::Uuid;

use tribute_core::kin::KinService;
use tribute_core::mail::{Email, MailTransport};
use tribute_core::moderation::ModerationService;
use tribute_core::notify::Notifier;
use tribute_db::Database;
use tribute_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};
use tribute_types::models::Role;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub posts: ModerationService,
    pub kins: KinService,
    pub notifier: Notifier,
    pub mailer: Arc<dyn MailTransport>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::bad_request(
            "Username must be between 3 and 32 characters.",
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters.",
        ));
    }
    if !req.email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address."));
    }

    if state.db.get_user_by_username(&req.username)?.is_some() {
        return Err(ApiError::conflict(format!(
            "Username: {} is already registered.",
            req.username
        )));
    }
    if state.db.get_user_by_email(&req.email)?.is_some() {
        return Err(ApiError::conflict(format!(
            "Email: {} is already registered.",
            req.email
        )));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    state.db.create_user(
        &user_id.to_string(),
        &req.username,
        &req.email,
        &password_hash,
        Role::User.as_str(),
    )?;

    // best-effort welcome mail; a transport failure must not fail the signup
    let welcome = Email {
        to: req.email.clone(),
        subject: "Welcome to Tribute".into(),
        html: format!(
            "<p>Hi {},</p><p>Your account is ready. Thank you for helping us honor their memory.</p>",
            req.username
        ),
    };
    if let Err(e) = state.mailer.send(&welcome).await {
        warn!("Welcome mail to {} failed: {:#}", req.email, e);
    }

    let token = create_token(&state.jwt_secret, user_id, &req.username, Role::User)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .db
        .get_user_by_username(&req.username)?
        .ok_or_else(|| ApiError::unauthorized("Invalid username or password."))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Corrupt password hash: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::unauthorized("Invalid username or password."))?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Corrupt user id: {}", e)))?;
    let role = Role::parse(&user.role).unwrap_or(Role::User);

    let token = create_token(&state.jwt_secret, user_id, &user.username, role)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        role,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, username: &str, role: Role) -> ApiResult<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("Token encoding failed: {}", e)))?;

    Ok(token)
}
