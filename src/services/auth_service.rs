use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sea_orm::ActiveValue::NotSet;

use crate::{
    audit,
    config::jwt_secret,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest, SetPasswordRequest},
    entity::{
        Users,
        users::{ActiveModel as UserActive, Column as UserCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_USER},
    models::UserProfile,
    response::{ApiResponse, Meta},
    state::AppState,
    validation::{into_result, validate_email, validate_username},
};

const MAX_NAME_LEN: usize = 150;
const TOKEN_TTL_HOURS: i64 = 24;

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Field checks for a registration payload, all failures collected.
pub fn registration_errors(payload: &RegisterRequest) -> Vec<String> {
    let mut errors = Vec::new();
    if let Err(message) = validate_email(&payload.email) {
        errors.push(message);
    }
    if let Err(message) = validate_username(&payload.username) {
        errors.push(message);
    }
    for (field, value) in [
        ("first_name", &payload.first_name),
        ("last_name", &payload.last_name),
    ] {
        if value.trim().is_empty() || value.chars().count() > MAX_NAME_LEN {
            errors.push(format!(
                "{field} must be between 1 and {MAX_NAME_LEN} characters"
            ));
        }
    }
    if payload.password.is_empty() {
        errors.push("password must not be empty".into());
    }
    errors
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<UserProfile>> {
    let mut errors = registration_errors(&payload);

    let taken = Users::find()
        .filter(
            UserCol::Email
                .eq(payload.email.as_str())
                .or(UserCol::Username.eq(payload.username.as_str())),
        )
        .all(&state.orm)
        .await?;
    if taken.iter().any(|u| u.email == payload.email) {
        errors.push("Email is already taken".into());
    }
    if taken.iter().any(|u| u.username == payload.username) {
        errors.push("Username is already taken".into());
    }
    into_result(errors)?;

    let password_hash = hash_password(&payload.password)?;
    let user = UserActive {
        id: NotSet,
        email: Set(payload.email),
        username: Set(payload.username),
        first_name: Set(payload.first_name),
        last_name: Set(payload.last_name),
        password_hash: Set(password_hash),
        role: Set(ROLE_USER.to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| match AppError::on_unique_violation(err, "") {
        AppError::AlreadyExists(_) => {
            AppError::validation("A user with that email or username already exists")
        }
        other => other,
    })?;

    tracing::info!(user_id = user.id, "user registered");
    audit::record(
        &state.pool,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        UserProfile::from_entity(user, false),
        None,
    ))
}

pub fn issue_token(secret: &str, user_id: i64, role: &str) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(TOKEN_TTL_HOURS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid email or password".into()))?;

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    let secret = jwt_secret()?;
    let token = issue_token(&secret, user.id, &user.role)?;

    audit::record(
        &state.pool,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse { auth_token: token },
        Some(Meta::empty()),
    ))
}

/// Replaces the caller's password after checking the current one.
pub async fn set_password(
    state: &AppState,
    user: &AuthUser,
    payload: SetPasswordRequest,
) -> AppResult<()> {
    if payload.new_password.is_empty() {
        return Err(AppError::validation("new password must not be empty"));
    }
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !verify_password(&payload.current_password, &model.password_hash)? {
        return Err(AppError::validation("current password is incorrect"));
    }

    let password_hash = hash_password(&payload.new_password)?;
    let mut active: UserActive = model.into();
    active.password_hash = Set(password_hash);
    active.update(&state.orm).await?;

    tracing::info!(user_id = user.user_id, "password changed");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_set_password",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    fn payload(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            username: username.into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            password: "s3cret!".into(),
        }
    }

    #[test]
    fn valid_registration_has_no_errors() {
        assert!(registration_errors(&payload("ada", "ada@example.com")).is_empty());
    }

    #[test]
    fn reserved_username_and_bad_email_are_both_reported() {
        let errors = registration_errors(&payload("me", "not-an-email"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn password_round_trips_through_argon2() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }

    #[test]
    fn issued_token_carries_user_and_role() {
        let token = issue_token("test-secret", 42, "admin").unwrap();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "42");
        assert_eq!(decoded.claims.role, "admin");
    }
}
