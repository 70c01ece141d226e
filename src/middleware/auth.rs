use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use crate::{config::jwt_secret, dto::auth::Claims, error::AppError};

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// Identity of the requester, if any, for computing per-viewer fields.
pub fn viewer_id(user: Option<&AuthUser>) -> Option<i64> {
    user.map(|u| u.user_id)
}

fn decode_bearer(auth_str: &str) -> Result<AuthUser, AppError> {
    let token = auth_str
        .strip_prefix("Bearer ")
        .or_else(|| auth_str.strip_prefix("Token "))
        .ok_or(AppError::Unauthorized)?
        .trim();

    let secret = jwt_secret()?;
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;

    let user_id = decoded
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::Unauthorized)?;

    Ok(AuthUser {
        user_id,
        role: decoded.claims.role,
    })
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AppError::Unauthorized)?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid Authorization header".into()))?;

        decode_bearer(auth_str)
    }
}

/// Anonymous requests resolve to `None`; a present but invalid token is rejected.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(header::AUTHORIZATION) {
            return Ok(None);
        }
        <AuthUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admins_pass_admin_check() {
        let admin = AuthUser {
            user_id: 1,
            role: ROLE_ADMIN.into(),
        };
        let cook = AuthUser {
            user_id: 2,
            role: ROLE_USER.into(),
        };
        assert!(admin.is_admin());
        assert!(!cook.is_admin());
        assert!(ensure_admin(&admin).is_ok());
        assert!(matches!(ensure_admin(&cook), Err(AppError::Forbidden)));
        assert_eq!(viewer_id(Some(&cook)), Some(2));
        assert_eq!(viewer_id(None), None);
    }

    #[test]
    fn unknown_scheme_is_unauthorized() {
        assert!(matches!(
            decode_bearer("Basic abc"),
            Err(AppError::Unauthorized)
        ));
    }
}
