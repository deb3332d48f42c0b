use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::warn;

use hal_db::models::UserRow;
use hal_types::api::Claims;
use hal_types::models::Role;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// The authenticated account, loaded fresh for every request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

/// Extract and validate the JWT from the Authorization header, then load the user.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> ApiResult<Response> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .filter(|auth| !auth.token().is_empty())
        .ok_or_else(|| ApiError::unauthorized("No token, authorization denied"))?;
    let token = bearer.token();

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!("Rejected token: {}", e);
        ApiError::unauthorized("Token is not valid")
    })?
    .claims;

    let user_id = claims.sub;
    let user = state
        .query(move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Token is not valid"))?;
    if !user.is_active {
        return Err(ApiError::unauthorized("Account is deactivated"));
    }

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Admin-only routes. Layered inside `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> ApiResult<Response> {
    let is_admin = req
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|CurrentUser(user)| user.is_admin());
    if !is_admin {
        return Err(ApiError::forbidden("Access denied. Admin only."));
    }
    Ok(next.run(req).await)
}

/// Role gate used inside handlers.
pub fn require_roles(user: &UserRow, roles: &[Role]) -> ApiResult<()> {
    if user.has_any_role(roles) {
        return Ok(());
    }
    let required = roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ");
    let current = if user.user_roles.is_empty() {
        user.active_role.as_str().to_string()
    } else {
        user.user_roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
    };
    Err(ApiError::forbidden(format!(
        "Access denied. Required roles: {required}. Your roles: {current}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hal_types::models::{Location, Preferences, UserType};
    use uuid::Uuid;

    fn buyer() -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            name: "Mehmet".into(),
            email: "mehmet@example.com".into(),
            password: String::new(),
            phone: "05321234567".into(),
            user_type: UserType::Buyer,
            user_roles: vec![Role::Buyer],
            active_role: UserType::Buyer,
            profile_image: None,
            is_active: true,
            location: Location::default(),
            seller_info: None,
            preferences: Preferences::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn buyer_cannot_act_as_seller() {
        let user = buyer();
        assert!(require_roles(&user, &[Role::Buyer]).is_ok());
        match require_roles(&user, &[Role::Seller]) {
            Err(ApiError::Forbidden(msg)) => {
                assert!(msg.contains("Required roles: seller"));
                assert!(msg.contains("Your roles: buyer"));
            }
            other => panic!("expected forbidden, got {other:?}"),
        }
    }

    #[test]
    fn admin_passes_role_gate() {
        let mut admin = buyer();
        admin.user_type = UserType::Admin;
        admin.user_roles.clear();
        admin.active_role = UserType::Admin;
        assert!(require_roles(&admin, &[Role::Seller]).is_ok());
    }
}
