use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Bearer-token middleware: validates the JWT and stores the `User` in the
/// request extensions for `Extension<User>` extraction downstream.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth) = auth
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let user = validate_token(auth.token(), &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Reject callers that are not acting for `clinic_id`.
pub fn require_clinic(user: &User, clinic_id: &str) -> Result<(), AppError> {
    if user.manages_clinic(clinic_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not authorized to manage this clinic".to_string()))
    }
}

/// Clinic id bound to a clinic account's token.
pub fn caller_clinic_id(user: &User) -> Result<String, AppError> {
    user.clinic_id
        .clone()
        .filter(|_| user.role.as_deref() == Some("clinic") || user.is_admin())
        .ok_or_else(|| AppError::Forbidden("Clinic account required".to_string()))
}
