// src/users.rs

use actix_web::{web, HttpResponse};
use log::debug;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::user::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest, UpdateProfileRequest,
};
use crate::response::ApiResponse;
use crate::validation::Validate;

/// POST /api/users/register
pub async fn register(
    data: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner().validate()?;
    debug!("register request for {}", req.email);
    let auth = data.users.register(req).await?;
    Ok(HttpResponse::Created().json(ApiResponse::data(auth).with_message("User registered successfully")))
}

/// POST /api/users/login
pub async fn login(
    data: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner().validate()?;
    let auth = data.users.login(req).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(auth).with_message("Login successful")))
}

/// GET /api/users/profile
pub async fn get_profile(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let profile = data.users.profile(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(profile)))
}

/// PUT /api/users/profile
pub async fn update_profile(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner().validate()?;
    let profile = data.users.update_profile(&user.user_id, req).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(profile).with_message("Profile updated successfully")))
}

/// PUT /api/users/change-password
pub async fn change_password(
    user: AuthUser,
    data: web::Data<AppState>,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner().validate()?;
    data.users.change_password(&user.user_id, req).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Password changed successfully")))
}

/// POST /api/users/forgot-password
pub async fn forgot_password(
    data: web::Data<AppState>,
    body: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner().validate()?;
    data.users.forgot_password(&req.email).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Password reset email sent successfully")))
}

/// POST /api/users/reset-password/{token}
pub async fn reset_password(
    data: web::Data<AppState>,
    token: web::Path<String>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner().validate()?;
    data.users.reset_password(&token, &req.password).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Password reset successful")))
}
