//! Authentication Routes
//!
//! Thin transport adapter over the rotation engine. The access token travels
//! in the JSON body; the refresh token only ever travels in the `HttpOnly`
//! refresh cookie.

use actix_web::http::header::USER_AGENT;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, verify_password, AccessClaims};
use crate::credentials::{User, DEFAULT_ROLE};
use crate::error::{AppError, AuthError, ErrorContext, ValidationError};
use crate::revocation::RevocationReason;
use crate::rotation::{RotationEngine, TokenPair};
use crate::routes::cookie::RefreshCookie;
use crate::session::Provenance;

/// Registration and login request
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// User information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

/// Login/registration response; the refresh token goes out as a cookie
#[derive(Serialize)]
pub struct AuthResponse {
    pub status: &'static str,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

/// Token refresh response
#[derive(Serialize)]
pub struct RefreshResponse {
    pub status: &'static str,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    revoked: Option<u64>,
}

fn provenance(req: &HttpRequest) -> Provenance {
    Provenance {
        ip: req
            .connection_info()
            .realip_remote_addr()
            .map(str::to_string),
        user_agent: req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ValidationError::InvalidFormat("email".to_string())),
    }
}

fn auth_response(pair: TokenPair, user: &User) -> AuthResponse {
    AuthResponse {
        status: "ok",
        access_token: pair.access_token,
        token_type: pair.token_type,
        expires_in: pair.expires_in,
        user: UserResponse::from(user),
    }
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid email or password outside 8..=128 characters
/// - 409: email already registered
pub async fn register(
    form: web::Json<CredentialsRequest>,
    req: HttpRequest,
    engine: web::Data<RotationEngine>,
    cookie: web::Data<RefreshCookie>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let email = normalize_email(&form.email)?;
    let password_hash = hash_password(&form.password)?;
    let user = engine
        .credentials()
        .create_user(&email, &password_hash, DEFAULT_ROLE)
        .await?;

    let pair = engine.issue(user.id, &user.role, &provenance(&req)).await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = context.operation,
        user_id = %user.id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created()
        .cookie(cookie.build(&pair.refresh_token, pair.refresh_expires_in))
        .json(auth_response(pair, &user)))
}

/// POST /auth/login
///
/// Unknown email and wrong password produce the same 401.
pub async fn login(
    form: web::Json<CredentialsRequest>,
    req: HttpRequest,
    engine: web::Data<RotationEngine>,
    cookie: web::Data<RefreshCookie>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let email = normalize_email(&form.email)?;
    let user = engine
        .credentials()
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::Auth(AuthError::InvalidCredentials))?;

    if !verify_password(&form.password, &user.password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    let pair = engine.issue(user.id, &user.role, &provenance(&req)).await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = context.operation,
        user_id = %user.id,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok()
        .cookie(cookie.build(&pair.refresh_token, pair.refresh_expires_in))
        .json(auth_response(pair, &user)))
}

/// POST /auth/refresh
///
/// Rotates the refresh cookie. Every authentication failure answers 401 and
/// clears the cookie; a storage outage answers 503 and leaves it in place so
/// the client can retry.
pub async fn refresh(
    req: HttpRequest,
    engine: web::Data<RotationEngine>,
    cookie: web::Data<RefreshCookie>,
) -> HttpResponse {
    let context = ErrorContext::new("token_refresh");

    let raw = match cookie.extract(&req) {
        Some(raw) => raw,
        None => return cookie.reject(&AppError::Auth(AuthError::MissingToken)),
    };

    match engine.refresh(&raw, &provenance(&req)).await {
        Ok(pair) => {
            tracing::debug!(
                request_id = %context.request_id,
                operation = context.operation,
                "Token refreshed successfully"
            );
            HttpResponse::Ok()
                .cookie(cookie.build(&pair.refresh_token, pair.refresh_expires_in))
                .json(RefreshResponse {
                    status: "ok",
                    access_token: pair.access_token,
                    token_type: pair.token_type,
                    expires_in: pair.expires_in,
                })
        }
        Err(e) => {
            let clear_cookie = e.requires_reauthentication();
            let err = AppError::from(e);
            if clear_cookie {
                cookie.reject(&err)
            } else {
                ResponseError::error_response(&err)
            }
        }
    }
}

/// POST /auth/logout
///
/// Always succeeds and always clears the cookie.
pub async fn logout(
    req: HttpRequest,
    engine: web::Data<RotationEngine>,
    cookie: web::Data<RefreshCookie>,
) -> HttpResponse {
    if let Some(raw) = cookie.extract(&req) {
        let outcome = engine.revoke_one(&raw).await;
        tracing::debug!(outcome = ?outcome, "Logout processed");
    }

    HttpResponse::Ok()
        .cookie(cookie.removal())
        .json(StatusResponse {
            status: "ok",
            revoked: None,
        })
}

/// POST /auth/logout-all
///
/// **Requires a valid access token.** Revokes every session of the caller.
pub async fn logout_all(
    claims: web::ReqData<AccessClaims>,
    engine: web::Data<RotationEngine>,
    cookie: web::Data<RefreshCookie>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let revoked = engine.revoke_all(user_id, RevocationReason::Logout).await?;

    Ok(HttpResponse::Ok()
        .cookie(cookie.removal())
        .json(StatusResponse {
            status: "ok",
            revoked: Some(revoked),
        }))
}

/// GET /auth/me
///
/// **Requires a valid access token.**
pub async fn get_current_user(
    claims: web::ReqData<AccessClaims>,
    engine: web::Data<RotationEngine>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = engine
        .credentials()
        .find_user_by_id(user_id)
        .await?
        .ok_or(AppError::Auth(AuthError::SessionNotFound))?;

    Ok(HttpResponse::Ok().json(UserResponse::from(&user)))
}
