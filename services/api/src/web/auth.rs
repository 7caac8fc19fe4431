//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: signup, login, logout, e-mail confirmation and
//! password reset.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use askama::Template;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};
use weather_to_ride_core::domain::NewUser;
use weather_to_ride_core::ports::PortError;
use weather_to_ride_core::rules;

use crate::error::ApiError;
use crate::web::middleware::{session_id, SESSION_COOKIE};
use crate::web::state::AppState;
use crate::web::tokens::{self, TokenPurpose};

const SESSION_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(
        email(message = "Please enter a valid e-mail address."),
        length(max = 32, message = "E-mail address must be at most 32 characters.")
    )]
    pub email: String,
    #[validate(length(min = 8, message = "Your password must be at least 8 characters."))]
    pub password: String,
    #[validate(must_match(other = "password", message = "The passwords do not match."))]
    pub confirm: String,
    #[validate(length(min = 1, max = 32, message = "Name must be 1 to 32 characters."))]
    pub name: String,
    /// Up to ten digits.
    pub phone: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "Your password must be at least 8 characters."))]
    pub password: String,
    #[validate(must_match(other = "password", message = "The passwords do not match."))]
    pub confirm: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// The first failed rule, taking fields in name order so the choice is stable.
fn first_violation(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(field, errs)| errs.iter().map(move |e| (field.clone(), e)))
        .map(|(field, e)| {
            e.message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("The {field} field is invalid."))
        })
        .next()
        .unwrap_or_else(|| "The submitted form is invalid.".to_string())
}

pub fn validate_form(form: &impl Validate) -> Result<(), ApiError> {
    form.validate()
        .map_err(|errors| ApiError::BadRequest(first_violation(&errors)))
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })
}

fn session_cookie(auth_session_id: &str, max_age_secs: i64) -> String {
    format!(
        "{SESSION_COOKIE}={auth_session_id}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={max_age_secs}"
    )
}

/// The `Set-Cookie` value that ends the browser's session.
pub fn expired_session_cookie() -> String {
    session_cookie("", 0)
}

fn link(state: &AppState, path: &str, token: &str) -> String {
    format!("{}{}/{}", state.config.public_url, path, token)
}

/// Links are built from `PUBLIC_URL` and a base64url token, so only the name is escaped.
#[derive(Template)]
#[template(path = "confirm_email.html")]
struct ConfirmationEmail<'a> {
    name: &'a str,
    url: &'a str,
}

#[derive(Template)]
#[template(path = "reset_email.html")]
struct ResetEmail<'a> {
    url: &'a str,
}

fn render(mail: &impl Template) -> Result<String, ApiError> {
    mail.render().map_err(|e| {
        error!("Failed to render e-mail: {:?}", e);
        ApiError::Internal("Failed to render e-mail".to_string())
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Registration is closed"),
        (status = 409, description = "E-mail or phone already in use")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_form(&req)?;
    let name = req.name.trim();
    rules::validate_user_name(name)?;
    let phone = req.phone.trim();
    rules::validate_phone(phone)?;

    if let Some(max_users) = state.config.max_users {
        if state.db.count_users().await? >= max_users {
            return Err(PortError::Forbidden(
                "Sorry. We are not accepting new users at the moment.".into(),
            )
            .into());
        }
    }

    let user = state
        .db
        .create_user(NewUser {
            email: req.email.trim().to_string(),
            name: name.to_string(),
            phone: phone.to_string(),
            hashed_password: hash_password(&req.password)?,
        })
        .await?;
    info!(user_id = %user.id, "User registered");

    // Registration stands even when the confirmation mail cannot be sent.
    let token = tokens::sign(
        state.config.secret_key.as_bytes(),
        TokenPurpose::ConfirmEmail,
        &user.email,
        state.clock.now(),
    )?;
    let url = link(&state, "/auth/confirm", &token);
    let mail = ConfirmationEmail {
        name: &user.name,
        url: &url,
    };
    let sent = match render(&mail) {
        Ok(html) => state
            .email
            .send(&user.email, "Confirm E-mail", &html)
            .await
            .map_err(ApiError::from),
        Err(e) => Err(e),
    };
    if let Err(e) = sent {
        warn!(user_id = %user.id, error = %e, "Confirmation e-mail was not sent");
    }

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id: user.id,
            email: user.email,
            message: "You have successfully registered!".to_string(),
        }),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_creds = state
        .db
        .get_user_by_email(req.email.trim())
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => ApiError::Unauthenticated(
                "That e-mail address is not registered with an account.".into(),
            ),
            other => other.into(),
        })?;

    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(ApiError::Unauthenticated("Password is incorrect.".into()));
    }

    let auth_session_id = Uuid::new_v4().to_string();
    let lifetime = Duration::days(SESSION_DAYS);
    // Session expiry is checked against the database's wall clock.
    state
        .db
        .create_auth_session(&auth_session_id, user_creds.user_id, Utc::now() + lifetime)
        .await?;
    info!(user_id = %user_creds.user_id, "User logged in");

    let user = state.db.get_user(user_creds.user_id).await?;
    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            session_cookie(&auth_session_id, lifetime.num_seconds()),
        )],
        Json(AuthResponse {
            user_id: user.id,
            email: user.email,
            message: format!("Welcome, {}.", user.name),
        }),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(auth_session_id) = session_id(&headers) {
        state.db.delete_auth_session(auth_session_id).await?;
    }
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, expired_session_cookie())],
        MessageResponse::new("You are now logged out."),
    ))
}

/// GET /auth/confirm/{token} - Confirm the e-mail address a link was sent to
#[utoipa::path(
    get,
    path = "/auth/confirm/{token}",
    params(("token" = String, Path, description = "The token from the confirmation e-mail.")),
    responses(
        (status = 200, description = "E-mail confirmed", body = MessageResponse),
        (status = 400, description = "Invalid or expired link"),
        (status = 404, description = "No such user")
    )
)]
pub async fn confirm_email_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let email = tokens::verify(
        state.config.secret_key.as_bytes(),
        TokenPurpose::ConfirmEmail,
        &token,
        state.clock.now(),
    )?;
    state.db.confirm_email(&email).await.map_err(|e| match e {
        PortError::NotFound(_) => PortError::NotFound("User does not exist.".into()),
        other => other,
    })?;
    info!("E-mail address confirmed");
    Ok(MessageResponse::new("Your e-mail address has been confirmed!"))
}

/// POST /auth/forgot - Mail a password reset link
#[utoipa::path(
    post,
    path = "/auth/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent", body = MessageResponse),
        (status = 404, description = "No user with that e-mail address")
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_creds = state
        .db
        .get_user_by_email(req.email.trim())
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => {
                PortError::NotFound("There is no user with that e-mail address.".into())
            }
            other => other,
        })?;

    let token = tokens::sign(
        state.config.secret_key.as_bytes(),
        TokenPurpose::ResetPassword,
        &user_creds.email,
        state.clock.now(),
    )?;
    let url = link(&state, "/auth/reset", &token);
    state
        .email
        .send(&user_creds.email, "Reset Password", &render(&ResetEmail { url: &url })?)
        .await?;

    Ok(MessageResponse::new(
        "Check your e-mail for instructions on how to reset your password.",
    ))
}

/// POST /auth/reset/{token} - Set a new password with a mailed reset token
#[utoipa::path(
    post,
    path = "/auth/reset/{token}",
    params(("token" = String, Path, description = "The token from the reset e-mail.")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid form or expired link")
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = tokens::verify(
        state.config.secret_key.as_bytes(),
        TokenPurpose::ResetPassword,
        &token,
        state.clock.now(),
    )?;
    validate_form(&req)?;

    state
        .db
        .update_password(&email, &hash_password(&req.password)?)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => {
                PortError::Invalid("There was a problem updating the password.".into())
            }
            other => other,
        })?;
    info!("Password reset");
    Ok(MessageResponse::new("Your password has been successfully reset!"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(email: &str, password: &str, confirm: &str, name: &str) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            password: password.to_string(),
            confirm: confirm.to_string(),
            name: name.to_string(),
            phone: "2055550100".to_string(),
        }
    }

    fn violation(req: &SignupRequest) -> Option<String> {
        match validate_form(req) {
            Err(ApiError::BadRequest(message)) => Some(message),
            _ => None,
        }
    }

    #[test]
    fn well_formed_signup_passes() {
        assert_eq!(
            violation(&signup("rider@example.com", "hunter22!", "hunter22!", "Ray")),
            None
        );
    }

    #[test]
    fn signup_rules_report_their_messages() {
        assert_eq!(
            violation(&signup("not-an-email", "hunter22!", "hunter22!", "Ray")).as_deref(),
            Some("Please enter a valid e-mail address.")
        );
        assert_eq!(
            violation(&signup("rider@example.com", "short", "short", "Ray")).as_deref(),
            Some("Your password must be at least 8 characters.")
        );
        assert_eq!(
            violation(&signup("rider@example.com", "hunter22!", "hunter23!", "Ray")).as_deref(),
            Some("The passwords do not match.")
        );
        assert_eq!(
            violation(&signup("rider@example.com", "hunter22!", "hunter22!", "")).as_deref(),
            Some("Name must be 1 to 32 characters.")
        );
    }

    #[test]
    fn mailed_names_are_escaped() {
        let html = render(&ConfirmationEmail {
            name: "<img src=x>",
            url: "http://localhost:3000/auth/confirm/abc",
        })
        .unwrap();
        assert!(html.starts_with("<p>Hi &lt;img src=x&gt;,</p>"));
        assert!(!html.contains("<img"));
        assert!(html.contains("<a href=\"http://localhost:3000/auth/confirm/abc\">"));
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("abc", 60);
        assert!(cookie.starts_with("session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=60"));
        assert!(expired_session_cookie().contains("Max-Age=0"));
    }
}
