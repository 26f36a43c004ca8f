// src/google.rs
//
// Google sign-in: consent redirect, code exchange and the redirect back to
// the frontend with a session token. The callback only proceeds when its
// `state` matches the nonce cookie set by the consent redirect.

use actix_web::{
    cookie::{time, Cookie, SameSite},
    http::header,
    web, HttpRequest, HttpResponse,
};
use log::{error, info, warn};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::app_state::AppState;
use crate::config::GoogleConfig;
use crate::models::AuthPayload;
use crate::user_service::GoogleProfile;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const SCOPES: &str = "openid email profile";

pub const STATE_COOKIE: &str = "google_oauth_state";
const STATE_COOKIE_PATH: &str = "/api/auth/google";
const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("google answered {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("google profile has no email")]
    MissingEmail,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl UserInfo {
    fn into_profile(self) -> Result<GoogleProfile, OAuthError> {
        let email = self.email.ok_or(OAuthError::MissingEmail)?;
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        Ok(GoogleProfile {
            id: self.sub,
            email,
            name,
            avatar: self.picture,
        })
    }
}

pub struct GoogleOAuth {
    config: GoogleConfig,
    client: Client,
}

impl GoogleOAuth {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Google's consent screen for this application, carrying `state` back
    /// to the callback.
    pub fn authorize_url(&self, state: &str) -> Result<Url, OAuthError> {
        Ok(Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )?)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let resp = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OAuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        let data: TokenResponse = resp.json().await?;
        Ok(data.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<GoogleProfile, OAuthError> {
        let resp = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OAuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        let info: UserInfo = resp.json().await?;
        info.into_profile()
    }

    /// Trades an authorization code for the signed-in account's profile.
    pub async fn profile_for_code(&self, code: &str) -> Result<GoogleProfile, OAuthError> {
        let access_token = self.exchange_code(code).await?;
        self.fetch_profile(&access_token).await
    }
}

pub fn failure_redirect(frontend_url: &str) -> String {
    format!(
        "{}/login?error=google_auth_failed",
        frontend_url.trim_end_matches('/')
    )
}

/// Where the browser lands after a successful sign-in: the token and the
/// JSON-encoded user travel as query parameters.
pub fn success_redirect(frontend_url: &str, auth: &AuthPayload) -> Result<String, OAuthError> {
    let user = serde_json::to_string(&auth.user).unwrap_or_default();
    let base = format!("{}/auth/callback", frontend_url.trim_end_matches('/'));
    let url = Url::parse_with_params(&base, &[("token", auth.token.as_str()), ("user", user.as_str())])?;
    Ok(url.to_string())
}

/// A fresh random nonce for one sign-in attempt.
pub fn new_state() -> String {
    rand::random::<[u8; 16]>()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// True when the callback echoes the nonce this browser was given.
pub fn state_matches(issued: Option<&str>, returned: Option<&str>) -> bool {
    match (issued, returned) {
        (Some(issued), Some(returned)) => !issued.is_empty() && issued == returned,
        _ => false,
    }
}

fn state_cookie(value: String) -> Cookie<'static> {
    Cookie::build(STATE_COOKIE, value)
        .path(STATE_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(STATE_TTL_MINUTES))
        .finish()
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn redirect_with_cookie(location: &str, cookie: Cookie<'static>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .cookie(cookie)
        .finish()
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn google_login(data: web::Data<AppState>) -> HttpResponse {
    let frontend = &data.config.frontend_url;
    let Some(google) = data.google.as_ref() else {
        return redirect(&failure_redirect(frontend));
    };
    let state = new_state();
    match google.authorize_url(&state) {
        Ok(url) => redirect_with_cookie(url.as_str(), state_cookie(state)),
        Err(e) => {
            error!("Could not build Google consent URL: {}", e);
            redirect(&failure_redirect(frontend))
        }
    }
}

pub async fn google_callback(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<CallbackQuery>,
) -> HttpResponse {
    let frontend = &data.config.frontend_url;
    let mut spent = state_cookie(String::new());
    spent.make_removal();

    let (Some(google), Some(code)) = (data.google.as_ref(), query.code.as_deref()) else {
        if let Some(reason) = &query.error {
            info!("Google sign-in declined: {}", reason);
        }
        return redirect_with_cookie(&failure_redirect(frontend), spent);
    };

    let issued = req.cookie(STATE_COOKIE);
    if !state_matches(issued.as_ref().map(|c| c.value()), query.state.as_deref()) {
        warn!("Google callback state did not match the issued nonce");
        return redirect_with_cookie(&failure_redirect(frontend), spent);
    }

    let profile = match google.profile_for_code(code).await {
        Ok(profile) => profile,
        Err(e) => {
            error!("Google sign-in failed: {}", e);
            return redirect_with_cookie(&failure_redirect(frontend), spent);
        }
    };

    let location = match data.users.google_auth(profile).await {
        Ok(auth) => success_redirect(frontend, &auth).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    match location {
        Ok(location) => redirect_with_cookie(&location, spent),
        Err(e) => {
            error!("Google sign-in failed: {}", e);
            redirect_with_cookie(&failure_redirect(frontend), spent)
        }
    }
}
