// src/user_service.rs

use std::sync::Arc;
use std::time::Duration;

use bcrypt::{hash, verify};
use log::{error, info, warn};
use sha2::{Digest, Sha256};

use crate::auth::create_jwt;
use crate::clock::Clock;
use crate::error::{AppError, StoreError};
use crate::mailer::{password_reset_email, Mailer};
use crate::models::user::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest,
};
use crate::models::{AuthPayload, AuthProvider, NewUserRecord, User, UserProfile};
use crate::store::UserStore;

const RESET_TOKEN_MINUTES: i64 = 10;

/// Token and password parameters for [`UserService`].
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub bcrypt_cost: u32,
    /// Base URL that password reset links point at.
    pub frontend_url: String,
}

/// What Google tells us about a signed-in account.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
}

pub struct UserService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    settings: AuthSettings,
}

fn hash_reset_token(token: &str) -> String {
    to_hex(&Sha256::digest(token.as_bytes()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn google_only_error(action: &str) -> AppError {
    AppError::validation(format!(
        "Google users cannot {}. Please use your Google account.",
        action
    ))
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            settings,
        }
    }

    fn hash_password(&self, password: &str) -> Result<String, AppError> {
        hash(password, self.settings.bcrypt_cost).map_err(|e| {
            error!("Password hashing failed: {}", e);
            AppError::Internal("Password could not be processed".to_string())
        })
    }

    fn password_matches(user: &User, candidate: &str) -> bool {
        user.password_hash
            .as_deref()
            .is_some_and(|stored| verify(candidate, stored).unwrap_or(false))
    }

    /// Signs a session token for `user`.
    pub fn issue_token(&self, user: &User) -> Result<AuthPayload, AppError> {
        let token = create_jwt(
            &user.id,
            &self.settings.jwt_secret,
            self.settings.jwt_ttl,
            self.clock.now(),
        )
        .map_err(|e| {
            error!("Token signing failed: {}", e);
            AppError::Internal("Token could not be issued".to_string())
        })?;
        Ok(AuthPayload {
            user: UserProfile::from(user),
            token,
        })
    }

    async fn require_user(&self, user_id: &str) -> Result<User, AppError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or_else(AppError::user_not_found)
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthPayload, AppError> {
        let taken = || AppError::Conflict("User already exists with this email".to_string());
        if self.store.find_by_email(&req.email).await?.is_some() {
            return Err(taken());
        }
        // A concurrent register can still win the race to the unique index.
        let user = self
            .store
            .insert(NewUserRecord {
                name: req.name,
                email: req.email,
                password_hash: Some(self.hash_password(&req.password)?),
                google_id: None,
                avatar: None,
                auth_provider: AuthProvider::Local,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => taken(),
                other => AppError::Store(other),
            })?;
        info!("Registered user {}", user.id);
        self.issue_token(&user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthPayload, AppError> {
        let invalid = || AppError::Unauthorized("Invalid credentials".to_string());
        let user = self.store.find_by_email(&req.email).await?.ok_or_else(invalid)?;
        if user.is_google_only() {
            return Err(AppError::validation("Please login with Google"));
        }
        if !Self::password_matches(&user, &req.password) {
            return Err(invalid());
        }
        self.issue_token(&user)
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile, AppError> {
        let user = self.require_user(user_id).await?;
        Ok(UserProfile::from(&user))
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        req: UpdateProfileRequest,
    ) -> Result<UserProfile, AppError> {
        let mut user = self.require_user(user_id).await?;
        if let Some(name) = req.name {
            user.name = name;
        }
        if let Some(avatar) = req.avatar {
            user.avatar = avatar;
        }
        let saved = self.store.save(&user).await?;
        Ok(UserProfile::from(&saved))
    }

    pub async fn change_password(&self, user_id: &str, req: ChangePasswordRequest) -> Result<(), AppError> {
        let mut user = self.require_user(user_id).await?;
        if user.is_google_only() {
            return Err(google_only_error("change password"));
        }
        if !Self::password_matches(&user, &req.current_password) {
            return Err(AppError::validation("Current password is incorrect"));
        }
        user.password_hash = Some(self.hash_password(&req.new_password)?);
        self.store.save(&user).await?;
        Ok(())
    }

    /// Emails a single-use reset link valid for ten minutes. Only the token's
    /// hash is stored.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let mut user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("No user found with this email".to_string()))?;
        if user.is_google_only() {
            return Err(google_only_error("reset password"));
        }

        let token = to_hex(&rand::random::<[u8; 20]>());
        user.reset_password_token = Some(hash_reset_token(&token));
        user.reset_password_expire = Some(self.clock.now() + chrono::Duration::minutes(RESET_TOKEN_MINUTES));
        let mut user = self.store.save(&user).await?;

        let reset_url = format!(
            "{}/reset-password/{}",
            self.settings.frontend_url.trim_end_matches('/'),
            token
        );
        let email = password_reset_email(&user.email, &user.name, &reset_url);
        if let Err(e) = self.mailer.send(email).await {
            error!("Password reset email to user {} failed: {}", user.id, e);
            user.reset_password_token = None;
            user.reset_password_expire = None;
            self.store.save(&user).await?;
            return Err(AppError::Internal("Email could not be sent".to_string()));
        }
        info!("Password reset requested for user {}", user.id);
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), AppError> {
        let mut user = self
            .store
            .find_by_reset_token(&hash_reset_token(token), self.clock.now())
            .await?
            .ok_or_else(|| AppError::validation("Invalid or expired reset token"))?;
        user.password_hash = Some(self.hash_password(password)?);
        user.reset_password_token = None;
        user.reset_password_expire = None;
        self.store.save(&user).await?;
        info!("Password reset completed for user {}", user.id);
        Ok(())
    }

    /// Signs in with a Google account, linking it to an existing account with
    /// the same email or creating a new one.
    pub async fn google_auth(&self, profile: GoogleProfile) -> Result<AuthPayload, AppError> {
        if let Some(user) = self.store.find_by_google_id(&profile.id).await? {
            return self.issue_token(&user);
        }

        let email = profile.email.trim().to_lowercase();
        let user = match self.store.find_by_email(&email).await? {
            Some(mut existing) => {
                warn!("Linking Google account to existing user {}", existing.id);
                existing.google_id = Some(profile.id);
                existing.auth_provider = AuthProvider::Google;
                if profile.avatar.is_some() {
                    existing.avatar = profile.avatar;
                }
                self.store.save(&existing).await?
            }
            None => {
                self.store
                    .insert(NewUserRecord {
                        name: profile.name,
                        email,
                        password_hash: None,
                        google_id: Some(profile.id),
                        avatar: profile.avatar,
                        auth_provider: AuthProvider::Google,
                    })
                    .await?
            }
        };
        self.issue_token(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::validate_jwt;
    use crate::clock::FixedClock;
    use crate::mailer::{Email, MailError};
    use crate::store::InMemoryUserStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<Email>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: Email) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::Delivery("smtp down".into()));
            }
            self.sent.lock().await.push(email);
            Ok(())
        }
    }

    struct Harness {
        clock: Arc<FixedClock>,
        store: Arc<InMemoryUserStore>,
        mailer: Arc<RecordingMailer>,
        service: UserService,
    }

    fn harness_with(mailer: RecordingMailer) -> Harness {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = Arc::new(InMemoryUserStore::new(clock.clone()));
        let mailer = Arc::new(mailer);
        let service = UserService::new(
            store.clone(),
            mailer.clone(),
            clock.clone(),
            AuthSettings {
                jwt_secret: "secret".into(),
                jwt_ttl: Duration::from_secs(3600),
                bcrypt_cost: 4,
                frontend_url: "http://localhost:3000".into(),
            },
        );
        Harness {
            clock,
            store,
            mailer,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingMailer::default())
    }

    fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ada".into(),
            email: email.into(),
            password: password.into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    fn token_from(email: &Email) -> String {
        let start = email.html.find("/reset-password/").unwrap() + "/reset-password/".len();
        email.html[start..start + 40].to_string()
    }

    #[tokio::test]
    async fn register_then_login() {
        let h = harness();
        let registered = h.service.register(register_req("ada@example.com", "secret1")).await.unwrap();
        assert_eq!(registered.user.auth_provider, AuthProvider::Local);
        let claims = validate_jwt(&registered.token, "secret").unwrap();
        assert_eq!(claims.sub, registered.user.id);

        let logged_in = h.service.login(login_req("ada@example.com", "secret1")).await.unwrap();
        assert_eq!(logged_in.user, registered.user);

        assert!(matches!(
            h.service.login(login_req("ada@example.com", "wrong!!")).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            h.service.login(login_req("nobody@example.com", "secret1")).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let h = harness();
        h.service.register(register_req("ada@example.com", "secret1")).await.unwrap();
        let err = h
            .service
            .register(register_req("ada@example.com", "secret2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg == "User already exists with this email"));
    }

    /// Answers every email lookup with "absent", as a racing register sees it.
    struct LateLookupStore(InMemoryUserStore);

    #[async_trait]
    impl UserStore for LateLookupStore {
        async fn insert(&self, user: NewUserRecord) -> crate::error::StoreResult<User> {
            self.0.insert(user).await
        }
        async fn find_by_id(&self, id: &str) -> crate::error::StoreResult<Option<User>> {
            self.0.find_by_id(id).await
        }
        async fn find_by_email(&self, _email: &str) -> crate::error::StoreResult<Option<User>> {
            Ok(None)
        }
        async fn find_by_google_id(&self, google_id: &str) -> crate::error::StoreResult<Option<User>> {
            self.0.find_by_google_id(google_id).await
        }
        async fn find_by_reset_token(
            &self,
            token_hash: &str,
            now: chrono::DateTime<Utc>,
        ) -> crate::error::StoreResult<Option<User>> {
            self.0.find_by_reset_token(token_hash, now).await
        }
        async fn save(&self, user: &User) -> crate::error::StoreResult<User> {
            self.0.save(user).await
        }
    }

    #[tokio::test]
    async fn unique_index_collisions_are_a_conflict() {
        let h = harness();
        let service = UserService::new(
            Arc::new(LateLookupStore(InMemoryUserStore::default())),
            h.mailer.clone(),
            h.clock.clone(),
            h.service.settings.clone(),
        );
        service.register(register_req("ada@example.com", "secret1")).await.unwrap();
        let err = service
            .register(register_req("ada@example.com", "secret2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg == "User already exists with this email"));
    }

    #[tokio::test]
    async fn profile_updates_and_password_change() {
        let h = harness();
        let auth = h.service.register(register_req("ada@example.com", "secret1")).await.unwrap();
        let id = auth.user.id;

        let updated = h
            .service
            .update_profile(
                &id,
                UpdateProfileRequest {
                    name: Some("Ada L".into()),
                    avatar: Some(Some("https://img/a.png".into())),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada L");
        assert_eq!(updated.avatar.as_deref(), Some("https://img/a.png"));

        let wrong = ChangePasswordRequest {
            current_password: "nope".into(),
            new_password: "secret2".into(),
        };
        assert!(matches!(h.service.change_password(&id, wrong).await, Err(AppError::Validation(_))));

        let right = ChangePasswordRequest {
            current_password: "secret1".into(),
            new_password: "secret2".into(),
        };
        h.service.change_password(&id, right).await.unwrap();
        assert!(h.service.login(login_req("ada@example.com", "secret2")).await.is_ok());

        assert!(matches!(h.service.profile("missing").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn reset_flow_uses_the_emailed_token_once() {
        let h = harness();
        h.service.register(register_req("ada@example.com", "secret1")).await.unwrap();
        h.service.forgot_password("ada@example.com").await.unwrap();

        let sent = h.mailer.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        let token = token_from(&sent[0]);
        assert!(sent[0].html.contains("http://localhost:3000/reset-password/"));

        let stored = h.store.find_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(stored.reset_password_token, Some(hash_reset_token(&token)));

        h.service.reset_password(&token, "newpass").await.unwrap();
        assert!(h.service.login(login_req("ada@example.com", "newpass")).await.is_ok());
        assert!(matches!(
            h.service.reset_password(&token, "another").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn reset_token_expires_after_ten_minutes() {
        let h = harness();
        h.service.register(register_req("ada@example.com", "secret1")).await.unwrap();
        h.service.forgot_password("ada@example.com").await.unwrap();
        let token = token_from(&h.mailer.sent.lock().await[0]);

        h.clock.advance(chrono::Duration::minutes(11));
        assert!(matches!(
            h.service.reset_password(&token, "newpass").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn failed_delivery_clears_the_token() {
        let h = harness_with(RecordingMailer {
            fail: true,
            ..RecordingMailer::default()
        });
        h.service.register(register_req("ada@example.com", "secret1")).await.unwrap();

        let err = h.service.forgot_password("ada@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(msg) if msg == "Email could not be sent"));
        let stored = h.store.find_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(stored.reset_password_token, None);
        assert_eq!(stored.reset_password_expire, None);

        assert!(matches!(
            h.service.forgot_password("nobody@example.com").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn google_sign_in_creates_links_and_reuses_accounts() {
        let h = harness();
        let profile = GoogleProfile {
            id: "g-1".into(),
            email: "Grace@Example.com".into(),
            name: "Grace".into(),
            avatar: None,
        };
        let created = h.service.google_auth(profile.clone()).await.unwrap();
        assert_eq!(created.user.email, "grace@example.com");
        assert_eq!(created.user.auth_provider, AuthProvider::Google);

        let again = h.service.google_auth(profile).await.unwrap();
        assert_eq!(again.user.id, created.user.id);

        assert!(matches!(
            h.service.login(login_req("grace@example.com", "whatever")).await,
            Err(AppError::Validation(msg)) if msg == "Please login with Google"
        ));
        assert!(matches!(
            h.service.forgot_password("grace@example.com").await,
            Err(AppError::Validation(_))
        ));

        let local = h.service.register(register_req("ada@example.com", "secret1")).await.unwrap();
        let linked = h
            .service
            .google_auth(GoogleProfile {
                id: "g-2".into(),
                email: "ada@example.com".into(),
                name: "Ada".into(),
                avatar: Some("https://img/ada.png".into()),
            })
            .await
            .unwrap();
        assert_eq!(linked.user.id, local.user.id);
        assert_eq!(linked.user.avatar.as_deref(), Some("https://img/ada.png"));
        // The linked account still has its password.
        assert!(h.service.login(login_req("ada@example.com", "secret1")).await.is_ok());
    }
}
