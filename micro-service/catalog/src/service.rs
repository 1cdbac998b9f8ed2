use std::sync::Arc;
use tracing::{error, info, warn};

use app_config::{AdminSeedConfig, AppConfig, MailConfig, PasswordConfig};
use app_database::Store;
use app_error::{AppError, AppResult};
use app_middleware::{
    JwtService, LoginLimiter,
    security::password,
    validation,
};
use app_models::{ActivityLog, LoginInput, LoginResponse, SignupInput, User, UserProfile};
use app_utils::{MailMessage, Mailer, generate_verification_token};

/// Sanitised signup/login fields
#[derive(Debug)]
struct ValidationInput {
    name: String,
    email: String,
    password: String,
}

impl ValidationInput {
    fn from_signup_input(input: SignupInput) -> Self {
        Self {
            name: validation::sanitize_string(&input.name),
            email: validation::normalize_email(&input.email),
            password: input.password,
        }
    }

    fn from_login_input(input: LoginInput) -> Self {
        Self {
            name: String::new(), // Not used for login
            email: validation::normalize_email(&input.email),
            password: input.password,
        }
    }

    fn validate_signup(&self, rules: &PasswordConfig) -> AppResult<()> {
        validation::validate_name(&self.name)?;
        validation::validate_email(&self.email)?;
        validation::validate_password(&self.password, rules)?;
        Ok(())
    }

    fn validate_login(&self) -> AppResult<()> {
        if self.email.is_empty() {
            return Err(AppError::validation("email", "Email cannot be empty"));
        }

        if self.password.is_empty() {
            return Err(AppError::validation("password", "Password cannot be empty"));
        }

        Ok(())
    }
}

/// Persists an audit entry. Failures are logged and never fail the request
/// the entry describes.
pub async fn record_activity(store: &dyn Store, user_id: Option<String>, action: &str, detail: String) {
    let entry = ActivityLog::new(user_id, action, detail);
    if let Err(e) = store.log_activity(&entry).await {
        warn!(action, "Failed to record activity: {}", e);
    }
}

/// Signup, login and email verification.
pub struct AuthService {
    store: Arc<dyn Store>,
    jwt_service: Arc<JwtService>,
    mailer: Arc<dyn Mailer>,
    login_limiter: Arc<LoginLimiter>,
    password_rules: PasswordConfig,
    mail: MailConfig,
    require_verified_email: bool,
}

impl AuthService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn Store>,
        jwt_service: Arc<JwtService>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            jwt_service,
            mailer,
            login_limiter: Arc::new(LoginLimiter::from_settings(
                &config.security.rate_limiting.login,
            )),
            password_rules: config.security.password.clone(),
            mail: config.mail.clone(),
            require_verified_email: config.security.require_verified_email,
        }
    }

    pub fn jwt_service(&self) -> Arc<JwtService> {
        Arc::clone(&self.jwt_service)
    }

    async fn record_activity(&self, user_id: Option<String>, action: &str, detail: String) {
        record_activity(self.store.as_ref(), user_id, action, detail).await
    }

    /// Creates an unverified account and mails its verification link. The
    /// account is removed again when the mail cannot be sent.
    pub async fn signup(&self, input: SignupInput) -> AppResult<UserProfile> {
        let input = ValidationInput::from_signup_input(input);
        input.validate_signup(&self.password_rules)?;

        if self.store.get_user_by_email(&input.email).await?.is_some() {
            return Err(AppError::resource_exists("User", &input.email));
        }

        let hashed_password = password::hash_password(&input.password)?;
        let token = generate_verification_token();
        let user = User::new(input.name, input.email, hashed_password, false)
            .with_verification_token(token.clone());

        self.store.create_user(&user).await?;
        info!(user = %user.id, "Stored new user");

        let message = MailMessage::verification(
            &self.mail.from,
            &user.email,
            &user.name,
            &self.mail.verification_base_url,
            &token,
        );
        if let Err(e) = self.mailer.send(&message).await {
            error!(user = %user.id, "Verification email failed, removing account: {}", e);
            if let Err(cleanup) = self.store.delete_user(&user.id).await {
                error!(user = %user.id, "Failed to remove unverifiable account: {}", cleanup);
            }
            return Err(e);
        }

        self.record_activity(Some(user.id.clone()), "signup", format!("User {} signed up", user.email))
            .await;

        Ok(UserProfile::from(user))
    }

    pub async fn login(&self, input: LoginInput) -> AppResult<LoginResponse> {
        let input = ValidationInput::from_login_input(input);
        input.validate_login()?;

        self.login_limiter.check(&input.email).await?;

        let user = self.store.get_user_by_email(&input.email).await?;
        let is_valid = password::verify_password_or_dummy(
            &input.password,
            user.as_ref().map(|u| u.password.as_str()),
        );

        let user = match user {
            Some(user) if is_valid => user,
            _ => {
                self.login_limiter.record_failure(&input.email).await;
                warn!(email = %input.email, "Failed login attempt");
                return Err(AppError::invalid_credentials());
            }
        };

        if self.require_verified_email && !user.email_verified {
            return Err(AppError::AuthorizationError(
                "Please verify your email before logging in".to_string(),
            ));
        }

        self.login_limiter.record_success(&input.email).await;

        let token = self
            .jwt_service
            .generate_token(&user.id, &user.email, user.admin)?;

        self.record_activity(Some(user.id.clone()), "login", format!("User {} logged in", user.email))
            .await;

        Ok(LoginResponse {
            message: "Login successful".to_string(),
            token,
            admin: user.admin,
            user: UserProfile::from(user),
        })
    }

    pub async fn verify_email(&self, token: &str) -> AppResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::InputError(
                "Verification token is required".to_string(),
            ));
        }

        let user = self
            .store
            .get_user_by_verification_token(token)
            .await?
            .ok_or_else(|| AppError::InputError("Invalid or expired token".to_string()))?;

        if user.email_verified {
            return Err(AppError::InputError("Email is already verified".to_string()));
        }

        if !self.store.mark_email_verified(&user.id).await? {
            return Err(AppError::resource_not_found("User", &user.id));
        }

        info!(user = %user.id, "Email verified");
        Ok(())
    }

    /// Creates the configured admin account unless the email is taken.
    pub async fn ensure_admin(&self, seed: &AdminSeedConfig) -> AppResult<()> {
        let email = validation::normalize_email(&seed.email);
        validation::validate_email(&email)?;

        if self.store.get_user_by_email(&email).await?.is_some() {
            info!(email = %email, "Admin account already present");
            return Ok(());
        }

        let hashed_password = password::hash_password(&seed.password)?;
        let mut admin = User::new(validation::sanitize_string(&seed.name), email, hashed_password, true);
        admin.email_verified = true;

        self.store.create_user(&admin).await?;
        info!(user = %admin.id, "Bootstrap admin created");
        Ok(())
    }
}
