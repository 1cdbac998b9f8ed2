use app_error::{AppError, AppResult};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use lazy_static::lazy_static;
use tracing::{debug, error, warn};

lazy_static! {
    // Verified against when the account does not exist so that unknown
    // emails cost the same as wrong passwords.
    static ref DUMMY_HASH: Option<String> = hash_password("movieverse-dummy-password").ok();
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {}", e);
            AppError::ServerError(anyhow::anyhow!("Failed to hash password: {}", e))
        })?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored PHC string. A malformed stored hash
/// never matches.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(password_hash) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            return false;
        }
    };

    let is_valid = Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok();

    debug!("Password verification result: {}", is_valid);
    is_valid
}

/// Verify against the stored hash when there is one, otherwise burn the
/// same amount of work on a dummy hash and fail.
pub fn verify_password_or_dummy(password: &str, password_hash: Option<&str>) -> bool {
    match password_hash {
        Some(hash) => verify_password(password, hash),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(password, dummy);
            }
            false
        }
    }
}
