use app_config::PasswordConfig;
use app_error::{AppError, AppResult};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Local part of letters, digits and `_+.-`, then a dotted domain with a
    // 2-24 letter TLD. Callers lowercase the address first.
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-z0-9_+\-]([a-z0-9_+.\-]*[a-z0-9_+\-])?@[a-z0-9]+([\-.][a-z0-9]+)*\.[a-z]{2,24}$"
    )
    .unwrap_or_else(|e| panic!("email regex: {e}"));
}

/// Trims and lowercases an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates an already normalised email address
pub fn validate_email(email: &str) -> AppResult<()> {
    if email.trim().is_empty() {
        return Err(AppError::validation("email", "Email cannot be empty"));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(AppError::validation("email", "Invalid email format"));
    }

    Ok(())
}

pub fn validate_name(name: &str) -> AppResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(AppError::validation("name", "Name cannot be empty"));
    }

    if name.chars().count() < 2 {
        return Err(AppError::validation(
            "name",
            "Name must be at least 2 characters long",
        ));
    }

    if name.chars().count() > 100 {
        return Err(AppError::validation(
            "name",
            "Name cannot exceed 100 characters",
        ));
    }

    Ok(())
}

/// Validates password against configured requirements
pub fn validate_password(password: &str, rules: &PasswordConfig) -> AppResult<()> {
    if password.trim().is_empty() {
        return Err(AppError::validation("password", "Password cannot be empty"));
    }

    if password.chars().count() < rules.min_length {
        return Err(AppError::validation(
            "password",
            &format!("Password must be at least {} characters long", rules.min_length),
        ));
    }

    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    let mut missing = Vec::new();

    if rules.require_lowercase && !has_lowercase {
        missing.push("lowercase letter");
    }

    if rules.require_uppercase && !has_uppercase {
        missing.push("uppercase letter");
    }

    if rules.require_number && !has_digit {
        missing.push("number");
    }

    if rules.require_special && !has_special {
        missing.push("special character");
    }

    if !missing.is_empty() {
        return Err(AppError::validation(
            "password",
            &format!("Password must contain at least one {}", missing.join(", one ")),
        ));
    }

    Ok(())
}

/// Sanitizes a string input by trimming whitespace
pub fn sanitize_string(input: &str) -> String {
    input.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict_rules() -> PasswordConfig {
        PasswordConfig {
            min_length: 10,
            require_uppercase: true,
            require_lowercase: true,
            require_number: true,
            require_special: true,
        }
    }

    #[test]
    fn test_config_based_password_validation() {
        let rules = strict_rules();

        assert!(validate_password("StrongP@ss123", &rules).is_ok());
        assert!(validate_password("Short@1", &rules).is_err());
        assert!(validate_password("weakp@ssword123", &rules).is_err());
        assert!(validate_password("STRONGP@SS123", &rules).is_err());
        assert!(validate_password("StrongPassword@", &rules).is_err());

        match validate_password("StrongPassword123", &rules) {
            Err(AppError::ValidationError(msg)) => assert!(msg.contains("special character")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_relaxed_rules() {
        let rules = PasswordConfig {
            min_length: 4,
            require_uppercase: false,
            require_lowercase: false,
            require_number: false,
            require_special: false,
        };
        assert!(validate_password("abcd", &rules).is_ok());
        assert!(validate_password("    ", &rules).is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email(&normalize_email("  Ada.Lovelace@Example.com ")).is_ok());
        assert!(validate_email("first-last+tag@mail.example.org").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign.example.com").is_err());
        assert!(validate_email("ada@localhost").is_err());
        assert!(validate_email("ada@example.com trailing").is_err());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("Ada").is_ok());
        assert!(validate_name(" ").is_err());
        assert!(validate_name("A").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
    }
}
