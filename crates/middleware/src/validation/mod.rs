pub mod catalog;
pub mod user_account;

pub use catalog::{validate_cart, validate_movie, validate_movie_patch, validate_review};
pub use user_account::{
    normalize_email, sanitize_string, validate_email, validate_name, validate_password,
};
