//! Input checks for catalog writes: movies, reviews and checkout carts.

use app_error::{AppError, AppResult};
use app_models::{MoviePatch, NewMovie, OrderItem};

const MIN_RELEASE_YEAR: i32 = 1888;
const MAX_RELEASE_YEAR: i32 = 2100;
const MAX_REVIEW_LENGTH: usize = 5000;
pub const MAX_QUANTITY: i64 = 1000;
pub const MAX_ITEM_PRICE: f64 = 10_000.0;

fn check_title(title: &str) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::validation("title", "Title cannot be empty"));
    }
    Ok(())
}

fn check_year(year: i32) -> AppResult<()> {
    if !(MIN_RELEASE_YEAR..=MAX_RELEASE_YEAR).contains(&year) {
        return Err(AppError::validation(
            "release_year",
            &format!(
                "Release year must be between {} and {}",
                MIN_RELEASE_YEAR, MAX_RELEASE_YEAR
            ),
        ));
    }
    Ok(())
}

fn check_price(field: &str, price: f64) -> AppResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::validation(field, "Price must be zero or more"));
    }
    Ok(())
}

pub fn validate_movie(movie: &NewMovie) -> AppResult<()> {
    check_title(&movie.title)?;
    check_year(movie.release_year)?;
    check_price("price", movie.price)
}

pub fn validate_movie_patch(patch: &MoviePatch) -> AppResult<()> {
    if patch.is_empty() {
        return Err(AppError::InputError("No fields to update".to_string()));
    }
    if let Some(title) = &patch.title {
        check_title(title)?;
    }
    if let Some(year) = patch.release_year {
        check_year(year)?;
    }
    if let Some(price) = patch.price {
        check_price("price", price)?;
    }
    Ok(())
}

pub fn validate_review(content: &str) -> AppResult<()> {
    if content.trim().is_empty() {
        return Err(AppError::validation("content", "Review cannot be empty"));
    }
    if content.chars().count() > MAX_REVIEW_LENGTH {
        return Err(AppError::validation(
            "content",
            &format!("Review cannot exceed {} characters", MAX_REVIEW_LENGTH),
        ));
    }
    Ok(())
}

/// Rejects empty carts and lines whose quantity or price falls outside the
/// accepted range.
pub fn validate_cart(items: &[OrderItem]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::ValidationError("Cart is empty".to_string()));
    }

    for item in items {
        if item.id.trim().is_empty() {
            return Err(AppError::validation("movies.id", "Every item needs a movie id"));
        }
        if !(1..=MAX_QUANTITY).contains(&item.quantity) {
            return Err(AppError::validation(
                "movies.quantity",
                &format!(
                    "Quantity for '{}' must be between 1 and {}",
                    item.title, MAX_QUANTITY
                ),
            ));
        }
        check_price("movies.price", item.price)?;
        if item.price > MAX_ITEM_PRICE {
            return Err(AppError::validation(
                "movies.price",
                &format!("Price cannot exceed {}", MAX_ITEM_PRICE),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie() -> NewMovie {
        NewMovie {
            title: "Alien".into(),
            description: String::new(),
            release_year: 1979,
            genres: vec!["Horror".into()],
            country: "UK".into(),
            price: 9.99,
            in_stock: true,
            image: String::new(),
        }
    }

    fn item(quantity: i64, price: f64) -> OrderItem {
        OrderItem {
            id: "m1".into(),
            title: "Alien".into(),
            price,
            image: String::new(),
            quantity,
        }
    }

    #[test]
    fn test_movie_rules() {
        assert!(validate_movie(&movie()).is_ok());
        assert!(validate_movie(&NewMovie { title: "  ".into(), ..movie() }).is_err());
        assert!(validate_movie(&NewMovie { release_year: 1500, ..movie() }).is_err());
        assert!(validate_movie(&NewMovie { price: -1.0, ..movie() }).is_err());
        assert!(validate_movie(&NewMovie { price: f64::NAN, ..movie() }).is_err());
    }

    #[test]
    fn test_patch_rules() {
        assert!(matches!(
            validate_movie_patch(&MoviePatch::default()),
            Err(AppError::InputError(_))
        ));
        let patch = MoviePatch {
            price: Some(4.5),
            ..Default::default()
        };
        assert!(validate_movie_patch(&patch).is_ok());
        let patch = MoviePatch {
            title: Some(String::new()),
            ..Default::default()
        };
        assert!(validate_movie_patch(&patch).is_err());
    }

    #[test]
    fn test_cart_rules() {
        match validate_cart(&[]) {
            Err(AppError::ValidationError(msg)) => assert_eq!(msg, "Cart is empty"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(validate_cart(&[item(2, 5.0), item(1, 0.0)]).is_ok());
        assert!(validate_cart(&[item(0, 5.0)]).is_err());
        assert!(validate_cart(&[item(1, -0.5)]).is_err());
    }

    #[test]
    fn test_cart_upper_bounds() {
        assert!(validate_cart(&[item(MAX_QUANTITY, MAX_ITEM_PRICE)]).is_ok());
        match validate_cart(&[item(i64::MAX, 1.0)]) {
            Err(AppError::ValidationError(msg)) => assert!(msg.contains("movies.quantity")),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(validate_cart(&[item(MAX_QUANTITY + 1, 1.0)]).is_err());
        match validate_cart(&[item(1, MAX_ITEM_PRICE + 0.01)]) {
            Err(AppError::ValidationError(msg)) => assert!(msg.contains("movies.price")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_review_rules() {
        assert!(validate_review("Great film").is_ok());
        assert!(validate_review("   ").is_err());
        assert!(validate_review(&"x".repeat(MAX_REVIEW_LENGTH + 1)).is_err());
    }
}
