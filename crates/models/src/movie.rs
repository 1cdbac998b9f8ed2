use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::new_id;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Movie {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub release_year: i32,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default)]
    pub image: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_in_stock() -> bool {
    true
}

/// Body of `POST /movies`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NewMovie {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub release_year: i32,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default)]
    pub image: String,
}

/// Partial update for `PUT /movies/{id}`; absent fields are left unchanged.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct MoviePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub release_year: Option<i32>,
    pub genres: Option<Vec<String>>,
    pub country: Option<String>,
    pub price: Option<f64>,
    pub in_stock: Option<bool>,
    pub image: Option<String>,
}

impl Movie {
    pub fn new(input: NewMovie) -> Self {
        Self {
            id: new_id(),
            title: input.title,
            description: input.description,
            release_year: input.release_year,
            genres: input.genres,
            country: input.country,
            price: input.price,
            in_stock: input.in_stock,
            image: input.image,
            created_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, patch: MoviePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(release_year) = patch.release_year {
            self.release_year = release_year;
        }
        if let Some(genres) = patch.genres {
            self.genres = genres;
        }
        if let Some(country) = patch.country {
            self.country = country;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(in_stock) = patch.in_stock {
            self.in_stock = in_stock;
        }
        if let Some(image) = patch.image {
            self.image = image;
        }
    }
}

impl MoviePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.release_year.is_none()
            && self.genres.is_none()
            && self.country.is_none()
            && self.price.is_none()
            && self.in_stock.is_none()
            && self.image.is_none()
    }
}
