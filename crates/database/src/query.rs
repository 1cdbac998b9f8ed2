//! Backend-neutral movie search: parses query-string pairs into conditions,
//! a sort order and pagination. Each store renders the conditions
//! into its own query language with bound parameters.

use serde_json::{Map, Value, json};

use app_error::{AppError, AppResult};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;
/// Keeps `skip` well inside `i64` for the SQL backends.
pub const MAX_PAGE: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Movie must carry every listed genre.
    AllGenres(Vec<String>),
    /// Movie genres contain this one.
    HasGenre(String),
    CountryIn(Vec<String>),
    YearMin(i32),
    YearMax(i32),
    /// Lowercased title fragment.
    TitleContains(String),
    PriceMin(f64),
    PriceMax(f64),
    InStock(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    ReleaseYear,
    Price,
    Country,
    CreatedAt,
}

impl SortField {
    pub const ALLOWED: [&'static str; 5] =
        ["title", "release_year", "price", "country", "created_at"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "title" => Some(Self::Title),
            "release_year" => Some(Self::ReleaseYear),
            "price" => Some(Self::Price),
            "country" => Some(Self::Country),
            "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }

    /// Field name, identical in both stores.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::ReleaseYear => "release_year",
            Self::Price => "price",
            Self::Country => "country",
            Self::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
    /// Whether the client asked for a sort field.
    pub explicit: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::Title,
            order: SortOrder::Asc,
            explicit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieQuery {
    pub conditions: Vec<Condition>,
    pub sort: SortSpec,
    pub pagination: Pagination,
}

impl MovieQuery {
    /// Build a query from raw query-string pairs. Repeated keys are allowed.
    pub fn from_pairs(pairs: &[(String, String)]) -> AppResult<Self> {
        let mut genres = Vec::new();
        let mut countries = Vec::new();
        let mut query = MovieQuery::default();
        let mut conditions = Vec::new();

        for (key, value) in pairs {
            match key.as_str() {
                "genres" => genres.extend(split_list(value)),
                "country" => countries.extend(split_list(value)),
                _ => {}
            }
        }

        if !genres.is_empty() {
            conditions.push(Condition::AllGenres(genres));
        }
        if !countries.is_empty() {
            conditions.push(Condition::CountryIn(countries));
        }
        if let Some(year) = last(pairs, "yearMin").and_then(|v| v.parse().ok()) {
            conditions.push(Condition::YearMin(year));
        }
        if let Some(year) = last(pairs, "yearMax").and_then(|v| v.parse().ok()) {
            conditions.push(Condition::YearMax(year));
        }
        if let Some(q) = last(pairs, "q").filter(|q| !q.is_empty()) {
            conditions.push(Condition::TitleContains(q.to_lowercase()));
        }
        if let Some(category) = last(pairs, "category").filter(|c| !c.is_empty()) {
            conditions.push(Condition::HasGenre(category.to_string()));
        }
        if let Some(price) = last(pairs, "minPrice").and_then(parse_price) {
            conditions.push(Condition::PriceMin(price));
        }
        if let Some(price) = last(pairs, "maxPrice").and_then(parse_price) {
            conditions.push(Condition::PriceMax(price));
        }
        if let Some(available) = last(pairs, "availability").and_then(parse_bool) {
            conditions.push(Condition::InStock(available));
        }
        query.conditions = conditions;

        if let Some(sort) = last(pairs, "sort").filter(|s| !s.is_empty()) {
            let field = SortField::parse(sort).ok_or_else(|| {
                AppError::validation(
                    "sort",
                    &format!("must be one of {}", SortField::ALLOWED.join(", ")),
                )
            })?;
            query.sort.field = field;
            query.sort.explicit = true;
        }
        if last(pairs, "order") == Some("desc") {
            query.sort.order = SortOrder::Desc;
        }

        query.pagination.page = last(pairs, "page")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|p| *p >= 1)
            .map(|p| p.min(MAX_PAGE))
            .unwrap_or(DEFAULT_PAGE);
        query.pagination.limit = last(pairs, "limit")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|l| *l >= 1)
            .map(|l| l.min(MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);

        Ok(query)
    }

    pub fn has_filters(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn status(&self) -> &'static str {
        match (self.has_filters(), self.sort.explicit) {
            (true, true) => "filtering and sorting",
            (true, false) => "filtering",
            (false, true) => "sorting",
            (false, false) => "none",
        }
    }

    /// The filters that were applied, keyed by their query-string name.
    pub fn filters(&self) -> Value {
        let mut map = Map::new();
        for condition in &self.conditions {
            let (key, value) = match condition {
                Condition::AllGenres(g) => ("genres", json!(g)),
                Condition::HasGenre(g) => ("category", json!(g)),
                Condition::CountryIn(c) => ("country", json!(c)),
                Condition::YearMin(y) => ("yearMin", json!(y)),
                Condition::YearMax(y) => ("yearMax", json!(y)),
                Condition::TitleContains(q) => ("q", json!(q)),
                Condition::PriceMin(p) => ("minPrice", json!(p)),
                Condition::PriceMax(p) => ("maxPrice", json!(p)),
                Condition::InStock(a) => ("availability", json!(a)),
            };
            map.insert(key.to_string(), value);
        }
        Value::Object(map)
    }
}

fn last<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim())
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn parse_price(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|p| p.is_finite())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
