pub mod query;
pub mod sqlite;
pub mod store;
pub mod surreal;
pub mod timestamp;

use std::sync::Arc;

use app_config::{DatabaseConfig, StoreBackend};
use app_error::AppResult;

pub use query::{Condition, MovieQuery, Pagination, SortField, SortOrder, SortSpec};
pub use sqlite::SqliteStore;
pub use store::{ActivityStore, ChatStore, MovieStore, OrderStore, ReviewStore, Store, UserStore};
pub use surreal::SurrealStore;

/// Build the store selected by `database.backend`.
pub async fn connect_store(config: &DatabaseConfig) -> AppResult<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Surreal => {
            let store = SurrealStore::connect(&config.surreal).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.sqlite.path)?;
            Ok(Arc::new(store))
        }
    }
}
