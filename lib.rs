pub mod catalog;
pub mod config;
pub mod constraint;
pub mod db;
pub mod error;
pub mod lexer;
pub mod models;
pub mod persist;
pub mod query;
pub mod schema;
pub mod session;
pub mod shuffle;

pub use catalog::{Catalog, CatalogData, CatalogStore, Snapshot};
pub use config::CatalogConfig;
pub use constraint::Constraint;
pub use error::{Error, Result};
pub use models::{Media, MediaType, MediaUpdate, Metadata, NewMedia, Tombstone};
pub use persist::PersistentCatalog;
pub use session::{SessionState, ViewState};
