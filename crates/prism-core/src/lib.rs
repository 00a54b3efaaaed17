pub mod config;
pub mod error;
pub mod schema;
pub mod status;
pub mod types;

pub use config::PrismConfig;
pub use error::{PrismError, Result};
pub use schema::SchemaVocabulary;
pub use status::StoreStatus;
pub use types::*;
