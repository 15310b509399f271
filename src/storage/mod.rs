mod articles;
mod handle;
mod schema;
mod types;

pub use handle::StoreHandle;
pub use schema::{Database, SCHEMA_VERSION};
pub use types::{Article, DatabaseError, SaveOutcome};
