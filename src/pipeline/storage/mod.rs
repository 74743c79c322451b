// Persistence for transactions, sync logs and footfall

mod in_memory;
mod sqlite;
mod traits;

pub use in_memory::InMemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{ReplaceOutcome, Storage};
