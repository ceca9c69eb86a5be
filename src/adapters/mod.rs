pub mod memory;
pub mod postgres;

pub use memory::{MemoryStateStore, MemoryTransactionRepository};
pub use postgres::PostgresTransactionRepository;
