pub mod memory;
pub mod pool;
pub mod postgres;
pub mod repository;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repository::{TodoRepository, UserRepository};
