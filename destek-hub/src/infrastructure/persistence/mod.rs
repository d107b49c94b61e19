pub mod memory_repository;
pub mod postgres_repository;

pub use memory_repository::MemoryThreadRepository;
pub use postgres_repository::PostgresThreadRepository;
