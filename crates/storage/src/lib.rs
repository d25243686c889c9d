pub mod local_cache;
pub mod repository;
pub mod sqlite;
