pub mod media;
pub mod persistence;
pub mod rate_limit;
