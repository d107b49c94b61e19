pub mod commands;
pub mod handlers;
pub mod queries;
pub mod services;
