pub mod chat_domain_service;

pub use chat_domain_service::{ChatDomainService, DomainLimits};
