pub mod presence_tracker;
pub mod relay_service;
pub mod sync_service;

pub use presence_tracker::PresenceTracker;
pub use relay_service::RelayService;
pub use sync_service::SyncService;
