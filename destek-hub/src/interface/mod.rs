pub mod http;
pub mod state;
pub mod ws;

pub use state::AppState;
