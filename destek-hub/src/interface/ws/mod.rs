pub mod socket;

pub use socket::ws_handler;
