pub mod graceful_shutdown;
pub mod host;

pub use graceful_shutdown::GracefulShutdown;
pub use host::normalize_hostname;
