pub mod control_socket;
pub mod http_handler;
pub mod inspector;
pub mod memory_store;

/// Re-export commonly used types from adapters
pub use control_socket::ControlSocket;
pub use http_handler::GatewayHandler;
pub use inspector::Inspector;
pub use memory_store::{MemoryCredentialStore, MemoryLogStore};
