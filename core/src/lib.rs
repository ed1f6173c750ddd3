pub mod audit;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod memory;
pub mod negotiation;
pub mod output;
pub mod protocol;
pub mod session;

// Re-exports for convenience
pub use audit::AuditLog;
pub use config::Settings;
pub use error::{AccordError, Result};
pub use executor::Dispatcher;
pub use memory::Memory;
pub use negotiation::Engine;
pub use protocol::Proposal;
pub use session::SessionController;
