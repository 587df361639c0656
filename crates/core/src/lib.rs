// txflow Core - Domain Logic, Ports & Transaction Coordination
// NO infrastructure dependencies (hexagonal architecture)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{AdapterRegistry, TransactionManager, UndoEngine, UnitOfWork};
pub use error::{Result, TxError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
