pub mod config;
pub mod error;
pub mod key;
pub mod model;
pub mod registry;
pub mod retry;
pub mod store;
pub mod time;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use key::KeyCodec;
pub use model::{Session, SessionToken};
pub use registry::{SessionRegistry, SweepEntry, SweepOutcome};
pub use retry::RetryPolicy;
pub use store::{MemorySessionStore, SessionStore, SqliteSessionStore};
