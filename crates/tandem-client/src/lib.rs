//! Client side of session synchronization: an optimistically updated
//! session list that is periodically replaced by the server's view, and
//! the scheduler deciding when that happens.

pub mod cache;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod source;

pub use cache::{ClientSessionCache, ReconcileOutcome};
pub use config::ClientConfig;
pub use error::ClientError;
pub use scheduler::{FeedChanges, RefreshScheduler, RefreshTrigger, Selection, SessionChanges};
pub use source::{HttpSource, SessionSource};
