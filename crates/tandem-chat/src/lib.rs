//! Chat-session synchronization engine: conversation identity, the message
//! log, read cursors, batched unread aggregation and session-list assembly.
//!
//! Everything here is synchronous and talks to storage only through the
//! [`ChatStore`] and [`Directory`] traits. HTTP handlers run it on the
//! blocking pool.

pub mod assembler;
pub mod error;
pub mod feed;
pub mod identity;
pub mod message_log;
pub mod read_cursor;
pub mod service;
pub mod store;
pub mod unread;

pub use assembler::ChatListAssembler;
pub use error::ChatError;
pub use feed::SessionFeed;
pub use identity::{Conversation, derive_id};
pub use message_log::MessageLog;
pub use read_cursor::ReadCursor;
pub use service::ChatService;
pub use store::{ChatStore, Directory};
pub use unread::UnreadAggregator;
