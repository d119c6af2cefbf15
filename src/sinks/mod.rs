//! Sinks module
//!
//! Destinations for transformed payments.
//!
//! # Components
//!
//! - `dispatch` - Dispatchers adapting a `PaymentMessage` to a queue or SQL sink
//! - `channel` - Bounded in-process queue (both sink and source)
//! - `sqlite` - SQLite statement sink
//! - `memory` - Recording sinks with scripted failures

pub mod channel;
pub mod dispatch;
pub mod memory;
pub mod sqlite;

pub use channel::ChannelQueue;
pub use dispatch::{QueueDispatcher, SqlDispatcher};
pub use memory::{MemoryDispatcher, MemoryQueueSink, MemorySqlSink};
pub use sqlite::SqliteSink;
