//! Common orchestration abstractions for SONiC.
//!
//! This crate provides the core traits and types used by the configuration
//! manager daemons in the SONiC control plane:
//!
//! - [`Orch`]: Base trait for agents driven by a task queue
//! - [`Consumer`]: Per-table queue of pending change records
//! - [`TaskStatus`]: Result type for processing a single record
//! - [`redis_backend`]: Redis table access and keyspace-notification feed
//!
//! # Architecture
//!
//! The orchestration architecture follows an event-driven model:
//!
//! 1. Configuration changes are written to Redis (CONFIG_DB, STATE_DB)
//! 2. Change records are queued per table in a [`Consumer`]
//! 3. The daemon event loop calls [`Orch::do_task`] on notification and on
//!    a fixed timer
//! 4. Records whose dependencies are not met stay queued for the next pass
//!
//! # Example
//!
//! ```ignore
//! use sonic_orch_common::{Consumer, Orch, TaskStatus};
//!
//! async fn do_task(&mut self) {
//!     let mut deferred = Vec::new();
//!     for entry in self.consumer.drain() {
//!         match self.process_entry(&entry).await {
//!             Ok(TaskStatus::NeedRetry) => deferred.push(entry),
//!             Ok(_) => {}
//!             Err(e) => tracing::error!("Failed: {}", e),
//!         }
//!     }
//!     self.consumer.defer(deferred);
//! }
//! ```

mod consumer;
mod orch;
mod task;

#[cfg(feature = "redis")]
pub mod redis_backend;

pub use consumer::{Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Operation};
pub use orch::Orch;
pub use task::TaskStatus;

#[cfg(feature = "redis")]
pub use redis_backend::{RedisBackendError, RedisConfig, RedisDatabase, RedisDb, TableChange};
