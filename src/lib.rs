//! Sequential scan-and-tag operation queue with optimistic tag statuses.
//!
//! Producers enqueue operations through a [`runtime::handle::SessionHandle`];
//! one dispatcher task per session submits them, one at a time and in FIFO
//! order, to an [`channel::ExecutionChannel`], then merges each settled
//! outcome into the session history.
//!
//! # Examples
//!
//! Driving the session state by hand with [`core::session::SessionState`]:
//! ```
//! use chrono::Utc;
//! use scanqueue::{
//!     core::session::SessionState,
//!     op::OpRequest,
//!     record::ResultRecord,
//!     types::TagStatus,
//! };
//!
//! let mut state = SessionState::new();
//! let op = state
//!     .enqueue(OpRequest::DeleteTag { product_id: "p1".into(), tag: "sale".into() })
//!     .expect("enqueue");
//! assert_eq!(state.tags().get("p1", "sale"), Some(TagStatus::Deleted));
//!
//! let head = state.begin_next().expect("head");
//! assert_eq!(head.seq, op.seq);
//! state
//!     .settle(head.seq, ResultRecord::remote_error(head.seq, "offline", None, Utc::now()))
//!     .expect("settle");
//! assert_eq!(state.history().len(), 1);
//! ```
//!
//! Running a session over an in-memory catalog:
//! ```no_run
//! use std::sync::Arc;
//!
//! use scanqueue::{
//!     catalog::memory::InMemoryCatalog,
//!     channel::fetcher::FetcherChannel,
//!     config::SessionConfig,
//!     runtime::handle::spawn_session,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let catalog = Arc::new(InMemoryCatalog::new(Vec::new()));
//! let handle = spawn_session(FetcherChannel::new(catalog), None, SessionConfig::default());
//! handle.search_and_tag("0123456789", Some("sale")).expect("enqueue");
//! handle.wait_idle().await;
//! assert_eq!(handle.history().len(), 1);
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Remote catalog abstraction and in-memory implementation.
pub mod catalog;
/// Execution channel trait, fetcher, and operation executor.
pub mod channel;
/// Session configuration.
pub mod config;
/// Queue, history, tag statuses, and the session aggregate.
pub mod core;
/// Expiration bucketing.
pub mod expiration;
/// Operation model and journal wrappers.
pub mod op;
/// Journal abstraction and SQLite implementation.
pub mod persist;
/// Product and variant snapshots.
pub mod product;
/// Settled outcome records.
pub mod record;
/// Dispatcher runtime, handle, and events.
pub mod runtime;
/// Shared primitive types and enums.
pub mod types;
