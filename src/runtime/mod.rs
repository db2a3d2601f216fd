//! Dispatcher task, producer handle, and event stream.

/// Event stream types emitted by the dispatcher.
pub mod events;
/// Session handle and dispatcher loop implementation.
pub mod handle;
