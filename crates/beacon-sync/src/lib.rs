//! beacon-sync: offline action queue with network-aware draining.
//!
//! Mutations made in the field (location pings, incident reports, chat
//! messages) are appended to a durable FIFO queue and replayed against the
//! backend when connectivity allows:
//!
//!   - `state`: load/save the whole queue under one store key
//!   - `connectivity`: online/offline snapshot and transition stream
//!   - `executor`: kind → handler registry, one attempt per call
//!   - `scheduler`: periodic and reconnect-triggered drain passes
//!   - `queue`: `OfflineQueue`, the facade the rest of the app calls
//!
//! Delivery is at-least-once: a crash between a successful remote call and
//! the post-drain persist replays the action on the next drain.

pub mod connectivity;
pub mod events;
pub mod executor;
pub mod queue;
pub mod scheduler;
pub mod state;

pub use connectivity::ConnectivityMonitor;
pub use events::{AbandonReason, DrainReport, QueueEvent};
pub use executor::{handler_fn, ActionHandler, ExecuteError, Executor, ExecutorBuilder, FnHandler};
pub use queue::{OfflineQueue, QueueOptions};
pub use scheduler::DrainTrigger;
pub use state::QueueStore;
