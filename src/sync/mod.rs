//! Local-first synchronization engine.
//!
//! Writes apply optimistically to the local cache and are captured in a
//! durable mutation queue; a background dispatcher pushes them to the
//! remote backend, three-way merging divergent updates and escalating
//! overlapping edits to manual resolution. A separate reconciler
//! consumes the backend change feed to keep the cache warm without full
//! refetches.

pub mod feed;
pub mod merge;
pub mod mutation;
pub mod queue;
pub mod reconciler;
pub mod remote;
pub mod store;
#[cfg(test)]
pub mod testbackend;
pub mod writer;

pub use feed::{ChangeEvent, FeedClient, FeedError};
pub use merge::{three_way_merge, MergeOutcome};
pub use mutation::{EntityKind, MutationRecord, MutationStatus, Operation};
pub use queue::{DrainReport, MutationQueue, QueueError, RetryPolicy};
pub use reconciler::{ReconcileError, Reconciler};
pub use remote::{HttpBackend, RemoteBackend, RemoteError};
pub use store::{LocalStore, StoreError};
pub use writer::{OptimisticWriter, WriteError};
