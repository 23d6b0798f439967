//! Config file watching.
//!
//! ```text
//! NotifyFileWatcher ──watch(path)──> NotifyWatchHandle
//!   notify::RecommendedWatcher on the parent dir
//!   filter to the one file name
//!   Debouncer (change/create), deletes sent immediately
//!         |
//!         v
//!   mpsc::UnboundedSender<WatchEvent>
//! ```
//!
//! The supervisor holds at most one [`WatchBinding`] and always disposes it
//! before binding a new path.

mod debouncer;
mod error;
mod handle;
mod notify_watcher;

pub use debouncer::Debouncer;
pub use error::WatchError;
pub use handle::{FileWatcher, WatchBinding, WatchEvent, WatchEventKind, WatchHandle};
pub use notify_watcher::NotifyFileWatcher;
