//! Filesystem observation: one-shot tree walks and live change notifications.

mod filter;
pub mod fs_watch;
mod tree;

pub use filter::{DEFAULT_SUPPORTED_EXTENSIONS, FileFilter};
pub use fs_watch::{FileWatcher, FsWatchConfig, WatchProvider, WatchSignal, WatchSubscription};
pub use tree::{TreeScanner, TreeWalk};
