//! # vfsd-client
//! Filesystem operations forwarded to an out-of-process VFS daemon.
//!
//! Application code calls [`DaemonClient`] methods without knowing whether
//! the backing store is local or remote; every primitive becomes one call on
//! a private, per-thread channel to the daemon.
//!
//! ## Layout
//! * **Wire:** [`wire`] holds the call/reply messages and typed arguments,
//!   [`frame`] the length-prefixed stream codecs that carry them.
//! * **Channels:** [`transport`] provides Unix-socket and in-process
//!   channels behind the [`Connector`] trait.
//! * **Calls:** [`connection`] bootstraps the per-thread channels,
//!   [`executor`] runs one call with its timeout and cancellation token.
//! * **Surface:** [`method`] exposes one function per operation; handles and
//!   change monitors live in [`handle`] and [`monitor`].

pub mod bus;
pub mod cancel;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod frame;
pub mod handle;
pub mod info;
pub mod method;
pub mod monitor;
pub mod result;
pub mod traits;
pub mod transport;
pub mod types;
pub mod wire;

pub use cancel::Cancellation;
pub use config::*;
pub use error::*;
pub use executor::CallTimeout;
pub use handle::{DirectoryHandle, FileHandle};
pub use info::*;
pub use method::DaemonClient;
pub use monitor::{MonitorCallback, MonitorEvent, MonitorHandle, MonitorRegistry};
pub use result::ResultCode;
pub use traits::*;
pub use types::*;
