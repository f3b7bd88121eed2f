//! Concrete channels to the daemon.

pub mod memory;
#[cfg(unix)]
pub mod unix;
