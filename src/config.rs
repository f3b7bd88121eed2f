use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::{Codec, FrameConfig};

/// Reply deadline for ordinary operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Open and Close may block on slow media (mounting, spinning up drives).
pub const LONG_TIMEOUT: Duration = Duration::from_secs(5 * 60 * 60);

pub const SOCKET_NAME: &str = "vfs-daemon.sock";

pub const ENV_SOCKET: &str = "VFSD_SOCKET";
pub const ENV_TIMEOUT_MS: &str = "VFSD_TIMEOUT_MS";
pub const ENV_LONG_TIMEOUT_MS: &str = "VFSD_LONG_TIMEOUT_MS";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The daemon's shared endpoint.
    pub socket_path: PathBuf,
    pub default_timeout: Duration,
    pub long_timeout: Duration,
    pub bootstrap_timeout: Duration,
    pub frame: FrameConfig,
    pub codec: Codec,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self {
            socket_path: runtime_dir.join(SOCKET_NAME),
            default_timeout: DEFAULT_TIMEOUT,
            long_timeout: LONG_TIMEOUT,
            bootstrap_timeout: DEFAULT_TIMEOUT,
            frame: FrameConfig::default(),
            codec: Codec::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `VFSD_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_SOCKET) {
            self.socket_path = PathBuf::from(path);
        }
        if let Some(t) = millis(&lookup, ENV_TIMEOUT_MS) {
            self.default_timeout = t;
            self.bootstrap_timeout = t;
        }
        if let Some(t) = millis(&lookup, ENV_LONG_TIMEOUT_MS) {
            self.long_timeout = t;
        }
        self
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            warn!(key, value = %raw, "ignoring invalid timeout");
            None
        }
    }
}
