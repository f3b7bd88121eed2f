//! The daemon's result-code space.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A result code as carried in the leading field of every reply.
///
/// Open newtype: codes this client does not know still pass through
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultCode(pub i32);

macro_rules! result_codes {
    ($($name:ident = $value:literal => $text:literal,)*) => {
        impl ResultCode {
            $(pub const $name: ResultCode = ResultCode($value);)*

            /// Human-readable description of the code.
            pub fn description(self) -> &'static str {
                match self.0 {
                    $($value => $text,)*
                    _ => "Unknown error",
                }
            }
        }
    };
}

result_codes! {
    OK = 0 => "No error",
    NOT_FOUND = 1 => "File not found",
    GENERIC = 2 => "Generic error",
    INTERNAL = 3 => "Internal error",
    BAD_PARAMETERS = 4 => "Invalid parameters",
    NOT_SUPPORTED = 5 => "Unsupported operation",
    IO = 6 => "I/O error",
    CORRUPTED_DATA = 7 => "Data corrupted",
    WRONG_FORMAT = 8 => "Format not valid",
    BAD_FILE = 9 => "Bad file handle",
    TOO_BIG = 10 => "File too big",
    NO_SPACE = 11 => "No space left on device",
    READ_ONLY = 12 => "Read-only medium",
    INVALID_URI = 13 => "Invalid URI",
    NOT_OPEN = 14 => "File not open",
    INVALID_OPEN_MODE = 15 => "Open mode not valid",
    ACCESS_DENIED = 16 => "Access denied",
    TOO_MANY_OPEN_FILES = 17 => "Too many open files",
    EOF = 18 => "End of file",
    NOT_A_DIRECTORY = 19 => "Not a directory",
    IN_PROGRESS = 20 => "Operation in progress",
    INTERRUPTED = 21 => "Operation interrupted",
    FILE_EXISTS = 22 => "File exists",
    LOOP = 23 => "Looping links encountered",
    NOT_PERMITTED = 24 => "Operation not permitted",
    IS_DIRECTORY = 25 => "Is a directory",
    NO_MEMORY = 26 => "Not enough memory",
    HOST_NOT_FOUND = 27 => "Host not found",
    INVALID_HOST_NAME = 28 => "Host name not valid",
    HOST_HAS_NO_ADDRESS = 29 => "Host has no address",
    LOGIN_FAILED = 30 => "Login failed",
    CANCELLED = 31 => "Operation cancelled",
    DIRECTORY_BUSY = 32 => "Directory busy",
    DIRECTORY_NOT_EMPTY = 33 => "Directory not empty",
    TOO_MANY_LINKS = 34 => "Too many links",
    READ_ONLY_FILE_SYSTEM = 35 => "Read only file system",
    NOT_SAME_FILE_SYSTEM = 36 => "Not on the same file system",
    NAME_TOO_LONG = 37 => "Name too long",
    SERVICE_NOT_AVAILABLE = 38 => "Service not available",
    SERVICE_OBSOLETE = 39 => "Request obsoletes service's data",
    PROTOCOL_ERROR = 40 => "Protocol error",
    NO_MASTER_BROWSER = 41 => "Could not find master browser",
    NO_DEFAULT = 42 => "No default action associated",
    NO_HANDLER = 43 => "No handler for URL scheme",
    PARSE = 44 => "Error parsing command line",
    LAUNCH = 45 => "Error launching command",
    TIMEOUT = 46 => "Timeout reached",
    NSS_INIT_FAILED = 47 => "NSS not initialized",
    NAME_RESOLUTION_FAILED = 48 => "Name resolution failed",
    DEPRECATED_FUNCTION = 49 => "Deprecated function",
    INVALID_FILENAME = 50 => "Invalid filename",
    NOT_A_SYMBOLIC_LINK = 51 => "Not a symbolic link",
}

impl ResultCode {
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl From<i32> for ResultCode {
    fn from(v: i32) -> Self { Self(v) }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.0)
    }
}
