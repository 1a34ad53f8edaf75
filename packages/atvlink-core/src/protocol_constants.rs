//! Fixed protocol constants that should NOT be changed.
//!
//! These values are what the receiver expects on its control port. Changing
//! them breaks the reverse handshake or the command endpoints.

// ─────────────────────────────────────────────────────────────────────────────
// Reverse Handshake
// ─────────────────────────────────────────────────────────────────────────────

/// Registration path for the reverse-HTTP upgrade request.
pub const REVERSE_PATH: &str = "/reverse";

/// Protocol token sent in the `Upgrade` header of the handshake.
pub const UPGRADE_PROTOCOL: &str = "PTTH/1.0";

/// Status line prefix the receiver answers a successful upgrade with.
pub const SWITCHING_PROTOCOLS_PREFIX: &str = "HTTP/1.1 101";

/// Status line prefix of every ordinary successful response.
pub const SUCCESS_PREFIX: &str = "HTTP/1.1 2";

// ─────────────────────────────────────────────────────────────────────────────
// Command Endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// Content-free endpoint hit by the keep-alive source.
pub const NOOP_PATH: &str = "/noop";

/// Playback start endpoint.
pub const PLAY_PATH: &str = "/play";

// ─────────────────────────────────────────────────────────────────────────────
// Request Framing
// ─────────────────────────────────────────────────────────────────────────────

/// Product token appended to every request as `User-Agent`.
pub const USER_AGENT: &str = "MediaControl/1.0";

/// Headers the codec always writes itself; callers may not supply them.
pub const RESERVED_HEADERS: [&str; 2] = ["Content-Length", "User-Agent"];

// ─────────────────────────────────────────────────────────────────────────────
// Link Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between keep-alive no-ops (seconds).
///
/// The receiver drops a silent control connection after an internal timeout;
/// 10 seconds stays comfortably under it.
pub const KEEPALIVE_INTERVAL_SECS: u64 = 10;

/// Longest response line the codec accepts (bytes, excluding the terminator).
pub const MAX_LINE_LEN: usize = 4096;

/// Smallest line limit worth configuring. Every status line the receiver
/// sends, `HTTP/1.1 101 Switching Protocols` included, fits in it.
pub const MIN_LINE_LEN: usize = 64;

/// Capacity of the dispatcher's request queue.
pub const REQUEST_QUEUE_CAPACITY: usize = 32;

/// Default control port of the receiver.
pub const DEFAULT_CONTROL_PORT: u16 = 7000;
