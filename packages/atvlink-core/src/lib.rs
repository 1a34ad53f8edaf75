//! ATV Link Core - reverse-HTTP control channel for AirPlay-style receivers.
//!
//! The receiver accepts an inbound TCP connection on its control port. The
//! controller registers with `POST /reverse` (`Upgrade: PTTH/1.0`), then keeps
//! issuing HTTP-style commands such as `/play` over that same connection.
//!
//! # Architecture
//!
//! - [`codec`]: Request encoding and line-oriented response decoding
//! - [`link`]: The [`Link`] façade and its single socket-owning dispatcher
//! - [`keepalive`]: Periodic no-op sources injected into the dispatcher
//! - [`protocol_constants`]: Endpoint paths, header tokens and defaults
//! - [`error`]: Centralized error types
//!
//! # Example
//!
//! ```no_run
//! use atvlink_core::{Link, LinkConfig};
//!
//! # async fn run() -> atvlink_core::LinkResult<()> {
//! let link = Link::connect("apple-tv.local:7000", &LinkConfig::default()).await?;
//! link.play("http://192.168.1.20:8080/atv.mp4").await?;
//! link.idle().await?;
//! link.close().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod keepalive;
pub mod link;
pub mod protocol_constants;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-export commonly used types at the crate root
pub use codec::Command;
pub use error::{LinkError, LinkResult};
pub use keepalive::{IntervalKeepAlive, KeepAliveSource, NoKeepAlive};
pub use link::{Link, LinkConfig, LinkStatus};
