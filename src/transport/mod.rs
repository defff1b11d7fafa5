//! Transport boundary.
//!
//! The core never touches bytes. It only needs a way to send a line and get a
//! confirmation, and a way to send a query and read one response line.
//! Implementations decide framing, timeouts and reconnection.

pub mod mock;
pub mod tcp;

pub use mock::{MockTransport, MOCK_IDN};
pub use tcp::TcpTransport;

use anyhow::Result;
use async_trait::async_trait;

/// SCPI transport capability.
///
/// Both methods are called with exclusive use of the transport. The session
/// sequencer guarantees that no two plans or queries interleave.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a command with no response body.
    ///
    /// `Ok(true)` means the transport accepted the line. `Ok(false)` and `Err(_)`
    /// (including timeouts) are both treated as a failed step.
    async fn send(&self, command: &str) -> Result<bool>;

    /// Send a query and return the response line, or `None` if nothing came back.
    async fn query(&self, command: &str) -> Result<Option<String>>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "scpi transport".to_string()
    }
}
