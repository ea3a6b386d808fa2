//! Octave Resource Protocol over asynchronous serial links.
//!
//! # Crate Structure
//!
//! - [`frame`]: HDLC-style byte stuffing with CRC-16/CCITT, plus AT command framing
//! - [`protocol`]: packet table, messages and the packet codec
//! - [`client`]: receive pipeline, request operations and file transfer (behind `client` feature)

/// Re-export frame types.
pub mod frame {
    pub use orp_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use orp_protocol::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use orp_client::*;
}
