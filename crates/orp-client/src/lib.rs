//! ORP client for serial links.
//!
//! [`OrpClient`] sends requests, responses and sync packets over any
//! `Read + Write` link and runs received bytes through a [`ReceivePipeline`]:
//! deframe, decode, dispatch. Inbound file transfers are stored through a
//! [`FileReceiver`].

pub mod client;
pub mod config;
pub mod error;
pub mod file;
pub mod pipeline;

pub use client::OrpClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use file::{FileReceiver, FileSink};
pub use pipeline::{Dispatch, ReceivePipeline};
