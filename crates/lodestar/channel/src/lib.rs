//! Lodestar channel protocol.
//!
//! The composition root for beacon traffic. For each inbound request it
//! invokes the crypto engine to authenticate and decrypt, the registry to
//! refresh liveness, the queue to record results and fetch the next
//! instruction, and the crypto engine again to seal the reply. It holds no
//! state of its own.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

mod error;
mod service;

pub use error::{ChannelError, ChannelResult};
pub use service::ChannelService;
