//! Shared handler state.

use crate::config::DaemonConfig;
use lodestar_channel::ChannelService;
use lodestar_crypto::SessionCrypto;
use lodestar_registry::BeaconRegistry;
use lodestar_tasking::TaskQueue;
use std::sync::Arc;

/// Application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub channel: Arc<ChannelService>,
    pub crypto: Arc<SessionCrypto>,
    pub registry: Arc<BeaconRegistry>,
    pub queue: Arc<TaskQueue>,
    pub config: Arc<DaemonConfig>,
}
