//! Shared handles every background timer service needs.

use std::sync::Arc;

use ttt_room::{RoomCoreConfig, RoomRegistry};
use ttt_transport::Broadcaster;

/// Cheap to clone — every field is already an `Arc`. Passed by value into
/// each spawned timer task.
#[derive(Clone)]
pub struct Context {
    pub registry: Arc<RoomRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub config: Arc<RoomCoreConfig>,
}

impl Context {
    pub fn new(
        registry: Arc<RoomRegistry>,
        broadcaster: Arc<Broadcaster>,
        config: Arc<RoomCoreConfig>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            config,
        }
    }
}
