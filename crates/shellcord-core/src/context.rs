//! Dependencies shared by every session task

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::connection::Connector;
use crate::display::DisplaySurface;
use crate::hosts::HostDirectory;
use crate::session_manager::SessionRegistry;
use crate::store::SessionStore;

/// Handles a session task needs to do its work
#[derive(Clone)]
pub struct EngineContext {
    /// Timing and size limits
    pub config: Arc<EngineConfig>,
    /// Opens remote connections
    pub connector: Arc<dyn Connector>,
    /// Resolves host aliases
    pub hosts: Arc<dyn HostDirectory>,
    /// Durable terminal rows
    pub store: Arc<dyn SessionStore>,
    /// Where output is rendered
    pub display: Arc<dyn DisplaySurface>,
    /// Live sessions
    pub registry: Arc<SessionRegistry>,
}
