//! Application configuration options

use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::poller;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub lifecycle: LifecycleOptions,

    /// Where state, keys and the default workspace live
    pub layout: StorageLayout,

    /// Loaded settings file
    pub settings: Settings,

    /// Serve the local HTTP API
    pub enable_server: bool,

    /// Run the auto-deploy poller
    pub enable_poller: bool,

    pub server: ServerOptions,

    pub poller: poller::Options,
}

impl AppOptions {
    pub fn from_settings(layout: StorageLayout, settings: Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            enable_server: true,
            enable_poller: settings.poller.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            poller: poller::Options {
                interval: Duration::from_secs(settings.poller.interval_secs.max(1)),
                ..poller::Options::default()
            },
            layout,
            settings,
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(StorageLayout::default(), Settings::default())
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8420,
        }
    }
}
