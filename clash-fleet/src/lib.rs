use std::io;

use thiserror::Error;

pub mod app;
mod common;
pub mod config;
pub mod proxy;
pub mod session;

pub use app::{
    logging::{EventCollector, LogEvent, setup_logging},
    provider_manager::ProviderManager,
    remote_content_manager::{
        healthcheck::HealthCheck,
        providers::{
            Provider, ProviderError, ProviderState, ProviderType, ProviderVehicle,
            ProviderVehicleType, ThreadSafeProviderVehicle, file_vehicle,
            http_vehicle,
            proxy_provider::{
                CompatibleProvider, ProxyProvider, ProxySetProvider,
                ThreadSafeProxyProvider,
            },
        },
    },
};
pub use config::def::{Config, LogLevel};
pub use proxy::{AnyProxy, OutboundHandler, Proxy, ProxyError, converters::parse_proxy};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn initialize() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_test_writer()
                .try_init();
        });
    }
}
