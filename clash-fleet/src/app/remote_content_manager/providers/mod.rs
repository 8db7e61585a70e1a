use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    io,
    sync::Arc,
};

use async_trait::async_trait;
use erased_serde::Serialize;

use crate::proxy::ProxyError;

pub mod fetcher;
pub mod file_vehicle;
pub mod http_vehicle;
pub mod proxy_provider;

#[cfg(test)]
use mockall::automock;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ProviderVehicleType {
    File,
    Http,
    Compatible,
}

impl Display for ProviderVehicleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderVehicleType::File => write!(f, "File"),
            ProviderVehicleType::Http => write!(f, "HTTP"),
            ProviderVehicleType::Compatible => write!(f, "Compatible"),
        }
    }
}

pub type ThreadSafeProviderVehicle = Arc<dyn ProviderVehicle + Send + Sync>;

/// Where the raw bytes of a provider come from.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProviderVehicle {
    async fn read(&self) -> io::Result<Vec<u8>>;
    /// the local cache path, for file vehicles the source itself
    fn path(&self) -> &str;
    fn typ(&self) -> ProviderVehicleType;
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ProviderType {
    Proxy,
    Rule,
}

impl Display for ProviderType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Proxy => write!(f, "Proxy"),
            ProviderType::Rule => write!(f, "Rule"),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum ProviderState {
    #[default]
    Uninitialized,
    Active,
    Destroyed,
}

impl Display for ProviderState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderState::Uninitialized => write!(f, "Uninitialized"),
            ProviderState::Active => write!(f, "Active"),
            ProviderState::Destroyed => write!(f, "Destroyed"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("fetch error: {0}")]
    Fetch(#[source] io::Error),
    #[error("invalid provider content: {0}")]
    Format(String),
    #[error("file doesn't have any valid proxy")]
    Empty,
    #[error("proxy {index} error: {source}")]
    Entry {
        index: usize,
        #[source]
        source: ProxyError,
    },
    #[error("persist error: {0}")]
    Persist(#[source] io::Error),
    #[error("invalid provider config: {0}")]
    Config(String),
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

/// either Proxy or Rule provider
#[async_trait]
pub trait Provider {
    fn name(&self) -> &str;
    fn vehicle_type(&self) -> ProviderVehicleType;
    fn typ(&self) -> ProviderType;
    async fn state(&self) -> ProviderState;

    /// loads the initial content and starts background refreshing
    async fn initialize(&self) -> Result<(), ProviderError>;
    /// re-applies the current content, nothing to do for proxy providers
    async fn reload(&self) -> Result<(), ProviderError>;
    /// fetches right now instead of waiting for the next tick
    async fn update(&self) -> Result<(), ProviderError>;
    /// stops every background task, calling it again is a no-op
    async fn destroy(&self);

    async fn as_map(&self) -> HashMap<String, Box<dyn Serialize + Send>>;
}
