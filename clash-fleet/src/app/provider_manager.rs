use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use futures::future::join_all;
use serde_yaml::Value;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::{
    Error,
    app::remote_content_manager::{
        healthcheck::HealthCheck,
        providers::{
            Provider, ProviderError, file_vehicle, http_vehicle,
            proxy_provider::{CompatibleProvider, ProxySetProvider, ThreadSafeProxyProvider},
        },
    },
    config::{
        def::Config,
        internal::proxy::{HealthCheck as HealthCheckDef, OutboundProxyProviderDef},
    },
    proxy::converters::parse_proxy,
};

/// The provider serving the top level `proxies` list. Users can't define a
/// provider with this name.
pub const RESERVED_PROVIDER_NAME: &str = "default";

/// Owns every proxy provider of a config.
pub struct ProviderManager {
    providers: RwLock<HashMap<String, ThreadSafeProxyProvider>>,
}

impl ProviderManager {
    /// Builds vehicles, health checks and providers. Nothing is fetched yet,
    /// see [`ProviderManager::initialize_all`]. Must run inside a runtime.
    pub async fn new(config: &Config, cwd: &str) -> Result<Self, Error> {
        let mut providers: HashMap<String, ThreadSafeProxyProvider> = HashMap::new();

        if let Some(proxies) = config.proxies.as_ref().filter(|x| !x.is_empty()) {
            let proxies = proxies
                .iter()
                .cloned()
                .enumerate()
                .map(|(index, mapping)| {
                    parse_proxy(mapping)
                        .map_err(|source| ProviderError::Entry { index, source })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let hc = HealthCheck::new(
                proxies.clone(),
                HealthCheckDef::default().url,
                0,
                false,
                None,
            )?;
            let provider =
                CompatibleProvider::new(RESERVED_PROVIDER_NAME.to_owned(), proxies, hc)?;
            providers.insert(RESERVED_PROVIDER_NAME.to_owned(), Arc::new(provider));
        }

        for (name, mapping) in config.proxy_providers.clone().unwrap_or_default() {
            if name == RESERVED_PROVIDER_NAME {
                return Err(Error::InvalidConfig(format!(
                    "can not define a provider called `{}`",
                    RESERVED_PROVIDER_NAME
                )));
            }
            let provider = build_provider(&name, mapping, cwd)?;
            providers.insert(name, provider);
        }

        Ok(Self {
            providers: RwLock::new(providers),
        })
    }

    /// Initializes every provider concurrently. Providers failing to
    /// initialize are logged, destroyed and dropped from the registry.
    pub async fn initialize_all(&self) {
        let providers: Vec<_> = self
            .providers
            .read()
            .await
            .iter()
            .map(|(name, p)| (name.clone(), p.clone()))
            .collect();

        let failed = join_all(providers.into_iter().map(|(name, p)| async move {
            info!("initializing provider {}", name);
            match p.initialize().await {
                Ok(_) => {
                    info!("initialized provider {}", name);
                    None
                }
                Err(err) => {
                    error!("failed to initialize proxy provider {}: {}", name, err);
                    p.destroy().await;
                    Some(name)
                }
            }
        }))
        .await;

        let mut providers = self.providers.write().await;
        for name in failed.into_iter().flatten() {
            providers.remove(&name);
        }
    }

    pub async fn get(&self, name: &str) -> Option<ThreadSafeProxyProvider> {
        self.providers.read().await.get(name).cloned()
    }

    /// every provider, ordered by name
    pub async fn providers(&self) -> Vec<ThreadSafeProxyProvider> {
        let providers = self.providers.read().await;
        let mut names: Vec<_> = providers.keys().collect();
        names.sort();
        names.into_iter().filter_map(|x| providers.get(x).cloned()).collect()
    }

    pub async fn destroy_all(&self) {
        for p in self.providers.read().await.values() {
            p.destroy().await;
        }
    }

    /// provider name to provider snapshot
    pub async fn snapshot(&self) -> Result<serde_json::Value, Error> {
        let mut m = serde_json::Map::new();
        for (name, p) in self.providers.read().await.iter() {
            let v = serde_json::to_value(p.as_map().await).map_err(anyhow::Error::from)?;
            m.insert(name.clone(), v);
        }
        Ok(serde_json::Value::Object(m))
    }
}

fn build_health_check(def: &HealthCheckDef) -> Result<HealthCheck, ProviderError> {
    HealthCheck::new(
        vec![],
        def.url.clone(),
        if def.enable { def.interval } else { 0 },
        def.lazy.unwrap_or_default(),
        def.timeout.map(Duration::from_millis),
    )
}

fn build_provider(
    name: &str,
    mut mapping: HashMap<String, Value>,
    cwd: &str,
) -> Result<ThreadSafeProxyProvider, Error> {
    mapping.insert("name".to_owned(), Value::String(name.to_owned()));
    let def = OutboundProxyProviderDef::try_from(mapping)?;
    let hc = build_health_check(def.health_check())?;

    let provider = match def {
        OutboundProxyProviderDef::Http(http) => {
            let vehicle = http_vehicle::Vehicle::new(
                &http.url,
                &http.path,
                Some(cwd),
                http.timeout.map(Duration::from_secs),
            )
            .map_err(|x| {
                Error::InvalidConfig(format!("invalid provider {}: {}", name, x))
            })?;
            ProxySetProvider::new(
                name.to_owned(),
                Duration::from_secs(http.interval),
                Arc::new(vehicle),
                hc,
            )
        }
        OutboundProxyProviderDef::File(file) => {
            let path = Path::new(cwd).join(&file.path);
            let path = path.to_str().ok_or(Error::InvalidConfig(format!(
                "invalid provider path: {}",
                file.path
            )))?;
            ProxySetProvider::new(
                name.to_owned(),
                Duration::from_secs(file.interval.unwrap_or_default()),
                Arc::new(file_vehicle::Vehicle::new(path)),
                hc,
            )
        }
    };

    Ok(Arc::new(provider))
}
