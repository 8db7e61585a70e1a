use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use erased_serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ProxyProvider, proxies_as_map};
use crate::{
    app::remote_content_manager::{
        healthcheck::HealthCheck,
        providers::{
            Provider, ProviderError, ProviderState, ProviderType, ProviderVehicleType,
        },
    },
    proxy::AnyProxy,
};

/// A fixed list of proxies with no vehicle and no background refresh.
/// The health check is expected to be seeded with the same list.
pub struct CompatibleProvider {
    name: String,
    proxies: Arc<Vec<AnyProxy>>,
    hc: Arc<HealthCheck>,
    state: Mutex<ProviderState>,
}

impl CompatibleProvider {
    pub fn new(
        name: String,
        proxies: Vec<AnyProxy>,
        hc: HealthCheck,
    ) -> Result<Self, ProviderError> {
        if proxies.is_empty() {
            return Err(ProviderError::Config(format!(
                "{}: provider need one proxy at least",
                name
            )));
        }

        let hc = Arc::new(hc);
        if hc.auto() {
            debug!("kicking off healthcheck: {}", name);
            let hc = hc.clone();
            tokio::spawn(async move {
                hc.kick_off().await;
            });
        }

        Ok(Self {
            name,
            proxies: Arc::new(proxies),
            hc,
            state: Mutex::new(ProviderState::Uninitialized),
        })
    }
}

#[async_trait]
impl Provider for CompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn vehicle_type(&self) -> ProviderVehicleType {
        ProviderVehicleType::Compatible
    }

    fn typ(&self) -> ProviderType {
        ProviderType::Proxy
    }

    async fn state(&self) -> ProviderState {
        *self.state.lock().await
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        if *state == ProviderState::Destroyed {
            return Err(ProviderError::Lifecycle(format!(
                "{} is destroyed",
                self.name
            )));
        }
        *state = ProviderState::Active;
        Ok(())
    }

    async fn reload(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn update(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn destroy(&self) {
        *self.state.lock().await = ProviderState::Destroyed;
        self.hc.close().await;
    }

    async fn as_map(&self) -> HashMap<String, Box<dyn Serialize + Send>> {
        let mut m: HashMap<String, Box<dyn Serialize + Send>> = HashMap::new();

        m.insert("name".to_owned(), Box::new(self.name().to_string()));
        m.insert("type".to_owned(), Box::new(self.typ().to_string()));
        m.insert(
            "vehicleType".to_owned(),
            Box::new(self.vehicle_type().to_string()),
        );
        m.insert(
            "proxies".to_owned(),
            Box::new(proxies_as_map(&self.proxies).await),
        );

        m
    }
}

#[async_trait]
impl ProxyProvider for CompatibleProvider {
    async fn proxies(&self) -> Arc<Vec<AnyProxy>> {
        self.proxies.clone()
    }

    async fn touch(&self) {
        self.hc.touch().await;
    }

    async fn healthcheck(&self) {
        self.hc.check().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::CompatibleProvider;
    use crate::{
        app::remote_content_manager::{
            healthcheck::HealthCheck,
            providers::{
                Provider, ProviderError, ProviderState, ProviderVehicleType,
                proxy_provider::ProxyProvider,
            },
        },
        proxy::{Proxy, reject},
    };

    const TEST_URL: &str = "http://www.gstatic.com/generate_204";

    fn hc(proxies: Vec<crate::proxy::AnyProxy>) -> HealthCheck {
        HealthCheck::new(proxies, TEST_URL.to_owned(), 0, false, None).unwrap()
    }

    #[tokio::test]
    async fn test_empty_list_is_rejected() {
        match CompatibleProvider::new("static".to_owned(), vec![], hc(vec![])) {
            Err(ProviderError::Config(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("empty provider must be rejected"),
        }
    }

    #[tokio::test]
    async fn test_static_provider() {
        let r = Arc::new(Proxy::new(reject::Handler::new(Some("r".to_owned()))));
        let p = CompatibleProvider::new(
            "static".to_owned(),
            vec![r.clone()],
            hc(vec![r.clone()]),
        )
        .unwrap();

        assert_eq!(p.vehicle_type(), ProviderVehicleType::Compatible);
        p.initialize().await.unwrap();
        p.reload().await.unwrap();
        p.update().await.unwrap();
        assert_eq!(p.state().await, ProviderState::Active);
        assert_eq!(p.proxies().await.len(), 1);

        p.healthcheck().await;
        assert!(!r.alive());
        assert_eq!(r.delay_history().await.len(), 1);

        let v = serde_json::to_value(p.as_map().await).unwrap();
        assert_eq!(v["vehicleType"], "Compatible");
        assert!(v.get("updatedAt").is_none());

        p.destroy().await;
        p.destroy().await;
        assert_eq!(p.state().await, ProviderState::Destroyed);
        assert!(p.initialize().await.is_err());
    }
}
