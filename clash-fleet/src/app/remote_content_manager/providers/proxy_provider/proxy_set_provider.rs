use std::{collections::HashMap, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use erased_serde::Serialize as ESerialize;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use super::{ProxyProvider, proxies_as_map};
use crate::{
    app::remote_content_manager::{
        healthcheck::HealthCheck,
        providers::{
            Provider, ProviderError, ProviderState, ProviderType, ProviderVehicleType,
            ThreadSafeProviderVehicle, fetcher::Fetcher,
        },
    },
    proxy::{AnyProxy, converters::parse_proxy},
};

#[derive(Deserialize, Debug)]
struct ProviderScheme {
    #[serde(rename = "proxies")]
    proxies: Option<Vec<HashMap<String, Value>>>,
}

type Updater = Box<dyn Fn(Vec<AnyProxy>) -> BoxFuture<'static, ()> + Send + Sync + 'static>;
type Parser =
    Box<dyn Fn(&[u8]) -> Result<Vec<AnyProxy>, ProviderError> + Send + Sync + 'static>;

/// Parses a provider document. The first bad entry fails the whole
/// document so a half valid list is never published.
pub fn parse_proxies(content: &[u8]) -> Result<Vec<AnyProxy>, ProviderError> {
    let scheme: ProviderScheme = serde_yaml::from_slice(content)
        .map_err(|x| ProviderError::Format(x.to_string()))?;
    let proxies = scheme.proxies.ok_or(ProviderError::Format(
        "file must have a `proxies` field".to_owned(),
    ))?;

    let proxies = proxies
        .into_iter()
        .enumerate()
        .map(|(index, mapping)| {
            parse_proxy(mapping).map_err(|source| ProviderError::Entry { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if proxies.is_empty() {
        return Err(ProviderError::Empty);
    }
    Ok(proxies)
}

/// A provider backed by a vehicle, refreshed every `interval`.
pub struct ProxySetProvider {
    fetcher: Fetcher<Updater, Parser>,
    proxies: Arc<ArcSwap<Vec<AnyProxy>>>,
    hc: Arc<HealthCheck>,
}

impl ProxySetProvider {
    pub fn new(
        name: String,
        interval: Duration,
        vehicle: ThreadSafeProviderVehicle,
        hc: HealthCheck,
    ) -> Self {
        let hc = Arc::new(hc);

        if hc.auto() {
            let hc = hc.clone();
            debug!("kicking off healthcheck for: {}", &name);
            tokio::spawn(async move {
                hc.kick_off().await;
            });
        }

        let proxies = Arc::new(ArcSwap::from_pointee(vec![]));

        let n = name.clone();
        let published = proxies.clone();
        let hc_clone = hc.clone();
        let updater: Updater =
            Box::new(move |input: Vec<AnyProxy>| -> BoxFuture<'static, ()> {
                let hc = hc_clone.clone();
                let n = n.clone();
                let published = published.clone();
                Box::pin(async move {
                    debug!("publishing {} proxies for: {}", input.len(), n);
                    published.store(Arc::new(input.clone()));
                    hc.update(input).await;
                    // check once after update
                    tokio::spawn(async move {
                        hc.check().await;
                    });
                })
            });

        let parser: Parser = Box::new(parse_proxies);

        let fetcher = Fetcher::new(name, interval, vehicle, parser, updater);
        Self {
            fetcher,
            proxies,
            hc,
        }
    }

    pub async fn updated_at(&self) -> DateTime<Utc> {
        self.fetcher.updated_at().await
    }

    pub async fn content_hash(&self) -> [u8; 16] {
        self.fetcher.hash().await
    }
}

#[async_trait]
impl Provider for ProxySetProvider {
    fn name(&self) -> &str {
        self.fetcher.name()
    }

    fn vehicle_type(&self) -> ProviderVehicleType {
        self.fetcher.vehicle_type()
    }

    fn typ(&self) -> ProviderType {
        ProviderType::Proxy
    }

    async fn state(&self) -> ProviderState {
        self.fetcher.state().await
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        self.fetcher.initial().await?;
        debug!(
            "{} initialized with {} proxies",
            self.name(),
            self.proxies.load().len()
        );
        Ok(())
    }

    async fn reload(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn update(&self) -> Result<(), ProviderError> {
        let changed = self.fetcher.update().await?;
        debug!(
            "{} updated with {} proxies, changed? {}",
            self.name(),
            self.proxies.load().len(),
            changed
        );
        Ok(())
    }

    async fn destroy(&self) {
        self.fetcher.destroy().await;
        self.hc.close().await;
        debug!("{} destroyed", self.name());
    }

    async fn as_map(&self) -> HashMap<String, Box<dyn ESerialize + Send>> {
        let mut m: HashMap<String, Box<dyn ESerialize + Send>> = HashMap::new();

        m.insert("name".to_owned(), Box::new(self.name().to_string()));
        m.insert("type".to_owned(), Box::new(self.typ().to_string()));
        m.insert(
            "vehicleType".to_owned(),
            Box::new(self.vehicle_type().to_string()),
        );
        m.insert(
            "proxies".to_owned(),
            Box::new(proxies_as_map(&self.proxies.load_full()).await),
        );
        m.insert("updatedAt".to_owned(), Box::new(self.updated_at().await));

        m
    }
}

#[async_trait]
impl ProxyProvider for ProxySetProvider {
    async fn proxies(&self) -> Arc<Vec<AnyProxy>> {
        self.proxies.load_full()
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
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::{ProxySetProvider, parse_proxies};
    use crate::{
        app::remote_content_manager::{
            healthcheck::HealthCheck,
            providers::{
                MockProviderVehicle, Provider, ProviderError, ProviderState,
                ProviderVehicleType, file_vehicle,
                proxy_provider::ProxyProvider,
            },
        },
        common::utils,
        proxy::ProxyError,
        tests::initialize,
    };

    const TEST_URL: &str = "http://www.gstatic.com/generate_204";

    const B1: &str = r#"
proxies:
  - name: a
    type: reject
  - name: b
    type: reject
"#;

    const B2: &str = r#"
proxies:
  - name: a
    type: reject
"#;

    const B3: &str = r#"
proxies:
  - name: c
    type: reject
  - name: d
    type: reject
  - name: e
    type: reject
"#;

    const BAD_SECOND: &str = r#"
proxies:
  - name: a
    type: reject
  - name: q
    type: quantum
"#;

    /// A mocked http vehicle whose remote content can be swapped.
    fn remote(
        path: &std::path::Path,
        content: &str,
    ) -> (Arc<MockProviderVehicle>, Arc<Mutex<Vec<u8>>>) {
        let content = Arc::new(Mutex::new(content.as_bytes().to_vec()));
        let c = content.clone();
        let mut v = MockProviderVehicle::new();
        v.expect_path()
            .return_const(path.to_str().unwrap().to_owned());
        v.expect_typ().return_const(ProviderVehicleType::Http);
        v.expect_read()
            .returning(move || Ok(c.lock().unwrap().clone()));
        (Arc::new(v), content)
    }

    fn hc() -> HealthCheck {
        HealthCheck::new(vec![], TEST_URL.to_owned(), 0, false, None).unwrap()
    }

    async fn names(p: &ProxySetProvider) -> Vec<String> {
        p.proxies()
            .await
            .iter()
            .map(|x| x.name().to_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_from_remote() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers").join("sub.yaml");
        let (vehicle, _) = remote(&path, B1);

        let p = ProxySetProvider::new("sub".to_owned(), Duration::ZERO, vehicle, hc());
        assert_eq!(p.state().await, ProviderState::Uninitialized);
        assert!(p.proxies().await.is_empty());

        p.initialize().await.unwrap();

        assert_eq!(p.state().await, ProviderState::Active);
        assert_eq!(names(&p).await, vec!["a", "b"]);
        assert_eq!(p.content_hash().await, utils::md5(B1.as_bytes()));
        assert_eq!(std::fs::read(&path).unwrap(), B1.as_bytes());
    }

    #[tokio::test]
    async fn test_unchanged_pull() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.yaml");
        let (vehicle, _) = remote(&path, B1);

        let p = ProxySetProvider::new("sub".to_owned(), Duration::ZERO, vehicle, hc());
        p.initialize().await.unwrap();

        let before = p.proxies().await;
        let updated_at = p.updated_at().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        p.update().await.unwrap();
        p.update().await.unwrap();

        assert!(Arc::ptr_eq(&before, &p.proxies().await));
        assert_eq!(p.content_hash().await, utils::md5(B1.as_bytes()));
        assert!(p.updated_at().await > updated_at);
    }

    #[tokio::test]
    async fn test_changed_pull_removes_proxy() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.yaml");
        let (vehicle, content) = remote(&path, B1);

        let p = ProxySetProvider::new("sub".to_owned(), Duration::ZERO, vehicle, hc());
        p.initialize().await.unwrap();
        assert_eq!(names(&p).await, vec!["a", "b"]);

        *content.lock().unwrap() = B2.as_bytes().to_vec();
        p.update().await.unwrap();

        assert_eq!(names(&p).await, vec!["a"]);
        assert_eq!(p.content_hash().await, utils::md5(B2.as_bytes()));
        assert_eq!(std::fs::read(&path).unwrap(), B2.as_bytes());
    }

    #[tokio::test]
    async fn test_invalid_entry_on_initialize() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.yaml");
        let (vehicle, _) = remote(&path, BAD_SECOND);

        let p = ProxySetProvider::new("sub".to_owned(), Duration::ZERO, vehicle, hc());

        match p.initialize().await {
            Err(ProviderError::Entry {
                index: 1,
                source: ProxyError::UnknownKind(_),
            }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(p.state().await, ProviderState::Uninitialized);
        assert!(p.proxies().await.is_empty());
        assert_eq!(p.content_hash().await, [0; 16]);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_invalid_entry_on_pull() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.yaml");
        let (vehicle, content) = remote(&path, B1);

        let p = ProxySetProvider::new("sub".to_owned(), Duration::ZERO, vehicle, hc());
        p.initialize().await.unwrap();
        let before = p.proxies().await;
        let updated_at = p.updated_at().await;

        *content.lock().unwrap() = BAD_SECOND.as_bytes().to_vec();
        assert!(matches!(
            p.update().await,
            Err(ProviderError::Entry { index: 1, .. })
        ));

        assert!(Arc::ptr_eq(&before, &p.proxies().await));
        assert_eq!(p.content_hash().await, utils::md5(B1.as_bytes()));
        assert_eq!(p.updated_at().await, updated_at);
        assert_eq!(std::fs::read(&path).unwrap(), B1.as_bytes());
    }

    #[tokio::test]
    async fn test_corrupted_cache_falls_back_to_remote() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.yaml");
        std::fs::write(&path, b"{{{ not yaml").unwrap();
        let (vehicle, _) = remote(&path, B1);

        let p = ProxySetProvider::new("sub".to_owned(), Duration::ZERO, vehicle, hc());
        p.initialize().await.unwrap();

        assert_eq!(names(&p).await, vec!["a", "b"]);
        assert_eq!(std::fs::read(&path).unwrap(), B1.as_bytes());
    }

    #[tokio::test]
    async fn test_valid_cache_is_used_first() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.yaml");
        std::fs::write(&path, B2).unwrap();
        let (vehicle, _) = remote(&path, B1);

        let p = ProxySetProvider::new("sub".to_owned(), Duration::ZERO, vehicle, hc());
        p.initialize().await.unwrap();

        assert_eq!(names(&p).await, vec!["a"]);
        assert_eq!(p.content_hash().await, utils::md5(B2.as_bytes()));

        p.update().await.unwrap();
        assert_eq!(names(&p).await, vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_torn_list() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.yaml");
        let (vehicle, content) = remote(&path, B1);

        let p = Arc::new(ProxySetProvider::new(
            "sub".to_owned(),
            Duration::ZERO,
            vehicle,
            hc(),
        ));
        p.initialize().await.unwrap();

        let mut readers = vec![];
        for _ in 0..4 {
            let p = p.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..2000 {
                    let names: Vec<String> = p
                        .proxies()
                        .await
                        .iter()
                        .map(|x| x.name().to_owned())
                        .collect();
                    assert!(
                        names == ["a", "b"] || names == ["c", "d", "e"],
                        "torn list: {:?}",
                        names
                    );
                    tokio::task::yield_now().await;
                }
            }));
        }

        for i in 0..50 {
            let next = if i % 2 == 0 { B3 } else { B1 };
            *content.lock().unwrap() = next.as_bytes().to_vec();
            p.update().await.unwrap();
        }

        for r in readers {
            r.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_file_vehicle_is_not_persisted() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.yaml");
        std::fs::write(&path, B1).unwrap();

        let vehicle = Arc::new(file_vehicle::Vehicle::new(path.to_str().unwrap()));
        let p = ProxySetProvider::new("local".to_owned(), Duration::ZERO, vehicle, hc());
        assert_eq!(p.vehicle_type(), ProviderVehicleType::File);

        p.initialize().await.unwrap();
        assert_eq!(names(&p).await, vec!["a", "b"]);

        std::fs::write(&path, B2).unwrap();
        p.update().await.unwrap();
        assert_eq!(names(&p).await, vec!["a"]);
        assert_eq!(std::fs::read(&path).unwrap(), B2.as_bytes());
    }

    #[tokio::test]
    async fn test_destroy() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.yaml");
        let (vehicle, _) = remote(&path, B1);

        let hc = HealthCheck::new(vec![], TEST_URL.to_owned(), 300, true, None)
            .unwrap();
        let p = ProxySetProvider::new(
            "sub".to_owned(),
            Duration::from_secs(3600),
            vehicle,
            hc,
        );

        p.destroy().await;
        p.destroy().await;
        assert_eq!(p.state().await, ProviderState::Destroyed);
        assert!(matches!(
            p.initialize().await,
            Err(ProviderError::Lifecycle(_))
        ));
    }

    #[tokio::test]
    async fn test_as_map() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.yaml");
        let (vehicle, _) = remote(&path, B2);

        let p = ProxySetProvider::new("sub".to_owned(), Duration::ZERO, vehicle, hc());
        p.initialize().await.unwrap();

        let m = p.as_map().await;
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["name"], "sub");
        assert_eq!(v["type"], "Proxy");
        assert_eq!(v["vehicleType"], "HTTP");
        assert_eq!(v["proxies"][0]["name"], "a");
        assert_eq!(v["proxies"][0]["type"], "Reject");
        assert!(v["updatedAt"].is_string());
    }

    #[test]
    fn test_parse_proxies_errors() {
        assert!(matches!(
            parse_proxies(b"foo: bar"),
            Err(ProviderError::Format(_))
        ));
        assert!(matches!(
            parse_proxies(b"proxies: ["),
            Err(ProviderError::Format(_))
        ));
        assert!(matches!(
            parse_proxies(b"proxies: []"),
            Err(ProviderError::Empty)
        ));
        assert_eq!(parse_proxies(B3.as_bytes()).unwrap().len(), 3);
    }
}
