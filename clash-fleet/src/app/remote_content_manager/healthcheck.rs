use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream::FuturesUnordered};
use tokio::{sync::RwLock, task::JoinHandle, time::Instant};
use tracing::{debug, warn};
use url::Url;

use crate::{
    app::remote_content_manager::providers::ProviderError,
    proxy::{AnyProxy, DEFAULT_PROBE_TIMEOUT},
};

/// a pass gives up on the probes it is still waiting for after this many
/// probe timeouts
const PASS_BUDGET_FACTOR: u32 = 3;

struct HealthCheckInner {
    proxies: Vec<AnyProxy>,
    last_touch: Option<Instant>,
    task_handle: Option<JoinHandle<()>>,
    closed: bool,
}

pub struct HealthCheck {
    url: String,
    interval: Duration,
    lazy: bool,
    timeout: Duration,
    inner: Arc<RwLock<HealthCheckInner>>,
}

impl HealthCheck {
    /// `interval` of zero disables periodic probing.
    pub fn new(
        proxies: Vec<AnyProxy>,
        url: String,
        interval: u64,
        lazy: bool,
        timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        Url::parse(&url).map_err(|e| {
            ProviderError::Config(format!("invalid health check url {}: {}", url, e))
        })?;

        Ok(Self {
            url,
            interval: Duration::from_secs(interval),
            lazy,
            timeout: timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT),
            inner: Arc::new(RwLock::new(HealthCheckInner {
                proxies,
                last_touch: None,
                task_handle: None,
                closed: false,
            })),
        })
    }

    pub fn auto(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Starts periodic probing. Does nothing unless in auto mode, and
    /// nothing if the loop is already running or the check was closed.
    pub async fn kick_off(&self) {
        if !self.auto() {
            return;
        }

        let mut inner = self.inner.write().await;
        if inner.closed || inner.task_handle.is_some() {
            debug!("healthcheck for {} already running or closed", self.url);
            return;
        }

        let state = self.inner.clone();
        let url = self.url.clone();
        let interval = self.interval;
        let lazy = self.lazy;
        let timeout = self.timeout;

        inner.task_handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // the first pass runs right away, lazy or not
            ticker.tick().await;
            let proxies = state.read().await.proxies.clone();
            check_proxies(proxies, &url, timeout).await;

            loop {
                ticker.tick().await;
                let (proxies, last_touch) = {
                    let r = state.read().await;
                    (r.proxies.clone(), r.last_touch)
                };
                let touched = last_touch.is_some_and(|t| t.elapsed() < interval);
                if lazy && !touched {
                    debug!("skipping lazy healthcheck for {}", url);
                    continue;
                }
                debug!("healthcheck ticking: {}, lazy: {}", url, lazy);
                check_proxies(proxies, &url, timeout).await;
            }
        }));
    }

    pub async fn touch(&self) {
        self.inner.write().await.last_touch = Some(Instant::now());
    }

    /// Probes every proxy of the current snapshot once and waits for the
    /// pass to finish.
    pub async fn check(&self) {
        let proxies = {
            let inner = self.inner.read().await;
            if inner.closed {
                return;
            }
            inner.proxies.clone()
        };
        check_proxies(proxies, &self.url, self.timeout).await;
    }

    pub async fn update(&self, proxies: Vec<AnyProxy>) {
        self.inner.write().await.proxies = proxies;
    }

    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        inner.closed = true;
        if let Some(handle) = inner.task_handle.take() {
            handle.abort();
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.read().await.task_handle.is_some()
    }
}

async fn check_proxies(proxies: Vec<AnyProxy>, url: &str, timeout: Duration) {
    if proxies.is_empty() {
        return;
    }

    let mut futs = FuturesUnordered::new();
    let mut aborts = Vec::with_capacity(proxies.len());
    for proxy in proxies {
        let url = url.to_owned();
        let handle = tokio::spawn(async move {
            proxy
                .url_test(&url, Some(timeout))
                .await
                .map_err(|e| debug!("healthcheck for {} failed: {}", proxy.name(), e))
        });
        aborts.push(handle.abort_handle());
        futs.push(handle);
    }

    let budget = timeout * PASS_BUDGET_FACTOR;
    let drained = tokio::time::timeout(budget, async {
        while futs.next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            "healthcheck pass for {} exceeded {:?}, aborting {} probes",
            url,
            budget,
            futs.len()
        );
        for abort in aborts {
            abort.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use url::Url;

    use super::HealthCheck;
    use crate::{
        proxy::{
            AnyProxy, OutboundHandler, OutboundType, Proxy,
            mocks::MockDummyOutboundHandler,
        },
        session::SocksAddr,
    };

    const TEST_URL: &str = "http://www.gstatic.com/generate_204";

    fn proxy(
        name: &str,
        result: impl Fn() -> io::Result<()> + Send + Sync + 'static,
    ) -> AnyProxy {
        let mut handler = MockDummyOutboundHandler::new();
        handler.expect_name().return_const(name.to_owned());
        handler.expect_url_test().returning(move |_| result());
        Arc::new(Proxy::new(Arc::new(handler)))
    }

    fn counting_proxy(name: &str, counter: Arc<AtomicUsize>) -> AnyProxy {
        proxy(name, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    struct Hang;

    #[async_trait::async_trait]
    impl OutboundHandler for Hang {
        fn name(&self) -> &str {
            "hang"
        }

        fn proto(&self) -> OutboundType {
            OutboundType::Socks5
        }

        async fn remote_addr(&self) -> Option<SocksAddr> {
            None
        }

        async fn support_udp(&self) -> bool {
            false
        }

        async fn url_test(&self, _url: &Url) -> io::Result<()> {
            futures::future::pending().await
        }
    }

    #[test]
    fn test_invalid_url() {
        assert!(HealthCheck::new(vec![], "not a url".to_owned(), 0, false, None).is_err());
    }

    #[tokio::test]
    async fn test_check_records_every_proxy() {
        let good = proxy("good", || Ok(()));
        let bad = proxy("bad", || Err(io::Error::other("refused")));

        let hc = HealthCheck::new(
            vec![good.clone(), bad.clone()],
            TEST_URL.to_owned(),
            0,
            false,
            None,
        )
        .unwrap();
        assert!(!hc.auto());

        hc.check().await;

        assert!(good.alive());
        assert!(!bad.alive());
        assert_eq!(good.delay_history().await.len(), 1);
        assert_eq!(bad.delay_history().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_is_bounded() {
        let ok = proxy("ok", || Ok(()));
        let hang: AnyProxy = Arc::new(Proxy::new(Arc::new(Hang)));

        let hc = HealthCheck::new(
            vec![ok.clone(), hang.clone()],
            TEST_URL.to_owned(),
            0,
            false,
            Some(Duration::from_secs(1)),
        )
        .unwrap();

        let started = tokio::time::Instant::now();
        hc.check().await;

        assert!(started.elapsed() <= Duration::from_secs(3));
        assert!(ok.alive());
        assert!(!hang.alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_check_uses_current_snapshot() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let hc = HealthCheck::new(
            vec![counting_proxy("first", first.clone())],
            TEST_URL.to_owned(),
            10,
            false,
            None,
        )
        .unwrap();
        assert!(hc.auto());

        hc.kick_off().await;
        hc.kick_off().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        // one pass, two probes per url test
        assert_eq!(first.load(Ordering::SeqCst), 2);

        hc.update(vec![counting_proxy("second", second.clone())]).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);

        hc.close().await;
        hc.close().await;
        assert!(!hc.is_running().await);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(second.load(Ordering::SeqCst), 2);

        // no passes after close, manual or not
        hc.check().await;
        hc.kick_off().await;
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert!(!hc.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_skips_untouched() {
        let counter = Arc::new(AtomicUsize::new(0));

        let hc = HealthCheck::new(
            vec![counting_proxy("lazy", counter.clone())],
            TEST_URL.to_owned(),
            10,
            true,
            None,
        )
        .unwrap();

        hc.kick_off().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        // untouched, the next tick is skipped
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        hc.touch().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        hc.close().await;
    }
}
