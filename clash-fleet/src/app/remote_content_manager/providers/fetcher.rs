use std::{
    path::Path,
    sync::Arc,
    time::{Duration, SystemTime},
};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use futures::future::BoxFuture;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use super::{ProviderError, ProviderState, ProviderVehicleType, ThreadSafeProviderVehicle};
use crate::common::utils;

struct Inner {
    updated_at: SystemTime,
    hash: [u8; 16],
}

struct Lifecycle {
    state: ProviderState,
    pull_task: Option<JoinHandle<()>>,
}

/// Drives a vehicle: reads, detects unchanged content by hash, parses,
/// persists and hands the parsed value to `on_update`.
///
/// Everything after the read runs under one lock, so two pulls racing each
/// other can never leave the hash and the published value out of step.
pub struct Fetcher<U, P> {
    name: String,
    interval: Duration,
    vehicle: ThreadSafeProviderVehicle,
    inner: Arc<Mutex<Inner>>,
    lifecycle: RwLock<Lifecycle>,
    parser: Arc<P>,
    on_update: Arc<U>,
}

impl<T, U, P> Fetcher<U, P>
where
    T: Send + 'static,
    U: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    P: Fn(&[u8]) -> Result<T, ProviderError> + Send + Sync + 'static,
{
    pub fn new(
        name: String,
        interval: Duration,
        vehicle: ThreadSafeProviderVehicle,
        parser: P,
        on_update: U,
    ) -> Self {
        Self {
            name,
            interval,
            vehicle,
            inner: Arc::new(Mutex::new(Inner {
                updated_at: SystemTime::UNIX_EPOCH,
                hash: [0; 16],
            })),
            lifecycle: RwLock::new(Lifecycle {
                state: ProviderState::Uninitialized,
                pull_task: None,
            }),
            parser: Arc::new(parser),
            on_update: Arc::new(on_update),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn vehicle_type(&self) -> ProviderVehicleType {
        self.vehicle.typ()
    }

    pub async fn updated_at(&self) -> DateTime<Utc> {
        self.inner.lock().await.updated_at.into()
    }

    pub async fn hash(&self) -> [u8; 16] {
        self.inner.lock().await.hash
    }

    pub async fn state(&self) -> ProviderState {
        self.lifecycle.read().await.state
    }

    /// Loads the local cache if there is one, falls back to the vehicle,
    /// publishes and starts the pull loop.
    pub async fn initial(&self) -> Result<(), ProviderError> {
        let mut lifecycle = self.lifecycle.write().await;
        match lifecycle.state {
            ProviderState::Uninitialized => {}
            ProviderState::Active => {
                return Err(ProviderError::Lifecycle(format!(
                    "{} is already initialized",
                    self.name
                )));
            }
            ProviderState::Destroyed => {
                return Err(ProviderError::Lifecycle(format!(
                    "{} is destroyed",
                    self.name
                )));
            }
        }

        let mut inner = self.inner.lock().await;
        let vehicle_path = self.vehicle.path().to_owned();

        let local = self.read_local(&vehicle_path).await;

        let mut immediately_update = false;
        let (parsed, content, updated_at, is_local) = match local {
            Some((content, modified)) => match (*self.parser)(&content) {
                Ok(parsed) => {
                    immediately_update = SystemTime::now()
                        .duration_since(modified)
                        .map(|age| age > self.interval)
                        .unwrap_or(false);
                    (parsed, content, modified, true)
                }
                Err(e) => {
                    warn!(
                        "{} local cache {} is unusable, fetching: {}",
                        self.name, vehicle_path, e
                    );
                    let content =
                        self.vehicle.read().await.map_err(ProviderError::Fetch)?;
                    let parsed = (*self.parser)(&content)?;
                    (parsed, content, SystemTime::now(), false)
                }
            },
            None => {
                let content = self.vehicle.read().await.map_err(ProviderError::Fetch)?;
                let parsed = (*self.parser)(&content)?;
                (parsed, content, SystemTime::now(), false)
            }
        };

        if !is_local && self.vehicle.typ() != ProviderVehicleType::File {
            persist(&vehicle_path, &content).await?;
        }

        inner.hash = utils::md5(&content);
        inner.updated_at = updated_at;
        (*self.on_update)(parsed).await;
        drop(inner);

        lifecycle.state = ProviderState::Active;
        if !self.interval.is_zero() {
            lifecycle.pull_task = Some(self.pull_loop(immediately_update));
        }

        let source = if is_local { "local cache" } else { "vehicle" };
        info!("{} initialized from {}", self.name, source);
        Ok(())
    }

    /// the cache file and its mtime, `None` if missing or unreadable
    async fn read_local(&self, path: &str) -> Option<(Vec<u8>, SystemTime)> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            _ => return None,
        };
        let content = tokio::fs::read(path)
            .await
            .and_then(|content| meta.modified().map(|modified| (content, modified)));
        match content {
            Ok(local) => Some(local),
            Err(e) => {
                warn!(
                    "{} failed to read local cache {}, fetching: {}",
                    self.name, path, e
                );
                None
            }
        }
    }

    /// One refresh, returns whether anything new was published.
    /// `destroy` waits for a running update to finish.
    pub async fn update(&self) -> Result<bool, ProviderError> {
        let lifecycle = self.lifecycle.read().await;
        if lifecycle.state != ProviderState::Active {
            return Err(ProviderError::Lifecycle(format!(
                "{} can't be updated while {}",
                self.name, lifecycle.state
            )));
        }
        let updated =
            Self::pull(&self.inner, &self.vehicle, &self.parser, &self.on_update).await;
        drop(lifecycle);
        updated
    }

    async fn pull(
        inner: &Mutex<Inner>,
        vehicle: &ThreadSafeProviderVehicle,
        parser: &P,
        on_update: &U,
    ) -> Result<bool, ProviderError> {
        let content = vehicle.read().await.map_err(ProviderError::Fetch)?;

        let mut this = inner.lock().await;
        let now = SystemTime::now();
        let hash = utils::md5(&content);

        if hash == this.hash {
            this.updated_at = now;
            if let Err(e) =
                filetime::set_file_mtime(vehicle.path(), FileTime::from_system_time(now))
            {
                debug!("failed to touch {}: {}", vehicle.path(), e);
            }
            return Ok(false);
        }

        let parsed = parser(&content)?;

        if vehicle.typ() != ProviderVehicleType::File {
            persist(vehicle.path(), &content).await?;
        }

        debug!(
            "{} content changed, new hash {}",
            vehicle.path(),
            utils::encode_hex(&hash)
        );
        this.hash = hash;
        this.updated_at = now;
        on_update(parsed).await;

        Ok(true)
    }

    pub async fn destroy(&self) {
        let mut lifecycle = self.lifecycle.write().await;
        if let Some(handle) = lifecycle.pull_task.take() {
            handle.abort();
        }
        lifecycle.state = ProviderState::Destroyed;
    }

    fn pull_loop(&self, immediately_update: bool) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let vehicle = self.vehicle.clone();
        let parser = self.parser.clone();
        let on_update = self.on_update.clone();
        let name = self.name.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let start = if immediately_update {
                Instant::now()
            } else {
                Instant::now() + interval
            };
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("{} pull loop started, interval: {:?}", name, interval);
            loop {
                ticker.tick().await;
                match Self::pull(&inner, &vehicle, parser.as_ref(), on_update.as_ref()).await
                {
                    Ok(true) => info!("fetcher {} updated", name),
                    Ok(false) => trace!("fetcher {} no update", name),
                    Err(e) => warn!("{} pull failed: {}", name, e),
                }
            }
        })
    }
}

async fn persist(path: &str, content: &[u8]) -> Result<(), ProviderError> {
    if let Some(prefix) = Path::new(path).parent() {
        if !prefix.as_os_str().is_empty() && !prefix.exists() {
            tokio::fs::create_dir_all(prefix)
                .await
                .map_err(ProviderError::Persist)?;
        }
    }
    tokio::fs::write(path, content)
        .await
        .map_err(ProviderError::Persist)
}
