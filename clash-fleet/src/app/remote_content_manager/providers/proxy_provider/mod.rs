mod compatible_provider;
mod proxy_set_provider;

pub use compatible_provider::CompatibleProvider;
pub use proxy_set_provider::{ProxySetProvider, parse_proxies};

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use erased_serde::Serialize;

use crate::{app::remote_content_manager::providers::Provider, proxy::AnyProxy};

pub type ThreadSafeProxyProvider = Arc<dyn ProxyProvider + Send + Sync>;

#[async_trait]
pub trait ProxyProvider: Provider {
    /// the published list, never a mix of two versions
    async fn proxies(&self) -> Arc<Vec<AnyProxy>>;
    async fn touch(&self);
    /// this is a blocking call, you may want to spawn a new task to run this
    async fn healthcheck(&self);
}

pub(super) async fn proxies_as_map(
    proxies: &[AnyProxy],
) -> Vec<HashMap<String, Box<dyn Serialize + Send>>> {
    let mut out = Vec::with_capacity(proxies.len());
    for proxy in proxies {
        out.push(proxy.as_map().await);
    }
    out
}
