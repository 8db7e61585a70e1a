use std::{io, path::Path, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use http::Request;
use http_body_util::{BodyExt, Empty};
use hyper::Uri;
use tracing::debug;

use super::{ProviderVehicle, ProviderVehicleType};
use crate::common::{
    errors::{map_io_error, new_io_error},
    http::{DEFAULT_USER_AGENT, HttpClient, new_http_client},
};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Vehicle {
    pub url: Uri,
    path: String,
    timeout: Duration,
    http_client: HttpClient,
}

impl Vehicle {
    /// `path` is the local cache file, joined onto `cwd` when given.
    pub fn new(
        url: &str,
        path: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> io::Result<Self> {
        let url = url
            .parse::<Uri>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let path = match cwd {
            Some(cwd) => Path::new(cwd).join(path),
            None => Path::new(path).to_path_buf(),
        };
        let path = path
            .into_os_string()
            .into_string()
            .map_err(|p| new_io_error(format!("non utf-8 cache path: {:?}", p)))?;

        Ok(Self {
            url,
            path,
            timeout: timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            http_client: new_http_client()?,
        })
    }

    async fn fetch(&self) -> io::Result<Vec<u8>> {
        let req = Request::builder()
            .uri(self.url.clone())
            .header(http::header::USER_AGENT, DEFAULT_USER_AGENT)
            .body(Empty::<Bytes>::new())
            .map_err(map_io_error)?;

        let resp = self
            .http_client
            .request(req)
            .await
            .map_err(|x| io::Error::other(x.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(new_io_error(format!(
                "unexpected status {} from {}",
                status, self.url
            )));
        }

        resp.into_body()
            .collect()
            .await
            .map(|x| x.to_bytes().to_vec())
            .map_err(map_io_error)
    }
}

#[async_trait]
impl ProviderVehicle for Vehicle {
    async fn read(&self) -> io::Result<Vec<u8>> {
        debug!("fetching {}", self.url);
        tokio::time::timeout(self.timeout, self.fetch())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("fetching {} timed out after {:?}", self.url, self.timeout),
                )
            })?
    }

    fn path(&self) -> &str {
        self.path.as_str()
    }

    fn typ(&self) -> ProviderVehicleType {
        ProviderVehicleType::Http
    }
}
