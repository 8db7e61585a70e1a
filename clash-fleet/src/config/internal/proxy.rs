use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, de::value::MapDeserializer};
use serde_yaml::Value;

use crate::{Error, common::utils::default_bool_true, proxy::ProxyError};

pub const PROXY_DIRECT: &str = "DIRECT";
pub const PROXY_REJECT: &str = "REJECT";

const KNOWN_PROXY_TYPES: &[&str] =
    &["direct", "reject", "ss", "socks5", "http", "trojan", "vmess"];

pub fn map_serde_error(name: String) -> impl FnOnce(serde_yaml::Error) -> String {
    move |x| {
        if let Some(loc) = x.location() {
            format!(
                "invalid config for {} at line {}, column {}: {}",
                name,
                loc.line(),
                loc.column(),
                x
            )
        } else {
            format!("error while parsing {}: {}", name, x)
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum OutboundProxyProtocol {
    #[serde(rename = "direct")]
    Direct(OutboundDirect),
    #[serde(rename = "reject")]
    Reject(OutboundReject),
    #[serde(rename = "ss")]
    Ss(OutboundShadowsocks),
    #[serde(rename = "socks5")]
    Socks5(OutboundSocks5),
    #[serde(rename = "http")]
    Http(OutboundHttp),
    #[serde(rename = "trojan")]
    Trojan(OutboundTrojan),
    #[serde(rename = "vmess")]
    Vmess(OutboundVmess),
}

impl TryFrom<HashMap<String, Value>> for OutboundProxyProtocol {
    type Error = ProxyError;

    fn try_from(mapping: HashMap<String, Value>) -> Result<Self, Self::Error> {
        let name = mapping
            .get("name")
            .and_then(|x| x.as_str())
            .ok_or(ProxyError::InvalidConfig(
                "missing field `name` in outbound proxy protocol".to_owned(),
            ))?
            .to_owned();
        let typ = mapping
            .get("type")
            .and_then(|x| x.as_str())
            .ok_or(ProxyError::InvalidConfig(format!(
                "missing field `type` in outbound proxy {}",
                name
            )))?;
        if !KNOWN_PROXY_TYPES.contains(&typ) {
            return Err(ProxyError::UnknownKind(format!("{} ({})", typ, name)));
        }

        OutboundProxyProtocol::deserialize(MapDeserializer::new(mapping.into_iter()))
            .map_err(map_serde_error(name))
            .map_err(ProxyError::InvalidConfig)
    }
}

impl Display for OutboundProxyProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboundProxyProtocol::Direct(_) => write!(f, "{}", PROXY_DIRECT),
            OutboundProxyProtocol::Reject(_) => write!(f, "{}", PROXY_REJECT),
            OutboundProxyProtocol::Ss(_) => write!(f, "Shadowsocks"),
            OutboundProxyProtocol::Socks5(_) => write!(f, "Socks5"),
            OutboundProxyProtocol::Http(_) => write!(f, "Http"),
            OutboundProxyProtocol::Trojan(_) => write!(f, "Trojan"),
            OutboundProxyProtocol::Vmess(_) => write!(f, "Vmess"),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
pub struct OutboundDirect {
    pub name: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
pub struct OutboundReject {
    pub name: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundShadowsocks {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub cipher: String,
    pub password: String,
    #[serde(default = "default_bool_true")]
    pub udp: bool,
    pub plugin: Option<String>,
    pub plugin_opts: Option<HashMap<String, Value>>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundSocks5 {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub skip_cert_verify: bool,
    #[serde(default)]
    pub udp: bool,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundHttp {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub skip_cert_verify: bool,
    pub sni: Option<String>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct WsOpt {
    pub path: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub max_early_data: Option<i32>,
    pub early_data_header_name: Option<String>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundTrojan {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub password: String,
    pub alpn: Option<Vec<String>>,
    pub sni: Option<String>,
    pub skip_cert_verify: Option<bool>,
    pub udp: Option<bool>,
    pub network: Option<String>,
    pub ws_opts: Option<WsOpt>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundVmess {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub uuid: String,
    #[serde(alias = "alterId", default)]
    pub alter_id: u16,
    pub cipher: Option<String>,
    pub udp: Option<bool>,
    pub tls: Option<bool>,
    pub skip_cert_verify: Option<bool>,
    #[serde(alias = "servername")]
    pub server_name: Option<String>,
    pub network: Option<String>,
    pub ws_opts: Option<WsOpt>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
#[serde(tag = "type")]
#[serde(rename_all = "kebab-case")]
pub enum OutboundProxyProviderDef {
    Http(OutboundHttpProvider),
    File(OutboundFileProvider),
}

impl OutboundProxyProviderDef {
    pub fn health_check(&self) -> &HealthCheck {
        match self {
            OutboundProxyProviderDef::Http(http) => &http.health_check,
            OutboundProxyProviderDef::File(file) => &file.health_check,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundHttpProvider {
    #[serde(skip)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub interval: u64,
    pub path: String,
    /// seconds, bounds a single fetch
    pub timeout: Option<u64>,
    #[serde(default)]
    pub health_check: HealthCheck,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct OutboundFileProvider {
    #[serde(skip)]
    pub name: String,
    pub path: String,
    pub interval: Option<u64>,
    #[serde(default)]
    pub health_check: HealthCheck,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct HealthCheck {
    pub enable: bool,
    pub url: String,
    pub interval: u64,
    pub lazy: Option<bool>,
    /// milliseconds, bounds a single probe
    pub timeout: Option<u64>,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            enable: false,
            url: "http://www.gstatic.com/generate_204".to_owned(),
            interval: 0,
            lazy: None,
            timeout: None,
        }
    }
}

impl TryFrom<HashMap<String, Value>> for OutboundProxyProviderDef {
    type Error = Error;

    fn try_from(mapping: HashMap<String, Value>) -> Result<Self, Self::Error> {
        let name = mapping
            .get("name")
            .and_then(|x| x.as_str())
            .ok_or(Error::InvalidConfig(
                "missing field `name` in outbound proxy provider".to_owned(),
            ))?
            .to_owned();
        let mut def = OutboundProxyProviderDef::deserialize(MapDeserializer::new(
            mapping.into_iter(),
        ))
        .map_err(map_serde_error(name.clone()))
        .map_err(Error::InvalidConfig)?;
        match &mut def {
            OutboundProxyProviderDef::Http(http) => http.name = name,
            OutboundProxyProviderDef::File(file) => file.name = name,
        }
        Ok(def)
    }
}
