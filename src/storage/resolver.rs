//! 根据地址格式选择存储实现

use super::s3::{self, S3Options};
use super::webdav::{self, WebDavOptions};
use super::{Container, LocalContainer};
use crate::config::RemoteConfig;
use crate::error::{PushError, Result};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::info;

const LOCAL_PREFIX: &str = "file://";

static REMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z][a-z0-9]*)://(.*)$").expect("valid remote pattern")
});
static CREDENTIALED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]+)@([a-z][a-z0-9_]*)://(.*)$").expect("valid credentialed pattern")
});

/// 解析后的存储地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `file://<path>`
    Local(String),
    /// `<scheme>://<location>`
    Remote { scheme: String, location: String },
    /// `<user>@<scheme>://<location>`
    Credentialed {
        user: String,
        scheme: String,
        location: String,
    },
}

/// 是否有对应 scheme 的驱动
fn has_driver(scheme: &str) -> bool {
    matches!(scheme, "s3" | "webdav" | "dav")
}

/// 按固定优先级匹配地址格式，第一个匹配且驱动可用的格式胜出
pub fn parse_endpoint(url: &str) -> Option<Endpoint> {
    if let Some(path) = url.strip_prefix(LOCAL_PREFIX) {
        return Some(Endpoint::Local(path.to_string()));
    }

    if let Some(caps) = REMOTE_RE.captures(url) {
        if has_driver(&caps[1]) {
            return Some(Endpoint::Remote {
                scheme: caps[1].to_string(),
                location: caps[2].to_string(),
            });
        }
    }

    if let Some(caps) = CREDENTIALED_RE.captures(url) {
        if has_driver(&caps[2]) {
            let user = urlencoding::decode(&caps[1])
                .map(|u| u.into_owned())
                .unwrap_or_else(|_| caps[1].to_string());
            return Some(Endpoint::Credentialed {
                user,
                scheme: caps[2].to_string(),
                location: caps[3].to_string(),
            });
        }
    }

    None
}

/// 将地址解析为存储容器
pub async fn resolve(url: &str, config: &RemoteConfig) -> Result<Arc<dyn Container>> {
    let endpoint =
        parse_endpoint(url).ok_or_else(|| PushError::UnknownEndpoint(url.to_string()))?;

    let container: Arc<dyn Container> = match endpoint {
        Endpoint::Local(path) => {
            info!("初始化本地存储: {}", path);
            Arc::new(LocalContainer::new(path))
        }
        Endpoint::Remote { scheme, location } => connect(&scheme, &location, config).await?,
        Endpoint::Credentialed {
            user,
            scheme,
            location,
        } => {
            let config = RemoteConfig {
                access_key: Some(user),
                ..config.clone()
            };
            connect(&scheme, &location, &config).await?
        }
    };

    Ok(container)
}

async fn connect(scheme: &str, location: &str, config: &RemoteConfig) -> Result<Arc<dyn Container>> {
    match scheme {
        "s3" => Ok(Arc::new(s3::connect(
            S3Options::from_location(location, config),
            config,
        )?)),
        "webdav" | "dav" => Ok(Arc::new(
            webdav::connect(
                WebDavOptions::from_location(location, scheme == "webdav", config),
                config,
            )
            .await?,
        )),
        _ => Err(PushError::UnknownEndpoint(format!("{}://{}", scheme, location))),
    }
}
