use super::{RemoteContainer, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::config::RemoteConfig;
use crate::error::Result;
use opendal::{layers::TimeoutLayer, Operator};
use std::time::Duration;

/// WebDAV 连接参数
#[derive(Debug, Clone, Default)]
pub struct WebDavOptions {
    pub endpoint: String,
    pub root: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl WebDavOptions {
    /// 从 `host[:port]/root` 形式的位置解析，`secure` 决定使用 https 还是 http
    pub fn from_location(location: &str, secure: bool, config: &RemoteConfig) -> Self {
        let location = location.trim_matches('/');
        let (host, root) = match location.split_once('/') {
            Some((host, root)) => (host, Some(root.to_string())),
            None => (location, None),
        };
        let scheme = if secure { "https" } else { "http" };

        Self {
            endpoint: format!("{}://{}", scheme, host),
            root: root.filter(|r| !r.is_empty()),
            username: config.access_key.clone(),
            password: config.secret_key(),
        }
    }
}

/// 创建 WebDAV 容器
pub async fn connect(options: WebDavOptions, config: &RemoteConfig) -> Result<RemoteContainer> {
    use opendal::services::Webdav;

    let mut builder = Webdav::default().endpoint(&options.endpoint);

    if let Some(ref user) = options.username {
        builder = builder.username(user);
    }
    if let Some(ref password) = options.password {
        builder = builder.password(password);
    }
    if let Some(ref r) = options.root {
        builder = builder.root(r);
    }

    let operator = Operator::new(builder)?
        .layer(
            TimeoutLayer::default()
                .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
        )
        .finish();

    let name = format!(
        "webdav://{}{}",
        options
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/'),
        options
            .root
            .as_deref()
            .map(|r| format!("/{}", r.trim_start_matches('/')))
            .unwrap_or_default()
    );

    // 尝试创建根目录（某些 WebDAV 服务器需要）
    // 忽略错误，目录可能已存在或不需要创建
    let _ = operator.create_dir("/").await;

    tracing::info!("创建WebDAV存储: endpoint={}, root={:?}", options.endpoint, options.root);
    Ok(RemoteContainer::new(operator, name, "webdav".to_string(), config.staging_dir())
        .with_parent_dirs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parsing() {
        let config = RemoteConfig::default();
        let options = WebDavOptions::from_location("dav.example.com:8443/backups/home", true, &config);
        assert_eq!(options.endpoint, "https://dav.example.com:8443");
        assert_eq!(options.root.as_deref(), Some("backups/home"));

        let options = WebDavOptions::from_location("nas.local", false, &config);
        assert_eq!(options.endpoint, "http://nas.local");
        assert!(options.root.is_none());
    }
}
