use super::{RemoteContainer, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::config::RemoteConfig;
use crate::error::Result;
use opendal::{layers::TimeoutLayer, Operator};
use std::time::Duration;

/// S3 连接参数
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub bucket: String,
    pub prefix: Option<String>,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl S3Options {
    /// 从 `bucket/prefix` 形式的位置解析
    pub fn from_location(location: &str, config: &RemoteConfig) -> Self {
        let location = location.trim_matches('/');
        let (bucket, prefix) = match location.split_once('/') {
            Some((bucket, prefix)) => (bucket, Some(prefix.to_string())),
            None => (location, None),
        };

        Self {
            bucket: bucket.to_string(),
            prefix: prefix.filter(|p| !p.is_empty()),
            region: config.region(),
            endpoint: config.endpoint.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key(),
        }
    }
}

/// 创建 S3 容器
pub fn connect(options: S3Options, config: &RemoteConfig) -> Result<RemoteContainer> {
    use opendal::services::S3;

    let mut builder = S3::default()
        .bucket(&options.bucket)
        .region(&options.region);

    if let Some(ref ep) = options.endpoint {
        builder = builder.endpoint(ep);
    }

    if let Some(ref p) = options.prefix {
        builder = builder.root(p);
    }

    // 未显式提供时由 OpenDAL 从环境变量加载凭据
    if let Some(ref key) = options.access_key {
        builder = builder.access_key_id(key);
    }
    if let Some(ref secret) = options.secret_key {
        builder = builder.secret_access_key(secret);
    }

    // 添加超时层
    let operator = Operator::new(builder)?
        .layer(
            TimeoutLayer::default()
                .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
        )
        .finish();

    let name = format!(
        "s3://{}{}",
        options.bucket,
        options
            .prefix
            .as_deref()
            .map(|p| format!("/{}", p))
            .unwrap_or_default()
    );

    tracing::info!("初始化S3存储: bucket={}, region={}", options.bucket, options.region);
    Ok(RemoteContainer::new(
        operator,
        name,
        options.region,
        config.staging_dir(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parsing() {
        let config = RemoteConfig::default();
        let options = S3Options::from_location("media/archive/2020", &config);
        assert_eq!(options.bucket, "media");
        assert_eq!(options.prefix.as_deref(), Some("archive/2020"));

        let options = S3Options::from_location("media/", &config);
        assert_eq!(options.bucket, "media");
        assert!(options.prefix.is_none());
    }
}
