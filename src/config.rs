//! 应用配置模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 关闭校验和比对的环境变量
pub const NO_CHECKSUM_ENV: &str = "PUSH_NO_CHECKSUM";
/// 远程存储密钥的环境变量
pub const REMOTE_SECRET_ENV: &str = "PUSH_REMOTE_SECRET";
/// 配置目录的环境变量
pub const CONFIG_DIR_ENV: &str = "PUSH_CONFIG_DIR";

const DEFAULT_REGION: &str = "us-east-1";

/// 远程存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// 远程文件暂存目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

impl RemoteConfig {
    /// 从配置文件加载远程存储配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "remote").unwrap_or_default()
    }

    pub fn region(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// 密钥优先取配置文件，其次取环境变量
    pub fn secret_key(&self) -> Option<String> {
        self.secret_key
            .clone()
            .or_else(|| std::env::var(REMOTE_SECRET_ENV).ok())
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(|| {
            crate::dirs::cache_dir()
                .map(|p| p.join("cloudpush").join("staging"))
                .unwrap_or_else(|| std::env::temp_dir().join("cloudpush-staging"))
        })
    }
}

/// 读取 config.json 中的某个配置段，文件不存在或格式错误时返回 None
pub fn load_section<T: serde::de::DeserializeOwned>(config_dir: &Path, key: &str) -> Option<T> {
    let content = fs::read_to_string(config_dir.join("config.json")).ok()?;
    let config = serde_json::from_str::<serde_json::Value>(&content).ok()?;
    let section = config.get(key)?;
    match serde_json::from_value::<T>(section.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("配置段 {} 格式错误，使用默认值: {}", key, e);
            None
        }
    }
}

/// 配置目录：显式指定 > 环境变量 > 平台默认目录
pub fn config_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| {
            crate::dirs::config_dir()
                .map(|p| p.join("cloudpush"))
                .unwrap_or_else(|| PathBuf::from(".cloudpush"))
        })
}

/// 仅当值恰好为 `1` 时启用覆盖
pub fn is_override_enabled(value: Option<&str>) -> bool {
    value.map(str::trim) == Some("1")
}

/// 是否通过环境变量关闭了校验和比对
pub fn checksum_disabled() -> bool {
    is_override_enabled(std::env::var(NO_CHECKSUM_ENV).ok().as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_requires_literal_one() {
        assert!(is_override_enabled(Some("1")));
        assert!(is_override_enabled(Some(" 1\n")));
        assert!(!is_override_enabled(Some("0")));
        assert!(!is_override_enabled(Some("true")));
        assert!(!is_override_enabled(Some("")));
        assert!(!is_override_enabled(None));
    }

    #[test]
    fn test_load_remote_section() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"remote":{"region":"ap-east-1","accessKey":"AK","stagingDir":"/var/tmp/push"},"log":{"level":"debug"}}"#,
        )
        .unwrap();

        let config = RemoteConfig::load(dir.path());
        assert_eq!(config.region(), "ap-east-1");
        assert_eq!(config.access_key.as_deref(), Some("AK"));
        assert_eq!(config.staging_dir(), PathBuf::from("/var/tmp/push"));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RemoteConfig::load(dir.path());
        assert_eq!(config.region(), DEFAULT_REGION);
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_explicit_config_dir_wins() {
        let explicit = PathBuf::from("/etc/cloudpush");
        assert_eq!(config_dir(Some(explicit.clone())), explicit);
    }
}
