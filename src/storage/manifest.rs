//! 目录校验清单
//!
//! 每个目录一份，记录 相对路径 -> SHA-512 摘要，是“已校验/已传输”的权威记录。

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 清单文件名（位于目录内）
pub const MANIFEST_FILE: &str = ".shalist";
/// 单文件校验和的后缀
pub const CHECKSUM_SUFFIX: &str = ".sha512";
/// 编辑器备份/临时文件的后缀
pub const BACKUP_SUFFIX: &str = "~";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn record(&mut self, relative_path: &str, checksum: &str) {
        self.entries
            .insert(relative_path.to_string(), checksum.to_string());
    }

    pub fn get(&self, relative_path: &str) -> Option<&str> {
        self.entries.get(relative_path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 将待写入的条目合并到已持久化的清单上，返回新的完整清单
    pub fn merged_over(&self, mut persisted: Manifest) -> Manifest {
        for (path, checksum) in &self.entries {
            persisted.record(path, checksum);
        }
        persisted.updated_at = Some(Utc::now());
        persisted
    }
}
