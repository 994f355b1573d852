pub mod checksum;
pub mod local;
pub mod manifest;
pub mod paths;
pub mod remote;
pub mod resolver;
pub mod s3;
pub mod webdav;

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

pub use local::LocalContainer;
pub use manifest::Manifest;
pub use remote::RemoteContainer;
pub use resolver::{parse_endpoint, resolve, Endpoint};

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 存储所在区域：本地文件系统或某个远程区域
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Region {
    Local,
    Remote(String),
}

impl Region {
    pub fn is_local(&self) -> bool {
        matches!(self, Region::Local)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Local => write!(f, "local"),
            Region::Remote(region) => write!(f, "{}", region),
        }
    }
}

/// 取回到本地的文件内容
///
/// 本地文件直接指向原文件；远程文件则是暂存目录中的临时副本，
/// 关闭或丢弃时自动删除。
#[derive(Debug)]
pub enum StagedFile {
    Original(PathBuf),
    Temporary(TempPath),
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        match self {
            StagedFile::Original(path) => path.as_path(),
            StagedFile::Temporary(temp) => &**temp,
        }
    }

    /// 是否为需要清理的临时副本
    pub fn is_copy(&self) -> bool {
        matches!(self, StagedFile::Temporary(_))
    }

    /// 清理临时副本（原文件不受影响）
    pub fn close(self) -> Result<()> {
        if let StagedFile::Temporary(temp) = self {
            temp.close()?;
        }
        Ok(())
    }
}

/// 存储端点（本地目录或远程容器）
pub trait Container: Send + Sync {
    /// 存储名称（用于日志）
    fn name(&self) -> &str;

    fn region(&self) -> &Region;

    /// 获取目录句柄（惰性，不检查内容是否存在）
    fn get_directory(&self, path: &str) -> Result<Box<dyn Directory>>;
}

/// 容器内的逻辑目录，持有该目录的校验清单
#[async_trait]
pub trait Directory: Send + Sync {
    /// 相对于容器根目录的逻辑路径（根目录为空串）
    fn path(&self) -> &str;

    fn region(&self) -> &Region;

    /// 列出目录下的条目名（文件、子目录、符号链接）
    async fn list(&self) -> Result<Vec<String>>;

    /// 获取目录内文件的句柄
    fn get_file(&self, name: &str) -> Box<dyn File>;

    /// 在内存清单中记录一条校验和（不持久化）
    fn update_manifest(&mut self, relative_path: &str, checksum: &str);

    /// 将完整清单持久化到存储
    async fn flush_manifest(&mut self) -> Result<()>;

    /// 读取已持久化的清单
    async fn load_manifest(&self) -> Result<Manifest>;
}

/// 文件句柄：只是视图，每次读取属性都反映存储的当前状态
#[async_trait]
pub trait File: Send + Sync {
    /// 目录内的相对名称
    fn name(&self) -> &str;

    /// 完整位置（用于日志）
    fn location(&self) -> String;

    async fn exists(&self) -> Result<bool>;

    async fn is_dir(&self) -> Result<bool>;

    async fn is_symlink(&self) -> Result<bool>;

    async fn size(&self) -> Result<u64>;

    /// 根据当前内容计算 SHA-512
    async fn checksum(&self) -> Result<String>;

    /// 将内容取到本地文件系统
    async fn fetch(&self) -> Result<StagedFile>;

    /// 将本地文件写入该位置（不存在则创建，存在则覆盖）
    async fn store(&self, local_path: &Path) -> Result<()>;

    async fn remove(&self) -> Result<()>;
}
