//! 基于 OpenDAL 的远程对象存储实现

use super::manifest::{Manifest, MANIFEST_FILE};
use super::{checksum, paths, Container, Directory, File, Region, StagedFile};
use crate::error::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::Operator;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 远程容器
pub struct RemoteContainer {
    operator: Operator,
    name: String,
    region: Region,
    staging_dir: PathBuf,
    /// 写入前是否需要逐级创建父目录（WebDAV 需要）
    create_parents: bool,
}

impl RemoteContainer {
    pub fn new(operator: Operator, name: String, region: String, staging_dir: PathBuf) -> Self {
        Self {
            operator,
            name,
            region: Region::Remote(region),
            staging_dir,
            create_parents: false,
        }
    }

    pub fn with_parent_dirs(mut self) -> Self {
        self.create_parents = true;
        self
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }
}

impl Container for RemoteContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn region(&self) -> &Region {
        &self.region
    }

    fn get_directory(&self, path: &str) -> Result<Box<dyn Directory>> {
        paths::validate(path)?;
        Ok(Box::new(RemoteDirectory {
            operator: self.operator.clone(),
            path: path.trim_matches('/').to_string(),
            region: self.region.clone(),
            staging_dir: self.staging_dir.clone(),
            create_parents: self.create_parents,
            pending: Manifest::default(),
        }))
    }
}

pub struct RemoteDirectory {
    operator: Operator,
    path: String,
    region: Region,
    staging_dir: PathBuf,
    create_parents: bool,
    pending: Manifest,
}

impl RemoteDirectory {
    /// 目录在存储中的 key（以 `/` 结尾，根目录为 `/`）
    fn dir_key(&self) -> String {
        if self.path.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", self.path)
        }
    }

    fn manifest_key(&self) -> String {
        paths::join(&self.path, MANIFEST_FILE)
    }
}

#[async_trait]
impl Directory for RemoteDirectory {
    fn path(&self) -> &str {
        &self.path
    }

    fn region(&self) -> &Region {
        &self.region
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut lister = match self.operator.lister(&self.dir_key()).await {
            Ok(lister) => lister,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        // 原样返回后端的 key，由同步引擎负责规范化
        while let Some(entry) = lister.try_next().await? {
            let key = entry.path();
            if key.is_empty() || key == "/" || key == self.dir_key() {
                continue;
            }
            names.push(key.to_string());
        }

        Ok(names)
    }

    fn get_file(&self, name: &str) -> Box<dyn File> {
        let name = name.trim_matches('/').to_string();
        Box::new(RemoteFile {
            operator: self.operator.clone(),
            key: paths::join(&self.path, &name),
            name,
            staging_dir: self.staging_dir.clone(),
            create_parents: self.create_parents,
        })
    }

    fn update_manifest(&mut self, relative_path: &str, checksum: &str) {
        self.pending.record(relative_path, checksum);
    }

    async fn flush_manifest(&mut self) -> Result<()> {
        let merged = self.pending.merged_over(self.load_manifest().await?);
        let key = self.manifest_key();
        if self.create_parents {
            create_parent_dirs(&self.operator, &key).await;
        }
        self.operator.write(&key, merged.to_vec()?).await?;
        debug!("已写入远程校验清单 {} ({} 条)", key, merged.len());
        self.pending = Manifest::default();
        Ok(())
    }

    async fn load_manifest(&self) -> Result<Manifest> {
        match self.operator.read(&self.manifest_key()).await {
            Ok(data) => Manifest::from_slice(&data.to_vec()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 递归创建 key 的所有父目录，忽略已存在等错误
async fn create_parent_dirs(operator: &Operator, key: &str) {
    let parts: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    if parts.len() < 2 {
        return;
    }
    let mut current_path = String::new();
    for part in &parts[..parts.len() - 1] {
        current_path.push_str(part);
        current_path.push('/');
        let _ = operator.create_dir(&current_path).await;
    }
}

pub struct RemoteFile {
    operator: Operator,
    key: String,
    name: String,
    staging_dir: PathBuf,
    create_parents: bool,
}

impl RemoteFile {
    async fn stat(&self) -> Result<Option<opendal::Metadata>> {
        match self.operator.stat(&self.key).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl File for RemoteFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> String {
        self.key.clone()
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.stat().await?.is_some_and(|meta| meta.is_file()))
    }

    async fn is_dir(&self) -> Result<bool> {
        if self.stat().await?.is_some_and(|meta| meta.is_file()) {
            return Ok(false);
        }

        // 对象存储的目录是隐式的：前缀下存在任何对象即视为目录
        let prefix = format!("{}/", self.key);
        match self.operator.lister(&prefix).await {
            Ok(mut lister) => Ok(lister.try_next().await?.is_some()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_symlink(&self) -> Result<bool> {
        Ok(false)
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.operator.stat(&self.key).await?.content_length())
    }

    async fn checksum(&self) -> Result<String> {
        let data = self.operator.read(&self.key).await?;
        Ok(checksum::sha512_bytes(&data.to_vec()))
    }

    async fn fetch(&self) -> Result<StagedFile> {
        let data = self.operator.read(&self.key).await?.to_vec();
        tokio::fs::create_dir_all(&self.staging_dir).await?;

        let staging_dir = self.staging_dir.clone();
        let temp = tokio::task::spawn_blocking(move || -> Result<tempfile::TempPath> {
            let mut file = tempfile::Builder::new()
                .prefix("cloudpush-")
                .suffix(".staged")
                .tempfile_in(&staging_dir)?;
            file.write_all(&data)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await??;

        debug!("已暂存 {} -> {:?}", self.key, &*temp);
        Ok(StagedFile::Temporary(temp))
    }

    async fn store(&self, local_path: &Path) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        if self.create_parents {
            create_parent_dirs(&self.operator, &self.key).await;
        }
        self.operator.write(&self.key, data).await?;
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        self.operator.delete(&self.key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_container(staging: &Path) -> RemoteContainer {
        let operator = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        RemoteContainer::new(
            operator,
            "memory://test".to_string(),
            "test-region".to_string(),
            staging.to_path_buf(),
        )
    }

    #[tokio::test]
    async fn test_list_returns_backend_keys() {
        let staging = tempfile::tempdir().unwrap();
        let container = memory_container(staging.path());
        let op = container.operator().clone();
        op.write("photos/a.jpg", b"a".to_vec()).await.unwrap();
        op.write("photos/trip/b.jpg", b"b".to_vec()).await.unwrap();

        let dir = container.get_directory("photos").unwrap();
        let mut names: Vec<String> = dir
            .list()
            .await
            .unwrap()
            .iter()
            .map(|raw| paths::canonicalize_entry(dir.path(), raw))
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.jpg", "trip"]);

        assert!(dir.get_file("trip").is_dir().await.unwrap());
        assert!(!dir.get_file("a.jpg").is_dir().await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_stages_a_temporary_copy() {
        let staging = tempfile::tempdir().unwrap();
        let container = memory_container(staging.path());
        container
            .operator()
            .write("a.txt", b"abc".to_vec())
            .await
            .unwrap();

        let file = container.get_directory("").unwrap().get_file("a.txt");
        assert!(file.exists().await.unwrap());
        assert_eq!(file.size().await.unwrap(), 3);
        assert_eq!(file.checksum().await.unwrap(), checksum::sha512_bytes(b"abc"));

        let staged = file.fetch().await.unwrap();
        assert!(staged.is_copy());
        let staged_path = staged.path().to_path_buf();
        assert_eq!(std::fs::read(&staged_path).unwrap(), b"abc");

        staged.close().unwrap();
        assert!(!staged_path.exists());
    }

    #[tokio::test]
    async fn test_store_and_manifest_roundtrip() {
        let staging = tempfile::tempdir().unwrap();
        let container = memory_container(staging.path());
        let local = staging.path().join("upload.txt");
        std::fs::write(&local, b"payload").unwrap();

        let mut dir = container.get_directory("backup").unwrap();
        let file = dir.get_file("upload.txt");
        file.store(&local).await.unwrap();
        assert_eq!(
            container.operator().read("backup/upload.txt").await.unwrap().to_vec(),
            b"payload"
        );

        dir.update_manifest("upload.txt", "digest");
        dir.flush_manifest().await.unwrap();
        let manifest = dir.load_manifest().await.unwrap();
        assert_eq!(manifest.get("upload.txt"), Some("digest"));

        file.remove().await.unwrap();
        assert!(!file.exists().await.unwrap());
    }
}
