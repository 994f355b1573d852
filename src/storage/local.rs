use super::manifest::{Manifest, MANIFEST_FILE};
use super::{checksum, paths, Container, Directory, File, Region, StagedFile};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 写入过程中使用的临时后缀（以 `~` 结尾，同步时会被跳过）
const PARTIAL_SUFFIX: &str = ".partial~";

/// 本地文件系统容器
pub struct LocalContainer {
    base_path: PathBuf,
    name: String,
    region: Region,
}

impl LocalContainer {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let base_path = path.as_ref().to_path_buf();
        let name = format!("file://{}", base_path.display());
        Self {
            base_path,
            name,
            region: Region::Local,
        }
    }
}

impl Container for LocalContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn region(&self) -> &Region {
        &self.region
    }

    fn get_directory(&self, path: &str) -> Result<Box<dyn Directory>> {
        paths::validate(path)?;
        let path = path.trim_matches('/').to_string();
        let full_path = resolve_path(&self.base_path, &path);
        Ok(Box::new(LocalDirectory {
            full_path,
            path,
            region: self.region.clone(),
            pending: Manifest::default(),
        }))
    }
}

fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_path_buf()
    } else {
        base.join(path)
    }
}

/// 写入临时文件后原子重命名
async fn write_atomically(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    let temp_path = partial_path(target);
    fs::write(&temp_path, data).await?;
    fs::rename(&temp_path, target).await?;
    Ok(())
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

pub struct LocalDirectory {
    full_path: PathBuf,
    path: String,
    region: Region,
    pending: Manifest,
}

impl LocalDirectory {
    fn manifest_path(&self) -> PathBuf {
        self.full_path.join(MANIFEST_FILE)
    }
}

#[async_trait]
impl Directory for LocalDirectory {
    fn path(&self) -> &str {
        &self.path
    }

    fn region(&self) -> &Region {
        &self.region
    }

    async fn list(&self) -> Result<Vec<String>> {
        let base = self.full_path.clone();
        if !fs::try_exists(&base).await? {
            return Ok(Vec::new());
        }

        // 使用 spawn_blocking 避免阻塞 async runtime
        let names = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut names = Vec::new();
            for entry in WalkDir::new(&base)
                .min_depth(1)
                .max_depth(1)
                .follow_links(false)
                .sort_by_file_name()
            {
                let entry = entry.map_err(std::io::Error::from)?;
                match entry.file_name().to_str() {
                    Some(name) => names.push(name.to_string()),
                    None => warn!("跳过非 UTF-8 文件名: {:?}", entry.path()),
                }
            }
            Ok(names)
        })
        .await??;

        Ok(names)
    }

    fn get_file(&self, name: &str) -> Box<dyn File> {
        let name = name.trim_matches('/').to_string();
        Box::new(LocalFile {
            full_path: self.full_path.join(&name),
            name,
        })
    }

    fn update_manifest(&mut self, relative_path: &str, checksum: &str) {
        self.pending.record(relative_path, checksum);
    }

    async fn flush_manifest(&mut self) -> Result<()> {
        let merged = self.pending.merged_over(self.load_manifest().await?);
        write_atomically(&self.manifest_path(), &merged.to_vec()?).await?;
        debug!(
            "已写入校验清单 {:?} ({} 条)",
            self.manifest_path(),
            merged.len()
        );
        self.pending = Manifest::default();
        Ok(())
    }

    async fn load_manifest(&self) -> Result<Manifest> {
        match fs::read(self.manifest_path()).await {
            Ok(data) => Manifest::from_slice(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct LocalFile {
    full_path: PathBuf,
    name: String,
}

impl LocalFile {
    async fn metadata(&self) -> Result<Option<std::fs::Metadata>> {
        match fs::symlink_metadata(&self.full_path).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl File for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> String {
        self.full_path.display().to_string()
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.metadata().await?.is_some())
    }

    async fn is_dir(&self) -> Result<bool> {
        Ok(self.metadata().await?.is_some_and(|m| m.is_dir()))
    }

    async fn is_symlink(&self) -> Result<bool> {
        Ok(self.metadata().await?.is_some_and(|m| m.file_type().is_symlink()))
    }

    async fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.full_path).await?.len())
    }

    async fn checksum(&self) -> Result<String> {
        checksum::sha512_file(self.full_path.clone()).await
    }

    async fn fetch(&self) -> Result<StagedFile> {
        Ok(StagedFile::Original(self.full_path.clone()))
    }

    async fn store(&self, local_path: &Path) -> Result<()> {
        if let Some(parent) = self.full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = partial_path(&self.full_path);
        fs::copy(local_path, &temp_path).await?;
        fs::rename(&temp_path, &self.full_path).await?;
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        fs::remove_file(&self.full_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, LocalContainer) {
        let dir = tempfile::tempdir().unwrap();
        let container = LocalContainer::new(dir.path());
        (dir, container)
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_shallow() {
        let (dir, container) = fixture();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/c.txt"), b"c").unwrap();

        let root = container.get_directory("").unwrap();
        assert_eq!(root.list().await.unwrap(), vec!["a.txt", "b.txt", "sub"]);

        let sub = container.get_directory("sub").unwrap();
        assert_eq!(sub.list().await.unwrap(), vec!["c.txt", "deeper"]);
    }

    #[tokio::test]
    async fn test_missing_directory_lists_empty() {
        let (_dir, container) = fixture();
        let missing = container.get_directory("not/there").unwrap();
        assert!(missing.list().await.unwrap().is_empty());
    }

    #[test]
    fn test_malformed_path_rejected() {
        let (_dir, container) = fixture();
        assert!(container.get_directory("../escape").is_err());
    }

    #[tokio::test]
    async fn test_file_attributes_reflect_current_state() {
        let (dir, container) = fixture();
        let root = container.get_directory("").unwrap();
        let file = root.get_file("data.bin");

        assert!(!file.exists().await.unwrap());

        std::fs::write(dir.path().join("data.bin"), b"abc").unwrap();
        assert!(file.exists().await.unwrap());
        assert!(!file.is_dir().await.unwrap());
        assert!(!file.is_symlink().await.unwrap());
        assert_eq!(file.size().await.unwrap(), 3);
        let first = file.checksum().await.unwrap();

        std::fs::write(dir.path().join("data.bin"), b"abcd").unwrap();
        assert_eq!(file.size().await.unwrap(), 4);
        assert_ne!(file.checksum().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_fetch_returns_original_path() {
        let (dir, container) = fixture();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let staged = container
            .get_directory("")
            .unwrap()
            .get_file("a.txt")
            .fetch()
            .await
            .unwrap();

        assert!(!staged.is_copy());
        assert_eq!(staged.path(), dir.path().join("a.txt"));
        staged.close().unwrap();
        assert!(dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_store_creates_parents_and_overwrites() {
        let (dir, container) = fixture();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, b"first").unwrap();

        let target = container.get_directory("x/y").unwrap().get_file("out.txt");
        target.store(&src).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("x/y/out.txt")).unwrap(), b"first");

        std::fs::write(&src, b"second").unwrap();
        target.store(&src).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("x/y/out.txt")).unwrap(), b"second");
        assert!(!dir.path().join("x/y/out.txt.partial~").exists());
    }

    #[tokio::test]
    async fn test_manifest_flush_merges_with_persisted() {
        let (dir, container) = fixture();

        let mut first = container.get_directory("docs").unwrap();
        first.update_manifest("a.txt", "aaa");
        first.flush_manifest().await.unwrap();

        let mut second = container.get_directory("docs").unwrap();
        second.update_manifest("b.txt", "bbb");
        assert_eq!(second.load_manifest().await.unwrap().len(), 1);
        second.flush_manifest().await.unwrap();

        let manifest = second.load_manifest().await.unwrap();
        assert_eq!(manifest.get("a.txt"), Some("aaa"));
        assert_eq!(manifest.get("b.txt"), Some("bbb"));
        assert!(dir.path().join("docs").join(MANIFEST_FILE).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_detected() {
        let (dir, container) = fixture();
        std::fs::write(dir.path().join("target.txt"), b"t").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("link.txt"))
            .unwrap();

        let link = container.get_directory("").unwrap().get_file("link.txt");
        assert!(link.is_symlink().await.unwrap());
        assert!(!link.is_dir().await.unwrap());
    }
}
