use crate::core::batch::ChecksumBatch;
use crate::core::entry::{reserved_suffix, EntryOutcome, SkipReason};
use crate::core::report::{format_size, SyncReport};
use crate::error::{PushError, Result};
use crate::storage::{checksum, paths, Container, Directory, File};
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 单个文件的最大尝试次数
    pub max_attempts: u32,
    /// 批次中超过此条数时立即写入清单
    pub batch_limit: usize,
    /// 单个文件超过此大小（字节）时立即写入清单
    pub flush_size_threshold: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            batch_limit: 20,
            flush_size_threshold: 1024 * 1024, // 1MB
        }
    }
}

/// 单次同步的选项
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// 作用于文件完整逻辑路径的过滤表达式
    pub filter: Regex,
    /// 同步成功后删除源文件
    pub delete_source: bool,
    /// 目标已存在时是否比对校验和
    pub verify_checksums: bool,
}

impl SyncOptions {
    pub fn new(filter: &str) -> Result<Self> {
        Ok(Self {
            filter: Regex::new(filter)?,
            delete_source: false,
            verify_checksums: true,
        })
    }

    pub fn with_delete_source(mut self, delete_source: bool) -> Self {
        self.delete_source = delete_source;
        self
    }

    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}

/// 条目分类
enum Classification {
    Directory,
    Skip(SkipReason),
    Candidate,
}

/// 同步引擎
///
/// 单线程深度优先遍历源目录树：目录内按列表顺序处理，子目录处理完毕后才继续
/// 其后的兄弟条目。
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self { config }
    }

    /// 将 `start_path` 下的目录树从源同步到目标
    pub async fn sync(
        &self,
        source: &dyn Container,
        destination: &dyn Container,
        start_path: &str,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new();

        info!(
            "开始同步: {} -> {} (run {})",
            source.name(),
            destination.name(),
            report.run_id
        );
        if !options.verify_checksums {
            info!("已关闭校验和比对，目标已存在的文件将直接跳过");
        }

        self.sync_directory(
            source,
            destination,
            start_path.trim_matches('/').to_string(),
            options,
            &mut report,
        )
        .await?;

        report.finish();
        info!(
            "同步完成: 检查 {}, 传输 {}, 一致 {}, 不一致 {}, 跳过 {}, 失败 {}",
            report.files_considered,
            report.files_transferred,
            report.files_verified,
            report.files_mismatched,
            report.files_skipped,
            report.files_failed
        );

        Ok(report)
    }

    fn sync_directory<'a>(
        &'a self,
        source: &'a dyn Container,
        destination: &'a dyn Container,
        path: String,
        options: &'a SyncOptions,
        report: &'a mut SyncReport,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            info!("同步目录 /{}", path);
            let source_dir = source.get_directory(&path)?;
            let mut dest_dir = destination.get_directory(&path)?;

            let entries = match source_dir.list().await {
                Ok(entries) => entries,
                Err(e) if e.is_retryable() => {
                    error!("列出目录失败 /{}: {}", path, e);
                    report.record_failure(&path, e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let mut batch =
                ChecksumBatch::new(self.config.batch_limit, self.config.flush_size_threshold);

            for raw in entries {
                let name = if source_dir.region().is_local() {
                    raw
                } else {
                    paths::canonicalize_entry(source_dir.path(), &raw)
                };
                if name.is_empty() {
                    continue;
                }

                let full_path = paths::join(&path, &name);
                let source_file = source_dir.get_file(&name);

                match self
                    .classify(source_file.as_ref(), &name, &full_path, options)
                    .await
                {
                    Ok(Classification::Directory) => {
                        // 子目录名无法构成逻辑路径时只跳过该目录
                        match self
                            .sync_directory(source, destination, full_path.clone(), options, report)
                            .await
                        {
                            Ok(()) => {}
                            Err(e @ PushError::InvalidPath(_)) => {
                                error!("跳过无法同步的目录 {}: {}", full_path, e);
                                report.record_failure(&full_path, e);
                            }
                            Err(e) => return Err(e),
                        }
                        continue;
                    }
                    Ok(Classification::Skip(reason)) => {
                        debug!("跳过 {} ({})", full_path, reason);
                        report.record_outcome(&full_path, &EntryOutcome::Skipped(reason));
                        continue;
                    }
                    Ok(Classification::Candidate) => {}
                    Err(e) if e.is_retryable() => {
                        error!("读取文件属性失败 {}: {}", full_path, e);
                        report.record_failure(&full_path, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }

                report.files_considered += 1;
                let dest_file = dest_dir.get_file(&name);
                let outcome = self
                    .process_file(
                        source_file.as_ref(),
                        dest_file.as_ref(),
                        &full_path,
                        options,
                        report,
                    )
                    .await?;

                if let EntryOutcome::Transferred { checksum, .. } = &outcome {
                    batch.record(dest_file.name(), checksum);
                    debug!("有 {} 条待写入的校验和", batch.len());
                }

                if options.delete_source && outcome.permits_source_removal() {
                    self.remove_source(source_file.as_ref(), &full_path, report)
                        .await;
                }

                report.record_outcome(&full_path, &outcome);

                if let EntryOutcome::Transferred { bytes, .. } = &outcome {
                    info!(
                        "累计上传 {}, 已存储 {}",
                        format_size(report.bytes_uploaded),
                        format_size(report.bytes_stored)
                    );
                    if batch.should_flush(*bytes) {
                        self.flush_batch(dest_dir.as_mut(), &mut batch, report)
                            .await?;
                    }
                }
            }

            if batch.needs_trailing_flush() {
                self.flush_batch(dest_dir.as_mut(), &mut batch, report)
                    .await?;
            }

            Ok(())
        }
        .boxed()
    }

    async fn classify(
        &self,
        file: &dyn File,
        name: &str,
        full_path: &str,
        options: &SyncOptions,
    ) -> Result<Classification> {
        if self
            .retry(full_path, "检查符号链接", move || file.is_symlink())
            .await?
        {
            return Ok(Classification::Skip(SkipReason::Symlink));
        }

        if self
            .retry(full_path, "检查目录", move || file.is_dir())
            .await?
        {
            return Ok(Classification::Directory);
        }

        if let Some(suffix) = reserved_suffix(name) {
            return Ok(Classification::Skip(SkipReason::Reserved(suffix)));
        }

        info!("检查 {}", full_path);
        if !options.filter.is_match(full_path) {
            return Ok(Classification::Skip(SkipReason::Filtered));
        }

        Ok(Classification::Candidate)
    }

    /// 处理一个通过过滤的文件，可重试的错误耗尽后转为放弃
    async fn process_file(
        &self,
        source_file: &dyn File,
        dest_file: &dyn File,
        full_path: &str,
        options: &SyncOptions,
        report: &mut SyncReport,
    ) -> Result<EntryOutcome> {
        match self
            .decide(source_file, dest_file, full_path, options, report)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_retryable() => {
                error!("同步失败 {}: {}", full_path, e);
                Ok(EntryOutcome::Abandoned {
                    error: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn decide(
        &self,
        source_file: &dyn File,
        dest_file: &dyn File,
        full_path: &str,
        options: &SyncOptions,
        report: &mut SyncReport,
    ) -> Result<EntryOutcome> {
        let exists = self
            .retry(full_path, "检查目标文件", move || dest_file.exists())
            .await?;

        if exists {
            if !options.verify_checksums {
                info!("... 跳过校验和比对");
                self.count_present(dest_file, report).await;
                return Ok(EntryOutcome::Skipped(SkipReason::AlreadyPresent));
            }

            let source_sum = self
                .retry(full_path, "计算源校验和", move || source_file.checksum())
                .await?;
            let dest_sum = self
                .retry(full_path, "计算目标校验和", move || dest_file.checksum())
                .await?;

            if source_sum == dest_sum {
                debug!("校验和一致 {}", full_path);
                self.count_present(dest_file, report).await;
                return Ok(EntryOutcome::Verified);
            }

            warn!(
                "{} 的校验和不一致! ({} vs {})",
                full_path, source_sum, dest_sum
            );
            return Ok(EntryOutcome::Mismatch {
                source: source_sum,
                destination: dest_sum,
            });
        }

        self.transfer(source_file, dest_file, full_path).await
    }

    /// 带重试的传输，最多尝试 `max_attempts` 次，无退避
    async fn transfer(
        &self,
        source_file: &dyn File,
        dest_file: &dyn File,
        full_path: &str,
    ) -> Result<EntryOutcome> {
        let max_attempts = self.config.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.transfer_once(source_file, dest_file, full_path).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "同步失败 {} (第 {}/{} 次): {}",
                        full_path, attempt, max_attempts, e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let error = last_error.map(|e| e.to_string()).unwrap_or_default();
        error!("放弃同步 {} (已尝试 {} 次): {}", full_path, max_attempts, error);
        Ok(EntryOutcome::Abandoned { error })
    }

    /// 单次传输尝试；出错时暂存副本随 `StagedFile` 丢弃而删除
    async fn transfer_once(
        &self,
        source_file: &dyn File,
        dest_file: &dyn File,
        full_path: &str,
    ) -> Result<EntryOutcome> {
        let staged = source_file.fetch().await?;
        if staged.is_copy() {
            info!("已从远程位置拉取 {}", full_path);
        }

        let size = tokio::fs::metadata(staged.path()).await?.len();
        let digest = checksum::sha512_file(staged.path().to_path_buf()).await?;

        info!("传输 {} ({})", full_path, format_size(size));
        let started = Instant::now();
        dest_file.store(staged.path()).await?;

        if let Err(e) = staged.close() {
            warn!("清理暂存文件失败 {}: {}", full_path, e);
        }

        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            (size as f64 / elapsed) as u64
        } else {
            size
        };
        info!(
            "已上传 {} ({}), {}/s",
            full_path,
            format_size(size),
            format_size(rate)
        );

        Ok(EntryOutcome::Transferred {
            bytes: size,
            checksum: digest,
        })
    }

    /// 对文件属性读取等操作重试，非可重试错误直接返回
    async fn retry<'f, T, F>(&self, full_path: &str, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> BoxFuture<'f, Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(
                        "{}失败 {} (第 {}/{} 次): {}",
                        what, full_path, attempt, self.config.max_attempts, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn count_present(&self, dest_file: &dyn File, report: &mut SyncReport) {
        match dest_file.size().await {
            Ok(size) => report.bytes_stored += size,
            Err(e) => debug!("读取目标文件大小失败 {}: {}", dest_file.location(), e),
        }
    }

    async fn remove_source(&self, source_file: &dyn File, full_path: &str, report: &mut SyncReport) {
        info!("... 清理源文件 {}", full_path);
        match source_file.remove().await {
            Ok(()) => report.files_deleted += 1,
            Err(e) => {
                error!("删除源文件失败 {}: {}", full_path, e);
                report.errors.push(format!("{}: 删除源文件失败: {}", full_path, e));
            }
        }
    }

    /// 将批次写入目标目录的清单并持久化，成功后清空批次
    async fn flush_batch(
        &self,
        dest_dir: &mut dyn Directory,
        batch: &mut ChecksumBatch,
        report: &mut SyncReport,
    ) -> Result<()> {
        info!("写入 {} 条待处理的校验和 /{}", batch.len(), dest_dir.path());
        for (path, checksum) in batch.entries() {
            dest_dir.update_manifest(path, checksum);
        }

        let mut attempt = 1;
        loop {
            match dest_dir.flush_manifest().await {
                Ok(()) => break,
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(
                        "写入校验清单失败 /{} (第 {}/{} 次): {}",
                        dest_dir.path(),
                        attempt,
                        self.config.max_attempts,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => {
                    error!("写入校验清单失败 /{}: {}", dest_dir.path(), e);
                    return Err(e);
                }
            }
        }

        batch.clear();
        report.manifest_flushes += 1;
        Ok(())
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}
