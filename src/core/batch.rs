//! 待写入的校验和批次
//!
//! 作用域为单个目录：传输成功的文件先进入批次，达到条数上限或遇到大文件时
//! 立即写入目标目录的清单，目录处理结束时再做一次收尾写入。

use std::collections::BTreeMap;

#[derive(Debug)]
pub struct ChecksumBatch {
    /// 目标相对路径 -> 校验和
    entries: BTreeMap<String, String>,
    limit: usize,
    size_threshold: u64,
    /// 本目录是否记录过传输
    recorded: bool,
}

impl ChecksumBatch {
    pub fn new(limit: usize, size_threshold: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            limit,
            size_threshold,
            recorded: false,
        }
    }

    pub fn record(&mut self, relative_path: &str, checksum: &str) {
        self.entries
            .insert(relative_path.to_string(), checksum.to_string());
        self.recorded = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 刚传输完 `last_size` 字节的文件后是否需要立即写入
    pub fn should_flush(&self, last_size: u64) -> bool {
        self.entries.len() > self.limit || last_size > self.size_threshold
    }

    /// 目录结束时是否需要收尾写入
    pub fn needs_trailing_flush(&self) -> bool {
        self.recorded || !self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_flush_after_limit_exceeded() {
        let mut batch = ChecksumBatch::new(20, MIB);
        for i in 0..20 {
            batch.record(&format!("f{}.txt", i), "sum");
            assert!(!batch.should_flush(10));
        }
        batch.record("f20.txt", "sum");
        assert!(batch.should_flush(10));
    }

    #[test]
    fn test_large_file_flushes_immediately() {
        let mut batch = ChecksumBatch::new(20, MIB);
        batch.record("big.iso", "sum");
        assert!(!batch.should_flush(MIB));
        assert!(batch.should_flush(MIB + 1));
    }

    #[test]
    fn test_trailing_flush_tracks_recorded_entries() {
        let mut batch = ChecksumBatch::new(20, MIB);
        assert!(!batch.needs_trailing_flush());

        batch.record("a.txt", "sum");
        batch.clear();
        assert!(batch.is_empty());
        assert!(batch.needs_trailing_flush());
    }
}
