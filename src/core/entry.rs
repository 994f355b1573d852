use crate::storage::manifest::{BACKUP_SUFFIX, CHECKSUM_SUFFIX, MANIFEST_FILE};
use std::fmt;

/// 跳过原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// 符号链接
    Symlink,
    /// 校验文件、清单文件或备份文件
    Reserved(&'static str),
    /// 未通过过滤表达式
    Filtered,
    /// 目标已存在（关闭校验模式）
    AlreadyPresent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Symlink => write!(f, "符号链接"),
            SkipReason::Reserved(suffix) => write!(f, "保留后缀 {}", suffix),
            SkipReason::Filtered => write!(f, "未通过过滤"),
            SkipReason::AlreadyPresent => write!(f, "目标已存在，跳过校验"),
        }
    }
}

/// 单个条目的最终状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Skipped(SkipReason),
    /// 两端校验和一致，视为已同步
    Verified,
    /// 两端校验和不一致，仅告警
    Mismatch { source: String, destination: String },
    /// 传输成功
    Transferred { bytes: u64, checksum: String },
    /// 重试耗尽后放弃
    Abandoned { error: String },
}

impl EntryOutcome {
    /// 该结果是否允许删除源文件
    pub fn permits_source_removal(&self) -> bool {
        matches!(
            self,
            EntryOutcome::Verified
                | EntryOutcome::Transferred { .. }
                | EntryOutcome::Skipped(SkipReason::AlreadyPresent)
        )
    }
}

/// 名称是否带有保留后缀
pub fn reserved_suffix(name: &str) -> Option<&'static str> {
    [CHECKSUM_SUFFIX, MANIFEST_FILE, BACKUP_SUFFIX]
        .into_iter()
        .find(|suffix| name.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_suffixes() {
        assert_eq!(reserved_suffix("a.txt.sha512"), Some(".sha512"));
        assert_eq!(reserved_suffix(".shalist"), Some(".shalist"));
        assert_eq!(reserved_suffix("old.shalist"), Some(".shalist"));
        assert_eq!(reserved_suffix("d.txt~"), Some("~"));
        assert_eq!(reserved_suffix("notes.txt"), None);
        assert_eq!(reserved_suffix("sha512"), None);
    }

    #[test]
    fn test_source_removal_discipline() {
        assert!(EntryOutcome::Verified.permits_source_removal());
        assert!(EntryOutcome::Skipped(SkipReason::AlreadyPresent).permits_source_removal());
        assert!(EntryOutcome::Transferred {
            bytes: 1,
            checksum: "x".into()
        }
        .permits_source_removal());

        assert!(!EntryOutcome::Skipped(SkipReason::Filtered).permits_source_removal());
        assert!(!EntryOutcome::Mismatch {
            source: "a".into(),
            destination: "b".into()
        }
        .permits_source_removal());
        assert!(!EntryOutcome::Abandoned {
            error: "boom".into()
        }
        .permits_source_removal());
    }
}
