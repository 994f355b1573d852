//! 逻辑路径约定：以 `/` 分隔、相对于容器根目录

use crate::error::{PushError, Result};

/// 拼接目录路径与条目名
pub fn join(base: &str, name: &str) -> String {
    let base = base.trim_matches('/');
    let name = name.trim_matches('/');
    if base.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, name)
    }
}

/// 将后端返回的条目名规范化为相对于目录的名称
///
/// 远程存储返回的 key 往往带有目录自身的路径前缀（历史遗留的重复编码），
/// 这里去掉该前缀以及目录条目末尾的 `/`。
pub fn canonicalize_entry(dir: &str, raw: &str) -> String {
    let dir = dir.trim_matches('/');
    let raw = raw.trim_start_matches('/').trim_end_matches('/');

    if dir.is_empty() {
        return raw.to_string();
    }
    if raw == dir {
        return String::new();
    }

    raw.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(raw)
        .to_string()
}

/// 校验逻辑路径格式
pub fn validate(path: &str) -> Result<()> {
    if path.contains('\\') || path.contains('\0') {
        return Err(PushError::InvalidPath(path.to_string()));
    }
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(());
    }
    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(PushError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("", "a.txt"), "a.txt");
        assert_eq!(join("photos/2020", "a.txt"), "photos/2020/a.txt");
        assert_eq!(join("/photos/", "/sub/"), "photos/sub");
        assert_eq!(join("photos", ""), "photos");
    }

    #[test]
    fn test_canonicalize_strips_directory_prefix() {
        assert_eq!(canonicalize_entry("photos/2020", "photos/2020/a.jpg"), "a.jpg");
        assert_eq!(canonicalize_entry("photos/2020", "photos/2020/trip/"), "trip");
        assert_eq!(canonicalize_entry("photos/2020", "photos/2020/"), "");
        assert_eq!(canonicalize_entry("", "/top.txt"), "top.txt");
        // 已经是相对名称时保持不变
        assert_eq!(canonicalize_entry("photos", "a.jpg"), "a.jpg");
        // 前缀只在完整路径段上匹配
        assert_eq!(canonicalize_entry("photos", "photos-old"), "photos-old");
    }

    #[test]
    fn test_validate() {
        assert!(validate("").is_ok());
        assert!(validate("a/b/c.txt").is_ok());
        assert!(validate("/a/b/").is_ok());
        assert!(validate("a/../b").is_err());
        assert!(validate("a//b").is_err());
        assert!(validate("a\\b").is_err());
    }
}
