//! 错误类型定义

use thiserror::Error;

/// 同步过程中的错误
#[derive(Error, Debug)]
pub enum PushError {
    /// 无法识别的存储地址（启动阶段致命错误）
    #[error("无法识别的存储地址: {0}")]
    UnknownEndpoint(String),

    /// 非法的逻辑路径（程序错误，不重试）
    #[error("非法路径: {0}")]
    InvalidPath(String),

    #[error("过滤表达式无效: {0}")]
    Filter(#[from] regex::Error),

    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("存储后端错误: {0}")]
    Backend(#[from] opendal::Error),

    #[error("校验清单格式错误: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("后台任务失败: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PushError {
    /// 是否属于可重试的传输错误
    pub fn is_retryable(&self) -> bool {
        match self {
            PushError::Io(_) | PushError::Backend(_) | PushError::Manifest(_) | PushError::Join(_) => {
                true
            }
            PushError::UnknownEndpoint(_) | PushError::InvalidPath(_) | PushError::Filter(_) => {
                false
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, PushError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let io = PushError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(io.is_retryable());
        assert!(!PushError::InvalidPath("../x".into()).is_retryable());
        assert!(!PushError::UnknownEndpoint("ftp:x".into()).is_retryable());
    }
}
