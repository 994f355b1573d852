//! SHA-512 内容校验

use crate::error::Result;
use sha2::{Digest, Sha512};
use std::io::Read;
use std::path::{Path, PathBuf};

const BUFFER_SIZE: usize = 64 * 1024;

/// 计算内存数据的摘要
pub fn sha512_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha512::digest(data))
}

/// 流式计算本地文件的摘要（阻塞）
pub fn sha512_file_blocking(path: &Path) -> Result<String> {
    let mut file = std::io::BufReader::new(std::fs::File::open(path)?);
    let mut hasher = Sha512::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// 在阻塞线程池中计算本地文件的摘要
pub async fn sha512_file(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || sha512_file_blocking(&path)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_SHA512: &str = "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f";

    #[test]
    fn test_sha512_bytes() {
        assert_eq!(sha512_bytes(b"abc"), ABC_SHA512);
    }

    #[tokio::test]
    async fn test_sha512_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(sha512_file(path).await.unwrap(), ABC_SHA512);
    }
}
