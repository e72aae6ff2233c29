//! 有界前缀读取
//! 识别只需要输入的前若干字节：流只前向读取、遇到流结束即停止（短读容忍）

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::RsmResult;

/// 前缀读取工具类
pub struct PrefixReader;

impl PrefixReader {
    /// 从任意流中读取至多 `max_len` 字节
    pub fn read_prefix<R: Read>(reader: R, max_len: usize) -> RsmResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity(max_len.min(64 * 1024));
        // take + read_to_end：自动处理 Interrupted 与提前 EOF
        reader.take(max_len as u64).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// 读取文件前缀
    pub fn read_file_prefix(path: &Path, max_len: usize) -> RsmResult<Vec<u8>> {
        let file = File::open(path)?;
        Self::read_prefix(file, max_len)
    }

    /// 异步读取文件前缀
    #[cfg(feature = "async-io")]
    pub async fn read_file_prefix_async(path: &Path, max_len: usize) -> RsmResult<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        let file = tokio::fs::File::open(path).await?;
        let mut buffer = Vec::with_capacity(max_len.min(64 * 1024));
        file.take(max_len as u64).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }
}
