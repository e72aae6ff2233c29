//! zip 内容分析器
//! 优先读取末尾的中央目录；前缀被截断、中央目录不可见时，退回顺序遍历本地文件头，
//! 每个文件名/目录名模式至少被一个条目满足才算匹配

use std::io::Cursor;
use tracing::trace;
use zip::ZipArchive;
use zip::read::read_zipfile_from_stream;

use crate::compiler::ZipPatterns;

/// zip 本地文件头签名
const LOCAL_FILE_HEADER: &[u8; 4] = b"PK\x03\x04";

/// 本地文件头定长部分
const LOCAL_HEADER_LEN: usize = 30;

/// 通用标志位 bit 3：条目大小记录在数据之后的数据描述符里
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// zip 内容分析器
pub struct ZipAnalyzer;

impl ZipAnalyzer {
    pub fn test(patterns: &ZipPatterns, buffer: &[u8]) -> bool {
        if !buffer.starts_with(LOCAL_FILE_HEADER) {
            return false;
        }

        let names = Self::entry_names(buffer);
        if names.is_empty() {
            return false;
        }

        Self::all_patterns_satisfied(patterns, &names)
    }

    /// 读取全部条目名（按归档顺序）
    pub fn entry_names(buffer: &[u8]) -> Vec<String> {
        // 1. 完整归档：中央目录
        match ZipArchive::new(Cursor::new(buffer)) {
            Ok(archive) => return archive.file_names().map(str::to_string).collect(),
            Err(e) => trace!("中央目录不可用，改为遍历本地文件头：{}", e),
        }

        // 2. 截断的前缀：本地文件头
        Self::walk_local_headers(buffer)
    }

    /// 顺序读取本地文件头，遇到截断/损坏即停止，保留已读到的部分
    /// 带数据描述符的条目无法流式读取，此时按签名扫描剩余的文件头
    fn walk_local_headers(buffer: &[u8]) -> Vec<String> {
        let mut cursor = Cursor::new(buffer);
        let mut names = Vec::new();

        loop {
            let position = cursor.position() as usize;
            match read_zipfile_from_stream(&mut cursor) {
                Ok(Some(entry)) => names.push(entry.name().to_string()),
                Ok(None) => break,
                Err(e) => {
                    trace!("本地文件头遍历在第 {} 个条目处停止：{}", names.len(), e);
                    if Self::has_data_descriptor(buffer, position) {
                        names.extend(Self::scan_local_headers(buffer, position));
                    }
                    break;
                }
            }
        }

        names
    }

    fn has_data_descriptor(buffer: &[u8], header_start: usize) -> bool {
        buffer
            .get(header_start..header_start + LOCAL_HEADER_LEN)
            .filter(|header| header.starts_with(LOCAL_FILE_HEADER))
            .map(|header| u16::from_le_bytes([header[6], header[7]]) & FLAG_DATA_DESCRIPTOR != 0)
            .unwrap_or(false)
    }

    /// 从 start 开始按签名查找本地文件头，只读取文件名，不解析条目数据
    fn scan_local_headers(buffer: &[u8], start: usize) -> Vec<String> {
        let mut names = Vec::new();
        let mut pos = start;

        while let Some(found) = find_signature(buffer, pos) {
            let Some(header) = buffer.get(found..found + LOCAL_HEADER_LEN) else {
                break;
            };
            let name_len = u16::from_le_bytes([header[26], header[27]]) as usize;
            let name_start = found + LOCAL_HEADER_LEN;
            let Some(name) = buffer.get(name_start..name_start + name_len) else {
                break;
            };
            names.push(String::from_utf8_lossy(name).into_owned());
            pos = name_start + name_len;
        }

        names
    }

    /// 条目所在目录：最后一个 `/` 之前的部分
    fn parent_dir(name: &str) -> Option<&str> {
        name.rfind('/').map(|idx| &name[..idx])
    }

    fn all_patterns_satisfied(patterns: &ZipPatterns, names: &[String]) -> bool {
        let mut file_hits = vec![false; patterns.files.len()];
        let mut dir_hits = vec![false; patterns.directories.len()];

        for name in names {
            for (hit, pattern) in file_hits.iter_mut().zip(&patterns.files) {
                if !*hit && pattern.is_match(name) {
                    *hit = true;
                }
            }

            if let Some(dir) = Self::parent_dir(name) {
                for (hit, pattern) in dir_hits.iter_mut().zip(&patterns.directories) {
                    if !*hit && pattern.is_match(dir) {
                        *hit = true;
                    }
                }
            }
        }

        file_hits.iter().chain(dir_hits.iter()).all(|hit| *hit)
    }
}

fn find_signature(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(LOCAL_FILE_HEADER.len())
        .position(|w| w == LOCAL_FILE_HEADER)
        .map(|idx| from + idx)
}
