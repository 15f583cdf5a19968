//! 输出归档解包
//!
//! 平台以 tar 流返回容器内的输出文件。路径不存在或归档为空都是正常结果（命令没写任何东西），
//! 返回描述性文本而不是错误；只有归档本身损坏才是 Archive 错误。

use std::io::{Cursor, Read};

use tar::{Archive, EntryType};

use crate::sandbox::SandboxError;

/// 容器内路径不存在时的 Observation
pub fn missing_output_message(path: &str) -> String {
    format!("Command produced no output file at '{path}'.")
}

/// 归档没有任何成员时的 Observation
pub fn empty_archive_message(path: &str) -> String {
    format!("Command produced no output file at '{path}' (empty archive).")
}

/// 解包 tar 字节流，返回第一个成员的文本内容
pub fn unpack_output(archive: &[u8], path: &str) -> Result<String, SandboxError> {
    if archive.is_empty() {
        return Ok(empty_archive_message(path));
    }

    let mut tar = Archive::new(Cursor::new(archive));
    let mut entries = tar
        .entries()
        .map_err(|e| SandboxError::Archive(e.to_string()))?;

    let mut entry = match entries.next() {
        None => return Ok(empty_archive_message(path)),
        Some(entry) => entry.map_err(|e| SandboxError::Archive(e.to_string()))?,
    };

    if !matches!(entry.header().entry_type(), EntryType::Regular | EntryType::Continuous) {
        return Ok(format!("Failed to extract file from archive for '{path}'."));
    }

    let mut raw = Vec::new();
    entry
        .read_to_end(&mut raw)
        .map_err(|e| SandboxError::Archive(e.to_string()))?;
    Ok(decode_lossy(&raw))
}

/// UTF-8 解码，丢弃非法字节序列
fn decode_lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tar_with(name: &str, body: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, body).unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_unpack_first_member() {
        let archive = tar_with("scan.txt", b"22/tcp open ssh\n80/tcp open http\n");
        let text = unpack_output(&archive, "/tmp/scan.txt").unwrap();
        assert_eq!(text, "22/tcp open ssh\n80/tcp open http\n");
    }

    #[test]
    fn test_zero_members_is_not_an_error() {
        let archive = tar::Builder::new(Vec::new()).into_inner().unwrap();
        let text = unpack_output(&archive, "/tmp/x.txt").unwrap();
        assert_eq!(
            text,
            "Command produced no output file at '/tmp/x.txt' (empty archive)."
        );
    }

    #[test]
    fn test_empty_bytes_is_empty_archive() {
        let text = unpack_output(&[], "/tmp/y.txt").unwrap();
        assert_eq!(text, empty_archive_message("/tmp/y.txt"));
    }

    #[test]
    fn test_directory_member_cannot_be_extracted() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "out/", std::io::empty()).unwrap();
        let archive = builder.into_inner().unwrap();

        let text = unpack_output(&archive, "/tmp/out").unwrap();
        assert_eq!(text, "Failed to extract file from archive for '/tmp/out'.");
    }

    #[test]
    fn test_invalid_utf8_is_dropped() {
        let archive = tar_with("bin.txt", b"ok\xff\xfeok");
        assert_eq!(unpack_output(&archive, "/tmp/bin.txt").unwrap(), "okok");
    }
}
