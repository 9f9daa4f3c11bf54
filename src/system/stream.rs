//! 고정 크기 청크 단위 스트림 복사

use crate::utils::error::{BackupError, Result};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// `reader`를 EOF까지 `chunk_size` 단위로 읽어 `writer`에 기록한다.
///
/// 파일 전체를 메모리에 올리지 않는다. 복사한 바이트 수를 반환.
pub fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut copied = 0u64;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..read])?;
        copied += read as u64;
    }
    Ok(copied)
}

/// 대상 파일을 새로 만들거나 비운 뒤 `reader` 내용을 기록
pub fn copy_to_file<R>(reader: &mut R, destination: &Path, chunk_size: usize) -> Result<u64>
where
    R: Read + ?Sized,
{
    let mut out = File::create(destination).map_err(|e| BackupError::stream(destination, e))?;
    let copied =
        copy_chunked(reader, &mut out, chunk_size).map_err(|e| BackupError::stream(destination, e))?;
    out.flush().map_err(|e| BackupError::stream(destination, e))?;
    Ok(copied)
}
