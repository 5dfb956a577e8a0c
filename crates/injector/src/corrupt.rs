//! 데이터 파일 손상과 복원
//!
//! [`snapshot`]으로 읽은 원본을 쓰기 전에 보관해 두면, 쓰기가 도중에
//! 실패해도 [`restore`]로 되돌릴 수 있습니다.

use std::path::Path;

use faultline_core::types::CorruptSpec;
use tracing::info;

use crate::error::InjectorError;

/// 손상 대상 파일 크기 상한
const MAX_CORRUPT_FILE_SIZE: u64 = 256 * 1024 * 1024; // 256MB

/// 손상 전 파일 내용을 읽습니다. 이 바이트가 백업이자 손상의 원본입니다.
///
/// # Errors
/// - 파일을 읽을 수 없거나 크기 상한을 넘는 경우
pub async fn snapshot(path: &Path) -> Result<Vec<u8>, InjectorError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| corrupt_error(path, format!("failed to stat: {e}")))?;
    if metadata.len() > MAX_CORRUPT_FILE_SIZE {
        return Err(corrupt_error(
            path,
            format!("file is {} bytes (max {MAX_CORRUPT_FILE_SIZE})", metadata.len()),
        ));
    }

    tokio::fs::read(path)
        .await
        .map_err(|e| corrupt_error(path, format!("failed to read: {e}")))
}

/// `current`를 손상시킨 바이트를 계산합니다. 파일은 건드리지 않습니다.
///
/// # Errors
/// - 오프셋이 파일 끝을 넘는 경우
pub fn corrupted(path: &Path, current: &[u8], spec: &CorruptSpec) -> Result<Vec<u8>, InjectorError> {
    corrupt_bytes(current, spec).map_err(|reason| corrupt_error(path, reason))
}

/// 손상된 바이트를 파일에 씁니다.
pub async fn apply(path: &Path, corrupted: &[u8], spec: &CorruptSpec) -> Result<(), InjectorError> {
    tokio::fs::write(path, corrupted)
        .await
        .map_err(|e| corrupt_error(path, format!("failed to write: {e}")))?;

    info!(
        path = %path.display(),
        spec = %spec,
        corrupted_len = corrupted.len(),
        "corrupted data file"
    );
    Ok(())
}

fn corrupt_error(path: &Path, reason: String) -> InjectorError {
    InjectorError::Corrupt {
        path: path.display().to_string(),
        reason,
    }
}

/// 백업한 원본 바이트로 파일을 복원합니다.
pub async fn restore(path: &Path, original: &[u8]) -> Result<(), InjectorError> {
    tokio::fs::write(path, original)
        .await
        .map_err(|e| corrupt_error(path, format!("failed to restore: {e}")))?;
    info!(path = %path.display(), len = original.len(), "restored data file");
    Ok(())
}

/// 원본이 복원된 상태인지 확인합니다 (티어다운 후 프로브).
pub async fn is_restored(path: &Path, original: &[u8]) -> bool {
    tokio::fs::read(path)
        .await
        .is_ok_and(|current| current == original)
}

fn corrupt_bytes(original: &[u8], spec: &CorruptSpec) -> Result<Vec<u8>, String> {
    let mut bytes = original.to_vec();
    let len = bytes.len();
    let window = |offset: u64, count: u64| -> Result<std::ops::Range<usize>, String> {
        let start = usize::try_from(offset).map_err(|_| "offset overflows".to_owned())?;
        if start >= len {
            return Err(format!("offset {offset} is beyond end of file ({len} bytes)"));
        }
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        Ok(start..start.saturating_add(count).min(len))
    };

    match spec {
        CorruptSpec::Truncate { len: new_len, .. } => {
            let new_len = usize::try_from(*new_len).unwrap_or(usize::MAX);
            bytes.truncate(new_len);
        }
        CorruptSpec::FlipBytes { offset, count, .. } => {
            for b in &mut bytes[window(*offset, *count)?] {
                *b = !*b;
            }
        }
        CorruptSpec::Zero {
            offset, len: count, ..
        } => {
            for b in &mut bytes[window(*offset, *count)?] {
                *b = 0;
            }
        }
    }
    Ok(bytes)
}
