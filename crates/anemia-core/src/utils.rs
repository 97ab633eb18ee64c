//! 通用工具函数

use chrono::{DateTime, Utc};

/// 生成患者照片的存储对象键
///
/// 模式: `patient_images/<patientId>/<epoch-ms>-<original-filename>`。
/// 毫秒时间戳保证同一患者的重复上传互不覆盖。
pub fn blob_object_key(patient_id: &str, captured_at: DateTime<Utc>, filename: &str) -> String {
    format!(
        "patient_images/{}/{}-{}",
        patient_id,
        captured_at.timestamp_millis(),
        filename
    )
}

/// 上传进度百分比，向下取整到 [0,100]
pub fn upload_percentage(bytes_transferred: u64, total_bytes: u64) -> u8 {
    if total_bytes == 0 {
        return 100;
    }
    ((bytes_transferred.saturating_mul(100)) / total_bytes).min(100) as u8
}
