//! 二进制对象存储契约

use anemia_core::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// 单次上传的进度事件
///
/// 同一次上传内按字节数非递减顺序发出，最后一个事件的
/// `bytes_transferred`等于`total_bytes`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// 对象存储协作方
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 分块上传对象，成功时返回可公开解析的URL
    ///
    /// 失败时不得留下可见的半成品对象。进度事件通过`progress`
    /// 发出；接收端掉线不影响上传本身。
    async fn upload_resumable(
        &self,
        key: &str,
        bytes: Vec<u8>,
        progress: mpsc::UnboundedSender<UploadProgress>,
    ) -> Result<String>;

    /// 按之前上传返回的URL删除对象
    async fn delete_by_url(&self, url: &str) -> Result<()>;
}
