//! 基于`object_store`的对象存储实现

use crate::blob::{BlobStore, UploadProgress};
use anemia_core::{AnemiaError, Result};
use async_trait::async_trait;
use object_store::{path::Path as ObjectPath, ObjectStore};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// 分块大小，每写完一块发出一次进度事件
const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// 包装任意`ObjectStore`后端的存储实现
///
/// 对象键映射到`<public_base_url>/<key>`形式的公开URL；
/// `delete_by_url`拒绝不属于本存储的URL。
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl ObjectBlobStore {
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        let mut base = public_base_url.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self {
            store,
            public_base_url: base,
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn key_from_url<'a>(&self, url: &'a str) -> Result<&'a str> {
        url.strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                AnemiaError::Storage(format!("URL does not belong to this blob store: {}", url))
            })
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn upload_resumable(
        &self,
        key: &str,
        bytes: Vec<u8>,
        progress: mpsc::UnboundedSender<UploadProgress>,
    ) -> Result<String> {
        let location = ObjectPath::from(key);
        let total_bytes = bytes.len() as u64;

        let (multipart_id, mut writer) =
            self.store.put_multipart(&location).await.map_err(|e| {
                AnemiaError::Storage(format!("multipart init failed for {}: {}", key, e))
            })?;

        let mut transferred: u64 = 0;
        for chunk in bytes.chunks(UPLOAD_CHUNK_SIZE) {
            if let Err(e) = writer.write_all(chunk).await {
                // 失败的分块上传必须中止，避免留下半成品
                let _ = self.store.abort_multipart(&location, &multipart_id).await;
                return Err(AnemiaError::Storage(format!(
                    "chunk write failed for {}: {}",
                    key, e
                )));
            }
            transferred += chunk.len() as u64;
            let _ = progress.send(UploadProgress {
                bytes_transferred: transferred,
                total_bytes,
            });
            debug!(
                "Upload progress for {}: {}/{} bytes",
                key, transferred, total_bytes
            );
        }

        if let Err(e) = writer.shutdown().await {
            let _ = self.store.abort_multipart(&location, &multipart_id).await;
            return Err(AnemiaError::Storage(format!(
                "multipart finalize failed for {}: {}",
                key, e
            )));
        }

        // 空文件没有分块，仍需发出终止事件
        if total_bytes == 0 {
            let _ = progress.send(UploadProgress {
                bytes_transferred: 0,
                total_bytes: 0,
            });
        }

        let url = self.url_for(key);
        info!("Uploaded {} bytes to {}", total_bytes, key);
        Ok(url)
    }

    async fn delete_by_url(&self, url: &str) -> Result<()> {
        let key = self.key_from_url(url)?;
        self.store
            .delete(&ObjectPath::from(key))
            .await
            .map_err(|e| AnemiaError::Storage(format!("delete failed for {}: {}", key, e)))?;
        info!("Deleted blob {}", key);
        Ok(())
    }
}
