//! 文档库协作方契约

use anemia_core::{Result, SortDirection};
use async_trait::async_trait;
use serde_json::Value;

/// 文档库中的一条文档：服务端分配的不透明id加文档数据
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// 集合级文档库契约
///
/// 每个方法都可能以传输/权限错误失败；「文档不存在」是预期的
/// 空态，用`Ok(None)`（读取）或`NotFound`（更新/删除）表达，
/// 与传输错误严格区分。
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 写入新文档，返回服务端分配的id
    async fn create(&self, data: Value) -> Result<String>;

    /// 按id读取文档；不存在返回`Ok(None)`
    async fn get_by_id(&self, id: &str) -> Result<Option<Document>>;

    /// 按字段排序的快照读取（非订阅，调用方需显式重查）
    async fn query(&self, order_by: &str, direction: SortDirection) -> Result<Vec<Document>>;

    /// 合并式部分更新，单次写入；文档不存在返回`NotFound`
    async fn update(&self, id: &str, partial: Value) -> Result<()>;

    /// 按id删除文档；文档不存在返回`NotFound`
    async fn delete(&self, id: &str) -> Result<()>;
}
