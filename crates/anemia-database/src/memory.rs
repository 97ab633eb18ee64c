//! 进程内文档库实现
//!
//! 服务进程与测试共用的文档库后端。提供故障注入开关，
//! 用于覆盖传输错误与写回失败路径。

use crate::document::{Document, DocumentStore};
use anemia_core::{AnemiaError, Result, SortDirection};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, Value>>,
    /// 置位后所有操作都以传输错误失败
    fail_transport: AtomicBool,
    /// 置位后仅`update`失败（模拟分类成功后的写回故障）
    fail_updates: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_transport(&self, fail: bool) {
        self.fail_transport.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, AtomicOrdering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn check_transport(&self) -> Result<()> {
        if self.fail_transport.load(AtomicOrdering::SeqCst) {
            return Err(AnemiaError::Transport(
                "document store unreachable".to_string(),
            ));
        }
        Ok(())
    }

    /// 排序键比较：字符串按字典序（RFC3339时间戳即时间序），数值按大小
    fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        match (a, b) {
            (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
            (Some(Value::Number(a)), Some(Value::Number(b))) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            _ => Ordering::Equal,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, data: Value) -> Result<String> {
        self.check_transport()?;
        let id = Uuid::new_v4().to_string();
        let mut documents = self.documents.write().await;
        documents.insert(id.clone(), data);
        info!("Created document {}", id);
        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>> {
        self.check_transport()?;
        let documents = self.documents.read().await;
        Ok(documents.get(id).map(|data| Document {
            id: id.to_string(),
            data: data.clone(),
        }))
    }

    async fn query(&self, order_by: &str, direction: SortDirection) -> Result<Vec<Document>> {
        self.check_transport()?;
        let documents = self.documents.read().await;
        let mut result: Vec<Document> = documents
            .iter()
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        result.sort_by(|a, b| {
            let ordering = Self::compare_fields(a.data.get(order_by), b.data.get(order_by));
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });

        debug!("Query returned {} documents", result.len());
        Ok(result)
    }

    async fn update(&self, id: &str, partial: Value) -> Result<()> {
        self.check_transport()?;
        if self.fail_updates.load(AtomicOrdering::SeqCst) {
            return Err(AnemiaError::Transport(
                "document store rejected the write".to_string(),
            ));
        }

        let fields = match partial {
            Value::Object(fields) => fields,
            _ => {
                return Err(AnemiaError::Validation(
                    "partial update must be an object".to_string(),
                ))
            }
        };

        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(id)
            .ok_or_else(|| AnemiaError::NotFound(format!("document {} does not exist", id)))?;

        match document {
            Value::Object(existing) => {
                for (key, value) in fields {
                    existing.insert(key, value);
                }
            }
            _ => {
                return Err(AnemiaError::Transport(format!(
                    "document {} is not an object",
                    id
                )))
            }
        }

        info!("Updated document {}", id);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_transport()?;
        let mut documents = self.documents.write().await;
        documents
            .remove(id)
            .ok_or_else(|| AnemiaError::NotFound(format!("document {} does not exist", id)))?;
        info!("Deleted document {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let store = MemoryDocumentStore::new();
        let id = store.create(json!({"nombres": "Ana"})).await.unwrap();

        let document = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(document.id, id);
        assert_eq!(document.data["nombres"], "Ana");

        assert!(store.get_by_id("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_orders_by_field() {
        let store = MemoryDocumentStore::new();
        store.create(json!({"registeredAt": "2024-01-01T00:00:00Z", "n": "A"})).await.unwrap();
        store.create(json!({"registeredAt": "2024-01-02T00:00:00Z", "n": "B"})).await.unwrap();
        store.create(json!({"registeredAt": "2024-01-03T00:00:00Z", "n": "C"})).await.unwrap();

        let descending = store
            .query("registeredAt", SortDirection::Descending)
            .await
            .unwrap();
        let names: Vec<&str> = descending
            .iter()
            .map(|d| d.data["n"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryDocumentStore::new();
        let id = store
            .create(json!({"nombres": "Ana", "imageUrl": null}))
            .await
            .unwrap();

        store
            .update(&id, json!({"imageUrl": "http://x/y.jpg"}))
            .await
            .unwrap();

        let document = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(document.data["nombres"], "Ana");
        assert_eq!(document.data["imageUrl"], "http://x/y.jpg");

        let err = store
            .update("missing", json!({"imageUrl": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AnemiaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_transport_fault_injection() {
        let store = MemoryDocumentStore::new();
        let id = store.create(json!({})).await.unwrap();

        store.set_fail_transport(true);
        assert!(matches!(
            store.get_by_id(&id).await.unwrap_err(),
            AnemiaError::Transport(_)
        ));

        store.set_fail_transport(false);
        assert!(store.get_by_id(&id).await.unwrap().is_some());
    }
}
