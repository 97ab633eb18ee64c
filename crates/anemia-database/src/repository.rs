//! 患者资料库
//!
//! 在文档库契约之上提供患者文档的创建、读取、排序列表、
//! 级联删除，以及分类成功后的单次原子写回。

use crate::document::DocumentStore;
use anemia_core::{AnemiaError, NewPatient, Patient, PredictionResult, Result, SortDirection};
use anemia_storage::BlobStore;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 患者文档按登记时间排序所用的字段
pub const REGISTERED_AT_FIELD: &str = "registeredAt";

pub struct PatientRepository {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
}

impl PatientRepository {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// 创建患者文档
    ///
    /// 字段校验是视图层的职责，这里不重复。照片URL与预测结果
    /// 初始为null，登记时间在写入时赋值且此后不可变。
    pub async fn create(&self, new_patient: NewPatient) -> Result<String> {
        let mut data = serde_json::to_value(&new_patient)?;
        let fields = data
            .as_object_mut()
            .ok_or_else(|| AnemiaError::Transport("patient payload is not an object".to_string()))?;
        fields.insert(REGISTERED_AT_FIELD.to_string(), json!(Utc::now()));
        fields.insert("imageUrl".to_string(), Value::Null);
        fields.insert("predictionResult".to_string(), Value::Null);

        let id = self.store.create(data).await.map_err(|e| {
            error!("Failed to create patient document: {}", e);
            e
        })?;
        info!("Registered patient {}", id);
        Ok(id)
    }

    /// 按id读取单个患者
    ///
    /// 「不存在」与传输/权限错误严格区分：前者是预期空态，
    /// 后者是运行故障。
    pub async fn get_one(&self, id: &str) -> Result<Patient> {
        match self.store.get_by_id(id).await? {
            Some(document) => {
                let mut patient: Patient = serde_json::from_value(document.data)?;
                patient.id = document.id;
                Ok(patient)
            }
            None => Err(AnemiaError::NotFound(format!(
                "patient {} does not exist",
                id
            ))),
        }
    }

    /// 服务端排序的快照列表；要看到新数据需再次调用
    pub async fn list_all(
        &self,
        order_field: &str,
        direction: SortDirection,
    ) -> Result<Vec<Patient>> {
        let documents = self.store.query(order_field, direction).await?;
        let mut patients = Vec::with_capacity(documents.len());
        for document in documents {
            let mut patient: Patient = serde_json::from_value(document.data)?;
            patient.id = document.id;
            patients.push(patient);
        }
        Ok(patients)
    }

    /// 删除患者
    ///
    /// 有关联照片时先删blob再删文档；blob删除失败则整个操作
    /// 中止，文档保留——避免丢失对孤儿blob的回指。
    pub async fn delete_one(&self, id: &str, image_url: Option<&str>) -> Result<()> {
        if let Some(url) = image_url {
            self.blobs.delete_by_url(url).await.map_err(|e| {
                error!(
                    "Blob deletion failed for patient {}, document kept: {}",
                    id, e
                );
                e
            })?;
        }
        self.store.delete(id).await?;
        info!("Deleted patient {}", id);
        Ok(())
    }

    /// 分类成功后的唯一写回：照片URL与完整预测结果单次原子写入
    ///
    /// `processed_at`在此处由服务端赋值。任何失败都归类为
    /// `Persistence`——照片已在存储中，文档保持未修改。
    pub async fn attach_prediction(
        &self,
        id: &str,
        image_url: &str,
        clase: &str,
        confianza: f64,
        message: &str,
    ) -> Result<()> {
        let prediction = PredictionResult {
            clase: clase.to_string(),
            confianza,
            message: message.to_string(),
            processed_at: Utc::now(),
        };
        let partial = json!({
            "imageUrl": image_url,
            "predictionResult": serde_json::to_value(&prediction)?,
        });

        self.store.update(id, partial).await.map_err(|e| {
            warn!(
                "Prediction write-back failed for patient {}, blob at {} is now unreferenced: {}",
                id, image_url, e
            );
            AnemiaError::Persistence(e.to_string())
        })?;

        info!(
            "Attached prediction '{}' ({}) to patient {}",
            clase, confianza, id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocumentStore;
    use anemia_core::Gender;
    use anemia_storage::UploadProgress;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// 只计数调用次数的blob存储桩，可配置删除失败
    #[derive(Default)]
    struct CountingBlobStore {
        deletes: AtomicUsize,
        fail_delete: bool,
    }

    #[async_trait]
    impl BlobStore for CountingBlobStore {
        async fn upload_resumable(
            &self,
            key: &str,
            _bytes: Vec<u8>,
            _progress: mpsc::UnboundedSender<UploadProgress>,
        ) -> Result<String> {
            Ok(format!("http://localhost/blobs/{}", key))
        }

        async fn delete_by_url(&self, _url: &str) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete {
                Err(AnemiaError::Storage("simulated delete failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn new_patient(nombres: &str) -> NewPatient {
        NewPatient {
            nombres: nombres.to_string(),
            apellidos: "Quispe".to_string(),
            edad: 30,
            genero: Gender::Femenino,
        }
    }

    fn repository(
        fail_delete: bool,
    ) -> (
        PatientRepository,
        Arc<MemoryDocumentStore>,
        Arc<CountingBlobStore>,
    ) {
        let store = Arc::new(MemoryDocumentStore::new());
        let blobs = Arc::new(CountingBlobStore {
            deletes: AtomicUsize::new(0),
            fail_delete,
        });
        let repository = PatientRepository::new(store.clone(), blobs.clone());
        (repository, store, blobs)
    }

    #[tokio::test]
    async fn test_create_initializes_null_screening_fields() {
        let (repository, _store, _blobs) = repository(false);
        let id = repository.create(new_patient("Ana")).await.unwrap();

        let patient = repository.get_one(&id).await.unwrap();
        assert_eq!(patient.id, id);
        assert_eq!(patient.nombres, "Ana");
        assert!(patient.image_url.is_none());
        assert!(patient.prediction_result.is_none());
    }

    #[tokio::test]
    async fn test_get_one_distinguishes_not_found_from_transport() {
        let (repository, store, _blobs) = repository(false);
        let err = repository.get_one("missing").await.unwrap_err();
        assert!(matches!(err, AnemiaError::NotFound(_)));

        store.set_fail_transport(true);
        let err = repository.get_one("missing").await.unwrap_err();
        assert!(matches!(err, AnemiaError::Transport(_)));
    }

    #[tokio::test]
    async fn test_list_all_orders_by_registration_time() {
        let (repository, _store, _blobs) = repository(false);
        let a = repository.create(new_patient("A")).await.unwrap();
        let b = repository.create(new_patient("B")).await.unwrap();
        let c = repository.create(new_patient("C")).await.unwrap();

        let patients = repository
            .list_all(REGISTERED_AT_FIELD, SortDirection::Descending)
            .await
            .unwrap();
        let ids: Vec<&str> = patients.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![c.as_str(), b.as_str(), a.as_str()]);
    }

    #[tokio::test]
    async fn test_delete_without_image_skips_blob_store() {
        let (repository, store, blobs) = repository(false);
        let id = repository.create(new_patient("Ana")).await.unwrap();

        repository.delete_one(&id, None).await.unwrap();
        assert_eq!(blobs.deletes.load(Ordering::SeqCst), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_aborts_when_blob_deletion_fails() {
        let (repository, store, blobs) = repository(true);
        let id = repository.create(new_patient("Ana")).await.unwrap();
        let before = store.len().await;

        let err = repository
            .delete_one(&id, Some("http://localhost/blobs/x.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnemiaError::Storage(_)));
        // blob删除恰好尝试一次，文档数不变
        assert_eq!(blobs.deletes.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await, before);
    }

    #[tokio::test]
    async fn test_delete_with_image_removes_blob_then_document() {
        let (repository, store, blobs) = repository(false);
        let id = repository.create(new_patient("Ana")).await.unwrap();

        repository
            .delete_one(&id, Some("http://localhost/blobs/x.jpg"))
            .await
            .unwrap();
        assert_eq!(blobs.deletes.load(Ordering::SeqCst), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_attach_prediction_sets_both_fields_atomically() {
        let (repository, _store, _blobs) = repository(false);
        let id = repository.create(new_patient("Ana")).await.unwrap();

        repository
            .attach_prediction(&id, "http://localhost/blobs/x.jpg", "anémico", 92.5, "ok")
            .await
            .unwrap();

        let patient = repository.get_one(&id).await.unwrap();
        assert_eq!(patient.image_url.as_deref(), Some("http://localhost/blobs/x.jpg"));
        let prediction = patient.prediction_result.unwrap();
        assert_eq!(prediction.clase, "anémico");
        assert_eq!(prediction.confianza, 92.5);
        assert_eq!(prediction.message, "ok");
    }

    #[tokio::test]
    async fn test_attach_prediction_failure_is_persistence_error() {
        let (repository, store, _blobs) = repository(false);
        let id = repository.create(new_patient("Ana")).await.unwrap();

        store.set_fail_updates(true);
        let err = repository
            .attach_prediction(&id, "http://localhost/blobs/x.jpg", "sano", 88.0, "ok")
            .await
            .unwrap_err();
        assert!(matches!(err, AnemiaError::Persistence(_)));

        // 文档未被部分修改
        store.set_fail_updates(false);
        let patient = repository.get_one(&id).await.unwrap();
        assert!(patient.image_url.is_none());
        assert!(patient.prediction_result.is_none());
    }
}
