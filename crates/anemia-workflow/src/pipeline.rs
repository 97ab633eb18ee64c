//! 照片摄取流水线
//!
//! 整个系统的核心序列：上传照片字节→以存储URL请求分类→
//! 单次写回患者文档。三个阶段严格串行，任一阶段失败都在
//! 该阶段终止，不进入后续阶段。

use crate::blocking::BlockingSignal;
use crate::notification::NotificationQueue;
use crate::state_machine::{PipelineEvent, PipelineState, PipelineStateMachine};
use anemia_core::models::Severity;
use anemia_core::utils::{blob_object_key, upload_percentage};
use anemia_core::{AnemiaError, Result};
use anemia_database::PatientRepository;
use anemia_integration::Classifier;
use anemia_storage::BlobStore;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// 待上传的照片：文件名与完整字节
#[derive(Debug, Clone)]
pub struct SelectedPhoto {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// 一次上传视图的输入状态
#[derive(Debug, Clone, Default)]
pub struct UploadSession {
    pub patient_id: Option<String>,
    pub photo: Option<SelectedPhoto>,
}

/// 一次流水线运行的终态
///
/// 保留为组件内状态，供上传视图渲染常驻的内联横幅；
/// 失败变体携带最具体的错误细节。
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Succeeded { image_url: String },
    PatientLoadError(String),
    StorageError(String),
    ClassificationError(String),
    PersistenceError(String),
}

/// 视图卸载令牌
///
/// 取消后，流水线继续在后台完成（写回仍会发生），但不再向
/// 视图侧发布进度与通知。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 照片摄取流水线引擎
pub struct PhotoIngestionPipeline {
    repository: Arc<PatientRepository>,
    blobs: Arc<dyn BlobStore>,
    classifier: Arc<dyn Classifier>,
    machine: PipelineStateMachine,
    state: watch::Sender<PipelineState>,
    progress: watch::Sender<u8>,
    blocking: Arc<BlockingSignal>,
    notifications: Arc<NotificationQueue>,
    in_flight: AtomicBool,
    last_outcome: Mutex<Option<PipelineOutcome>>,
}

impl PhotoIngestionPipeline {
    pub fn new(
        repository: Arc<PatientRepository>,
        blobs: Arc<dyn BlobStore>,
        classifier: Arc<dyn Classifier>,
        blocking: Arc<BlockingSignal>,
        notifications: Arc<NotificationQueue>,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        let (progress, _) = watch::channel(0);
        Self {
            repository,
            blobs,
            classifier,
            machine: PipelineStateMachine::new(),
            state,
            progress,
            blocking,
            notifications,
            in_flight: AtomicBool::new(false),
            last_outcome: Mutex::new(None),
        }
    }

    /// 订阅流水线状态
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// 订阅上传进度百分比
    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    /// 最近一次完整运行的终态
    pub fn last_outcome(&self) -> Option<PipelineOutcome> {
        match self.last_outcome.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 执行一次完整的摄取运行
    ///
    /// 前置条件不满足时发布警告通知并原样返回，不产生任何
    /// 副作用。同一引擎同一时刻至多一次运行在途。
    pub async fn run(&self, session: &UploadSession, token: &CancelToken) -> Result<PipelineOutcome> {
        let photo = match &session.photo {
            Some(photo) => photo,
            None => {
                self.notifications.publish(
                    "Por favor, selecciona una imagen primero para subir.",
                    Severity::Warning,
                );
                return Err(AnemiaError::Validation(
                    "no photo selected".to_string(),
                ));
            }
        };
        let patient_id = match &session.patient_id {
            Some(id) => id.as_str(),
            None => {
                self.notifications.publish(
                    "Error: ID de paciente no disponible para asociar la imagen.",
                    Severity::Error,
                );
                return Err(AnemiaError::Validation(
                    "no patient id for upload".to_string(),
                ));
            }
        };

        // 患者记录必须已存在，照片才有归属
        if let Err(e) = self.repository.get_one(patient_id).await {
            error!("Patient load failed before ingestion: {}", e);
            self.record_outcome(PipelineOutcome::PatientLoadError(e.to_string()));
            self.notifications.publish(
                "Error: ID de paciente no disponible para asociar la imagen.",
                Severity::Error,
            );
            return Err(e);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AnemiaError::Validation(
                "an ingestion run is already in flight".to_string(),
            ));
        }

        self.blocking.show("Subiendo y analizando imagen...");
        let outcome = self.run_stages(patient_id, photo, token).await;
        self.blocking.hide();
        self.in_flight.store(false, Ordering::SeqCst);

        match outcome {
            Ok(outcome) => {
                self.record_outcome(outcome.clone());
                Ok(outcome)
            }
            Err(e) => Err(e),
        }
    }

    fn record_outcome(&self, outcome: PipelineOutcome) {
        let mut last = match self.last_outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last = Some(outcome);
    }

    async fn run_stages(
        &self,
        patient_id: &str,
        photo: &SelectedPhoto,
        token: &CancelToken,
    ) -> Result<PipelineOutcome> {
        // 上一次运行停在终态时，先复位再开始
        let current = self.state.borrow().clone();
        if matches!(
            current,
            PipelineState::Succeeded | PipelineState::Failed(_)
        ) {
            self.apply_event(&PipelineEvent::Reset)?;
        }
        self.apply_event(&PipelineEvent::UploadStarted)?;
        if !token.is_cancelled() {
            self.progress.send_replace(0);
        }

        // 阶段A：上传字节，转发进度
        let key = blob_object_key(patient_id, Utc::now(), &photo.filename);
        let image_url = match self.upload_stage(&key, photo, token).await {
            Ok(url) => url,
            Err(e) => {
                error!("Photo upload failed for patient {}: {}", patient_id, e);
                self.apply_event(&PipelineEvent::StorageFailed)?;
                if !token.is_cancelled() {
                    self.progress.send_replace(0);
                    self.notifications.publish(
                        "Error al subir la imagen. Intenta de nuevo.",
                        Severity::Error,
                    );
                }
                return Ok(PipelineOutcome::StorageError(e.to_string()));
            }
        };
        self.apply_event(&PipelineEvent::UploadFinished)?;

        // 阶段B：以存储返回的URL请求分类
        let classification = match self.classifier.classify(&image_url).await {
            Ok(classification) => classification,
            Err(e) => {
                // 分类失败不回滚上传，blob留在存储中
                warn!(
                    "Classification failed for patient {}, blob remains at {}: {}",
                    patient_id, image_url, e
                );
                self.apply_event(&PipelineEvent::ClassificationFailed)?;
                if !token.is_cancelled() {
                    self.progress.send_replace(0);
                    self.notifications.publish(
                        "Error al analizar la imagen. Intenta de nuevo.",
                        Severity::Error,
                    );
                }
                return Ok(PipelineOutcome::ClassificationError(e.to_string()));
            }
        };
        self.apply_event(&PipelineEvent::ClassificationSucceeded)?;

        // 阶段C：单次写回患者文档
        if let Err(e) = self
            .repository
            .attach_prediction(
                patient_id,
                &image_url,
                &classification.clase,
                classification.confianza,
                &classification.message,
            )
            .await
        {
            self.apply_event(&PipelineEvent::PersistenceFailed)?;
            if !token.is_cancelled() {
                self.progress.send_replace(0);
                self.notifications.publish(
                    "Error al guardar el resultado. Intenta de nuevo.",
                    Severity::Error,
                );
            }
            return Ok(PipelineOutcome::PersistenceError(e.to_string()));
        }
        self.apply_event(&PipelineEvent::ResultPersisted)?;

        info!(
            "Ingestion run completed for patient {}: {} ({})",
            patient_id, classification.clase, classification.confianza
        );
        if !token.is_cancelled() {
            self.notifications.publish(
                "¡Imagen subida y asociada exitosamente!",
                Severity::Success,
            );
        }
        Ok(PipelineOutcome::Succeeded { image_url })
    }

    /// 上传并把字节进度折算成百分比转发给视图
    async fn upload_stage(
        &self,
        key: &str,
        photo: &SelectedPhoto,
        token: &CancelToken,
    ) -> Result<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let blobs = self.blobs.clone();
        let key = key.to_string();
        let bytes = photo.bytes.clone();
        let upload = tokio::spawn(async move { blobs.upload_resumable(&key, bytes, tx).await });

        while let Some(event) = rx.recv().await {
            if token.is_cancelled() {
                continue;
            }
            let percentage = upload_percentage(event.bytes_transferred, event.total_bytes);
            self.progress.send_replace(percentage);
        }

        upload
            .await
            .map_err(|e| AnemiaError::Storage(format!("upload task aborted: {}", e)))?
    }

    fn apply_event(&self, event: &PipelineEvent) -> Result<()> {
        let current = self.state.borrow().clone();
        let next = self.machine.transition(&current, event)?;
        // send_replace：没有订阅者时转换也必须提交
        self.state.send_replace(next);
        Ok(())
    }
}
