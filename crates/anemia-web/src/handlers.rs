//! HTTP处理器

use crate::forms::RegistrationForm;
use anemia_core::{AnemiaError, SortDirection};
use anemia_database::repository::REGISTERED_AT_FIELD;
use anemia_database::PatientRepository;
use anemia_workflow::{
    BlockingSignal, CancelToken, NotificationQueue, PhotoIngestionPipeline, PipelineOutcome,
    SelectedPhoto, SessionState, SessionStore, UploadSession,
};
use axum::{
    extract::{Multipart, Path, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
};
use object_store::ObjectStore;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 所有处理器共享的依赖集合
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<PatientRepository>,
    pub pipeline: Arc<PhotoIngestionPipeline>,
    pub session: Arc<SessionStore>,
    pub blocking: Arc<BlockingSignal>,
    pub notifications: Arc<NotificationQueue>,
    pub objects: Arc<dyn ObjectStore>,
}

/// 领域错误的HTTP包装
///
/// 状态码按失败归因映射：客户端问题4xx，外部协作方问题502，
/// 其余5xx。
pub struct ApiError(AnemiaError);

impl From<AnemiaError> for ApiError {
    fn from(e: AnemiaError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AnemiaError::NotFound(_) => StatusCode::NOT_FOUND,
            AnemiaError::Validation(_) => StatusCode::BAD_REQUEST,
            AnemiaError::Auth(_) => StatusCode::UNAUTHORIZED,
            AnemiaError::Storage(_) | AnemiaError::Classification(_) => StatusCode::BAD_GATEWAY,
            AnemiaError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            AnemiaError::Config(_)
            | AnemiaError::Transport(_)
            | AnemiaError::Persistence(_)
            | AnemiaError::Serialization(_)
            | AnemiaError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// 会话守卫中间件
///
/// 初始检查未完成时返回503而不是重定向，避免把「还不知道」
/// 误判成「未登录」。
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match state.session.current() {
        SessionState::Authenticated(_) => next.run(request).await,
        SessionState::Anonymous => Redirect::to("/login").into_response(),
        SessionState::Unresolved => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Sesión aún no resuelta." })),
        )
            .into_response(),
    }
}

/// 未匹配路径按会话状态重定向
pub async fn fallback_redirect(State(state): State<AppState>) -> Response {
    match state.session.current() {
        SessionState::Authenticated(_) => Redirect::to("/home").into_response(),
        SessionState::Anonymous => Redirect::to("/login").into_response(),
        SessionState::Unresolved => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Sesión aún no resuelta." })),
        )
            .into_response(),
    }
}

/// 登录入口提示（无前端渲染时的占位响应）
pub async fn login_page() -> impl IntoResponse {
    Json(json!({ "message": "Inicia sesión para continuar.", "login": "POST /login" }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 登录
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let identity = state.session.sign_in(&request.email, &request.password).await?;
    Ok(Json(json!({ "uid": identity.uid, "email": identity.email })))
}

/// 登出；失败时会话保持不变
pub async fn logout(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.session.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 当前会话状态
pub async fn session_state(State(state): State<AppState>) -> impl IntoResponse {
    let body = match state.session.current() {
        SessionState::Unresolved => json!({ "state": "unresolved" }),
        SessionState::Anonymous => json!({ "state": "anonymous" }),
        SessionState::Authenticated(identity) => json!({
            "state": "authenticated",
            "uid": identity.uid,
            "email": identity.email,
        }),
    };
    Json(body)
}

/// 患者列表，按登记时间倒序
pub async fn list_patients(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let patients = state
        .repository
        .list_all(REGISTERED_AT_FIELD, SortDirection::Descending)
        .await?;

    let items: Vec<_> = patients
        .into_iter()
        .map(|patient| {
            json!({
                "id": patient.id,
                "nombres": patient.nombres,
                "apellidos": patient.apellidos,
                "edad": patient.edad,
                "genero": patient.genero,
                "registeredAt": patient.registered_at,
                "imageUrl": patient.image_url,
                "predictionResult": patient.prediction_result,
            })
        })
        .collect();
    let total = items.len();
    Ok(Json(json!({ "patients": items, "total": total })))
}

/// 登记患者；校验失败返回422与逐字段错误文案
pub async fn register_patient(
    State(state): State<AppState>,
    Json(form): Json<RegistrationForm>,
) -> ApiResult<Response> {
    let new_patient = match form.validate() {
        Ok(new_patient) => new_patient,
        Err(errors) => {
            warn!("Patient registration rejected: {:?}", errors);
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response());
        }
    };

    let id = state.repository.create(new_patient).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// 患者详情
pub async fn patient_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let patient = state.repository.get_one(&id).await?;
    Ok(Json(json!({
        "id": patient.id,
        "nombres": patient.nombres,
        "apellidos": patient.apellidos,
        "fullName": patient.full_name(),
        "edad": patient.edad,
        "genero": patient.genero,
        "registeredAt": patient.registered_at,
        "imageUrl": patient.image_url,
        "predictionResult": patient.prediction_result,
    })))
}

/// 删除患者（先照片后文档）
pub async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let patient = state.repository.get_one(&id).await?;
    state
        .repository
        .delete_one(&id, patient.image_url.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 上传照片并触发完整的摄取流水线
pub async fn upload_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut photo = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AnemiaError::Validation(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("photo") {
            continue;
        }
        let filename = field
            .file_name()
            .unwrap_or("captura.jpg")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AnemiaError::Validation(format!("unreadable photo field: {}", e)))?;
        photo = Some(SelectedPhoto {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    let session = UploadSession {
        patient_id: Some(id.clone()),
        photo,
    };
    let outcome = state.pipeline.run(&session, &CancelToken::new()).await?;
    info!("Ingestion outcome for patient {}: {:?}", id, outcome);

    let response = match outcome {
        PipelineOutcome::Succeeded { image_url } => (
            StatusCode::OK,
            Json(json!({ "status": "succeeded", "imageUrl": image_url })),
        ),
        // 患者加载失败在前置检查就返回Err，这里仅为穷尽匹配
        PipelineOutcome::PatientLoadError(detail) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "patient_load_error", "detail": detail })),
        ),
        PipelineOutcome::StorageError(detail) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "status": "storage_error", "detail": detail })),
        ),
        PipelineOutcome::ClassificationError(detail) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "status": "classification_error", "detail": detail })),
        ),
        PipelineOutcome::PersistenceError(detail) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "persistence_error", "detail": detail })),
        ),
    };
    Ok(response.into_response())
}

/// 运行终态的横幅表示：归因加最具体的错误细节
fn outcome_json(outcome: &PipelineOutcome) -> serde_json::Value {
    match outcome {
        PipelineOutcome::Succeeded { image_url } => {
            json!({ "kind": "succeeded", "imageUrl": image_url })
        }
        PipelineOutcome::PatientLoadError(detail) => {
            json!({ "kind": "patient_load_error", "detail": detail })
        }
        PipelineOutcome::StorageError(detail) => {
            json!({ "kind": "storage_error", "detail": detail })
        }
        PipelineOutcome::ClassificationError(detail) => {
            json!({ "kind": "classification_error", "detail": detail })
        }
        PipelineOutcome::PersistenceError(detail) => {
            json!({ "kind": "persistence_error", "detail": detail })
        }
    }
}

/// 流水线视图状态：状态机位置、进度百分比与最近一次运行终态
pub async fn pipeline_state(State(state): State<AppState>) -> impl IntoResponse {
    let machine_state = state.pipeline.subscribe_state().borrow().clone();
    let progress = *state.pipeline.subscribe_progress().borrow();
    let last_outcome = state
        .pipeline
        .last_outcome()
        .map(|outcome| outcome_json(&outcome));
    Json(json!({
        "state": machine_state,
        "progress": progress,
        "blocking": state.blocking.is_blocking(),
        "blockingMessage": state.blocking.message(),
        "lastOutcome": last_outcome,
    }))
}

/// 取出当前通知（消费语义，轮询方展示后槽位清空）
pub async fn take_notification(State(state): State<AppState>) -> impl IntoResponse {
    match state.notifications.take() {
        Some(notification) => Json(json!({
            "message": notification.message,
            "severity": notification.severity,
            "durationMs": notification.duration_ms,
        })),
        None => Json(json!(null)),
    }
}

/// 按对象键提供照片字节
pub async fn serve_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let path = object_store::path::Path::from(key.as_str());
    let object = state.objects.get(&path).await.map_err(|e| {
        error!("Blob read failed for {}: {}", key, e);
        AnemiaError::NotFound(format!("blob {} does not exist", key))
    })?;
    let bytes = object
        .bytes()
        .await
        .map_err(|e| AnemiaError::Storage(format!("blob read failed: {}", e)))?;

    let content_type = match key.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// 健康检查
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (AnemiaError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AnemiaError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AnemiaError::Auth("x".into()), StatusCode::UNAUTHORIZED),
            (AnemiaError::Storage("x".into()), StatusCode::BAD_GATEWAY),
            (
                AnemiaError::Classification("x".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AnemiaError::Persistence("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let response = ApiError(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_outcome_banner_shapes() {
        let succeeded = outcome_json(&PipelineOutcome::Succeeded {
            image_url: "http://localhost/blobs/x.jpg".to_string(),
        });
        assert_eq!(succeeded["kind"], "succeeded");
        assert_eq!(succeeded["imageUrl"], "http://localhost/blobs/x.jpg");

        // 失败变体保留最具体的错误细节，供内联横幅展示
        let failed = outcome_json(&PipelineOutcome::ClassificationError(
            "endpoint returned 500 - Detalles: {\"message\":\"x\"}".to_string(),
        ));
        assert_eq!(failed["kind"], "classification_error");
        assert!(failed["detail"].as_str().unwrap().contains("Detalles"));

        let load = outcome_json(&PipelineOutcome::PatientLoadError("missing".to_string()));
        assert_eq!(load["kind"], "patient_load_error");
    }
}
