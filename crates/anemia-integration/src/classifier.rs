//! 预测端点客户端
//!
//! 向外部ML端点发起单次同步请求。两种失败形态都在持久化之前
//! 中止：传输层非成功状态，以及传输成功但响应内嵌失败标志。

use anemia_core::{AnemiaError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 分类端点的结构化成功结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub clase: String,
    pub confianza: f64,
    pub message: String,
}

/// 分类协作方
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 以存储返回的公开URL为唯一载荷请求一次分类
    async fn classify(&self, image_url: &str) -> Result<Classification>;
}

/// 请求体: `{"url_image": <string>}`
#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    url_image: &'a str,
}

/// 响应体: `{"success": bool, "clase": ..., "confianza": ..., "message": ...}`
#[derive(Debug, Deserialize)]
struct PredictResponse {
    success: bool,
    #[serde(default)]
    clase: Option<String>,
    #[serde(default)]
    confianza: Option<f64>,
    #[serde(default)]
    message: Option<String>,
}

/// 基于reqwest的HTTP客户端实现
///
/// 不设置本地超时，依赖底层传输自身的超时行为。
pub struct PredictionClient {
    client: reqwest::Client,
    endpoint: String,
}

impl PredictionClient {
    /// `base_url`为端点根地址，请求发往`<base_url>/predict/`
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base = base_url.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/predict/", base),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for PredictionClient {
    async fn classify(&self, image_url: &str) -> Result<Classification> {
        debug!("Calling prediction endpoint {} for {}", self.endpoint, image_url);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictRequest { url_image: image_url })
            .send()
            .await
            .map_err(|e| AnemiaError::Classification(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            // 错误体若能解析为结构化数据，附入错误消息
            let mut detail = format!("endpoint returned {}", status);
            match response.json::<serde_json::Value>().await {
                Ok(body) => detail.push_str(&format!(" - Detalles: {}", body)),
                Err(_) => warn!("Prediction error body was not parseable JSON"),
            }
            return Err(AnemiaError::Classification(detail));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| AnemiaError::Classification(format!("unparseable response body: {}", e)))?;

        if !body.success {
            return Err(AnemiaError::Classification(
                body.message
                    .unwrap_or_else(|| "Predicción fallida.".to_string()),
            ));
        }

        match (body.clase, body.confianza) {
            (Some(clase), Some(confianza)) => Ok(Classification {
                clase,
                confianza,
                message: body.message.unwrap_or_default(),
            }),
            _ => Err(AnemiaError::Classification(
                "successful response missing clase or confianza".to_string(),
            )),
        }
    }
}
