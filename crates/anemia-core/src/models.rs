//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 患者文档
///
/// 文档库中的规范记录。`id`由文档库在创建时分配，不随文档数据
/// 一起序列化。`image_url`与`prediction_result`要么同时为空，
/// 要么在一次成功的流水线运行中被同时写入。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    #[serde(skip)]
    pub id: String,
    pub nombres: String,            // 名
    pub apellidos: String,          // 姓
    pub edad: u8,                   // 年龄 [0,120]
    pub genero: Gender,             // 性别
    #[serde(rename = "registeredAt")]
    pub registered_at: DateTime<Utc>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(rename = "predictionResult")]
    pub prediction_result: Option<PredictionResult>,
}

impl Patient {
    /// 姓名拼接，用于上传页标题等展示场景
    pub fn full_name(&self) -> String {
        format!("{} {}", self.nombres, self.apellidos)
    }

    /// 是否已有筛查结果（照片与预测同时存在）
    pub fn has_screening_result(&self) -> bool {
        self.image_url.is_some() && self.prediction_result.is_some()
    }
}

/// 性别枚举，文档中以小写西班牙语存储
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Masculino,
    Femenino,
}

/// 登记表单通过校验后的新患者数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPatient {
    pub nombres: String,
    pub apellidos: String,
    pub edad: u8,
    pub genero: Gender,
}

/// 分类端点的预测结果，随患者文档持久化
///
/// `processed_at`在写回时由服务端赋值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResult {
    pub clase: String,
    pub confianza: f64,
    pub message: String,
    #[serde(rename = "processedAt")]
    pub processed_at: DateTime<Utc>,
}

/// 通知严重级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// 文档库查询的排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_document_shape() {
        let patient = Patient {
            id: "abc123".to_string(),
            nombres: "María".to_string(),
            apellidos: "Quispe".to_string(),
            edad: 34,
            genero: Gender::Femenino,
            registered_at: Utc::now(),
            image_url: None,
            prediction_result: None,
        };

        let value = serde_json::to_value(&patient).unwrap();
        // id不进入文档数据
        assert!(value.get("id").is_none());
        assert_eq!(value["genero"], "femenino");
        assert_eq!(value["imageUrl"], serde_json::Value::Null);
        assert_eq!(value["predictionResult"], serde_json::Value::Null);
        assert!(value.get("registeredAt").is_some());
    }

    #[test]
    fn test_has_screening_result() {
        let mut patient = Patient {
            id: String::new(),
            nombres: "Juan".to_string(),
            apellidos: "Pérez".to_string(),
            edad: 8,
            genero: Gender::Masculino,
            registered_at: Utc::now(),
            image_url: None,
            prediction_result: None,
        };
        assert!(!patient.has_screening_result());

        patient.image_url = Some("http://localhost/blobs/x".to_string());
        patient.prediction_result = Some(PredictionResult {
            clase: "anémico".to_string(),
            confianza: 92.5,
            message: "ok".to_string(),
            processed_at: Utc::now(),
        });
        assert!(patient.has_screening_result());
    }
}
