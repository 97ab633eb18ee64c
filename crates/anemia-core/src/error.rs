//! 错误定义模块

use thiserror::Error;

/// 贫血筛查系统统一错误类型
///
/// 分类依据各操作的失败来源：本地校验、认证、文档库、
/// 对象存储、分类端点、以及分类成功后的写回失败。
#[derive(Error, Debug)]
pub enum AnemiaError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("表单校验错误: {0}")]
    Validation(String),

    #[error("认证错误: {0}")]
    Auth(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("网络或权限错误: {0}")]
    Transport(String),

    #[error("对象存储错误: {0}")]
    Storage(String),

    #[error("分类端点错误: {0}")]
    Classification(String),

    #[error("结果写回失败: {0}")]
    Persistence(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

/// 贫血筛查系统统一结果类型
pub type Result<T> = std::result::Result<T, AnemiaError>;
