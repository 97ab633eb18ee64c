//! # 外部协作方集成模块
//!
//! 提供与两个外部系统的窄契约集成：
//! - 预测端点客户端：以照片URL为唯一载荷的同步分类请求
//! - 认证提供方：登录、登出与会话变更通知流

pub mod auth;
pub mod classifier;

pub use auth::{AuthChange, AuthProvider, Identity, MemoryAuthProvider};
pub use classifier::{Classification, Classifier, PredictionClient};
