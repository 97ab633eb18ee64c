//! 配置管理
//!
//! 文件配置可选，环境变量（前缀`ANEMIA`）覆盖文件值，
//! 两者都缺省时使用内置默认值。

use anemia_core::{AnemiaError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// 服务完整配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// 照片存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 照片落盘目录
    pub data_dir: String,
    /// 照片URL的公开前缀；缺省时用服务自身的`/blobs`路径
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/blobs".to_string(),
            public_base_url: None,
        }
    }
}

/// 预测端点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// 端点根地址，请求发往`<base_url>/predict/`
    pub base_url: String,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

/// 认证配置：预置的临床账号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub email: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            email: "clinico@anemia-control.app".to_string(),
            password: "cambiar-al-desplegar".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值 ← 可选文件 ← `ANEMIA_*`环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        let config = builder
            .add_source(Environment::with_prefix("ANEMIA").separator("__"))
            .build()
            .map_err(|e| AnemiaError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AnemiaError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.data_dir, "./data/blobs");
        assert!(config.storage.public_base_url.is_none());
        assert_eq!(config.prediction.base_url, "http://localhost:8000");
        assert_eq!(config.logging.level, "info");
    }
}
