//! # Web接口模块
//!
//! HTTP层：登录与会话守卫、患者登记与列表、照片上传入口、
//! 照片字节服务，以及供前端轮询的流水线/通知状态。

pub mod forms;
pub mod handlers;
pub mod server;

pub use forms::{FieldErrors, RegistrationForm};
pub use handlers::AppState;
pub use server::WebServer;
