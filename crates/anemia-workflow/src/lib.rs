//! # 照片分诊工作流模块
//!
//! 提供筛查流程的全部状态管理，包括：
//! - 摄取流水线状态机：上传→分类→写回的显式转换表
//! - 摄取流水线引擎：前置条件、进度转发、恰好一次写回与分级失败
//! - 会话存储：由认证提供方变更流驱动的进程级身份状态
//! - 阻塞操作信号：引用计数的全屏阻塞标志
//! - 通知队列：单槽瞬态消息

pub mod blocking;
pub mod notification;
pub mod pipeline;
pub mod session;
pub mod state_machine;

// 重新导出主要类型
pub use blocking::BlockingSignal;
pub use notification::{Notification, NotificationQueue};
pub use pipeline::{
    CancelToken, PhotoIngestionPipeline, PipelineOutcome, SelectedPhoto, UploadSession,
};
pub use session::{SessionState, SessionStore};
pub use state_machine::{FailureKind, PipelineEvent, PipelineState, PipelineStateMachine};
