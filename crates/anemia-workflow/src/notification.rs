//! 通知队列
//!
//! 单槽瞬态消息：新通知替换旧通知，展示时长由发布方指定。

use anemia_core::models::Severity;
use std::sync::Mutex;

/// 默认展示时长（毫秒）
pub const DEFAULT_DURATION_MS: u64 = 6000;

/// 一条待展示的通知
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub duration_ms: u64,
}

/// 单槽通知队列
#[derive(Debug)]
pub struct NotificationQueue {
    slot: Mutex<Option<Notification>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn publish(&self, message: &str, severity: Severity) {
        self.publish_with_duration(message, severity, DEFAULT_DURATION_MS);
    }

    /// 发布一条通知，替换槽内未被消费的旧通知
    pub fn publish_with_duration(&self, message: &str, severity: Severity, duration_ms: u64) {
        let mut slot = self.lock();
        *slot = Some(Notification {
            message: message.to_string(),
            severity,
            duration_ms,
        });
    }

    /// 查看当前通知而不消费
    pub fn current(&self) -> Option<Notification> {
        self.lock().clone()
    }

    /// 取出并清空当前通知
    pub fn take(&self) -> Option<Notification> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Notification>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}
