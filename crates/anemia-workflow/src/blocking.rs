//! 阻塞操作信号
//!
//! 引用计数的全屏阻塞标志。并发操作各自show/hide，计数归零
//! 才解除阻塞，后发起者的消息覆盖先发起者的消息。

use std::sync::Mutex;
use tracing::warn;

const DEFAULT_MESSAGE: &str = "Cargando...";

#[derive(Debug)]
struct BlockingInner {
    depth: u32,
    message: String,
}

/// 进程级阻塞信号
#[derive(Debug)]
pub struct BlockingSignal {
    inner: Mutex<BlockingInner>,
}

impl BlockingSignal {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BlockingInner {
                depth: 0,
                message: DEFAULT_MESSAGE.to_string(),
            }),
        }
    }

    /// 进入阻塞区；`message`为空时使用默认文案
    pub fn show(&self, message: &str) {
        let mut inner = self.lock();
        inner.depth += 1;
        inner.message = if message.is_empty() {
            DEFAULT_MESSAGE.to_string()
        } else {
            message.to_string()
        };
    }

    /// 离开阻塞区；计数已为零时忽略多余的hide
    pub fn hide(&self) {
        let mut inner = self.lock();
        if inner.depth == 0 {
            warn!("Blocking signal hide without matching show");
            return;
        }
        inner.depth -= 1;
    }

    pub fn is_blocking(&self) -> bool {
        self.lock().depth > 0
    }

    /// 当前展示的文案（最近一次show设置的）
    pub fn message(&self) -> String {
        self.lock().message.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BlockingInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for BlockingSignal {
    fn default() -> Self {
        Self::new()
    }
}
