//! 会话存储
//!
//! 进程级身份状态，由认证提供方的变更流驱动。视图在状态解析
//! 完成之前不做任何路由决定。

use crate::blocking::BlockingSignal;
use crate::notification::NotificationQueue;
use anemia_core::models::Severity;
use anemia_core::Result;
use anemia_integration::auth::{AuthChange, AuthProvider, Identity};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// 会话状态
///
/// `Unresolved`表示初始检查尚未完成，与「未登录」是不同的状态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unresolved,
    Authenticated(Identity),
    Anonymous,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// 会话存储
pub struct SessionStore {
    provider: Arc<dyn AuthProvider>,
    state: watch::Sender<SessionState>,
    blocking: Arc<BlockingSignal>,
    notifications: Arc<NotificationQueue>,
}

impl SessionStore {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        blocking: Arc<BlockingSignal>,
        notifications: Arc<NotificationQueue>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unresolved);
        Self {
            provider,
            state,
            blocking,
            notifications,
        }
    }

    /// 启动变更流订阅；每个进程调用一次
    pub fn start(&self) {
        let mut changes = self.provider.on_change();
        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                let next = match changes.borrow_and_update().clone() {
                    None => SessionState::Unresolved,
                    Some(AuthChange::SignedIn(identity)) => {
                        SessionState::Authenticated(identity)
                    }
                    Some(AuthChange::SignedOut) => SessionState::Anonymous,
                };
                if *state.borrow() != next {
                    info!("Session state changed to {:?}", next);
                    // send_replace：没有订阅者时状态也必须提交
                    state.send_replace(next);
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    /// 订阅会话状态
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// 当前会话状态快照
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// 凭证登录；状态变更经由提供方的变更流到达
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.provider.sign_in(email, password).await
    }

    /// 登出；失败时会话保持不变并通知用户
    pub async fn sign_out(&self) -> Result<()> {
        self.blocking.show("Cerrando sesión...");
        let result = self.provider.sign_out().await;
        self.blocking.hide();

        match &result {
            Ok(()) => {
                self.notifications
                    .publish("Sesión cerrada correctamente.", Severity::Success);
            }
            Err(e) => {
                error!("Sign-out failed: {}", e);
                self.notifications.publish(
                    "Error al cerrar sesión. Intenta de nuevo.",
                    Severity::Error,
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anemia_integration::auth::MemoryAuthProvider;

    fn build_store() -> (Arc<MemoryAuthProvider>, SessionStore) {
        let provider = Arc::new(MemoryAuthProvider::new());
        let store = SessionStore::new(
            provider.clone(),
            Arc::new(BlockingSignal::new()),
            Arc::new(NotificationQueue::new()),
        );
        (provider, store)
    }

    #[tokio::test]
    async fn test_starts_unresolved_then_follows_changes() {
        let (provider, store) = build_store();
        provider.seed_account("clinico@anemia-control.app", "secreto").await;
        let mut states = store.subscribe();
        store.start();
        assert_eq!(store.current(), SessionState::Unresolved);

        provider.resolve_initial();
        states.changed().await.unwrap();
        assert_eq!(*states.borrow(), SessionState::Anonymous);

        let identity = store
            .sign_in("clinico@anemia-control.app", "secreto")
            .await
            .unwrap();
        states.changed().await.unwrap();
        assert_eq!(*states.borrow(), SessionState::Authenticated(identity));
    }

    #[tokio::test]
    async fn test_state_commits_without_subscribers() {
        // 守卫中间件只做current()快照，进程里可能从无订阅者
        let (provider, store) = build_store();
        store.start();
        provider.resolve_initial();

        for _ in 0..100 {
            if store.current() == SessionState::Anonymous {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.current(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_sign_out_success_notifies() {
        let (provider, store) = build_store();
        provider.seed_account("a@b.c", "x").await;
        store.start();
        store.sign_in("a@b.c", "x").await.unwrap();

        store.sign_out().await.unwrap();
        let notifications = store.notifications.take().unwrap();
        assert_eq!(notifications.message, "Sesión cerrada correctamente.");
        assert_eq!(notifications.severity, Severity::Success);
        assert!(!store.blocking.is_blocking());
    }

    #[tokio::test]
    async fn test_failed_sign_out_keeps_session() {
        let (provider, store) = build_store();
        provider.seed_account("a@b.c", "x").await;
        let mut states = store.subscribe();
        store.start();
        store.sign_in("a@b.c", "x").await.unwrap();
        states.changed().await.unwrap();
        assert!(states.borrow().is_authenticated());

        provider.set_fail_sign_out(true);
        assert!(store.sign_out().await.is_err());

        // 会话保持已认证，错误通知入槽，阻塞已解除
        tokio::task::yield_now().await;
        assert!(store.current().is_authenticated());
        let notification = store.notifications.take().unwrap();
        assert_eq!(notification.message, "Error al cerrar sesión. Intenta de nuevo.");
        assert!(!store.blocking.is_blocking());
    }
}
