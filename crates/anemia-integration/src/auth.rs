//! 认证协作方
//!
//! 登录、登出与会话变更通知流的窄契约，以及服务进程与测试
//! 共用的进程内实现。

use anemia_core::{AnemiaError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// 已认证身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

/// 会话变更事件
///
/// `None`表示提供方尚未完成初始检查（进程启动后、首次通知前）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn(Identity),
    SignedOut,
}

/// 认证提供方契约
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    /// 请求结束会话；失败时不产生任何会话变更
    async fn sign_out(&self) -> Result<()>;

    /// 订阅会话变更；启动时发出一次初始状态，此后每次转换发出一次
    fn on_change(&self) -> watch::Receiver<Option<AuthChange>>;
}

/// 进程内认证提供方
///
/// 以邮箱为键的账号表。明文口令仅用于这个进程内替身，
/// 真实提供方的口令处理在其自身边界之内。
pub struct MemoryAuthProvider {
    accounts: RwLock<HashMap<String, SeededAccount>>,
    changes: watch::Sender<Option<AuthChange>>,
    fail_sign_out: AtomicBool,
}

struct SeededAccount {
    uid: String,
    password: String,
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            accounts: RwLock::new(HashMap::new()),
            changes,
            fail_sign_out: AtomicBool::new(false),
        }
    }

    /// 预置一个账号，返回分配的uid
    pub async fn seed_account(&self, email: &str, password: &str) -> String {
        let uid = Uuid::new_v4().to_string();
        let mut accounts = self.accounts.write().await;
        accounts.insert(
            email.to_string(),
            SeededAccount {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        info!("Seeded auth account for {}", email);
        uid
    }

    /// 完成初始会话检查并发出首次通知（进程启动时调用一次）
    pub fn resolve_initial(&self) {
        if self.changes.borrow().is_none() {
            // send_replace：没有订阅者时通知也必须提交
            self.changes.send_replace(Some(AuthChange::SignedOut));
        }
    }

    /// 测试开关：让下一次登出失败
    pub fn set_fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(email)
            .filter(|account| account.password == password)
            .ok_or_else(|| {
                warn!("Sign-in rejected for {}", email);
                AnemiaError::Auth("invalid email or password".to_string())
            })?;

        let identity = Identity {
            uid: account.uid.clone(),
            email: email.to_string(),
        };
        self.changes
            .send_replace(Some(AuthChange::SignedIn(identity.clone())));
        info!("Signed in {}", email);
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AnemiaError::Auth("sign-out rejected".to_string()));
        }
        self.changes.send_replace(Some(AuthChange::SignedOut));
        info!("Signed out");
        Ok(())
    }

    fn on_change(&self) -> watch::Receiver<Option<AuthChange>> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_emits_change() {
        let provider = MemoryAuthProvider::new();
        provider.seed_account("clinico@anemia-control.app", "secreto").await;
        let mut changes = provider.on_change();
        assert!(changes.borrow().is_none());

        let identity = provider
            .sign_in("clinico@anemia-control.app", "secreto")
            .await
            .unwrap();
        changes.changed().await.unwrap();
        assert_eq!(
            *changes.borrow(),
            Some(AuthChange::SignedIn(identity))
        );
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password() {
        let provider = MemoryAuthProvider::new();
        provider.seed_account("clinico@anemia-control.app", "secreto").await;

        let err = provider
            .sign_in("clinico@anemia-control.app", "otra")
            .await
            .unwrap_err();
        assert!(matches!(err, AnemiaError::Auth(_)));
        // 失败的登录不发出任何变更
        assert!(provider.on_change().borrow().is_none());
    }

    #[tokio::test]
    async fn test_failed_sign_out_emits_no_change() {
        let provider = MemoryAuthProvider::new();
        provider.seed_account("clinico@anemia-control.app", "secreto").await;
        provider
            .sign_in("clinico@anemia-control.app", "secreto")
            .await
            .unwrap();

        provider.set_fail_sign_out(true);
        assert!(provider.sign_out().await.is_err());
        assert!(matches!(
            *provider.on_change().borrow(),
            Some(AuthChange::SignedIn(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_initial_fires_once() {
        let provider = MemoryAuthProvider::new();
        provider.resolve_initial();
        assert_eq!(*provider.on_change().borrow(), Some(AuthChange::SignedOut));

        // 已登录后再次调用不得覆盖当前状态
        provider.seed_account("a@b.c", "x").await;
        provider.sign_in("a@b.c", "x").await.unwrap();
        provider.resolve_initial();
        assert!(matches!(
            *provider.on_change().borrow(),
            Some(AuthChange::SignedIn(_))
        ));
    }
}
