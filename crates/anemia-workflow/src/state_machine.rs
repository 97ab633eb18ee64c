//! 摄取流水线状态机
//!
//! 显式的状态转换表使「不跳过任何阶段」与「写回仅在分类成功后
//! 发生」两条不变量可以机械检查。

use anemia_core::{AnemiaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 失败归因，供上传视图的内联横幅区分「谁之过」
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Storage,
    Classification,
    Persistence,
}

/// 流水线状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Uploading,
    Classifying,
    Persisting,
    Succeeded,
    Failed(FailureKind),
}

/// 流水线状态转换事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PipelineEvent {
    UploadStarted,
    UploadFinished,
    ClassificationSucceeded,
    ResultPersisted,
    StorageFailed,
    ClassificationFailed,
    PersistenceFailed,
    Reset,
}

/// 流水线状态机
#[derive(Debug)]
pub struct PipelineStateMachine {
    transitions: HashMap<(PipelineState, PipelineEvent), PipelineState>,
}

impl PipelineStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 正常路径：三个阶段严格串行
        transitions.insert(
            (PipelineState::Idle, PipelineEvent::UploadStarted),
            PipelineState::Uploading,
        );
        transitions.insert(
            (PipelineState::Uploading, PipelineEvent::UploadFinished),
            PipelineState::Classifying,
        );
        transitions.insert(
            (PipelineState::Classifying, PipelineEvent::ClassificationSucceeded),
            PipelineState::Persisting,
        );
        transitions.insert(
            (PipelineState::Persisting, PipelineEvent::ResultPersisted),
            PipelineState::Succeeded,
        );

        // 每个阶段的失败终态
        transitions.insert(
            (PipelineState::Uploading, PipelineEvent::StorageFailed),
            PipelineState::Failed(FailureKind::Storage),
        );
        transitions.insert(
            (PipelineState::Classifying, PipelineEvent::ClassificationFailed),
            PipelineState::Failed(FailureKind::Classification),
        );
        transitions.insert(
            (PipelineState::Persisting, PipelineEvent::PersistenceFailed),
            PipelineState::Failed(FailureKind::Persistence),
        );

        // 终态复位：下一次运行从Idle开始
        transitions.insert(
            (PipelineState::Succeeded, PipelineEvent::Reset),
            PipelineState::Idle,
        );
        for kind in [
            FailureKind::Storage,
            FailureKind::Classification,
            FailureKind::Persistence,
        ] {
            transitions.insert(
                (PipelineState::Failed(kind), PipelineEvent::Reset),
                PipelineState::Idle,
            );
        }

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: &PipelineState, event: &PipelineEvent) -> bool {
        self.transitions
            .contains_key(&(from.clone(), event.clone()))
    }

    /// 执行状态转换
    pub fn transition(&self, from: &PipelineState, event: &PipelineEvent) -> Result<PipelineState> {
        match self.transitions.get(&(from.clone(), event.clone())) {
            Some(to) => Ok(to.clone()),
            None => Err(AnemiaError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }
}

impl Default for PipelineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let sm = PipelineStateMachine::new();

        let s = sm
            .transition(&PipelineState::Idle, &PipelineEvent::UploadStarted)
            .unwrap();
        assert_eq!(s, PipelineState::Uploading);
        let s = sm.transition(&s, &PipelineEvent::UploadFinished).unwrap();
        assert_eq!(s, PipelineState::Classifying);
        let s = sm
            .transition(&s, &PipelineEvent::ClassificationSucceeded)
            .unwrap();
        assert_eq!(s, PipelineState::Persisting);
        let s = sm.transition(&s, &PipelineEvent::ResultPersisted).unwrap();
        assert_eq!(s, PipelineState::Succeeded);
    }

    #[test]
    fn test_persist_requires_observed_classification_success() {
        let sm = PipelineStateMachine::new();

        // ResultPersisted仅从Persisting可达，而Persisting仅经
        // ClassificationSucceeded可达
        for state in [
            PipelineState::Idle,
            PipelineState::Uploading,
            PipelineState::Classifying,
            PipelineState::Succeeded,
            PipelineState::Failed(FailureKind::Classification),
        ] {
            assert!(!sm.can_transition(&state, &PipelineEvent::ResultPersisted));
        }
        assert!(sm.can_transition(&PipelineState::Persisting, &PipelineEvent::ResultPersisted));
    }

    #[test]
    fn test_no_stage_skipped() {
        let sm = PipelineStateMachine::new();

        assert!(!sm.can_transition(&PipelineState::Idle, &PipelineEvent::UploadFinished));
        assert!(!sm.can_transition(&PipelineState::Idle, &PipelineEvent::ClassificationSucceeded));
        assert!(!sm.can_transition(&PipelineState::Uploading, &PipelineEvent::ClassificationSucceeded));
    }

    #[test]
    fn test_failures_map_to_their_stage() {
        let sm = PipelineStateMachine::new();

        assert_eq!(
            sm.transition(&PipelineState::Uploading, &PipelineEvent::StorageFailed)
                .unwrap(),
            PipelineState::Failed(FailureKind::Storage)
        );
        assert_eq!(
            sm.transition(&PipelineState::Classifying, &PipelineEvent::ClassificationFailed)
                .unwrap(),
            PipelineState::Failed(FailureKind::Classification)
        );
        assert_eq!(
            sm.transition(&PipelineState::Persisting, &PipelineEvent::PersistenceFailed)
                .unwrap(),
            PipelineState::Failed(FailureKind::Persistence)
        );
        // 分类失败不可能从Uploading直接到达
        assert!(!sm.can_transition(&PipelineState::Uploading, &PipelineEvent::ClassificationFailed));
    }

    #[test]
    fn test_reset_from_terminal_states() {
        let sm = PipelineStateMachine::new();

        assert!(sm.can_transition(&PipelineState::Succeeded, &PipelineEvent::Reset));
        assert!(sm.can_transition(
            &PipelineState::Failed(FailureKind::Persistence),
            &PipelineEvent::Reset
        ));
        // 进行中的运行不可复位
        assert!(!sm.can_transition(&PipelineState::Uploading, &PipelineEvent::Reset));

        let result = sm.transition(&PipelineState::Uploading, &PipelineEvent::Reset);
        assert!(result.is_err());
    }
}
