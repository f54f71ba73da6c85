//! 章节序列器状态

use serde::Serialize;

/// 章节序列器状态
///
/// 同一次运行中最多只有一个章节处于 Generating / Validating / Retrying。
/// attempt 从 1 开始计数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SequencerState {
    Pending { index: u32 },
    Generating { index: u32, attempt: u32 },
    Validating { index: u32, attempt: u32 },
    Accepted { index: u32 },
    Retrying { index: u32, attempt: u32 },
    Failed { index: u32 },
    Complete,
}

impl SequencerState {
    /// 当前状态所属的章节编号（Complete 没有）
    pub fn index(&self) -> Option<u32> {
        match self {
            SequencerState::Pending { index }
            | SequencerState::Generating { index, .. }
            | SequencerState::Validating { index, .. }
            | SequencerState::Accepted { index }
            | SequencerState::Retrying { index, .. }
            | SequencerState::Failed { index } => Some(*index),
            SequencerState::Complete => None,
        }
    }

    /// 是否有请求在途
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SequencerState::Generating { .. }
                | SequencerState::Validating { .. }
                | SequencerState::Retrying { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SequencerState::Failed { .. } | SequencerState::Complete)
    }

    /// 状态转换是否合法
    pub fn can_transition_to(&self, next: &SequencerState) -> bool {
        use SequencerState::*;
        match (*self, *next) {
            (Pending { index: a }, Generating { index: b, attempt }) => a == b && attempt == 1,
            (Generating { index: a, attempt: x }, Validating { index: b, attempt: y }) => {
                a == b && x == y
            }
            (Validating { index: a, .. }, Accepted { index: b }) => a == b,
            (Validating { index: a, attempt: x }, Retrying { index: b, attempt: y }) => {
                a == b && y == x + 1
            }
            (Validating { index: a, .. }, Failed { index: b }) => a == b,
            // 服务调用失败（永久错误或重试耗尽）
            (Generating { index: a, .. }, Failed { index: b }) => a == b,
            (Retrying { index: a, attempt: x }, Generating { index: b, attempt: y }) => {
                a == b && x == y
            }
            (Accepted { index: a }, Pending { index: b }) => b == a + 1,
            (Accepted { .. }, Complete) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SequencerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequencerState::Pending { index } => write!(f, "Pending({})", index),
            SequencerState::Generating { index, attempt } => {
                write!(f, "Generating({}, attempt {})", index, attempt)
            }
            SequencerState::Validating { index, attempt } => {
                write!(f, "Validating({}, attempt {})", index, attempt)
            }
            SequencerState::Accepted { index } => write!(f, "Accepted({})", index),
            SequencerState::Retrying { index, attempt } => {
                write!(f, "Retrying({}, attempt {})", index, attempt)
            }
            SequencerState::Failed { index } => write!(f, "Failed({})", index),
            SequencerState::Complete => write!(f, "Complete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SequencerState::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            Pending { index: 1 },
            Generating { index: 1, attempt: 1 },
            Validating { index: 1, attempt: 1 },
            Retrying { index: 1, attempt: 2 },
            Generating { index: 1, attempt: 2 },
            Validating { index: 1, attempt: 2 },
            Accepted { index: 1 },
            Pending { index: 2 },
            Generating { index: 2, attempt: 1 },
            Validating { index: 2, attempt: 1 },
            Accepted { index: 2 },
            Complete,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(&pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_rejects_skipping_chapters() {
        assert!(!Accepted { index: 1 }.can_transition_to(&Pending { index: 3 }));
        assert!(!Pending { index: 2 }.can_transition_to(&Generating { index: 3, attempt: 1 }));
        assert!(!Generating { index: 1, attempt: 1 }.can_transition_to(&Accepted { index: 1 }));
        assert!(!Failed { index: 1 }.can_transition_to(&Pending { index: 2 }));
        assert!(!Complete.can_transition_to(&Pending { index: 1 }));
    }

    #[test]
    fn test_in_flight_states() {
        assert!(Generating { index: 1, attempt: 1 }.is_in_flight());
        assert!(Retrying { index: 1, attempt: 2 }.is_in_flight());
        assert!(!Accepted { index: 1 }.is_in_flight());
        assert!(Failed { index: 1 }.is_terminal());
        assert_eq!(Complete.index(), None);
        assert_eq!(Validating { index: 4, attempt: 1 }.index(), Some(4));
    }

    #[test]
    fn test_serializes_with_state_tag() {
        let json = serde_json::to_value(Retrying { index: 2, attempt: 3 }).unwrap();
        assert_eq!(json["state"], "retrying");
        assert_eq!(json["index"], 2);
        assert_eq!(json["attempt"], 3);
    }
}
