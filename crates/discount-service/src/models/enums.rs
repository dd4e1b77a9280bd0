//! 枚举类型定义

use serde::{Deserialize, Serialize};

/// 折扣码状态
///
/// 唯一的状态迁移是 `Unused -> Used`，进入 `Used` 后不再变化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeState {
    Unused,
    Used,
}

/// 核销结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UseCodeResult {
    /// 本次调用完成了状态迁移
    Success,
    /// 不存在该折扣码
    Missing,
    /// 折扣码已被核销（包括并发竞争失败）
    AlreadyUsed,
    /// 空码、取消或未预期的错误
    Invalid,
}

impl UseCodeResult {
    /// 指标标签
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Missing => "missing",
            Self::AlreadyUsed => "already_used",
            Self::Invalid => "invalid",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_code_result_labels() {
        assert_eq!(UseCodeResult::Success.as_str(), "success");
        assert_eq!(UseCodeResult::AlreadyUsed.as_str(), "already_used");
        assert!(UseCodeResult::Success.is_success());
        assert!(!UseCodeResult::Missing.is_success());
    }

    #[test]
    fn test_use_code_result_serde() {
        let json = serde_json::to_string(&UseCodeResult::AlreadyUsed).unwrap();
        assert_eq!(json, "\"ALREADY_USED\"");
    }
}
