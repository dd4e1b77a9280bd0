//! 折扣码生成器
//!
//! 纯内存生成随机定长字母数字串，不感知持久化状态。随机源为 `rand::rng()`
//! （ChaCha 系 CSPRNG，由操作系统熵定期重播种），避免折扣码可被预测。

use std::collections::HashSet;

use rand::Rng;

/// 折扣码字符集：大写字母 + 数字
pub const CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 折扣码生成器接口
#[cfg_attr(test, mockall::automock)]
pub trait CodeGenerator: Send + Sync {
    /// 生成 `count` 个两两不同、长度为 `length` 的折扣码
    ///
    /// `length == 0` 或请求数量超过码空间时返回空集，由调用方视为错误。
    fn generate_unique_codes(&self, count: usize, length: usize) -> HashSet<String>;
}

/// 基于密码学安全随机源的生成器
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl RandomCodeGenerator {
    pub fn new() -> Self {
        Self
    }

    fn generate_code<R: Rng>(rng: &mut R, length: usize) -> String {
        (0..length)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// 长度为 `length` 的码空间大小，溢出时视为无限
fn code_space(length: usize) -> Option<u128> {
    let exp = u32::try_from(length).ok()?;
    (CODE_ALPHABET.len() as u128).checked_pow(exp)
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate_unique_codes(&self, count: usize, length: usize) -> HashSet<String> {
        if length == 0 {
            return HashSet::new();
        }
        if let Some(space) = code_space(length) {
            if count as u128 > space {
                return HashSet::new();
            }
        }

        let mut rng = rand::rng();
        let mut codes = HashSet::with_capacity(count);
        while codes.len() < count {
            codes.insert(Self::generate_code(&mut rng, length));
        }
        codes
    }
}
