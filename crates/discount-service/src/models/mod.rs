//! 领域模型定义

mod discount_code;
mod enums;

pub use discount_code::{DiscountCode, NewDiscountCode};
pub use enums::{CodeState, UseCodeResult};
