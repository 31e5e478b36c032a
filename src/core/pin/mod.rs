//! PIN 输入状态机
//!
//! Empty → PartiallyFilled → Full → Validated（正确）
//!                                 → Empty（错误，清空重来）

pub mod error;
pub mod state_machine;

pub use error::PinError;
pub use state_machine::{
    PinEntryState, PinEntryStateMachine, PinSlot, PinValidationResult, PIN_LENGTH,
};
