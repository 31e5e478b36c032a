pub mod pin_pad;

pub use pin_pad::{DigitPinSession, InputEvent, SessionError, SessionOutcome, SessionStatus};
