use std::fmt;

use log::{debug, info};
use serde::Serialize;

use super::error::PinError;

pub const PIN_LENGTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinSlot {
    #[default]
    Empty,
    Digit(u8),
}

impl PinSlot {
    /// Text contributed to the entered code; empty slots contribute nothing.
    fn code_text(&self) -> String {
        match self {
            PinSlot::Empty => String::new(),
            PinSlot::Digit(d) => d.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinValidationResult {
    Correct,
    Incorrect,
}

impl fmt::Display for PinValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinValidationResult::Correct => write!(f, "correct"),
            PinValidationResult::Incorrect => write!(f, "incorrect"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinEntryState {
    Empty,
    PartiallyFilled { written: usize },
    Full,
    /// Correct code entered; stays here until an external reset.
    Validated,
}

pub struct PinEntryStateMachine {
    slots: [PinSlot; PIN_LENGTH],
    cursor: usize,
    reference_code: String,
    verdict: Option<PinValidationResult>,
    failed_attempts: u32,
}

impl PinEntryStateMachine {
    pub fn new(reference_code: &str) -> Result<Self, PinError> {
        if reference_code.len() != PIN_LENGTH || !reference_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PinError::InvalidReference(format!(
                "expected {} digits, got {:?}",
                PIN_LENGTH, reference_code
            )));
        }

        Ok(Self {
            slots: [PinSlot::Empty; PIN_LENGTH],
            cursor: 0,
            reference_code: reference_code.to_string(),
            verdict: None,
            failed_attempts: 0,
        })
    }

    /// Write `digit` (clamped to 0..=9) at the cursor and advance it.
    ///
    /// Returns the slot written. Once every slot holds a digit further writes
    /// are rejected until [`reset`](Self::reset) or a failed validation.
    pub fn write_digit(&mut self, digit: i32) -> Result<usize, PinError> {
        if self.cursor >= PIN_LENGTH {
            debug!("PIN buffer full, rejecting digit {}", digit);
            return Err(PinError::BufferFull);
        }

        let clamped = digit.clamp(0, 9) as u8;
        let slot = self.cursor;
        self.slots[slot] = PinSlot::Digit(clamped);
        self.cursor = (self.cursor + 1).min(PIN_LENGTH);

        debug!("PIN slot {} = {}", slot, clamped);
        Ok(slot)
    }

    /// Compare the entered code with the reference. A mismatch clears the buffer.
    pub fn validate(&mut self) -> PinValidationResult {
        let entered = self.entered_code();

        let result = if entered == self.reference_code {
            PinValidationResult::Correct
        } else {
            PinValidationResult::Incorrect
        };

        match result {
            PinValidationResult::Correct => {
                info!("🔓 PIN correct");
            }
            PinValidationResult::Incorrect => {
                self.failed_attempts += 1;
                info!(
                    "🔒 PIN incorrect ({} digits entered, {} failed attempts)",
                    self.cursor, self.failed_attempts
                );
                self.clear();
            }
        }

        self.verdict = Some(result);
        result
    }

    pub fn reset(&mut self) {
        self.clear();
        self.verdict = None;
    }

    pub fn state(&self) -> PinEntryState {
        match (self.verdict, self.cursor) {
            (Some(PinValidationResult::Correct), _) => PinEntryState::Validated,
            (_, 0) => PinEntryState::Empty,
            (_, n) if n >= PIN_LENGTH => PinEntryState::Full,
            (_, written) => PinEntryState::PartiallyFilled { written },
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn slots(&self) -> &[PinSlot; PIN_LENGTH] {
        &self.slots
    }

    pub fn is_full(&self) -> bool {
        self.cursor >= PIN_LENGTH
    }

    /// Verdict of the last validation, cleared by [`reset`](Self::reset).
    pub fn verdict(&self) -> Option<PinValidationResult> {
        self.verdict
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn entered_code(&self) -> String {
        self.slots.iter().map(PinSlot::code_text).collect()
    }

    /// Per-slot display text: `placeholder` for empty slots, `mask` (if any)
    /// or the digit for filled ones.
    pub fn slot_texts(&self, placeholder: &str, mask: Option<char>) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| match (slot, mask) {
                (PinSlot::Empty, _) => placeholder.to_string(),
                (PinSlot::Digit(_), Some(m)) => m.to_string(),
                (PinSlot::Digit(d), None) => d.to_string(),
            })
            .collect()
    }

    fn clear(&mut self) {
        self.slots = [PinSlot::Empty; PIN_LENGTH];
        self.cursor = 0;
    }
}
