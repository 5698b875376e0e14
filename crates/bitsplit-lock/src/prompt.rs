//! Yes/no confirmation for risky operations
//!
//! The engine never talks to a terminal; the CLI supplies an implementation
//! that reads stdin, tests supply fixed answers.

/// Ask the operator a yes/no question.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> bool;
}

/// Answers yes to everything (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _question: &str) -> bool {
        true
    }
}

/// Answers no to everything; risky operations are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeNo;

impl Confirm for AssumeNo {
    fn confirm(&mut self, _question: &str) -> bool {
        false
    }
}
