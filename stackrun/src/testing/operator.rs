//! An operator that replays scripted answers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::operator::Operator;

/// Operator double that records prompts and reported lines.
///
/// Answers are consumed in order; once exhausted every confirmation is
/// declined.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
    lines: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    /// Creates an operator that declines everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an operator that gives `answers` in order.
    #[must_use]
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            ..Self::default()
        }
    }

    /// Returns every prompt asked so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Returns every reported line so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Returns true if any reported line contains `needle`.
    #[must_use]
    pub fn reported(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().push(prompt.to_string());
        self.answers.lock().pop_front().unwrap_or(false)
    }

    fn report(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
