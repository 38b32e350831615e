//! The human at the terminal, as a capability.
//!
//! The orchestrator never touches stdin or stdout directly: diagnostics go
//! through [`Operator::report`] and destructive decisions through
//! [`Operator::confirm`].

use async_trait::async_trait;
use tracing::info;

/// Interaction with whoever is running the tool.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Asks a yes/no question. Anything but an explicit yes is a no.
    async fn confirm(&self, prompt: &str) -> bool;

    /// Shows one line of user-visible output.
    fn report(&self, line: &str);
}

/// An operator that answers every question the same way without asking.
///
/// Used when the tool runs unattended; reported lines go to the log.
#[derive(Debug, Clone, Copy)]
pub struct UnattendedOperator {
    answer: bool,
}

impl UnattendedOperator {
    /// Creates an operator that always gives `answer`.
    #[must_use]
    pub fn new(answer: bool) -> Self {
        Self { answer }
    }

    /// Creates an operator that declines every confirmation.
    #[must_use]
    pub fn declining() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl Operator for UnattendedOperator {
    async fn confirm(&self, prompt: &str) -> bool {
        info!(prompt, answer = self.answer, "Answering confirmation unattended");
        self.answer
    }

    fn report(&self, line: &str) {
        info!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unattended_operator_answers() {
        assert!(!UnattendedOperator::declining().confirm("Delete?").await);
        assert!(UnattendedOperator::new(true).confirm("Delete?").await);
        UnattendedOperator::declining().report("Stack status: CREATE_FAILED");
    }

    #[test]
    fn test_operator_as_trait_object() {
        let operator: Box<dyn Operator> = Box::new(UnattendedOperator::declining());
        assert!(!tokio_test::block_on(operator.confirm("Delete stack 'demo'? [y/N]")));
    }
}
