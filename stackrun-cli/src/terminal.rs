//! The operator at an interactive terminal.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use stackrun::operator::Operator;

/// Prints to stdout and reads answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalOperator;

impl TerminalOperator {
    /// Creates a terminal operator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Returns true for an explicit yes.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl Operator for TerminalOperator {
    async fn confirm(&self, prompt: &str) -> bool {
        let mut stdout = tokio::io::stdout();
        if let Err(e) = stdout.write_all(format!("\n{prompt}: ").as_bytes()).await {
            warn!(error = %e, "Could not write prompt");
            return false;
        }
        let _ = stdout.flush().await;

        let mut answer = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut answer).await {
            Ok(_) => is_yes(&answer),
            Err(e) => {
                warn!(error = %e, "Could not read answer, treating as no");
                false
            }
        }
    }

    fn report(&self, line: &str) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" Y\n"));
        assert!(is_yes("yes"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }
}
