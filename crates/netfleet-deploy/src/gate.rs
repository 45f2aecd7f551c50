//! Confirmation gate between pipeline phases.
//!
//! The gate is an injected collaborator so the pipeline's control flow is
//! testable without a real terminal. It is consulted at exactly two
//! transitions: after pre-validation failures and before a live deploy.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

/// Decides whether the pipeline may progress past a gated transition.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Fixed-answer gate. Records the prompts it was asked so tests can
/// assert which transitions were gated.
pub struct AutoGate {
    answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl AutoGate {
    pub fn approve() -> Self {
        Self {
            answer: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn deny() -> Self {
        Self {
            answer: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationGate for AutoGate {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        info!(prompt, answer = self.answer, "auto gate");
        self.answer
    }
}

/// Interactive gate reading the answer from stdin; only the literal
/// "yes" confirms.
pub struct StdinGate;

#[async_trait]
impl ConfirmationGate for StdinGate {
    async fn confirm(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            print!("{} (yes/no): ", prompt);
            std::io::stdout().flush().ok();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).ok();
            line.trim().eq_ignore_ascii_case("yes")
        })
        .await
        .unwrap_or(false)
    }
}
