//! Caller-ID pattern statistics
//!
//! Backs the Dispatcher's smart caller-ID selection: per
//! 3-digit destination prefix, a table of candidate patterns (with 'X'
//! placeholders) scored by historical answer rate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::shared::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdPattern {
    pub prefix: String,
    pub pattern: String,
    pub attempts: i64,
    pub answers: i64,
}

impl CallerIdPattern {
    /// Historical answer-rate score; a pattern with no prior attempts
    /// scores 0 so it never wins the (non-exploration) selection before it
    /// has accrued the 10-attempt threshold the Dispatcher requires.
    pub fn score(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.answers as f64 / self.attempts as f64
        }
    }

    pub fn has_enough_history(&self) -> bool {
        self.attempts >= 10
    }
}

#[async_trait]
pub trait CallerIdStatsRepository: Send + Sync {
    async fn list_for_prefix(&self, prefix: &str) -> Result<Vec<CallerIdPattern>>;
    async fn record_attempt(&self, prefix: &str, pattern: &str) -> Result<()>;
    async fn record_answer(&self, prefix: &str, pattern: &str) -> Result<()>;
}
