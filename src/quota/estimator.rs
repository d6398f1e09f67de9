// ABOUTME: Pre-flight token cost estimate for an outbound chat request.
// ABOUTME: Deliberately over-estimates: text cost + fixed overhead + response budget.

use crate::llm::Message;

/// Conservative, deterministic token estimator.
///
/// The estimate is `ceil(chars / chars_per_token)` for the prompt text, plus
/// a per-message framing cost, plus a fixed per-request overhead, plus the
/// full requested response budget. It never returns less than the response
/// budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimator {
    chars_per_token: u32,
    per_message_overhead: u32,
    per_request_overhead: u32,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            per_message_overhead: 4,
            per_request_overhead: 16,
        }
    }
}

impl TokenEstimator {
    /// Create an estimator with custom constants.
    ///
    /// `chars_per_token` of zero is treated as one.
    pub fn new(chars_per_token: u32, per_message_overhead: u32, per_request_overhead: u32) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
            per_message_overhead,
            per_request_overhead,
        }
    }

    /// Estimate the cost of sending `message` and receiving up to `max_response_tokens`.
    pub fn estimate(&self, message: &str, max_response_tokens: u32) -> u64 {
        self.text_tokens(message)
            + u64::from(self.per_message_overhead)
            + u64::from(self.per_request_overhead)
            + u64::from(max_response_tokens)
    }

    /// Estimate the cost of a full message list, system preamble included.
    pub fn estimate_messages(&self, messages: &[Message], max_response_tokens: u32) -> u64 {
        let prompt: u64 = messages
            .iter()
            .map(|m| self.text_tokens(&m.content) + u64::from(self.per_message_overhead))
            .sum();
        prompt + u64::from(self.per_request_overhead) + u64::from(max_response_tokens)
    }

    fn text_tokens(&self, text: &str) -> u64 {
        let chars = text.chars().count() as u64;
        chars.div_ceil(u64::from(self.chars_per_token))
    }
}
