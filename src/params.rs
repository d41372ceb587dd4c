use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Map, Value};

use crate::errors::{ChatError, ChatResult};

/// Optional sampling controls for one request.
///
/// Unset values are omitted from the outgoing payload rather than defaulted
/// client-side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParameters {
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub temperature: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub stop_sequences: Option<Vec<String>>,
    pub response_format: Option<Value>,
    pub seed: Option<i64>,
    pub logprobs: Option<bool>,
    pub top_logprobs: Option<u32>,
    pub retry: RetryPolicy,
}

impl RequestParameters {
    /// Check every supplied value against its documented range.
    ///
    /// The first violation fails with the offending parameter named; nothing
    /// is sent over the wire after a failure here.
    pub fn validate(&self) -> ChatResult<()> {
        if let Some(top_p) = self.top_p {
            check_range("top_p", top_p, 0.0, 1.0)?;
        }
        if let Some(temperature) = self.temperature {
            check_range("temperature", temperature, 0.0, 2.0)?;
        }
        if let Some(presence_penalty) = self.presence_penalty {
            check_range("presence_penalty", presence_penalty, -2.0, 2.0)?;
        }
        if let Some(frequency_penalty) = self.frequency_penalty {
            check_range("frequency_penalty", frequency_penalty, -2.0, 2.0)?;
        }
        if let Some(top_logprobs) = self.top_logprobs {
            if top_logprobs > 20 {
                return Err(ChatError::Validation {
                    parameter: "top_logprobs",
                    reason: format!("must be between 0 and 20, got {top_logprobs}"),
                });
            }
        }
        Ok(())
    }

    /// Write the supplied values into a request payload.
    pub fn apply_to(&self, payload: &mut Map<String, Value>) {
        if let Some(tokens) = self.max_output_tokens {
            payload.insert("max_tokens".to_string(), json!(tokens));
        }
        if let Some(top_p) = self.top_p {
            payload.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(temperature) = self.temperature {
            payload.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(stop) = &self.stop_sequences {
            payload.insert("stop".to_string(), json!(stop));
        }
        if let Some(penalty) = self.presence_penalty {
            payload.insert("presence_penalty".to_string(), json!(penalty));
        }
        if let Some(penalty) = self.frequency_penalty {
            payload.insert("frequency_penalty".to_string(), json!(penalty));
        }
        if let Some(seed) = self.seed {
            payload.insert("seed".to_string(), json!(seed));
        }
        if let Some(logprobs) = self.logprobs {
            payload.insert("logprobs".to_string(), json!(logprobs));
            if let Some(top) = self.top_logprobs {
                payload.insert("top_logprobs".to_string(), json!(top));
            }
        }
        if let Some(format) = &self.response_format {
            payload.insert("response_format".to_string(), format.clone());
        }
    }
}

fn check_range(parameter: &'static str, value: f32, min: f32, max: f32) -> ChatResult<()> {
    if value < min || value > max {
        return Err(ChatError::Validation {
            parameter,
            reason: format!("must be between {min} and {max}, got {value}"),
        });
    }
    Ok(())
}

/// Backoff strategy for the non-streaming request path.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-issuing after a failed attempt (0-based).
    ///
    /// Grows geometrically from the base delay; jitter adds up to half the
    /// computed delay again.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.0..0.5);
            exp + exp.mul_f64(factor)
        } else {
            exp
        }
    }
}

/// Cloneable flag checked between retry attempts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
