use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::backend::GenerationClient;
use crate::error::{AttemptError, BackendError, ProposeError, ValidationErrorKind};
use crate::market::MarketProposal;
use crate::session::{State, reference_date};
use crate::template;
use crate::validator::validate;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    // Delay after the n-th consecutive backend failure: base doubled per
    // failure, capped.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_cap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Valid,
    Malformed,
    SchemaViolation,
    BackendFailure,
}

/// One generate-then-validate round, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationAttempt {
    pub attempt_number: u32,
    pub raw_response: String,
    pub parse_result: AttemptResult,
    pub error_detail: Option<String>,
    pub elapsed: Duration,
}

/// An accepted proposal together with every attempt it took, the accepted one last.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub proposal: MarketProposal,
    pub attempts: Vec<GenerationAttempt>,
}

/// Drives a generation backend until it produces a valid proposal.
///
/// Validation failures are retried immediately. Backend failures and
/// per-attempt timeouts are retried after an exponential backoff. Neither
/// escapes this type except as the terminal [`ProposeError::ExhaustedRetries`].
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    cancellation: CancellationToken,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub async fn propose<B: GenerationClient>(
        &self,
        template: &str,
        state: &State,
        backend: &B,
    ) -> Result<Proposal, ProposeError> {
        let today = reference_date(state)?;
        let prompt = template::render(template, state)?;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts: Vec<GenerationAttempt> = Vec::with_capacity(max_attempts as usize);
        let mut consecutive_backend_failures = 0;
        let mut last_error = None;

        for attempt_number in 1..=max_attempts {
            if self.cancellation.is_cancelled() {
                return Err(self.cancelled(attempts));
            }

            let started = Instant::now();
            let generated = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Err(self.cancelled(attempts)),
                result = timeout(self.policy.attempt_timeout, backend.generate(&prompt)) => {
                    result.unwrap_or(Err(BackendError::Timeout))
                }
            };

            let raw_response = match generated {
                Ok(raw_response) => raw_response,
                Err(error) => {
                    consecutive_backend_failures += 1;
                    log::warn!("Attempt {}/{} backend failure: {}", attempt_number, max_attempts, error);
                    attempts.push(GenerationAttempt {
                        attempt_number,
                        raw_response: String::new(),
                        parse_result: AttemptResult::BackendFailure,
                        error_detail: Some(error.to_string()),
                        elapsed: started.elapsed(),
                    });
                    last_error = Some(AttemptError::Backend(error));

                    if attempt_number < max_attempts {
                        let delay = self.policy.backoff_delay(consecutive_backend_failures);
                        log::debug!("Backing off for {:?}", delay);
                        tokio::select! {
                            biased;
                            _ = self.cancellation.cancelled() => return Err(self.cancelled(attempts)),
                            _ = sleep(delay) => {}
                        }
                    }
                    continue;
                }
            };
            consecutive_backend_failures = 0;

            match validate(&raw_response, today) {
                Ok(proposal) => {
                    attempts.push(GenerationAttempt {
                        attempt_number,
                        raw_response,
                        parse_result: AttemptResult::Valid,
                        error_detail: None,
                        elapsed: started.elapsed(),
                    });
                    log_attempts("accepted", &attempts);
                    return Ok(Proposal { proposal, attempts });
                }
                Err(error) => {
                    log::warn!("Attempt {}/{} rejected: {}", attempt_number, max_attempts, error);
                    let parse_result = match error.kind {
                        ValidationErrorKind::MalformedJson => AttemptResult::Malformed,
                        _ => AttemptResult::SchemaViolation,
                    };
                    attempts.push(GenerationAttempt {
                        attempt_number,
                        raw_response,
                        parse_result,
                        error_detail: Some(error.to_string()),
                        elapsed: started.elapsed(),
                    });
                    last_error = Some(AttemptError::Validation(error));
                }
            }
        }

        log_attempts("exhausted", &attempts);
        let last_error = last_error.unwrap_or_else(|| {
            AttemptError::Backend(BackendError::Unavailable("no attempt was made".to_string()))
        });
        Err(ProposeError::ExhaustedRetries {
            last_error,
            attempts,
        })
    }

    fn cancelled(&self, attempts: Vec<GenerationAttempt>) -> ProposeError {
        log_attempts("cancelled", &attempts);
        ProposeError::Cancelled { attempts }
    }
}

// Trailing diagnostic log of every attempt of a run.
fn log_attempts(verdict: &str, attempts: &[GenerationAttempt]) {
    log::info!("Proposal {} after {} attempt(s)", verdict, attempts.len());
    for attempt in attempts {
        log::debug!(
            "  #{} {:?} in {:?}{}",
            attempt.attempt_number,
            attempt.parse_result,
            attempt.elapsed,
            attempt
                .error_detail
                .as_ref()
                .map(|detail| format!(": {}", detail))
                .unwrap_or_default()
        );
    }
}
