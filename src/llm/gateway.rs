//! Retry + provider-fallback gateway around an ordered list of generation
//! clients.
//!
//! The policy is an explicit table, not nested control flow: per attempt
//! error kind, either retry the same client with capped exponential backoff
//! or move to the next client immediately. Exhausting the list yields
//! `GenerationExhausted` with the last error seen per attempted client.

use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::insight::{GenerationResult, Prompt};

use super::{DynGenerationClient, GenerationConfig, GenerationError};

/// Retry tuning for one client in the ordered list.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per client, first try included.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// `base_delay × 2^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What the policy table says to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    /// Timeout / Unavailable: transient, retry the same client.
    RetrySameClient,
    /// InvalidResponse / RateLimited: local retries won't help, fall through.
    NextClient,
}

fn directive_for(error: &GenerationError) -> Directive {
    match error {
        GenerationError::Timeout | GenerationError::Unavailable(_) => Directive::RetrySameClient,
        GenerationError::InvalidResponse(_) | GenerationError::RateLimited => {
            Directive::NextClient
        }
    }
}

/// Last error recorded for one attempted client.
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: String,
    pub attempts: u32,
    pub last_error: GenerationError,
}

/// Terminal failure: every configured client was attempted per policy.
#[derive(Debug, Error)]
#[error("generation exhausted after {} provider(s); last: {}", .attempts.len(), last_summary(.attempts))]
pub struct GenerationExhausted {
    /// One entry per attempted client, in fallback order.
    pub attempts: Vec<ProviderFailure>,
}

fn last_summary(attempts: &[ProviderFailure]) -> String {
    attempts
        .last()
        .map(|f| format!("{} ({})", f.provider, f.last_error.kind()))
        .unwrap_or_else(|| "no clients configured".to_string())
}

pub struct RetryingGateway {
    clients: Vec<DynGenerationClient>,
    policy: RetryPolicy,
    config: GenerationConfig,
}

impl RetryingGateway {
    /// `primary` first, then fallbacks in order. The list length is
    /// unbounded; a single secondary is just the one-element case.
    pub fn new(
        primary: DynGenerationClient,
        fallbacks: Vec<DynGenerationClient>,
        policy: RetryPolicy,
        config: GenerationConfig,
    ) -> Self {
        let mut clients = Vec::with_capacity(1 + fallbacks.len());
        clients.push(primary);
        clients.extend(fallbacks);
        Self {
            clients,
            policy,
            config,
        }
    }

    pub fn provider_chain(&self) -> Vec<&'static str> {
        self.clients.iter().map(|c| c.provider_name()).collect()
    }

    /// Run the prompt through the client list per the policy table. On
    /// success via any non-primary client, `fallback_used` is set and
    /// `provider_used` names the winner.
    pub async fn generate(
        &self,
        prompt: &Prompt,
    ) -> Result<GenerationResult, GenerationExhausted> {
        let mut failures: Vec<ProviderFailure> = Vec::new();

        for (client_idx, client) in self.clients.iter().enumerate() {
            let provider = client.provider_name();
            let mut attempts_made = 0u32;
            let mut last_error: Option<GenerationError> = None;

            for attempt in 0..self.policy.max_retries {
                attempts_made += 1;
                counter!("llm_generate_attempts_total", "provider" => provider).increment(1);

                match client.generate(prompt, &self.config).await {
                    Ok(mut result) => {
                        result.provider_used = provider.to_string();
                        result.model_version = client.model_name().to_string();
                        result.fallback_used = client_idx > 0;
                        if result.fallback_used {
                            counter!("llm_fallback_success_total", "provider" => provider)
                                .increment(1);
                        }
                        return Ok(result);
                    }
                    Err(err) => {
                        debug!(
                            provider,
                            attempt,
                            kind = err.kind(),
                            "generation attempt failed"
                        );
                        let directive = directive_for(&err);
                        last_error = Some(err);
                        match directive {
                            Directive::RetrySameClient => {
                                if attempt + 1 < self.policy.max_retries {
                                    tokio::time::sleep(self.policy.backoff(attempt)).await;
                                }
                            }
                            Directive::NextClient => break,
                        }
                    }
                }
            }

            // max_retries >= 1 guarantees at least one attempt, so the error
            // is always populated here.
            if let Some(last_error) = last_error {
                warn!(
                    provider,
                    attempts = attempts_made,
                    kind = last_error.kind(),
                    "provider exhausted, moving to next client"
                );
                failures.push(ProviderFailure {
                    provider: provider.to_string(),
                    attempts: attempts_made,
                    last_error,
                });
            }
        }

        counter!("llm_generation_exhausted_total").increment(1);
        Err(GenerationExhausted { attempts: failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(350)); // capped
        assert_eq!(p.backoff(10), Duration::from_millis(350));
    }

    #[test]
    fn policy_table_routes_kinds() {
        assert_eq!(
            directive_for(&GenerationError::Timeout),
            Directive::RetrySameClient
        );
        assert_eq!(
            directive_for(&GenerationError::Unavailable("down".into())),
            Directive::RetrySameClient
        );
        assert_eq!(
            directive_for(&GenerationError::InvalidResponse("bad".into())),
            Directive::NextClient
        );
        assert_eq!(
            directive_for(&GenerationError::RateLimited),
            Directive::NextClient
        );
    }
}
