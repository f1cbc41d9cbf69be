use harvest_core::{CoreError, ErrorExt, FetchError, RetrySettings};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Backoff and circuit-breaker knobs for requests to the search API.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff, in milliseconds
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Share of the delay added as random jitter, 0.0 to 1.0
    pub jitter_factor: f64,
    /// Consecutive failed operations before the circuit opens
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a trial request
    pub recovery_timeout_s: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            backoff_multiplier: settings.backoff_multiplier,
            jitter_factor: settings.jitter_factor.clamp(0.0, 1.0),
            failure_threshold: settings.failure_threshold.max(1),
            recovery_timeout_s: settings.recovery_timeout_s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Stops hammering the endpoint once it keeps failing.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            failure_threshold: config.failure_threshold,
            recovery_timeout: Duration::from_secs(config.recovery_timeout_s),
        }
    }

    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                let recovered = self
                    .last_failure_time
                    .is_some_and(|at| at.elapsed() >= self.recovery_timeout);
                if recovered {
                    debug!("Circuit breaker transitioning to half-open for recovery test");
                    self.state = CircuitBreakerState::HalfOpen;
                }
                recovered
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitBreakerState::HalfOpen {
            info!("Circuit breaker recovery successful, returning to closed state");
            self.state = CircuitBreakerState::Closed;
            self.last_failure_time = None;
        }
        self.failure_count = 0;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            CircuitBreakerState::Closed if self.failure_count >= self.failure_threshold => {
                warn!(
                    "Circuit breaker opening due to {} consecutive failures",
                    self.failure_count
                );
                self.state = CircuitBreakerState::Open;
            }
            CircuitBreakerState::HalfOpen => {
                warn!("Circuit breaker recovery failed, returning to open state");
                self.state = CircuitBreakerState::Open;
            }
            _ => {}
        }
    }

    pub fn get_state(&self) -> CircuitBreakerState {
        self.state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Back off exponentially, then retry
    Retry,
    /// Retry after the delay the server asked for
    RetryWithDelay(Duration),
    NoRetry,
}

/// Decide whether a failed request is worth repeating. A wait requested by
/// the server takes precedence over the computed backoff.
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None if error.is_retryable() => RetryStrategy::Retry,
        None => RetryStrategy::NoRetry,
    }
}

/// Backoff after failed attempt `attempt` (0-based), capped at the maximum.
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let multiplier = config.backoff_multiplier.max(1.0).powi(attempt as i32);
    let delay_ms =
        (config.base_delay_ms as f64 * multiplier).min(config.max_delay_ms as f64) as u64;
    let exponential_delay = Duration::from_millis(delay_ms);

    let jitter_range = (delay_ms as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
    pub circuit_breaker_trips: u64,
}

/// Wraps request futures with backoff and a shared circuit breaker.
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    circuit_breaker: Arc<Mutex<CircuitBreaker>>,
    metrics: Arc<Mutex<RetryMetrics>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        let circuit_breaker = Arc::new(Mutex::new(CircuitBreaker::new(&config)));
        Self {
            config,
            circuit_breaker,
            metrics: Arc::new(Mutex::new(RetryMetrics::default())),
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget runs out. The last error is returned unchanged.
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        if !lock(&self.circuit_breaker).allow_request() {
            lock(&self.metrics).circuit_breaker_trips += 1;
            warn!("Circuit breaker is open, blocking request for {}", operation_name);
            return Err(FetchError::CircuitOpen.into());
        }

        let mut attempt = 0;
        let mut total_delay = Duration::ZERO;
        let last_error = loop {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            let error = match operation().await {
                Ok(result) => {
                    lock(&self.circuit_breaker).record_success();
                    if attempt > 0 {
                        let mut metrics = lock(&self.metrics);
                        metrics.total_retries += attempt as u64;
                        metrics.successful_retries += 1;
                        info!(
                            "Operation {} succeeded after {} retries (total delay: {:?})",
                            operation_name, attempt, total_delay
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            debug!("Attempt {} failed for {}: {}", attempt + 1, operation_name, error);

            let has_budget = attempt + 1 < self.config.max_attempts;
            let delay = match get_retry_strategy(&error) {
                RetryStrategy::NoRetry => {
                    debug!("Not retrying {} due to error type: {}", operation_name, error);
                    // Permanent answers say nothing about endpoint health.
                    return Err(error);
                }
                _ if !has_budget => break error,
                RetryStrategy::Retry => calculate_delay(attempt, &self.config),
                RetryStrategy::RetryWithDelay(delay) => {
                    delay.min(Duration::from_millis(self.config.max_delay_ms))
                }
            };

            info!("Retrying {} in {:?} due to: {}", operation_name, delay, error);
            total_delay += delay;
            sleep(delay).await;
            attempt += 1;
        };

        lock(&self.circuit_breaker).record_failure();
        {
            let mut metrics = lock(&self.metrics);
            metrics.total_retries += attempt as u64;
            metrics.failed_operations += 1;
        }

        error!(
            "Operation {} failed after {} attempts with total delay of {:?}",
            operation_name,
            attempt + 1,
            total_delay
        );
        Err(last_error)
    }

    pub fn get_metrics(&self) -> RetryMetrics {
        lock(&self.metrics).clone()
    }

    pub fn get_circuit_breaker_state(&self) -> CircuitBreakerState {
        lock(&self.circuit_breaker).get_state()
    }
}
