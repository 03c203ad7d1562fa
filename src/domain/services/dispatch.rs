//! Dispatch Aggregation
//!
//! Pure reduction of per-endpoint attempt results into a single outcome.
//! The classification only counts successes and failures, so it does not
//! depend on the order in which concurrent attempts completed.

use crate::domain::errors::TransportError;

/// Aggregated classification of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every attempted endpoint succeeded
    Success,
    /// Some endpoints failed, at least one succeeded
    PartialSuccess { failed: Vec<String> },
    /// Nothing succeeded (or nothing was attempted)
    Failure,
}

/// Result of one endpoint attempt.
#[derive(Debug)]
pub struct EndpointAttempt<T> {
    pub endpoint: String,
    pub result: Result<T, TransportError>,
}

/// Collected attempts of a single dispatch, in endpoint declaration order.
#[derive(Debug)]
pub struct DispatchReport<T> {
    attempts: Vec<EndpointAttempt<T>>,
}

impl<T> Default for DispatchReport<T> {
    fn default() -> Self {
        Self { attempts: Vec::new() }
    }
}

impl<T> DispatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, endpoint: impl Into<String>, result: Result<T, TransportError>) {
        self.attempts.push(EndpointAttempt {
            endpoint: endpoint.into(),
            result,
        });
    }

    /// Transform the successful values, keeping every attempt.
    pub fn map<U>(self, f: impl Fn(T) -> U) -> DispatchReport<U> {
        DispatchReport {
            attempts: self
                .attempts
                .into_iter()
                .map(|a| EndpointAttempt {
                    endpoint: a.endpoint,
                    result: a.result.map(&f),
                })
                .collect(),
        }
    }

    pub fn attempts(&self) -> &[EndpointAttempt<T>] {
        &self.attempts
    }

    /// Endpoints that were attempted, in order.
    pub fn attempted(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.endpoint.as_str()).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.attempts.iter().filter(|a| a.result.is_ok()).count()
    }

    pub fn failed_endpoints(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|a| a.result.is_err())
            .map(|a| a.endpoint.as_str())
            .collect()
    }

    pub fn outcome(&self) -> DispatchOutcome {
        let succeeded = self.succeeded();
        if succeeded == 0 {
            DispatchOutcome::Failure
        } else if succeeded == self.attempts.len() {
            DispatchOutcome::Success
        } else {
            DispatchOutcome::PartialSuccess {
                failed: self
                    .failed_endpoints()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            }
        }
    }

    /// Collapse the report into the successful values, or an error when the
    /// dispatch as a whole failed.
    ///
    /// A single failed attempt surfaces its own error. Several failed
    /// attempts are summarized in `AllEndpointsFailed`.
    pub fn into_result(self) -> Result<Vec<T>, TransportError> {
        if self.attempts.is_empty() {
            return Err(TransportError::NoEndpoints);
        }
        if self.outcome() == DispatchOutcome::Failure {
            let mut errors: Vec<TransportError> = self
                .attempts
                .into_iter()
                .filter_map(|a| a.result.err())
                .collect();
            if errors.len() == 1 {
                return Err(errors.remove(0));
            }
            return Err(TransportError::AllEndpointsFailed {
                failures: errors.iter().map(|e| e.to_string()).collect(),
            });
        }
        Ok(self
            .attempts
            .into_iter()
            .filter_map(|a| a.result.ok())
            .collect())
    }
}
