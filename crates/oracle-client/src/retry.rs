use async_trait::async_trait;
use listing_core::{AnalysisResult, ComparableSet, EngineError, Listing, MarketOracle, OracleEstimate};
use std::time::Duration;

/// Bounded retry with exponential backoff around any oracle.
///
/// `OracleUnavailable` and `InvalidEstimate` are retried; any other error is
/// returned at once. A reply without a positive estimate counts as
/// `InvalidEstimate`. Explanations are not retried.
pub struct RetryingOracle<O> {
    inner: O,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl<O: MarketOracle> RetryingOracle<O> {
    pub fn new(inner: O, max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    fn should_retry(error: &EngineError) -> bool {
        matches!(
            error,
            EngineError::OracleUnavailable(_) | EngineError::InvalidEstimate(_)
        )
    }
}

#[async_trait]
impl<O: MarketOracle> MarketOracle for RetryingOracle<O> {
    async fn estimate(
        &self,
        target: &Listing,
        comparables: &ComparableSet,
    ) -> Result<OracleEstimate, EngineError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            let outcome = self
                .inner
                .estimate(target, comparables)
                .await
                .and_then(|estimate| estimate.validate(&target.id));
            match outcome {
                Ok(estimate) => return Ok(estimate),
                Err(e) if attempt < self.max_attempts && Self::should_retry(&e) => {
                    tracing::warn!(
                        "Oracle estimate for {} failed (attempt {}/{}): {}, retrying in {:?}",
                        target.id,
                        attempt,
                        self.max_attempts,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Oracle estimate for {} failed after {} attempt(s): {}",
                        target.id,
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn explain(
        &self,
        target: &Listing,
        comparables: &ComparableSet,
        result: &AnalysisResult,
    ) -> Result<String, EngineError> {
        self.inner.explain(target, comparables, result).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing_core::{MatchTier, PropertyKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyOracle {
        calls: AtomicU32,
        failures_before_success: u32,
        error: EngineError,
        value: Option<f64>,
    }

    #[async_trait]
    impl MarketOracle for FlakyOracle {
        async fn estimate(&self, _: &Listing, _: &ComparableSet) -> Result<OracleEstimate, EngineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures_before_success {
                return Err(self.error.clone());
            }
            Ok(OracleEstimate {
                estimated_value: self.value,
                ..Default::default()
            })
        }

        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    fn flaky(failures: u32, error: EngineError) -> RetryingOracle<FlakyOracle> {
        RetryingOracle::new(
            FlakyOracle {
                calls: AtomicU32::new(0),
                failures_before_success: failures,
                error,
                value: Some(3500.0),
            },
            3,
            Duration::from_millis(1),
        )
    }

    fn target() -> (Listing, ComparableSet) {
        let listing = Listing {
            id: "T".to_string(),
            address: "9 Bedford St".to_string(),
            price: 3000.0,
            bedrooms: 1,
            bathrooms: 1.0,
            sqft: None,
            built_year: None,
            neighborhood: "west-village".to_string(),
            amenities: Default::default(),
            description: String::new(),
            property_kind: PropertyKind::Rental,
        };
        let comparables = ComparableSet {
            tier: MatchTier::Fallback,
            comparables: vec![],
        };
        (listing, comparables)
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let oracle = flaky(2, EngineError::OracleUnavailable("503".into()));
        let (listing, comparables) = target();
        let estimate = oracle.estimate(&listing, &comparables).await.unwrap();
        assert_eq!(estimate.estimated_value, Some(3500.0));
        assert_eq!(oracle.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let oracle = flaky(10, EngineError::InvalidEstimate("garbled".into()));
        let (listing, comparables) = target();
        assert!(oracle.estimate(&listing, &comparables).await.is_err());
        assert_eq!(oracle.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_positive_estimate_is_retried_then_rejected() {
        for value in [Some(-1.0), Some(0.0), None] {
            let mut oracle = flaky(0, EngineError::OracleUnavailable("unused".into()));
            oracle.inner.value = value;
            let (listing, comparables) = target();
            let result = oracle.estimate(&listing, &comparables).await;
            assert!(matches!(result, Err(EngineError::InvalidEstimate(_))));
            assert_eq!(oracle.inner().calls.load(Ordering::SeqCst), 3);
        }
    }

    #[tokio::test]
    async fn test_configuration_errors_not_retried() {
        let oracle = flaky(10, EngineError::InvalidData("oracle: Missing API key".into()));
        let (listing, comparables) = target();
        assert!(oracle.estimate(&listing, &comparables).await.is_err());
        assert_eq!(oracle.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backend_name_is_delegated() {
        let oracle = flaky(0, EngineError::OracleUnavailable("unused".into()));
        assert_eq!(oracle.backend_name(), "flaky");
    }
}
