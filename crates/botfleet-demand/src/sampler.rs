//! Demand sampler — current/previous sample retention.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use botfleet_core::{DemandReading, DemandSample};

use crate::error::DemandResult;

/// Anything that can count currently-active users.
#[async_trait]
pub trait DemandSource: Send + Sync {
    async fn count_active(&self) -> DemandResult<u64>;
}

/// Keeps the latest demand sample and exactly one prior sample.
pub struct DemandSampler {
    source: Box<dyn DemandSource>,
    current: Option<DemandSample>,
    previous: Option<DemandSample>,
    consecutive_failures: u32,
}

impl DemandSampler {
    pub fn new(source: Box<dyn DemandSource>) -> Self {
        Self {
            source,
            current: None,
            previous: None,
            consecutive_failures: 0,
        }
    }

    /// Take one sample from the source without touching retained state.
    pub async fn sample(&self) -> DemandResult<DemandSample> {
        let value = self.source.count_active().await?;
        Ok(DemandSample::new(value, Utc::now()))
    }

    /// Sample and rotate `current` into `previous`.
    ///
    /// On failure the last good sample is reported as both current and
    /// previous, so the delta is zero rather than a full drop to nothing.
    pub async fn refresh(&mut self) -> DemandReading {
        match self.sample().await {
            Ok(sample) => {
                self.previous = self.current.replace(sample);
                self.consecutive_failures = 0;
                debug!(
                    value = sample.value,
                    previous = self.previous.map(|p| p.value),
                    "demand sampled"
                );
                self.reading(true)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.previous = self.current;
                warn!(
                    error = %e,
                    consecutive_failures = self.consecutive_failures,
                    reused = self.current.map(|c| c.value),
                    "demand sample unavailable, reusing previous sample"
                );
                self.reading(false)
            }
        }
    }

    /// The retained samples as of the last refresh.
    pub fn last_reading(&self) -> DemandReading {
        self.reading(self.consecutive_failures == 0)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn reading(&self, fresh: bool) -> DemandReading {
        DemandReading {
            current: self.current,
            previous: self.previous,
            fresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::error::DemandError;

    /// Returns scripted results in order.
    #[derive(Clone, Default)]
    struct Scripted {
        results: Arc<Mutex<VecDeque<DemandResult<u64>>>>,
    }

    impl Scripted {
        fn new(results: Vec<DemandResult<u64>>) -> Self {
            Self {
                results: Arc::new(Mutex::new(results.into())),
            }
        }
    }

    #[async_trait]
    impl DemandSource for Scripted {
        async fn count_active(&self) -> DemandResult<u64> {
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(DemandError::SampleUnavailable("script exhausted".into())))
        }
    }

    fn unavailable() -> DemandResult<u64> {
        Err(DemandError::SampleUnavailable("metric source unreachable".into()))
    }

    #[tokio::test]
    async fn first_sample_has_no_delta() {
        let mut sampler = DemandSampler::new(Box::new(Scripted::new(vec![Ok(100)])));
        let reading = sampler.refresh().await;

        assert!(reading.fresh);
        assert_eq!(reading.current.map(|s| s.value), Some(100));
        assert_eq!(reading.delta(), None);
    }

    #[tokio::test]
    async fn second_sample_produces_delta() {
        let mut sampler = DemandSampler::new(Box::new(Scripted::new(vec![Ok(100), Ok(130)])));
        sampler.refresh().await;
        let reading = sampler.refresh().await;

        assert_eq!(reading.delta(), Some(30));
    }

    #[tokio::test]
    async fn keeps_only_one_prior_sample() {
        let mut sampler =
            DemandSampler::new(Box::new(Scripted::new(vec![Ok(10), Ok(20), Ok(50)])));
        sampler.refresh().await;
        sampler.refresh().await;
        let reading = sampler.refresh().await;

        assert_eq!(reading.previous.map(|s| s.value), Some(20));
        assert_eq!(reading.delta(), Some(30));
    }

    #[tokio::test]
    async fn failure_reuses_previous_sample_with_zero_delta() {
        let mut sampler =
            DemandSampler::new(Box::new(Scripted::new(vec![Ok(100), Ok(130), unavailable()])));
        sampler.refresh().await;
        sampler.refresh().await;
        let reading = sampler.refresh().await;

        assert!(!reading.fresh);
        assert_eq!(reading.current.map(|s| s.value), Some(130));
        assert_eq!(reading.delta(), Some(0));
        assert_eq!(sampler.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn recovery_measures_delta_from_last_good_sample() {
        let mut sampler = DemandSampler::new(Box::new(Scripted::new(vec![
            Ok(100),
            unavailable(),
            Ok(90),
        ])));
        sampler.refresh().await;
        sampler.refresh().await;
        let reading = sampler.refresh().await;

        assert!(reading.fresh);
        assert_eq!(reading.delta(), Some(-10));
        assert_eq!(sampler.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn failure_before_any_sample_reports_nothing() {
        let mut sampler = DemandSampler::new(Box::new(Scripted::new(vec![unavailable()])));
        let reading = sampler.refresh().await;

        assert_eq!(reading.current, None);
        assert_eq!(reading.delta(), None);
    }
}
