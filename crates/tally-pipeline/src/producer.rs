//! Synthetic request-count producer.
//!
//! Emits a randomized count every `sample_interval` for `run_for`, keeps an
//! exact per-second tally of what it sent, then sends that tally as the
//! end-of-run ground truth.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

use tally_core::{Clock, GroundTruth, ProducerPlan, RawSample, Sample, duration_millis};

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::ProducerEvent;

pub struct SyntheticProducer<C> {
    plan: ProducerPlan,
    clock: C,
}

impl<C: Clock> SyntheticProducer<C> {
    pub fn new(plan: ProducerPlan, clock: C) -> Self {
        Self { plan, clock }
    }

    /// Produce until `run_for` elapses, then deliver the ground truth.
    ///
    /// Returns the ground truth it sent. Fails if the pipeline hangs up
    /// first.
    pub async fn run(self, tx: mpsc::Sender<ProducerEvent>) -> PipelineResult<GroundTruth> {
        let mut rng = match self.plan.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut ticks = interval(self.plan.sample_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let end = sleep(self.plan.run_for);
        tokio::pin!(end);

        info!(
            sample_interval_ms = duration_millis(self.plan.sample_interval),
            run_for_ms = duration_millis(self.plan.run_for),
            seed = ?self.plan.seed,
            "producer started"
        );

        let mut truth = GroundTruth::new();
        loop {
            tokio::select! {
                biased;
                _ = &mut end => break,
                _ = ticks.tick() => {
                    let units = rng.gen_range(0..=self.plan.max_units);
                    let sample = Sample::new(self.clock.now(), units.saturating_mul(self.plan.count_unit));
                    let raw = RawSample::new(sample.timestamp, sample.count);

                    if tx.send(ProducerEvent::Sample(raw)).await.is_err() {
                        warn!("pipeline closed, producer stopping");
                        return Err(PipelineError::ConsumerClosed);
                    }
                    truth.record(&sample);
                    debug!(timestamp = %sample.timestamp, count = sample.count, "sample sent");
                }
            }
        }

        info!(buckets = truth.len(), "producer finished, sending ground truth");
        tx.send(ProducerEvent::End(truth.clone()))
            .await
            .map_err(|_| PipelineError::ConsumerClosed)?;
        Ok(truth)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tally_core::{BucketKey, Settings, Timestamp, TokioClock};

    use super::*;

    const EPOCH: u64 = 1_700_000_000_000;

    fn plan(seed: u64) -> ProducerPlan {
        ProducerPlan {
            seed: Some(seed),
            ..Settings::default().producer
        }
    }

    async fn collect(plan: ProducerPlan) -> (Vec<RawSample>, GroundTruth, GroundTruth) {
        let clock = TokioClock::anchored_at(Timestamp::from_millis(EPOCH));
        let (tx, mut rx) = mpsc::channel(plan.channel_capacity);
        let handle = tokio::spawn(SyntheticProducer::new(plan, clock).run(tx));

        let mut samples = Vec::new();
        let mut delivered = None;
        while let Some(event) = rx.recv().await {
            match event {
                ProducerEvent::Sample(raw) => samples.push(raw),
                ProducerEvent::End(truth) => delivered = Some(truth),
            }
        }
        let returned = handle.await.unwrap().unwrap();
        (samples, delivered.unwrap(), returned)
    }

    #[tokio::test(start_paused = true)]
    async fn ground_truth_matches_samples_sent() {
        let (samples, delivered, returned) = collect(plan(7)).await;

        // 5s at 125ms: ticks at 0..=4875.
        assert_eq!(samples.len(), 40);
        assert_eq!(delivered, returned);

        let mut tally = GroundTruth::new();
        for raw in &samples {
            let sample = Sample::try_from(*raw).unwrap();
            assert!(sample.count <= 900);
            assert_eq!(sample.count % 100, 0);
            tally.record(&sample);
        }
        assert_eq!(tally, delivered);

        // One bucket per second of the run.
        let keys: Vec<BucketKey> = delivered.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys.len(), 5);
        assert_eq!(keys[0], BucketKey::containing(Timestamp::from_millis(EPOCH)));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_runs_repeat() {
        let (a, _, _) = collect(plan(99)).await;
        let (b, _, _) = collect(plan(99)).await;
        let counts = |v: &[RawSample]| v.iter().map(|s| s.count).collect::<Vec<_>>();
        assert_eq!(counts(&a), counts(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_pipeline_hangs_up() {
        let clock = TokioClock::anchored_at(Timestamp::from_millis(EPOCH));
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        let result = SyntheticProducer::new(plan(1), clock).run(tx).await;
        assert!(matches!(result, Err(PipelineError::ConsumerClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_length_run_sends_only_truth() {
        let plan = ProducerPlan {
            run_for: Duration::ZERO,
            ..plan(3)
        };
        let (samples, delivered, _) = collect(plan).await;
        assert!(samples.is_empty());
        assert!(delivered.is_empty());
    }
}
