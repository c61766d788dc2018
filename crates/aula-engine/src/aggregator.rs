//! Energy aggregation: appends raw samples and folds their contribution
//! into the hour/day/month rollup buckets.

use std::sync::Arc;

use aula_core::{
  energy::{self, Granularity, NewPowerSample, PowerSample},
  event::FanoutEvent,
  store::TelemetryStore,
};
use chrono::{Duration, Utc};
use tracing::info;

use crate::hub::FanoutHub;

pub struct Aggregator<S> {
  store:       Arc<S>,
  hub:         Arc<FanoutHub>,
  /// Gaps longer than this contribute no energy; the device was down
  /// and there is nothing to integrate over.
  gap_ceiling: Duration,
}

impl<S: TelemetryStore> Aggregator<S> {
  pub fn new(store: Arc<S>, hub: Arc<FanoutHub>, gap_ceiling: Duration) -> Self {
    Self {
      store,
      hub,
      gap_ceiling,
    }
  }

  /// Ingest one wattage reading: append it to the ledger, fold its
  /// energy contribution into every rollup bucket, and fan out a live
  /// power update.
  ///
  /// The integration predecessor is fetched *before* the append, by
  /// `observed_at` rather than arrival order, so a late sample
  /// integrates against its true predecessor and simply re-opens the
  /// buckets of an already-elapsed period.
  pub async fn handle_sample(
    &self,
    input: NewPowerSample,
  ) -> Result<PowerSample, S::Backend> {
    let prev = self
      .store
      .previous_sample(input.room_id, input.observed_at)
      .await?;
    let kwh = energy::integrate_kwh(prev.as_ref(), &input, self.gap_ceiling);

    let sample = self.store.append_sample(input).await?;

    let now = Utc::now();
    for granularity in Granularity::ALL {
      let period_start = granularity.period_start(sample.observed_at);
      if granularity.period_end(period_start) <= now {
        info!(
          room_id = %sample.room_id,
          granularity = granularity.as_str(),
          period = %period_start,
          "late sample re-opened an elapsed rollup period"
        );
      }
      self
        .store
        .apply_bucket_sample(
          sample.room_id,
          granularity,
          period_start,
          sample.watts,
          kwh,
        )
        .await?;
    }

    self.hub.publish(FanoutEvent::PowerUpdate {
      room_id:     sample.room_id,
      watts:       sample.watts,
      observed_at: sample.observed_at,
    });
    Ok(sample)
  }
}
