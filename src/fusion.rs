//! # Environment Fusion
//!
//! [`EnvironmentFusionEngine`] asks every provider for its contribution at
//! once and folds the answers into a single [`EnvironmentRecord`].
//!
//! Providers run concurrently on a [`JoinSet`], but the fold always happens
//! afterwards in [`ProviderKind::PRIORITY`] order, so the record does not
//! depend on which provider answered first. Whatever has not answered when
//! the deadline passes is aborted and counts as unavailable.

use crate::config::{Config, Credentials};
use crate::error::{FetchError, InputError};
use crate::geo::Coordinate;
use crate::providers::fishing_index::normalize_species;
use crate::providers::{
    contribute, BuoyProvider, Contribution, Contributor, FishingIndexProvider, JsonFetcher, LunarCalendarProvider,
    NowcastProvider, ProviderKind, QueryContext, ServiceKey, TideStationProvider,
};
use crate::reference::ReferenceData;
use crate::EnvironmentRecord;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Resolves the fishing environment around a point.
pub struct EnvironmentFusionEngine {
    contributors: Vec<Arc<dyn Contributor>>,
    deadline: Duration,
}

impl EnvironmentFusionEngine {
    /// Engine over an explicit provider list. Order in `contributors` does
    /// not matter; merging follows [`ProviderKind::PRIORITY`].
    pub fn new(contributors: Vec<Arc<dyn Contributor>>, deadline: Duration) -> Self {
        Self { contributors, deadline }
    }

    /// The five upstream adapters wired from configuration.
    pub fn from_config(
        config: &Config,
        reference: Arc<ReferenceData>,
        credentials: &Credentials,
        fetcher: Arc<dyn JsonFetcher>,
    ) -> Self {
        let names = &config.credentials;
        let endpoints = &config.providers;
        let kma = || ServiceKey::new(&names.kma_key_var, credentials.kma.clone());
        let ocean = || ServiceKey::new(&names.ocean_key_var, credentials.ocean.clone());

        let contributors: Vec<Arc<dyn Contributor>> = vec![
            Arc::new(FishingIndexProvider::new(
                Arc::clone(&fetcher),
                Arc::clone(&reference),
                endpoints.fishing_index.clone(),
                kma(),
            )),
            Arc::new(BuoyProvider::new(
                Arc::clone(&fetcher),
                Arc::clone(&reference),
                endpoints.buoy.clone(),
                ocean(),
            )),
            Arc::new(NowcastProvider::new(
                Arc::clone(&fetcher),
                Arc::clone(&reference),
                endpoints.nowcast.clone(),
                kma(),
            )),
            Arc::new(TideStationProvider::new(
                Arc::clone(&fetcher),
                Arc::clone(&reference),
                endpoints.tide_station.clone(),
                ocean(),
            )),
            Arc::new(LunarCalendarProvider::new(
                fetcher,
                reference,
                endpoints.lunar_calendar.clone(),
                ServiceKey::new(&names.lunar_key_var, credentials.lunar.clone()),
                config.fusion.offline_lunar_fallback,
            )),
        ];
        Self::new(contributors, config.fusion.deadline())
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Fused environment record for `(lat, lon)` at `requested_at`.
    ///
    /// `target_fish` defaults to "쭈갑". Only invalid input is an error; a
    /// request where every provider failed returns an empty record.
    #[instrument(skip(self))]
    pub async fn resolve_environment(
        &self,
        lat: f64,
        lon: f64,
        target_fish: Option<&str>,
        requested_at: DateTime<Utc>,
    ) -> Result<EnvironmentRecord, InputError> {
        let point = Coordinate::new(lat, lon);
        if !point.is_valid() {
            return Err(InputError::InvalidCoordinate { lat, lon });
        }
        let species = normalize_species(target_fish)?;
        let ctx = QueryContext::new(point, requested_at, species.as_str());

        let mut record = EnvironmentRecord::for_target(species);
        for (kind, contribution) in self.gather(ctx).await {
            record.merge(kind, &contribution);
        }

        info!(
            source = record.source.as_deref().unwrap_or("-"),
            location = record.location_name.as_deref().unwrap_or("-"),
            contributors = record.contributors.len(),
            "environment resolved"
        );
        Ok(record)
    }

    /// Run every provider concurrently and return the contributions sorted
    /// by priority.
    async fn gather(&self, ctx: QueryContext) -> Vec<(ProviderKind, Contribution)> {
        let ctx = Arc::new(ctx);
        let mut tasks = JoinSet::new();
        for provider in &self.contributors {
            let provider = Arc::clone(provider);
            let ctx = Arc::clone(&ctx);
            tasks.spawn(async move {
                let kind = provider.kind();
                (kind, contribute(provider.as_ref(), &ctx).await)
            });
        }

        let deadline = Instant::now() + self.deadline;
        let mut finished: HashSet<ProviderKind> = HashSet::new();
        let mut contributions = Vec::with_capacity(self.contributors.len());
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((kind, contribution)))) => {
                    finished.insert(kind);
                    if let Some(contribution) = contribution {
                        contributions.push((kind, contribution));
                    }
                }
                Ok(Some(Err(e))) => warn!(error = %e, "provider task did not complete"),
                Ok(None) => break,
                Err(_) => {
                    for provider in &self.contributors {
                        let kind = provider.kind();
                        if !finished.contains(&kind) {
                            warn!(provider = %kind, error = %FetchError::DeadlineExceeded, "provider unavailable");
                        }
                    }
                    tasks.abort_all();
                    break;
                }
            }
        }

        contributions.sort_by_key(|(kind, _)| kind.rank());
        debug!(
            order = ?contributions.iter().map(|(kind, _)| *kind).collect::<Vec<_>>(),
            "merge order"
        );
        contributions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PartialRecord;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct Fixed {
        kind: ProviderKind,
        delay: Duration,
        result: Option<Contribution>,
    }

    #[async_trait]
    impl Contributor for Fixed {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn fetch(&self, _ctx: &QueryContext) -> Result<Contribution, FetchError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone().ok_or(FetchError::Status(500))
        }
    }

    fn fixed(kind: ProviderKind, delay_ms: u64, location: &str, fields: PartialRecord) -> Arc<dyn Contributor> {
        Arc::new(Fixed {
            kind,
            delay: Duration::from_millis(delay_ms),
            result: Some(Contribution::new(Some(location.to_string()), fields)),
        })
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 12, 3, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn merge_follows_priority_not_arrival() {
        let slow_index = fixed(
            ProviderKind::FishingIndex,
            50,
            "오천항",
            PartialRecord {
                water_temp: Some(12.5),
                ..PartialRecord::default()
            },
        );
        let fast_buoy = fixed(
            ProviderKind::Buoy,
            0,
            "외연도",
            PartialRecord {
                water_temp: Some(13.9),
                wave_height: Some(0.7),
                ..PartialRecord::default()
            },
        );
        let engine = EnvironmentFusionEngine::new(vec![fast_buoy, slow_index], Duration::from_secs(5));

        let record = engine.resolve_environment(36.4, 126.5, None, at()).await.unwrap();
        assert_eq!(record.source.as_deref(), Some("바다낚시지수 API"));
        assert_eq!(record.location_name.as_deref(), Some("오천항"));
        assert_eq!(record.water_temp, Some(12.5));
        assert_eq!(record.wave_height, Some(0.7));
        assert_eq!(record.contributors, vec![ProviderKind::FishingIndex, ProviderKind::Buoy]);
        assert_eq!(record.target_fish.as_deref(), Some("쭈갑"));
    }

    #[tokio::test]
    async fn deadline_drops_slow_providers() {
        let slow = fixed(
            ProviderKind::FishingIndex,
            5_000,
            "slow",
            PartialRecord {
                water_temp: Some(1.0),
                ..PartialRecord::default()
            },
        );
        let quick = fixed(
            ProviderKind::TideStation,
            0,
            "부산",
            PartialRecord {
                next_high_tide: Some("05:02".into()),
                ..PartialRecord::default()
            },
        );
        let engine = EnvironmentFusionEngine::new(vec![slow, quick], Duration::from_millis(100));

        let record = engine.resolve_environment(35.1, 129.0, Some("쭈꾸미"), at()).await.unwrap();
        assert_eq!(record.water_temp, None);
        assert_eq!(record.next_high_tide.as_deref(), Some("05:02"));
        assert_eq!(record.source.as_deref(), Some("조석예보 API"));
        assert_eq!(record.contributors, vec![ProviderKind::TideStation]);
    }

    #[tokio::test]
    async fn failing_providers_leave_record_empty() {
        let failing: Arc<dyn Contributor> = Arc::new(Fixed {
            kind: ProviderKind::Buoy,
            delay: Duration::ZERO,
            result: None,
        });
        let engine = EnvironmentFusionEngine::new(vec![failing], Duration::from_secs(1));
        let record = engine.resolve_environment(35.1, 129.0, None, at()).await.unwrap();
        assert!(record.is_unavailable());
        assert_eq!(record, EnvironmentRecord::for_target("쭈갑"));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let engine = EnvironmentFusionEngine::new(Vec::new(), Duration::from_secs(1));
        assert!(matches!(
            engine.resolve_environment(f64::NAN, 126.0, None, at()).await,
            Err(InputError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            engine.resolve_environment(95.0, 126.0, None, at()).await,
            Err(InputError::InvalidCoordinate { .. })
        ));
        assert_eq!(
            engine.resolve_environment(35.1, 129.0, Some("광어"), at()).await,
            Err(InputError::UnsupportedSpecies("광어".into()))
        );
    }
}
