//! Incremental incident loading for a moving map viewport.
//!
//! Every viewport change starts a new *cycle*: the viewport is split
//! into regions, cached regions are shown straight away and the rest are
//! fetched concurrently. Results are merged into the displayed list as
//! they arrive. Once every fetch of the cycle has finished, the list is
//! sorted by incident ID so the final order is deterministic.
//!
//! A new cycle supersedes the previous one. In-flight fetches from the
//! old cycle are not aborted; when they complete they still fill the
//! cache, but their incidents are kept out of the displayed list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use saferplace_incident_models::Incident;
use saferplace_region_models::{BoundingBox, Region, RegionError};
use tokio::task::JoinHandle;

use crate::cache::{CachePolicy, RegionCache};
use crate::decompose::{DEFAULT_CELL_SIZE, DEFAULT_REGION_LIMIT, Decomposition, decompose};
use crate::fetch::IncidentFetcher;

/// Tuning for [`IncidentLoader`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoaderOptions {
    /// Grid cell size in degrees.
    pub cell_size: f64,
    /// Maximum rows or columns per viewport.
    pub region_limit: u32,
    /// How the region cache bounds its size.
    pub cache_policy: CachePolicy,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            region_limit: DEFAULT_REGION_LIMIT,
            cache_policy: CachePolicy::Unbounded,
        }
    }
}

/// What the loader is doing for the current viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// Nothing outstanding; the displayed list is final.
    Idle,
    /// Waiting on fetches for the current viewport.
    Fetching {
        /// Fetches still outstanding.
        pending: usize,
    },
    /// The viewport was too large to decompose; nothing is shown.
    TooManyRegions {
        /// Rows spanned by the viewport.
        rows: i64,
        /// Columns spanned by the viewport.
        columns: i64,
        /// The limit that was exceeded.
        limit: u32,
    },
}

/// Cancellation token owned by one viewport cycle.
///
/// Cancelled as soon as a newer cycle starts or the loader is cleared.
#[derive(Debug, Clone)]
pub struct CycleToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl CycleToken {
    /// Sequence number of the cycle, starting at 1.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a newer cycle has superseded this one.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::Acquire) != self.generation
    }
}

/// Handle to the fetches started by one viewport change.
///
/// Dropping the handle does not stop the fetches.
#[derive(Debug)]
pub struct ViewportCycle {
    token: CycleToken,
    reused: usize,
    fetches: Vec<JoinHandle<()>>,
}

impl ViewportCycle {
    /// The cycle's cancellation token.
    #[must_use]
    pub const fn token(&self) -> &CycleToken {
        &self.token
    }

    /// Regions served from the cache.
    #[must_use]
    pub const fn reused(&self) -> usize {
        self.reused
    }

    /// Regions that had to be fetched.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.fetches.len()
    }

    /// Waits until every fetch started by this cycle has completed.
    pub async fn settled(self) {
        for result in futures::future::join_all(self.fetches).await {
            if let Err(e) = result {
                log::error!("region fetch task failed: {e}");
            }
        }
    }
}

struct LoaderState {
    cache: RegionCache,
    displayed: Vec<Incident>,
    phase: LoadPhase,
    /// Bumped by [`IncidentLoader::clear`]. Fetches started in an older
    /// session are dropped entirely, cache included.
    session: u64,
}

impl LoaderState {
    fn fetch_finished(&mut self) {
        let LoadPhase::Fetching { pending } = self.phase else {
            return;
        };
        let pending = pending.saturating_sub(1);
        if pending == 0 {
            self.settle();
        } else {
            self.phase = LoadPhase::Fetching { pending };
        }
    }

    fn settle(&mut self) {
        self.displayed.sort_by(|a, b| a.id.cmp(&b.id));
        self.phase = LoadPhase::Idle;
    }
}

/// Loads the incidents for a moving viewport, fetching each region at
/// most once per session.
///
/// Cloning is cheap and clones share the same cache and display list.
#[derive(Clone)]
pub struct IncidentLoader {
    fetcher: Arc<dyn IncidentFetcher>,
    options: LoaderOptions,
    state: Arc<Mutex<LoaderState>>,
    generation: Arc<AtomicU64>,
}

impl IncidentLoader {
    /// Creates a loader with an empty cache.
    #[must_use]
    pub fn new(fetcher: Arc<dyn IncidentFetcher>, options: LoaderOptions) -> Self {
        Self {
            fetcher,
            options,
            state: Arc::new(Mutex::new(LoaderState {
                cache: RegionCache::new(options.cache_policy),
                displayed: Vec::new(),
                phase: LoadPhase::Idle,
                session: 0,
            })),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts a new cycle for `bounds`.
    ///
    /// Resets the displayed list, appends every cached region's
    /// incidents, and spawns one fetch per uncached region. Returns
    /// without waiting for the fetches.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError`] if the bounds or the configured cell size
    /// are unusable. The previous cycle is left untouched in that case.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime while any region needs
    /// fetching.
    pub fn viewport_changed(
        &self,
        bounds: Option<&BoundingBox>,
    ) -> Result<ViewportCycle, RegionError> {
        let decomposition = decompose(bounds, self.options.cell_size, self.options.region_limit)?;

        let mut state = self.lock();
        let token = self.next_token();
        state.displayed.clear();

        let regions = match decomposition {
            Decomposition::Regions(regions) => regions,
            Decomposition::TooManyRegions {
                rows,
                columns,
                limit,
            } => {
                state.phase = LoadPhase::TooManyRegions {
                    rows,
                    columns,
                    limit,
                };
                return Ok(ViewportCycle {
                    token,
                    reused: 0,
                    fetches: Vec::new(),
                });
            }
        };

        let mut reused = 0;
        let mut missing = Vec::new();
        for region in regions {
            if let Some(entry) = state.cache.get(&region) {
                log::debug!("reusing region {region:?}");
                state.displayed.extend(entry.incidents().iter().cloned());
                reused += 1;
            } else {
                missing.push(region);
            }
        }

        if missing.is_empty() {
            state.settle();
        } else {
            state.phase = LoadPhase::Fetching {
                pending: missing.len(),
            };
        }
        let session = state.session;
        drop(state);

        let fetches = missing
            .into_iter()
            .map(|region| {
                tokio::spawn(fetch_region(
                    Arc::clone(&self.fetcher),
                    Arc::clone(&self.state),
                    token.clone(),
                    session,
                    region,
                ))
            })
            .collect();

        Ok(ViewportCycle {
            token,
            reused,
            fetches,
        })
    }

    /// Runs a full cycle for `bounds` and returns the settled incident
    /// list.
    ///
    /// If another cycle starts while this one is in flight, the result
    /// reflects the newer cycle's list at the time this one settled.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError`] if the bounds or cell size are unusable.
    pub async fn load(&self, bounds: Option<&BoundingBox>) -> Result<Vec<Incident>, RegionError> {
        self.viewport_changed(bounds)?.settled().await;
        Ok(self.incidents())
    }

    /// Snapshot of the incidents to render for the current viewport.
    #[must_use]
    pub fn incidents(&self) -> Vec<Incident> {
        self.lock().displayed.clone()
    }

    /// What the loader is doing for the current viewport.
    #[must_use]
    pub fn phase(&self) -> LoadPhase {
        self.lock().phase
    }

    /// Number of regions in the cache.
    #[must_use]
    pub fn cached_regions(&self) -> usize {
        self.lock().cache.len()
    }

    /// Whether `region` has been fetched and is still cached.
    #[must_use]
    pub fn is_cached(&self, region: &Region) -> bool {
        self.lock().cache.contains(region)
    }

    /// Forgets everything: cancels the current cycle and empties both
    /// the cache and the displayed list. Call when leaving the map view.
    ///
    /// Fetches still in flight are discarded when they complete and do
    /// not repopulate the cache.
    pub fn clear(&self) {
        let mut state = self.lock();
        self.next_token();
        state.session += 1;
        state.cache.clear();
        state.displayed.clear();
        state.phase = LoadPhase::Idle;
    }

    /// Starts a new generation, cancelling every older token. Must be
    /// called with the state lock held so completions observe the switch
    /// atomically with the display reset.
    fn next_token(&self) -> CycleToken {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        CycleToken {
            generation,
            current: Arc::clone(&self.generation),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<LoaderState>) -> MutexGuard<'_, LoaderState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn fetch_region(
    fetcher: Arc<dyn IncidentFetcher>,
    shared: Arc<Mutex<LoaderState>>,
    token: CycleToken,
    session: u64,
    region: Region,
) {
    log::info!("getting region {region:?}");
    let result = fetcher.fetch_incidents(&region).await;

    let mut state = lock_state(&shared);
    if state.session != session {
        log::debug!("loader cleared, dropping region {region:?}");
        return;
    }
    match result {
        Ok(incidents) => {
            log::debug!("got {} incidents for region {region:?}", incidents.len());
            let entry = state.cache.insert(region, incidents);
            if token.is_cancelled() {
                log::debug!(
                    "cycle {} superseded, not displaying region {region:?}",
                    token.generation()
                );
                return;
            }
            state.displayed.extend(entry.incidents().iter().cloned());
        }
        Err(e) => {
            log::warn!("failed to get region {region:?}: {e}");
            if token.is_cancelled() {
                return;
            }
        }
    }
    state.fetch_finished();
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use saferplace_incident_models::Coordinates;
    use saferplace_region_models::RegionKey;
    use tokio::sync::Notify;

    use super::*;
    use crate::decompose::regions_in_bounds;
    use crate::fetch::FetchError;

    #[derive(Default)]
    struct FakeFetcher {
        incidents: HashMap<RegionKey, Vec<Incident>>,
        delays: HashMap<RegionKey, Duration>,
        gates: HashMap<RegionKey, Arc<Notify>>,
        failures: Mutex<HashMap<RegionKey, usize>>,
        calls: Mutex<Vec<Region>>,
    }

    impl FakeFetcher {
        fn with_incident(mut self, region: Region, incident: Incident) -> Self {
            self.incidents.entry(region.key()).or_default().push(incident);
            self
        }

        fn with_delay(mut self, region: Region, delay: Duration) -> Self {
            self.delays.insert(region.key(), delay);
            self
        }

        fn with_gate(mut self, region: Region, gate: Arc<Notify>) -> Self {
            self.gates.insert(region.key(), gate);
            self
        }

        fn failing(self, region: Region, times: usize) -> Self {
            self.failures.lock().unwrap().insert(region.key(), times);
            self
        }

        fn calls_for(&self, region: &Region) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.key() == region.key())
                .count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl IncidentFetcher for FakeFetcher {
        async fn fetch_incidents(&self, region: &Region) -> Result<Vec<Incident>, FetchError> {
            self.calls.lock().unwrap().push(*region);
            let key = region.key();

            if let Some(gate) = self.gates.get(&key) {
                gate.notified().await;
            }
            if let Some(delay) = self.delays.get(&key) {
                tokio::time::sleep(*delay).await;
            }

            {
                let mut failures = self.failures.lock().unwrap();
                if let Some(remaining) = failures.get_mut(&key) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(FetchError::Transport {
                            message: "connection reset".to_string(),
                        });
                    }
                }
            }

            Ok(self.incidents.get(&key).cloned().unwrap_or_default())
        }
    }

    fn incident(id: &str, lat: f64, lon: f64) -> Incident {
        Incident::new(id, Coordinates::new(lat, lon), format!("incident {id}"))
    }

    fn dublin() -> BoundingBox {
        BoundingBox::new(-6.30, 53.34, -6.29, 53.35)
    }

    fn cork() -> BoundingBox {
        BoundingBox::new(-8.48, 51.89, -8.46, 51.90)
    }

    fn dublin_regions() -> Vec<Region> {
        regions_in_bounds(Some(&dublin()), 1.0, 10).unwrap()
    }

    fn loader(fetcher: &Arc<FakeFetcher>) -> IncidentLoader {
        IncidentLoader::new(Arc::clone(fetcher) as Arc<dyn IncidentFetcher>, LoaderOptions::default())
    }

    fn ids(incidents: &[Incident]) -> Vec<&str> {
        incidents.iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn fetches_each_region_once_across_cycles() {
        let regions = dublin_regions();
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_incident(regions[0], incident("a", 53.5, -6.5))
                .with_incident(regions[3], incident("b", 52.5, -5.5)),
        );
        let loader = loader(&fetcher);

        let first = loader.load(Some(&dublin())).await.unwrap();
        assert_eq!(fetcher.total_calls(), regions.len());

        let cycle = loader.viewport_changed(Some(&dublin())).unwrap();
        assert_eq!(cycle.reused(), regions.len());
        assert_eq!(cycle.fetched(), 0);
        cycle.settled().await;

        assert_eq!(fetcher.total_calls(), regions.len());
        assert_eq!(loader.incidents(), first);
        assert_eq!(ids(&first), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn merges_regardless_of_completion_order() {
        let regions = dublin_regions();
        let (r1, r2) = (regions[0], regions[3]);

        for (d1, d2) in [(5, 40), (40, 5)] {
            let fetcher = Arc::new(
                FakeFetcher::default()
                    .with_incident(r1, incident("A", 53.5, -6.5))
                    .with_incident(r2, incident("B", 52.5, -5.5))
                    .with_delay(r1, Duration::from_millis(d1))
                    .with_delay(r2, Duration::from_millis(d2)),
            );
            let loader = loader(&fetcher);

            let incidents = loader.load(Some(&dublin())).await.unwrap();
            assert_eq!(ids(&incidents), vec!["A", "B"]);
            assert_eq!(loader.phase(), LoadPhase::Idle);
        }
    }

    #[tokio::test]
    async fn failed_region_is_skipped_and_retried_next_cycle() {
        let regions = dublin_regions();
        let (bad, good) = (regions[1], regions[2]);
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_incident(bad, incident("lost", 53.5, -5.5))
                .with_incident(good, incident("kept", 52.5, -6.5))
                .failing(bad, 1),
        );
        let loader = loader(&fetcher);

        let incidents = loader.load(Some(&dublin())).await.unwrap();
        assert_eq!(ids(&incidents), vec!["kept"]);
        assert!(!loader.is_cached(&bad));
        assert_eq!(loader.cached_regions(), regions.len() - 1);

        let incidents = loader.load(Some(&dublin())).await.unwrap();
        assert_eq!(ids(&incidents), vec!["kept", "lost"]);
        assert_eq!(fetcher.calls_for(&bad), 2);
        assert_eq!(fetcher.calls_for(&good), 1);
    }

    #[tokio::test]
    async fn superseded_fetch_fills_cache_but_not_display() {
        let regions = dublin_regions();
        let slow = regions[0];
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_incident(slow, incident("stale", 53.5, -6.5))
                .with_incident(
                    regions_in_bounds(Some(&cork()), 1.0, 10).unwrap()[0],
                    incident("cork", 52.5, -9.5),
                )
                .with_gate(slow, Arc::clone(&gate)),
        );
        let loader = loader(&fetcher);

        let stale = loader.viewport_changed(Some(&dublin())).unwrap();
        let current = loader.viewport_changed(Some(&cork())).unwrap();
        assert!(stale.token().is_cancelled());
        assert!(!current.token().is_cancelled());
        current.settled().await;

        gate.notify_one();
        stale.settled().await;

        assert_eq!(ids(&loader.incidents()), vec!["cork"]);
        assert!(loader.is_cached(&slow));
        assert_eq!(loader.phase(), LoadPhase::Idle);
    }

    #[tokio::test]
    async fn too_many_regions_shows_nothing() {
        let fetcher = Arc::new(FakeFetcher::default());
        let loader = loader(&fetcher);
        let bbox = BoundingBox::new(-6.0, 40.0, -5.0, 55.0);

        let incidents = loader.load(Some(&bbox)).await.unwrap();

        assert!(incidents.is_empty());
        assert_eq!(fetcher.total_calls(), 0);
        assert_eq!(
            loader.phase(),
            LoadPhase::TooManyRegions {
                rows: 15,
                columns: 1,
                limit: 10,
            }
        );
    }

    #[tokio::test]
    async fn missing_bounds_fetch_nothing() {
        let fetcher = Arc::new(FakeFetcher::default());
        let loader = loader(&fetcher);

        assert!(loader.load(None).await.unwrap().is_empty());
        assert_eq!(fetcher.total_calls(), 0);
        assert_eq!(loader.phase(), LoadPhase::Idle);
    }

    #[tokio::test]
    async fn invalid_cell_size_is_rejected() {
        let fetcher = Arc::new(FakeFetcher::default());
        let loader = IncidentLoader::new(
            fetcher as Arc<dyn IncidentFetcher>,
            LoaderOptions {
                cell_size: 0.0,
                ..LoaderOptions::default()
            },
        );

        assert!(matches!(
            loader.viewport_changed(Some(&dublin())),
            Err(RegionError::InvalidCellSize { .. })
        ));
    }

    #[tokio::test]
    async fn settled_list_is_sorted_by_id() {
        let regions = dublin_regions();
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_incident(regions[0], incident("c", 53.5, -6.5))
                .with_incident(regions[1], incident("a", 53.5, -5.5))
                .with_incident(regions[2], incident("b", 52.5, -6.5))
                .with_delay(regions[1], Duration::from_millis(20)),
        );
        let loader = loader(&fetcher);

        let incidents = loader.load(Some(&dublin())).await.unwrap();
        assert_eq!(ids(&incidents), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn reports_pending_fetches_while_loading() {
        let regions = dublin_regions();
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(FakeFetcher::default().with_gate(regions[0], Arc::clone(&gate)));
        let loader = loader(&fetcher);

        let cycle = loader.viewport_changed(Some(&dublin())).unwrap();
        assert_eq!(cycle.fetched(), regions.len());
        assert!(matches!(loader.phase(), LoadPhase::Fetching { .. }));

        gate.notify_one();
        cycle.settled().await;
        assert_eq!(loader.phase(), LoadPhase::Idle);
    }

    #[tokio::test]
    async fn clear_forgets_cached_regions() {
        let fetcher = Arc::new(FakeFetcher::default());
        let loader = loader(&fetcher);

        loader.load(Some(&dublin())).await.unwrap();
        loader.clear();
        assert_eq!(loader.cached_regions(), 0);
        assert!(loader.incidents().is_empty());

        loader.load(Some(&dublin())).await.unwrap();
        assert_eq!(fetcher.total_calls(), 2 * dublin_regions().len());
    }

    #[tokio::test]
    async fn clear_discards_fetches_in_flight() {
        let regions = dublin_regions();
        let gates: Vec<_> = regions.iter().map(|_| Arc::new(Notify::new())).collect();
        let fetcher = Arc::new(
            regions
                .iter()
                .zip(&gates)
                .fold(FakeFetcher::default(), |fetcher, (region, gate)| {
                    fetcher
                        .with_incident(*region, incident("old", 53.5, -6.5))
                        .with_gate(*region, Arc::clone(gate))
                }),
        );
        let loader = loader(&fetcher);

        let cycle = loader.viewport_changed(Some(&dublin())).unwrap();
        assert_eq!(cycle.fetched(), regions.len());
        loader.clear();

        for gate in &gates {
            gate.notify_one();
        }
        cycle.settled().await;

        assert_eq!(loader.cached_regions(), 0);
        assert!(loader.incidents().is_empty());
        assert_eq!(loader.phase(), LoadPhase::Idle);
    }

    #[tokio::test]
    async fn superseded_fetch_still_caches_within_session() {
        let regions = dublin_regions();
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(FakeFetcher::default().with_gate(regions[0], Arc::clone(&gate)));
        let loader = loader(&fetcher);

        let stale = loader.viewport_changed(Some(&dublin())).unwrap();
        loader.viewport_changed(None).unwrap().settled().await;
        gate.notify_one();
        stale.settled().await;

        assert_eq!(loader.cached_regions(), regions.len());
    }

    #[tokio::test]
    async fn lru_policy_bounds_cache() {
        let fetcher = Arc::new(FakeFetcher::default());
        let loader = IncidentLoader::new(
            Arc::clone(&fetcher) as Arc<dyn IncidentFetcher>,
            LoaderOptions {
                cache_policy: CachePolicy::Lru {
                    max_regions: NonZeroUsize::new(4).unwrap(),
                },
                ..LoaderOptions::default()
            },
        );

        loader.load(Some(&dublin())).await.unwrap();
        loader.load(Some(&cork())).await.unwrap();

        assert_eq!(loader.cached_regions(), 4);
        for region in regions_in_bounds(Some(&cork()), 1.0, 10).unwrap() {
            assert!(loader.is_cached(&region));
        }
    }
}
