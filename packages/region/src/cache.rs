//! Session-scoped cache of incidents already fetched per region.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use saferplace_incident_models::Incident;
use saferplace_region_models::{Region, RegionKey};

/// How the cache bounds its size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Keep every region for the whole session. The cache only shrinks
    /// on [`RegionCache::clear`], which callers do when the map view is
    /// left.
    #[default]
    Unbounded,
    /// Keep at most `max_regions` regions, evicting the least recently
    /// used one first.
    Lru {
        /// Maximum number of cached regions.
        max_regions: NonZeroUsize,
    },
}

/// The incidents fetched for one region. Immutable once created.
#[derive(Debug)]
pub struct RegionEntry {
    region: Region,
    incidents: Vec<Incident>,
}

impl RegionEntry {
    /// The region these incidents were fetched for.
    #[must_use]
    pub const fn region(&self) -> &Region {
        &self.region
    }

    /// The incidents inside the region, in the order the service
    /// returned them.
    #[must_use]
    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }
}

struct Slot {
    entry: Arc<RegionEntry>,
    last_used: u64,
}

/// Cache of fetched regions keyed by exact region bounds.
///
/// Holds at most one entry per region. The first entry stored for a
/// region wins; later inserts for the same region are ignored.
pub struct RegionCache {
    policy: CachePolicy,
    slots: HashMap<RegionKey, Slot>,
    clock: u64,
}

impl RegionCache {
    /// Creates an empty cache with the given policy.
    #[must_use]
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            slots: HashMap::new(),
            clock: 0,
        }
    }

    /// Number of cached regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `region` is cached. Does not count as a use.
    #[must_use]
    pub fn contains(&self, region: &Region) -> bool {
        self.slots.contains_key(&region.key())
    }

    /// Looks up `region`, marking it as recently used.
    pub fn get(&mut self, region: &Region) -> Option<Arc<RegionEntry>> {
        let now = self.tick();
        self.slots.get_mut(&region.key()).map(|slot| {
            slot.last_used = now;
            Arc::clone(&slot.entry)
        })
    }

    /// Stores the incidents fetched for `region` and returns the entry
    /// now cached for it.
    ///
    /// If the region is already cached (two overlapping fetches for the
    /// same region), the existing entry is kept and returned.
    pub fn insert(&mut self, region: Region, incidents: Vec<Incident>) -> Arc<RegionEntry> {
        let now = self.tick();
        let key = region.key();

        if let Some(slot) = self.slots.get_mut(&key) {
            log::debug!("region {region:?} already cached, keeping the first result");
            slot.last_used = now;
            return Arc::clone(&slot.entry);
        }

        let entry = Arc::new(RegionEntry { region, incidents });
        self.slots.insert(
            key,
            Slot {
                entry: Arc::clone(&entry),
                last_used: now,
            },
        );
        self.evict();

        entry
    }

    /// Drops every cached region.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict(&mut self) {
        let CachePolicy::Lru { max_regions } = self.policy else {
            return;
        };

        while self.slots.len() > max_regions.get() {
            let Some(oldest) = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| *key)
            else {
                break;
            };
            if let Some(slot) = self.slots.remove(&oldest) {
                log::debug!("evicting region {:?}", slot.entry.region);
            }
        }
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}
