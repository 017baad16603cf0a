//! In-process store.
//!
//! One mutex guards the whole state. A transaction holds the lock and works
//! on a staged copy that replaces the state on commit.

use super::{Store, Transaction};
use crate::error::{Result, SnowexError};
use crate::models::{
    NewProfile, NewProvenance, NewRaster, Point, PointDraft, PointRef, ProfileRef,
    ProvenanceRecord, ProvenanceRef, RasterRef, Site, SiteDraft, SiteRef, StoreCounts,
    StoredProfile, StoredRaster,
};
use crate::resolver::site_key;
#[cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};
use tracing::debug;

const LOCK_POLL: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    sites: Vec<Site>,
    points: Vec<Point>,
    profiles: Vec<StoredProfile>,
    rasters: Vec<StoredRaster>,
    provenance: Vec<ProvenanceRecord>,
}

impl MemoryState {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_site(&self, site: SiteRef) -> bool {
        self.sites.iter().any(|s| s.id == site)
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    lock_timeout: Duration,
    #[cfg(test)]
    failing_commits: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(
            crate::constants::DEFAULT_PERSISTENCE_TIMEOUT_SECS,
        ))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            lock_timeout,
            #[cfg(test)]
            failing_commits: AtomicU32::new(0),
        }
    }

    /// Make the next `count` commits fail with a transient error
    #[cfg(test)]
    pub(crate) fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        let started = Instant::now();
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if started.elapsed() >= self.lock_timeout {
                        return Err(SnowexError::Timeout {
                            operation: "acquiring store lock".to_string(),
                            elapsed: started.elapsed(),
                        });
                    }
                    std::thread::sleep(LOCK_POLL);
                }
            }
        }
    }

    #[cfg(test)]
    fn take_commit_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct MemoryTx<'a> {
    #[cfg(test)]
    store: &'a MemoryStore,
    guard: MutexGuard<'a, MemoryState>,
    staged: MemoryState,
}

impl Transaction for MemoryTx<'_> {
    fn sites(&mut self) -> Result<Vec<Site>> {
        Ok(self.staged.sites.clone())
    }

    fn insert_site(&mut self, draft: &SiteDraft) -> Result<SiteRef> {
        let key = site_key(&draft.name);
        if self.staged.sites.iter().any(|s| site_key(&s.name) == key) {
            return Err(SnowexError::fatal(format!(
                "site name '{}' already exists",
                draft.name
            )));
        }
        let id = SiteRef(self.staged.allocate());
        self.staged.sites.push(Site {
            id,
            name: draft.name.trim().to_string(),
            location: draft.location,
            description: draft.description.clone(),
        });
        Ok(id)
    }

    fn set_site_description(&mut self, site: SiteRef, description: &str) -> Result<()> {
        let entry = self
            .staged
            .sites
            .iter_mut()
            .find(|s| s.id == site)
            .ok_or_else(|| SnowexError::fatal(format!("no site {}", site)))?;
        entry.description = Some(description.to_string());
        Ok(())
    }

    fn points_in_site(&mut self, site: SiteRef) -> Result<Vec<Point>> {
        Ok(self
            .staged
            .points
            .iter()
            .filter(|p| p.site == site)
            .cloned()
            .collect())
    }

    fn insert_point(&mut self, site: SiteRef, draft: &PointDraft) -> Result<PointRef> {
        if !self.staged.has_site(site) {
            return Err(SnowexError::fatal(format!("no site {}", site)));
        }
        let id = PointRef(self.staged.allocate());
        self.staged.points.push(Point {
            id,
            site,
            location: draft.location,
            elevation_m: draft.elevation_m,
            observed_at: draft.observed_at,
            label: draft.label.clone(),
        });
        Ok(id)
    }

    fn insert_profile(
        &mut self,
        point: PointRef,
        profile: &NewProfile,
        provenance: ProvenanceRef,
    ) -> Result<ProfileRef> {
        if !self.staged.points.iter().any(|p| p.id == point) {
            return Err(SnowexError::fatal(format!("no point {}", point)));
        }
        let id = ProfileRef(self.staged.allocate());
        self.staged.profiles.push(StoredProfile {
            id,
            point,
            provenance,
            profile: profile.clone(),
        });
        Ok(id)
    }

    fn insert_raster(
        &mut self,
        site: Option<SiteRef>,
        raster: &NewRaster,
        provenance: ProvenanceRef,
    ) -> Result<RasterRef> {
        if let Some(site) = site {
            if !self.staged.has_site(site) {
                return Err(SnowexError::fatal(format!("no site {}", site)));
            }
        }
        let id = RasterRef(self.staged.allocate());
        self.staged.rasters.push(StoredRaster {
            id,
            site,
            provenance,
            raster: raster.clone(),
        });
        Ok(id)
    }

    fn find_provenance_by_checksum(&mut self, checksum: &str) -> Result<Option<ProvenanceRef>> {
        Ok(self
            .staged
            .provenance
            .iter()
            .find(|p| p.record.checksum == checksum)
            .map(|p| p.id))
    }

    fn insert_provenance(&mut self, record: &NewProvenance) -> Result<ProvenanceRef> {
        if self.find_provenance_by_checksum(&record.checksum)?.is_some() {
            return Err(SnowexError::fatal(format!(
                "checksum {} already recorded",
                record.checksum
            )));
        }
        let id = ProvenanceRef(self.staged.allocate());
        self.staged.provenance.push(ProvenanceRecord {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    fn commit(mut self) -> Result<()> {
        #[cfg(test)]
        if self.store.take_commit_failure() {
            return Err(SnowexError::PersistenceTransient {
                message: "injected commit failure".to_string(),
            });
        }
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        debug!("Discarding staged changes");
        Ok(())
    }
}

impl Store for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&self) -> Result<MemoryTx<'_>> {
        let guard = self.lock()?;
        let staged = guard.clone();
        Ok(MemoryTx {
            #[cfg(test)]
            store: self,
            guard,
            staged,
        })
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }

    fn sites(&self) -> Result<Vec<Site>> {
        Ok(self.lock()?.sites.clone())
    }

    fn points(&self, site: SiteRef) -> Result<Vec<Point>> {
        Ok(self
            .lock()?
            .points
            .iter()
            .filter(|p| p.site == site)
            .cloned()
            .collect())
    }

    fn profiles(&self, point: PointRef) -> Result<Vec<StoredProfile>> {
        Ok(self
            .lock()?
            .profiles
            .iter()
            .filter(|p| p.point == point)
            .cloned()
            .collect())
    }

    fn rasters(&self) -> Result<Vec<StoredRaster>> {
        Ok(self.lock()?.rasters.clone())
    }

    fn find_provenance(&self, checksum: &str) -> Result<Option<ProvenanceRecord>> {
        Ok(self
            .lock()?
            .provenance
            .iter()
            .find(|p| p.record.checksum == checksum)
            .cloned())
    }

    fn counts(&self) -> Result<StoreCounts> {
        let state = self.lock()?;
        Ok(StoreCounts {
            sites: state.sites.len(),
            points: state.points.len(),
            profiles: state.profiles.len(),
            rasters: state.rasters.len(),
            provenance: state.provenance.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_while_transaction_open() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(20));
        let _tx = store.begin().unwrap();

        let err = store.sites().unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
    }

    #[test]
    fn test_injected_commit_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);

        let draft = SiteDraft {
            name: "Grand Mesa".to_string(),
            location: None,
            description: None,
        };

        let mut tx = store.begin().unwrap();
        tx.insert_site(&draft).unwrap();
        assert!(tx.commit().unwrap_err().is_transient());
        assert!(store.sites().unwrap().is_empty());

        let mut tx = store.begin().unwrap();
        tx.insert_site(&draft).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.sites().unwrap().len(), 1);
    }
}
