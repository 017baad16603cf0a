//! Persistence interface.
//!
//! A [`Store`] hands out [`Transaction`]s; everything one file produces is
//! written through a single transaction and becomes visible on
//! [`Transaction::commit`]. Dropping a transaction without committing rolls it
//! back. Both implementations serialize writers for the lifetime of a
//! transaction, so find-or-create never races with another file.
//!
//! - [`memory::MemoryStore`] - in-process state for tests and dry runs
//! - [`sqlite::SqliteStore`] - SQLite file, the CLI default

pub mod memory;
pub mod schema;
pub mod sqlite;

#[cfg(test)]
mod tests;

use crate::config::Tolerances;
use crate::error::Result;
use crate::models::{
    NewProfile, NewProvenance, NewRaster, Point, PointDraft, PointRef, ProfileRef,
    ProvenanceRecord, ProvenanceRef, RasterRef, Site, SiteDraft, SiteRef, StoreCounts,
    StoredProfile, StoredRaster,
};
use crate::resolver::Resolver;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Writes for one file, applied atomically
pub trait Transaction {
    // ---- primitives ------------------------------------------------------

    /// All sites, in id order
    fn sites(&mut self) -> Result<Vec<Site>>;

    fn insert_site(&mut self, draft: &SiteDraft) -> Result<SiteRef>;

    /// Fill in a site's description
    fn set_site_description(&mut self, site: SiteRef, description: &str) -> Result<()>;

    /// Points of one site, in id order
    fn points_in_site(&mut self, site: SiteRef) -> Result<Vec<Point>>;

    fn insert_point(&mut self, site: SiteRef, draft: &PointDraft) -> Result<PointRef>;

    fn insert_profile(
        &mut self,
        point: PointRef,
        profile: &NewProfile,
        provenance: ProvenanceRef,
    ) -> Result<ProfileRef>;

    fn insert_raster(
        &mut self,
        site: Option<SiteRef>,
        raster: &NewRaster,
        provenance: ProvenanceRef,
    ) -> Result<RasterRef>;

    fn find_provenance_by_checksum(&mut self, checksum: &str) -> Result<Option<ProvenanceRef>>;

    fn insert_provenance(&mut self, record: &NewProvenance) -> Result<ProvenanceRef>;

    fn commit(self) -> Result<()>
    where
        Self: Sized;

    fn rollback(self) -> Result<()>
    where
        Self: Sized;

    // ---- find-or-create --------------------------------------------------

    /// Existing site by name or proximity, else a new one
    fn find_or_create_site(&mut self, draft: &SiteDraft, policy: &Tolerances) -> Result<SiteRef>
    where
        Self: Sized,
    {
        Resolver::new(policy).resolve_site(self, draft)
    }

    /// Existing point within `site` by distance and time, else a new one
    fn find_or_create_point(
        &mut self,
        site: SiteRef,
        draft: &PointDraft,
        policy: &Tolerances,
    ) -> Result<PointRef>
    where
        Self: Sized,
    {
        Resolver::new(policy).resolve_point(self, site, draft)
    }
}

/// A transactional store keyed by entity identity
pub trait Store: Send + Sync {
    type Tx<'a>: Transaction
    where
        Self: 'a;

    /// Start a write transaction, waiting for other writers up to the
    /// store's lock timeout
    fn begin(&self) -> Result<Self::Tx<'_>>;

    /// Short description for logs, e.g. the database path
    fn describe(&self) -> String;

    // ---- read helpers ----------------------------------------------------

    fn sites(&self) -> Result<Vec<Site>>;

    fn points(&self, site: SiteRef) -> Result<Vec<Point>>;

    fn profiles(&self, point: PointRef) -> Result<Vec<StoredProfile>>;

    fn rasters(&self) -> Result<Vec<StoredRaster>>;

    fn find_provenance(&self, checksum: &str) -> Result<Option<ProvenanceRecord>>;

    fn counts(&self) -> Result<StoreCounts>;
}
