//! Entity resolution: decide whether header metadata refers to an existing
//! Site/Point or needs a new one.
//!
//! Matching is pure: [`match_site`] and [`match_point`] take the candidates
//! and explicit [`Tolerances`] and never touch the store. [`Resolver`] wires
//! them to a [`Transaction`] and caches what it has read for the lifetime of
//! that transaction.

use crate::config::Tolerances;
use crate::error::{Result, SnowexError};
use crate::models::{Point, PointDraft, PointRef, Site, SiteDraft, SiteRef};
use crate::normalize::crs::haversine_m;
use crate::store::Transaction;
use std::collections::HashMap;
use tracing::{debug, info};

/// Case-insensitive, whitespace-folded site name used for identity
pub fn site_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Find the existing site `draft` refers to.
///
/// An exact name match wins; otherwise every site within `radius_m`
/// (inclusive) is a candidate. More than one candidate is an error.
pub fn match_site<'a>(draft: &SiteDraft, sites: &'a [Site], radius_m: f64) -> Result<Option<&'a Site>> {
    let key = site_key(&draft.name);
    let by_name: Vec<&Site> = sites.iter().filter(|s| site_key(&s.name) == key).collect();
    if !by_name.is_empty() {
        return single("site", by_name, |s| s.id.0);
    }

    let Some(location) = draft.location else {
        return Ok(None);
    };
    let nearby: Vec<&Site> = sites
        .iter()
        .filter(|s| {
            s.location
                .is_some_and(|l| haversine_m(l, location) <= radius_m)
        })
        .collect();
    single("site", nearby, |s| s.id.0)
}

/// Find the existing point within a site that `draft` refers to.
///
/// A candidate must be within the point radius AND the time window, both
/// inclusive.
pub fn match_point<'a>(
    draft: &PointDraft,
    points: &'a [Point],
    tolerances: &Tolerances,
) -> Result<Option<&'a Point>> {
    let window = tolerances.time_window();
    let candidates: Vec<&Point> = points
        .iter()
        .filter(|p| haversine_m(p.location, draft.location) <= tolerances.point_radius_m)
        .filter(|p| (p.observed_at - draft.observed_at).abs() <= window)
        .collect();
    single("point", candidates, |p| p.id.0)
}

/// Zero or one candidate; candidates are reported in id order
fn single<'a, T>(
    entity: &str,
    mut candidates: Vec<&'a T>,
    id: impl Fn(&T) -> i64,
) -> Result<Option<&'a T>> {
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        _ => {
            let mut ids: Vec<i64> = candidates.iter().map(|c| id(*c)).collect();
            ids.sort_unstable();
            Err(SnowexError::AmbiguousEntityMatch {
                entity: entity.to_string(),
                candidates: ids,
            })
        }
    }
}

/// Find-or-create over one transaction, with a transaction-scoped cache
#[derive(Debug)]
pub struct Resolver<'p> {
    policy: &'p Tolerances,
    sites: Option<Vec<Site>>,
    points: HashMap<SiteRef, Vec<Point>>,
}

impl<'p> Resolver<'p> {
    pub fn new(policy: &'p Tolerances) -> Self {
        Self {
            policy,
            sites: None,
            points: HashMap::new(),
        }
    }

    fn sites<T: Transaction + ?Sized>(&mut self, tx: &mut T) -> Result<&mut Vec<Site>> {
        if self.sites.is_none() {
            let mut sites = tx.sites()?;
            sites.sort_by_key(|s| s.id);
            self.sites = Some(sites);
        }
        Ok(self.sites.get_or_insert_with(Vec::new))
    }

    fn points<T: Transaction + ?Sized>(&mut self, tx: &mut T, site: SiteRef) -> Result<&mut Vec<Point>> {
        if !self.points.contains_key(&site) {
            let mut points = tx.points_in_site(site)?;
            points.sort_by_key(|p| p.id);
            self.points.insert(site, points);
        }
        Ok(self.points.entry(site).or_default())
    }

    /// Resolve a site, enriching an empty description when the header has one
    pub fn resolve_site<T: Transaction + ?Sized>(&mut self, tx: &mut T, draft: &SiteDraft) -> Result<SiteRef> {
        let radius = self.policy.site_radius_m;
        let sites = self.sites(tx)?;

        let matched = match_site(draft, sites, radius)?.map(|s| s.id);
        if let Some(id) = matched {
            let needs_description = sites
                .iter()
                .any(|s| s.id == id && s.description.is_none());
            if let (true, Some(description)) = (needs_description, draft.description.as_deref()) {
                tx.set_site_description(id, description)?;
                if let Some(site) = self.sites.as_mut().and_then(|s| s.iter_mut().find(|s| s.id == id)) {
                    site.description = Some(description.to_string());
                }
                debug!("Site {} description set from header", id);
            }
            debug!("Matched site '{}' to {}", draft.name, id);
            return Ok(id);
        }

        let id = tx.insert_site(draft)?;
        info!("Created site {} '{}'", id, draft.name);
        self.sites(tx)?.push(Site {
            id,
            name: draft.name.trim().to_string(),
            location: draft.location,
            description: draft.description.clone(),
        });
        Ok(id)
    }

    /// Resolve a point within `site`
    pub fn resolve_point<T: Transaction + ?Sized>(
        &mut self,
        tx: &mut T,
        site: SiteRef,
        draft: &PointDraft,
    ) -> Result<PointRef> {
        let policy = *self.policy;
        let points = self.points(tx, site)?;

        if let Some(existing) = match_point(draft, points, &policy)? {
            debug!("Matched point to {} in site {}", existing.id, site);
            return Ok(existing.id);
        }

        let id = tx.insert_point(site, draft)?;
        info!(
            "Created point {} in site {} at ({:.6}, {:.6})",
            id, site, draft.location.latitude, draft.location.longitude
        );
        points.push(Point {
            id,
            site,
            location: draft.location,
            elevation_m: draft.elevation_m,
            observed_at: draft.observed_at,
            label: draft.label.clone(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use chrono::{Duration, TimeZone, Utc};

    fn site(id: i64, name: &str, location: Option<GeoPoint>) -> Site {
        Site {
            id: SiteRef(id),
            name: name.to_string(),
            location,
            description: None,
        }
    }

    fn draft(name: &str, location: Option<GeoPoint>) -> SiteDraft {
        SiteDraft {
            name: name.to_string(),
            location,
            description: None,
        }
    }

    fn point(id: i64, location: GeoPoint, minutes: i64) -> Point {
        Point {
            id: PointRef(id),
            site: SiteRef(1),
            location,
            elevation_m: None,
            observed_at: Utc.with_ymd_and_hms(2020, 2, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
            label: None,
        }
    }

    fn point_draft(location: GeoPoint, minutes: i64) -> PointDraft {
        PointDraft {
            location,
            elevation_m: None,
            observed_at: Utc.with_ymd_and_hms(2020, 2, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
            label: None,
        }
    }

    /// A point `metres` due north of `origin`
    fn north_of(origin: GeoPoint, metres: f64) -> GeoPoint {
        let degrees = metres / (crate::constants::EARTH_MEAN_RADIUS_M * std::f64::consts::PI / 180.0);
        GeoPoint::new(origin.latitude + degrees, origin.longitude)
    }

    const GM: GeoPoint = GeoPoint {
        latitude: 39.05,
        longitude: -108.06,
    };

    #[test]
    fn test_site_name_match_ignores_case_and_spacing() {
        let sites = vec![site(1, "Grand Mesa", None), site(2, "Senator Beck", None)];
        let found = match_site(&draft("  grand   MESA ", None), &sites, 0.0).unwrap();
        assert_eq!(found.map(|s| s.id), Some(SiteRef(1)));
    }

    #[test]
    fn test_site_proximity_boundary_is_inclusive() {
        let sites = vec![site(1, "Grand Mesa", Some(GM))];
        let nearby = north_of(GM, 500.0);
        let radius = haversine_m(GM, nearby);

        let at_radius = match_site(&draft("GM pit", Some(nearby)), &sites, radius).unwrap();
        assert_eq!(at_radius.map(|s| s.id), Some(SiteRef(1)));

        let beyond = match_site(&draft("GM pit", Some(nearby)), &sites, radius - 0.01).unwrap();
        assert!(beyond.is_none());
    }

    #[test]
    fn test_site_ambiguity_lists_candidates_in_id_order() {
        let sites = vec![
            site(7, "A", Some(north_of(GM, 100.0))),
            site(3, "B", Some(north_of(GM, -100.0))),
        ];
        match match_site(&draft("C", Some(GM)), &sites, 200.0).unwrap_err() {
            SnowexError::AmbiguousEntityMatch { entity, candidates } => {
                assert_eq!(entity, "site");
                assert_eq!(candidates, vec![3, 7]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_point_needs_distance_and_time() {
        let tolerances = Tolerances::new(1000.0, 10.0, 3600.0);
        let points = vec![point(1, GM, 0)];

        let same = match_point(&point_draft(north_of(GM, 5.0), 30), &points, &tolerances).unwrap();
        assert_eq!(same.map(|p| p.id), Some(PointRef(1)));

        let too_far = match_point(&point_draft(north_of(GM, 50.0), 0), &points, &tolerances).unwrap();
        assert!(too_far.is_none());

        let too_late = match_point(&point_draft(GM, 61), &points, &tolerances).unwrap();
        assert!(too_late.is_none());

        // Exactly at the window edge still matches
        let at_edge = match_point(&point_draft(GM, -60), &points, &tolerances).unwrap();
        assert_eq!(at_edge.map(|p| p.id), Some(PointRef(1)));
    }

    #[test]
    fn test_point_ambiguity() {
        let tolerances = Tolerances::new(1000.0, 10.0, 3600.0);
        let points = vec![point(2, north_of(GM, 4.0), 0), point(1, north_of(GM, -4.0), 0)];
        let err = match_point(&point_draft(GM, 0), &points, &tolerances).unwrap_err();
        match err {
            SnowexError::AmbiguousEntityMatch { candidates, .. } => assert_eq!(candidates, vec![1, 2]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_matching_is_deterministic() {
        let tolerances = Tolerances::new(1000.0, 10.0, 3600.0);
        let sites = vec![site(1, "Grand Mesa", Some(GM))];
        let points = vec![point(4, GM, 0)];
        for _ in 0..3 {
            let s = match_site(&draft("Grand Mesa", Some(GM)), &sites, 1000.0).unwrap();
            let p = match_point(&point_draft(GM, 0), &points, &tolerances).unwrap();
            assert_eq!((s.map(|s| s.id), p.map(|p| p.id)), (Some(SiteRef(1)), Some(PointRef(4))));
        }
    }
}
