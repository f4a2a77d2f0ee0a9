use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use serde::Serialize;
use tracing::debug;

use super::tile::{cell_of, TileCoord, TileError};
use crate::config::ClusterConfig;
use crate::domain::{BoundingBox, GeoPoint, Location, LocationId, TenantId};

const MAX_GRID_LEVEL: u32 = 30;

/// Point or cluster feature returned for a tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TileFeature {
    Point {
        location_id: LocationId,
        point: GeoPoint,
    },
    Cluster {
        count: usize,
        centroid: GeoPoint,
        bbox: BoundingBox,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub added: usize,
    pub moved: usize,
    pub removed: usize,
}

type Cell = (u64, u64);

#[derive(Debug)]
struct TenantIndex {
    points: HashMap<LocationId, GeoPoint>,
    /// One cell map per zoom level `0..=max_zoom`.
    zooms: Vec<HashMap<Cell, BTreeSet<LocationId>>>,
}

impl TenantIndex {
    fn new(max_zoom: u8) -> Self {
        Self {
            points: HashMap::new(),
            zooms: vec![HashMap::new(); usize::from(max_zoom) + 1],
        }
    }

    fn insert(&mut self, id: LocationId, point: GeoPoint, cell_bits: u8) {
        for (z, cells) in self.zooms.iter_mut().enumerate() {
            let cell = cell_of(&point, grid_level(z as u8, cell_bits));
            cells.entry(cell).or_default().insert(id);
        }
        self.points.insert(id, point);
    }

    fn remove(&mut self, id: LocationId, cell_bits: u8) -> bool {
        let Some(point) = self.points.remove(&id) else {
            return false;
        };
        for (z, cells) in self.zooms.iter_mut().enumerate() {
            let cell = cell_of(&point, grid_level(z as u8, cell_bits));
            if let Some(members) = cells.get_mut(&cell) {
                members.remove(&id);
                if members.is_empty() {
                    cells.remove(&cell);
                }
            }
        }
        true
    }
}

fn grid_level(z: u8, cell_bits: u8) -> u32 {
    (u32::from(z) + u32::from(cell_bits)).min(MAX_GRID_LEVEL)
}

/// Per-tenant grid clustering of location points, one grid per zoom level.
pub struct ClusterIndex {
    config: ClusterConfig,
    tenants: RwLock<HashMap<TenantId, TenantIndex>>,
}

impl ClusterIndex {
    pub fn new(config: ClusterConfig) -> Self {
        let config = ClusterConfig {
            max_zoom: config.max_zoom.min(24),
            cell_bits: config.cell_bits.min(6),
        };
        Self {
            config,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> ClusterConfig {
        self.config
    }

    /// Applies one batch of location writes. Archived locations passed as
    /// added or updated are treated as deletions.
    pub fn cluster_batch(
        &self,
        tenant_id: TenantId,
        added: &[Location],
        updated: &[Location],
        deleted: &[LocationId],
    ) -> BatchSummary {
        let cell_bits = self.config.cell_bits;
        let mut tenants = self.tenants.write().expect("cluster index poisoned");
        let index = tenants
            .entry(tenant_id)
            .or_insert_with(|| TenantIndex::new(self.config.max_zoom));
        let mut summary = BatchSummary::default();

        for id in deleted {
            if index.remove(*id, cell_bits) {
                summary.removed += 1;
            }
        }
        for location in added.iter().chain(updated) {
            let existed = index.remove(location.id, cell_bits);
            if location.is_archived() || location.tenant_id != tenant_id {
                if existed {
                    summary.removed += 1;
                }
                continue;
            }
            index.insert(location.id, location.geom, cell_bits);
            if existed {
                summary.moved += 1;
            } else {
                summary.added += 1;
            }
        }

        debug!(%tenant_id, ?summary, points = index.points.len(), "cluster batch applied");
        summary
    }

    /// Features for the `(z, x, y)` tile: single points stay points, cells
    /// with several locations collapse into one cluster.
    pub fn tile_query(
        &self,
        tenant_id: TenantId,
        z: u8,
        x: u32,
        y: u32,
    ) -> Result<Vec<TileFeature>, TileError> {
        let tile = TileCoord::new(z, x, y, self.config.max_zoom)?;
        let tenants = self.tenants.read().expect("cluster index poisoned");
        let Some(index) = tenants.get(&tenant_id) else {
            return Ok(Vec::new());
        };

        let shift = grid_level(z, self.config.cell_bits) - u32::from(z);
        let mut cells: Vec<(&Cell, &BTreeSet<LocationId>)> = index.zooms[usize::from(z)]
            .iter()
            .filter(|((cx, cy), _)| {
                cx >> shift == u64::from(tile.x) && cy >> shift == u64::from(tile.y)
            })
            .collect();
        cells.sort_by_key(|(cell, _)| **cell);

        Ok(cells
            .into_iter()
            .filter_map(|(_, members)| feature(&index.points, members))
            .collect())
    }
}

fn feature(
    points: &HashMap<LocationId, GeoPoint>,
    members: &BTreeSet<LocationId>,
) -> Option<TileFeature> {
    let located: Vec<(LocationId, GeoPoint)> = members
        .iter()
        .filter_map(|id| points.get(id).map(|point| (*id, *point)))
        .collect();
    match located.as_slice() {
        [] => None,
        [(location_id, point)] => Some(TileFeature::Point {
            location_id: *location_id,
            point: *point,
        }),
        many => {
            let count = many.len();
            let mut bbox = BoundingBox {
                min_longitude: f64::MAX,
                min_latitude: f64::MAX,
                max_longitude: f64::MIN,
                max_latitude: f64::MIN,
            };
            let (mut lat, mut lon) = (0.0, 0.0);
            for (_, point) in many {
                lat += point.latitude;
                lon += point.longitude;
                bbox.min_longitude = bbox.min_longitude.min(point.longitude);
                bbox.max_longitude = bbox.max_longitude.max(point.longitude);
                bbox.min_latitude = bbox.min_latitude.min(point.latitude);
                bbox.max_latitude = bbox.max_latitude.max(point.latitude);
            }
            Some(TileFeature::Cluster {
                count,
                centroid: GeoPoint {
                    latitude: lat / count as f64,
                    longitude: lon / count as f64,
                },
                bbox,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::RiskLevel;

    fn location(tenant_id: TenantId, latitude: f64, longitude: f64) -> Location {
        Location {
            id: LocationId::new(),
            tenant_id,
            work_package_id: None,
            name: "site".to_string(),
            address: None,
            geom: GeoPoint::new(latitude, longitude).unwrap(),
            risk: RiskLevel::Unknown,
            supervisor_id: None,
            additional_supervisor_ids: Vec::new(),
            external_key: None,
            archived_at: None,
        }
    }

    fn tile_for(point: &GeoPoint, z: u8) -> (u32, u32) {
        let (x, y) = cell_of(point, u32::from(z));
        (x as u32, y as u32)
    }

    fn index() -> ClusterIndex {
        ClusterIndex::new(ClusterConfig {
            max_zoom: 16,
            cell_bits: 2,
        })
    }

    #[test]
    fn nearby_points_cluster_at_low_zoom_and_split_at_high_zoom() {
        let index = index();
        let tenant = TenantId::new();
        let a = location(tenant, 40.0, -74.0);
        let b = location(tenant, 40.003, -74.003);
        index.cluster_batch(tenant, &[a.clone(), b.clone()], &[], &[]);

        let (x, y) = tile_for(&a.geom, 3);
        let low = index.tile_query(tenant, 3, x, y).unwrap();
        assert!(matches!(low.as_slice(), [TileFeature::Cluster { count: 2, .. }]));

        let (x, y) = tile_for(&a.geom, 16);
        let high = index.tile_query(tenant, 16, x, y).unwrap();
        assert!(high
            .iter()
            .any(|f| matches!(f, TileFeature::Point { location_id, .. } if *location_id == a.id)));
    }

    #[test]
    fn updates_move_and_deletes_remove() {
        let index = index();
        let tenant = TenantId::new();
        let mut site = location(tenant, 40.0, -74.0);
        index.cluster_batch(tenant, &[site.clone()], &[], &[]);

        let old_tile = tile_for(&site.geom, 10);
        site.geom = GeoPoint::new(34.0, -118.0).unwrap();
        let summary = index.cluster_batch(tenant, &[], &[site.clone()], &[]);
        assert_eq!(summary.moved, 1);
        assert!(index
            .tile_query(tenant, 10, old_tile.0, old_tile.1)
            .unwrap()
            .is_empty());

        let new_tile = tile_for(&site.geom, 10);
        assert_eq!(index.tile_query(tenant, 10, new_tile.0, new_tile.1).unwrap().len(), 1);

        let summary = index.cluster_batch(tenant, &[], &[], &[site.id]);
        assert_eq!(summary.removed, 1);
        assert!(index
            .tile_query(tenant, 10, new_tile.0, new_tile.1)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn tenants_do_not_see_each_other() {
        let index = index();
        let tenant = TenantId::new();
        let site = location(tenant, 40.0, -74.0);
        index.cluster_batch(tenant, &[site], &[], &[]);
        assert!(index.tile_query(TenantId::new(), 0, 0, 0).unwrap().is_empty());
        assert_eq!(index.tile_query(tenant, 0, 0, 0).unwrap().len(), 1);
    }

    #[test]
    fn archived_locations_leave_the_index() {
        let index = index();
        let tenant = TenantId::new();
        let mut site = location(tenant, 40.0, -74.0);
        index.cluster_batch(tenant, &[site.clone()], &[], &[]);
        site.archived_at = Some(chrono::Utc::now());
        let summary = index.cluster_batch(tenant, &[], &[site], &[]);
        assert_eq!(summary.removed, 1);
        assert!(index.tile_query(tenant, 0, 0, 0).unwrap().is_empty());
    }
}
