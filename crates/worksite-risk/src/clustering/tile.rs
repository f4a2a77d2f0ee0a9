use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::domain::{BoundingBox, GeoPoint};

/// Latitude limit of the Web Mercator projection.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TileError {
    #[error("zoom {z} is above the maximum of {max}")]
    ZoomTooDeep { z: u8, max: u8 },
    #[error("tile {x}/{y} is outside zoom {z}")]
    OutOfRange { z: u8, x: u32, y: u32 },
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32, max_zoom: u8) -> Result<Self, TileError> {
        if z > max_zoom {
            return Err(TileError::ZoomTooDeep { z, max: max_zoom });
        }
        let span = 1u64 << z;
        if u64::from(x) >= span || u64::from(y) >= span {
            return Err(TileError::OutOfRange { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    pub fn bbox(&self) -> BoundingBox {
        let n = (1u64 << self.z) as f64;
        let lon = |x: f64| x / n * 360.0 - 180.0;
        let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
        BoundingBox {
            min_longitude: lon(f64::from(self.x)),
            max_longitude: lon(f64::from(self.x) + 1.0),
            min_latitude: lat(f64::from(self.y) + 1.0),
            max_latitude: lat(f64::from(self.y)),
        }
    }
}

/// Grid cell of `point` when the world is split into `2^level` cells per
/// axis.
pub fn cell_of(point: &GeoPoint, level: u32) -> (u64, u64) {
    let n = (1u64 << level) as f64;
    let lat = point.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (point.longitude + 180.0) / 360.0 * n;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n;
    let max = n - 1.0;
    (x.floor().clamp(0.0, max) as u64, y.floor().clamp(0.0, max) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_zero_covers_the_world() {
        let bbox = TileCoord::new(0, 0, 0, 16).unwrap().bbox();
        assert_eq!(bbox.min_longitude, -180.0);
        assert_eq!(bbox.max_longitude, 180.0);
        assert!((bbox.max_latitude - MAX_LATITUDE).abs() < 1e-6);
    }

    #[test]
    fn cell_lands_inside_its_tile_bbox() {
        let point = GeoPoint::new(40.0, -74.0).unwrap();
        let (x, y) = cell_of(&point, 10);
        let tile = TileCoord::new(10, x as u32, y as u32, 16).unwrap();
        assert!(tile.bbox().contains(&point));
    }

    #[test]
    fn out_of_range_tiles_are_rejected() {
        assert_eq!(
            TileCoord::new(2, 4, 0, 16),
            Err(TileError::OutOfRange { z: 2, x: 4, y: 0 })
        );
        assert!(matches!(
            TileCoord::new(17, 0, 0, 16),
            Err(TileError::ZoomTooDeep { .. })
        ));
    }
}
