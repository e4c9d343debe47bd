//! Named-area registry used by the conflict-area filter.
//!
//! The registry is an injected service with an explicit lifecycle
//! (define/delete/reset); the detector receives it by reference and only
//! ever asks one question: is this point inside that named region.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A named region of airspace with a floor and a ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AreaShape {
    Box {
        lat0: f64,
        lon0: f64,
        lat1: f64,
        lon1: f64,
        floor_m: f64,
        ceiling_m: f64,
    },
    Circle {
        lat: f64,
        lon: f64,
        radius_m: f64,
        floor_m: f64,
        ceiling_m: f64,
    },
    Poly {
        /// Vertices as [lat, lon] pairs.
        vertices: Vec<[f64; 2]>,
        floor_m: f64,
        ceiling_m: f64,
    },
}

impl AreaShape {
    pub fn inside(&self, lat: f64, lon: f64, alt_m: f64) -> bool {
        match self {
            AreaShape::Box {
                lat0,
                lon0,
                lat1,
                lon1,
                floor_m,
                ceiling_m,
            } => {
                let (lat_lo, lat_hi) = (lat0.min(*lat1), lat0.max(*lat1));
                let (lon_lo, lon_hi) = (lon0.min(*lon1), lon0.max(*lon1));
                (lat_lo..=lat_hi).contains(&lat)
                    && (lon_lo..=lon_hi).contains(&lon)
                    && (*floor_m..=*ceiling_m).contains(&alt_m)
            }
            AreaShape::Circle {
                lat: clat,
                lon: clon,
                radius_m,
                floor_m,
                ceiling_m,
            } => {
                let (_, dist) = crate::geometry::bearing_distance(*clat, *clon, lat, lon);
                dist <= *radius_m && (*floor_m..=*ceiling_m).contains(&alt_m)
            }
            AreaShape::Poly {
                vertices,
                floor_m,
                ceiling_m,
            } => {
                if !(*floor_m..=*ceiling_m).contains(&alt_m) {
                    return false;
                }
                point_in_polygon(lat, lon, vertices)
            }
        }
    }
}

/// Ray casting: count edge crossings of a ray going east from the point.
fn point_in_polygon(lat: f64, lon: f64, vertices: &[[f64; 2]]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (yi, xi) = (vertices[i][0], vertices[i][1]);
        let (yj, xj) = (vertices[j][0], vertices[j][1]);
        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Thread-safe registry of named areas.
#[derive(Debug, Default)]
pub struct AreaRegistry {
    shapes: DashMap<String, AreaShape>,
}

impl AreaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or replace a named area.
    pub fn define(&self, name: impl Into<String>, shape: AreaShape) {
        let name = name.into();
        tracing::debug!(area = %name, "area defined");
        self.shapes.insert(name, shape);
    }

    /// Delete an area; returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        self.shapes.remove(name).is_some()
    }

    pub fn reset(&self) {
        self.shapes.clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shapes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Whether the point is inside the named area. An unknown name counts
    /// as not inside; the config layer is where unknown names are rejected.
    pub fn inside(&self, name: &str, lat: f64, lon: f64, alt_m: f64) -> bool {
        self.shapes
            .get(name)
            .map(|shape| shape.inside(lat, lon, alt_m))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_containment_with_unordered_corners() {
        let shape = AreaShape::Box {
            lat0: 1.0,
            lon0: 1.0,
            lat1: 0.0,
            lon1: 0.0,
            floor_m: 0.0,
            ceiling_m: 10_000.0,
        };
        assert!(shape.inside(0.5, 0.5, 5_000.0));
        assert!(!shape.inside(0.5, 0.5, 11_000.0));
        assert!(!shape.inside(1.5, 0.5, 5_000.0));
    }

    #[test]
    fn circle_containment() {
        let shape = AreaShape::Circle {
            lat: 0.0,
            lon: 0.0,
            radius_m: 10_000.0,
            floor_m: 0.0,
            ceiling_m: 1e9,
        };
        assert!(shape.inside(0.05, 0.0, 100.0));
        assert!(!shape.inside(0.5, 0.0, 100.0));
    }

    #[test]
    fn polygon_containment() {
        let shape = AreaShape::Poly {
            vertices: vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]],
            floor_m: 0.0,
            ceiling_m: 1e9,
        };
        assert!(shape.inside(0.5, 0.5, 100.0));
        assert!(!shape.inside(1.5, 0.5, 100.0));
    }

    #[test]
    fn registry_lifecycle() {
        let registry = AreaRegistry::new();
        registry.define(
            "SECTOR1",
            AreaShape::Circle {
                lat: 0.0,
                lon: 0.0,
                radius_m: 1_000.0,
                floor_m: 0.0,
                ceiling_m: 1e9,
            },
        );
        assert!(registry.contains("SECTOR1"));
        assert!(registry.inside("SECTOR1", 0.0, 0.0, 50.0));
        assert!(!registry.inside("NOSUCH", 0.0, 0.0, 50.0));
        assert!(registry.delete("SECTOR1"));
        assert!(!registry.delete("SECTOR1"));
        registry.define(
            "A",
            AreaShape::Box {
                lat0: 0.0,
                lon0: 0.0,
                lat1: 1.0,
                lon1: 1.0,
                floor_m: 0.0,
                ceiling_m: 1.0,
            },
        );
        registry.reset();
        assert!(registry.is_empty());
    }
}
