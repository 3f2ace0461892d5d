use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    #[error("Mesh has no triangles")]
    Empty,
    #[error("Triangle {triangle} references vertex {vertex}, mesh has {vertex_count} vertices")]
    VertexOutOfRange {
        triangle: usize,
        vertex: u32,
        vertex_count: usize,
    },
}

/// Closed triangle surface in world coordinates (tissue, target structures).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    vertices: Vec<DVec3>,
    triangles: Vec<[u32; 3]>,
    #[serde(skip)]
    bounds: Option<(DVec3, DVec3)>,
}

// Skewed so parity rays rarely graze shared edges of axis-aligned tessellations.
const PARITY_RAY: DVec3 = DVec3::new(0.267_261_2, 0.534_522_5, 0.801_783_7);
const HIT_EPSILON: f64 = 1e-12;

impl TriangleMesh {
    pub fn new(vertices: Vec<DVec3>, triangles: Vec<[u32; 3]>) -> Result<Self, MeshError> {
        if triangles.is_empty() {
            return Err(MeshError::Empty);
        }
        for (triangle, indices) in triangles.iter().enumerate() {
            if let Some(&vertex) = indices.iter().find(|&&v| v as usize >= vertices.len()) {
                return Err(MeshError::VertexOutOfRange {
                    triangle,
                    vertex,
                    vertex_count: vertices.len(),
                });
            }
        }

        let bounds = vertices.iter().fold(
            (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
            |(min, max), v| (min.min(*v), max.max(*v)),
        );

        Ok(Self {
            vertices,
            triangles,
            bounds: Some(bounds),
        })
    }

    /// Latitude/longitude tessellated sphere. Takes at least 2 rings and 3 segments.
    pub fn uv_sphere(center: DVec3, radius: f64, rings: u32, segments: u32) -> Self {
        let rings = rings.max(2);
        let segments = segments.max(3);

        let mut vertices = vec![center + DVec3::Z * radius];
        for ring in 1..rings {
            let polar = std::f64::consts::PI * ring as f64 / rings as f64;
            for segment in 0..segments {
                let azimuth = std::f64::consts::TAU * segment as f64 / segments as f64;
                vertices.push(
                    center
                        + radius
                            * DVec3::new(
                                polar.sin() * azimuth.cos(),
                                polar.sin() * azimuth.sin(),
                                polar.cos(),
                            ),
                );
            }
        }
        let south = vertices.len() as u32;
        vertices.push(center - DVec3::Z * radius);

        let ring_start = |ring: u32| 1 + (ring - 1) * segments;
        let mut triangles = Vec::with_capacity((2 * segments * (rings - 1)) as usize);
        for segment in 0..segments {
            let next = (segment + 1) % segments;
            triangles.push([0, ring_start(1) + segment, ring_start(1) + next]);
            triangles.push([south, ring_start(rings - 1) + next, ring_start(rings - 1) + segment]);
        }
        for ring in 1..rings - 1 {
            for segment in 0..segments {
                let next = (segment + 1) % segments;
                let (a, b) = (ring_start(ring) + segment, ring_start(ring) + next);
                let (c, d) = (ring_start(ring + 1) + segment, ring_start(ring + 1) + next);
                triangles.push([a, c, d]);
                triangles.push([a, d, b]);
            }
        }

        Self {
            vertices,
            triangles,
            bounds: Some((center - DVec3::splat(radius.abs()), center + DVec3::splat(radius.abs()))),
        }
    }

    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    fn bounds(&self) -> (DVec3, DVec3) {
        self.bounds.unwrap_or_else(|| {
            self.vertices.iter().fold(
                (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
                |(min, max), v| (min.min(*v), max.max(*v)),
            )
        })
    }

    fn corners(&self, triangle: &[u32; 3]) -> [DVec3; 3] {
        triangle.map(|index| self.vertices[index as usize])
    }

    /// Enclosed-point test by ray parity. Assumes a closed surface.
    pub fn is_inside(&self, point: DVec3) -> bool {
        let (min, max) = self.bounds();
        if point.cmplt(min).any() || point.cmpgt(max).any() {
            return false;
        }

        let crossings = self
            .triangles
            .iter()
            .filter_map(|triangle| ray_triangle(point, PARITY_RAY, self.corners(triangle)))
            .filter(|&t| t > HIT_EPSILON)
            .count();

        crossings % 2 == 1
    }

    /// Whether the segment `start..end` crosses any triangle, within `tolerance` of its ends.
    pub fn intersects_segment(&self, start: DVec3, end: DVec3, tolerance: f64) -> bool {
        let direction = end - start;
        self.triangles.iter().any(|triangle| {
            ray_triangle(start, direction, self.corners(triangle))
                .is_some_and(|t| t >= -tolerance && t <= 1.0 + tolerance)
        })
    }
}

/// Möller–Trumbore. Returns the ray parameter of the hit, in units of `direction`.
fn ray_triangle(origin: DVec3, direction: DVec3, [a, b, c]: [DVec3; 3]) -> Option<f64> {
    let edge1 = b - a;
    let edge2 = c - a;
    let p = direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < HIT_EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    Some(edge2.dot(q) * inv_det)
}
