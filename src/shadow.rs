use std::str::FromStr;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::light::{CubeFace, ShadowFrustum};

/// Fixed depth bias for the unfiltered comparison path.
pub const HARD_SHADOW_BIAS: f32 = 1e-4;

/// Filter mode applied to the shadow cube sampler.  Owned by the operator
/// controls, not by the shading core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplerFilter {
    /// Single unfiltered depth comparison (hard shadows).
    Nearest,
    /// Comparison against a bilinearly filtered depth value.
    Linear,
    /// Percentage-closer comparison resolved to a smooth [0, 1] fraction.
    #[default]
    ComparisonPcf,
    /// Whatever the engine would pick on its own; resolves to PCF here.
    EngineDefault,
}

impl SamplerFilter {
    /// Next mode in the operator's cycle order.
    pub fn cycle(self) -> Self {
        match self {
            Self::Nearest => Self::Linear,
            Self::Linear => Self::ComparisonPcf,
            Self::ComparisonPcf => Self::EngineDefault,
            Self::EngineDefault => Self::Nearest,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
            Self::ComparisonPcf => "pcf",
            Self::EngineDefault => "default",
        }
    }
}

/// Returned when a sampler filter name from the CLI cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown sampler filter {0:?}; expected nearest, linear, pcf or default")]
pub struct UnknownSamplerFilter(pub String);

impl FromStr for SamplerFilter {
    type Err = UnknownSamplerFilter;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" => Ok(Self::Linear),
            "pcf" | "comparison" => Ok(Self::ComparisonPcf),
            "default" => Ok(Self::EngineDefault),
            other => Err(UnknownSamplerFilter(other.to_string())),
        }
    }
}

/// Remaps a light-local max-axis distance to projective depth in [0, 1].
///
/// Evaluates to 0 at `dist = near` and 1 at `dist = far`, matching the
/// depth the shadow pass writes for an occluder on the face axis.  There
/// is no guard for `dist = 0`; the resulting `-inf` propagates as the
/// comparison failing, the documented degenerate behavior.
pub fn cube_depth(dist: f32, frustum: ShadowFrustum) -> f32 {
    let ShadowFrustum { near, far } = frustum;
    let ndc = (near + far) / (far - near) + (-2.0 * far * near) / (dist * (far - near));
    0.5 + 0.5 * ndc
}

/// Selects the cube face for a lookup direction and maps it to face uv
/// coordinates in [0, 1], following the GL cube map convention.
pub fn face_uv(direction: Vec3) -> (CubeFace, Vec2) {
    let Vec3 { x, y, z } = direction;
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());

    let (face, ma, sc, tc) = if ax >= ay && ax >= az {
        if x >= 0.0 {
            (CubeFace::PositiveX, ax, -z, -y)
        } else {
            (CubeFace::NegativeX, ax, z, -y)
        }
    } else if ay >= az {
        if y >= 0.0 {
            (CubeFace::PositiveY, ay, x, z)
        } else {
            (CubeFace::NegativeY, ay, x, -z)
        }
    } else if z >= 0.0 {
        (CubeFace::PositiveZ, az, x, -y)
    } else {
        (CubeFace::NegativeZ, az, -x, -y)
    };

    let uv = Vec2::new((sc / ma + 1.0) * 0.5, (tc / ma + 1.0) * 0.5);
    (face, uv)
}

/// Six square faces of stored depth values, the read-only shadow resource
/// shared by all fragment invocations of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthCubeMap {
    resolution: usize,
    faces: [Vec<f32>; 6],
}

impl DepthCubeMap {
    /// Creates a map cleared to the far plane (nothing occludes).
    pub fn new(resolution: usize) -> Self {
        Self {
            resolution,
            faces: std::array::from_fn(|_| vec![1.0; resolution * resolution]),
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Overwrites a whole face with one depth value.
    pub fn fill_face(&mut self, face: CubeFace, depth: f32) {
        self.faces[face as usize].fill(depth);
    }

    /// Writes a single texel.
    pub fn write(&mut self, face: CubeFace, x: usize, y: usize, depth: f32) {
        self.faces[face as usize][y * self.resolution + x] = depth;
    }

    fn fetch(&self, face: CubeFace, x: usize, y: usize) -> f32 {
        let x = x.min(self.resolution - 1);
        let y = y.min(self.resolution - 1);
        self.faces[face as usize][y * self.resolution + x]
    }

    /// Nearest-neighbour depth fetch along a lookup direction.
    pub fn sample_nearest(&self, direction: Vec3) -> f32 {
        let (face, uv) = face_uv(direction);
        let x = (uv.x * self.resolution as f32) as usize;
        let y = (uv.y * self.resolution as f32) as usize;
        self.fetch(face, x, y)
    }

    /// Bilinearly filtered depth fetch along a lookup direction.
    pub fn sample_linear(&self, direction: Vec3) -> f32 {
        let (face, weights) = self.filter_footprint(direction);
        weights
            .iter()
            .map(|&(x, y, w)| self.fetch(face, x, y) * w)
            .sum()
    }

    /// Percentage-closer comparison: the bilinear weights are applied to
    /// per-texel binary tests instead of the depths themselves, yielding
    /// the fraction of samples judged unoccluded.
    pub fn compare(&self, direction: Vec3, reference: f32) -> f32 {
        let (face, weights) = self.filter_footprint(direction);
        weights
            .iter()
            .map(|&(x, y, w)| {
                if reference < self.fetch(face, x, y) {
                    w
                } else {
                    0.0
                }
            })
            .sum()
    }

    /// 2x2 texel footprint with bilinear weights, clamped at face edges.
    fn filter_footprint(&self, direction: Vec3) -> (CubeFace, [(usize, usize, f32); 4]) {
        let (face, uv) = face_uv(direction);
        let fx = (uv.x * self.resolution as f32 - 0.5).max(0.0);
        let fy = (uv.y * self.resolution as f32 - 0.5).max(0.0);
        let x0 = fx as usize;
        let y0 = fy as usize;
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;
        let weights = [
            (x0, y0, (1.0 - tx) * (1.0 - ty)),
            (x0 + 1, y0, tx * (1.0 - ty)),
            (x0, y0 + 1, (1.0 - tx) * ty),
            (x0 + 1, y0 + 1, tx * ty),
        ];
        (face, weights)
    }
}

/// Single unfiltered depth comparison with a fixed bias: 1.0 when the
/// fragment is closer than the stored occluder, 0.0 otherwise.
pub fn hard_shadow(map: &DepthCubeMap, direction: Vec3, bias: f32, reference: f32) -> f32 {
    let stored = map.sample_nearest(direction);
    if reference - bias < stored {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_zero_at_near_and_one_at_far() {
        for frustum in [ShadowFrustum::new(5.0, 100.0), ShadowFrustum::new(1.0, 500.0)] {
            assert!(cube_depth(frustum.near, frustum).abs() < 1e-5);
            assert!((cube_depth(frustum.far, frustum) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn depth_is_monotonic_between_planes() {
        let frustum = ShadowFrustum::new(1.0, 500.0);
        let mut last = f32::NEG_INFINITY;
        for i in 1..100 {
            let dist = 1.0 + (i as f32 / 100.0) * 499.0;
            let depth = cube_depth(dist, frustum);
            assert!(depth > last);
            last = depth;
        }
    }

    #[test]
    fn face_selection_follows_dominant_axis() {
        assert_eq!(face_uv(Vec3::new(3.0, 1.0, -1.0)).0, CubeFace::PositiveX);
        assert_eq!(face_uv(Vec3::new(0.0, -2.0, 1.0)).0, CubeFace::NegativeY);
        assert_eq!(face_uv(Vec3::new(0.5, 0.5, -2.0)).0, CubeFace::NegativeZ);
    }

    #[test]
    fn axis_directions_hit_face_centers() {
        for face in CubeFace::ALL {
            let (selected, uv) = face_uv(face.direction());
            assert_eq!(selected, face);
            assert!((uv - Vec2::splat(0.5)).length() < 1e-6);
        }
    }

    #[test]
    fn hard_shadow_is_binary() {
        let mut map = DepthCubeMap::new(8);
        map.fill_face(CubeFace::PositiveZ, 0.4);
        let dir = Vec3::Z;
        assert_eq!(hard_shadow(&map, dir, HARD_SHADOW_BIAS, 0.3), 1.0);
        assert_eq!(hard_shadow(&map, dir, HARD_SHADOW_BIAS, 0.5), 0.0);
        // Other faces stay clear.
        assert_eq!(hard_shadow(&map, Vec3::X, HARD_SHADOW_BIAS, 0.5), 1.0);
    }

    #[test]
    fn pcf_blends_across_an_occluder_edge() {
        let mut map = DepthCubeMap::new(8);
        // Left half of +Z face occluded at depth 0.2.
        for y in 0..8 {
            for x in 0..4 {
                map.write(CubeFace::PositiveZ, x, y, 0.2);
            }
        }
        let reference = 0.5;
        let occluded = map.compare(Vec3::new(-0.6, 0.0, 1.0), reference);
        let lit = map.compare(Vec3::new(0.6, 0.0, 1.0), reference);
        assert_eq!(occluded, 0.0);
        assert_eq!(lit, 1.0);
        // On the boundary the fraction is partial.
        let edge = map.compare(Vec3::new(0.0, 0.0, 1.0), reference);
        assert!(edge > 0.0 && edge < 1.0);
    }

    #[test]
    fn comparison_and_hard_modes_agree_away_from_edges() {
        let mut map = DepthCubeMap::new(16);
        map.fill_face(CubeFace::NegativeX, 0.25);
        for reference in [0.1, 0.2, 0.3, 0.9] {
            let hard = hard_shadow(&map, Vec3::NEG_X, HARD_SHADOW_BIAS, reference);
            let soft = map.compare(Vec3::NEG_X, reference - HARD_SHADOW_BIAS);
            assert_eq!(hard, soft);
        }
    }

    #[test]
    fn sampler_filter_cycles_through_all_modes() {
        let mut mode = SamplerFilter::Nearest;
        let mut seen = vec![mode];
        for _ in 0..3 {
            mode = mode.cycle();
            seen.push(mode);
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(mode.cycle(), SamplerFilter::Nearest);
    }

    #[test]
    fn sampler_filter_parses_cli_names() {
        assert_eq!("nearest".parse(), Ok(SamplerFilter::Nearest));
        assert_eq!("PCF".parse(), Ok(SamplerFilter::ComparisonPcf));
        assert!("blurry".parse::<SamplerFilter>().is_err());
    }

    #[test]
    fn linear_sample_interpolates_depths() {
        let mut map = DepthCubeMap::new(2);
        map.write(CubeFace::PositiveZ, 0, 0, 0.0);
        map.write(CubeFace::PositiveZ, 1, 0, 1.0);
        map.write(CubeFace::PositiveZ, 0, 1, 0.0);
        map.write(CubeFace::PositiveZ, 1, 1, 1.0);
        let center = map.sample_linear(Vec3::Z);
        assert!((center - 0.5).abs() < 1e-6);
    }
}
