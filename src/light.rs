use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::scene::PointLightDesc;

/// Near/far planes of a point light's shadow frustum, applied identically
/// to all six cube faces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowFrustum {
    pub near: f32,
    pub far: f32,
}

impl ShadowFrustum {
    pub fn new(near: f32, far: f32) -> Self {
        Self { near, far }
    }
}

impl Default for ShadowFrustum {
    fn default() -> Self {
        Self {
            near: 1.0,
            far: 500.0,
        }
    }
}

/// Parameter block for the single active light, mirroring what the
/// renderer binds per draw call.  Positions are in view space; `w = 0`
/// marks a directional light and `w != 0` a positional one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSource {
    pub color: Vec4,
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub position: Vec4,
    pub spot_direction: Vec3,
    pub spot_exponent: f32,
    pub spot_cutoff: f32,
    pub spot_cos_cutoff: f32,
    pub attenuation: Vec3,
    /// Transforms view-space coordinates into shadow-map coordinates.
    pub shadow_view: Mat4,
}

impl Default for LightSource {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            ambient: Vec4::ZERO,
            diffuse: Vec4::ONE,
            specular: Vec4::ONE,
            position: Vec4::new(0.0, 0.0, 0.0, 1.0),
            spot_direction: Vec3::NEG_Z,
            spot_exponent: 0.0,
            spot_cutoff: 180.0,
            spot_cos_cutoff: -1.0,
            attenuation: Vec3::new(0.0, 0.0, 1.0),
            shadow_view: Mat4::IDENTITY,
        }
    }
}

impl LightSource {
    /// Builds the view-space light block for a scene light, given the
    /// camera view matrix used for the frame.
    pub fn from_desc(desc: &PointLightDesc, view: Mat4) -> Self {
        let view_position = view * desc.position.extend(1.0);
        Self {
            color: (desc.color * desc.intensity).extend(1.0),
            diffuse: desc.color.extend(1.0),
            position: Vec4::new(view_position.x, view_position.y, view_position.z, 1.0),
            attenuation: desc.attenuation,
            shadow_view: shadow_view_matrix(desc.position, view),
            ..Self::default()
        }
    }

    /// A directional light encodes `-direction` in `position.xyz` with
    /// `w = 0`, so no distance falloff applies.
    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Self {
            color: color.extend(1.0),
            diffuse: color.extend(1.0),
            position: (-direction).extend(0.0),
            attenuation: Vec3::new(1.0, 0.0, 0.0),
            ..Self::default()
        }
    }
}

/// Matrix taking view-space coordinates to shadow-map coordinates: back to
/// world space, then relative to the light so the result can be used as a
/// cube lookup direction.
pub fn shadow_view_matrix(light_world: Vec3, view: Mat4) -> Mat4 {
    Mat4::from_translation(-light_world) * view.inverse()
}

/// Face directions for cube shadow map rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Direction vector the face looks along.
    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector used when rendering into the face.
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }

    /// View-projection matrix for the depth-only pass into this face: a
    /// square 90 degree frustum with the configured near/far planes.
    pub fn view_proj(self, light_position: Vec3, frustum: ShadowFrustum) -> Mat4 {
        let projection = Mat4::perspective_rh(FRAC_PI_2, 1.0, frustum.near, frustum.far);
        let view = Mat4::look_at_rh(
            light_position,
            light_position + self.direction(),
            self.up(),
        );
        projection * view
    }
}

/// Approximates the RGB color of a black body at the given temperature in
/// Kelvin, normalized to [0, 1] per channel.
pub fn kelvin_to_rgb(kelvin: f32) -> Vec3 {
    let t = (kelvin.clamp(1000.0, 40_000.0)) / 100.0;

    let red = if t <= 66.0 {
        255.0
    } else {
        329.698_727_446 * (t - 60.0).powf(-0.133_204_759_2)
    };
    let green = if t <= 66.0 {
        99.470_802_586_1 * t.ln() - 161.119_568_166_1
    } else {
        288.122_169_528_3 * (t - 60.0).powf(-0.075_514_849_2)
    };
    let blue = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_731_223_1 * (t - 10.0).ln() - 305.044_792_730_7
    };

    Vec3::new(
        red.clamp(0.0, 255.0) / 255.0,
        green.clamp(0.0, 255.0) / 255.0,
        blue.clamp(0.0, 255.0) / 255.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn shadow_view_yields_light_relative_coordinates() {
        let light = Vec3::new(0.0, 0.0, 5.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, -10.0, 2.0), Vec3::ZERO, Vec3::Z);
        let world_point = Vec3::new(1.0, 2.0, 3.0);
        let view_point = view * world_point.extend(1.0);

        let shadow = shadow_view_matrix(light, view) * view_point;
        let expected = world_point - light;
        assert!((shadow.truncate() / shadow.w - expected).length() < 1e-4);
    }

    #[test]
    fn face_directions_are_orthogonal_to_up() {
        for face in CubeFace::ALL {
            assert!(face.direction().dot(face.up()).abs() < 1e-6);
            assert!((face.direction().length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn face_view_proj_centers_points_on_axis() {
        let frustum = ShadowFrustum::new(1.0, 500.0);
        let light = Vec3::new(2.0, 3.0, 4.0);
        for face in CubeFace::ALL {
            // A point straight down the face axis projects to the center.
            let point = light + face.direction() * 10.0;
            let clip = face.view_proj(light, frustum) * point.extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4, "{face:?}");
        }
    }

    #[test]
    fn warm_temperatures_skew_red() {
        let warm = kelvin_to_rgb(3600.0);
        assert!(warm.x > warm.z);
        assert!((warm.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn daylight_is_near_white() {
        let daylight = kelvin_to_rgb(6600.0);
        assert!(daylight.min_element() > 0.9);
    }

    #[test]
    fn directional_light_has_zero_w() {
        let light = LightSource::directional(Vec3::NEG_Z, Vec3::ONE);
        assert_eq!(light.position.w, 0.0);
        assert_eq!(light.position.truncate(), Vec3::Z);
    }
}
