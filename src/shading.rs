//! Reference implementation of the two pipeline stages.
//!
//! Each function is pure and per-invocation: the host (the rasterizer on
//! the GPU, or a test here) calls [`vertex_stage`] once per vertex,
//! interpolates the outputs across a triangle and calls
//! [`fragment_stage`] once per covered pixel.  The WGSL shaders in the
//! renderer mirror this math exactly.
//!
//! Numeric degeneracies (zero-length light vector, zero attenuation
//! denominator, `dist = 0` in the depth remap) are intentionally not
//! guarded; they produce `inf`/`NaN` that propagate as visually wrong
//! but non-crashing output.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::light::{LightSource, ShadowFrustum};
use crate::shadow::{cube_depth, hard_shadow, DepthCubeMap, SamplerFilter, HARD_SHADOW_BIAS};
use crate::texture::Texture;

/// Half-strength diffuse term, a tunable constant rather than anything
/// physically derived.
pub const DIFFUSE_SCALE: f32 = 0.5;
/// Fixed specular contribution scalar.
pub const SPECULAR_SCALE: f32 = 0.1;
/// Shininess exponent; 1 means no sharp specular falloff.
pub const SHININESS: f32 = 1.0;
/// Flat ambient term added after shadowing.
pub const AMBIENT: f32 = 0.03;

/// Per-vertex inputs supplied by the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexAttributes {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// Matrices bound for a draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageMatrices {
    pub model_view_projection: Mat4,
    pub normal: Mat3,
    pub model_view: Mat4,
}

impl StageMatrices {
    pub fn new(model: Mat4, view: Mat4, projection: Mat4) -> Self {
        let model_view = view * model;
        Self {
            model_view_projection: projection * model_view,
            normal: Mat3::from_mat4(model_view).inverse().transpose(),
            model_view,
        }
    }
}

/// Interpolants handed from the vertex stage to the fragment stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexOutputs {
    pub clip_position: Vec4,
    pub uv: Vec2,
    /// View-space normal, normalized per vertex.
    pub normal: Vec3,
    /// View-space vertex position.
    pub vertex_view: Vec3,
    /// Shadow-map-space coordinate, pre-division.
    pub shadow_coord: Vec4,
}

impl VertexOutputs {
    /// Linear blend of two outputs, mirroring hardware interpolation
    /// across a triangle edge.
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            clip_position: self.clip_position.lerp(other.clip_position, t),
            uv: self.uv.lerp(other.uv, t),
            normal: self.normal.lerp(other.normal, t),
            vertex_view: self.vertex_view.lerp(other.vertex_view, t),
            shadow_coord: self.shadow_coord.lerp(other.shadow_coord, t),
        }
    }
}

/// Vertex stage: transforms the vertex into clip and view space and
/// projects it into the light's shadow-map frame.
///
/// The shadow coordinate is derived from the *view-space* position; using
/// the raw object-space vertex misaligns the shadow lookup.
pub fn vertex_stage(
    vertex: &VertexAttributes,
    matrices: &StageMatrices,
    light: &LightSource,
) -> VertexOutputs {
    let clip_position = matrices.model_view_projection * vertex.position.extend(1.0);
    let normal = (matrices.normal * vertex.normal).normalize();
    let vertex_view = (matrices.model_view * vertex.position.extend(1.0)).truncate();
    let shadow_coord = light.shadow_view * vertex_view.extend(1.0);
    VertexOutputs {
        clip_position,
        uv: vertex.uv,
        normal,
        vertex_view,
        shadow_coord,
    }
}

/// Read-only resources a fragment invocation consumes.
#[derive(Debug, Clone, Copy)]
pub struct ShadingContext<'a> {
    pub light: &'a LightSource,
    pub base_texture: &'a Texture,
    pub shadow_map: &'a DepthCubeMap,
    pub frustum: ShadowFrustum,
    pub filter: SamplerFilter,
}

/// Unnormalized vector from the shaded point toward the light.  The
/// homogeneous weight scales the view-space position so `w = 0` yields a
/// pure direction and `w = 1` a point-light vector.
pub fn light_vector(light: &LightSource, vertex_view: Vec3) -> Vec3 {
    light.position.truncate() - vertex_view * light.position.w
}

/// Inverse quadratic distance falloff.
pub fn attenuation(coefficients: Vec3, len: f32) -> f32 {
    1.0 / coefficients.dot(Vec3::new(1.0, len, len * len))
}

/// Raw occlusion fraction in [0, 1]: 1 means fully unoccluded.
pub fn shadow_factor(
    shadow_coord: Vec4,
    map: &DepthCubeMap,
    frustum: ShadowFrustum,
    filter: SamplerFilter,
) -> f32 {
    let coords = shadow_coord.truncate() / shadow_coord.w;
    let dist = coords.x.abs().max(coords.y.abs()).max(coords.z.abs());
    let depth = cube_depth(dist, frustum);
    match filter {
        SamplerFilter::Nearest => hard_shadow(map, coords, HARD_SHADOW_BIAS, depth),
        SamplerFilter::Linear => {
            if depth - HARD_SHADOW_BIAS < map.sample_linear(coords) {
                1.0
            } else {
                0.0
            }
        }
        SamplerFilter::ComparisonPcf | SamplerFilter::EngineDefault => map.compare(coords, depth),
    }
}

/// Remaps the raw shadow fraction so fully shadowed surfaces keep half
/// their brightness instead of going black.
pub fn brighten_shadow(shadow: f32) -> f32 {
    0.5 + shadow * 0.5
}

fn reflect(incident: Vec3, normal: Vec3) -> Vec3 {
    incident - 2.0 * normal.dot(incident) * normal
}

/// Fragment stage: base texture, Lambert/Phong lighting with distance
/// attenuation, cube shadow lookup, brightened shadow blend.
pub fn fragment_stage(input: &VertexOutputs, ctx: &ShadingContext<'_>) -> Vec4 {
    let light = ctx.light;
    let tex = ctx.base_texture.sample(input.uv);
    let diffuse_color = tex.truncate();

    let diff = light_vector(light, input.vertex_view);
    let l = diff.normalize();
    let e = (-input.vertex_view).normalize();
    let r = (-reflect(l, input.normal)).normalize();

    let diffuse_power = input.normal.dot(l).max(0.0) * DIFFUSE_SCALE;
    let specular_power = (diffuse_color.x * r.dot(e).max(0.0)).powf(SHININESS);

    let len = diff.length();
    let falloff = attenuation(light.attenuation, len);

    let light_color = light.color.truncate();
    let mut color = diffuse_color * light_color * diffuse_power * falloff;
    color += light_color * specular_power * SPECULAR_SCALE * falloff;

    let shadow = brighten_shadow(shadow_factor(
        input.shadow_coord,
        ctx.shadow_map,
        ctx.frustum,
        ctx.filter,
    ));

    (Vec3::splat(AMBIENT) + color * shadow).extend(tex.w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{shadow_view_matrix, CubeFace};

    fn white_texture() -> Texture {
        Texture::from_texels(1, 1, vec![Vec4::ONE]).unwrap()
    }

    fn context<'a>(
        light: &'a LightSource,
        texture: &'a Texture,
        map: &'a DepthCubeMap,
        filter: SamplerFilter,
    ) -> ShadingContext<'a> {
        ShadingContext {
            light,
            base_texture: texture,
            shadow_map: map,
            frustum: ShadowFrustum::default(),
            filter,
        }
    }

    #[test]
    fn directional_light_overhead_gives_half_diffuse() {
        // Light straight above an upward-facing surface, w = 0 encoding.
        let light = LightSource::directional(Vec3::NEG_Y, Vec3::ONE);
        let normal = Vec3::Y;
        let vertex_view = Vec3::new(0.0, -3.0, 0.0);

        let diff = light_vector(&light, vertex_view);
        // w = 0: the vector ignores the vertex position entirely.
        assert_eq!(diff, Vec3::Y);
        let diffuse = normal.dot(diff.normalize()).max(0.0) * DIFFUSE_SCALE;
        assert!((diffuse - 0.5).abs() < 1e-6);

        // len is |position.xyz| = 1 for the unit encoding, so constant
        // coefficients still yield attenuation 1.
        assert!((attenuation(light.attenuation, diff.length()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn constant_attenuation_ignores_distance() {
        let coefficients = Vec3::new(1.0, 0.0, 0.0);
        for d in [0.5, 1.0, 10.0, 250.0] {
            assert!((attenuation(coefficients, d) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn quadratic_attenuation_is_inverse_square() {
        let coefficients = Vec3::new(0.0, 0.0, 1.0);
        for d in [1.0, 2.0, 7.5] {
            assert!((attenuation(coefficients, d) - 1.0 / (d * d)).abs() < 1e-6);
        }
    }

    #[test]
    fn shadow_remap_keeps_half_brightness() {
        assert_eq!(brighten_shadow(1.0), 1.0);
        assert_eq!(brighten_shadow(0.0), 0.5);
        let mut last = 0.0;
        for i in 0..=10 {
            let remapped = brighten_shadow(i as f32 / 10.0);
            assert!(remapped >= 0.5);
            assert!(remapped >= last);
            last = remapped;
        }
    }

    #[test]
    fn shadow_coord_derives_from_view_space_position() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, -8.0, 3.0), Vec3::ZERO, Vec3::Z);
        let model = Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0));
        let light_world = Vec3::new(0.0, 0.0, 5.0);
        let light = LightSource {
            shadow_view: shadow_view_matrix(light_world, view),
            ..LightSource::default()
        };
        let matrices = StageMatrices::new(
            model,
            view,
            Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0),
        );
        let vertex = VertexAttributes {
            position: Vec3::new(0.5, 0.5, 0.0),
            normal: Vec3::Z,
            uv: Vec2::ZERO,
        };

        let outputs = vertex_stage(&vertex, &matrices, &light);
        let expected = light.shadow_view * outputs.vertex_view.extend(1.0);
        assert!((outputs.shadow_coord - expected).length() < 1e-5);

        // The lookup direction is the world-space offset from the light.
        let world = model * vertex.position.extend(1.0);
        let direction = outputs.shadow_coord.truncate() / outputs.shadow_coord.w;
        assert!((direction - (world.truncate() - light_world)).length() < 1e-4);
    }

    #[test]
    fn fully_lit_point_keeps_full_color() {
        let light = LightSource {
            position: Vec4::new(0.0, 0.0, 0.0, 1.0),
            attenuation: Vec3::new(1.0, 0.0, 0.0),
            ..LightSource::default()
        };
        let texture = white_texture();
        let map = DepthCubeMap::new(8);
        let ctx = context(&light, &texture, &map, SamplerFilter::ComparisonPcf);

        let input = VertexOutputs {
            clip_position: Vec4::ZERO,
            uv: Vec2::ZERO,
            normal: Vec3::Z,
            vertex_view: Vec3::new(0.0, 0.0, -4.0),
            shadow_coord: Vec4::new(0.0, 0.0, 100.0, 1.0),
        };
        let color = fragment_stage(&input, &ctx);

        // Shadow factor 1: color is ambient plus the full lit term.
        let l = Vec3::Z;
        let e = Vec3::Z;
        let r = -reflect(l, Vec3::Z);
        let diffuse = Vec3::Z.dot(l).max(0.0) * DIFFUSE_SCALE;
        let specular = (1.0 * r.dot(e).max(0.0)).powf(SHININESS);
        let expected = AMBIENT + diffuse + specular * SPECULAR_SCALE;
        assert!((color.x - expected).abs() < 1e-5);
        assert_eq!(color.w, 1.0);
    }

    #[test]
    fn fully_occluded_point_keeps_half_of_lit_color() {
        let light = LightSource {
            position: Vec4::new(0.0, 0.0, 0.0, 1.0),
            attenuation: Vec3::new(1.0, 0.0, 0.0),
            ..LightSource::default()
        };
        let texture = white_texture();
        let mut occluded_map = DepthCubeMap::new(8);
        occluded_map.fill_face(CubeFace::PositiveZ, 0.0);
        let lit_map = DepthCubeMap::new(8);

        let input = VertexOutputs {
            clip_position: Vec4::ZERO,
            uv: Vec2::ZERO,
            normal: Vec3::Z,
            vertex_view: Vec3::new(0.0, 0.0, -4.0),
            shadow_coord: Vec4::new(0.0, 0.0, 100.0, 1.0),
        };

        let lit = fragment_stage(
            &input,
            &context(&light, &texture, &lit_map, SamplerFilter::ComparisonPcf),
        );
        let occluded = fragment_stage(
            &input,
            &context(&light, &texture, &occluded_map, SamplerFilter::ComparisonPcf),
        );

        let lit_term = lit.x - AMBIENT;
        let occluded_term = occluded.x - AMBIENT;
        assert!((occluded_term - lit_term * 0.5).abs() < 1e-5);
    }

    #[test]
    fn hard_and_pcf_agree_away_from_shadow_edges() {
        let light = LightSource {
            position: Vec4::new(0.0, 0.0, 0.0, 1.0),
            attenuation: Vec3::new(1.0, 0.0, 0.0),
            ..LightSource::default()
        };
        let texture = white_texture();
        let mut map = DepthCubeMap::new(16);
        // Occluder covering the -X half of the +Z face.
        for y in 0..16 {
            for x in 0..8 {
                map.write(CubeFace::PositiveZ, x, y, 0.1);
            }
        }

        let deep_shadow = VertexOutputs {
            clip_position: Vec4::ZERO,
            uv: Vec2::ZERO,
            normal: Vec3::Z,
            vertex_view: Vec3::new(0.0, 0.0, -4.0),
            shadow_coord: Vec4::new(-60.0, 0.0, 100.0, 1.0),
        };
        let deep_light = VertexOutputs {
            shadow_coord: Vec4::new(60.0, 0.0, 100.0, 1.0),
            ..deep_shadow
        };

        for input in [&deep_shadow, &deep_light] {
            let hard = fragment_stage(input, &context(&light, &texture, &map, SamplerFilter::Nearest));
            let soft = fragment_stage(
                input,
                &context(&light, &texture, &map, SamplerFilter::ComparisonPcf),
            );
            assert!((hard.x - soft.x).abs() < 1e-5);
        }

        // At the boundary the filtered result lies between the extremes.
        let edge = deep_shadow.lerp(&deep_light, 0.5);
        let soft_edge = fragment_stage(
            &edge,
            &context(&light, &texture, &map, SamplerFilter::ComparisonPcf),
        );
        let shadowed = fragment_stage(
            &deep_shadow,
            &context(&light, &texture, &map, SamplerFilter::ComparisonPcf),
        );
        let lit = fragment_stage(
            &deep_light,
            &context(&light, &texture, &map, SamplerFilter::ComparisonPcf),
        );
        assert!(soft_edge.x >= shadowed.x && soft_edge.x <= lit.x);
    }

    #[test]
    fn degenerate_zero_distance_lookup_does_not_panic() {
        let light = LightSource::default();
        let texture = white_texture();
        let map = DepthCubeMap::new(4);
        let ctx = context(&light, &texture, &map, SamplerFilter::Nearest);
        let input = VertexOutputs {
            clip_position: Vec4::ZERO,
            uv: Vec2::ZERO,
            normal: Vec3::Z,
            vertex_view: Vec3::ZERO,
            // Point exactly at the light: dist = 0 in the depth remap.
            shadow_coord: Vec4::new(0.0, 0.0, 0.0, 1.0),
        };
        // Inherited floating point behavior, not a crash.
        let _ = fragment_stage(&input, &ctx);
    }
}
