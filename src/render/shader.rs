//! WGSL programs for the shadow and main passes.
//!
//! The main shader mirrors `crate::shading`: hard and soft shadow
//! lookups are separate fragment entry points so the quality mode is a
//! pipeline choice, not a runtime branch.

pub(crate) const SHADER: &str = r#"
struct Globals {
    light_color: vec4<f32>,
    // View-space light position; w = 0 marks a directional light.
    light_position: vec4<f32>,
    // Constant, linear, quadratic attenuation coefficients in xyz.
    light_attenuation: vec4<f32>,
    camera_position: vec4<f32>,
    // Transforms view-space coordinates to shadow-map coordinates.
    shadow_view: mat4x4<f32>,
    // near, far, hard-comparison bias.
    shadow_params: vec4<f32>,
}

struct ObjectConstants {
    mvp: mat4x4<f32>,
    model_view: mat4x4<f32>,
    normal: mat3x4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;
@group(0) @binding(1)
var shadow_map: texture_depth_cube;
@group(0) @binding(2)
var shadow_sampler: sampler;
@group(0) @binding(3)
var shadow_comparison: sampler_comparison;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

@group(2) @binding(0)
var base_texture: texture_2d<f32>;
@group(2) @binding(1)
var base_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) vertex_view: vec3<f32>,
    @location(3) shadow_coord: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = object.mvp * vec4<f32>(input.position, 1.0);
    out.uv = input.uv;

    let normal_matrix = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    );
    out.normal = normalize(normal_matrix * input.normal);

    let vertex_view = (object.model_view * vec4<f32>(input.position, 1.0)).xyz;
    out.vertex_view = vertex_view;
    // Shadow coordinates come from the view-space position, not the raw
    // object-space vertex.
    out.shadow_coord = globals.shadow_view * vec4<f32>(vertex_view, 1.0);
    return out;
}

fn cube_depth(dist: f32) -> f32 {
    let near = globals.shadow_params.x;
    let far = globals.shadow_params.y;
    let ndc = (near + far) / (far - near) + (-2.0 * far * near) / (dist * (far - near));
    return 0.5 + 0.5 * ndc;
}

fn shade(input: VertexOutput, shadow: f32) -> vec4<f32> {
    let ambient = vec3<f32>(0.03, 0.03, 0.03);
    let tex = textureSample(base_texture, base_sampler, input.uv);
    let diffuse_color = tex.rgb;

    let diff = globals.light_position.xyz - input.vertex_view * globals.light_position.w;
    let l = normalize(diff);
    let e = normalize(-input.vertex_view);
    let r = normalize(-reflect(l, input.normal));

    let diffuse_power = max(dot(input.normal, l), 0.0) * 0.5;
    let shininess = 1.0;
    let specular_power = pow(diffuse_color.r * max(dot(r, e), 0.0), shininess);

    let len = length(diff);
    let attenuation = 1.0 / dot(globals.light_attenuation.xyz, vec3<f32>(1.0, len, len * len));

    var color = diffuse_color * globals.light_color.rgb * diffuse_power * attenuation;
    color += globals.light_color.rgb * specular_power * 0.1 * attenuation;

    // Fully shadowed surfaces keep half their brightness.
    let brightened = 0.5 + shadow * 0.5;
    return vec4<f32>(ambient + color * brightened, tex.a);
}

@fragment
fn fs_hard(input: VertexOutput) -> @location(0) vec4<f32> {
    let coords = input.shadow_coord.xyz / input.shadow_coord.w;
    let dist = max(abs(coords.x), max(abs(coords.y), abs(coords.z)));
    let depth = cube_depth(dist);
    let stored = textureSample(shadow_map, shadow_sampler, coords);
    let shadow = select(0.0, 1.0, depth - globals.shadow_params.z < stored);
    return shade(input, shadow);
}

@fragment
fn fs_soft(input: VertexOutput) -> @location(0) vec4<f32> {
    let coords = input.shadow_coord.xyz / input.shadow_coord.w;
    let dist = max(abs(coords.x), max(abs(coords.y), abs(coords.z)));
    let depth = cube_depth(dist);
    let shadow = textureSampleCompare(shadow_map, shadow_comparison, coords, depth);
    return shade(input, shadow);
}
"#;

pub(crate) const SHADOW_PASS_SHADER: &str = r#"
struct FaceConstants {
    mvp: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> face: FaceConstants;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return face.mvp * vec4<f32>(position, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_base_color_comes_from_texture_alone() {
        // The reference core samples the base texture with no per-object
        // tint; the WGSL must not add one.
        assert!(SHADER.contains("textureSample(base_texture, base_sampler, input.uv);"));
        assert!(!SHADER.contains("object.color"));
    }

    #[test]
    fn fragment_constants_match_the_reference_core() {
        for needle in [
            "* 0.5",
            "* 0.1",
            "vec3<f32>(0.03, 0.03, 0.03)",
            "0.5 + shadow * 0.5",
        ] {
            assert!(SHADER.contains(needle), "{needle}");
        }
    }
}
