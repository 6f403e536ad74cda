use glam::{Mat4, Vec2, Vec3};

use crate::light::{CubeFace, LightSource, ShadowFrustum};
use crate::render::CameraParams;
use crate::scene::{PointLightDesc, Scene, SceneObject};
use crate::shading::{
    self, brighten_shadow, fragment_stage, vertex_stage, ShadingContext, StageMatrices,
    VertexAttributes,
};
use crate::shadow::{DepthCubeMap, SamplerFilter};
use crate::texture::Texture;

/// Builds camera parameters from the scene's camera object, falling back
/// to a fixed vantage point when none exists.
pub fn camera_from_objects(objects: &[SceneObject], aspect: f32) -> CameraParams {
    let default_position = Vec3::new(0.0, 2.0, 6.0);
    let default_target = Vec3::ZERO;
    let (position, rotation, fov) = objects
        .iter()
        .find(|o| o.object_type == "camera")
        .map(|camera| (camera.position, camera.rotation, camera.fov))
        .unwrap_or((default_position, Vec3::ZERO, 60.0));

    let rotation_matrix = Mat4::from_rotation_z(rotation.z.to_radians())
        * Mat4::from_rotation_y(rotation.y.to_radians())
        * Mat4::from_rotation_x(rotation.x.to_radians());
    let forward = (rotation_matrix * Vec3::new(0.0, 0.0, -1.0).extend(0.0)).truncate();
    let up = (rotation_matrix * Vec3::Y.extend(0.0)).truncate();
    let target = if forward.length_squared() > f32::EPSILON {
        position + forward.normalize()
    } else {
        default_target
    };
    let view = Mat4::look_at_rh(position, target, up);
    let projection = Mat4::perspective_rh(fov.to_radians(), aspect.max(0.01), 0.1, 1000.0);
    CameraParams {
        view,
        projection,
        position,
    }
}

/// Picks the scene's shadow casting light, or a default overhead lamp.
pub fn active_light(scene: &Scene) -> PointLightDesc {
    scene.lights.first().copied().unwrap_or(PointLightDesc {
        position: Vec3::new(0.0, 0.0, 5.0),
        color: Vec3::ONE,
        intensity: 1.0,
        attenuation: Vec3::new(1.0, 0.0, 0.0),
        frustum: ShadowFrustum::default(),
        resolution: 2048,
    })
}

/// Evaluates the reference shading core at a fixed receiver point, once
/// against a clear shadow map and once against a fully occluded one, and
/// prints the resulting diagnostic values.  This is the headless path's
/// way of exercising the full vertex/fragment pipeline without a GPU.
pub fn print_probe_report(scene: &Scene, filter: SamplerFilter, frustum: ShadowFrustum) {
    let camera = camera_from_objects(&scene.objects, 1.0);
    let light_desc = active_light(scene);
    let light = LightSource::from_desc(&light_desc, camera.view);
    let texture = Texture::default();

    let matrices = StageMatrices::new(Mat4::IDENTITY, camera.view, camera.projection);
    let receiver = VertexAttributes {
        position: Vec3::ZERO,
        normal: Vec3::Y,
        uv: Vec2::new(0.25, 0.25),
    };
    let outputs = vertex_stage(&receiver, &matrices, &light);

    let clear_map = DepthCubeMap::new(16);
    let mut occluded_map = DepthCubeMap::new(16);
    for face in CubeFace::ALL {
        occluded_map.fill_face(face, 0.0);
    }

    println!(
        "Shadow probes (sampler={}, near={:.1}, far={:.1}):",
        filter.label(),
        frustum.near,
        frustum.far
    );
    for (label, map) in [("lit", &clear_map), ("occluded", &occluded_map)] {
        let ctx = ShadingContext {
            light: &light,
            base_texture: &texture,
            shadow_map: map,
            frustum,
            filter,
        };
        let shadow = brighten_shadow(shading::shadow_factor(
            outputs.shadow_coord,
            map,
            frustum,
            filter,
        ));
        let color = fragment_stage(&outputs, &ctx);
        println!(
            " - {label:<8} shadow={shadow:.2} color=({:.2}, {:.2}, {:.2})",
            color.x, color.y, color.z
        );
    }
}
