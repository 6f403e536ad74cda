//! Point-light shadow mapping demo, rebuilt around a testable core.
//!
//! The crate exposes the shading math as plain functions over `glam`
//! types so that the lighting and cube shadow lookup can be exercised
//! headless.  The wgpu renderer runs the same math on the GPU; platform
//! integration stays in the binary so the library remains easy to embed
//! in tooling and tests.

pub mod app;
pub mod controls;
pub mod light;
pub mod obj;
pub mod render;
pub mod scene;
pub mod shading;
pub mod shadow;
pub mod texture;

pub use controls::OperatorControls;
pub use light::{kelvin_to_rgb, CubeFace, LightSource, ShadowFrustum};
pub use obj::{load_obj_from_str, ObjMesh};
pub use render::{CameraParams, Renderer};
pub use scene::{PointLightDesc, Scene, SceneObject};
pub use shading::{
    fragment_stage, vertex_stage, ShadingContext, StageMatrices, VertexAttributes, VertexOutputs,
};
pub use shadow::{cube_depth, hard_shadow, DepthCubeMap, SamplerFilter, UnknownSamplerFilter};
pub use texture::Texture;
