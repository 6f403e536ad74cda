//! wgpu renderer: a depth-only shadow pass into a cube map followed by a
//! forward pass running the reference shading model.

mod native;
mod shader;

pub use native::{CameraParams, Renderer};
