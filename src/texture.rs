use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec4};

/// CPU side RGBA texture used by the reference shading core and uploaded
/// verbatim to the GPU.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    width: u32,
    height: u32,
    texels: Vec<Vec4>,
}

impl Texture {
    /// Wraps raw RGBA texels.
    pub fn from_texels(width: u32, height: u32, texels: Vec<Vec4>) -> Result<Self> {
        if texels.len() != (width * height) as usize {
            return Err(anyhow!(
                "texel count {} does not match {width}x{height}",
                texels.len()
            ));
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Loads a PNG texture from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("unable to load texture {}", path.display()))?
            .into_rgba8();
        let (width, height) = image.dimensions();
        let texels = image
            .pixels()
            .map(|pixel| {
                Vec4::new(
                    pixel[0] as f32 / 255.0,
                    pixel[1] as f32 / 255.0,
                    pixel[2] as f32 / 255.0,
                    pixel[3] as f32 / 255.0,
                )
            })
            .collect();
        Self::from_texels(width, height, texels)
    }

    /// Procedural checkerboard used when a scene object declares no texture.
    pub fn checkerboard(size: u32, cells: u32, light: Vec4, dark: Vec4) -> Self {
        let cell = (size / cells.max(1)).max(1);
        let texels = (0..size * size)
            .map(|i| {
                let x = i % size;
                let y = i / size;
                if ((x / cell) + (y / cell)) % 2 == 0 {
                    light
                } else {
                    dark
                }
            })
            .collect();
        Self {
            width: size,
            height: size,
            texels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Nearest-neighbour sample with repeat wrapping.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let u = uv.x.rem_euclid(1.0);
        let v = uv.y.rem_euclid(1.0);
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);
        self.texels[(y * self.width + x) as usize]
    }

    /// Converts texels to tightly packed RGBA8 for GPU upload.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.texels
            .iter()
            .flat_map(|texel| {
                [
                    (texel.x.clamp(0.0, 1.0) * 255.0) as u8,
                    (texel.y.clamp(0.0, 1.0) * 255.0) as u8,
                    (texel.z.clamp(0.0, 1.0) * 255.0) as u8,
                    (texel.w.clamp(0.0, 1.0) * 255.0) as u8,
                ]
            })
            .collect()
    }
}

impl Default for Texture {
    fn default() -> Self {
        Self::checkerboard(
            64,
            8,
            Vec4::new(0.9, 0.9, 0.9, 1.0),
            Vec4::new(0.35, 0.35, 0.35, 1.0),
        )
    }
}
