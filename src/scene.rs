use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::light::{kelvin_to_rgb, ShadowFrustum};

/// Runtime representation of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub lights: Vec<PointLightDesc>,
    /// Directory the scene file was loaded from; mesh and texture paths
    /// are resolved relative to it.
    #[serde(default)]
    pub root: PathBuf,
}

impl Scene {
    /// Loads a scene file from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .with_context(|| format!("unable to read scene file {}", path.display()))?;
        let mut scene = Self::from_xml(&xml)?;
        scene.root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Ok(scene)
    }

    /// Parses the scene XML produced by the authoring tools.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let mut objects = Vec::new();

        for node in document.descendants().filter(|n| n.has_tag_name("object")) {
            let mut object = SceneObject::default();
            object.name = required_text(&node, "name")?;
            object.object_type = optional_text(&node, "type").unwrap_or_else(|| "mesh".to_string());
            object.mesh = optional_text(&node, "mesh");
            object.texture = optional_text(&node, "texture");
            object.color = parse_color(optional_text(&node, "color"), object.color)?;
            object.position = parse_vec3(optional_text(&node, "position"), object.position)?;
            object.rotation = parse_vec3(optional_text(&node, "rotation"), object.rotation)?;
            object.scale = parse_vec3(optional_text(&node, "scale"), object.scale)?;
            object.fov = parse_f32(optional_text(&node, "fov"), object.fov)?;
            object.intensity = parse_f32(optional_text(&node, "intensity"), object.intensity)?;
            object.color_temperature =
                parse_optional_f32(optional_text(&node, "color-temperature"))?;
            object.attenuation =
                parse_vec3(optional_text(&node, "attenuation"), object.attenuation)?;
            object.shadow_near = parse_f32(optional_text(&node, "shadow-near"), object.shadow_near)?;
            object.shadow_far = parse_f32(optional_text(&node, "shadow-far"), object.shadow_far)?;
            object.shadow_resolution = parse_f32(
                optional_text(&node, "shadow-resolution"),
                object.shadow_resolution,
            )?;
            objects.push(object);
        }

        let lights = objects
            .iter()
            .filter(|obj| obj.object_type == "light")
            .map(PointLightDesc::from_object)
            .collect();

        Ok(Self {
            objects,
            lights,
            root: PathBuf::new(),
        })
    }

    /// Resolves an asset path declared in the scene file.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

/// Scene object as described by the authoring tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default = "default_color")]
    pub color: Vec3,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    /// Light color temperature in Kelvin; overrides `color` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temperature: Option<f32>,
    /// Constant, linear and quadratic attenuation coefficients.
    #[serde(default = "default_attenuation")]
    pub attenuation: Vec3,
    #[serde(default = "default_shadow_near")]
    pub shadow_near: f32,
    #[serde(default = "default_shadow_far")]
    pub shadow_far: f32,
    #[serde(default = "default_shadow_resolution")]
    pub shadow_resolution: f32,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            name: String::new(),
            object_type: String::new(),
            mesh: None,
            texture: None,
            color: default_color(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            fov: default_fov(),
            intensity: default_intensity(),
            color_temperature: None,
            attenuation: default_attenuation(),
            shadow_near: default_shadow_near(),
            shadow_far: default_shadow_far(),
            shadow_resolution: default_shadow_resolution(),
        }
    }
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_fov() -> f32 {
    45.0
}

fn default_intensity() -> f32 {
    1.0
}

fn default_attenuation() -> Vec3 {
    // Pure inverse-square falloff.
    Vec3::new(0.0, 0.0, 1.0)
}

fn default_shadow_near() -> f32 {
    1.0
}

fn default_shadow_far() -> f32 {
    500.0
}

fn default_shadow_resolution() -> f32 {
    2048.0
}

/// Shadow casting point light extracted from the scene object list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLightDesc {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub attenuation: Vec3,
    pub frustum: ShadowFrustum,
    pub resolution: u32,
}

impl PointLightDesc {
    fn from_object(object: &SceneObject) -> Self {
        let color = match object.color_temperature {
            Some(kelvin) => kelvin_to_rgb(kelvin),
            None => object.color,
        };
        Self {
            position: object.position,
            color,
            intensity: object.intensity,
            attenuation: object.attenuation,
            frustum: ShadowFrustum::new(object.shadow_near, object.shadow_far),
            resolution: object.shadow_resolution as u32,
        }
    }
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut numbers = value
        .split_whitespace()
        .filter_map(|component| component.parse::<f32>().ok());
    let x = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    let y = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    let z = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    Ok(Vec3::new(x, y, z))
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut numbers = value
        .split_whitespace()
        .filter_map(|component| component.parse::<f32>().ok());
    let r = numbers
        .next()
        .ok_or_else(|| anyhow!("color is missing components"))?;
    let g = numbers
        .next()
        .ok_or_else(|| anyhow!("color is missing components"))?;
    let b = numbers
        .next()
        .ok_or_else(|| anyhow!("color is missing components"))?;
    Ok(Vec3::new(r / 255.0, g / 255.0, b / 255.0))
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_optional_f32(value: Option<String>) -> Result<Option<f32>> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map(Some)
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <scene>
        <object>
            <name>Camera</name>
            <type>camera</type>
            <fov>90</fov>
        </object>
        <object>
            <name>Lamp</name>
            <type>light</type>
            <intensity>2.5</intensity>
            <position>0 0 5</position>
            <color>255 128 0</color>
            <attenuation>1 0 0</attenuation>
            <shadow-near>5</shadow-near>
            <shadow-far>100</shadow-far>
            <shadow-resolution>256</shadow-resolution>
        </object>
        <object>
            <name>Ground</name>
            <mesh>models/ground.obj</mesh>
            <texture>textures/ground.png</texture>
        </object>
    </scene>
    "#;

    #[test]
    fn parse_scene_populates_objects_and_lights() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.objects.len(), 3);
        let camera = scene.objects.iter().find(|o| o.name == "Camera").unwrap();
        assert_eq!(camera.object_type, "camera");
        assert_eq!(camera.fov, 90.0);
        assert_eq!(scene.lights.len(), 1);
        let light = scene.lights[0];
        assert_eq!(light.position, Vec3::new(0.0, 0.0, 5.0));
        assert!((light.intensity - 2.5).abs() < f32::EPSILON);
        assert_eq!(light.color, Vec3::new(1.0, 128.0 / 255.0, 0.0));
        assert_eq!(light.attenuation, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(light.frustum.near, 5.0);
        assert_eq!(light.frustum.far, 100.0);
        assert_eq!(light.resolution, 256);
    }

    #[test]
    fn mesh_objects_carry_texture_paths() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        let ground = scene.objects.iter().find(|o| o.name == "Ground").unwrap();
        assert_eq!(ground.mesh.as_deref(), Some("models/ground.obj"));
        assert_eq!(ground.texture.as_deref(), Some("textures/ground.png"));
    }

    #[test]
    fn color_temperature_overrides_color() {
        let xml = r#"
        <scene><object>
            <name>Warm</name>
            <type>light</type>
            <color>0 0 255</color>
            <color-temperature>3600</color-temperature>
        </object></scene>"#;
        let scene = Scene::from_xml(xml).unwrap();
        let light = scene.lights[0];
        // A 3600 K light is warm: red dominates blue.
        assert!(light.color.x > light.color.z);
    }

    #[test]
    fn light_defaults_follow_demo_setup() {
        let xml = "<scene><object><name>L</name><type>light</type></object></scene>";
        let scene = Scene::from_xml(xml).unwrap();
        let light = scene.lights[0];
        assert_eq!(light.frustum.near, 1.0);
        assert_eq!(light.frustum.far, 500.0);
        assert_eq!(light.resolution, 2048);
    }

    #[test]
    fn missing_name_is_an_error() {
        let bad = "<scene><object><type>mesh</type></object></scene>";
        assert!(Scene::from_xml(bad).is_err());
    }

    #[test]
    fn from_path_resolves_assets_next_to_the_scene_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.xml");
        fs::write(&path, SAMPLE).unwrap();

        let scene = Scene::from_path(&path).unwrap();
        assert_eq!(scene.objects.len(), 3);
        assert_eq!(
            scene.resolve("models/ground.obj"),
            dir.path().join("models/ground.obj")
        );
    }
}
