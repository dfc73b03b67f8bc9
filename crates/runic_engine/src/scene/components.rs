//! Optional entity aspects read by the renderer

use crate::foundation::math::Vec3;
use crate::render::gpu_data::NO_TEXTURE;
use crate::render::mesh::MeshHandle;
use crate::render::texture::TextureHandle;

/// Mesh plus optional texture maps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderableComponent {
    /// Uploaded mesh
    pub mesh: MeshHandle,
    /// Base color map
    pub diffuse: Option<TextureHandle>,
    /// Tangent-space normal map
    pub normal: Option<TextureHandle>,
    /// Roughness map
    pub roughness: Option<TextureHandle>,
    /// Emission map
    pub emissive: Option<TextureHandle>,
}

impl RenderableComponent {
    /// Untextured renderable
    pub const fn new(mesh: MeshHandle) -> Self {
        Self {
            mesh,
            diffuse: None,
            normal: None,
            roughness: None,
            emissive: None,
        }
    }

    /// Set the diffuse map
    #[must_use]
    pub const fn with_diffuse(mut self, texture: TextureHandle) -> Self {
        self.diffuse = Some(texture);
        self
    }

    /// Set the normal map
    #[must_use]
    pub const fn with_normal(mut self, texture: TextureHandle) -> Self {
        self.normal = Some(texture);
        self
    }

    /// Set the roughness map
    #[must_use]
    pub const fn with_roughness(mut self, texture: TextureHandle) -> Self {
        self.roughness = Some(texture);
        self
    }

    /// Set the emission map
    #[must_use]
    pub const fn with_emissive(mut self, texture: TextureHandle) -> Self {
        self.emissive = Some(texture);
        self
    }

    /// Bindless slots in diffuse, normal, roughness, emissive order
    pub fn texture_indices(&self) -> [i32; 4] {
        [self.diffuse, self.normal, self.roughness, self.emissive]
            .map(|texture| texture.map_or(NO_TEXTURE, TextureHandle::shader_index))
    }
}

/// Kind of light an entity emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Infinitely distant light with a direction only
    Directional,
    /// Positional light with distance attenuation
    Point,
}

/// Phong light parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightComponent {
    /// Directional or point
    pub light_type: LightType,
    /// Ambient color
    pub ambient: Vec3,
    /// Diffuse color
    pub diffuse: Vec3,
    /// Specular color
    pub specular: Vec3,
    /// World position, point lights only
    pub position: Vec3,
    /// Constant attenuation, point lights only
    pub constant: f32,
    /// Linear attenuation, point lights only
    pub linear: f32,
    /// Quadratic attenuation, point lights only
    pub quadratic: f32,
    /// Travel direction, directional lights only
    pub direction: Vec3,
}

impl LightComponent {
    fn with_type(light_type: LightType) -> Self {
        Self {
            light_type,
            ambient: Vec3::repeat(0.7),
            diffuse: Vec3::repeat(1.0),
            specular: Vec3::repeat(1.0),
            position: Vec3::zeros(),
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
            direction: Vec3::new(0.0, 0.0, -1.0),
        }
    }

    /// Directional light travelling along `direction`
    pub fn directional(direction: Vec3) -> Self {
        Self {
            direction,
            ..Self::with_type(LightType::Directional)
        }
    }

    /// Point light at `position`
    pub fn point(position: Vec3) -> Self {
        Self {
            position,
            ..Self::with_type(LightType::Point)
        }
    }

    /// Replace ambient, diffuse and specular colors
    #[must_use]
    pub const fn with_colors(mut self, ambient: Vec3, diffuse: Vec3, specular: Vec3) -> Self {
        self.ambient = ambient;
        self.diffuse = diffuse;
        self.specular = specular;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_absent_textures_are_negative() {
        let mesh = SlotMap::<MeshHandle, ()>::with_key().insert(());
        let renderable = RenderableComponent::new(mesh)
            .with_diffuse(TextureHandle(3))
            .with_emissive(TextureHandle(7));
        assert_eq!(renderable.texture_indices(), [3, -1, -1, 7]);
        assert_eq!(RenderableComponent::new(mesh).texture_indices(), [-1; 4]);
    }

    #[test]
    fn test_light_defaults() {
        let light = LightComponent::point(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(light.light_type, LightType::Point);
        assert_eq!(light.constant, 1.0);
        assert_eq!(light.linear, 0.09);
        assert_eq!(light.quadratic, 0.032);
        assert_eq!(light.ambient, Vec3::repeat(0.7));

        let sun = LightComponent::directional(Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(sun.light_type, LightType::Directional);
        assert_eq!(sun.direction.y, -1.0);
    }
}
