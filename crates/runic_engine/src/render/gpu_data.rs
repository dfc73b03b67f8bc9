//! Shader-visible data layouts
//!
//! Every struct here is `#[repr(C)]` and `Pod` so it can be copied into a
//! mapped buffer with `bytemuck::bytes_of`. Field order and padding match
//! the std430/std140 blocks in `resources/shaders`.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{normal_matrix, to_cols_array, Mat4, Vec3};

/// Maximum drawables per frame, skybox included
pub const MAX_OBJECTS: usize = 1024;
/// Capacity of the bindless texture array
pub const MAX_TEXTURES: usize = 128;
/// Point lights forwarded to the shaders
pub const MAX_POINT_LIGHTS: usize = 4;

/// Marker for an absent texture in `GpuMaterial::texture_indices`
pub const NO_TEXTURE: i32 = -1;

/// Pushed once per draw; indexes the draw data array
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PushConstants {
    /// Index into the draw data array
    pub draw_index: u32,
}

/// Indirection from a draw to its transform and material slots
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuDrawData {
    /// Slot in the transform array
    pub transform_index: i32,
    /// Slot in the material array
    pub material_index: i32,
    _padding: [i32; 2],
}

impl GpuDrawData {
    /// Draw data pointing at `transform_index` and `material_index`
    pub const fn new(transform_index: i32, material_index: i32) -> Self {
        Self {
            transform_index,
            material_index,
            _padding: [0; 2],
        }
    }
}

/// Model and normal matrices, column-major
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuTransform {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the model's upper 3x3
    pub normal: [[f32; 4]; 4],
}

impl GpuTransform {
    /// Build both matrices from a model matrix
    pub fn from_model(model: &Mat4) -> Self {
        Self {
            model: to_cols_array(model),
            normal: to_cols_array(&normal_matrix(model)),
        }
    }
}

/// Phong material parameters and bindless texture slots
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    /// Diffuse tint
    pub diffuse: [f32; 4],
    /// Specular color
    pub specular: [f32; 3],
    /// Specular exponent
    pub shininess: f32,
    /// Diffuse, normal, roughness and emissive slots; `NO_TEXTURE` if absent
    pub texture_indices: [i32; 4],
}

impl Default for GpuMaterial {
    fn default() -> Self {
        Self {
            diffuse: [1.0; 4],
            specular: [1.0; 3],
            shininess: 32.0,
            texture_indices: [NO_TEXTURE; 4],
        }
    }
}

impl GpuMaterial {
    /// Material used for every regular entity
    pub const fn entity(texture_indices: [i32; 4]) -> Self {
        Self {
            diffuse: [1.0; 4],
            specular: [0.4; 3],
            shininess: 64.0,
            texture_indices,
        }
    }

    /// Material sampling `cubemap_slot` as the skybox
    pub const fn skybox(cubemap_slot: i32) -> Self {
        Self {
            diffuse: [1.0; 4],
            specular: [1.0; 3],
            shininess: 32.0,
            texture_indices: [cubemap_slot, NO_TEXTURE, NO_TEXTURE, NO_TEXTURE],
        }
    }
}

/// Camera matrices and world position
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuCamera {
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip, Vulkan conventions
    pub proj: [[f32; 4]; 4],
    /// Eye position, `w` unused
    pub position: [f32; 4],
}

/// Sun light, all-zero when the scene has none
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuDirectionalLight {
    /// Ambient color
    pub ambient: [f32; 4],
    /// Diffuse color
    pub diffuse: [f32; 4],
    /// Specular color
    pub specular: [f32; 4],
    /// Direction the light travels
    pub direction: [f32; 4],
}

/// Attenuated point light
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuPointLight {
    /// Ambient color
    pub ambient: [f32; 4],
    /// Diffuse color
    pub diffuse: [f32; 4],
    /// Specular color
    pub specular: [f32; 4],
    /// World position
    pub position: [f32; 4],
    /// Constant attenuation term
    pub constant: f32,
    /// Linear attenuation term
    pub linear: f32,
    /// Quadratic attenuation term
    pub quadratic: f32,
    _padding: f32,
}

impl GpuPointLight {
    /// Light with the given colors, position and attenuation
    pub const fn new(
        ambient: [f32; 4],
        diffuse: [f32; 4],
        specular: [f32; 4],
        position: [f32; 4],
        attenuation: [f32; 3],
    ) -> Self {
        Self {
            ambient,
            diffuse,
            specular,
            position,
            constant: attenuation[0],
            linear: attenuation[1],
            quadratic: attenuation[2],
            _padding: 0.0,
        }
    }
}

/// Point light count followed by a fixed array; unused entries stay zero
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuPointLightBlock {
    /// Number of valid entries in `lights`
    pub count: u32,
    _padding: [u32; 3],
    /// Light array
    pub lights: [GpuPointLight; MAX_POINT_LIGHTS],
}

impl GpuPointLightBlock {
    /// Pack up to `MAX_POINT_LIGHTS` lights; extra lights are dropped
    pub fn pack(lights: impl IntoIterator<Item = GpuPointLight>) -> Self {
        let mut block = Self::default();
        for (slot, light) in block.lights.iter_mut().zip(lights) {
            *slot = light;
            block.count += 1;
        }
        block
    }
}

/// Extend a vector with `w`
pub fn vec4(v: &Vec3, w: f32) -> [f32; 4] {
    [v.x, v.y, v.z, w]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(size_of::<PushConstants>(), 4);
        assert_eq!(size_of::<GpuDrawData>(), 16);
        assert_eq!(size_of::<GpuTransform>(), 128);
        assert_eq!(size_of::<GpuMaterial>(), 48);
        assert_eq!(size_of::<GpuCamera>(), 144);
        assert_eq!(size_of::<GpuDirectionalLight>(), 64);
        assert_eq!(size_of::<GpuPointLight>(), 80);
        assert_eq!(size_of::<GpuPointLightBlock>(), 16 + 80 * MAX_POINT_LIGHTS);
    }

    #[test]
    fn test_entity_material() {
        let material = GpuMaterial::entity([3, NO_TEXTURE, NO_TEXTURE, 5]);
        assert_eq!(material.specular, [0.4; 3]);
        assert_eq!(material.shininess, 64.0);
        assert_eq!(material.texture_indices, [3, -1, -1, 5]);
    }

    #[test]
    fn test_skybox_material() {
        assert_eq!(GpuMaterial::skybox(2).texture_indices, [2, -1, -1, -1]);
    }

    #[test]
    fn test_point_light_block_caps_count() {
        let light = GpuPointLight::new([0.1; 4], [1.0; 4], [1.0; 4], [0.0; 4], [1.0, 0.09, 0.032]);
        let block = GpuPointLightBlock::pack(std::iter::repeat(light).take(6));
        assert_eq!(block.count, MAX_POINT_LIGHTS as u32);

        let empty = GpuPointLightBlock::pack(std::iter::empty());
        assert_eq!(empty.count, 0);
        assert_eq!(empty.lights[0], GpuPointLight::default());
    }
}
