//! CPU-side textures and their bindless handles
//!
//! Decoding goes through the `image` crate and always yields tightly packed
//! RGBA8. A texture that fails to load comes back empty; uploading an empty
//! texture resolves to the default slot instead of failing the caller.

use std::path::Path;

use ash::vk;

/// Index into the bindless texture array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    /// The white texture created at renderer init
    pub const DEFAULT: Self = Self(0);

    /// Value written into material texture slots
    #[allow(clippy::cast_possible_wrap)]
    pub const fn shader_index(self) -> i32 {
        self.0 as i32
    }
}

/// Color space of the pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFormat {
    /// Color data, sampled with sRGB decoding
    #[default]
    Srgb,
    /// Data such as normal maps, sampled as-is
    Linear,
}

impl TextureFormat {
    /// Matching RGBA8 Vulkan format
    pub const fn vk_format(self) -> vk::Format {
        match self {
            Self::Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::Linear => vk::Format::R8G8B8A8_UNORM,
        }
    }
}

/// Flat image or six-face cubemap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureKind {
    /// Single 2D image
    #[default]
    Flat,
    /// Faces +X, -X, +Y, -Y, +Z, -Z stored back to back
    Cubemap,
}

impl TextureKind {
    /// Number of `width * height` faces in the pixel data
    pub const fn face_count(self) -> usize {
        match self {
            Self::Flat => 1,
            Self::Cubemap => 6,
        }
    }
}

/// RGBA8 pixels ready for upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Texture {
    /// Width of one face in pixels
    pub width: u32,
    /// Height of one face in pixels
    pub height: u32,
    /// Color space
    pub format: TextureFormat,
    /// Flat or cubemap
    pub kind: TextureKind,
    /// Tightly packed RGBA8, face after face
    pub pixels: Vec<u8>,
}

fn decode(path: &Path) -> Option<image::RgbaImage> {
    match image::open(path) {
        Ok(img) => Some(img.to_rgba8()),
        Err(e) => {
            log::warn!("[RENDERER] Failed to load texture {}: {e}", path.display());
            None
        }
    }
}

impl Texture {
    /// Bytes in one face
    pub const fn face_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// True when there is nothing to upload
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Whether the pixel data covers every face exactly
    pub fn is_complete(&self) -> bool {
        !self.is_empty() && self.pixels.len() == self.face_size() * self.kind.face_count()
    }

    /// Single-color flat texture
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        Self {
            width,
            height,
            format: TextureFormat::Srgb,
            kind: TextureKind::Flat,
            pixels: color.repeat(pixel_count),
        }
    }

    /// Decode a 2D image; on failure logs a warning and returns an empty texture
    pub fn load_from_file(path: impl AsRef<Path>, format: TextureFormat) -> Self {
        let path = path.as_ref();
        let Some(img) = decode(path) else {
            return Self::default();
        };

        let (width, height) = img.dimensions();
        log::info!("[RENDERER] Loaded texture {} ({width}x{height})", path.display());
        Self {
            width,
            height,
            format,
            kind: TextureKind::Flat,
            pixels: img.into_raw(),
        }
    }

    /// Decode six faces in +X, -X, +Y, -Y, +Z, -Z order into a cubemap.
    ///
    /// Faces must be square and share one size; otherwise the result is empty.
    pub fn load_cubemap<P: AsRef<Path>>(faces: &[P; 6]) -> Self {
        let mut pixels = Vec::new();
        let mut size = None;

        for face in faces {
            let path = face.as_ref();
            let Some(img) = decode(path) else {
                return Self::default();
            };
            let dims = img.dimensions();
            if dims.0 != dims.1 || size.is_some_and(|s| s != dims) {
                log::warn!("[RENDERER] Cubemap face {} has mismatched size {dims:?}", path.display());
                return Self::default();
            }
            size = Some(dims);
            pixels.extend_from_slice(img.as_raw());
        }

        let (width, height) = size.unwrap_or((0, 0));
        Self {
            width,
            height,
            format: TextureFormat::Srgb,
            kind: TextureKind::Cubemap,
            pixels,
        }
    }
}
