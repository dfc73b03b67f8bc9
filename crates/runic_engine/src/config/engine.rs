use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{Config, ConfigError};

/// Locations of a material's compiled SPIR-V stages.
///
/// Stage files follow the `<name>.vert.spv` / `<name>.frag.spv` convention
/// produced by the build script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
    /// Vertex stage SPIR-V
    pub vertex: PathBuf,
    /// Fragment stage SPIR-V
    pub fragment: PathBuf,
}

impl ShaderPaths {
    /// Resolve the stage paths of shader `name` inside `dir`
    pub fn resolve(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            vertex: dir.join(format!("{name}.vert.spv")),
            fragment: dir.join(format!("{name}.frag.spv")),
        }
    }

    /// Check both stage files exist
    pub fn validate(&self) -> Result<(), String> {
        for path in [&self.vertex, &self.fragment] {
            if !path.exists() {
                return Err(format!("Shader not found: {}", path.display()));
            }
        }
        Ok(())
    }
}

/// Window creation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Runic".to_string(),
            width: 1700,
            height: 900,
        }
    }
}

/// Renderer and Vulkan device settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance
    pub application_name: String,
    /// Enable validation layers (only honoured in debug builds)
    pub enable_validation: bool,
    /// Directory holding compiled `.spv` files
    pub shader_dir: PathBuf,
    /// Clear color of the offscreen color target
    pub clear_color: [f32; 4],
    /// Vertical field of view of the scene camera, in degrees
    pub fov_degrees: f32,
    /// Near clip plane distance
    pub near_plane: f32,
    /// Far clip plane distance
    pub far_plane: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Runic Application".to_string(),
            enable_validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("target/shaders"),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            fov_degrees: 70.0,
            near_plane: 0.1,
            far_plane: 1000.0,
        }
    }
}

impl RendererConfig {
    /// Create a configuration for `app_name` with default settings
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Set the compiled shader directory
    #[must_use]
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Set the clear color
    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Stage paths for the named shader
    pub fn shader(&self, name: &str) -> ShaderPaths {
        ShaderPaths::resolve(&self.shader_dir, name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if !(1.0..179.0).contains(&self.fov_degrees) {
            return Err(format!("Field of view {} out of range", self.fov_degrees));
        }
        if self.near_plane <= 0.0 || self.far_plane <= self.near_plane {
            return Err(format!(
                "Clip planes must satisfy 0 < near < far (near {}, far {})",
                self.near_plane, self.far_plane
            ));
        }
        Ok(())
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log level, overridden by `RUST_LOG`
    pub log_level: String,
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Set the log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid("Window dimensions must be non-zero".to_string()));
        }
        self.renderer.validate().map_err(ConfigError::Invalid)
    }
}

impl Config for EngineConfig {}
impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("runic_config_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default().with_log_level("info");
        assert!(config.validate().is_ok());
        assert_eq!(config.window.width, 1700);
        assert_eq!(config.window.height, 900);
    }

    #[test]
    fn test_invalid_clip_planes_rejected() {
        let mut config = RendererConfig::default();
        config.near_plane = 10.0;
        config.far_plane = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shader_paths_resolution() {
        let config = RendererConfig::default().with_shader_dir("shaders");
        let paths = config.shader("skybox");
        assert_eq!(paths.vertex, PathBuf::from("shaders/skybox.vert.spv"));
        assert_eq!(paths.fragment, PathBuf::from("shaders/skybox.frag.spv"));
        assert!(paths.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let path = temp_path("engine.toml");
        let config = EngineConfig::default().with_log_level("debug");
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_partial_file_uses_defaults() {
        let path = temp_path("renderer.ron");
        std::fs::write(&path, "(application_name: \"Sandbox\")").unwrap();

        let loaded = RendererConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.application_name, "Sandbox");
        assert!((loaded.fov_degrees - 70.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = EngineConfig::default().save_to_file(temp_path("engine.json"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let loaded = EngineConfig::load_or_default(temp_path("missing.toml")).unwrap();
        assert_eq!(loaded, EngineConfig::default());
    }
}
