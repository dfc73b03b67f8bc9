//! # Runic Engine
//!
//! A small real-time 3D renderer built on Vulkan 1.3.
//!
//! ## Features
//!
//! - **Frame pacing**: two frames in flight with swapchain recreation on resize
//! - **Bindless textures**: one sampler array indexed from per-object materials
//! - **Storage-buffer draws**: per-object data lives in frame buffers, each draw pushes one index
//! - **Hot pipelines**: shaders recompile in place without invalidating handles
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runic_engine::prelude::*;
//!
//! struct MyApp;
//!
//! impl Application for MyApp {
//!     fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
//!         let cube = engine.renderer.upload_mesh(&MeshDesc::cube())?;
//!         engine.scene.spawn(Entity::new("cube").with_renderable(RenderableComponent::new(cube)));
//!         engine
//!             .scene
//!             .spawn(Entity::new("sun").with_light(LightComponent::directional(Vec3::new(-1.0, -1.0, -1.0))));
//!         Ok(())
//!     }
//!
//!     fn update(&mut self, _engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let mut app = MyApp;
//!     Engine::run(config, &mut app)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;
pub mod window;

mod application;
mod engine;

pub use application::{AppError, Application};
pub use engine::{Engine, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, EngineConfig, RendererConfig},
        foundation::math::{Mat4, Transform, Vec3},
        render::{MeshDesc, MeshHandle, Renderer, Texture, TextureFormat, TextureHandle},
        scene::{Camera, Entity, EntityId, LightComponent, LightType, RenderableComponent, Scene, SceneWatch},
        AppError, Application, Engine, EngineError,
    };
}
