//! Application trait and lifecycle management

use crate::engine::{Engine, EngineError};
use thiserror::Error;

/// Application lifecycle trait
///
/// Implement this trait to drive the engine loop: set up meshes, textures
/// and the scene in `initialize`, move things in `update`.
pub trait Application {
    /// Called once after the window and renderer exist
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError>;

    /// Called every frame before drawing
    ///
    /// # Arguments
    /// * `engine` - Mutable reference to the engine
    /// * `delta_time` - Time since last frame in seconds
    fn update(&mut self, engine: &mut Engine, delta_time: f32) -> Result<(), AppError>;

    /// Called for every window event after the engine has handled it
    fn handle_event(&mut self, _engine: &mut Engine, _event: &glfw::WindowEvent) -> Result<(), AppError> {
        Ok(())
    }

    /// Called once after the loop exits, before the renderer is torn down
    fn cleanup(&mut self, _engine: &mut Engine) {}
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Engine error propagated to application level
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}

impl From<crate::render::VulkanError> for AppError {
    fn from(e: crate::render::VulkanError) -> Self {
        Self::Engine(e.into())
    }
}
