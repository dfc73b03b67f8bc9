//! Core engine loop
//!
//! Ties the window, the renderer and a scene together and drives an
//! [`Application`] until the window closes.

use thiserror::Error;

use crate::application::Application;
use crate::config::{ConfigError, EngineConfig};
use crate::foundation::logging;
use crate::foundation::math::Vec3;
use crate::foundation::time::FrameTimer;
use crate::render::{Device, Renderer, VulkanError};
use crate::scene::{Camera, Scene, SceneWatch};
use crate::window::{Window, WindowError};

/// Frames between FPS log lines
const FPS_LOG_INTERVAL: u64 = 600;

/// Main engine struct
///
/// Field order is drop order: the renderer goes before the window its
/// surface was created from.
pub struct Engine {
    /// Renderer and GPU device
    pub renderer: Renderer,
    /// Entities drawn every frame
    pub scene: Scene,
    /// Camera the scene is drawn from
    pub camera: Camera,
    timer: FrameTimer,
    scene_watch: SceneWatch,
    running: bool,
    /// Window presenting the frames
    pub window: Window,
}

impl Engine {
    /// Initialize logging, open the window and bring up the renderer
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        logging::init(logging::parse_level(&config.log_level));
        config.validate()?;
        log::info!("Initializing engine...");

        let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
        let device = Device::new(&mut window, &config.renderer)?;

        let camera = Camera::new(Vec3::new(0.0, 2.0, 8.0)).with_lens(
            config.renderer.fov_degrees,
            config.renderer.near_plane,
            config.renderer.far_plane,
        );
        let renderer = Renderer::new(device, config.renderer)?;

        Ok(Self {
            renderer,
            scene: Scene::new(),
            camera,
            timer: FrameTimer::new(),
            scene_watch: SceneWatch::new(),
            running: true,
            window,
        })
    }

    /// Run the engine main loop with the given application
    pub fn run<T: Application>(config: EngineConfig, app: &mut T) -> Result<(), EngineError> {
        let mut engine = Self::new(config)?;

        app.initialize(&mut engine)
            .map_err(|e| EngineError::Application(format!("App initialization: {e}")))?;

        log::info!("Starting main loop...");
        let result = engine.main_loop(app);

        app.cleanup(&mut engine);
        log::info!("Engine shutdown complete");
        result
    }

    fn main_loop<T: Application>(&mut self, app: &mut T) -> Result<(), EngineError> {
        while self.running && !self.window.should_close() {
            self.window.poll_events();
            for event in self.window.flush_events() {
                match event {
                    glfw::WindowEvent::FramebufferSize(..) => self.renderer.mark_swapchain_dirty(),
                    glfw::WindowEvent::Close => self.running = false,
                    _ => {}
                }
                app.handle_event(self, &event)
                    .map_err(|e| EngineError::Application(format!("App event: {e}")))?;
            }

            let delta_time = self.timer.tick();
            app.update(self, delta_time)
                .map_err(|e| EngineError::Application(format!("App update: {e}")))?;

            if self.scene_watch.changed(&self.scene) {
                self.renderer.give_renderables(&self.scene)?;
            }
            self.renderer.draw(&mut self.window, &self.camera, &self.scene)?;

            let frame = self.renderer.device().frame_number();
            if frame > 0 && frame % FPS_LOG_INTERVAL == 0 {
                log::debug!("Frame {frame}: {:.1} fps", self.timer.fps());
            }
        }
        Ok(())
    }

    /// Request engine shutdown
    pub fn quit(&mut self) {
        log::info!("Engine shutdown requested");
        self.running = false;
    }

    /// Current frame delta time
    pub const fn delta_time(&self) -> f32 {
        self.timer.delta_time()
    }
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Vulkan device or renderer failure
    #[error("Rendering error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Application callback failure
    #[error("Application error: {0}")]
    Application(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_convert_into_engine_error() {
        let error: EngineError = VulkanError::InvalidOperation {
            reason: "bad".to_string(),
        }
        .into();
        assert!(matches!(error, EngineError::Vulkan(_)));

        let error: EngineError = ConfigError::Invalid("zero width".to_string()).into();
        assert_eq!(error.to_string(), "Configuration error: Invalid configuration: zero width");
    }
}
