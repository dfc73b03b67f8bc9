//! GLFW window for Vulkan presentation
//!
//! Owns the GLFW context, the window and its event receiver. The renderer
//! only needs three things from it: required instance extensions, a
//! surface, and the framebuffer extent.

use ash::vk;
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// GLFW has no Vulkan loader available
    #[error("Vulkan is not supported by this GLFW build or driver")]
    VulkanUnsupported,

    /// Surface creation returned an error code
    #[error("Surface creation failed: {0:?}")]
    SurfaceCreation(vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a resizable window with no client API attached
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| WindowError::InitializationFailed(format!("{e:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);
        window.set_iconify_polling(true);
        window.set_cursor_pos_polling(true);

        log::info!("[WINDOW] Created '{title}' ({width}x{height})");

        Ok(Self { glfw, window, events })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request the window to close
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump the OS event queue without blocking
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    /// Block until at least one event arrives
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Drain events received since the last call
    pub fn flush_events(&self) -> Vec<glfw::WindowEvent> {
        glfw::flush_messages(&self.events).map(|(_, event)| event).collect()
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_extent(&self) -> vk::Extent2D {
        let (width, height) = self.window.get_framebuffer_size();
        vk::Extent2D {
            width: u32::try_from(width).unwrap_or(0),
            height: u32::try_from(height).unwrap_or(0),
        }
    }

    /// True while minimized or collapsed to a zero-area framebuffer
    pub fn is_minimized(&self) -> bool {
        let extent = self.framebuffer_extent();
        self.window.is_iconified() || extent.width == 0 || extent.height == 0
    }

    /// Whether `key` is currently held down
    pub fn is_key_down(&self, key: glfw::Key) -> bool {
        matches!(self.window.get_key(key), glfw::Action::Press | glfw::Action::Repeat)
    }

    /// Whether `button` is currently held down
    pub fn is_mouse_button_down(&self, button: glfw::MouseButton) -> bool {
        self.window.get_mouse_button(button) == glfw::Action::Press
    }

    /// Cursor position in screen coordinates
    pub fn cursor_position(&self) -> (f64, f64) {
        self.window.get_cursor_pos()
    }

    /// Hide and lock the cursor for mouse look, or release it
    pub fn set_cursor_captured(&mut self, captured: bool) {
        let mode = if captured {
            glfw::CursorMode::Disabled
        } else {
            glfw::CursorMode::Normal
        };
        self.window.set_cursor_mode(mode);
    }

    /// Seconds since GLFW initialization
    pub fn time(&self) -> f64 {
        self.glfw.get_time()
    }

    /// Instance extensions GLFW needs for surface creation
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::VulkanUnsupported)
    }

    /// Create the presentation surface for `instance`
    pub fn create_surface(&self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(result))
        }
    }
}

/// Source of the framebuffer extent and of the blocking wait used while
/// the window is minimized.
pub trait SurfaceExtent {
    /// Current framebuffer size in pixels
    fn framebuffer_extent(&self) -> vk::Extent2D;

    /// Block until the next window event
    fn wait_events(&mut self);
}

impl SurfaceExtent for Window {
    fn framebuffer_extent(&self) -> vk::Extent2D {
        Self::framebuffer_extent(self)
    }

    fn wait_events(&mut self) {
        Self::wait_events(self);
    }
}

/// Wait until `source` reports a non-zero framebuffer, returning that extent.
///
/// Zero-sized swapchains are invalid, so recreation parks here while the
/// window is minimized.
pub fn wait_for_visible_extent(source: &mut impl SurfaceExtent) -> vk::Extent2D {
    let mut extent = source.framebuffer_extent();
    while extent.width == 0 || extent.height == 0 {
        source.wait_events();
        extent = source.framebuffer_extent();
    }
    extent
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedExtent {
        extents: Vec<vk::Extent2D>,
        waits: usize,
    }

    impl SurfaceExtent for ScriptedExtent {
        fn framebuffer_extent(&self) -> vk::Extent2D {
            self.extents[self.waits.min(self.extents.len() - 1)]
        }

        fn wait_events(&mut self) {
            self.waits += 1;
        }
    }

    #[test]
    fn test_minimized_window_blocks_until_restored() {
        let zero = vk::Extent2D { width: 0, height: 0 };
        let restored = vk::Extent2D { width: 800, height: 600 };
        let mut source = ScriptedExtent {
            extents: vec![zero, zero, vk::Extent2D { width: 800, height: 0 }, restored],
            waits: 0,
        };

        let extent = wait_for_visible_extent(&mut source);
        assert_eq!(extent, restored);
        assert_eq!(source.waits, 3);
    }

    #[test]
    fn test_visible_window_does_not_wait() {
        let mut source = ScriptedExtent {
            extents: vec![vk::Extent2D { width: 1, height: 1 }],
            waits: 0,
        };
        wait_for_visible_extent(&mut source);
        assert_eq!(source.waits, 0);
    }
}
