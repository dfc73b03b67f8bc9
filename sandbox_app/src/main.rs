//! Sandbox demo application
//!
//! A grid of spinning cubes on a floor plane, lit by a sun and orbiting
//! point lights, under a cubemap skybox when one is found on disk.
//!
//! Controls: WASD to move, Space/Left Shift to rise and sink, hold the right
//! mouse button to look around, R to reload shaders, Escape to quit.

use glfw::{Action, Key, WindowEvent};
use runic_engine::prelude::*;

const CONFIG_PATH: &str = "sandbox.toml";
const GRID_SIZE: i32 = 16;
const GRID_SPACING: f32 = 2.5;
const MOVE_SPEED: f32 = 8.0;
const MOUSE_SENSITIVITY: f32 = 0.1;
const ORBIT_RADIUS: f32 = 12.0;

const SKYBOX_FACES: [&str; 6] = [
    "resources/skybox/right.png",
    "resources/skybox/left.png",
    "resources/skybox/top.png",
    "resources/skybox/bottom.png",
    "resources/skybox/front.png",
    "resources/skybox/back.png",
];

/// Two-tone checkerboard used when no diffuse texture is on disk
fn checkerboard(size: u32, cell: u32) -> Texture {
    let mut texture = Texture::solid_color(size, size, [0; 4]);
    for (i, pixel) in texture.pixels.chunks_exact_mut(4).enumerate() {
        let (x, y) = (i as u32 % size, i as u32 / size);
        let shade = if (x / cell + y / cell) % 2 == 0 { 200 } else { 90 };
        pixel.copy_from_slice(&[shade, shade, shade, 255]);
    }
    texture
}

#[derive(Default)]
struct Sandbox {
    spinners: Vec<EntityId>,
    orbiters: Vec<EntityId>,
    last_cursor: Option<(f64, f64)>,
    elapsed: f32,
}

impl Sandbox {
    fn load_diffuse(engine: &mut Engine) -> Result<TextureHandle, AppError> {
        let texture = Texture::load_from_file("resources/textures/crate.png", TextureFormat::Srgb);
        let texture = if texture.is_empty() { checkerboard(256, 32) } else { texture };
        Ok(engine.renderer.upload_texture(&texture)?)
    }

    fn load_skybox(engine: &mut Engine) -> Result<(), AppError> {
        let cubemap = Texture::load_cubemap(&SKYBOX_FACES);
        let handle = engine.renderer.upload_texture(&cubemap)?;
        if handle == TextureHandle::DEFAULT {
            log::info!("No skybox on disk, using flat background");
        } else {
            engine.renderer.set_skybox(handle)?;
        }
        Ok(())
    }

    fn spawn_grid(&mut self, engine: &mut Engine, cube: MeshHandle, diffuse: TextureHandle) {
        let half = GRID_SIZE as f32 * GRID_SPACING / 2.0;
        for row in 0..GRID_SIZE {
            for column in 0..GRID_SIZE {
                let position = Vec3::new(
                    column as f32 * GRID_SPACING - half,
                    0.5,
                    row as f32 * GRID_SPACING - half,
                );
                let id = engine.scene.spawn(
                    Entity::new(format!("cube_{row}_{column}"))
                        .with_transform(Transform::from_position(position).with_uniform_scale(0.5))
                        .with_renderable(RenderableComponent::new(cube).with_diffuse(diffuse)),
                );
                self.spinners.push(id);
            }
        }
    }

    fn spawn_lights(&mut self, engine: &mut Engine) {
        engine.scene.spawn(
            Entity::new("sun").with_light(
                LightComponent::directional(Vec3::new(-0.4, -1.0, -0.3).normalize()).with_colors(
                    Vec3::repeat(0.5),
                    Vec3::new(1.0, 0.95, 0.85),
                    Vec3::repeat(0.6),
                ),
            ),
        );

        let colors = [
            Vec3::new(1.0, 0.3, 0.2),
            Vec3::new(0.2, 1.0, 0.4),
            Vec3::new(0.3, 0.4, 1.0),
        ];
        for (i, color) in colors.into_iter().enumerate() {
            let id = engine.scene.spawn(
                Entity::new(format!("orbiter_{i}"))
                    .with_light(LightComponent::point(Vec3::zeros()).with_colors(color * 0.2, color, color)),
            );
            self.orbiters.push(id);
        }
    }

    fn move_camera(&mut self, engine: &mut Engine, delta_time: f32) {
        let window = &engine.window;
        let axis = |positive: Key, negative: Key| {
            f32::from(u8::from(window.is_key_down(positive))) - f32::from(u8::from(window.is_key_down(negative)))
        };
        let step = MOVE_SPEED * delta_time;
        let forward = axis(Key::W, Key::S) * step;
        let right = axis(Key::D, Key::A) * step;
        let up = axis(Key::Space, Key::LeftShift) * step;

        let looking = window.is_mouse_button_down(glfw::MouseButtonRight);
        let cursor = window.cursor_position();
        engine.camera.translate_local(forward, right, up);

        if looking {
            if let Some((last_x, last_y)) = self.last_cursor {
                let dx = (cursor.0 - last_x) as f32;
                let dy = (cursor.1 - last_y) as f32;
                engine.camera.rotate(-dx * MOUSE_SENSITIVITY, -dy * MOUSE_SENSITIVITY);
            } else {
                engine.window.set_cursor_captured(true);
            }
            self.last_cursor = Some(cursor);
        } else if self.last_cursor.take().is_some() {
            engine.window.set_cursor_captured(false);
        }
    }

    fn animate(&self, engine: &mut Engine) {
        let spin = Vec3::new(0.0, self.elapsed * 0.8, self.elapsed * 0.3);
        for &id in &self.spinners {
            if let Some(entity) = engine.scene.get_mut(id) {
                entity.transform = entity.transform.clone().with_euler(spin);
            }
        }

        let count = self.orbiters.len() as f32;
        for (i, &id) in self.orbiters.iter().enumerate() {
            let angle = self.elapsed * 0.5 + i as f32 * std::f32::consts::TAU / count;
            if let Some(light) = engine.scene.get_mut(id).and_then(|entity| entity.light.as_mut()) {
                light.position = Vec3::new(angle.cos() * ORBIT_RADIUS, 3.0, angle.sin() * ORBIT_RADIUS);
            }
        }
    }
}

impl Application for Sandbox {
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
        log::info!("Initializing sandbox...");

        let cube = engine.renderer.upload_mesh(&MeshDesc::cube())?;
        let floor = engine.renderer.upload_mesh(&MeshDesc::plane(GRID_SIZE as u32 * 3))?;
        let diffuse = Self::load_diffuse(engine)?;
        Self::load_skybox(engine)?;

        engine.scene.spawn(
            Entity::new("floor")
                .with_transform(Transform::from_position(Vec3::new(0.0, -0.5, 0.0)))
                .with_renderable(RenderableComponent::new(floor)),
        );
        self.spawn_grid(engine, cube, diffuse);
        self.spawn_lights(engine);

        log::info!(
            "Sandbox ready: {} entities, {} textures",
            engine.scene.len(),
            engine.renderer.texture_count()
        );
        Ok(())
    }

    fn update(&mut self, engine: &mut Engine, delta_time: f32) -> Result<(), AppError> {
        self.elapsed += delta_time;
        self.move_camera(engine, delta_time);
        self.animate(engine);
        Ok(())
    }

    fn handle_event(&mut self, engine: &mut Engine, event: &WindowEvent) -> Result<(), AppError> {
        match event {
            WindowEvent::Key(Key::Escape, _, Action::Press, _) => engine.quit(),
            WindowEvent::Key(Key::R, _, Action::Press, _) => {
                // A broken shader keeps the previous pipeline, so keep running
                if let Err(e) = engine.renderer.recompile_pipelines() {
                    log::error!("Shader reload failed: {e}");
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn cleanup(&mut self, engine: &mut Engine) {
        log::info!("Sandbox ran {} frames", engine.renderer.device().frame_number());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load_or_default(CONFIG_PATH)?;
    let mut app = Sandbox::default();
    Engine::run(config, &mut app)?;
    Ok(())
}
