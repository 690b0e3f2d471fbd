//! Platform layer: windowing, event loop, input and asset drop-in.
//!
//! - Continuous redraw paced by vsync (`request_redraw` every `about_to_wait`).
//! - Backquote toggles pointer lock; while locked, mouse looks and WASD moves.
//! - Dropped `.obj`/`.png` files load in the background and are uploaded on
//!   the next frame.

pub mod input;
pub mod loader;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use corelib::{Mat4, camera::Camera};
use renderer::GpuState;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

use crate::input::InputState;
use crate::loader::{PendingAssets, spawn_load};

/// Startup options collected by the binary.
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub backends: wgpu::Backends,
    pub width: u32,
    pub height: u32,
    pub obj_path: Option<PathBuf>,
    pub texture_path: Option<PathBuf>,
    /// Flip the command-line texture so image row 0 lands at v = 1.
    pub flip_texture: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            width: 1280,
            height: 720,
            obj_path: None,
            texture_path: None,
            flip_texture: true,
        }
    }
}

/// Open the viewer window and run until it is closed.
pub fn run_viewer(config: ViewerConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = ViewerApp::new(config);

    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow!("Event loop error: {e:?}"))?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct ViewerApp {
    config: ViewerConfig,
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    camera: Camera,
    model: Mat4,
    input: InputState,
    pending: Arc<PendingAssets>,
    fatal: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            window: None,
            gpu: None,
            camera: Camera::default(),
            model: Mat4::IDENTITY,
            input: InputState::default(),
            pending: PendingAssets::new(),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("OBJ Viewer")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("Failed to create window")?,
        );
        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        let gpu = pollster::block_on(GpuState::new(window.clone(), self.config.backends))
            .context("GPU initialization failed")?;

        let initial = [
            self.config.obj_path.clone(),
            self.config.texture_path.clone(),
        ];
        for path in initial.into_iter().flatten() {
            spawn_load(path, self.config.flip_texture, &self.pending)?;
        }

        self.window = Some(window);
        self.gpu = Some(gpu);
        Ok(())
    }

    fn set_pointer_lock(&mut self, lock: bool) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if lock {
            let grabbed = window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
            if let Err(err) = grabbed {
                log::warn!("Pointer lock unavailable: {err}");
                return;
            }
            window.set_cursor_visible(false);
        } else {
            if let Err(err) = window.set_cursor_grab(CursorGrabMode::None) {
                log::warn!("Failed to release pointer: {err}");
            }
            window.set_cursor_visible(true);
        }
        self.input.set_pointer_locked(lock);
        log::debug!("Pointer lock: {}", lock);
    }

    /// Swap in finished loads, move the camera, draw.
    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };

        if let Some(mesh) = self.pending.take_mesh() {
            gpu.upload_mesh(&mesh);
            log::debug!("Mesh swapped in (drawable={})", gpu.is_loaded());
        }
        if let Some(tex) = self.pending.take_texture() {
            gpu.upload_texture(&tex.data, tex.flip_vertically);
        }

        self.input.apply_movement(&mut self.camera);

        match gpu.render(&self.camera, self.model) {
            Ok(()) => {}
            Err(err) if GpuState::is_surface_lost(&err) => {
                log::warn!("Surface lost/outdated: {err:?}. Recreating surface.");
                gpu.recreate_surface();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of GPU memory. Exiting.");
                event_loop.exit();
            }
            Err(err) => {
                log::warn!("Frame skipped: {err:?}");
            }
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fatal = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested. Exiting event loop.");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                log::info!("Resized: {}x{}", new_size.width, new_size.height);
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::DroppedFile(path) => {
                log::info!("Dropped {}", path.display());
                if let Err(err) = spawn_load(path, true, &self.pending) {
                    log::error!("{err:#}");
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                if code == KeyCode::Backquote {
                    if event.state == ElementState::Pressed && !event.repeat {
                        let lock = !self.input.pointer_locked();
                        self.set_pointer_lock(lock);
                    }
                } else {
                    self.input.key(code, event.state);
                }
            }
            WindowEvent::Focused(false) if self.input.pointer_locked() => {
                self.set_pointer_lock(false);
            }
            WindowEvent::RedrawRequested => self.frame(event_loop),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.mouse_moved(&mut self.camera, dx, dy);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
