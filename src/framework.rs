//! Window, surface and device bootstrap plus the winit event loop that drives
//! the orchestrator once per redraw.

use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::config::Settings;
use crate::constants::{FIELD_FORMAT, WINDOWED_POSITION, WINDOW_TITLE};
use crate::display::DisplayState;
use crate::error::{Result, SlimeError};
use crate::orchestrator::{DispatchPlan, FrameInput, Orchestrator, RunState, TickOutcome};
use crate::simulation::Simulation;

/// Opens the window and runs the simulation until the window is closed or
/// Escape is pressed. Returns the first fatal error, if any.
pub fn run(settings: Settings) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(settings)?;
    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    simulation: Simulation,
    /// False while the window is minimized.
    drawable: bool,
}

impl Gpu {
    fn new(event_loop: &ActiveEventLoop, settings: &Settings, plan: &DispatchPlan) -> Result<Self> {
        let size = PhysicalSize::new(settings.map_width, settings.map_height);
        let window = Arc::new(
            event_loop.create_window(
                Window::default_attributes()
                    .with_title(WINDOW_TITLE)
                    .with_inner_size(size)
                    .with_position(winit::dpi::PhysicalPosition::new(
                        WINDOWED_POSITION.0,
                        WINDOWED_POSITION.1,
                    )),
            )?,
        );

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| SlimeError::Device(format!("failed to create surface: {e}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| SlimeError::Device("no suitable GPU adapter".into()))?;
        let info = adapter.get_info();
        info!("using {} ({:?})", info.name, info.backend);

        check_field_support(&adapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Slime device"),
                required_features: wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES,
                required_limits: wgpu::Limits {
                    max_compute_workgroups_per_dimension: adapter
                        .limits()
                        .max_compute_workgroups_per_dimension,
                    max_storage_buffer_binding_size: adapter.limits().max_storage_buffer_binding_size,
                    max_buffer_size: adapter.limits().max_buffer_size,
                    ..wgpu::Limits::default()
                },
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| SlimeError::Device(format!("failed to request device: {e}")))?;

        let inner = window.inner_size();
        let config = surface
            .get_default_config(&adapter, inner.width.max(1), inner.height.max(1))
            .ok_or_else(|| SlimeError::Device("surface is not supported by the adapter".into()))?;
        surface.configure(&device, &config);

        let simulation = Simulation::init(settings, plan, config.format, &device, &queue)?;

        Ok(Gpu {
            window,
            surface,
            device,
            queue,
            config,
            simulation,
            drawable: is_drawable(inner),
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.drawable = is_drawable(size);
        if !self.drawable {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Acquires the next surface texture. `None` skips the frame after
    /// reconfiguring a lost or outdated surface.
    fn acquire(&mut self) -> Result<Option<wgpu::SurfaceTexture>> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("timed out acquiring the next frame");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// A zero-sized surface cannot be configured, so nothing is drawn until the
/// window has an area again.
fn is_drawable(size: PhysicalSize<u32>) -> bool {
    size.width > 0 && size.height > 0
}

/// The field texture format must be writable from the simulate kernel.
fn check_field_support(adapter: &wgpu::Adapter) -> Result<()> {
    if !adapter
        .features()
        .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
    {
        return Err(SlimeError::Device(
            "adapter does not expose format-specific storage texture access".into(),
        ));
    }
    let support = adapter.get_texture_format_features(FIELD_FORMAT);
    if !support
        .flags
        .contains(wgpu::TextureFormatFeatureFlags::STORAGE_READ_WRITE)
    {
        return Err(SlimeError::Device(format!(
            "{FIELD_FORMAT:?} storage textures are not read-write on this adapter"
        )));
    }
    Ok(())
}

struct App {
    settings: Settings,
    orchestrator: Orchestrator,
    display: DisplayState,
    gpu: Option<Gpu>,
    run_state: Option<RunState>,
    input: FrameInput,
    failure: Option<SlimeError>,
}

impl App {
    fn new(settings: Settings) -> Result<Self> {
        let orchestrator = Orchestrator::new(DispatchPlan::from_settings(&settings)?);
        let display = DisplayState::new((settings.map_width, settings.map_height));
        Ok(App {
            settings,
            orchestrator,
            display,
            gpu: None,
            run_state: None,
            input: FrameInput::default(),
            failure: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: SlimeError) {
        self.failure.get_or_insert(error);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(gpu), Some(run_state)) = (self.gpu.as_mut(), self.run_state.as_mut()) else {
            return Ok(());
        };
        if !gpu.drawable {
            return Ok(());
        }
        let Some(target) = gpu.acquire()? else {
            return Ok(());
        };

        let input = std::mem::take(&mut self.input);
        let mut frame = gpu.simulation.frame(&gpu.device, &gpu.queue, target);
        let outcome = self
            .orchestrator
            .tick(run_state, &mut frame, input, Instant::now())?;
        if outcome == TickOutcome::Started {
            gpu.window.set_title(&format!("{WINDOW_TITLE} - running"));
        }
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        match key {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::F11 => {
                if let Some(gpu) = &self.gpu {
                    self.display.toggle_fullscreen(gpu.window.as_ref());
                }
            }
            KeyCode::Space => self.input.start_requested = true,
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() || self.failure.is_some() {
            return;
        }
        match Gpu::new(event_loop, &self.settings, self.orchestrator.plan()) {
            Ok(gpu) => {
                info!(
                    "ready: {} agents on a {}x{} field with `{}`, press Space to start",
                    self.settings.agent_number,
                    self.settings.map_width,
                    self.settings.map_height,
                    gpu.simulation.kernel()
                );
                self.gpu = Some(gpu);
                self.run_state = Some(RunState::new(Instant::now()));
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(size);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, key),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = self.gpu.as_ref().filter(|gpu| gpu.drawable) {
            gpu.window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimized_window_is_not_drawable() {
        assert!(is_drawable(PhysicalSize::new(1280, 720)));
        assert!(is_drawable(PhysicalSize::new(1, 1)));
        assert!(!is_drawable(PhysicalSize::new(0, 0)));
        assert!(!is_drawable(PhysicalSize::new(1280, 0)));
        assert!(!is_drawable(PhysicalSize::new(0, 720)));
    }
}
