use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use scene::{controls, ControlOutcome, RenderBackend, RenderOwner};
use tracing::{error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::camera::OrbitCamera;
use crate::gpu::{GpuContext, GpuScene};
use crate::keymap::KeyBindings;
use crate::session::Session;
use crate::types::RendererConfig;

const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Opens the interactive preview and blocks until the window is closed.
pub fn run_preview(config: RendererConfig) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title("warpshade")
        .with_inner_size(PhysicalSize::new(config.surface_size.0, config.surface_size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let size = window.inner_size();
    let context = GpuContext::windowed(window.clone(), size)
        .context("failed to initialise window renderer")?;
    let camera = OrbitCamera::from_config(&config.scene.camera);
    let scene = GpuScene::new(context, (size.width, size.height), camera.position())?;
    info!(
        adapter = %scene.adapter().name,
        backend = ?scene.adapter().backend,
        width = size.width,
        height = size.height,
        "preview window ready"
    );

    let mut preview = Preview {
        session: Session::new(&config)?,
        scene,
        camera,
        keys: KeyBindings::default(),
        pending_resize: None,
        next_frame: Instant::now(),
    };
    window.request_redraw();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                if matches!(event.logical_key, Key::Character(ref value) if value.as_str() == "q") {
                    elwt.exit();
                    return;
                }
                preview.handle_key(&event.logical_key);
            }
            WindowEvent::CursorMoved { position, .. } => {
                if preview.camera.cursor_moved(position.x, position.y) {
                    preview.scene.set_camera_position(preview.camera.position());
                }
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => match button_state {
                ElementState::Pressed => preview.camera.begin_drag(),
                ElementState::Released => preview.camera.end_drag(),
            },
            WindowEvent::Resized(new_size) => preview.resize(new_size),
            WindowEvent::RedrawRequested => {
                if let Err(err) = preview.redraw() {
                    match err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            preview.scene.reconfigure_surface();
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            error!("surface out of memory; exiting preview");
                            elwt.exit();
                        }
                        other => warn!("surface error: {other:?}; retrying next frame"),
                    }
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if now >= preview.next_frame {
                window.request_redraw();
                preview.next_frame = now + FRAME_INTERVAL;
            }
            elwt.set_control_flow(ControlFlow::WaitUntil(preview.next_frame));
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

struct Preview {
    session: Session,
    scene: GpuScene,
    camera: OrbitCamera,
    keys: KeyBindings,
    pending_resize: Option<PhysicalSize<u32>>,
    next_frame: Instant,
}

impl Preview {
    fn handle_key(&mut self, key: &Key) {
        let Session {
            state,
            rng,
            synchronizer,
            scheduler,
            ..
        } = &mut self.session;
        let Some(control) = self.keys.control_for(key, state, rng) else {
            if matches!(key, Key::Named(NamedKey::Space)) {
                info!(
                    param = self.keys.selected_param().name(),
                    value = state.animation.get(self.keys.selected_param()),
                    stops = state.ramp.len(),
                    frames_synced = synchronizer.frames_written(),
                    frames_skipped = synchronizer.frames_skipped(),
                    export = ?scheduler.state(),
                    next_run = scheduler.next_run(),
                    "scene status"
                );
            }
            return;
        };
        match controls::apply(state, &control, rng) {
            ControlOutcome::Updated => {
                tracing::debug!(?control, "scene updated");
            }
            ControlOutcome::Unchanged => {}
            ControlOutcome::Export(request) => {
                if let Err(err) = self.session.request_export(request, &self.scene) {
                    warn!(error = %err, "export request rejected");
                }
            }
        }
    }

    /// Resizes wait for the capture in progress to hand the renderer back.
    fn resize(&mut self, size: PhysicalSize<u32>) {
        if self.scene.ownership() == RenderOwner::Capture {
            self.pending_resize = Some(size);
        } else {
            self.scene.resize(size.width, size.height);
        }
    }

    fn redraw(&mut self) -> Result<(), wgpu::SurfaceError> {
        if let Some(size) = self.pending_resize.take() {
            self.resize(size);
        }

        let live_time = self.session.live_time();
        self.session.sync_live(&mut self.scene, live_time);
        self.scene.render_frame()?;

        // Materials attach after the first presented frame.
        if !self.scene.materials_attached() {
            self.scene.attach_materials();
        }

        if self.session.scheduler.is_running() {
            if let Err(err) = self.session.drive_exports(&mut self.scene, live_time) {
                warn!(error = %err, "export stopped; preview continues");
            }
        }
        Ok(())
    }
}
