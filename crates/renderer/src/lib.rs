//! Presentation layer for the gif wall.
//!
//! The wall is drawn into a fixed-width offscreen buffer, then stretched
//! onto the window through the CRT post-process. The flow per frame:
//!
//! ```text
//!   winit event loop ──▶ WallState::tick ──▶ Grid / Starfield updates
//!            │
//!            └─▶ WallState::render_frame ──▶ GpuState::render
//!                       (cell quads ▸ star quads ▸ CRT pass ▸ present)
//! ```
//!
//! `WallState` owns the grid, the starfield, and the GPU resources;
//! [`Renderer`] is the thin entry point that builds the window and drives
//! the event loop at the fixed target frame rate.

mod gpu;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use wallgrid::{Grid, Sampler, Starfield};

use crate::gpu::GpuState;

/// The offscreen buffer never exceeds this width; wider windows render at
/// buffer resolution and stretch. Keeps the cell count (and the download
/// churn) bounded on very wide displays.
pub const MAX_BUFFER_WIDTH: u32 = 1920;

/// Frame rate the pan speed and fade timings are tuned for.
pub const TARGET_FPS: f32 = 60.0;

/// Offscreen buffer size for a window: width clamped to
/// [`MAX_BUFFER_WIDTH`], height scaled to preserve the window's aspect.
pub fn buffer_size(window: (u32, u32)) -> (u32, u32) {
    let width = window.0.max(1);
    let height = window.1.max(1);
    let buffer_width = width.min(MAX_BUFFER_WIDTH);
    let scale = f64::from(width) / f64::from(buffer_width);
    let buffer_height = ((f64::from(height) / scale).floor() as u32).max(1);
    (buffer_width, buffer_height)
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub window_size: (u32, u32),
    /// Whether the CRT post-process runs; a plain blit otherwise.
    pub crt_filter: bool,
    /// Frame pacing target.
    pub target_fps: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window_size: (1280, 720),
            crt_filter: true,
            target_fps: TARGET_FPS,
        }
    }
}

/// Entry point owning the chosen configuration; the heavy lifting lives in
/// [`WallState`].
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Opens the window and drives the event loop until close. Takes
    /// ownership of the wall: the grid, the starfield, and the random
    /// source every probabilistic decision draws from.
    pub fn run(self, grid: Grid, stars: Starfield, sampler: Box<dyn Sampler>) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to initialize event loop")?;
        let window_size = PhysicalSize::new(self.config.window_size.0, self.config.window_size.1);
        let window = WindowBuilder::new()
            .with_title("gifwall")
            .with_inner_size(window_size)
            .build(&event_loop)
            .context("failed to create window")?;
        let window = Arc::new(window);

        let mut state = WallState::new(window.clone(), &self.config, grid, stars, sampler)?;
        state.window().request_redraw();

        let frame_interval = Duration::from_secs_f32(1.0 / self.config.target_fps.max(1.0));
        let mut next_frame = Instant::now();

        event_loop
            .run(move |event, elwt| {
                elwt.set_control_flow(ControlFlow::WaitUntil(next_frame));

                match event {
                    Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
                        match event {
                            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                                elwt.exit();
                            }
                            WindowEvent::Resized(new_size) => {
                                state.resize(new_size);
                            }
                            WindowEvent::ScaleFactorChanged {
                                mut inner_size_writer,
                                ..
                            } => {
                                // Keep the current logical size when the scale factor changes.
                                let _ = inner_size_writer.request_inner_size(state.size());
                            }
                            WindowEvent::RedrawRequested => {
                                let now = Instant::now();
                                state.tick(now);
                                match state.render_frame(now) {
                                    Ok(()) => {}
                                    Err(
                                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                                    ) => {
                                        state.resize(state.size());
                                    }
                                    Err(wgpu::SurfaceError::OutOfMemory) => {
                                        tracing::error!("surface out of memory; exiting");
                                        elwt.exit();
                                    }
                                    Err(wgpu::SurfaceError::Timeout) => {
                                        tracing::warn!("surface timeout; retrying next frame");
                                    }
                                    Err(other) => {
                                        tracing::warn!(
                                            "surface error: {other:?}; retrying next frame"
                                        );
                                    }
                                }
                                next_frame = now + frame_interval;
                            }
                            _ => {}
                        }
                    }
                    Event::AboutToWait => {
                        if Instant::now() >= next_frame {
                            state.window().request_redraw();
                        }
                    }
                    _ => {}
                }
            })
            .map_err(|err| anyhow!("event loop error: {err}"))
    }
}

/// Aggregates the window, the GPU resources, and the wall state the loop
/// mutates every frame.
struct WallState {
    window: Arc<Window>,
    gpu: GpuState,
    grid: Grid,
    stars: Starfield,
    sampler: Box<dyn Sampler>,
    last_stats: Instant,
}

impl WallState {
    fn new(
        window: Arc<Window>,
        config: &RendererConfig,
        grid: Grid,
        stars: Starfield,
        sampler: Box<dyn Sampler>,
    ) -> Result<Self> {
        let size = window.inner_size();
        let gpu = GpuState::new(
            window.as_ref(),
            size,
            buffer_size((size.width, size.height)),
            config.crt_filter,
        )?;
        Ok(Self {
            window,
            gpu,
            grid,
            stars,
            sampler,
            last_stats: Instant::now(),
        })
    }

    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn size(&self) -> PhysicalSize<u32> {
        self.gpu.size()
    }

    /// Resizes the swapchain and offscreen buffer, then rebuilds the wall
    /// for the new viewport. Row layout is rerandomized on purpose.
    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let buffer = buffer_size((new_size.width, new_size.height));
        self.gpu.resize(new_size, buffer);
        let viewport = (buffer.0 as f32, buffer.1 as f32);
        self.grid.rebuild(viewport, self.sampler.as_mut());
        self.stars.rebuild(viewport, self.sampler.as_mut());
    }

    fn tick(&mut self, now: Instant) {
        self.grid.tick(now, self.sampler.as_mut());
        self.stars.tick(self.sampler.as_mut());

        if now.duration_since(self.last_stats) >= Duration::from_secs(5) {
            let (active, pending) = self.grid.download_stats();
            tracing::debug!(
                cells = self.grid.cell_count(),
                active,
                pending,
                "wall stats"
            );
            self.last_stats = now;
        }
    }

    fn render_frame(&mut self, now: Instant) -> Result<(), wgpu::SurfaceError> {
        let cells = self.grid.draw_cells(now);
        self.gpu.render(&cells, self.stars.stars())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_matches_small_windows_exactly() {
        assert_eq!(buffer_size((1280, 720)), (1280, 720));
        assert_eq!(buffer_size((1920, 1080)), (1920, 1080));
    }

    #[test]
    fn buffer_width_clamps_and_preserves_aspect() {
        assert_eq!(buffer_size((3840, 2160)), (1920, 1080));
        let (w, h) = buffer_size((2560, 1440));
        assert_eq!(w, 1920);
        assert_eq!(h, 1080);
    }

    #[test]
    fn degenerate_windows_stay_positive() {
        assert_eq!(buffer_size((0, 0)), (1, 1));
    }
}
