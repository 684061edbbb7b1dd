//! GPU plumbing for the gif wall.
//!
//! - `context` owns wgpu instance/device/surface wiring and knows how to
//!   rebuild swapchain state when the window resizes.
//! - `pipeline` holds the three render pipelines (textured cells, solid
//!   stars, CRT post-process) and their WGSL sources.
//! - `textures` caches per-cell frame textures keyed by cell identity,
//!   pruned as the grid evicts cells.
//! - `state` glues everything together and exposes the `GpuState` API the
//!   window loop drives once per frame.

mod context;
mod pipeline;
mod state;
mod textures;

pub(crate) use state::GpuState;
