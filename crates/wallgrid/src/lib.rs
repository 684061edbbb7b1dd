//! Core lifecycle logic for the gif wall: the bounded-concurrency download
//! queue and the scrolling grid of lazily loaded cells.
//!
//! The crate is deliberately free of GPU and HTTP dependencies so the whole
//! lifecycle can be driven deterministically in tests. The flow per frame:
//!
//! ```text
//!   render loop ──▶ Grid::tick ──▶ DownloadQueue::poll ──▶ completions
//!                        │                ▲                     │
//!                        │                │ submit              ▼
//!                        └─▶ row maintenance ──▶ skip policy ─▶ Cell
//! ```
//!
//! Rows request at most one cell at a time; the queue caps concurrent fetches
//! globally and admits pending work strictly in submission order. Fetches run
//! on worker threads behind the [`FetchImage`] trait and report back over a
//! channel, so every piece of grid state is only ever touched from the thread
//! driving [`Grid::tick`].

pub mod gif;
pub mod grid;
pub mod policy;
pub mod queue;
pub mod stars;

pub use gif::{decode_image, DecodeError, GifFrame, GifImage};
pub use grid::{Cell, CellDraw, CellId, Grid};
pub use policy::Sampler;
pub use queue::{
    DownloadQueue, DownloadTask, FetchError, FetchImage, RowId, TaskCompletion,
    MAX_CONCURRENT_DOWNLOADS,
};
pub use stars::{Star, Starfield};
