//! The scrolling grid: rows of cells panning at independent speeds, loading
//! ahead of the visible window and evicting behind it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::gif::GifImage;
use crate::policy::{self, Sampler};
use crate::queue::{DownloadQueue, DownloadTask, RowId, TaskCompletion};

/// Base cell height; each row adds its own random jitter on top.
pub const BASE_CELL_HEIGHT: f32 = 60.0;
pub const ROW_HEIGHT_JITTER: f32 = 50.0;
/// Gap between cells in a row and between rows.
pub const CELL_PADDING: f32 = 8.0;
/// Horizontal pan in pixels per tick, tuned for the fixed 60 FPS loop.
pub const PAN_SPEED: f32 = 0.5;
/// Cells fade from transparent to opaque over this window after loading.
pub const FADE_IN: Duration = Duration::from_millis(200);

const SPEED_MUL_MIN: f32 = 1.0;
const SPEED_MUL_MAX: f32 = 2.5;

/// Identity of one loaded cell, stable for its lifetime. The renderer keys
/// its texture cache on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

/// One loaded image slot. Cells only exist once their image has arrived;
/// while a download is in flight the owning row carries a pending marker
/// instead.
pub struct Cell {
    id: CellId,
    width: f32,
    height: f32,
    image: Arc<GifImage>,
    loaded_at: Instant,
}

impl Cell {
    /// Opacity ramp: 0 at load, fully opaque once [`FADE_IN`] has passed.
    pub fn opacity(&self, now: Instant) -> u8 {
        let elapsed = now.saturating_duration_since(self.loaded_at);
        if elapsed >= FADE_IN {
            return 255;
        }
        (elapsed.as_secs_f32() / FADE_IN.as_secs_f32() * 255.0) as u8
    }

    pub fn width(&self) -> f32 {
        self.width
    }
}

struct Row {
    id: RowId,
    cells: VecDeque<Cell>,
    height: f32,
    /// Top edge relative to the grid, fixed when the row is built.
    y: f32,
    /// Cumulative width (plus padding) of everything evicted so far; keeps
    /// the remaining cells' absolute positions stable without re-indexing.
    offset_x: f32,
    speed_mul: f32,
    pending: bool,
}

impl Row {
    fn content_width(&self) -> f32 {
        let mut width = 0.0;
        for (idx, cell) in self.cells.iter().enumerate() {
            if idx > 0 {
                width += CELL_PADDING;
            }
            width += cell.width;
        }
        width
    }

    /// Drops cells whose right edge has scrolled past the trailing edge,
    /// folding their width into `offset_x`.
    fn evict_offscreen(&mut self, row_pan_x: f32) {
        while let Some(cell) = self.cells.front() {
            if self.offset_x + cell.width >= row_pan_x {
                break;
            }
            self.offset_x += cell.width + CELL_PADDING;
            self.cells.pop_front();
        }
    }
}

/// Everything the renderer needs to draw one cell this frame.
pub struct CellDraw {
    pub id: CellId,
    pub image: Arc<GifImage>,
    pub frame: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub opacity: u8,
}

pub struct Grid {
    rows: Vec<Row>,
    viewport_width: f32,
    viewport_height: f32,
    total_rows_height: f32,
    offset_y: f32,
    pan_x: f32,
    urls: Vec<String>,
    queue: DownloadQueue,
    next_row_id: u64,
    next_cell_id: u64,
}

impl Grid {
    pub fn new(
        urls: Vec<String>,
        queue: DownloadQueue,
        viewport: (f32, f32),
        sampler: &mut dyn Sampler,
    ) -> Self {
        let mut grid = Self {
            rows: Vec::new(),
            viewport_width: 0.0,
            viewport_height: 0.0,
            total_rows_height: 0.0,
            offset_y: 0.0,
            pan_x: 0.0,
            urls,
            queue,
            next_row_id: 0,
            next_cell_id: 0,
        };
        grid.rebuild(viewport, sampler);
        grid
    }

    /// Clears all rows and regenerates them for a new viewport. Completions
    /// still in flight for the old rows are dropped when they arrive; their
    /// queue slots free up as usual.
    pub fn rebuild(&mut self, viewport: (f32, f32), sampler: &mut dyn Sampler) {
        self.viewport_width = viewport.0;
        self.viewport_height = viewport.1;
        self.rows.clear();
        self.total_rows_height = 0.0;

        while self.total_rows_height < self.viewport_height {
            let height = BASE_CELL_HEIGHT + sampler.range(0.0, ROW_HEIGHT_JITTER);
            let y = self.total_rows_height;
            self.total_rows_height += height + CELL_PADDING;
            let id = RowId(self.next_row_id);
            self.next_row_id += 1;
            self.rows.push(Row {
                id,
                cells: VecDeque::new(),
                height,
                y,
                offset_x: 0.0,
                speed_mul: sampler.range(SPEED_MUL_MIN, SPEED_MUL_MAX),
                pending: false,
            });
        }
        if !self.rows.is_empty() {
            self.total_rows_height -= CELL_PADDING;
        }
        self.offset_y = (self.viewport_height - self.total_rows_height) / 2.0;

        info!(rows = self.rows.len(), "grid initialized");
    }

    /// One frame of lifecycle work: advance the pan, apply finished
    /// downloads, then let each row top up and evict.
    pub fn tick(&mut self, now: Instant, sampler: &mut dyn Sampler) {
        self.pan_x += PAN_SPEED;

        let completions = self.queue.poll();
        for completion in completions {
            self.apply_completion(completion, now, sampler);
        }

        self.maintain_rows(sampler);
    }

    fn apply_completion(
        &mut self,
        completion: TaskCompletion,
        now: Instant,
        sampler: &mut dyn Sampler,
    ) {
        let Some(row) = self.rows.iter_mut().find(|row| row.id == completion.row) else {
            // Row went away in a rebuild while the fetch was in flight.
            return;
        };
        row.pending = false;

        let image = match completion.result {
            Ok(image) => image,
            Err(err) => {
                warn!(url = %completion.url, error = %err, "failed to load gif");
                return;
            }
        };

        if policy::should_skip_aspect(image.aspect_ratio(), sampler) {
            return;
        }

        let width = (row.height * image.aspect_ratio()).floor();
        let id = CellId(self.next_cell_id);
        self.next_cell_id += 1;
        row.cells.push_back(Cell {
            id,
            width,
            height: row.height,
            image,
            loaded_at: now,
        });
    }

    fn maintain_rows(&mut self, sampler: &mut dyn Sampler) {
        for row in &mut self.rows {
            let row_pan_x = self.pan_x * row.speed_mul;

            let buffered_right = row.offset_x + row.content_width();
            if buffered_right < self.viewport_width + row_pan_x && !row.pending {
                if let Some(url) = pick_url(&self.urls, sampler) {
                    if !policy::should_skip_url(&url, sampler) {
                        row.pending = true;
                        self.queue.submit(DownloadTask { row: row.id, url });
                    }
                    // a skipped draw leaves the row free to try again next tick
                }
            }

            row.evict_offscreen(row_pan_x);
        }
    }

    /// Flattens the grid into screen-space draws, stars excluded. Cells are
    /// emitted oldest-first per row, top row first.
    pub fn draw_cells(&self, now: Instant) -> Vec<CellDraw> {
        let mut draws = Vec::new();
        for row in &self.rows {
            let row_pan_x = self.pan_x * row.speed_mul;
            let mut x = 0.0;
            for cell in &row.cells {
                let elapsed = now.saturating_duration_since(cell.loaded_at);
                draws.push(CellDraw {
                    id: cell.id,
                    image: Arc::clone(&cell.image),
                    frame: cell.image.frame_at(elapsed),
                    x: row.offset_x + x - row_pan_x,
                    y: self.offset_y + row.y,
                    width: cell.width,
                    height: cell.height,
                    opacity: cell.opacity(now),
                });
                x += cell.width + CELL_PADDING;
            }
        }
        draws
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|row| row.cells.len()).sum()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// (active, pending) download counts, for periodic stats logging.
    pub fn download_stats(&self) -> (usize, usize) {
        (self.queue.active(), self.queue.pending())
    }
}

fn pick_url(urls: &[String], sampler: &mut dyn Sampler) -> Option<String> {
    if urls.is_empty() {
        return None;
    }
    let idx = (sampler.unit() * urls.len() as f32) as usize;
    Some(urls[idx.min(urls.len() - 1)].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gif::{GifFrame, GifImage};
    use crate::policy::Scripted;
    use crate::queue::{FetchError, FetchImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::thread;

    /// Resolves every fetch immediately with a fixed-size image.
    struct StubFetcher {
        width: u32,
        height: u32,
    }

    impl FetchImage for StubFetcher {
        fn fetch(&self, _url: &str) -> Result<GifImage, FetchError> {
            Ok(stub_image(self.width, self.height))
        }
    }

    /// Accepts every fetch and never resolves it within the test's lifetime.
    struct StalledFetcher;

    impl FetchImage for StalledFetcher {
        fn fetch(&self, _url: &str) -> Result<GifImage, FetchError> {
            thread::sleep(Duration::from_secs(3600));
            unreachable!("stalled fetches outlive the test");
        }
    }

    fn stub_image(width: u32, height: u32) -> GifImage {
        GifImage::from_frames(
            width,
            height,
            vec![GifFrame {
                delay: Duration::ZERO,
                rgba: vec![0; (width * height * 4) as usize],
            }],
        )
        .unwrap()
    }

    fn queue_with(fetcher: impl FetchImage + 'static) -> DownloadQueue {
        DownloadQueue::new(Arc::new(fetcher))
    }

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn rows_cover_the_viewport_before_centering() {
        let mut rng = seeded();
        let grid = Grid::new(
            Vec::new(),
            queue_with(StubFetcher {
                width: 10,
                height: 10,
            }),
            (800.0, 431.0),
            &mut rng,
        );

        assert!(grid.row_count() > 0);
        // the build loop overshoots the viewport before the trailing padding
        // is taken back off
        assert!(grid.total_rows_height + CELL_PADDING >= 431.0);
        assert_eq!(
            grid.offset_y,
            (431.0 - grid.total_rows_height) / 2.0
        );

        // cached row tops line up with the accumulated heights
        let mut expected_y = 0.0;
        for row in &grid.rows {
            assert_eq!(row.y, expected_y);
            expected_y += row.height + CELL_PADDING;
        }
    }

    #[test]
    fn empty_url_list_is_a_noop() {
        let mut rng = seeded();
        let mut grid = Grid::new(
            Vec::new(),
            queue_with(StubFetcher {
                width: 10,
                height: 10,
            }),
            (400.0, 200.0),
            &mut rng,
        );

        grid.tick(Instant::now(), &mut rng);
        let (active, pending) = grid.download_stats();
        assert_eq!((active, pending), (0, 0));
        assert_eq!(grid.cell_count(), 0);
    }

    #[test]
    fn at_most_one_inflight_load_per_row() {
        let mut rng = seeded();
        let mut grid = Grid::new(
            vec!["cat.gif".into()],
            queue_with(StalledFetcher),
            (400.0, 200.0),
            &mut rng,
        );
        let rows = grid.row_count();
        assert!(rows <= 10, "test expects every row to fit under the cap");

        for _ in 0..5 {
            grid.tick(Instant::now(), &mut rng);
        }

        let (active, pending) = grid.download_stats();
        assert_eq!(active + pending, rows, "exactly one task per row");
        assert!(grid.rows.iter().all(|row| row.pending));
    }

    #[test]
    fn loaded_cells_take_their_width_from_the_aspect_ratio() {
        let mut rng = seeded();
        // 120x60 resolves to ratio 2.0, well under every skip threshold
        let mut grid = Grid::new(
            vec!["cat.gif".into()],
            queue_with(StubFetcher {
                width: 120,
                height: 60,
            }),
            (200.0, 100.0),
            &mut rng,
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while grid.cell_count() == 0 {
            assert!(Instant::now() < deadline, "no cell loaded in time");
            grid.tick(Instant::now(), &mut rng);
            thread::sleep(Duration::from_millis(2));
        }

        let row = grid
            .rows
            .iter()
            .find(|row| !row.cells.is_empty())
            .expect("a row holds the loaded cell");
        let cell = &row.cells[0];
        assert_eq!(cell.width, (row.height * 2.0).floor());
        assert!(!row.pending, "completion cleared the marker");
    }

    #[test]
    fn guestbook_url_skips_without_submitting() {
        // one row: height and speed draws, then url pick, then the skip draw
        let mut sampler = Scripted::new(&[0.0, 0.0, 0.0, 0.4], 0.99);
        let mut grid = Grid::new(
            vec!["/api/gif/guestbook_spin.gif".into()],
            queue_with(StalledFetcher),
            (100.0, 10.0),
            &mut sampler,
        );
        assert_eq!(grid.row_count(), 1);

        grid.tick(Instant::now(), &mut sampler);

        let (active, pending) = grid.download_stats();
        assert_eq!((active, pending), (0, 0), "skip never reaches the queue");
        assert!(!grid.rows[0].pending);
    }

    #[test]
    fn wide_completion_skips_before_the_second_check_draws() {
        let mut sampler = Scripted::new(&[0.0, 0.0], 0.99);
        let mut grid = Grid::new(
            vec!["cat.gif".into()],
            queue_with(StalledFetcher),
            (100.0, 10.0),
            &mut sampler,
        );
        let row_id = grid.rows[0].id;
        grid.rows[0].pending = true;

        // ratio 5.0 trips the >3 check on a 0.15 draw; the >4 check never runs
        let mut aspect_sampler = Scripted::new(&[0.15], 0.99);
        grid.apply_completion(
            TaskCompletion {
                row: row_id,
                url: "cat.gif".into(),
                result: Ok(Arc::new(stub_image(300, 60))),
            },
            Instant::now(),
            &mut aspect_sampler,
        );

        assert_eq!(grid.cell_count(), 0);
        assert!(!grid.rows[0].pending, "skip released the row");
    }

    #[test]
    fn stale_completions_are_dropped() {
        let mut sampler = Scripted::new(&[0.0, 0.0], 0.99);
        let mut grid = Grid::new(
            vec!["cat.gif".into()],
            queue_with(StalledFetcher),
            (100.0, 10.0),
            &mut sampler,
        );

        grid.apply_completion(
            TaskCompletion {
                row: RowId(9999),
                url: "cat.gif".into(),
                result: Ok(Arc::new(stub_image(60, 60)))
            },
            Instant::now(),
            &mut sampler,
        );
        assert_eq!(grid.cell_count(), 0);
    }

    #[test]
    fn eviction_folds_width_into_the_offset() {
        let mut rng = seeded();
        let mut grid = Grid::new(
            Vec::new(),
            queue_with(StubFetcher {
                width: 10,
                height: 10,
            }),
            (400.0, 100.0),
            &mut rng,
        );

        let now = Instant::now();
        let row = &mut grid.rows[0];
        for (idx, width) in [100.0, 50.0, 70.0].into_iter().enumerate() {
            row.cells.push_back(Cell {
                id: CellId(idx as u64),
                width,
                height: row.height,
                image: Arc::new(stub_image(10, 10)),
                loaded_at: now,
            });
        }

        // pan just past the first cell's right edge
        row.evict_offscreen(105.0);
        assert_eq!(row.cells.len(), 2);
        assert_eq!(row.offset_x, 100.0 + CELL_PADDING);

        // evicting again at the same pan is a no-op
        row.evict_offscreen(105.0);
        assert_eq!(row.cells.len(), 2);
        assert_eq!(row.offset_x, 100.0 + CELL_PADDING);

        // the survivor's absolute position is unchanged: offset_x now starts
        // where the evicted cell used to end
        let draws = grid.draw_cells(now);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].x, 100.0 + CELL_PADDING - grid.pan_x * grid.rows[0].speed_mul);
    }

    #[test]
    fn fade_opacity_ramps_to_opaque() {
        let now = Instant::now();
        let cell = Cell {
            id: CellId(0),
            width: 10.0,
            height: 10.0,
            image: Arc::new(stub_image(10, 10)),
            loaded_at: now,
        };
        assert_eq!(cell.opacity(now), 0);
        let mid = cell.opacity(now + FADE_IN / 2);
        assert!((120..=135).contains(&mid), "roughly half opaque, got {mid}");
        assert_eq!(cell.opacity(now + FADE_IN), 255);
        assert_eq!(cell.opacity(now + FADE_IN * 10), 255);
    }

    #[test]
    fn rebuild_discards_rows_and_recenters() {
        let mut rng = seeded();
        let mut grid = Grid::new(
            Vec::new(),
            queue_with(StubFetcher {
                width: 10,
                height: 10,
            }),
            (400.0, 200.0),
            &mut rng,
        );
        let first_ids: Vec<_> = grid.rows.iter().map(|row| row.id).collect();

        grid.rebuild((800.0, 600.0), &mut rng);
        assert!(grid.total_rows_height + CELL_PADDING >= 600.0);
        for row in &grid.rows {
            assert!(
                !first_ids.contains(&row.id),
                "rebuilt rows get fresh identities"
            );
        }
    }
}
