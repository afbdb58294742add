//! Sparse tile storage and the viewport window that decides what exists.
//!
//! Only a window of the unbounded canvas is ever materialized. Growth toward
//! high coordinates is free; growth toward low coordinates has no
//! pre-allocated pixel room, so every stored tile origin and the scroll
//! position shift together by one block, leaving screen-space rendering
//! untouched. That rebase is the most delicate invariant here: it must land
//! as a single atomic step with no intervening paint.

use std::collections::HashMap;

use mural_proto::TileCoord;
use thiserror::Error;
use tracing::debug;

use crate::coords::{AbsoluteCell, Direction, GridGeometry, PixelPoint, TileRect};
use crate::surface::WorldSurface;
use crate::world::tile::{RenderContext, Tile};

/// Tiles per rebase block: one left/top expansion adds this many tiles of
/// pixel room.
pub const BLOCK_TILES: i64 = 5;

/// A sweep becomes due after this many tile creations.
const SWEEP_EVERY: u64 = 1000;

/// Eviction hysteresis: sweeps are no-ops until the store holds this many
/// times the mandatory window's tile count.
const EVICT_FACTOR: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("requested {requested}px of room but one block is only {block}px; large jumps need the teleport path")]
    JumpTooLarge { requested: i64, block: i64 },
}

/// Sparse mapping of tile coordinates to materialized tiles.
#[derive(Debug, Default)]
pub struct TileStore {
    tiles: HashMap<TileCoord, Tile>,
    created: u64,
    generation: u64,
    sweep_due: bool,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        self.tiles.contains_key(&coord)
    }

    pub fn get(&self, coord: TileCoord) -> Option<&Tile> {
        self.tiles.get(&coord)
    }

    pub fn get_mut(&mut self, coord: TileCoord) -> Option<&mut Tile> {
        self.tiles.get_mut(&coord)
    }

    /// Record a freshly created tile. Recording the same coordinate twice is
    /// a programming error, never reachable through `ensure_tile`.
    fn insert(&mut self, tile: Tile) {
        let coord = tile.coord();
        let previous = self.tiles.insert(coord, tile);
        assert!(previous.is_none(), "recording tile {coord} twice");
        self.created += 1;
        if self.created % SWEEP_EVERY == 0 {
            self.sweep_due = true;
        }
    }

    /// Whether enough creations have accumulated to warrant a sweep.
    pub fn take_sweep_due(&mut self) -> bool {
        std::mem::take(&mut self.sweep_due)
    }

    fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn shift_all(&mut self, dx: i64, dy: i64) {
        for tile in self.tiles.values_mut() {
            tile.shift_origin(dx, dy);
        }
    }

    fn sweep<S: WorldSurface>(&mut self, generation: u64, surface: &mut S) {
        self.tiles.retain(|coord, tile| {
            if tile.needed_at() == generation {
                true
            } else {
                surface.tile_removed(*coord);
                false
            }
        });
    }
}

/// Owns the scroll state and decides which tiles must exist.
#[derive(Debug)]
pub struct ViewportController {
    offset: PixelPoint,
    scroll: PixelPoint,
    size: PixelPoint,
    last_window: Option<TileRect>,
    /// High-water mark of allocated pixel room; never shrinks.
    extent: PixelPoint,
}

impl ViewportController {
    /// The world origin starts centered in the container, as far from the
    /// scroll boundaries as the initial allocation allows.
    pub fn new(size: PixelPoint) -> Self {
        Self {
            offset: PixelPoint::new(size.x / 2, size.y / 2),
            scroll: PixelPoint::default(),
            size,
            last_window: None,
            extent: size,
        }
    }

    pub fn offset(&self) -> PixelPoint {
        self.offset
    }

    pub fn scroll(&self) -> PixelPoint {
        self.scroll
    }

    pub fn size(&self) -> PixelPoint {
        self.size
    }

    pub fn resize(&mut self, size: PixelPoint) {
        self.size = size;
        self.extent.x = self.extent.x.max(size.x);
        self.extent.y = self.extent.y.max(size.y);
        self.last_window = None;
    }

    /// The rectangle of tiles that must be materialized right now.
    pub fn window(&self, geom: &GridGeometry) -> TileRect {
        geom.mandatory_window(self.scroll, self.size, self.offset)
    }

    /// Every coordinate in the current window, in row-major order.
    pub fn mandatory_tiles(&self, geom: &GridGeometry) -> impl Iterator<Item = TileCoord> + use<> {
        self.window(geom).iter()
    }

    /// Get-or-create the tile at `coord`. Creation places a blank,
    /// not-yet-loaded tile at its computed pixel origin, even outside the
    /// mandatory window (cursor travel may briefly outrun the viewport).
    pub fn ensure_tile<'s, S: WorldSurface>(
        &mut self,
        store: &'s mut TileStore,
        geom: &GridGeometry,
        ctx: &RenderContext,
        coord: TileCoord,
        surface: &mut S,
    ) -> &'s mut Tile {
        if !store.contains(coord) {
            let origin = geom.tile_origin(coord, self.offset);
            store.insert(Tile::new(coord, origin, ctx));
            surface.tile_created(coord, origin);
            self.extent.x = self.extent.x.max(origin.x + geom.tile_width());
            self.extent.y = self.extent.y.max(origin.y + geom.tile_height());
        }
        store.get_mut(coord).expect("tile just ensured")
    }

    /// Materialize the mandatory window. No-op when the window rectangle is
    /// identical to the previous call. Returns whether work was done.
    pub fn render_mandatory<S: WorldSurface>(
        &mut self,
        store: &mut TileStore,
        geom: &GridGeometry,
        ctx: &RenderContext,
        surface: &mut S,
    ) -> bool {
        let window = self.window(geom);
        if self.last_window == Some(window) {
            return false;
        }
        self.last_window = Some(window);
        for coord in window.iter() {
            self.ensure_tile(store, geom, ctx, coord, surface);
        }
        true
    }

    /// Make at least `min_pixels` of new room in `direction`.
    ///
    /// Toward the top or left this rebases: every stored tile origin, the
    /// world offset, and the scroll position all move by one block so the
    /// on-screen rendering is unchanged. Requests larger than a block fail;
    /// big coordinate jumps are a teleport, not a scroll.
    ///
    /// Toward the bottom or right coordinates grow unbounded with nothing to
    /// protect, so this just materializes a tile a block past the window
    /// corner and reports zero added room.
    pub fn expand_room<S: WorldSurface>(
        &mut self,
        store: &mut TileStore,
        geom: &GridGeometry,
        ctx: &RenderContext,
        direction: Direction,
        min_pixels: i64,
        surface: &mut S,
    ) -> Result<i64, RoomError> {
        match direction {
            Direction::Left | Direction::Up => {
                let block = match direction {
                    Direction::Left => geom.tile_width() * BLOCK_TILES,
                    _ => geom.tile_height() * BLOCK_TILES,
                };
                if min_pixels > block {
                    return Err(RoomError::JumpTooLarge {
                        requested: min_pixels,
                        block,
                    });
                }
                let (dx, dy) = match direction {
                    Direction::Left => (block, 0),
                    _ => (0, block),
                };
                self.offset.x += dx;
                self.offset.y += dy;
                store.shift_all(dx, dy);
                self.scroll.x += dx;
                self.scroll.y += dy;
                self.extent.x += dx;
                self.extent.y += dy;
                debug!(?direction, block, "rebased tiles for new room");
                surface.tiles_rebased(dx, dy, self.scroll);
                Ok(block)
            }
            Direction::Right | Direction::Down => {
                let window = self.window(geom);
                let corner =
                    TileCoord::new(window.max_y + BLOCK_TILES, window.max_x + BLOCK_TILES);
                self.ensure_tile(store, geom, ctx, corner, surface);
                Ok(0)
            }
        }
    }

    /// Scroll by a pixel delta, growing room at whichever edge the motion
    /// would overrun.
    pub fn scroll_by<S: WorldSurface>(
        &mut self,
        store: &mut TileStore,
        geom: &GridGeometry,
        ctx: &RenderContext,
        dx: i64,
        dy: i64,
        surface: &mut S,
    ) -> Result<(), RoomError> {
        let mut new_x = self.scroll.x + dx;
        if new_x < 0 {
            new_x += self.expand_room(store, geom, ctx, Direction::Left, -new_x, surface)?;
        } else {
            let room = self.extent.x - new_x - self.size.x;
            if room < 0 {
                self.expand_room(store, geom, ctx, Direction::Right, -room, surface)?;
            }
        }
        self.scroll.x = new_x;

        let mut new_y = self.scroll.y + dy;
        if new_y < 0 {
            new_y += self.expand_room(store, geom, ctx, Direction::Up, -new_y, surface)?;
        } else {
            let room = self.extent.y - new_y - self.size.y;
            if room < 0 {
                self.expand_room(store, geom, ctx, Direction::Down, -room, surface)?;
            }
        }
        self.scroll.y = new_y;

        surface.scrolled(self.scroll);
        Ok(())
    }

    /// Scroll just enough to bring `cell` fully on screen (only the right
    /// and bottom edges matter: typing advances that way).
    pub fn ensure_cell_visible<S: WorldSurface>(
        &mut self,
        store: &mut TileStore,
        geom: &GridGeometry,
        ctx: &RenderContext,
        cell: AbsoluteCell,
        surface: &mut S,
    ) -> Result<(), RoomError> {
        let origin = geom.tile_origin(cell.tile, self.offset);
        let left = origin.x + cell.cell.x as i64 * geom.char_width();
        let top = origin.y + cell.cell.y as i64 * geom.char_height();
        let overflow_x = (left + geom.char_width()) - (self.scroll.x + self.size.x);
        let overflow_y = (top + geom.char_height()) - (self.scroll.y + self.size.y);
        let step_x = if overflow_x > 0 {
            ((overflow_x + geom.char_width() - 1) / geom.char_width()) * geom.char_width()
        } else {
            0
        };
        let step_y = if overflow_y > 0 {
            ((overflow_y + geom.char_height() - 1) / geom.char_height()) * geom.char_height()
        } else {
            0
        };
        if step_x != 0 || step_y != 0 {
            self.scroll_by(store, geom, ctx, step_x, step_y, surface)?;
        }
        Ok(())
    }

    /// Remove every materialized tile outside the mandatory window, but only
    /// once the store holds at least three windows' worth of tiles.
    pub fn evict<S: WorldSurface>(
        &mut self,
        store: &mut TileStore,
        geom: &GridGeometry,
        surface: &mut S,
    ) {
        let window = self.window(geom);
        let required = window.count();
        if store.len() < EVICT_FACTOR * required {
            return;
        }
        let generation = store.bump_generation();
        for coord in window.iter() {
            if let Some(tile) = store.get_mut(coord) {
                tile.mark_needed(generation);
            }
        }
        let before = store.len();
        store.sweep(generation, surface);
        debug!(evicted = before - store.len(), kept = store.len(), "swept tiles");
    }

    /// User-facing coordinates of the viewport center: tile units scaled
    /// down by four, with the y axis inverted to read naturally.
    pub fn center_user_coords(&self, geom: &GridGeometry) -> (i64, i64) {
        let (center_y, center_x) = geom.center_tiles(self.scroll, self.size, self.offset);
        (-((center_y / 4.0).floor() as i64), (center_x / 4.0).floor() as i64)
    }

    /// Fractional tile coordinates of the viewport center.
    pub fn center_tiles(&self, geom: &GridGeometry) -> (f64, f64) {
        geom.center_tiles(self.scroll, self.size, self.offset)
    }
}
