//! Pure pixel/tile/cell conversions for the unbounded canvas.
//!
//! All pixel math is signed: tile coordinates run negative in both axes, so
//! divisions must floor toward negative infinity rather than truncate.

use mural_proto::{CellCoord, TILE_COLS, TILE_ROWS, TileCoord};
use serde::{Deserialize, Serialize};

/// A point (or extent) in container pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i64,
    pub y: i64,
}

impl PixelPoint {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// An absolute cell address: tile plus cell within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbsoluteCell {
    pub tile: TileCoord,
    pub cell: CellCoord,
}

impl AbsoluteCell {
    pub const fn new(tile: TileCoord, cell: CellCoord) -> Self {
        Self { tile, cell }
    }
}

/// A direction on the canvas, used for cursor motion and for growing the
/// materialized window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Inclusive tile-coordinate rectangle: `[min_y, max_y] x [min_x, max_x]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub min_y: i64,
    pub min_x: i64,
    pub max_y: i64,
    pub max_x: i64,
}

impl TileRect {
    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.y >= self.min_y
            && coord.y <= self.max_y
            && coord.x >= self.min_x
            && coord.x <= self.max_x
    }

    /// Number of tiles covered.
    pub fn count(&self) -> usize {
        ((self.max_y - self.min_y + 1) * (self.max_x - self.min_x + 1)) as usize
    }

    /// All coordinates in the rectangle, top-to-bottom then left-to-right.
    /// The order is deterministic so window renders are idempotent.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + use<> {
        let (min_x, max_x) = (self.min_x, self.max_x);
        (self.min_y..=self.max_y)
            .flat_map(move |y| (min_x..=max_x).map(move |x| TileCoord::new(y, x)))
    }
}

fn floor_div(value: i64, divisor: i64) -> i64 {
    let quotient = value / divisor;
    if value % divisor != 0 && (value < 0) != (divisor < 0) {
        quotient - 1
    } else {
        quotient
    }
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
    -floor_div(-value, divisor)
}

/// Fixed pixel geometry of the grid, derived from character metrics measured
/// by the embedding layer. Row/column counts come from the wire contract.
#[derive(Debug, Clone, Copy)]
pub struct GridGeometry {
    char_width: i64,
    char_height: i64,
    tile_width: i64,
    tile_height: i64,
}

impl GridGeometry {
    pub fn new(char_width: i64, char_height: i64) -> Self {
        assert!(char_width > 0 && char_height > 0, "character metrics must be positive");
        Self {
            char_width,
            char_height,
            tile_width: char_width * TILE_COLS as i64,
            tile_height: char_height * TILE_ROWS as i64,
        }
    }

    pub fn char_width(&self) -> i64 {
        self.char_width
    }

    pub fn char_height(&self) -> i64 {
        self.char_height
    }

    pub fn tile_width(&self) -> i64 {
        self.tile_width
    }

    pub fn tile_height(&self) -> i64 {
        self.tile_height
    }

    /// Pixel origin of a tile, given the current world-origin offset.
    pub fn tile_origin(&self, tile: TileCoord, offset: PixelPoint) -> PixelPoint {
        PixelPoint::new(
            tile.x * self.tile_width + offset.x,
            tile.y * self.tile_height + offset.y,
        )
    }

    /// Tile containing a pixel position.
    pub fn tile_at(&self, position: PixelPoint, offset: PixelPoint) -> TileCoord {
        TileCoord::new(
            floor_div(position.y - offset.y, self.tile_height),
            floor_div(position.x - offset.x, self.tile_width),
        )
    }

    /// Cell containing a pixel position.
    pub fn cell_at(&self, position: PixelPoint, offset: PixelPoint) -> AbsoluteCell {
        let tile = self.tile_at(position, offset);
        let origin = self.tile_origin(tile, offset);
        let cell_x = (position.x - origin.x) / self.char_width;
        let cell_y = (position.y - origin.y) / self.char_height;
        AbsoluteCell::new(tile, CellCoord::new(cell_y as u8, cell_x as u8))
    }

    /// The tile rectangle that must be materialized for the given scroll
    /// position and viewport size: one tile of padding above and left of the
    /// visible region, two beyond it below and right, so coverage holds for
    /// any fractional scroll alignment.
    pub fn mandatory_window(
        &self,
        scroll: PixelPoint,
        viewport: PixelPoint,
        offset: PixelPoint,
    ) -> TileRect {
        let min_vis_y = floor_div(scroll.y - offset.y, self.tile_height);
        let min_vis_x = floor_div(scroll.x - offset.x, self.tile_width);
        let num_down = ceil_div(viewport.y, self.tile_height);
        let num_across = ceil_div(viewport.x, self.tile_width);
        TileRect {
            min_y: min_vis_y - 1,
            min_x: min_vis_x - 1,
            max_y: min_vis_y + num_down + 2,
            max_x: min_vis_x + num_across + 2,
        }
    }

    /// Tile-unit coordinates of the viewport center, as fractions.
    pub fn center_tiles(&self, scroll: PixelPoint, viewport: PixelPoint, offset: PixelPoint) -> (f64, f64) {
        let min_vis_y = (scroll.y - offset.y) as f64 / self.tile_height as f64;
        let min_vis_x = (scroll.x - offset.x) as f64 / self.tile_width as f64;
        let num_down = viewport.y as f64 / self.tile_height as f64;
        let num_across = viewport.x as f64 / self.tile_width as f64;
        (min_vis_y + num_down / 2.0, min_vis_x + num_across / 2.0)
    }
}
