//! Active-cell navigation across tile boundaries.

use mural_proto::{CellCoord, TILE_COLS, TILE_ROWS, TileCoord};
use tracing::warn;

use crate::config::Capabilities;
use crate::coords::{AbsoluteCell, Direction, GridGeometry};
use crate::surface::WorldSurface;
use crate::world::store::{TileStore, ViewportController};
use crate::world::tile::RenderContext;

/// Holds at most one active absolute cell coordinate, plus the last clicked
/// cell (the column Enter returns to).
#[derive(Debug, Default)]
pub struct CursorController {
    selected: Option<AbsoluteCell>,
    last_click: Option<AbsoluteCell>,
}

impl CursorController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<AbsoluteCell> {
        self.selected
    }

    pub fn last_click(&self) -> Option<AbsoluteCell> {
        self.last_click
    }

    pub fn remember_click(&mut self, cell: AbsoluteCell) {
        self.last_click = Some(cell);
    }

    /// The cell one step in `direction`, wrapping across tile edges.
    pub fn step(from: AbsoluteCell, direction: Direction) -> AbsoluteCell {
        let AbsoluteCell { mut tile, mut cell } = from;
        match direction {
            Direction::Right => {
                if cell.x as usize == TILE_COLS - 1 {
                    tile = TileCoord::new(tile.y, tile.x + 1);
                    cell = CellCoord::new(cell.y, 0);
                } else {
                    cell = CellCoord::new(cell.y, cell.x + 1);
                }
            }
            Direction::Left => {
                if cell.x == 0 {
                    tile = TileCoord::new(tile.y, tile.x - 1);
                    cell = CellCoord::new(cell.y, (TILE_COLS - 1) as u8);
                } else {
                    cell = CellCoord::new(cell.y, cell.x - 1);
                }
            }
            Direction::Down => {
                if cell.y as usize == TILE_ROWS - 1 {
                    tile = TileCoord::new(tile.y + 1, tile.x);
                    cell = CellCoord::new(0, cell.x);
                } else {
                    cell = CellCoord::new(cell.y + 1, cell.x);
                }
            }
            Direction::Up => {
                if cell.y == 0 {
                    tile = TileCoord::new(tile.y - 1, tile.x);
                    cell = CellCoord::new((TILE_ROWS - 1) as u8, cell.x);
                } else {
                    cell = CellCoord::new(cell.y - 1, cell.x);
                }
            }
        }
        AbsoluteCell::new(tile, cell)
    }

    /// Move the cursor one cell, materializing the neighbor tile when the
    /// motion crosses a tile edge; cursor travel may briefly outrun the
    /// viewport. With no cursor set this is a silent no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn move_cursor<S: WorldSurface>(
        &mut self,
        direction: Direction,
        from: Option<AbsoluteCell>,
        store: &mut TileStore,
        viewport: &mut ViewportController,
        geom: &GridGeometry,
        ctx: &RenderContext,
        caps: Capabilities,
        surface: &mut S,
    ) -> Option<AbsoluteCell> {
        let from = from.or(self.selected)?;
        let target = Self::step(from, direction);
        viewport.ensure_tile(store, geom, ctx, target.tile, surface);
        self.select(target, store, viewport, geom, ctx, caps, surface);
        self.selected
    }

    /// Try to make `cell` the active cursor position. Requires an
    /// initialized tile, write capability, and (unless admin) an
    /// unprotected tile; otherwise the cursor ends up unset. Either way is
    /// an expected interaction outcome, not an error.
    #[allow(clippy::too_many_arguments)]
    pub fn select<S: WorldSurface>(
        &mut self,
        cell: AbsoluteCell,
        store: &mut TileStore,
        viewport: &mut ViewportController,
        geom: &GridGeometry,
        ctx: &RenderContext,
        caps: Capabilities,
        surface: &mut S,
    ) -> bool {
        self.selected = None;
        let allowed = match store.get(cell.tile) {
            Some(tile) => {
                tile.is_initted() && caps.can_write && (!tile.is_protected() || caps.can_admin)
            }
            None => false,
        };
        if allowed {
            if let Err(err) =
                viewport.ensure_cell_visible(store, geom, ctx, cell, surface)
            {
                warn!(%err, "could not scroll selection into view");
            }
            self.selected = Some(cell);
        }
        surface.cursor_moved(self.selected);
        allowed
    }

    pub fn clear<S: WorldSurface>(&mut self, surface: &mut S) {
        if self.selected.take().is_some() {
            surface.cursor_moved(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::PixelPoint;
    use crate::surface::RecordingSurface;

    fn writer() -> Capabilities {
        Capabilities {
            can_read: true,
            can_write: true,
            can_admin: false,
        }
    }

    fn setup() -> (
        GridGeometry,
        RenderContext,
        TileStore,
        ViewportController,
        CursorController,
        RecordingSurface,
    ) {
        (
            GridGeometry::new(10, 20),
            RenderContext::new(),
            TileStore::new(),
            ViewportController::new(PixelPoint::new(3200, 3200)),
            CursorController::new(),
            RecordingSurface::new(),
        )
    }

    fn init_tile(
        store: &mut TileStore,
        viewport: &mut ViewportController,
        geom: &GridGeometry,
        ctx: &mut RenderContext,
        coord: TileCoord,
        surface: &mut RecordingSurface,
    ) {
        viewport.ensure_tile(store, geom, ctx, coord, surface);
        store
            .get_mut(coord)
            .unwrap()
            .apply_server_state(None, ctx, surface, 0);
    }

    #[test]
    fn moving_right_from_the_edge_wraps_into_the_next_tile() {
        let (geom, mut ctx, mut store, mut viewport, mut cursor, mut surface) = setup();
        let origin = TileCoord::new(0, 0);
        init_tile(&mut store, &mut viewport, &geom, &mut ctx, origin, &mut surface);

        let edge = AbsoluteCell::new(origin, CellCoord::new(4, (TILE_COLS - 1) as u8));
        assert!(cursor.select(edge, &mut store, &mut viewport, &geom, &ctx, writer(), &mut surface));

        // The neighbor does not exist yet; the move materializes it, but the
        // uninitialized tile rejects selection.
        assert!(!store.contains(TileCoord::new(0, 1)));
        let landed = cursor.move_cursor(
            Direction::Right,
            None,
            &mut store,
            &mut viewport,
            &geom,
            &ctx,
            writer(),
            &mut surface,
        );
        assert!(store.contains(TileCoord::new(0, 1)));
        assert_eq!(landed, None);

        // Once the neighbor has server state the same move succeeds.
        store
            .get_mut(TileCoord::new(0, 1))
            .unwrap()
            .apply_server_state(None, &mut ctx, &mut surface, 0);
        cursor.select(edge, &mut store, &mut viewport, &geom, &ctx, writer(), &mut surface);
        let landed = cursor.move_cursor(
            Direction::Right,
            None,
            &mut store,
            &mut viewport,
            &geom,
            &ctx,
            writer(),
            &mut surface,
        );
        assert_eq!(
            landed,
            Some(AbsoluteCell::new(TileCoord::new(0, 1), CellCoord::new(4, 0)))
        );
    }

    #[test]
    fn moving_left_from_column_zero_wraps_to_the_previous_tile() {
        let start = AbsoluteCell::new(TileCoord::new(2, -1), CellCoord::new(3, 0));
        let stepped = CursorController::step(start, Direction::Left);
        assert_eq!(
            stepped,
            AbsoluteCell::new(TileCoord::new(2, -2), CellCoord::new(3, (TILE_COLS - 1) as u8))
        );
    }

    #[test]
    fn vertical_wraparound() {
        let bottom = AbsoluteCell::new(TileCoord::new(0, 0), CellCoord::new((TILE_ROWS - 1) as u8, 7));
        assert_eq!(
            CursorController::step(bottom, Direction::Down),
            AbsoluteCell::new(TileCoord::new(1, 0), CellCoord::new(0, 7))
        );
        let top = AbsoluteCell::new(TileCoord::new(0, 0), CellCoord::new(0, 7));
        assert_eq!(
            CursorController::step(top, Direction::Up),
            AbsoluteCell::new(TileCoord::new(-1, 0), CellCoord::new((TILE_ROWS - 1) as u8, 7))
        );
    }

    #[test]
    fn moving_with_no_cursor_is_a_silent_no_op() {
        let (geom, ctx, mut store, mut viewport, mut cursor, mut surface) = setup();
        let landed = cursor.move_cursor(
            Direction::Down,
            None,
            &mut store,
            &mut viewport,
            &geom,
            &ctx,
            writer(),
            &mut surface,
        );
        assert_eq!(landed, None);
        assert!(store.is_empty());
    }

    #[test]
    fn selection_requires_write_capability() {
        let (geom, mut ctx, mut store, mut viewport, mut cursor, mut surface) = setup();
        let coord = TileCoord::new(0, 0);
        init_tile(&mut store, &mut viewport, &geom, &mut ctx, coord, &mut surface);
        let cell = AbsoluteCell::new(coord, CellCoord::new(0, 0));
        assert!(!cursor.select(
            cell,
            &mut store,
            &mut viewport,
            &geom,
            &ctx,
            Capabilities::default(),
            &mut surface
        ));
        assert_eq!(cursor.selected(), None);
    }

    #[test]
    fn protected_tiles_admit_only_admins() {
        let (geom, mut ctx, mut store, mut viewport, mut cursor, mut surface) = setup();
        let coord = TileCoord::new(0, 0);
        init_tile(&mut store, &mut viewport, &geom, &mut ctx, coord, &mut surface);
        store.get_mut(coord).unwrap().set_protected(true, &mut surface);
        let cell = AbsoluteCell::new(coord, CellCoord::new(1, 1));

        assert!(!cursor.select(cell, &mut store, &mut viewport, &geom, &ctx, writer(), &mut surface));

        let admin = Capabilities {
            can_read: true,
            can_write: true,
            can_admin: true,
        };
        assert!(cursor.select(cell, &mut store, &mut viewport, &geom, &ctx, admin, &mut surface));
        assert_eq!(cursor.selected(), Some(cell));
    }
}
