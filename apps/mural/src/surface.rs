//! Narrow interfaces to the collaborators the engine drives but never
//! implements: the painting surface, the dropdown menu, and the
//! drag-to-scroll capture widget.

use mural_proto::{CellCoord, LinkTarget, TileCoord};

use crate::coords::{AbsoluteCell, PixelPoint};

/// Rendering boundary. The engine reports every visual consequence of state
/// changes through this trait; how cells are painted is not its concern.
///
/// Every method has a no-op default so implementations subscribe only to
/// what they draw.
pub trait WorldSurface {
    /// A blank, not-yet-loaded tile was materialized at `origin`.
    fn tile_created(&mut self, _tile: TileCoord, _origin: PixelPoint) {}

    /// First server state arrived; the "not yet loaded" marker goes away.
    fn tile_loaded(&mut self, _tile: TileCoord) {}

    /// The tile was evicted and its visual resource should be released.
    fn tile_removed(&mut self, _tile: TileCoord) {}

    /// Every materialized tile's stored origin moved by `(dx, dy)` and the
    /// scroll position moved in lockstep: one atomic step, screen-space
    /// positions unchanged, no intervening paint.
    fn tiles_rebased(&mut self, _dx: i64, _dy: i64, _scroll: PixelPoint) {}

    /// A cell's displayed character changed.
    fn cell_changed(&mut self, _tile: TileCoord, _cell: CellCoord, _ch: char, _highlight: bool) {}

    fn protection_changed(&mut self, _tile: TileCoord, _protected: bool) {}

    fn decorations_cleared(&mut self, _tile: TileCoord) {}

    fn decoration_set(&mut self, _tile: TileCoord, _cell: CellCoord, _link: &LinkTarget) {}

    /// The active cursor cell changed (or was unset).
    fn cursor_moved(&mut self, _cell: Option<AbsoluteCell>) {}

    fn scrolled(&mut self, _scroll: PixelPoint) {}

    /// User-facing center coordinates changed (only reported while the
    /// coordinate readout is enabled).
    fn center_changed(&mut self, _y: i64, _x: i64) {}

    /// Polling dropped to (or resumed from) the idle rate.
    fn paused(&mut self, _paused: bool) {}
}

/// Surface that draws nothing.
#[derive(Debug, Default)]
pub struct NullSurface;

impl WorldSurface for NullSurface {}

/// Commands the menu host hands back to the engine. Payload-carrying entries
/// go through the host's own modal dialogs first.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuCommand {
    ToggleCoordinates,
    GoToCoordinates { y: i64, x: i64 },
    BeginCoordLink { y: i64, x: i64 },
    BeginUrlLink { url: String },
    BeginProtect,
    BeginUnprotect,
}

/// The dropdown menu widget.
pub trait MenuHost {
    fn add_entry(&mut self, label: &str, command: MenuCommand);
    fn close(&mut self);
}

/// The drag-to-scroll capture widget. Stopped while a pick-a-cell flow is
/// armed so clicks reach the engine instead of starting a drag.
pub trait ScrollHost {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Scroll host that captures nothing.
#[derive(Debug, Default)]
pub struct NullScrollHost;

impl ScrollHost for NullScrollHost {
    fn start(&mut self) {}
    fn stop(&mut self) {}
}

/// Everything a [`WorldSurface`] can be told, as data. Useful for embedders
/// asserting on engine output without a real renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    TileCreated(TileCoord, PixelPoint),
    TileLoaded(TileCoord),
    TileRemoved(TileCoord),
    TilesRebased { dx: i64, dy: i64, scroll: PixelPoint },
    CellChanged { tile: TileCoord, cell: CellCoord, ch: char, highlight: bool },
    ProtectionChanged(TileCoord, bool),
    DecorationsCleared(TileCoord),
    DecorationSet(TileCoord, CellCoord, LinkTarget),
    CursorMoved(Option<AbsoluteCell>),
    Scrolled(PixelPoint),
    CenterChanged { y: i64, x: i64 },
    Paused(bool),
}

/// Surface that records every notification in order.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub events: Vec<SurfaceEvent>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Vec<SurfaceEvent> {
        std::mem::take(&mut self.events)
    }
}

impl WorldSurface for RecordingSurface {
    fn tile_created(&mut self, tile: TileCoord, origin: PixelPoint) {
        self.events.push(SurfaceEvent::TileCreated(tile, origin));
    }

    fn tile_loaded(&mut self, tile: TileCoord) {
        self.events.push(SurfaceEvent::TileLoaded(tile));
    }

    fn tile_removed(&mut self, tile: TileCoord) {
        self.events.push(SurfaceEvent::TileRemoved(tile));
    }

    fn tiles_rebased(&mut self, dx: i64, dy: i64, scroll: PixelPoint) {
        self.events.push(SurfaceEvent::TilesRebased { dx, dy, scroll });
    }

    fn cell_changed(&mut self, tile: TileCoord, cell: CellCoord, ch: char, highlight: bool) {
        self.events.push(SurfaceEvent::CellChanged {
            tile,
            cell,
            ch,
            highlight,
        });
    }

    fn protection_changed(&mut self, tile: TileCoord, protected: bool) {
        self.events
            .push(SurfaceEvent::ProtectionChanged(tile, protected));
    }

    fn decorations_cleared(&mut self, tile: TileCoord) {
        self.events.push(SurfaceEvent::DecorationsCleared(tile));
    }

    fn decoration_set(&mut self, tile: TileCoord, cell: CellCoord, link: &LinkTarget) {
        self.events
            .push(SurfaceEvent::DecorationSet(tile, cell, link.clone()));
    }

    fn cursor_moved(&mut self, cell: Option<AbsoluteCell>) {
        self.events.push(SurfaceEvent::CursorMoved(cell));
    }

    fn scrolled(&mut self, scroll: PixelPoint) {
        self.events.push(SurfaceEvent::Scrolled(scroll));
    }

    fn center_changed(&mut self, y: i64, x: i64) {
        self.events.push(SurfaceEvent::CenterChanged { y, x });
    }

    fn paused(&mut self, paused: bool) {
        self.events.push(SurfaceEvent::Paused(paused));
    }
}
