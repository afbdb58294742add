//! Per-tile state: authoritative server content, locally typed but
//! unacknowledged characters, protection, and cell decorations.
//!
//! A tile resolves what to display cell by cell: the most recent pending
//! edit wins, otherwise the server-confirmed character. Server refreshes
//! diff against the displayed buffer so repaints touch only cells that
//! actually changed.

use std::collections::HashMap;

use mural_proto::{CellCoord, LinkTarget, TILE_CELLS, TileCoord, TileUpdate};
use thiserror::Error;
use tracing::trace;

use crate::coords::PixelPoint;
use crate::surface::WorldSurface;
use crate::sync::EditId;

/// Highlighted repaints allowed per second, across all tiles.
const HIGHLIGHT_BUDGET: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TileError {
    #[error("tile {0} has not received server state yet")]
    NotInitialized(TileCoord),
}

/// Session-scoped state shared by every tile: the highlight rate limiter and
/// the cached blank content. Passed into tile operations, never ambient.
#[derive(Debug)]
pub struct RenderContext {
    blank: Vec<char>,
    ink_second: i64,
    ink_spent: u32,
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            blank: vec![' '; TILE_CELLS],
            ink_second: 0,
            ink_spent: 0,
        }
    }

    pub fn blank(&self) -> &[char] {
        &self.blank
    }

    /// Whether one more repaint this second may carry a highlight. Excess
    /// repaints still apply, just without the highlight.
    fn try_highlight(&mut self, now_ms: i64) -> bool {
        let second = now_ms / 1000;
        if second != self.ink_second {
            self.ink_second = second;
            self.ink_spent = 0;
        }
        if self.ink_spent < HIGHLIGHT_BUDGET {
            self.ink_spent += 1;
            true
        } else {
            false
        }
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PendingEdit {
    id: EditId,
    ch: char,
    timestamp: i64,
}

/// One materialized tile.
#[derive(Debug)]
pub struct Tile {
    coord: TileCoord,
    origin: PixelPoint,
    /// Last server-confirmed content, always exactly `TILE_CELLS` chars.
    content: Vec<char>,
    /// What the surface currently shows, same length.
    displayed: Vec<char>,
    /// Unacknowledged local edits per cell index, oldest first.
    pending: HashMap<usize, Vec<PendingEdit>>,
    decorations: HashMap<usize, LinkTarget>,
    protected: bool,
    initted: bool,
    needed_at: u64,
}

impl Tile {
    pub fn new(coord: TileCoord, origin: PixelPoint, ctx: &RenderContext) -> Self {
        Self {
            coord,
            origin,
            content: ctx.blank().to_vec(),
            displayed: ctx.blank().to_vec(),
            pending: HashMap::new(),
            decorations: HashMap::new(),
            protected: false,
            initted: false,
            needed_at: 0,
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn origin(&self) -> PixelPoint {
        self.origin
    }

    pub fn shift_origin(&mut self, dx: i64, dy: i64) {
        self.origin.x += dx;
        self.origin.y += dy;
    }

    pub fn is_initted(&self) -> bool {
        self.initted
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn displayed_char(&self, cell: CellCoord) -> char {
        self.displayed[cell.index()]
    }

    pub fn displayed_string(&self) -> String {
        self.displayed.iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn mark_needed(&mut self, generation: u64) {
        self.needed_at = generation;
    }

    pub fn needed_at(&self) -> u64 {
        self.needed_at
    }

    /// Apply one fetched snapshot. `None` means the server has never stored
    /// this tile; that still initializes it (with blank content).
    pub fn apply_server_state<S: WorldSurface>(
        &mut self,
        update: Option<&TileUpdate>,
        ctx: &mut RenderContext,
        surface: &mut S,
        now_ms: i64,
    ) {
        let new_content = match update.and_then(|u| u.content.as_deref()) {
            Some(raw) => {
                let mut chars: Vec<char> = raw.chars().collect();
                chars.resize(TILE_CELLS, ' ');
                chars
            }
            None => ctx.blank().to_vec(),
        };

        let first = !self.initted;
        if first {
            self.initted = true;
            surface.tile_loaded(self.coord);
        }

        if first || new_content != self.content {
            for index in 0..TILE_CELLS {
                let resolved = match self.pending.get(&index).and_then(|edits| edits.last()) {
                    Some(edit) => edit.ch,
                    None => new_content[index],
                };
                if resolved != self.displayed[index] {
                    self.displayed[index] = resolved;
                    let highlight = !first && ctx.try_highlight(now_ms);
                    surface.cell_changed(
                        self.coord,
                        CellCoord::from_index(index),
                        resolved,
                        highlight,
                    );
                }
            }
            self.content = new_content;
        }

        let properties = update.map(|u| &u.properties);
        self.set_protected(
            properties.map(|p| p.protected).unwrap_or(false),
            surface,
        );
        let decorations: HashMap<usize, LinkTarget> = properties
            .map(|p| {
                p.cell_props
                    .iter()
                    .filter_map(|(key, props)| {
                        props.link.clone().map(|link| (key.0.index(), link))
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.set_cell_properties(decorations, surface);
    }

    /// Record a locally typed character and repaint its cell immediately.
    /// Only legal once the tile has received server state.
    pub fn record_local_edit<S: WorldSurface>(
        &mut self,
        cell: CellCoord,
        ch: char,
        timestamp: i64,
        id: EditId,
        surface: &mut S,
    ) -> Result<(), TileError> {
        if !self.initted {
            return Err(TileError::NotInitialized(self.coord));
        }
        let index = cell.index();
        self.pending
            .entry(index)
            .or_default()
            .push(PendingEdit { id, ch, timestamp });
        if self.displayed[index] != ch {
            self.displayed[index] = ch;
            surface.cell_changed(self.coord, cell, ch, false);
        }
        Ok(())
    }

    /// Close the earliest pending entry matching `(timestamp, ch)`. One ack
    /// closes at most one entry; an unmatched ack is a benign race (the tile
    /// may have been evicted and re-created since the edit was sent).
    pub fn acknowledge_edit(&mut self, cell: CellCoord, timestamp: i64, ch: char) {
        let index = cell.index();
        let Some(edits) = self.pending.get_mut(&index) else {
            trace!(tile = %self.coord, %cell, "ack for cell with no pending edits");
            return;
        };
        match edits
            .iter()
            .position(|edit| edit.timestamp == timestamp && edit.ch == ch)
        {
            Some(position) => {
                edits.remove(position);
                if edits.is_empty() {
                    self.pending.remove(&index);
                }
            }
            None => {
                trace!(tile = %self.coord, %cell, timestamp, "unmatched acknowledgement");
            }
        }
    }

    /// Idempotent protection toggle; the surface hears about changes only.
    pub fn set_protected<S: WorldSurface>(&mut self, protected: bool, surface: &mut S) {
        if protected == self.protected {
            return;
        }
        self.protected = protected;
        surface.protection_changed(self.coord, protected);
    }

    /// Replace the sparse decorations via full clear-and-reapply, skipped
    /// when the new map is structurally equal to the current one.
    pub fn set_cell_properties<S: WorldSurface>(
        &mut self,
        decorations: HashMap<usize, LinkTarget>,
        surface: &mut S,
    ) {
        if decorations == self.decorations {
            return;
        }
        surface.decorations_cleared(self.coord);
        let mut indices: Vec<&usize> = decorations.keys().collect();
        indices.sort();
        for &index in indices {
            surface.decoration_set(self.coord, CellCoord::from_index(index), &decorations[&index]);
        }
        self.decorations = decorations;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{RecordingSurface, SurfaceEvent};
    use crate::sync::EditQueue;
    use mural_proto::{CellKey, CellProps, Edit, TileProperties};

    fn blank_tile() -> (Tile, RenderContext) {
        let ctx = RenderContext::new();
        let tile = Tile::new(TileCoord::new(0, 0), PixelPoint::default(), &ctx);
        (tile, ctx)
    }

    fn update_with(content: &str) -> TileUpdate {
        TileUpdate {
            content: Some(content.to_string()),
            properties: TileProperties::default(),
        }
    }

    fn content_with(index: usize, ch: char) -> String {
        let mut chars = vec![' '; TILE_CELLS];
        chars[index] = ch;
        chars.into_iter().collect()
    }

    fn edit_id(queue: &mut EditQueue) -> EditId {
        queue.record(Edit {
            tile: TileCoord::new(0, 0),
            cell: CellCoord::new(0, 0),
            timestamp: 0,
            ch: ' ',
        })
    }

    #[test]
    fn first_apply_initializes_without_highlight() {
        let (mut tile, mut ctx) = blank_tile();
        let mut surface = RecordingSurface::new();
        tile.apply_server_state(Some(&update_with(&content_with(5, 'q'))), &mut ctx, &mut surface, 0);
        assert!(tile.is_initted());
        assert_eq!(surface.events[0], SurfaceEvent::TileLoaded(TileCoord::new(0, 0)));
        assert_eq!(
            surface.events[1],
            SurfaceEvent::CellChanged {
                tile: TileCoord::new(0, 0),
                cell: CellCoord::from_index(5),
                ch: 'q',
                highlight: false,
            }
        );
    }

    #[test]
    fn round_trip_with_no_pending_edits() {
        let (mut tile, mut ctx) = blank_tile();
        let mut surface = RecordingSurface::new();
        let content: String = ('a'..='z').cycle().take(TILE_CELLS).collect();
        tile.apply_server_state(Some(&update_with(&content)), &mut ctx, &mut surface, 0);
        assert_eq!(tile.displayed_string(), content);
    }

    #[test]
    fn null_content_means_blank() {
        let (mut tile, mut ctx) = blank_tile();
        let mut surface = RecordingSurface::new();
        tile.apply_server_state(None, &mut ctx, &mut surface, 0);
        assert!(tile.is_initted());
        assert_eq!(tile.displayed_string(), " ".repeat(TILE_CELLS));
    }

    #[test]
    fn pending_edit_wins_until_acknowledged() {
        let (mut tile, mut ctx) = blank_tile();
        let mut surface = RecordingSurface::new();
        let mut queue = EditQueue::new();
        tile.apply_server_state(None, &mut ctx, &mut surface, 0);

        let cell = CellCoord::new(2, 3);
        let id = edit_id(&mut queue);
        tile.record_local_edit(cell, 'Z', 41, id, &mut surface).unwrap();
        assert_eq!(tile.displayed_char(cell), 'Z');

        // A refresh reporting a different character does not clobber it.
        tile.apply_server_state(
            Some(&update_with(&content_with(cell.index(), 'w'))),
            &mut ctx,
            &mut surface,
            1_000,
        );
        assert_eq!(tile.displayed_char(cell), 'Z');

        // After the ack the next refresh shows the server's answer.
        tile.acknowledge_edit(cell, 41, 'Z');
        assert!(!tile.has_pending());
        tile.apply_server_state(
            Some(&update_with(&content_with(cell.index(), 'w'))),
            &mut ctx,
            &mut surface,
            2_000,
        );
        // Content was already 'w'; force a change to trigger the diff.
        tile.apply_server_state(
            Some(&update_with(&content_with(cell.index(), 'v'))),
            &mut ctx,
            &mut surface,
            3_000,
        );
        assert_eq!(tile.displayed_char(cell), 'v');
    }

    #[test]
    fn most_recent_pending_edit_displays_when_typing_fast() {
        let (mut tile, mut ctx) = blank_tile();
        let mut surface = RecordingSurface::new();
        let mut queue = EditQueue::new();
        tile.apply_server_state(None, &mut ctx, &mut surface, 0);

        let cell = CellCoord::new(0, 0);
        let first = edit_id(&mut queue);
        let second = edit_id(&mut queue);
        tile.record_local_edit(cell, 'a', 10, first, &mut surface).unwrap();
        tile.record_local_edit(cell, 'b', 20, second, &mut surface).unwrap();
        assert_eq!(tile.displayed_char(cell), 'b');

        tile.acknowledge_edit(cell, 10, 'a');
        assert!(tile.has_pending());
        tile.apply_server_state(
            Some(&update_with(&content_with(cell.index(), 'a'))),
            &mut ctx,
            &mut surface,
            1_000,
        );
        assert_eq!(tile.displayed_char(cell), 'b');
    }

    #[test]
    fn duplicate_acks_close_one_entry_each_oldest_first() {
        let (mut tile, mut ctx) = blank_tile();
        let mut surface = RecordingSurface::new();
        let mut queue = EditQueue::new();
        tile.apply_server_state(None, &mut ctx, &mut surface, 0);

        let cell = CellCoord::new(1, 1);
        let first = edit_id(&mut queue);
        let second = edit_id(&mut queue);
        tile.record_local_edit(cell, 'x', 99, first, &mut surface).unwrap();
        tile.record_local_edit(cell, 'x', 99, second, &mut surface).unwrap();

        tile.acknowledge_edit(cell, 99, 'x');
        assert!(tile.has_pending());
        tile.acknowledge_edit(cell, 99, 'x');
        assert!(!tile.has_pending());
        // A third identical ack is a benign no-op.
        tile.acknowledge_edit(cell, 99, 'x');
    }

    #[test]
    fn editing_uninitialized_tile_is_rejected() {
        let (mut tile, _ctx) = blank_tile();
        let mut surface = RecordingSurface::new();
        let mut queue = EditQueue::new();
        let id = edit_id(&mut queue);
        let err = tile
            .record_local_edit(CellCoord::new(0, 0), 'x', 1, id, &mut surface)
            .unwrap_err();
        assert_eq!(err, TileError::NotInitialized(TileCoord::new(0, 0)));
    }

    #[test]
    fn highlight_budget_is_ten_per_second_across_tiles() {
        let mut ctx = RenderContext::new();
        let mut surface = RecordingSurface::new();
        let mut first = Tile::new(TileCoord::new(0, 0), PixelPoint::default(), &ctx);
        let mut second = Tile::new(TileCoord::new(0, 1), PixelPoint::default(), &ctx);
        first.apply_server_state(None, &mut ctx, &mut surface, 0);
        second.apply_server_state(None, &mut ctx, &mut surface, 0);
        surface.drain();

        // 8 changed cells on one tile, then 8 on another, same second.
        let eight: String = content_with(0, 'a')
            .chars()
            .enumerate()
            .map(|(i, c)| if i < 8 { 'k' } else { c })
            .collect();
        first.apply_server_state(Some(&update_with(&eight)), &mut ctx, &mut surface, 5_000);
        second.apply_server_state(Some(&update_with(&eight)), &mut ctx, &mut surface, 5_500);
        let highlighted = surface
            .events
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::CellChanged { highlight: true, .. }))
            .count();
        let unhighlighted = surface
            .events
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::CellChanged { highlight: false, .. }))
            .count();
        assert_eq!(highlighted, 10);
        assert_eq!(unhighlighted, 6);

        // The budget refills in the next second.
        surface.drain();
        first.apply_server_state(
            Some(&update_with(&content_with(0, 'm'))),
            &mut ctx,
            &mut surface,
            6_000,
        );
        assert!(surface.events.iter().any(|e| matches!(
            e,
            SurfaceEvent::CellChanged { highlight: true, .. }
        )));
    }

    #[test]
    fn protection_toggle_is_idempotent() {
        let (mut tile, _ctx) = blank_tile();
        let mut surface = RecordingSurface::new();
        tile.set_protected(true, &mut surface);
        tile.set_protected(true, &mut surface);
        tile.set_protected(false, &mut surface);
        assert_eq!(
            surface.events,
            vec![
                SurfaceEvent::ProtectionChanged(TileCoord::new(0, 0), true),
                SurfaceEvent::ProtectionChanged(TileCoord::new(0, 0), false),
            ]
        );
    }

    #[test]
    fn equal_cell_properties_are_skipped() {
        let (mut tile, mut ctx) = blank_tile();
        let mut surface = RecordingSurface::new();
        let mut props = TileProperties::default();
        props.cell_props.insert(
            CellKey(CellCoord::new(0, 3)),
            CellProps {
                link: Some(LinkTarget::Url {
                    url: "http://example.com".into(),
                }),
            },
        );
        let update = TileUpdate {
            content: None,
            properties: props,
        };
        tile.apply_server_state(Some(&update), &mut ctx, &mut surface, 0);
        let applied = surface.drain();
        assert!(applied.contains(&SurfaceEvent::DecorationsCleared(TileCoord::new(0, 0))));
        assert!(applied.iter().any(|e| matches!(e, SurfaceEvent::DecorationSet(..))));

        // Same payload again: no decoration churn.
        tile.apply_server_state(Some(&update), &mut ctx, &mut surface, 1_000);
        assert!(surface.events.iter().all(|e| !matches!(
            e,
            SurfaceEvent::DecorationsCleared(_) | SurfaceEvent::DecorationSet(..)
        )));
    }
}
