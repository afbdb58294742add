//! Wire-contract definitions shared between the mural client engine and the
//! canvas server. Keeping these in a dedicated crate allows alternate
//! frontends to reuse the protocol without pulling in the engine runtime.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Rows of character cells per tile. Fixed contract with the server; the
/// client assumes, never verifies, agreement.
pub const TILE_ROWS: usize = 8;

/// Columns of character cells per tile. Same contract as [`TILE_ROWS`].
pub const TILE_COLS: usize = 16;

/// Cells per tile. Every tile content string has exactly this many chars.
pub const TILE_CELLS: usize = TILE_ROWS * TILE_COLS;

/// Fetch protocol revision, sent as the `v` query parameter.
pub const PROTOCOL_VERSION: u32 = 3;

/// Address of a tile on the unbounded canvas. Signed in both axes; y grows
/// downward, x grows rightward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct TileCoord {
    pub y: i64,
    pub x: i64,
}

impl TileCoord {
    pub const fn new(y: i64, x: i64) -> Self {
        Self { y, x }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.y, self.x)
    }
}

/// Address of a character cell inside a tile: `y` in `[0, TILE_ROWS)`,
/// `x` in `[0, TILE_COLS)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct CellCoord {
    pub y: u8,
    pub x: u8,
}

impl CellCoord {
    pub const fn new(y: u8, x: u8) -> Self {
        Self { y, x }
    }

    /// Flattened row-major index into a tile's content string.
    pub fn index(self) -> usize {
        self.y as usize * TILE_COLS + self.x as usize
    }

    pub fn from_index(index: usize) -> Self {
        assert!(index < TILE_CELLS, "cell index {index} out of range");
        Self {
            y: (index / TILE_COLS) as u8,
            x: (index % TILE_COLS) as u8,
        }
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.y, self.x)
    }
}

fn parse_pair(value: &str) -> Option<(i64, i64)> {
    let (y, x) = value.split_once(',')?;
    Some((y.trim().parse().ok()?, x.trim().parse().ok()?))
}

/// Map key for per-tile payloads: the `"tileY,tileX"` composite string used
/// by the fetch response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey(pub TileCoord);

impl From<TileCoord> for TileKey {
    fn from(coord: TileCoord) -> Self {
        Self(coord)
    }
}

impl Serialize for TileKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TileKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let (y, x) = parse_pair(&raw)
            .ok_or_else(|| de::Error::custom(format!("bad tile key {raw:?}")))?;
        Ok(Self(TileCoord::new(y, x)))
    }
}

/// Map key for per-cell properties: the `"charY,charX"` composite string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey(pub CellCoord);

impl From<CellCoord> for CellKey {
    fn from(coord: CellCoord) -> Self {
        Self(coord)
    }
}

impl Serialize for CellKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CellKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let (y, x) = parse_pair(&raw)
            .ok_or_else(|| de::Error::custom(format!("bad cell key {raw:?}")))?;
        if y < 0 || y as usize >= TILE_ROWS || x < 0 || x as usize >= TILE_COLS {
            return Err(de::Error::custom(format!("cell key {raw:?} out of range")));
        }
        Ok(Self(CellCoord::new(y as u8, x as u8)))
    }
}

/// One locally typed character. On the wire this is the six-element array
/// `[tileY, tileX, charY, charX, timestamp, char]`; the server echoes the
/// same shape back as the acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EditWire", into = "EditWire")]
pub struct Edit {
    pub tile: TileCoord,
    pub cell: CellCoord,
    pub timestamp: i64,
    pub ch: char,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct EditWire(i64, i64, u8, u8, i64, char);

impl From<EditWire> for Edit {
    fn from(w: EditWire) -> Self {
        Self {
            tile: TileCoord::new(w.0, w.1),
            cell: CellCoord::new(w.2, w.3),
            timestamp: w.4,
            ch: w.5,
        }
    }
}

impl From<Edit> for EditWire {
    fn from(e: Edit) -> Self {
        Self(e.tile.y, e.tile.x, e.cell.y, e.cell.x, e.timestamp, e.ch)
    }
}

impl Edit {
    /// Form encoding used by the push endpoint: one comma-joined value per
    /// `edits` field.
    pub fn to_form_value(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.tile.y, self.tile.x, self.cell.y, self.cell.x, self.timestamp, self.ch
        )
    }
}

/// Target of a cell link decoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkTarget {
    Coord {
        #[serde(rename = "link_tileY")]
        tile_y: i64,
        #[serde(rename = "link_tileX")]
        tile_x: i64,
    },
    Url { url: String },
}

/// Sparse per-cell decoration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CellProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkTarget>,
}

/// Per-tile property bag. Absent fields mean "unset".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TileProperties {
    #[serde(default)]
    pub protected: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cell_props: HashMap<CellKey, CellProps>,
}

/// Snapshot of one tile as returned by a fetch. `content: None` means "use
/// the default blank content".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TileUpdate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub properties: TileProperties,
}

/// Full fetch response: every requested coordinate maps to a snapshot, or to
/// null for tiles the server has never stored.
pub type TileRefresh = HashMap<TileKey, Option<TileUpdate>>;
