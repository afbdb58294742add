//! The world client: one logical thread of control owning every piece of
//! mutable state, driven by events and emitting actions.
//!
//! Timers, keypresses, and network completions all arrive as [`Event`]s;
//! handling one event may mutate state and yields [`Action`]s for the
//! runtime layer to interpret (schedule a tick, issue a request). Network
//! calls therefore never block the control thread, and no locking is needed
//! anywhere in the engine.

pub mod cursor;
pub mod store;
pub mod tile;

use std::sync::Arc;
use std::time::{Duration, Instant};

use mural_proto::{Edit, LinkTarget, TileCoord, TileRefresh};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::{Capabilities, Features, JoinState};
use crate::coords::{AbsoluteCell, Direction, GridGeometry, PixelPoint, TileRect};
use crate::surface::{MenuCommand, MenuHost, ScrollHost, WorldSurface};
use crate::sync::{
    EditQueue, FLUSH_INTERVAL, RENDER_INTERVAL, SyncPacer, now_ms,
};
use crate::transport::{PushError, WorldApi};
use crate::world::cursor::CursorController;
use crate::world::store::{TileStore, ViewportController};
use crate::world::tile::RenderContext;

/// Autoscroll cadence for go-to-coordinate travel.
const GOTO_TICK: Duration = Duration::from_millis(25);
/// Pixels moved per autoscroll tick.
const GOTO_STEP_PX: f64 = 20.0;
/// Distance at which autoscroll considers itself arrived.
const GOTO_ARRIVE_PX: f64 = 40.0;

/// User input, as delivered by the embedding layer's capture widgets.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Char(char),
    Backspace,
    Enter,
    Arrow(Direction),
    PointerDown { x: i64, y: i64 },
    Scroll { dx: i64, dy: i64 },
    Resize { width: i64, height: i64 },
}

/// Everything that can wake the engine.
#[derive(Debug)]
pub enum Event {
    Input(InputEvent),
    Menu(MenuCommand),
    RenderTick,
    FetchTick,
    FetchDone(anyhow::Result<TileRefresh>),
    FlushTick,
    PushDone(Result<Vec<Edit>, PushError>),
    AutoScrollTick,
    Shutdown,
}

/// What the engine asks the runtime layer to do next.
#[derive(Debug)]
pub enum Action {
    /// Enqueue `event` after `after` elapses. Fetch and flush reschedule
    /// themselves only once the previous attempt resolves, so requests never
    /// pile up behind a slow network.
    Schedule { after: Duration, event: Event },
    Fetch { bounds: TileRect },
    Push { edits: Vec<Edit> },
    Protect { tile: TileCoord },
    Unprotect { tile: TileCoord },
    CreateLink { at: AbsoluteCell, target: LinkTarget },
    Quit,
}

/// An armed one-shot pick: the next pointer-down resolves it.
#[derive(Debug, Clone, PartialEq)]
enum Picking {
    Protect,
    Unprotect,
    CoordLink { y: i64, x: i64 },
    UrlLink { url: String },
}

/// In-flight go-to-coordinate travel, in fractional tile units.
#[derive(Debug, Clone, Copy)]
struct AutoScroll {
    target_y: f64,
    target_x: f64,
}

pub struct WorldClient<S: WorldSurface> {
    geom: GridGeometry,
    ctx: RenderContext,
    store: TileStore,
    viewport: ViewportController,
    cursor: CursorController,
    queue: EditQueue,
    pacer: SyncPacer,
    world: String,
    caps: Capabilities,
    features: Features,
    surface: S,
    scroll_host: Box<dyn ScrollHost + Send>,
    picking: Option<Picking>,
    autoscroll: Option<AutoScroll>,
    show_coords: bool,
    paused_shown: bool,
}

impl<S: WorldSurface> WorldClient<S> {
    pub fn new(
        geom: GridGeometry,
        viewport_size: PixelPoint,
        join: JoinState,
        surface: S,
        scroll_host: Box<dyn ScrollHost + Send>,
    ) -> Self {
        let mut client = Self {
            geom,
            ctx: RenderContext::new(),
            store: TileStore::new(),
            viewport: ViewportController::new(viewport_size),
            cursor: CursorController::new(),
            queue: EditQueue::new(),
            pacer: SyncPacer::new(Instant::now()),
            world: join.world,
            caps: join.capabilities,
            features: join.features,
            surface,
            scroll_host,
            picking: None,
            autoscroll: None,
            show_coords: false,
            paused_shown: false,
        };
        client
            .viewport
            .render_mandatory(&mut client.store, &client.geom, &client.ctx, &mut client.surface);
        client
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    pub fn selected(&self) -> Option<AbsoluteCell> {
        self.cursor.selected()
    }

    pub fn pending_edits(&self) -> usize {
        self.queue.len()
    }

    /// Offer menu entries appropriate to this world's features and the
    /// user's capabilities.
    pub fn register_menu(&self, menu: &mut dyn MenuHost) {
        menu.add_entry(" Show coordinates", MenuCommand::ToggleCoordinates);
        if self.features.go_to_coord {
            menu.add_entry("Go to coordinates", MenuCommand::GoToCoordinates { y: 0, x: 0 });
        }
        if self.features.coord_link {
            menu.add_entry(
                "Create link to coordinates",
                MenuCommand::BeginCoordLink { y: 0, x: 0 },
            );
        }
        if self.features.url_link {
            menu.add_entry(
                "Create link to URL",
                MenuCommand::BeginUrlLink { url: String::new() },
            );
        }
        if self.caps.can_admin {
            menu.add_entry("Make an area owner-only", MenuCommand::BeginProtect);
            menu.add_entry("Undo make owner-only", MenuCommand::BeginUnprotect);
        }
    }

    /// Kick off the polling, flushing, and render loops.
    pub fn startup_actions(&mut self) -> Vec<Action> {
        vec![
            Action::Schedule {
                after: Duration::ZERO,
                event: Event::FetchTick,
            },
            Action::Schedule {
                after: FLUSH_INTERVAL,
                event: Event::FlushTick,
            },
            Action::Schedule {
                after: RENDER_INTERVAL,
                event: Event::RenderTick,
            },
        ]
    }

    /// Process one event. All engine state mutation happens here.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        let now = Instant::now();
        match event {
            Event::Input(input) => {
                self.pacer.touch(now);
                self.handle_input(input)
            }
            Event::Menu(command) => self.handle_menu(command),
            Event::RenderTick => {
                self.viewport
                    .render_mandatory(&mut self.store, &self.geom, &self.ctx, &mut self.surface);
                if self.store.take_sweep_due() {
                    self.viewport.evict(&mut self.store, &self.geom, &mut self.surface);
                }
                vec![Action::Schedule {
                    after: RENDER_INTERVAL,
                    event: Event::RenderTick,
                }]
            }
            Event::FetchTick => {
                let idle = self.pacer.is_idle(now);
                if idle != self.paused_shown {
                    self.paused_shown = idle;
                    self.surface.paused(idle);
                }
                vec![Action::Fetch {
                    bounds: self.viewport.window(&self.geom),
                }]
            }
            Event::FetchDone(result) => {
                match result {
                    Ok(refresh) => self.apply_refresh(refresh),
                    Err(err) => debug!(%err, "fetch failed; retrying on schedule"),
                }
                vec![Action::Schedule {
                    after: self.pacer.fetch_delay(now),
                    event: Event::FetchTick,
                }]
            }
            Event::FlushTick => {
                if self.queue.is_empty() {
                    return vec![Action::Schedule {
                        after: self.pacer.flush_delay(now),
                        event: Event::FlushTick,
                    }];
                }
                let batch = self.queue.take_batch();
                trace!(edits = batch.len(), "flushing edit batch");
                vec![Action::Push {
                    edits: batch.into_iter().map(|queued| queued.edit).collect(),
                }]
            }
            Event::PushDone(result) => {
                match result {
                    Ok(acks) => self.apply_acks(acks),
                    Err(PushError::PermissionDenied) => {
                        debug!("push denied; dropping write capability");
                        self.caps.can_write = false;
                    }
                    Err(PushError::Other(err)) => {
                        debug!(%err, "push failed; edits will be corrected by fetch")
                    }
                }
                vec![Action::Schedule {
                    after: self.pacer.flush_delay(now),
                    event: Event::FlushTick,
                }]
            }
            Event::AutoScrollTick => self.step_autoscroll(),
            Event::Shutdown => vec![Action::Quit],
        }
    }

    fn handle_input(&mut self, input: InputEvent) -> Vec<Action> {
        match input {
            InputEvent::Char(ch) => {
                self.type_at_selection(ch);
                self.move_cursor(Direction::Right);
            }
            InputEvent::Backspace => {
                self.move_cursor(Direction::Left);
                self.type_at_selection(' ');
            }
            InputEvent::Enter => {
                if let Some(click) = self.cursor.last_click() {
                    let landed = CursorController::step(click, Direction::Down);
                    self.viewport.ensure_tile(
                        &mut self.store,
                        &self.geom,
                        &self.ctx,
                        landed.tile,
                        &mut self.surface,
                    );
                    self.cursor.select(
                        landed,
                        &mut self.store,
                        &mut self.viewport,
                        &self.geom,
                        &self.ctx,
                        self.caps,
                        &mut self.surface,
                    );
                    self.cursor.remember_click(landed);
                }
            }
            InputEvent::Arrow(direction) => {
                self.move_cursor(direction);
            }
            InputEvent::PointerDown { x, y } => {
                self.autoscroll = None;
                return self.handle_pointer_down(PixelPoint::new(x, y));
            }
            InputEvent::Scroll { dx, dy } => {
                self.scroll_by(dx, dy);
            }
            InputEvent::Resize { width, height } => {
                self.viewport.resize(PixelPoint::new(width, height));
                self.viewport
                    .render_mandatory(&mut self.store, &self.geom, &self.ctx, &mut self.surface);
            }
        }
        Vec::new()
    }

    fn handle_pointer_down(&mut self, position: PixelPoint) -> Vec<Action> {
        if let Some(picking) = self.picking.take() {
            self.scroll_host.start();
            let at = self.geom.cell_at(position, self.viewport.offset());
            let action = match picking {
                Picking::Protect => Action::Protect { tile: at.tile },
                Picking::Unprotect => Action::Unprotect { tile: at.tile },
                Picking::CoordLink { y, x } => Action::CreateLink {
                    at,
                    target: LinkTarget::Coord { tile_y: y, tile_x: x },
                },
                Picking::UrlLink { url } => Action::CreateLink {
                    at,
                    target: LinkTarget::Url { url },
                },
            };
            return vec![action];
        }
        let cell = self.geom.cell_at(position, self.viewport.offset());
        self.cursor.select(
            cell,
            &mut self.store,
            &mut self.viewport,
            &self.geom,
            &self.ctx,
            self.caps,
            &mut self.surface,
        );
        self.cursor.remember_click(cell);
        Vec::new()
    }

    fn handle_menu(&mut self, command: MenuCommand) -> Vec<Action> {
        match command {
            MenuCommand::ToggleCoordinates => {
                self.show_coords = !self.show_coords;
                if self.show_coords {
                    self.report_center();
                }
            }
            MenuCommand::GoToCoordinates { y, x } => {
                if !self.features.go_to_coord {
                    return Vec::new();
                }
                // User units are four-tile blocks with the y axis inverted;
                // aim at the middle of the block rather than its corner.
                self.autoscroll = Some(AutoScroll {
                    target_y: (y * -4 + 2) as f64,
                    target_x: (x * 4 + 2) as f64,
                });
                return vec![Action::Schedule {
                    after: GOTO_TICK,
                    event: Event::AutoScrollTick,
                }];
            }
            MenuCommand::BeginCoordLink { y, x } => {
                if self.features.coord_link {
                    self.arm_picking(Picking::CoordLink { y, x });
                }
            }
            MenuCommand::BeginUrlLink { url } => {
                if self.features.url_link {
                    self.arm_picking(Picking::UrlLink { url });
                }
            }
            MenuCommand::BeginProtect => {
                if self.caps.can_admin {
                    self.arm_picking(Picking::Protect);
                }
            }
            MenuCommand::BeginUnprotect => {
                if self.caps.can_admin {
                    self.arm_picking(Picking::Unprotect);
                }
            }
        }
        Vec::new()
    }

    fn arm_picking(&mut self, picking: Picking) {
        self.scroll_host.stop();
        self.picking = Some(picking);
    }

    fn apply_refresh(&mut self, refresh: TileRefresh) {
        let stamp = now_ms();
        for (key, update) in refresh {
            match self.store.get_mut(key.0) {
                Some(tile) => {
                    tile.apply_server_state(update.as_ref(), &mut self.ctx, &mut self.surface, stamp)
                }
                // Evicted while the request was in flight; harmless.
                None => trace!(tile = %key.0, "dropping refresh for evicted tile"),
            }
        }
    }

    fn apply_acks(&mut self, acks: Vec<Edit>) {
        for ack in acks {
            match self.store.get_mut(ack.tile) {
                Some(tile) => tile.acknowledge_edit(ack.cell, ack.timestamp, ack.ch),
                None => trace!(tile = %ack.tile, "dropping ack for evicted tile"),
            }
        }
    }

    /// Record a character at the current selection. Leaves the cursor where
    /// it is; callers decide whether to advance.
    fn type_at_selection(&mut self, ch: char) {
        if !self.caps.can_write {
            return;
        }
        let Some(selected) = self.cursor.selected() else {
            return;
        };
        let timestamp = now_ms();
        let edit = Edit {
            tile: selected.tile,
            cell: selected.cell,
            timestamp,
            ch,
        };
        let id = self.queue.record(edit);
        let tile = self
            .store
            .get_mut(selected.tile)
            .expect("selected tile missing from store");
        tile.record_local_edit(selected.cell, ch, timestamp, id, &mut self.surface)
            .expect("selection guarantees an initialized tile");
    }

    fn move_cursor(&mut self, direction: Direction) {
        self.cursor.move_cursor(
            direction,
            None,
            &mut self.store,
            &mut self.viewport,
            &self.geom,
            &self.ctx,
            self.caps,
            &mut self.surface,
        );
    }

    fn scroll_by(&mut self, dx: i64, dy: i64) {
        if let Err(err) =
            self.viewport
                .scroll_by(&mut self.store, &self.geom, &self.ctx, dx, dy, &mut self.surface)
        {
            warn!(%err, "scroll rejected");
            return;
        }
        if self.show_coords {
            self.report_center();
        }
    }

    fn report_center(&mut self) {
        let (y, x) = self.viewport.center_user_coords(&self.geom);
        self.surface.center_changed(y, x);
    }

    fn step_autoscroll(&mut self) -> Vec<Action> {
        let Some(travel) = self.autoscroll else {
            return Vec::new();
        };
        let (center_y, center_x) = self.viewport.center_tiles(&self.geom);
        // Recompute the move every tick, or imprecision drifts off-target
        // over long distances.
        let diff_y = (travel.target_y - center_y) * self.geom.tile_height() as f64;
        let diff_x = (travel.target_x - center_x) * self.geom.tile_width() as f64;
        let distance = (diff_y * diff_y + diff_x * diff_x).sqrt();
        if distance < GOTO_ARRIVE_PX {
            self.autoscroll = None;
            self.pacer.touch(Instant::now());
            return Vec::new();
        }
        let dy = (diff_y * GOTO_STEP_PX / distance).round() as i64;
        let dx = (diff_x * GOTO_STEP_PX / distance).round() as i64;
        self.scroll_by(dx, dy);
        vec![Action::Schedule {
            after: GOTO_TICK,
            event: Event::AutoScrollTick,
        }]
    }
}

/// Drive a client against an api implementation until shutdown. Returns the
/// client so embedders (and tests) can inspect final state.
pub async fn run<S>(
    mut client: WorldClient<S>,
    api: Arc<dyn WorldApi>,
    mut events: mpsc::Receiver<Event>,
    handle: mpsc::Sender<Event>,
) -> WorldClient<S>
where
    S: WorldSurface + Send,
{
    for action in client.startup_actions() {
        dispatch(action, &api, &handle);
    }
    while let Some(event) = events.recv().await {
        for action in client.handle(event) {
            if matches!(action, Action::Quit) {
                return client;
            }
            dispatch(action, &api, &handle);
        }
    }
    client
}

fn dispatch(action: Action, api: &Arc<dyn WorldApi>, events: &mpsc::Sender<Event>) {
    match action {
        Action::Schedule { after, event } => {
            let events = events.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                let _ = events.send(event).await;
            });
        }
        Action::Fetch { bounds } => {
            let api = Arc::clone(api);
            let events = events.clone();
            tokio::spawn(async move {
                let result = api.fetch_tiles(bounds).await;
                let _ = events.send(Event::FetchDone(result)).await;
            });
        }
        Action::Push { edits } => {
            let api = Arc::clone(api);
            let events = events.clone();
            tokio::spawn(async move {
                let result = api.push_edits(edits).await;
                let _ = events.send(Event::PushDone(result)).await;
            });
        }
        Action::Protect { tile } => {
            let api = Arc::clone(api);
            tokio::spawn(async move { api.protect_tile(tile).await });
        }
        Action::Unprotect { tile } => {
            let api = Arc::clone(api);
            tokio::spawn(async move { api.unprotect_tile(tile).await });
        }
        Action::CreateLink { at, target } => {
            let api = Arc::clone(api);
            tokio::spawn(async move { api.create_link(at, target).await });
        }
        Action::Quit => {}
    }
}
