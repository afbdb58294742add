use std::sync::Arc;

use clap::Parser;
use mural::config::{Capabilities, Config, Features, JoinState};
use mural::coords::{GridGeometry, PixelPoint};
use mural::surface::{MenuCommand, MenuHost, NullScrollHost, WorldSurface};
use mural::transport::{HttpWorldApi, WorldApi};
use mural::world::{Event, WorldClient, run};
use mural_proto::{CellCoord, TileCoord};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mural")]
struct Cli {
    /// World to join (empty means the front-page world)
    #[arg(default_value = "")]
    world: String,

    #[arg(long, help = "Canvas server base URL (overrides MURAL_SERVER)")]
    server: Option<String>,

    #[arg(long, help = "Join with write capability")]
    write: bool,

    #[arg(long, help = "Join with admin capability")]
    admin: bool,

    #[arg(long, default_value_t = 1280)]
    width: i64,

    #[arg(long, default_value_t = 720)]
    height: i64,

    #[arg(long, help = "Write debug logs to a file")]
    debug_log: Option<String>,
}

/// Surface that narrates engine output to the log; real painting belongs to
/// an embedding frontend.
#[derive(Default)]
struct LogSurface;

impl WorldSurface for LogSurface {
    fn tile_loaded(&mut self, tile: TileCoord) {
        debug!(%tile, "tile loaded");
    }

    fn tile_removed(&mut self, tile: TileCoord) {
        debug!(%tile, "tile evicted");
    }

    fn cell_changed(&mut self, tile: TileCoord, cell: CellCoord, ch: char, highlight: bool) {
        debug!(%tile, %cell, %ch, highlight, "cell changed");
    }

    fn paused(&mut self, paused: bool) {
        info!(paused, "polling rate changed");
    }

    fn center_changed(&mut self, y: i64, x: i64) {
        info!(y, x, "center moved");
    }
}

#[derive(Default)]
struct LogMenuHost;

impl MenuHost for LogMenuHost {
    fn add_entry(&mut self, label: &str, _command: MenuCommand) {
        debug!(label, "menu entry available");
    }

    fn close(&mut self) {}
}

fn init_tracing(debug_log: Option<&str>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mural=info"));
    match debug_log {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.debug_log.as_deref())?;

    let mut config = Config::from_env();
    if let Some(server) = cli.server {
        config.server = server;
    }

    let session = uuid::Uuid::new_v4();
    info!(%session, world = %cli.world, server = %config.server, "joining world");

    let api: Arc<dyn WorldApi> = Arc::new(HttpWorldApi::new(&config.server, &cli.world)?);
    let join = JoinState {
        world: cli.world,
        capabilities: Capabilities {
            can_read: true,
            can_write: cli.write,
            can_admin: cli.admin,
        },
        features: Features {
            go_to_coord: true,
            coord_link: true,
            url_link: true,
        },
    };

    let geom = GridGeometry::new(config.char_width, config.char_height);
    let client = WorldClient::new(
        geom,
        PixelPoint::new(cli.width, cli.height),
        join,
        LogSurface,
        Box::new(NullScrollHost),
    );
    let mut menu = LogMenuHost;
    client.register_menu(&mut menu);

    let (events_tx, events_rx) = mpsc::channel(64);
    let shutdown_tx = events_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(Event::Shutdown).await;
        }
    });

    run(client, api, events_rx, events_tx).await;
    info!("left world");
    Ok(())
}
