mod config;
mod events;
mod scene;
mod server;
mod tui;

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use config::ServerConfig;
use events::ServerEvent;
use scene::TestingGroundSeed;
use server::GameServer;

#[derive(Parser)]
#[command(name = "physx-server")]
#[command(about = "Real-time physics replication server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = physx_core::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 66)]
    tick_rate: u32,

    #[arg(long, default_value_t = 100)]
    net_rate: u32,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(long)]
    headless: bool,

    #[arg(long, default_value = "server.cert")]
    cert: String,

    #[arg(long, default_value = "server.key")]
    key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let (cert_path, key_path) = if std::path::Path::new(&args.cert).exists()
        && std::path::Path::new(&args.key).exists()
    {
        (Some(args.cert.clone()), Some(args.key.clone()))
    } else {
        (None, None)
    };

    let config = ServerConfig {
        bind_addr,
        tick_rate_hz: args.tick_rate,
        net_interval_ms: args.net_rate,
        max_clients: args.max_clients,
        cert_path,
        key_path,
    };

    let server = Arc::new(GameServer::new(config, &TestingGroundSeed)?);

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("physx-server listening on {}", server.local_addr());
        server.clone().run().await;
        log::info!("server shutting down");
    } else {
        run_with_tui(server).await?;
    }

    Ok(())
}

async fn run_with_tui(server: Arc<GameServer>) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let run_handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    while running.load(Ordering::SeqCst) {
        for event in server.drain_events() {
            match event {
                ServerEvent::ClientConnecting { addr } => {
                    log::info!("connection request from {addr}");
                }
                ServerEvent::ClientConnected {
                    pid,
                    addr,
                    player_object_id,
                } => {
                    log::info!("client {pid} connected from {addr} (object {player_object_id})");
                }
                ServerEvent::ClientDisconnected { pid, reason } => {
                    log::info!("client {pid} {}", reason.as_str());
                }
                ServerEvent::ConnectionDenied { addr, reason } => {
                    log::warn!("connection denied to {addr}: {reason}");
                }
                ServerEvent::Error { message } => {
                    log::error!("{message}");
                }
            }
        }

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    server.shutdown();
                }
            }
        }

        let stats = server.stats();
        terminal.draw(|frame| {
            tui::render(frame, stats);
        })?;
    }

    let _ = run_handle.await;

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
