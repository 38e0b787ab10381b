use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bidline::auth::{TokenSource, TokenStore};
use bidline::banner::{BannerInfo, print_banner, print_session_summary};
use bidline::channel::Channel;
use bidline::commands::{CommandRegistry, CommandResult, Session};
use bidline::config::{ChannelConfig, KEY_API_URL, Settings};
use bidline::consts::default_db_path;
use bidline::events::EventKind;
use bidline::network::ManualNetwork;
use bidline::state::StateFetcher;
use bidline::state::http::HttpStateFetcher;
use bidline::transport::SimulatedTransport;

#[derive(Parser)]
#[command(name = "bidline", version, about = "A realtime auction channel, in your terminal.")]
struct Cli {
    /// Auction ids to join at startup
    auctions: Vec<String>,

    /// SQLite database for settings and the session token (use :memory: for ephemeral)
    #[arg(short, long)]
    db: Option<String>,

    /// Auction API base URL for reconciliation (simulated when unset)
    #[arg(long)]
    api_url: Option<String>,

    /// Reconnect attempts before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Delay before the first reconnect attempt, in milliseconds
    #[arg(long)]
    base_delay_ms: Option<u64>,

    /// How long the simulated transport takes to open, in milliseconds
    #[arg(long, default_value_t = 500)]
    connect_delay_ms: u64,

    /// Start with the network down
    #[arg(long, default_value_t = false)]
    offline: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bidline=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let db = match cli.db {
        Some(db) => db,
        None => {
            let path = default_db_path()?;
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
            path.to_string_lossy().into_owned()
        }
    };

    let settings = Settings::open(&db)?;
    let mut config = ChannelConfig::from_settings(&settings)?;
    if let Some(max) = cli.max_attempts {
        config.max_reconnect_attempts = max;
    }
    if let Some(ms) = cli.base_delay_ms {
        anyhow::ensure!(ms > 0, "--base-delay-ms must be positive");
        config.base_delay = Duration::from_millis(ms);
    }

    let tokens: Arc<dyn TokenSource> = Arc::new(TokenStore::open(&db)?);
    let auth_status = if tokens.token().is_some() {
        "session token ✓"
    } else {
        "none"
    };

    let api_url = match cli.api_url {
        Some(url) => Some(url),
        None => settings.get(KEY_API_URL)?,
    };
    // Without an API the channel's simulated fetcher reads its own presence
    let fetcher: Option<Arc<dyn StateFetcher>> = match &api_url {
        Some(url) => Some(Arc::new(HttpStateFetcher::new(url.clone(), tokens.clone())?)),
        None => None,
    };

    let network = Arc::new(ManualNetwork::new(!cli.offline));

    print_banner(&BannerInfo {
        network: if cli.offline { "offline" } else { "online" },
        api: api_url.as_deref().unwrap_or("simulated"),
        auth_status,
        max_attempts: config.max_reconnect_attempts,
        base_delay_ms: config.base_delay.as_millis() as u64,
        db: if db == ":memory:" { "ephemeral" } else { &db },
    });

    let mut builder = Channel::builder()
        .config(config)
        .network(network.clone())
        .tokens(tokens)
        .transport(Arc::new(SimulatedTransport::new(Duration::from_millis(
            cli.connect_delay_ms,
        ))));
    if let Some(fetcher) = fetcher {
        builder = builder.fetcher(fetcher);
    }
    let channel = builder.build();

    // Every event goes to stdout as one JSON line
    let received = Arc::new(AtomicU64::new(0));
    for kind in EventKind::ALL {
        let received = received.clone();
        channel.on(kind, move |event| {
            received.fetch_add(1, Ordering::Relaxed);
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize event"),
            }
        });
    }

    channel.watch_network();
    for auction_id in &cli.auctions {
        channel.join_auction(auction_id);
    }
    if let Err(e) = channel.connect().await {
        warn!(error = %e, "initial connect failed, /retry or /online to try again");
    }

    let registry = CommandRegistry::new();
    let session = Session {
        channel: &channel,
        network: &network,
    };

    // Async stdin so Ctrl+C is caught at the prompt too
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("\nbidline> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            result = lines.next_line() => {
                match result {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // Ctrl+D (EOF)
                        println!();
                        break;
                    }
                    Err(e) => {
                        eprintln!("input error: {e}");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match registry.dispatch(input, &session).await {
            CommandResult::Quit => break,
            CommandResult::Handled => {}
            CommandResult::NotACommand => {
                println!("commands start with /, type /help for the list");
            }
        }
    }

    info!("shutting down");
    channel.shutdown();
    print_session_summary(received.load(Ordering::Relaxed));
    Ok(())
}
