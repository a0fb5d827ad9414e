mod http;
mod live;
mod render;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use scrobble_proto::config::Config;
use scrobble_proto::feed::{artist_summary, visible};
use scrobble_proto::session::SessionStore;
use scrobble_proto::{platform, progress_channel, Aggregator, HttpTransport, LastfmClient, RefreshRequest};
use tracing::info;

use crate::live::{FeedAggregator, FeedState, LiveFeed, RefreshOutcome};

#[derive(Parser)]
#[command(name = "scrobble-feed", version, about = "What you and your Last.fm friends played today")]
struct Cli {
    /// Build the feed for this handle instead of the logged-in one.
    #[arg(long, short, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remember a Last.fm handle for later runs.
    Login { handle: String },
    /// Forget the remembered handle.
    Logout,
    /// Show the remembered handle.
    Whoami,
    /// Build the feed once and print it.
    Feed {
        /// Show the first N pages.
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Group plays by artist.
        #[arg(long)]
        artists: bool,
        /// Print a table instead of cards.
        #[arg(long)]
        table: bool,
    },
    /// Check whether a handle scrobbled in the last 24 hours.
    Probe { handle: String },
    /// Keep the feed up to date and print new plays as they arrive.
    Watch,
    /// Keep the feed up to date and serve it over the JSON API.
    Serve,
}

impl Command {
    fn long_running(&self) -> bool {
        matches!(self, Self::Watch | Self::Serve)
    }
}

fn init_logging(to_file: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn,scrobble_proto=info")
    });

    if to_file {
        let log_path = platform::log_path();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_env_filter(filter)
            .init();
    }
    Ok(())
}

fn build_aggregator(config: &Config) -> anyhow::Result<FeedAggregator> {
    let api_key = config.lastfm.resolved_api_key().ok_or_else(|| {
        anyhow!(
            "No Last.fm API key. Set {} or lastfm.api_key in {}",
            scrobble_proto::config::API_KEY_ENV,
            Config::config_path().display()
        )
    })?;
    let transport = HttpTransport::new(&config.lastfm, api_key)?;
    Ok(Aggregator::new(LastfmClient::new(transport), config.feed.recent_limit))
}

fn current_handle(cli_user: Option<String>, sessions: &SessionStore) -> anyhow::Result<String> {
    if let Some(handle) = cli_user {
        return Ok(handle);
    }
    sessions
        .load()
        .map(|s| s.handle)
        .context("Not logged in. Run `scrobble-feed login <handle>` or pass --user")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.command.long_running())?;

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    let sessions = SessionStore::new(config.paths.session_file.clone());

    match cli.command {
        Command::Login { handle } => {
            let aggregator = build_aggregator(&config)?;
            if !aggregator.client().check_user_exists(&handle).await {
                bail!("No Last.fm user named {:?}", handle);
            }
            let session = sessions.save(&handle)?;
            println!(
                "Logged in as {} (until {})",
                session.handle,
                session.expires_at.format("%Y-%m-%d")
            );
        }
        Command::Logout => {
            sessions.clear()?;
            println!("Logged out");
        }
        Command::Whoami => match sessions.load() {
            Some(session) => println!(
                "{} (until {})",
                session.handle,
                session.expires_at.format("%Y-%m-%d")
            ),
            None => println!("Not logged in"),
        },
        Command::Feed { page, artists, table } => {
            let handle = current_handle(cli.user, &sessions)?;
            let aggregator = build_aggregator(&config)?;
            let feed = load_once(&aggregator, &handle).await?;
            let now = Utc::now();
            if artists {
                print!("{}", render::artists(&artist_summary(&feed)));
            } else {
                let page = visible(&feed, page, config.feed.page_size);
                if table {
                    print!("{}", render::table(&page, now));
                } else {
                    print!("{}", render::cards(&page, now));
                }
            }
        }
        Command::Probe { handle } => {
            let aggregator = build_aggregator(&config)?;
            if aggregator.probe(&handle).await {
                println!("{} scrobbled in the last 24 hours", handle);
            } else {
                println!("{} has been quiet for the last 24 hours", handle);
            }
        }
        Command::Watch => {
            let handle = current_handle(cli.user, &sessions)?;
            let live = Arc::new(LiveFeed::new(
                Arc::new(build_aggregator(&config)?),
                handle,
                config.feed.full_rebuild_every,
            ));
            if config.http.enabled {
                let _http_handle = http::start_server(
                    config.http.bind_address.clone(),
                    config.http.port,
                    Arc::clone(&live),
                    config.feed.page_size,
                );
            }

            let page_size = config.feed.page_size;
            let mut newest: Option<DateTime<Utc>> = None;
            let printer = move |outcome: &RefreshOutcome, state: &FeedState| {
                print_new(outcome, state, &mut newest, page_size);
            };
            tokio::select! {
                _ = live.run(config.feed.refresh_interval(), printer) => {}
                _ = tokio::signal::ctrl_c() => info!("[live] interrupted"),
            }
        }
        Command::Serve => {
            let handle = current_handle(cli.user, &sessions)?;
            let live = Arc::new(LiveFeed::new(
                Arc::new(build_aggregator(&config)?),
                handle,
                config.feed.full_rebuild_every,
            ));
            let _http_handle = http::start_server(
                config.http.bind_address.clone(),
                config.http.port,
                Arc::clone(&live),
                config.feed.page_size,
            );
            println!(
                "Serving on http://{}:{}/api/feed",
                config.http.bind_address, config.http.port
            );
            tokio::select! {
                _ = live.run(config.feed.refresh_interval(), |_, _| {}) => {}
                _ = tokio::signal::ctrl_c() => info!("[live] interrupted"),
            }
        }
    }

    Ok(())
}

/// Full rebuild with progress on stderr.
async fn load_once(
    aggregator: &FeedAggregator,
    handle: &str,
) -> anyhow::Result<Vec<scrobble_proto::Scrobble>> {
    let (tx, mut rx) = progress_channel();
    let printer = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            eprintln!("{}", render::progress_line(&p));
        }
    });
    let result = aggregator
        .aggregate(handle, RefreshRequest::FullRebuild, Some(&tx))
        .await;
    drop(tx);
    let _ = printer.await;
    Ok(result?)
}

/// Print plays newer than anything printed before. The first load prints one page.
fn print_new(
    outcome: &RefreshOutcome,
    state: &FeedState,
    newest: &mut Option<DateTime<Utc>>,
    page_size: usize,
) {
    if let RefreshOutcome::Failed(e) = outcome {
        eprintln!("Failed to load scrobbles: {}", e);
        return;
    }
    let now = Utc::now();
    let fresh: Vec<_> = match *newest {
        None => state.scrobbles.iter().take(page_size).collect(),
        Some(seen) => state
            .scrobbles
            .iter()
            .take_while(|s| s.timestamp > seen)
            .collect(),
    };
    // oldest first so the terminal reads top to bottom
    for s in fresh.iter().rev() {
        println!("{}", render::card(s, now));
    }
    if let Some(first) = state.scrobbles.first() {
        *newest = Some(newest.map_or(first.timestamp, |n| n.max(first.timestamp)));
    }
    if let Some(notice) = outcome.notice() {
        println!("-- {}", notice);
    }
}
