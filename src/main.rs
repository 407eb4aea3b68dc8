use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ladderbot::venue::{PaperVenue, PaperVenueConfig};
use ladderbot::{LadderConfig, Scheduler};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

/// How often the paper market moves
const PAPER_TICK: Duration = Duration::from_secs(1);

/// Maintain a symmetric limit-order ladder around the market price
#[derive(Parser, Debug)]
#[command(name = "ladderbot", version, about)]
struct Cli {
    /// Config file; missing file means defaults plus LADDER_* env vars
    #[arg(short, long, default_value = "ladder.toml")]
    config: String,

    /// Override max_loops (zero or negative runs forever)
    #[arg(long)]
    max_loops: Option<i64>,

    /// Starting price of the paper market
    #[arg(long, default_value_t = 50_000.0)]
    paper_price: f64,

    /// Largest paper price move per tick, in bps
    #[arg(long, default_value_t = 2.0)]
    paper_volatility_bps: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Never fill paper orders, even when the price trades through them
    #[arg(long)]
    no_fills: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    let mut config = LadderConfig::load(Some(&cli.config))
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    if let Some(max_loops) = cli.max_loops {
        config.max_loops = max_loops;
    }
    config.validate().context("invalid configuration")?;

    tracing::info!("🚀 Ladderbot starting (paper venue)");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {}", config.symbol);
    tracing::info!("  Quantity: {}", config.quantity);
    tracing::info!("  Ladder: {:?} bps (replacement {} bps)", config.bps_ladder, config.replacement_bps);
    tracing::info!(
        "  Band: {} - {} bps",
        config.min_distance_bps,
        config.max_distance_bps
    );
    if config.use_indicators {
        tracing::info!(
            "  Volatility gate: max ATR {}, max ATR change {}",
            config.max_atr,
            config.atr_change_threshold
        );
    } else {
        tracing::info!("  Volatility gate: disabled");
    }

    let venue = Arc::new(PaperVenue::new(PaperVenueConfig {
        initial_price: cli.paper_price,
        volatility_bps: cli.paper_volatility_bps,
        seed: cli.seed,
        fill_crossed_orders: !cli.no_fills,
        ..Default::default()
    }));

    let market = {
        let venue = Arc::clone(&venue);
        tokio::spawn(async move {
            let mut ticker = interval(PAPER_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                venue.tick();
            }
        })
    };

    let scheduler = Scheduler::new(Arc::clone(&venue), config);
    scheduler.start();
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
            scheduler.stop();
        }
        _ = scheduler.wait_until_stopped() => {}
    }
    market.abort();
    tracing::info!("  Final paper price: {:.2}", venue.price());

    let snapshot = serde_json::to_string_pretty(&scheduler.snapshot())
        .context("failed to serialize scheduler snapshot")?;
    println!("{}", snapshot);

    tracing::info!("👋 Ladderbot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ladderbot=info")),
        )
        .init();
}
