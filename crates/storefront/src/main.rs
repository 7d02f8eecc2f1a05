//! Vending Storefront - terminal front-end for the drinks vending machine.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog (needs the machine to be free)
//! vending-storefront drinks --brand 2 --max-price 80
//!
//! # Fill the cart
//! vending-storefront cart add 4
//! vending-storefront cart set 4 3
//!
//! # Pay with three 10s and two 5s
//! vending-storefront pay --coin 10=3 --coin 5=2
//!
//! # Follow the machine lock until Ctrl+C
//! vending-storefront watch
//! ```
//!
//! Configuration comes from the environment (see `config.rs`); a `.env`
//! file is loaded if present.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vending_core::{BrandId, DrinkId, Nominal};
use vending_storefront::config::StorefrontConfig;
use vending_storefront::error::{Result, StorefrontError};
use vending_storefront::state::AppState;

mod commands;

#[derive(Parser)]
#[command(name = "vending-storefront")]
#[command(author, version, about = "Terminal storefront for the drinks vending machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List drinks (waits for the machine to be free)
    Drinks {
        /// Only drinks of this brand
        #[arg(long)]
        brand: Option<BrandId>,

        /// Only drinks priced at or below this amount
        #[arg(long)]
        max_price: Option<Decimal>,
    },
    /// List brands
    Brands,
    /// Show the cheapest and most expensive price
    PriceRange {
        /// Restrict to one brand
        #[arg(long)]
        brand: Option<BrandId>,
    },
    /// Upload a catalog file
    Import {
        /// File to upload
        file: PathBuf,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Pay for the cart with coins
    Pay {
        /// Inserted coins as NOMINAL=COUNT (nominals: 1, 2, 5, 10)
        #[arg(long = "coin", value_name = "NOMINAL=COUNT", value_parser = parse_coin)]
        coins: Vec<(Nominal, u32)>,
    },
    /// Hold the machine lock and print every status change until Ctrl+C
    Watch,
    /// Show the session token
    Session {
        /// Forget the current token and create a new one
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add one unit of a drink (waits for the machine to be free)
    Add {
        /// Drink ID
        id: DrinkId,
    },
    /// Remove a drink
    Remove {
        /// Drink ID
        id: DrinkId,
    },
    /// Set the quantity of a drink (between 1 and its stock)
    Set {
        /// Drink ID
        id: DrinkId,
        /// New quantity
        quantity: u32,
    },
    /// Empty the cart
    Clear,
}

fn parse_coin(value: &str) -> std::result::Result<(Nominal, u32), String> {
    let (nominal, count) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NOMINAL=COUNT, got '{value}'"))?;
    let nominal: Nominal = nominal.parse().map_err(|e| format!("{e}"))?;
    let count: u32 = count
        .trim()
        .parse()
        .map_err(|_| format!("invalid coin count '{count}'"))?;
    Ok((nominal, count))
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => exit_with(&StorefrontError::from(e)),
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to warn so command output stays readable
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vending_storefront=warn".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match AppState::new(config) {
        Ok(state) => run(cli, &state).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        if e.is_internal() {
            let event_id = sentry::capture_error(&e);
            tracing::error!(error = %e, sentry_event_id = %event_id, "Command failed");
        } else {
            tracing::debug!(error = %e, "Command failed");
        }
        exit_with(&e);
    }
}

fn exit_with(error: &StorefrontError) -> ! {
    let _ = writeln!(std::io::stderr(), "{}", error.user_message());
    std::process::exit(1);
}

async fn run(cli: Cli, state: &AppState) -> Result<()> {
    match cli.command {
        Commands::Drinks { brand, max_price } => {
            commands::catalog::drinks(state, brand, max_price).await
        }
        Commands::Brands => commands::catalog::brands(state).await,
        Commands::PriceRange { brand } => commands::catalog::price_range(state, brand).await,
        Commands::Import { file } => commands::catalog::import(state, &file).await,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(state),
            CartAction::Add { id } => commands::cart::add(state, id).await,
            CartAction::Remove { id } => commands::cart::remove(state, id),
            CartAction::Set { id, quantity } => commands::cart::set(state, id, quantity),
            CartAction::Clear => commands::cart::clear(state),
        },
        Commands::Pay { coins } => commands::pay::pay(state, &coins).await,
        Commands::Watch => commands::watch::watch(state).await,
        Commands::Session { reset } => commands::session::session(state, reset),
    }
}
