use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use client_core::{simulated::SimulatedChain, Collaborators, ControllerEvent, MintViewController};
use frame_host::{BroadcastHost, HostNotice};
use shared::{
    domain::{Address, MintRequestState, U256},
    protocol::{BALANCE_OF, MINT_PAYABLE, MINT_QUANTITY, TOTAL_SUPPLY},
};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, VariantKind};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    FixedSupply,
    FreeMint,
}

#[derive(Parser, Debug)]
#[command(about = "Runs the NFT mint page against an in-memory chain")]
struct Args {
    /// TOML settings file; defaults to ./minter.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    variant: Option<VariantArg>,
    /// Behave like a standalone page: no frame auto-reconnect.
    #[arg(long)]
    standalone: bool,
    #[arg(long, default_value = "0x4242424242424242424242424242424242424242")]
    account: Address,
    #[arg(long, default_value_t = 0)]
    initial_supply: u64,
    #[arg(long)]
    max_supply: Option<u64>,
    #[arg(long, default_value_t = 1_200)]
    confirmation_ms: u64,
    /// How long confirmed mints stay invisible to reads.
    #[arg(long, default_value_t = 2_000)]
    read_lag_ms: u64,
    /// Quantities to mint, in order, once the wallet is connected.
    #[arg(long = "mint")]
    mints: Vec<u64>,
    /// Seconds to keep the page mounted after the last mint settles.
    #[arg(long, default_value_t = 8)]
    run_secs: u64,
    /// Print the contract ABI fragment the page uses and exit.
    #[arg(long)]
    print_abi: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    if args.print_abi {
        let abi = [BALANCE_OF, TOTAL_SUPPLY, MINT_QUANTITY, MINT_PAYABLE];
        println!("{}", serde_json::to_string_pretty(&abi)?);
        return Ok(());
    }

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(variant) = args.variant {
        settings.variant = match variant {
            VariantArg::FixedSupply => VariantKind::FixedSupply,
            VariantArg::FreeMint => VariantKind::FreeMint,
        };
    }
    if args.standalone {
        settings.embedded_in_frame = false;
    }
    let config = Arc::new(
        settings
            .into_app_config()
            .context("invalid mint app configuration")?,
    );

    let mut chain = SimulatedChain::new(Arc::clone(&config), args.account)
        .with_initial_supply(U256::from(args.initial_supply))
        .with_confirmation_delay(Duration::from_millis(args.confirmation_ms))
        .with_read_lag(Duration::from_millis(args.read_lag_ms));
    if let Some(max_supply) = args.max_supply {
        chain = chain.with_max_supply(U256::from(max_supply));
    }
    let chain = Arc::new(chain);
    let host = Arc::new(BroadcastHost::new());

    let controller = MintViewController::new(
        Arc::clone(&config),
        Collaborators {
            wallet: chain.clone(),
            reader: chain.clone(),
            writer: chain,
            host: host.clone(),
            notifier: host.clone(),
        },
    );

    let mut events = BroadcastStream::new(controller.subscribe_events());
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(ControllerEvent::ViewChanged(view)) => println!(
                    "[{}] {} | {} | {}",
                    view.title,
                    view.connect_prompt()
                        .map(str::to_string)
                        .or_else(|| view.address.map(|a| a.to_string()))
                        .unwrap_or_default(),
                    view.supply_label(),
                    view.balance_label()
                ),
                Ok(ControllerEvent::MintStateChanged(state)) => {
                    println!("mint: {}", state.label())
                }
                Ok(ControllerEvent::MintAcknowledged(message)) => println!("{message}"),
                Ok(ControllerEvent::Degraded { fault, message }) => {
                    println!("degraded ({fault:?}): {message}")
                }
                Err(err) => warn!("event stream lagged: {err}"),
            }
        }
    });
    let mut notices = BroadcastStream::new(host.subscribe());
    let host_log = tokio::spawn(async move {
        while let Some(Ok(notice)) = notices.next().await {
            match notice {
                HostNotice::Ready => info!("frame: host notified ready"),
                HostNotice::Acknowledgement(message) => info!("frame: toast {message:?}"),
            }
        }
    });

    controller.mount().await;

    for quantity in args.mints {
        if !wait_until(&controller, |view| view.mint_enabled).await {
            warn!(quantity, "mint: page never became mintable, skipping");
            continue;
        }
        if let Err(rejected) = controller.mint(quantity).await {
            warn!(quantity, "mint: rejected: {rejected}");
            continue;
        }
        wait_until(&controller, |view| {
            !matches!(view.mint_state, MintRequestState::Pending)
        })
        .await;
    }

    tokio::time::sleep(Duration::from_secs(args.run_secs)).await;

    let view = controller.view().await;
    println!("{}", serde_json::to_string_pretty(&view)?);
    controller.unmount().await;
    printer.abort();
    host_log.abort();
    Ok(())
}

/// Polls the rendered view until `ready` holds; gives up after 30 seconds.
async fn wait_until(
    controller: &MintViewController,
    ready: impl Fn(&client_core::MintView) -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while tokio::time::Instant::now() < deadline {
        if ready(&controller.view().await) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}
