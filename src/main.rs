use anyhow::Context;
use boss_engine::{
    app::{
        App,
        RunState,
        actix_game_api::ActixGameApi,
        init_tracing,
        sled_store::SledBossStore,
    },
    clock::{
        PhasePolicy,
        SystemClock,
    },
    config::GameConfig,
    engine::{
        BossEngine,
        RandomChance,
    },
    mirror::{
        MirrorConfig,
        MirrorSynchronizer,
        identity::ServerIdentity,
        rpc::HttpChainClient,
        transport::Address,
    },
    payment::HttpPaymentVerifier,
};
use clap::Parser;
use std::{
    env::current_dir,
    fs,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use url::Url;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for the authoritative store. Defaults to ./boss_engine_data.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Base ledger JSON-RPC endpoint.
    #[arg(long)]
    base_url: Url,

    /// Delegation router endpoint used to locate execution endpoints.
    #[arg(long)]
    router_url: Url,

    /// Payment verification service endpoint.
    #[arg(long)]
    payment_url: Url,

    /// Hex address of the mirror program.
    #[arg(long)]
    program: String,

    /// Hex address marking delegated account ownership.
    #[arg(long)]
    delegation_program: String,

    /// Path to the server's hex-encoded operating key. Without it a fresh
    /// ephemeral identity is generated on every start.
    #[arg(long)]
    keypair: Option<PathBuf>,

    /// Run the fight outside the weekend window, for local testing.
    #[arg(long, default_value = "false")]
    always_open: bool,

    /// Seconds between passive accrual sweeps.
    #[arg(long, default_value = "60")]
    tick_secs: u64,

    #[arg(short, long, default_value = "false")]
    tracing: bool,
}

async fn handle_interupt() {
    let res = tokio::signal::ctrl_c().await;
    match res {
        Ok(_) => {
            tracing::info!("Received interrupt, exiting");
        }
        Err(_) => {
            tracing::warn!("Received interrupt error, exiting anyway");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.tracing {
        init_tracing();
    }

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => current_dir()
            .context("determine process working directory")?
            .join("boss_engine_data"),
    };
    fs::create_dir_all(&data_dir)?;
    tracing::info!("Using sled storage directory {}", data_dir.display());
    let store = SledBossStore::open(&data_dir)?;

    let identity = match &args.keypair {
        Some(path) => ServerIdentity::from_key_file(path)
            .with_context(|| format!("loading keypair from {}", path.display()))?,
        None => {
            tracing::warn!(
                "No keypair provided; using an ephemeral identity. Mirror accounts \
                 initialized now will be unreachable after a restart."
            );
            ServerIdentity::ephemeral()
        }
    };
    tracing::info!("Operating as authority {}", identity.address());

    let mirror_config = MirrorConfig {
        program: Address::from_hex(&args.program).context("parsing --program")?,
        delegation_program: Address::from_hex(&args.delegation_program)
            .context("parsing --delegation-program")?,
        base_endpoint: args.base_url.clone(),
    };
    let chain = HttpChainClient::new(args.base_url, args.router_url)?;
    let mirror = Arc::new(MirrorSynchronizer::new(chain, identity, mirror_config));

    let payments = HttpPaymentVerifier::new(args.payment_url)?;
    let phase = if args.always_open {
        PhasePolicy::AlwaysOpen
    } else {
        PhasePolicy::WeekendOnly
    };
    let engine = BossEngine::new(
        store,
        payments,
        SystemClock,
        RandomChance,
        GameConfig::default(),
        phase,
    );

    let api = ActixGameApi::new(args.port).await?;
    let mut app = App::new(
        api,
        engine,
        mirror,
        SystemClock,
        phase,
        Duration::from_secs(args.tick_secs),
    );

    tracing::info!("Starting boss engine service");
    loop {
        let interrupt = handle_interupt();
        match app.run(interrupt).await? {
            RunState::Continue => continue,
            RunState::Exit => {
                tracing::info!("Exiting boss engine service");
                return Ok(());
            }
        }
    }
}
