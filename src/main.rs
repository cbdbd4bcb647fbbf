//! tokx - Bitcoin/Currency Exchange Backend
//!
//! Exchanges bitcoin deposits for currency units on the native ledger and
//! pays redeemed units back out in bitcoin.
//!
//! Run modes:
//!   cargo run -- api             - Start the exchange API server

use std::env;
use std::process;
use std::sync::Arc;

use tokx::api::{start_server, AppState};
use tokx::bitcoin::{BitcoinRpc, BitcoindClient};
use tokx::config::{ExchangeConfig, SuspendSwitch};
use tokx::ledger::LedgerClient;
use tokx::logging;
use tokx::reconciler::{spawn_reconciler, Reconciler};
use tokx::registry::AccountRegistry;
use tokx::storage::SqliteExchangeStore;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "api" => {
            if let Err(e) = run_api_server(&args[2..]).await {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("tokx - Bitcoin/Currency Exchange Backend");
    println!();
    println!("Usage:");
    println!("  tokx-api api [--port <port>] [--db <path>]   Start the exchange API server");
    println!();
    println!("Environment Variables:");
    println!("  TOKX_REDEMPTION_ACCOUNT  Ledger account that receives redeemed units (required)");
    println!("  TOKX_CURRENCY_ID         Ledger currency id (default: 1)");
    println!("  TOKX_RATE                Currency units per BTC (default: 1000)");
    println!("  TOKX_CONFIRMATIONS       Confirmations before settlement (default: 3)");
    println!("  TOKX_BITCOIND_URL        bitcoind RPC endpoint (default: http://127.0.0.1:18332)");
    println!("  TOKX_LEDGER_URL          Native ledger endpoint (default: http://127.0.0.1:7876)");
    println!("  TOKX_DB_PATH             SQLite database path (default: data/tokx.db)");
    println!("  TOKX_API_PORT            API port (default: 3001)");
}

/// Start the exchange API server
async fn run_api_server(args: &[String]) -> tokx::Result<()> {
    let mut config = ExchangeConfig::from_env()?;

    // Parse arguments
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.api_port = args[i + 1].parse().unwrap_or(config.api_port);
                i += 2;
            }
            "--db" if i + 1 < args.len() => {
                config.db_path = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }

    config.validate()?;
    logging::init_from_config(&config)?;
    config.print_summary();

    let store = Arc::new(SqliteExchangeStore::new(&config.db_path)?);

    let bitcoin_client = BitcoindClient::new(
        &config.bitcoind_url,
        &config.bitcoind_user,
        &config.bitcoind_password,
    );
    bitcoin_client.set_tx_fee(config.tx_fee).await?;
    let bitcoin: Arc<dyn BitcoinRpc> = Arc::new(bitcoin_client);

    let ledger = Arc::new(LedgerClient::new(
        &config.ledger_url,
        config.currency_id,
        config.redemption_account_id,
    ));

    let config = Arc::new(config);
    let suspend = SuspendSwitch::default();

    let registry = Arc::new(AccountRegistry::new(store.clone(), bitcoin.clone()));
    let reconciler = Reconciler::new(
        store.clone(),
        bitcoin,
        ledger,
        config.clone(),
        suspend.clone(),
    );
    let (handle, _worker) = spawn_reconciler(reconciler);

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        registry,
        reconciler: handle,
        suspend,
    });

    start_server(state, config.api_port).await?;
    Ok(())
}
