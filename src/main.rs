use clap::Parser;
use gif_ledger_client::{
    config::{load_keypair, Config},
    network::local::LocalLedger,
    CommandFacade, Keypair, KeypairWallet, LedgerAccountRef, SnapshotStatus, View,
};
use log::{info, warn};
use std::{path::PathBuf, sync::Arc};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Shared GIF board backed by a ledger account
#[derive(Parser, Debug)]
#[command(name = "gif-ledger", version)]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the cluster named in the config. Only reported in the logs;
    /// commands always run against the in-process ledger
    #[arg(long)]
    cluster: Option<String>,
    /// Overrides the ledger keypair path from the config
    #[arg(long)]
    ledger_keypair: Option<PathBuf>,
    /// Overrides the wallet keypair path from the config
    #[arg(long)]
    wallet_keypair: Option<PathBuf>,
    /// Treat the wallet as already trusted, so startup connects silently
    #[arg(long)]
    trusted: bool,
}

const HELP: &str = "commands: connect | disconnect | init | add <link> | vote <link> | refresh | show [--json] | quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(cluster) = args.cluster {
        config.cluster = cluster;
    }
    if let Some(path) = args.ledger_keypair {
        config.ledger_keypair = path;
    }
    if args.wallet_keypair.is_some() {
        config.wallet_keypair = args.wallet_keypair;
    }
    config.trusted |= args.trusted;

    let ledger = if config.ledger_keypair.exists() {
        load_keypair(&config.ledger_keypair)?
    } else {
        warn!(
            "{} not found, using a throwaway ledger keypair",
            config.ledger_keypair.display()
        );
        Keypair::generate()
    };
    let wallet_keypair = match &config.wallet_keypair {
        Some(path) => load_keypair(path)?,
        None => Keypair::generate(),
    };

    info!(
        "simulating {} ({}) in process, commitment {}",
        config.cluster,
        config.rpc_url(),
        config.commitment
    );
    let connection = Arc::new(LocalLedger::new(config.commitment));
    let wallet = Arc::new(KeypairWallet::new(wallet_keypair, config.trusted, true));
    let facade = CommandFacade::new(connection, wallet, LedgerAccountRef::new(ledger));

    // silent reconnect, as on page load
    let _ = facade.connect(true).await;
    render(&facade.view());
    println!("{}", HELP);

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, arg) = match line.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        let res = match command {
            "" => continue,
            "quit" | "exit" => break,
            "connect" => facade.connect(false).await.map(|_| ()),
            "disconnect" => {
                facade.disconnect().await;
                Ok(())
            }
            "init" => facade.initialize().await.map(|_| ()),
            "add" => facade.append(arg).await.map(|_| ()),
            "vote" => facade.vote(arg).await.map(|_| ()),
            "refresh" => facade.refresh().await.map(|_| ()),
            "show" if arg == "--json" => {
                println!("{}", serde_json::to_string_pretty(&facade.view())?);
                continue;
            }
            "show" => Ok(()),
            _ => {
                println!("{}", HELP);
                continue;
            }
        };

        if let Err(e) = res {
            println!("error: {}", e);
        }
        render(&facade.view());
    }

    Ok(())
}

fn render(view: &View) {
    let identity = match view.identity {
        Some(identity) => identity,
        None => {
            println!("not connected, try `connect`");
            return;
        }
    };
    println!("connected as {}", identity);

    let snapshot = &view.snapshot;
    match snapshot.status {
        SnapshotStatus::Uninitialized => {
            println!("ledger not initialized yet, run `init` once");
            return;
        }
        SnapshotStatus::Unknown => println!("(ledger state unknown, `refresh` to retry)"),
        SnapshotStatus::Ready => {}
    }

    println!("{} gifs", snapshot.total_entries);
    for entry in &snapshot.entries {
        println!(
            "  {:>4} votes  {}  (owner {})",
            entry.vote_count, entry.payload_ref, entry.owner
        );
    }
    if view.busy {
        println!("(busy)");
    }
}
