//! Crawl the bitcoin network and write the discovered nodes as JSON.

use bitcoin::Network;
use clap::{Parser, ValueEnum};
use log::{error, info, LevelFilter};
use peermap_connection::default_port;
use peermap_crawler::seeds::{self, Seed};
use peermap_crawler::{CrawlerBuilder, Output, DEFAULT_CONCURRENCY, DEFAULT_TARGET};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum NetworkArg {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Mainnet => Network::Bitcoin,
            NetworkArg::Testnet => Network::Testnet,
            NetworkArg::Signet => Network::Signet,
            NetworkArg::Regtest => Network::Regtest,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stop once this many distinct hosts have been seen.
    #[arg(long, default_value_t = DEFAULT_TARGET)]
    target: usize,

    /// Maximum number of peers contacted at once.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Per peer session timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Timeout of the whole crawl in seconds.
    #[arg(long, default_value_t = 600)]
    global_timeout: u64,

    /// Pause in milliseconds after each batch of new connections.
    #[arg(long, default_value_t = 0)]
    batch_delay: u64,

    /// Never pause between batches, overrides --batch-delay.
    #[arg(long)]
    no_delay: bool,

    /// Network to crawl.
    #[arg(long, value_enum, default_value_t = NetworkArg::Mainnet)]
    network: NetworkArg,

    /// Seed peer as host[:port], repeatable. Defaults to the network's DNS seeds.
    #[arg(long = "seed", value_name = "HOST[:PORT]")]
    seeds: Vec<String>,

    /// Output path, "-" for stdout.
    #[arg(long, default_value = "-")]
    output: String,

    /// Only dial and report globally routable addresses.
    #[arg(long)]
    public_only: bool,

    /// Custom user agent (optional), formatted /name:version/.
    #[arg(long)]
    user_agent: Option<String>,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply();
    if let Err(e) = logger {
        eprintln!("Failed to install logger: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let network = Network::from(args.network);
    let port = default_port(network);

    let batch_delay = if args.no_delay {
        Duration::ZERO
    } else {
        Duration::from_millis(args.batch_delay)
    };

    let mut builder = CrawlerBuilder::new(network)
        .with_target(args.target)?
        .with_concurrency(args.concurrency)
        .with_session_timeout(Duration::from_secs(args.timeout))
        .with_global_timeout(Duration::from_secs(args.global_timeout))
        .with_batch_delay(batch_delay)
        .with_public_only(args.public_only);
    if let Some(user_agent) = args.user_agent {
        log::debug!("Using custom user agent: {user_agent}");
        builder = builder.with_user_agent(user_agent)?;
    }
    let crawler = builder.build();

    let seeds = if args.seeds.is_empty() {
        Seed::defaults(network, port)
    } else {
        args.seeds
            .iter()
            .map(|seed| Seed::parse(seed, port))
            .collect::<Result<Vec<_>, _>>()?
    };
    let resolved = seeds::resolve(&seeds).await;
    info!(
        "Resolved {} seed addresses from {} seeds",
        resolved.len(),
        seeds.len()
    );

    let result = crawler.crawl(resolved).await?;
    Output::parse(&args.output).write(&result)?;
    Ok(())
}
