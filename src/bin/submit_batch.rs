//! Keep a watch list of variable stars in the observing queue
//!
//! Stars without a queued request are listed; with `--submit` they are
//! submitted as COAST BVR requests.

use clap::Parser;
use ouscope::{
    batch::{submit_var_star, WatchList},
    catalog::CatalogClient,
    client::Telescope,
    config::Config,
    types::{RequestSort, Submission},
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "submit-batch")]
#[command(about = "Submit watch-list stars missing from the observing queue")]
struct Cli {
    /// Watch list (TOML with [[target]] entries)
    #[arg(default_value = "batch.toml")]
    list: PathBuf,

    /// Execute the submission
    #[arg(short, long)]
    submit: bool,

    /// Just do the job. Stay quiet
    #[arg(short, long)]
    quiet: bool,

    /// Print more status info
    #[arg(short, long)]
    verbose: bool,

    /// Print debugging info
    #[arg(short, long)]
    debug: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,
}

/// Print unless quiet
macro_rules! qprint {
    ($cli:expr, $($arg:tt)*) => {
        if !$cli.quiet {
            print!($($arg)*);
        }
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = Config::load_or_default(cli.config.as_deref())?;
    let list = WatchList::load(&cli.list)?;

    tracing::info!("Log in to telescope.org ...");
    let mut scope = Telescope::connect(&config).await?;
    let result = run(&cli, &config, &scope, &list).await;
    scope.logout().await?;
    tracing::info!("Done.");
    result
}

async fn run(cli: &Cli, config: &Config, scope: &Telescope, list: &WatchList) -> anyhow::Result<()> {
    tracing::info!("Getting observing queue ...");
    let requests = scope.get_user_requests(1, RequestSort::Completion).await?;
    let missing = list.missing(&requests);

    if cli.verbose && !cli.quiet {
        println!("Queue:");
        for r in requests.iter().filter(|r| r.status().is_queued()) {
            println!("{}", r.objectname);
        }
    }

    if missing.is_empty() {
        qprint!(cli, "No missing jobs. Nothing to do!\n");
        return Ok(());
    }

    if cli.submit {
        qprint!(cli, "Submitting missing jobs:\n");
    } else {
        qprint!(cli, "Dry run. Add -s to the command line to do actual submissions.\n");
    }

    let catalog = CatalogClient::new(&config.catalog)?;
    for target in missing {
        let (designation, constellation) = target.name.rsplit_once(' ').unwrap_or((target.name.as_str(), ""));
        qprint!(
            cli,
            "{:>8} {} exp:{:5.1}s   {}",
            designation,
            constellation,
            target.exposure_secs,
            target.comment
        );

        if cli.submit {
            match submit_var_star(scope, &catalog, &target.name, target.exposure_secs, &target.comment).await {
                Ok(Submission::Accepted { rid }) => qprint!(cli, " => id: {}", rid),
                Ok(Submission::Rejected { status }) => qprint!(cli, " Failure:{}", status),
                Err(e) => qprint!(cli, " Failure:{}", e),
            }
        }
        qprint!(cli, "\n");
    }

    Ok(())
}
