//! ouscope command line
//!
//! Browse, download, submit and analyse telescope.org observations.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ouscope::{
    catalog::CatalogClient,
    client::{ObsQuery, Observatory, Telescope},
    config::Config,
    coords::SkyPosition,
    process::{AnalysisOutcome, Pipeline, ProcessOutcome},
    render::LabelStyle,
    solver::{PlateSolver, Solver, JOB_CPU_TIMEOUT},
    storage::Database,
    types::{RequestSort, Submission, SubmitOptions},
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "ouscope")]
#[command(about = "Work with telescope.org observations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ./ouscope.toml, ~/.config/ouscope/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Print more status info
    #[arg(short, long)]
    verbose: bool,

    /// Print debugging info
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List requests in a folder
    Requests {
        /// Folder id (Inbox = 1)
        #[arg(short, long, default_value = "1")]
        folder: u64,
        /// Sort column: rid, object or completion
        #[arg(short, long, default_value = "rid")]
        sort: RequestSort,
    },
    /// List request-manager folders
    Folders,
    /// Search finished observations
    Observations {
        /// Number of days to look back
        #[arg(long, default_value = "1")]
        days: i64,
        /// Last day of the search (YYYY-MM-DD), today when omitted
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        filter: String,
        #[arg(long, default_value = "")]
        camera: String,
    },
    /// Show a job page
    Job { jid: u64 },
    /// Show a request page
    Request { rid: u64 },
    /// Download the data of a job
    Download {
        jid: u64,
        /// 3D FITS cube instead of the zip of frames
        #[arg(long)]
        cube: bool,
        /// Processed image instead of the raw data
        #[arg(long)]
        processed: bool,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Submit a RA/Dec request
    Submit {
        /// Right ascension, hours (h:m:s)
        ra: String,
        /// Declination, degrees (d:m:s)
        dec: String,
        #[arg(short, long, default_value = "RaDec object")]
        name: String,
        /// Exposure per filter, seconds
        #[arg(short, long, default_value = "30")]
        exposure: f64,
        #[arg(short, long, default_value = "COAST")]
        telescope: String,
        #[arg(short, long, default_value = "BVR")]
        filter: String,
        #[arg(long, default_value = "AutoSubmit")]
        comment: String,
        /// Skip the dark frame
        #[arg(long)]
        no_dark: bool,
        /// Walk the HTML request wizard instead of the JSON API
        #[arg(long)]
        wizard: bool,
    },
    /// Plate-solve the frames of a job
    Solve {
        jid: u64,
        /// Ignore cached solutions
        #[arg(long)]
        force: bool,
    },
    /// Find the variable stars of a job and update their records
    Analyse {
        jid: u64,
        /// Request id, taken from the job page when omitted
        #[arg(long)]
        rid: Option<u64>,
        #[arg(long)]
        reprocess: bool,
    },
    /// Analyse a job and render an annotated preview
    Process {
        jid: u64,
        #[arg(long)]
        reprocess: bool,
        /// Use only this frame of the archive
        #[arg(long)]
        layer: Option<usize>,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// List recorded variable stars
    Stars,
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

    if let Commands::Stars = cli.command {
        return show_stars(&config).await;
    }

    let mut scope = Telescope::connect(&config).await?;
    let result = run(&scope, &config, cli.command).await;
    scope.logout().await?;
    result
}

async fn run(scope: &Telescope, config: &Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Requests { folder, sort } => {
            let requests = scope.get_user_requests(folder, sort).await?;
            println!("{:>8} {:<20} {}", "Id", "Status", "Object");
            println!("{}", "-".repeat(60));
            for r in requests {
                println!("{:>8} {:<20} {}", r.id, r.status().text(), r.objectname);
            }
        }
        Commands::Folders => {
            for f in scope.get_user_folders().await? {
                println!("{:>6} {}", f.id, f.name);
            }
        }
        Commands::Observations {
            days,
            end,
            filter,
            camera,
        } => {
            let query = ObsQuery {
                end: end.and_then(|d| d.and_hms_opt(0, 0, 0)),
                days,
                filter,
                camera,
                ..Default::default()
            };
            let search = scope.get_obs_list(&query).await?;
            for line in search.summary.parameters.iter().chain(&search.summary.results) {
                println!("{line}");
            }
            for jid in search.job_ids {
                println!("{jid}");
            }
        }
        Commands::Job { jid } => {
            let job = scope.get_job(jid).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Request { rid } => {
            let req = scope.get_request(rid).await?;
            println!("{}", serde_json::to_string_pretty(&req)?);
        }
        Commands::Download {
            jid,
            cube,
            processed,
            output,
        } => {
            std::fs::create_dir_all(&output)?;
            let job = scope.get_job(jid).await?;
            let file = if processed {
                scope.download_obs_processed(&job, &output, cube, true).await?
            } else {
                scope.download_obs(&job, &output, cube, true).await?
            };
            match file {
                Some(name) => println!("{}", output.join(name).display()),
                None => anyhow::bail!("Download of job {jid} failed"),
            }
        }
        Commands::Solve { jid, force } => {
            let solver = Solver::new(&config.solver, &config.cache);
            let job = scope.get_job(jid).await?;
            for frame in scope.frames(&job).await? {
                match solver.solve(&frame, force).await? {
                    Some(wcs) => {
                        let c = wcs.center();
                        println!(
                            "{:<24} {} {}  {:.3}\"/px",
                            frame.name,
                            c.format_ra(":", 1),
                            c.format_dec(":", 0),
                            wcs.pixel_scale_arcsec()
                        );
                    }
                    None => println!("{:<24} not solved", frame.name),
                }
            }
        }
        Commands::Analyse { jid, rid, reprocess } => {
            let solver = Solver::new(&config.solver, &config.cache).with_cpu_timeout(JOB_CPU_TIMEOUT);
            let catalog = CatalogClient::new(&config.catalog)?;
            let db = Database::connect(config.cache.database_path()).await?;
            let pipeline = Pipeline::new(scope, &solver, &catalog, &db);

            match pipeline.analyse_job(jid, rid, reprocess).await? {
                AnalysisOutcome::AlreadyDone => println!("J{jid}: already processed"),
                AnalysisOutcome::Unsolved => println!("J{jid}: cannot solve"),
                AnalysisOutcome::Analysed(a) => {
                    println!("J{}:R{} {} [{}]", a.jid, a.rid, a.target, a.filters.join(" "));
                    for star in a.stars {
                        println!("  {}", star.name);
                    }
                }
            }
        }
        Commands::Process {
            jid,
            reprocess,
            layer,
            output,
        } => {
            let solver = Solver::new(&config.solver, &config.cache).with_cpu_timeout(JOB_CPU_TIMEOUT);
            let catalog = CatalogClient::new(&config.catalog)?;
            let db = Database::connect(config.cache.database_path()).await?;
            let labels = LabelStyle::load(&config.render.font_path(), config.render.label_px);
            let pipeline = Pipeline::new(scope, &solver, &catalog, &db)
                .with_output_dir(output)
                .with_labels(labels.as_ref());

            match pipeline.process_job(jid, reprocess, layer).await? {
                ProcessOutcome::AlreadyDone => println!("J{jid}: already processed"),
                ProcessOutcome::Unsolved { preview } => {
                    println!("J{jid}: cannot solve, preview {}", preview.display())
                }
                ProcessOutcome::Rendered { analysis, preview } => {
                    println!("J{jid}: {} stars, preview {}", analysis.stars.len(), preview.display())
                }
            }
        }
        Commands::Submit {
            ra,
            dec,
            name,
            exposure,
            telescope,
            filter,
            comment,
            no_dark,
            wizard,
        } => {
            let target = SkyPosition::from_hours_degrees(&ra, &dec)?;
            let opts = SubmitOptions {
                exposure_ms: (exposure * 1000.0).round() as u64,
                telescope,
                filter,
                dark_frame: !no_dark,
                name,
                comment,
            };
            submit(scope, &target, &opts, wizard).await?;
        }
        Commands::Stars => show_stars(config).await?,
    }
    Ok(())
}

async fn submit(scope: &Telescope, target: &SkyPosition, opts: &SubmitOptions, wizard: bool) -> anyhow::Result<()> {
    if wizard {
        scope.submit_radec_job(target, opts).await?;
        println!("Submitted {} ({})", opts.name, target);
        return Ok(());
    }
    match scope.submit_job_api(target, opts).await? {
        Submission::Accepted { rid } => println!("Submitted {} => id: {}", opts.name, rid),
        Submission::Rejected { status } => anyhow::bail!("Submission rejected: {status}"),
    }
    Ok(())
}

async fn show_stars(config: &Config) -> anyhow::Result<()> {
    let db = Database::connect(config.cache.database_path()).await?;
    println!("{:<16} {:>5} {:<10} {}", "Star", "Jobs", "Chart", "Comp");
    println!("{}", "-".repeat(45));
    for star in db.variable_stars().await? {
        let (chart, comps) = match &star.sequence {
            Some(seq) => (seq.chart_id.as_str(), seq.stars.len()),
            None => ("-", 0),
        };
        println!("{:<16} {:>5} {:<10} {}", star.name, star.jobs.len(), chart, comps);
    }
    Ok(())
}
