//! Command line front end for the kline service.
//!
//! Configuration comes from the environment (`KLINE_API_URL`, `KLINE_API_TIMEOUT_SECS`,
//! `KLINE_TOKEN_PATH`); log verbosity from `RUST_LOG`.

use clap::{Parser, Subcommand};
use kline_viz::{
    ApiClient, ApiError, ApiSource, ChartKind, ChartView, ClientConfig, Dashboard,
    FileTokenStore, MemoryTokenStore, OhlcvRecord, QueryError, SessionError, SessionManager,
    TokenStore,
    api::DEFAULT_PREVIEW_LIMIT,
    chart::demo_chart_option,
    model::{DatasetId, FuturesDataQuery},
};
use serde_json::Value;
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "kline-viz", version, about = "Upload, browse and chart futures kline data")]
struct Cli {
    /// Backend base URL, overriding KLINE_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session token file, overriding KLINE_TOKEN_PATH
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List instruments with uploaded data
    Instruments,
    /// Render an instrument's chart option as JSON
    Chart {
        instrument: String,
        /// candlestick or line
        #[arg(long, default_value_t = ChartKind::Candlestick)]
        kind: ChartKind,
        /// Moving-average windows, e.g. --ma 5,10,20
        #[arg(long, value_delimiter = ',')]
        ma: Vec<usize>,
        /// Write the option here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Upload a futures CSV file
    Upload { file: PathBuf },
    /// Upload a CSV file as a named dataset
    UploadDataset {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List uploaded datasets
    Datasets,
    /// Show the first rows of a dataset
    Preview {
        id: String,
        #[arg(long, default_value_t = DEFAULT_PREVIEW_LIMIT)]
        limit: u32,
    },
    /// Delete a dataset
    Delete { id: String },
    /// Show raw futures rows, one page at a time
    Rows {
        #[arg(long)]
        instrument: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },
    /// Delete stored futures rows, optionally for one instrument only
    Clear {
        #[arg(long)]
        instrument: Option<String>,
    },
    /// Log in and persist the session token
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and log in
    Register {
        username: String,
        email: String,
        #[arg(long)]
        password: String,
    },
    /// End the session and forget the stored token
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Render the built-in demo chart option
    Demo {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode chart option: {0}")]
    Encode(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env();
    if let Some(api_url) = cli.api_url {
        config.base_url = api_url;
    }
    if let Some(token_file) = cli.token_file {
        config = config.with_token_path(token_file);
    }

    let store: Arc<dyn TokenStore> = match &config.token_path {
        Some(path) => Arc::new(FileTokenStore::new(path)),
        None => {
            warn!("no token path configured, session will not outlive this process");
            Arc::new(MemoryTokenStore::default())
        }
    };

    let api = ApiClient::new(&config)?;
    let session = Arc::new(SessionManager::new(api, store)?);

    match cli.command {
        Command::Instruments => {
            let instruments = session
                .api()
                .instruments(session.credentials().as_ref())
                .await
                .map_err(|error| api_failure(&session, error))?;

            if instruments.is_empty() {
                info!("no instruments uploaded yet");
            }
            for instrument in instruments {
                println!("{instrument}");
            }
        }
        Command::Chart {
            instrument,
            kind,
            ma,
            out,
        } => {
            let view = ChartView::new(kind).with_ma_windows(ma);
            let mut dashboard = Dashboard::with_view(Arc::new(ApiSource::new(session)), view);

            let response = dashboard.select_instrument(instrument).await?;
            info!(
                instrument = %response.instrument,
                rows = response.data.len(),
                "chart data loaded"
            );

            write_option(&dashboard.chart_option(), out).await?;
        }
        Command::Upload { file } => {
            let response = session
                .api()
                .upload_csv(&file, session.credentials().as_ref())
                .await
                .map_err(|error| api_failure(&session, error))?;

            println!(
                "{}: {} records ({})",
                response.filename, response.records_count, response.message
            );
        }
        Command::UploadDataset {
            file,
            name,
            description,
        } => {
            let response = session
                .api()
                .upload_dataset(
                    &file,
                    name.as_deref(),
                    description.as_deref(),
                    session.credentials().as_ref(),
                )
                .await
                .map_err(|error| api_failure(&session, error))?;

            println!(
                "{} ({} bytes) -> dataset {}",
                response.filename,
                response.file_size,
                response.dataset_id.as_deref().unwrap_or("-")
            );
        }
        Command::Datasets => {
            let datasets = session
                .api()
                .datasets(session.credentials().as_ref())
                .await
                .map_err(|error| api_failure(&session, error))?;

            for dataset in datasets {
                println!(
                    "{}\t{}\t{} rows\t{}",
                    dataset.id,
                    dataset.name,
                    dataset.record_count,
                    dataset.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Command::Preview { id, limit } => {
            let rows = session
                .api()
                .dataset_klines(
                    &DatasetId::from(id.as_str()),
                    limit,
                    session.credentials().as_ref(),
                )
                .await
                .map_err(|error| api_failure(&session, error))?;

            println!("time\topen\thigh\tlow\tclose\tvolume");
            for record in rows.into_iter().map(OhlcvRecord::from) {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.open,
                    record.high,
                    record.low,
                    record.close,
                    record.volume
                );
            }
        }
        Command::Delete { id } => {
            session
                .api()
                .delete_dataset(&DatasetId::from(id.as_str()), session.credentials().as_ref())
                .await
                .map_err(|error| api_failure(&session, error))?;
        }
        Command::Rows {
            instrument,
            page,
            page_size,
        } => {
            let query = FuturesDataQuery {
                instrument,
                page: Some(page),
                page_size: Some(page_size),
                ..Default::default()
            };
            let rows = session
                .api()
                .futures_data(&query, session.credentials().as_ref())
                .await
                .map_err(|error| api_failure(&session, error))?;

            println!("page {} ({} rows total)", rows.page, rows.total);
            for row in rows.data {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    row.instrument, row.time, row.open, row.high, row.low, row.close, row.volume
                );
            }
        }
        Command::Clear { instrument } => {
            let response = session
                .api()
                .clear_data(instrument.as_deref(), session.credentials().as_ref())
                .await
                .map_err(|error| api_failure(&session, error))?;

            println!("{} ({} rows)", response.message, response.deleted_count);
        }
        Command::Login { email, password } => {
            let user = session.login(&email, &password).await?;
            println!("logged in as {}", user.username);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let user = session.register(&username, &email, &password).await?;
            println!("registered and logged in as {}", user.username);
        }
        Command::Logout => session.logout()?,
        Command::Whoami => match session.restore().await? {
            Some(user) => println!("{} <{}>", user.username, user.email),
            None => println!("not logged in"),
        },
        Command::Demo { out } => write_option(&demo_chart_option(), out).await?,
    }

    Ok(())
}

/// End the session if the backend rejected our credentials, then surface the error.
fn api_failure(session: &SessionManager, error: ApiError) -> CliError {
    match session.handle_api_error(&error) {
        Ok(true) => warn!("session rejected by backend, please log in again"),
        Ok(false) => {}
        Err(store_error) => warn!(%store_error, "failed to clear rejected session"),
    }
    CliError::Api(error)
}

async fn write_option(option: &Value, out: Option<PathBuf>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(option)?;
    match out {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            info!(path = %path.display(), "chart option written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
