use arrears_controller::{
    ApiClient, ClusterApi, ControllerConfig, DebtStatusWatcher, NamespaceController,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "arrears",
    about = "Suspends and resumes namespace workloads according to their debt status"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// API server URL
    #[arg(
        long,
        global = true,
        env = "ARREARS_API_URL",
        default_value = "http://127.0.0.1:6443"
    )]
    api_url: String,
    /// YAML file with controller settings
    #[arg(long, global = true, env = "ARREARS_CONFIG")]
    config: Option<PathBuf>,
    /// Scheduler name stamped on parked pods
    #[arg(long, global = true, env = "ARREARS_SCHEDULER_NAME")]
    scheduler_name: Option<String>,
    /// Name of the zero-limit resource quota
    #[arg(long, global = true, env = "ARREARS_QUOTA_NAME")]
    quota_name: Option<String>,
    /// Seconds to wait for a pod's deletion beyond its grace period
    #[arg(long, global = true, env = "ARREARS_RECREATE_TIMEOUT_SECS")]
    recreate_timeout_secs: Option<u64>,
    /// Seconds between retries of a failed reconciliation
    #[arg(long, global = true, env = "ARREARS_RETRY_INTERVAL_SECS")]
    retry_interval_secs: Option<u64>,
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch namespaces and reconcile debt status changes until interrupted
    Run,
    /// Reconcile a single namespace once
    Reconcile {
        #[arg(long)]
        namespace: String,
    },
    /// Run the suspend pipeline on a namespace regardless of its status
    Suspend {
        #[arg(long)]
        namespace: String,
    },
    /// Run the resume pipeline on a namespace and mark it Normal
    Resume {
        #[arg(long)]
        namespace: String,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.global.log_format);

    let config = load_config(&cli.global)?;
    let api: Arc<dyn ClusterApi> = Arc::new(ApiClient::new(&cli.global.api_url));
    let controller = Arc::new(NamespaceController::new(api.clone(), config));

    match cli.command {
        Commands::Run => run_watcher(api, controller, &cli.global.api_url).await,
        Commands::Reconcile { namespace } => {
            let outcome = controller.reconcile(&namespace).await?;
            println!("{}: {}", namespace, outcome);
            Ok(())
        }
        Commands::Suspend { namespace } => {
            controller.suspend(&namespace).await?;
            println!("{}: suspended", namespace);
            Ok(())
        }
        Commands::Resume { namespace } => {
            controller.resume(&namespace).await?;
            println!("{}: resumed", namespace);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Config file (if any), then command-line / environment overrides
fn load_config(args: &GlobalArgs) -> miette::Result<ControllerConfig> {
    let mut config = match &args.config {
        Some(path) => ControllerConfig::from_yaml_file(path)?,
        None => ControllerConfig::default(),
    };

    if let Some(name) = &args.scheduler_name {
        config.scheduler_name = name.clone();
    }
    if let Some(name) = &args.quota_name {
        config.quota_name = name.clone();
    }
    if let Some(secs) = args.recreate_timeout_secs {
        config.recreate_timeout_secs = secs;
    }
    if let Some(secs) = args.retry_interval_secs {
        config.retry_interval_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

/// Run the debt status watcher until Ctrl-C
async fn run_watcher(
    api: Arc<dyn ClusterApi>,
    controller: Arc<NamespaceController>,
    api_url: &str,
) -> miette::Result<()> {
    info!(
        "Starting arrears controller against {} (scheduler: {}, quota: {})",
        api_url,
        controller.config().scheduler_name,
        controller.config().quota_name
    );

    let token = CancellationToken::new();
    let watcher = DebtStatusWatcher::new(api, controller);
    let watcher_token = token.clone();
    let watcher_handle = tokio::spawn(async move {
        if let Err(e) = watcher.run(watcher_token).await {
            error!("Debt status watcher error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    // A reconciliation in flight gets a bounded grace period
    let shutdown_timeout = std::time::Duration::from_secs(5);
    let _ = tokio::time::timeout(shutdown_timeout, watcher_handle).await;

    info!("Shutdown complete");

    Ok(())
}
