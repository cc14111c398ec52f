use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tk_export::config::{split_ids, Settings};
use tk_export::export::{ExportError, Exporter, Section};

#[derive(Parser)]
#[command(name = "tk-export")]
#[command(about = "Export your Tavern Keeper campaigns, characters and messages")]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export everything, or only the given sections
    Export {
        /// Sections to export (default: all)
        #[arg(long, value_enum, num_args = 1..)]
        only: Vec<Section>,
    },
    /// Check that the session cookie is logged in
    Check,
}

#[derive(Args)]
struct SettingsArgs {
    /// Tavern Keeper user id
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Value of the `tavern-keeper` session cookie
    #[arg(long, global = true)]
    cookie: Option<String>,

    /// Comma-separated campaign ids to skip
    #[arg(long, global = true)]
    done_campaigns: Option<String>,

    /// Directory the export is written to
    #[arg(long, global = true)]
    export_dir: Option<PathBuf>,

    /// API host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Delay before each request, in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    /// Also export characters attached to each campaign
    #[arg(long, global = true)]
    campaign_characters: bool,

    /// Prompt for credentials that are not configured
    #[arg(short, long, global = true)]
    interactive: bool,
}

impl SettingsArgs {
    fn to_settings(&self) -> Settings {
        Settings {
            user_id: self.user_id.clone(),
            cookie: self.cookie.clone(),
            done_campaigns: self.done_campaigns.as_deref().map(split_ids),
            host: self.host.clone(),
            export_dir: self.export_dir.clone(),
            delay_ms: self.delay_ms,
            campaign_characters: self.campaign_characters.then_some(true),
        }
    }
}

/// Initialize tracing to stderr so progress stays visible when stdout is piped.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tk_export=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let env = match Settings::from_env() {
        Ok(env) => env,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(ExitCode::from(1));
        }
    };
    let mut settings = Settings::from_file()
        .layer(env)
        .layer(cli.settings.to_settings());
    if cli.settings.interactive {
        let stdin = std::io::stdin();
        settings = settings.prompt_missing(&mut stdin.lock(), &mut std::io::stdout())?;
    }

    let config = match settings.resolve() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(ExitCode::from(1));
        }
    };

    let exporter = Exporter::new(config)?;

    match exporter.verify_login().await {
        Ok(name) => tracing::info!("+ {} logged in", name),
        Err(ExportError::NotLoggedIn) => {
            tracing::error!("+ not logged in");
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e.into()),
    }

    match cli.command {
        Some(Commands::Check) => {}
        Some(Commands::Export { only }) if !only.is_empty() => {
            exporter.export(&only).await;
        }
        Some(Commands::Export { .. }) | None => {
            exporter.export_all().await;
        }
    }

    Ok(ExitCode::SUCCESS)
}
