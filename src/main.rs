use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voxpipe::api::ApiServer;
use voxpipe::audio::{AudioPlayer, BlockingPlayer, record_utterance};
use voxpipe::config::API_KEY_VAR;
use voxpipe::models::ModelCatalog;
use voxpipe::{Config, Error, Outcome, Pipeline};

/// voxpipe - speak a question, hear the answer
#[derive(Parser)]
#[command(name = "voxpipe", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web UI server (default)
    Serve {
        /// Port to listen on
        #[arg(long, env = "VOXPIPE_PORT", default_value = "7538")]
        port: u16,
    },
    /// Run one voice interaction in the console
    Converse,
    /// List the models available to the configured credential
    Models,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voxpipe=info",
        1 => "info,voxpipe=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::Converse) => converse().await,
        Some(Command::Models) => list_models().await,
        Some(Command::Serve { port }) => serve(port).await,
        None => serve(7538).await,
    }
}

/// Run the web UI server
async fn serve(port: u16) -> anyhow::Result<()> {
    // Credential is checked before any interaction logic runs
    let config = Config::from_env()?;

    tracing::info!(port, "starting voxpipe UI");
    ApiServer::new(&config, port).run().await?;

    Ok(())
}

/// One capture → respond → play cycle, then exit
async fn converse() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let pipeline = Pipeline::new(&config);

    println!("Listening...");
    let capture = config.capture.clone();
    let sample = tokio::task::spawn_blocking(move || record_utterance(&capture)).await??;

    match pipeline.converse(&sample).await? {
        Outcome::Reply {
            transcript,
            reply,
            artifact,
        } => {
            println!("You said: {transcript}");
            println!("Assistant says: {reply}");

            // Block until playback completes, then the artifact is removed
            tokio::task::spawn_blocking(move || BlockingPlayer::new().play(artifact)).await??;
        }
        recoverable => {
            if let Some(notice) = recoverable.notice() {
                println!("{notice}");
            }
        }
    }

    Ok(())
}

/// Diagnostic: print every available model, one per line
async fn list_models() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(Error::Config(_)) => {
            // No credential in the environment; ask for it directly
            let api_key: String = dialoguer::Password::new()
                .with_prompt(format!("Provide your {API_KEY_VAR}"))
                .interact()?;
            Config::with_api_key(api_key)
        }
        Err(e) => return Err(e.into()),
    };

    let catalog = ModelCatalog::new(&config);
    for model in catalog.list().await? {
        println!("{model}");
    }

    Ok(())
}
