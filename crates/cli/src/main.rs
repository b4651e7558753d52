//! `clipforge` -- command-line front end for the generation backend.
//!
//! Uploads an optional reference image, submits a generation job and
//! follows it until it finishes, printing progress as it arrives. Ctrl-C
//! cancels tracking (the job itself keeps running server-side).
//!
//! Configuration comes from the environment (see
//! [`ClientConfig::from_env`]); a `.env` file in the working directory is
//! loaded first.
//!
//! # Exit codes
//!
//! | Code  | Meaning                                   |
//! |-------|-------------------------------------------|
//! | `0`   | Job completed / asset uploaded            |
//! | `1`   | Job failed or the request was rejected    |
//! | `2`   | Still running after the poll budget; try later |
//! | `130` | Cancelled with Ctrl-C                     |

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use clipforge_client::events::{JobEvent, Notice, ProgressUpdate};
use clipforge_client::http::{HttpTransport, ReqwestTransport};
use clipforge_client::session::JobSession;
use clipforge_client::upload::{AssetUploader, LocalAsset};
use clipforge_core::config::ClientConfig;
use clipforge_core::job::{
    GenerationKind, JobOutput, JobRequest, DEFAULT_DURATION_SECS, DEFAULT_THEME,
};
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_FAILURE: u8 = 1;
const EXIT_TRY_LATER: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Override `API_BASE_URL`.
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Print events as JSON lines instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a generation job and follow it to completion.
    Generate(GenerateArgs),
    /// Upload a reference image and print its URL.
    Upload {
        /// JPEG or PNG file.
        path: PathBuf,
    },
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Product the content is about.
    #[arg(long, value_name = "NAME")]
    product: String,

    #[arg(long, default_value = DEFAULT_THEME)]
    theme: String,

    /// Target duration in seconds.
    #[arg(long, default_value_t = DEFAULT_DURATION_SECS)]
    duration: u32,

    #[arg(long, value_enum, default_value_t = KindArg::Video)]
    kind: KindArg,

    /// Usage scenario to feature.
    #[arg(long)]
    scenario: Option<String>,

    /// Reference image to upload before submitting.
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Video,
    Script,
}

impl From<KindArg> for GenerationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Video => GenerationKind::Video,
            KindArg::Script => GenerationKind::Script,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipforge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "clipforge failed");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
        config.validate()?;
    }

    tracing::info!(
        base_url = %config.base_url,
        poll_interval_ms = config.poll_interval_ms,
        max_poll_attempts = config.max_poll_attempts,
        "Loaded client configuration",
    );

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config));

    match cli.command {
        Command::Upload { path } => {
            let url = upload(&path, &config, transport).await?;
            println!("{url}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate(args) => generate(args, &config, transport, cli.json).await,
    }
}

async fn upload(
    path: &std::path::Path,
    config: &ClientConfig,
    transport: Arc<dyn HttpTransport>,
) -> anyhow::Result<String> {
    let asset = LocalAsset::from_path(path).await?;
    let url = AssetUploader::new(transport, config).upload(asset).await?;
    Ok(url)
}

async fn generate(
    args: GenerateArgs,
    config: &ClientConfig,
    transport: Arc<dyn HttpTransport>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let mut request = JobRequest::new(args.product, args.kind.into())
        .with_theme(args.theme)
        .with_duration(args.duration);
    if let Some(scenario) = args.scenario {
        request = request.with_scenario(scenario);
    }
    if let Some(path) = &args.image {
        let url = upload(path, config, Arc::clone(&transport)).await?;
        if !json {
            println!("Uploaded {} -> {url}", path.display());
        }
        request = request.with_image_url(url);
    }
    request.ensure_valid()?;

    let session = JobSession::new(transport, config)?;
    let mut events = session.start(request)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;
    let mut terminal = None;

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    print_event(&event, json)?;
                    if event.is_terminal() {
                        terminal = Some(event);
                    }
                }
                None => break,
            },
            _ = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                session.cancel();
            }
        }
    }

    Ok(ExitCode::from(exit_code(terminal.as_ref())))
}

fn exit_code(terminal: Option<&JobEvent>) -> u8 {
    match terminal {
        Some(JobEvent::Cancelled) => EXIT_CANCELLED,
        Some(event) => match event.notice() {
            Some(Notice::Success) => 0,
            Some(Notice::TryLater) => EXIT_TRY_LATER,
            Some(Notice::Failure(_)) | None => EXIT_FAILURE,
        },
        None => EXIT_FAILURE,
    }
}

fn print_event(event: &JobEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        JobEvent::Progress(update) => println!("{}", progress_line(update)),
        JobEvent::Completed(JobOutput::Script { content }) => println!("{content}"),
        JobEvent::Completed(JobOutput::Media(media)) => {
            println!("Done: {}", media.primary());
            if media.segments().len() > 1 {
                for (i, url) in media.segments().iter().enumerate() {
                    println!("  part {}: {url}", i + 1);
                }
            }
        }
        JobEvent::Failed(reason) => eprintln!("Failed: {}", reason.message()),
        JobEvent::TimedOut { handle, attempts } => eprintln!(
            "Still running after {attempts} checks; look up job {handle} later"
        ),
        JobEvent::Cancelled => eprintln!("Cancelled"),
    }
    Ok(())
}

fn progress_line(update: &ProgressUpdate) -> String {
    let mut line = match update.percent {
        Some(p) => format!("[{p:>3}%]"),
        None => "[ ... ]".to_string(),
    };
    if let (Some(done), Some(total)) = (update.completed_parts, update.total_parts) {
        line.push_str(&format!(" {done}/{total}"));
    }
    if let Some(message) = update.message.as_deref().or(update.current_step.as_deref()) {
        line.push(' ');
        line.push_str(message);
    }
    line
}
