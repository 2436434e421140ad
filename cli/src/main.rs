//! rendergate CLI - drive the render-redirection pipeline by hand.
//!
//! # Commands
//!
//! | Command | What it does |
//! |---------|--------------|
//! | `plan` | Show how the pipeline treats a URL, optionally with a score or a saved plain body |
//! | `unwrap` | Reconstitute a saved rendering-service reply into a page |
//! | `fetch` | Fetch a URL end to end, going through the rendering service when a rule fires |
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` filter);
//! reports are JSON on stdout.

mod fetch;
mod report;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rendergate_config::RendergateConfig;
use rendergate_render::{RenderPipeline, ResponseOutcome};
use rendergate_types::{
    CrawlRequest, CrawlResponse, DirectiveName, Method, RenderMarker, Screenshot, Url,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::fetch::Downloader;
use crate::report::{PageReport, PlanStep, RunReport};

#[derive(Parser)]
#[command(
    name = "rendergate",
    about = "Route crawl fetches through a headless-browser rendering service",
    version
)]
struct Cli {
    /// Config file (default: $RENDERGATE_CONFIG, then ~/.rendergate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what the pipeline would do with a URL
    Plan(PlanArgs),
    /// Reconstitute a saved rendering-service reply
    Unwrap(UnwrapArgs),
    /// Fetch a URL through the pipeline
    Fetch(FetchArgs),
}

/// How the seed request is built.
#[derive(Args)]
struct SeedArgs {
    /// Page URL
    url: Url,

    /// Score metadata, as an upstream scorer would attach it
    #[arg(long)]
    score: Option<f64>,

    /// Ask for rendering up front
    #[arg(long)]
    render: bool,

    /// Ask for rendering with this directive up front
    #[arg(long)]
    directive: Option<String>,
}

#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    seed: SeedArgs,

    /// HTTP method of the seed request
    #[arg(long, default_value = "GET")]
    method: Method,

    /// Simulate the plain fetch returning this body
    #[arg(long)]
    body_file: Option<PathBuf>,
}

#[derive(Args)]
struct OutputArgs {
    /// Write the page body here
    #[arg(long)]
    html_out: Option<PathBuf>,

    /// Write an inline screenshot here
    #[arg(long)]
    png_out: Option<PathBuf>,
}

#[derive(Args)]
struct UnwrapArgs {
    /// URL of the page the reply stands for
    #[arg(long)]
    target: Url,

    /// File holding the reply body
    #[arg(long)]
    reply: PathBuf,

    /// HTTP status the service answered with
    #[arg(long, default_value_t = 200)]
    status: u16,

    /// Whether the call asked for a screenshot
    #[arg(long)]
    png_requested: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct FetchArgs {
    #[command(flatten)]
    seed: SeedArgs,

    /// Timeout for downloads that do not carry their own, in seconds
    /// (default: `service.download_timeout_seconds`)
    #[arg(long)]
    timeout: Option<u64>,

    #[command(flatten)]
    output: OutputArgs,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let loaded = RendergateConfig::load(cli.config.as_deref())?;
    if let Some(path) = &loaded.path {
        tracing::debug!(path = %path.display(), "Loaded config");
    }
    let pipeline =
        RenderPipeline::from_config(&loaded.config).context("invalid rendergate configuration")?;

    match cli.command {
        Commands::Plan(args) => plan(&pipeline, args)?,
        Commands::Unwrap(args) => unwrap_reply(&pipeline, args)?,
        Commands::Fetch(args) => {
            let timeout = args
                .timeout
                .unwrap_or_else(|| u64::from(loaded.config.download_timeout_seconds()));
            let downloader = Downloader::new(Duration::from_secs(timeout))?;
            let seed = seed_request(&pipeline, args.seed, Method::Get)?;
            let page = fetch::fetch(&pipeline, &downloader, seed).await?;
            emit_page(&pipeline, &page, &args.output)?;
        }
    }

    Ok(())
}

fn seed_request(pipeline: &RenderPipeline, seed: SeedArgs, method: Method) -> Result<CrawlRequest> {
    let mut request = CrawlRequest::get(seed.url).with_method(method);
    request.meta.score = seed.score;

    let directive = seed
        .directive
        .map(DirectiveName::new)
        .transpose()
        .context("invalid directive name")?;
    if seed.render || directive.is_some() {
        request.meta.render = Some(
            pipeline
                .enablers()
                .template()
                .clone()
                .with_directive(directive),
        );
    }
    Ok(request)
}

fn plan(pipeline: &RenderPipeline, args: PlanArgs) -> Result<()> {
    let seed = seed_request(pipeline, args.seed, args.method)?;
    let mut steps = Vec::new();

    let mut outbound = pipeline.process_request(seed);
    steps.push(PlanStep::dispatch("before_fetch", &outbound));

    if !outbound.meta.is_rendering()
        && let Some(body_file) = &args.body_file
    {
        let body = read_file(body_file)?;
        let mut response = CrawlResponse::new(outbound.url.clone(), 200, body);
        response.meta = outbound.meta.clone();

        match pipeline.process_response(&mut outbound, response) {
            ResponseOutcome::Resubmit(resubmit) => {
                let call = pipeline.process_request(resubmit);
                steps.push(PlanStep::dispatch("after_fetch", &call));
            }
            ResponseOutcome::Response(_) => steps.push(PlanStep::deliver("after_fetch")),
        }
    }

    print_json(&steps)
}

fn unwrap_reply(pipeline: &RenderPipeline, args: UnwrapArgs) -> Result<()> {
    let body = read_file(&args.reply)?;

    let mut request = CrawlRequest::get(pipeline.builder().service_url().clone());
    request.meta.marker = Some(RenderMarker {
        screenshot: args.png_requested,
    });
    request.meta.target_url = Some(args.target);
    let mut response = CrawlResponse::new(request.url.clone(), args.status, body);
    response.meta = request.meta.clone();

    match pipeline.process_response(&mut request, response) {
        ResponseOutcome::Response(page) => emit_page(pipeline, &page, &args.output),
        ResponseOutcome::Resubmit(resubmit) => {
            bail!("unexpected resubmission of {}", resubmit.url)
        }
    }
}

fn emit_page(pipeline: &RenderPipeline, page: &CrawlResponse, output: &OutputArgs) -> Result<()> {
    if let Some(path) = &output.html_out {
        write_file(path, &page.body)?;
    }
    if let Some(path) = &output.png_out {
        match &page.meta.screenshot {
            Some(Screenshot::Inline { bytes }) => write_file(path, bytes)?,
            Some(Screenshot::Stored { url }) => {
                tracing::warn!(url = %url, "Screenshot was stored, not written to --png-out");
            }
            None => tracing::warn!("No screenshot in the response"),
        }
    }

    print_json(&RunReport {
        page: PageReport::from(page),
        stats: pipeline.stats().snapshot(),
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to encode report")?;
    println!("{json}");
    Ok(())
}
