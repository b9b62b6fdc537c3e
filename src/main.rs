mod cli;
mod clock;
mod config;
mod error;
mod history;
mod logging;
mod publish;
mod service;
mod workflow;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cli::commands;
use cli::{AppContext, CancellationToken, OutputMode};
use clock::SystemClock;
use history::HistoryFilter;
use publish::{PublishContent, PublishFormat};
use service::HttpContentService;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "postflow")]
#[command(about = "Track content-generation workflows and publish their results")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputMode::Console)]
    output: OutputMode,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available workflow templates
    Templates,

    /// Submit a workflow and follow it until it finishes
    Run {
        /// Template id
        template: String,

        /// Period the content is generated for
        period: String,

        /// Option overrides as key=value
        #[arg(trailing_var_arg = true)]
        options: Vec<String>,
    },

    /// List finished executions
    History {
        #[arg(long)]
        period: Option<String>,

        #[arg(long)]
        template: Option<String>,
    },

    /// Delete an execution from history
    Forget { id: String },

    /// Show per-category result counts of an execution
    Stats { id: String },

    /// Check content against platform constraints
    Check {
        #[command(flatten)]
        content: CaptionArgs,
    },

    /// Publish a completed execution
    Publish {
        /// Execution id
        id: String,

        /// Caption text
        #[arg(long)]
        caption: String,

        #[arg(long, default_value = "feed", value_parser = parse_format)]
        format: PublishFormat,
    },
}

#[derive(Args)]
struct CaptionArgs {
    /// Caption text to measure
    #[arg(long, conflicts_with_all = ["caption_length", "hashtags"])]
    caption: Option<String>,

    /// Caption length in characters, instead of a caption
    #[arg(long, requires = "hashtags", required_unless_present = "caption")]
    caption_length: Option<usize>,

    /// Hashtag count, instead of a caption
    #[arg(long, requires = "caption_length")]
    hashtags: Option<usize>,

    #[arg(long, default_value = "feed", value_parser = parse_format)]
    format: PublishFormat,
}

impl CaptionArgs {
    fn to_content(&self) -> PublishContent {
        match &self.caption {
            Some(caption) => PublishContent::from_caption("draft", caption, self.format),
            None => PublishContent::new(
                "draft",
                self.caption_length.unwrap_or_default(),
                self.hashtags.unwrap_or_default(),
                self.format,
            ),
        }
    }
}

fn parse_format(s: &str) -> Result<PublishFormat, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Long-running workflow runs keep a log file unless one is given
    let log_file = match (&cli.log_file, &cli.command) {
        (Some(path), _) => Some(path.clone()),
        (None, Commands::Run { .. }) => logging::default_log_path("run").ok(),
        (None, _) => None,
    };
    logging::init_logging(&logging::LogOptions {
        debug: cli.debug,
        quiet: cli.quiet,
        json: cli.output == OutputMode::Json,
        file: log_file,
    })?;

    let output = if cli.quiet { OutputMode::Quiet } else { cli.output };
    let handler = cli::create_handler(output, cli.debug);

    // Readiness checks need neither config nor service
    if let Commands::Check { content } = &cli.command {
        std::process::exit(commands::check(&content.to_content(), &*handler));
    }

    let config = config::PostflowConfig::load(cli.dir.as_deref())?;
    let history = cli::open_history(&config.history)?;
    let mut ctx = AppContext::new(config, history, Arc::new(SystemClock));
    if !ctx.config.service.base_url.is_empty() {
        let service = HttpContentService::from_config(&ctx.config.service)?;
        ctx = ctx.with_service(Arc::new(service));
    }

    let exit_code = match cli.command {
        Commands::Templates => commands::list_templates(&ctx, &*handler).await,

        Commands::Run {
            template,
            period,
            options,
        } => {
            let token = CancellationToken::new();
            tokio::spawn(cli::setup_signal_handlers(token.clone()));
            commands::run_workflow(&ctx, &template, &period, &options, &token, &*handler)
                .await
                .map_err(anyhow::Error::msg)?
        }

        Commands::History { period, template } => {
            let filter = HistoryFilter {
                period,
                template_id: template,
            };
            commands::show_history(&ctx, &filter, &*handler)
        }

        Commands::Forget { id } => commands::forget(&ctx, &id, &*handler),

        Commands::Stats { id } => commands::stats(&ctx, &id, &*handler),

        Commands::Publish {
            id,
            caption,
            format,
        } => {
            let token = CancellationToken::new();
            tokio::spawn(cli::setup_signal_handlers(token.clone()));
            commands::publish(&ctx, &id, &caption, format, &token, &*handler)
                .await
                .map_err(anyhow::Error::msg)?
        }

        Commands::Check { .. } => 0,
    };

    std::process::exit(exit_code);
}
