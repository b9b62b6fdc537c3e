use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable that replaces the level chosen by flags
pub const LOG_ENV: &str = "POSTFLOW_LOG";

/// How the subscriber is assembled for one invocation
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub debug: bool,
    pub quiet: bool,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl LogOptions {
    fn directive(&self) -> &'static str {
        if self.debug {
            "postflow=debug"
        } else if self.quiet {
            "postflow=error"
        } else {
            "postflow=info"
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }
}

fn open_append(path: &Path) -> anyhow::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::OpenOptions::new().create(true).append(true).open(path)?)
}

/// Install the global subscriber: stderr always, plus an append-only file
/// when one is given. JSON output mode switches both to JSON lines.
pub fn init_logging(options: &LogOptions) -> anyhow::Result<()> {
    let file = options.file.as_deref().map(open_append).transpose()?.map(Mutex::new);
    let (text_file, json_file) = match file {
        Some(file) if options.json => (None, Some(file)),
        Some(file) => (Some(file), None),
        None => (None, None),
    };

    let stderr_text = (!options.json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_line_number(options.debug)
            .with_file(options.debug)
            .with_writer(std::io::stderr)
    });
    let stderr_json = options
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));

    let text_file = text_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(file)
            .with_target(true)
            .with_line_number(true)
    });
    let json_file = json_file.map(|file| fmt::layer().json().with_writer(file));

    tracing_subscriber::registry()
        .with(options.filter())
        .with(stderr_text)
        .with(stderr_json)
        .with(text_file)
        .with(json_file)
        .try_init()?;

    Ok(())
}

/// Default log file path for a command run
pub fn default_log_path(command: &str) -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("postflow")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    Ok(log_dir.join(format!("{}-{}.log", command, timestamp)))
}
