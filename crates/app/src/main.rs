use std::fmt;
use std::sync::Arc;

use services::{
    Clock, EventBus, HttpProgressRemote, InMemoryProgressRemote, LearningContext,
    NavigationController, ProgressRemote, RemoteConfig, RemoteMode, StaticCredential,
};
use storage::repository::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod driver;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingCourse,
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidApiUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingCourse => write!(f, "no course given (--course or LEARN_COURSE_PATH)"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidApiUrl { raw } => write!(f, "invalid --api value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- --course <course.json> [--db <sqlite_url>] [--api <url>] [--offline]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://progress.sqlite3");
    eprintln!("  --api http://localhost:5500");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEARN_COURSE_PATH, LEARN_DB_URL, LEARN_API_BASE_URL,");
    eprintln!("  LEARN_API_TOKEN, LEARN_API_TIMEOUT_SECS, RUST_LOG");
}

#[derive(Debug)]
struct Args {
    course_path: String,
    db_url: String,
    remote: RemoteConfig,
    offline: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut course_path = std::env::var("LEARN_COURSE_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let mut db_url = std::env::var("LEARN_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://progress.sqlite3".into(), normalize_sqlite_url);
        let mut remote = RemoteConfig::from_env();
        let mut offline = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--course" => course_path = Some(require_value(args, "--course")?),
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--api" => {
                    let value = require_value(args, "--api")?;
                    if !(value.starts_with("http://") || value.starts_with("https://")) {
                        return Err(ArgsError::InvalidApiUrl { raw: value });
                    }
                    remote = remote.with_base_url(value);
                }
                "--offline" => offline = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            course_path: course_path.ok_or(ArgsError::MissingCourse)?,
            db_url,
            remote,
            offline,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn build_remote(args: &Args) -> Result<Arc<dyn ProgressRemote>, Box<dyn std::error::Error>> {
    if args.offline {
        info!("offline mode: progress stays in the local cache");
        return Ok(Arc::new(InMemoryProgressRemote::with_mode(RemoteMode::Offline)));
    }
    let http = HttpProgressRemote::new(args.remote.clone(), Arc::new(StaticCredential::from_env()))?;
    Ok(Arc::new(http))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let raw_course = std::fs::read_to_string(&args.course_path)?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;

    let ctx = LearningContext {
        storage,
        remote: build_remote(&args)?,
        clock: Clock::system(),
        events: EventBus::default(),
    };

    let nav = match NavigationController::open_json(&raw_course, ctx).await {
        Ok(nav) => nav,
        Err(err) => {
            if err.redirect().is_some() {
                eprintln!("course cannot be opened, back to the dashboard: {err}");
            }
            return Err(err.into());
        }
    };
    driver::run(nav).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
