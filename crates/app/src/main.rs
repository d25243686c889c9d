use std::fmt;
use std::path::PathBuf;

use services::sessions::{RecoveryChoice, TierOutcome};
use services::{AppServices, Clock, FixedChoice, RecoveryRequest, WearableConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use workout_core::model::{CatalogExercise, ExerciseCategory, FinishFeedback, SetField, UserId};
use workout_core::timer::format_clock;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUser { raw: String },
    InvalidSeconds { raw: String },
    InvalidChoice { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw:?}"),
            ArgsError::InvalidSeconds { raw } => write!(f, "invalid --seconds value: {raw}"),
            ArgsError::InvalidChoice { raw } => {
                write!(f, "invalid --on-prompt value: {raw} (expected resume or discard)")
            }
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
    eprintln!("  cargo run -p app -- status  [options]");
    eprintln!("  cargo run -p app -- discard [options]");
    eprintln!("  cargo run -p app -- demo    [options] [--seconds <n>] [--finish] [--on-prompt resume|discard]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>        default sqlite:workouts.sqlite3");
    eprintln!("  --user <id>              default local");
    eprintln!("  --cache-dir <path>       default .workout-cache");
    eprintln!("  --wearable-url <url>     wearable metrics service");
    eprintln!("  -v                       debug logging");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  WORKOUT_DB_URL, WORKOUT_USER_ID, WORKOUT_CACHE_DIR, WORKOUT_WEARABLE_URL,");
    eprintln!("  WORKOUT_WEARABLE_KEY, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Discard,
    Demo,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "status" => Some(Self::Status),
            "discard" => Some(Self::Discard),
            "demo" => Some(Self::Demo),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user: UserId,
    cache_dir: PathBuf,
    wearable: Option<WearableConfig>,
    verbose: bool,
    demo_seconds: u64,
    finish: bool,
    on_prompt: RecoveryChoice,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("WORKOUT_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("sqlite:workouts.sqlite3".into()), normalize_sqlite_url);
        let mut user = std::env::var("WORKOUT_USER_ID")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "local".into());
        let mut cache_dir = std::env::var("WORKOUT_CACHE_DIR")
            .map_or_else(|_| PathBuf::from(".workout-cache"), PathBuf::from);
        let mut wearable = WearableConfig::from_env();
        let mut verbose = false;
        let mut demo_seconds = 10;
        let mut finish = false;
        let mut on_prompt = RecoveryChoice::Resume;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidUser { raw: value });
                    }
                    user = value;
                }
                "--cache-dir" => cache_dir = PathBuf::from(require_value(args, "--cache-dir")?),
                "--wearable-url" => {
                    let base_url = require_value(args, "--wearable-url")?;
                    let api_key = wearable.and_then(|config| config.api_key);
                    wearable = Some(WearableConfig { base_url, api_key });
                }
                "--seconds" => {
                    let value = require_value(args, "--seconds")?;
                    demo_seconds = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSeconds { raw: value.clone() })?;
                }
                "--on-prompt" => {
                    let value = require_value(args, "--on-prompt")?;
                    on_prompt = match value.as_str() {
                        "resume" => RecoveryChoice::Resume,
                        "discard" => RecoveryChoice::Discard,
                        _ => return Err(ArgsError::InvalidChoice { raw: value }),
                    };
                }
                "--finish" => finish = true,
                "-v" | "--verbose" => verbose = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user: UserId::new(user),
            cache_dir,
            wearable,
            verbose,
            demo_seconds,
            finish,
            on_prompt,
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
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let mut iter = argv.into_iter().skip(1);
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_tracing(parsed.verbose);

    prepare_sqlite_file(&parsed.db_url)?;
    let app = AppServices::new_sqlite(
        &parsed.db_url,
        &parsed.cache_dir,
        Clock::default_clock(),
        parsed.wearable.clone(),
    )
    .await?;

    match cmd {
        Command::Status => status(&app, &parsed.user).await,
        Command::Discard => {
            let cleared = app.workouts().discard_all(&parsed.user).await;
            println!(
                "discarded stored workouts (remote cleared: {}, local cleared: {})",
                cleared.remote_cleared, cleared.local_cleared
            );
            Ok(())
        }
        Command::Demo => demo(&app, &parsed).await,
    }
}

async fn status(app: &AppServices, user: &UserId) -> Result<(), Box<dyn std::error::Error>> {
    let stored = app.workouts().peek(user).await;
    let now = app.workouts().clock().now();
    println!("user: {user}");
    match &stored.remote_active {
        Some(s) => println!(
            "active (remote): {} · {} exercises · saved {}s ago · paused: {}",
            s.session_id(),
            s.exercises.len(),
            s.age(now).num_seconds(),
            s.is_paused
        ),
        None => println!("active (remote): none"),
    }
    match &stored.local_active {
        Some(entry) => println!(
            "active (device): {} · saved {}s ago",
            entry.snapshot.session_id(),
            entry.age(now).num_seconds()
        ),
        None => println!("active (device): none"),
    }
    let paused = stored
        .remote_paused
        .as_ref()
        .or(stored.local_paused.as_ref().map(|entry| &entry.snapshot));
    match paused {
        Some(s) => println!(
            "paused: {} · {} elapsed",
            s.session_id(),
            format_clock(u64::try_from(s.elapsed_at_save().num_seconds()).unwrap_or(0))
        ),
        None => println!("paused: none"),
    }
    println!("pending finished workouts: {}", stored.pending_workouts);
    Ok(())
}

async fn demo(app: &AppServices, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let services = app.workouts();
    let delivered = services.retry_outbox(&args.user).await?;
    if delivered > 0 {
        println!("delivered {delivered} pending workout(s)");
    }

    let prompter = FixedChoice::new(args.on_prompt);
    let mut engine = services
        .open_session(args.user.clone(), RecoveryRequest::default(), &prompter)
        .await;
    println!("session {} ({:?})", engine.session().id(), engine.origin());

    if !engine.session().has_exercises() {
        let id = engine.add_exercise(
            &CatalogExercise::new("Goblet Squat", ExerciseCategory::Strength).with_body_part("Legs"),
        )?;
        engine.update_set(id, 0, SetField::Weight, "24")?;
        engine.update_set(id, 0, SetField::Reps, "10")?;
        engine.start_rest(Some(5)).await;
    }

    let mut ticker = tokio::time::interval(
        services
            .settings()
            .tick()
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1)),
    );
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(args.demo_seconds);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = engine.tick().await;
                let rest = report
                    .rest_remaining
                    .map(|secs| format!(" · rest {}", format_clock(u64::from(secs))))
                    .unwrap_or_default();
                println!("{}{rest}", format_clock(report.elapsed_seconds));
                if report.rest_finished {
                    println!("rest finished");
                }
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    if args.finish {
        let report = engine.finish(FinishFeedback::default()).await;
        println!(
            "finished {} · {} · {} sets",
            report.record.id,
            format_clock(report.record.duration_seconds),
            report.record.recorded_set_count()
        );
        if let Some(warning) = &report.warning {
            warn!(%warning, "finish incomplete");
            println!("{warning}");
        }
    } else {
        let report = engine.on_background().await;
        if report.remote == TierOutcome::Failed {
            println!("saved on this device only");
        }
        println!("workout left in progress; run demo again to resume it");
    }
    Ok(())
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

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "--db",
            "sqlite:///tmp/w.sqlite3",
            "--user",
            "u-42",
            "--seconds",
            "3",
            "--on-prompt",
            "discard",
            "--finish",
        ])
        .unwrap();
        assert_eq!(args.db_url, "sqlite:///tmp/w.sqlite3");
        assert_eq!(args.user, UserId::new("u-42"));
        assert_eq!(args.demo_seconds, 3);
        assert_eq!(args.on_prompt, RecoveryChoice::Discard);
        assert!(args.finish);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(parse(&["--seconds", "soon"]), Err(ArgsError::InvalidSeconds { .. })));
        assert!(matches!(parse(&["--on-prompt", "maybe"]), Err(ArgsError::InvalidChoice { .. })));
        assert!(matches!(parse(&["--user"]), Err(ArgsError::MissingValue { flag: "--user" })));
        assert!(matches!(parse(&["--bogus"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/w.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/w.sqlite3"));
    }
}
