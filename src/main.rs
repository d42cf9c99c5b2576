use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{ArgAction, Parser, Subcommand};

use snapvault::archive::{
    ArchiveDeps, ArchiveError, TriggerCoordinator, TriggerSource, encode_image,
};
use snapvault::capture::{CaptureEngine, CaptureError, CaptureMode, CaptureRequest, Region};
use snapvault::config::{Config, ImageFormat, OrganizeMode, SettingsSource};
use snapvault::daemon::Daemon;
use snapvault::history::{
    HistoryStore, Page, RetentionPolicy, ScreenshotRecord, SearchQuery, StoreError, sweep_once,
};
use snapvault::util::{human_size, parse_geometry};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("SNAPVAULT_GIT_HASH"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "snapvault")]
#[command(version = VERSION)]
#[command(about = "Screenshot capture and history daemon for Wayland compositors")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the background service (captures on SIGUSR1/SIGUSR2, sweeps retention)
    Daemon,

    /// Capture a screenshot and archive it
    Capture {
        /// Capture the currently focused window
        #[arg(long, short = 'w', action = ArgAction::SetTrue, conflicts_with_all = ["region", "monitor"])]
        window: bool,

        /// Capture a fixed region, slurp geometry format: "X,Y WxH"
        #[arg(long, short = 'r', value_name = "GEOMETRY", value_parser = parse_region_arg, conflicts_with = "monitor")]
        region: Option<Region>,

        /// Capture a single monitor by index (see `snapvault monitors`)
        #[arg(long, short = 'm', value_name = "INDEX")]
        monitor: Option<usize>,

        /// Copy the capture to the clipboard (overrides config)
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "no_clipboard")]
        clipboard: bool,

        /// Skip the clipboard copy (overrides config)
        #[arg(long, action = ArgAction::SetTrue)]
        no_clipboard: bool,

        /// Save to an explicit path instead of archiving (untracked)
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List archived screenshots, newest first
    History {
        /// Maximum number of records to show
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: u32,

        /// Number of records to skip
        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Substring match against window title, application, and path
        #[arg(long, short = 's', value_name = "TEXT")]
        search: Option<String>,

        /// Substring match against the application name
        #[arg(long, value_name = "NAME")]
        app: Option<String>,

        /// Only records on or after this date (YYYY-MM-DD, local time)
        #[arg(long, value_name = "DATE")]
        since: Option<String>,

        /// Only records on or before this date (YYYY-MM-DD, local time)
        #[arg(long, value_name = "DATE")]
        until: Option<String>,

        /// Emit records as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },

    /// Show one archived screenshot record
    Show {
        /// Record id
        id: i64,
    },

    /// Delete a screenshot and its index record
    Delete {
        /// Record id
        id: i64,
    },

    /// Run one retention sweep now
    Sweep,

    /// List attached monitors
    Monitors,

    /// Show or change configuration
    Config {
        /// Write a commented default config file
        #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = [
            "save_dir", "organize", "format", "template",
            "retention_enabled", "retention_days", "retention_count",
        ])]
        init: bool,

        /// Set the archive root directory
        #[arg(long, value_name = "DIR")]
        save_dir: Option<String>,

        /// Set the directory layout: by-date, by-application, or flat
        #[arg(long, value_name = "MODE")]
        organize: Option<OrganizeMode>,

        /// Set the image format: png or jpeg
        #[arg(long, value_name = "FMT")]
        format: Option<ImageFormat>,

        /// Set the filename template
        #[arg(long, value_name = "TPL")]
        template: Option<String>,

        /// Enable or disable retention sweeping
        #[arg(long, value_name = "BOOL")]
        retention_enabled: Option<bool>,

        /// Set the maximum screenshot age in days (0 disables)
        #[arg(long, value_name = "N")]
        retention_days: Option<u32>,

        /// Set the maximum screenshot count (0 disables)
        #[arg(long, value_name = "N")]
        retention_count: Option<u64>,
    },
}

/// Error with the process exit code it maps to: 1 internal, 2 invalid
/// request, 3 busy, 4 not found. Clap reports its own usage errors with 2.
struct CliError {
    code: u8,
    message: String,
}

impl CliError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            message: message.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

impl From<CaptureError> for CliError {
    fn from(err: CaptureError) -> Self {
        Self {
            code: if err.is_user_error() { 2 } else { 1 },
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        let code = match err {
            StoreError::NotFound(_) => 4,
            StoreError::Busy => 3,
            _ => 1,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl From<ArchiveError> for CliError {
    fn from(err: ArchiveError) -> Self {
        let code = match &err {
            ArchiveError::Capture(inner) if inner.is_user_error() => 2,
            ArchiveError::Store(StoreError::NotFound(_)) => 4,
            err if err.is_busy() => 3,
            _ => 1,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The daemon logs what it does at info by default; one-shot commands keep
    // stderr quiet unless RUST_LOG says otherwise.
    let default_filter = if matches!(cli.command, Command::Daemon) {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err.message);
            ExitCode::from(err.code)
        }
    }
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Daemon => {
            require_wayland()?;
            Daemon::new()?.run()?;
            Ok(())
        }
        Command::Capture {
            window,
            region,
            monitor,
            clipboard,
            no_clipboard,
            output,
        } => {
            require_wayland()?;
            let mode = if window {
                CaptureMode::ActiveWindow
            } else if let Some(region) = region {
                CaptureMode::Region(region)
            } else {
                CaptureMode::FullScreen { monitor }
            };
            let clipboard_override = match (clipboard, no_clipboard) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            match output {
                Some(path) => run_untracked_capture(mode, path, clipboard_override),
                None => run_archive_capture(mode, clipboard_override),
            }
        }
        Command::History {
            limit,
            offset,
            search,
            app,
            since,
            until,
            json,
        } => {
            let query = SearchQuery {
                text: search,
                application: app,
                since: since.as_deref().map(parse_day_start).transpose()?,
                until: until.as_deref().map(parse_day_end).transpose()?,
            };
            run_history(query, Page::new(offset, limit), json)
        }
        Command::Show { id } => run_show(id),
        Command::Delete { id } => run_delete(id),
        Command::Sweep => run_sweep(),
        Command::Monitors => {
            require_wayland()?;
            run_monitors()
        }
        Command::Config {
            init,
            save_dir,
            organize,
            format,
            template,
            retention_enabled,
            retention_days,
            retention_count,
        } => {
            if init {
                let path = Config::create_default_file()?;
                println!("Created {}", path.display());
                return Ok(());
            }

            let mut config = Config::load()?;
            let mut changed = false;
            if let Some(dir) = save_dir {
                config.storage.save_dir = dir;
                changed = true;
            }
            if let Some(mode) = organize {
                config.storage.organize = mode;
                changed = true;
            }
            if let Some(fmt) = format {
                config.storage.format = fmt;
                changed = true;
            }
            if let Some(tpl) = template {
                config.storage.filename_template = tpl;
                changed = true;
            }
            if let Some(enabled) = retention_enabled {
                config.retention.enabled = enabled;
                changed = true;
            }
            if let Some(days) = retention_days {
                config.retention.max_age_days = days;
                changed = true;
            }
            if let Some(count) = retention_count {
                config.retention.max_count = count;
                changed = true;
            }

            if changed {
                config.save()?;
                println!("Updated {}", Config::get_config_path()?.display());
            } else {
                println!("# {}", Config::get_config_path()?.display());
                let rendered = toml::to_string_pretty(&config)
                    .map_err(|err| CliError::internal(format!("failed to render config: {err}")))?;
                print!("{rendered}");
            }
            Ok(())
        }
    }
}

fn require_wayland() -> Result<(), CliError> {
    if std::env::var("WAYLAND_DISPLAY").is_err() {
        return Err(CliError::internal(
            "WAYLAND_DISPLAY not set - snapvault requires a Wayland session",
        ));
    }
    Ok(())
}

/// clap value parser for `--region`, so malformed geometry is a usage error.
fn parse_region_arg(spec: &str) -> Result<Region, String> {
    let (x, y, width, height) = parse_geometry(spec)?;
    Ok(Region::new(x, y, width, height))
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::internal(format!("failed to start async runtime: {err}")))
}

fn open_store() -> Result<HistoryStore, CliError> {
    let db_path = Config::history_db_path()?;
    Ok(HistoryStore::open(db_path)?)
}

/// Capture through the full pipeline: archive, index, fan-out.
fn run_archive_capture(
    mode: CaptureMode,
    clipboard_override: Option<bool>,
) -> Result<(), CliError> {
    let runtime = runtime()?;
    let store = open_store()?;

    let settings: SettingsSource = Arc::new(move || {
        let mut config = Config::load_or_default();
        if let Some(copy) = clipboard_override {
            config.clipboard.copy_on_capture = copy;
        }
        config
    });

    let outcome = runtime.block_on(async {
        let coordinator = TriggerCoordinator::new(
            &tokio::runtime::Handle::current(),
            ArchiveDeps::new(store, settings),
        );
        coordinator
            .submit(TriggerSource::Cli, CaptureRequest::new(mode), false)?
            .wait()
            .await
    })?;

    let record = &outcome.record;
    println!(
        "Saved {} ({}x{}, {}) as record {}",
        record.file_path.display(),
        record.width,
        record.height,
        human_size(record.file_size),
        record.id
    );
    if outcome.copied_to_clipboard {
        println!("Copied to clipboard");
    }
    Ok(())
}

/// Capture to an explicit path, bypassing the archive. The file is
/// deliberately untracked: only files under the store's control are indexed.
fn run_untracked_capture(
    mode: CaptureMode,
    output: PathBuf,
    clipboard_override: Option<bool>,
) -> Result<(), CliError> {
    let config = Config::load_or_default();
    let format = match output.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
        Some("png") => ImageFormat::Png,
        None => config.storage.format,
        Some(other) => {
            return Err(CliError::invalid(format!(
                "unsupported output extension '.{other}' (expected .png or .jpg)"
            )));
        }
    };

    let engine = CaptureEngine::new();
    let frame = engine.capture(&CaptureRequest::new(mode))?;
    let bytes =
        encode_image(&frame.image, format).map_err(|err| CliError::internal(err.to_string()))?;

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|err| CliError::internal(format!("failed to create output dir: {err}")))?;
    }
    std::fs::write(&output, &bytes).map_err(|err| {
        CliError::internal(format!("failed to write {}: {err}", output.display()))
    })?;

    println!(
        "Saved {} ({}x{}, {})",
        output.display(),
        frame.context.width,
        frame.context.height,
        human_size(bytes.len() as u64)
    );

    if clipboard_override.unwrap_or(config.clipboard.copy_on_capture) {
        let png = if format == ImageFormat::Png {
            bytes
        } else {
            encode_image(&frame.image, ImageFormat::Png)
                .map_err(|err| CliError::internal(err.to_string()))?
        };
        match snapvault::clipboard::copy_png(&png) {
            Ok(()) => println!("Copied to clipboard"),
            Err(err) => log::warn!("Failed to copy to clipboard: {err:#}"),
        }
    }
    Ok(())
}

fn run_history(query: SearchQuery, page: Page, json: bool) -> Result<(), CliError> {
    let runtime = runtime()?;
    let store = open_store()?;
    let records = runtime.block_on(store.search(query, page))?;

    if json {
        let rendered = serde_json::to_string_pretty(&records)
            .map_err(|err| CliError::internal(format!("failed to render records: {err}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if records.is_empty() {
        println!("No matching screenshots");
        return Ok(());
    }
    for record in &records {
        print_record_line(record);
    }
    Ok(())
}

fn run_show(id: i64) -> Result<(), CliError> {
    let runtime = runtime()?;
    let store = open_store()?;
    let record = runtime.block_on(store.get(id))?;

    println!("id:          {}", record.id);
    println!("file:        {}", record.file_path.display());
    println!(
        "created:     {}",
        record
            .created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    println!("mode:        {}", record.mode);
    println!(
        "window:      {}",
        record.window_title.as_deref().unwrap_or("-")
    );
    println!(
        "application: {}",
        record.application_name.as_deref().unwrap_or("-")
    );
    println!("size:        {}x{}", record.width, record.height);
    println!(
        "file size:   {} ({} bytes)",
        human_size(record.file_size),
        record.file_size
    );
    println!("format:      {}", record.format);
    Ok(())
}

fn run_delete(id: i64) -> Result<(), CliError> {
    let config = Config::load_or_default();
    let runtime = runtime()?;
    let store = open_store()?;
    runtime.block_on(store.delete(id, Some(config.triggers.store_busy_timeout())))?;
    println!("Deleted record {id}");
    Ok(())
}

/// Manual sweep: applies the configured limits now, even when periodic
/// sweeping is disabled.
fn run_sweep() -> Result<(), CliError> {
    let config = Config::load_or_default();
    let mut policy = RetentionPolicy::from(&config.retention);
    policy.enabled = true;

    if policy.max_age.is_none() && policy.max_count.is_none() {
        println!("No retention limits configured (see [retention] in the config file)");
        return Ok(());
    }

    let runtime = runtime()?;
    let store = open_store()?;
    let report = runtime.block_on(async { sweep_once(&store, &policy).await })?;

    println!(
        "Sweep removed {} records ({} failed, {} vanished)",
        report.deleted, report.failed, report.skipped_missing
    );
    Ok(())
}

fn run_monitors() -> Result<(), CliError> {
    let engine = CaptureEngine::new();
    for info in engine.monitors()? {
        println!(
            "{}: {} {}x{} at {},{}{}",
            info.index,
            info.name,
            info.width,
            info.height,
            info.x,
            info.y,
            if info.primary { " (primary)" } else { "" }
        );
    }
    Ok(())
}

fn print_record_line(record: &ScreenshotRecord) {
    println!(
        "{:>5}  {}  {:<10}  {:>9}  {}",
        record.id,
        record
            .created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S"),
        record.mode,
        human_size(record.file_size),
        record.file_path.display()
    );
}

/// Local midnight of `YYYY-MM-DD`, as UTC.
fn parse_day_start(date: &str) -> Result<DateTime<Utc>, CliError> {
    let day = parse_date(date)?;
    local_to_utc(day.and_hms_opt(0, 0, 0), date)
}

/// Last microsecond of the local day, as UTC.
fn parse_day_end(date: &str) -> Result<DateTime<Utc>, CliError> {
    let day = parse_date(date)?;
    local_to_utc(day.and_hms_micro_opt(23, 59, 59, 999_999), date)
}

fn parse_date(date: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| CliError::invalid(format!("invalid date '{date}' (expected YYYY-MM-DD)")))
}

fn local_to_utc(
    time: Option<chrono::NaiveDateTime>,
    date: &str,
) -> Result<DateTime<Utc>, CliError> {
    time.and_then(|t| t.and_local_timezone(Local).earliest())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| CliError::invalid(format!("date '{date}' is not representable locally")))
}
