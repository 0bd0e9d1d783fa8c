use curvekeys::cli::Args;
use curvekeys::config::{EditorSettings, SETTINGS_FILE};
use curvekeys::paths::{self, PathConfig};
use curvekeys::script::Script;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

/// Set up env_logger: console by default (respects RUST_LOG), or a file
/// with `--log`.
fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| paths::data_file("curvekeys.log", path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    info!("curvekeys {} starting", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let file_settings = match &args.settings {
        Some(path) => EditorSettings::load(path)?,
        None => EditorSettings::load_or_default(&path_config)?,
    };

    let script = Script::load(&args.script)?;

    // Script settings win over the file, CLI scale wins over both
    let mut settings = script.settings.clone().unwrap_or(file_settings);
    if let Some(scale) = args.scale {
        settings.view_scale = scale;
    }
    let settings = settings.sanitized();
    debug!("Effective settings: {:?}", settings);

    if args.save_settings {
        let path = paths::config_file(SETTINGS_FILE, &path_config);
        settings.save(&path)?;
        info!("Saved settings to {}", path.display());
    }

    let report = script.replay(settings)?;
    info!(
        "Replayed {} steps, {} keys selected",
        report.steps,
        report.selection.len()
    );

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize report")?;
    println!("{}", json);

    Ok(())
}
