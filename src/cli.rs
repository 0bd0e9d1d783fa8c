use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Replay curve editor interaction scripts
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Interaction script (JSON: curves + steps)
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Editor settings file (default: curvekeys.json in the config dir)
    #[arg(short = 's', long = "settings", value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// View scale override
    #[arg(long = "scale", value_name = "SCALE")]
    pub scale: Option<f32>,

    /// Pretty-print the JSON report
    #[arg(short = 'p', long = "pretty")]
    pub pretty: bool,

    /// Write the effective settings to the config dir
    #[arg(long = "save-settings")]
    pub save_settings: bool,

    /// Enable debug logging to file (default: curvekeys.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
