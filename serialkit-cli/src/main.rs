//! serialkit CLI - Command-line tool for working with serial ports.
//!
//! ## Features
//!
//! - List serial ports with USB metadata
//! - Send text or hex payloads
//! - Inspect and drive line signals
//! - Probe which standard baud rates a device accepts
//! - Shell completion generation
//! - Environment variable and config file support

use {
    anyhow::Result,
    clap::{Parser, Subcommand, ValueEnum},
    clap_complete::Shell,
    env_logger::Env,
    log::debug,
    serialkit::{DataBits, Parity, StopBits},
    std::{env, path::PathBuf},
};

mod commands;
mod config;
mod serial;

use {
    commands::{
        completions::cmd_completions, ports::cmd_list_ports, rates::cmd_rates, send::cmd_send,
        signals::cmd_signals,
    },
    config::Config,
    serial::LineOptions,
};

/// serialkit - A cross-platform serial port tool.
///
/// Environment variables:
///   SERIALKIT_PORT  - Default serial port
///   SERIALKIT_BAUD  - Default baud rate (default: 9600)
#[derive(Parser)]
#[command(name = "serialkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if only one is present).
    #[arg(short, long, global = true, env = "SERIALKIT_PORT")]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long, global = true, env = "SERIALKIT_BAUD")]
    baud: Option<u32>,

    /// Data bits per character.
    #[arg(long, global = true, value_enum)]
    data_bits: Option<DataBitsArg>,

    /// Parity mode.
    #[arg(long, global = true, value_enum)]
    parity: Option<ParityArg>,

    /// Stop bits.
    #[arg(long, global = true, value_enum)]
    stop_bits: Option<StopBitsArg>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only warnings and errors are logged).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn line_options(&self) -> LineOptions {
        LineOptions {
            port: self
                .port
                .clone(),
            baud: self.baud,
            data_bits: self
                .data_bits
                .map(Into::into),
            parity: self
                .parity
                .map(Into::into),
            stop_bits: self
                .stop_bits
                .map(Into::into),
        }
    }
}

/// Data bits accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum DataBitsArg {
    #[value(name = "5")]
    Five,
    #[value(name = "6")]
    Six,
    #[value(name = "7")]
    Seven,
    #[value(name = "8")]
    Eight,
}

impl From<DataBitsArg> for DataBits {
    fn from(arg: DataBitsArg) -> Self {
        match arg {
            DataBitsArg::Five => DataBits::Five,
            DataBitsArg::Six => DataBits::Six,
            DataBitsArg::Seven => DataBits::Seven,
            DataBitsArg::Eight => DataBits::Eight,
        }
    }
}

/// Parity modes accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ParityArg {
    None,
    Even,
    Odd,
    Space,
    Mark,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Even => Parity::Even,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Space => Parity::Space,
            ParityArg::Mark => Parity::Mark,
        }
    }
}

/// Stop bits accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum StopBitsArg {
    #[value(name = "1")]
    One,
    #[value(name = "1.5")]
    OneAndHalf,
    #[value(name = "2")]
    Two,
}

impl From<StopBitsArg> for StopBits {
    fn from(arg: StopBitsArg) -> Self {
        match arg {
            StopBitsArg::One => StopBits::One,
            StopBitsArg::OneAndHalf => StopBits::OneAndHalf,
            StopBitsArg::Two => StopBits::Two,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Send a message to the serial port.
    Send {
        /// Text to send, or hex bytes with --hex.
        message: String,

        /// Interpret the message as hex bytes (e.g. "48 65 6c 6c 6f").
        #[arg(long)]
        hex: bool,

        /// Append CR LF after the message.
        #[arg(long)]
        newline: bool,
    },

    /// Show the line signal state, optionally driving DTR/RTS first.
    Signals {
        /// Set the DTR output level.
        #[arg(long, value_name = "BOOL")]
        dtr: Option<bool>,

        /// Set the RTS output level.
        #[arg(long, value_name = "BOOL")]
        rts: Option<bool>,
    },

    /// Try every standard baud rate and report which the device accepts.
    Rates {
        /// Output results as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if env::var("NO_COLOR").is_ok() || !console::Term::stderr().is_term() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "serialkit v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };
    let options = cli.line_options();

    match &cli.command {
        Commands::ListPorts { json } => {
            cmd_list_ports(*json)?;
        },
        Commands::Send {
            message,
            hex,
            newline,
        } => {
            cmd_send(&options, &config, message, *hex, *newline)?;
        },
        Commands::Signals { dtr, rts } => {
            cmd_signals(&options, &config, *dtr, *rts)?;
        },
        Commands::Rates { json } => {
            cmd_rates(&options, &config, *json)?;
        },
        Commands::Completions { shell } => {
            cmd_completions(*shell);
        },
    }

    Ok(())
}
