use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use typer::dispatch::{DispatchConfig, Dispatcher};
use typer::injector::{open_injector, InjectorBackend, InputInjector, RecordingInjector};
use typer::keyboard::{resolve, unsupported_chars};
use typer::normalize::{Normalization, DEFAULT_TAB_SIZE};
use typer::sim;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Auto,
    Wayland,
    X11,
}

impl BackendArg {
    fn to_library(self) -> InjectorBackend {
        match self {
            BackendArg::Auto => InjectorBackend::Auto,
            BackendArg::Wayland => InjectorBackend::Wayland,
            BackendArg::X11 => InjectorBackend::X11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CleanArg {
    /// Trim whitespace at both ends of every line.
    TrimLines,
    RemoveTrailingSpaces,
    RemoveLeadingSpaces,
    /// Collapse runs of ASCII spaces into one.
    CollapseSpaces,
    /// Collapse runs of any whitespace, newlines included, into one space.
    CollapseAllWhitespace,
    RemoveEmptyLines,
    ExpandTabs,
    NormalizeLineEndings,
    /// Drop blank lines at the start and end.
    TrimEmptyLines,
    /// normalize-line-endings, trim-lines, collapse-spaces, remove-empty-lines, expand-tabs.
    FullClean,
}

impl CleanArg {
    fn to_library(self) -> Normalization {
        match self {
            CleanArg::TrimLines => Normalization::TrimLines,
            CleanArg::RemoveTrailingSpaces => Normalization::RemoveTrailingSpaces,
            CleanArg::RemoveLeadingSpaces => Normalization::RemoveLeadingSpaces,
            CleanArg::CollapseSpaces => Normalization::CollapseSpaces,
            CleanArg::CollapseAllWhitespace => Normalization::CollapseAllWhitespace,
            CleanArg::RemoveEmptyLines => Normalization::RemoveEmptyLines,
            CleanArg::ExpandTabs => Normalization::ExpandTabs,
            CleanArg::NormalizeLineEndings => Normalization::NormalizeLineEndings,
            CleanArg::TrimEmptyLines => Normalization::TrimEmptyLines,
            CleanArg::FullClean => Normalization::FullClean,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "typer")]
#[command(about = "Type text into the focused window, one simulated keystroke at a time", long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Type text into the currently focused window
    Type {
        /// Input text file, or '-' for stdin
        #[arg(long, value_name = "PATH", default_value = "-")]
        input: PathBuf,

        /// Delay before the first keystroke, in milliseconds
        #[arg(long, default_value_t = 3000)]
        delay_ms: u64,

        /// Pause between characters, in milliseconds
        #[arg(long, default_value_t = 10)]
        key_delay_ms: u64,

        /// Injection backend.
        ///
        /// - auto: choose a backend based on the runtime environment
        /// - wayland: force Wayland (virtual keyboard protocol)
        /// - x11: force X11 (XTEST)
        #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
        backend: BackendArg,

        /// Wayland seat name to attach the virtual keyboard to (e.g. seat0, seat1).
        #[arg(long, value_name = "NAME")]
        seat: Option<String>,

        /// Clean-up transforms applied before typing, in order
        #[arg(long, value_enum, value_name = "OP")]
        clean: Vec<CleanArg>,

        /// Tab width used by expand-tabs and full-clean
        #[arg(long, default_value_t = DEFAULT_TAB_SIZE)]
        tab_size: usize,

        /// Record key events and print them as JSON instead of typing
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply clean-up transforms to text and print the result
    Clean {
        /// Input text file, or '-' for stdin
        #[arg(long, value_name = "PATH", default_value = "-")]
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Tab width used by expand-tabs and full-clean
        #[arg(long, default_value_t = DEFAULT_TAB_SIZE)]
        tab_size: usize,

        /// Transforms to apply, in order
        #[arg(value_enum, required = true, value_name = "OP")]
        ops: Vec<CleanArg>,
    },

    /// Show the keystroke each character of TEXT resolves to
    Keys { text: String },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "typer=info",
        1 => "typer=debug",
        _ => "typer=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Ignore the error: a subscriber may already be installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn apply_cleaning(text: String, ops: &[CleanArg], tab_size: usize) -> String {
    ops.iter()
        .fold(text, |acc, op| op.to_library().apply_with(&acc, tab_size))
}

#[allow(clippy::too_many_arguments)]
fn run_type(
    input: &Path,
    delay_ms: u64,
    key_delay_ms: u64,
    backend: BackendArg,
    seat: Option<&str>,
    clean: &[CleanArg],
    tab_size: usize,
    dry_run: bool,
) -> Result<()> {
    let text = apply_cleaning(read_input(input)?, clean, tab_size);
    if text.trim().is_empty() {
        return Err(anyhow!("nothing to type: input text is blank"));
    }

    let skipped = unsupported_chars(&text);
    if !skipped.is_empty() {
        tracing::warn!(chars = ?skipped, "characters without a US-QWERTY keystroke will be skipped");
    }

    let config = DispatchConfig {
        start_delay: Duration::from_millis(if dry_run { 0 } else { delay_ms }),
        key_delay: Duration::from_millis(if dry_run { 0 } else { key_delay_ms }),
        ..Default::default()
    };
    config.validate()?;

    let recorder = RecordingInjector::new();
    let injector: Box<dyn InputInjector + Send> = if dry_run {
        Box::new(recorder.clone())
    } else {
        open_injector(backend.to_library(), seat)?
    };

    let mut dispatcher = Dispatcher::new(injector, config);
    let handle = dispatcher
        .start(&text)
        .ok_or_else(|| anyhow!("typing run was not started"))?;

    {
        let handle = handle.clone();
        ctrlc::set_handler(move || handle.cancel())
            .context("failed to install Ctrl+C handler")?;
    }

    if !dry_run && delay_ms > 0 {
        tracing::info!(
            "Focus the target window. Typing starts in {:.1}s (Ctrl+C to abort)...",
            Duration::from_millis(delay_ms).as_secs_f64()
        );
    }

    let report = handle.wait();

    if dry_run {
        let events = recorder.events();
        let stats = sim::stats(&events);
        tracing::info!(
            presses = stats.presses,
            releases = stats.releases,
            shift_presses = stats.shift_presses,
            "dry run recorded"
        );
        let json = serde_json::to_string_pretty(&events).context("failed to serialize key events")?;
        println!("{json}");
    }

    if report.is_cancelled() {
        return Err(anyhow!("aborted after {} characters", report.typed));
    }

    tracing::info!(typed = report.typed, skipped = report.skipped, failed = report.failed, "done");
    Ok(())
}

fn run_keys(text: &str) {
    for c in text.chars() {
        match resolve(c) {
            Some(stroke) => println!(
                "{c:?}\tkeycode {}{}",
                stroke.keycode,
                if stroke.shift { " +shift" } else { "" }
            ),
            None => println!("{c:?}\t(skipped)"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Type {
            input,
            delay_ms,
            key_delay_ms,
            backend,
            seat,
            clean,
            tab_size,
            dry_run,
        } => run_type(
            &input,
            delay_ms,
            key_delay_ms,
            backend,
            seat.as_deref(),
            &clean,
            tab_size,
            dry_run,
        )?,
        Command::Clean {
            input,
            output,
            tab_size,
            ops,
        } => {
            let cleaned = apply_cleaning(read_input(&input)?, &ops, tab_size);
            if let Some(out) = output {
                write_output(&out, &cleaned)?;
            } else {
                print!("{cleaned}");
            }
        }
        Command::Keys { text } => run_keys(&text),
    }

    Ok(())
}
