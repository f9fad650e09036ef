use anyhow::Result;
use clap::Parser;
use kiosk::{KioskApp, KioskConfig};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "kiosk")]
#[command(about = "Walk-up photo kiosk session controller")]
#[command(version)]
#[command(long_about = "Runs a walk-up photo kiosk session: style selection, camera capture, \
countdown, AI avatar generation and print or message delivery. An operator console maps \
key presses to session commands.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "kiosk.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the kiosk")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - build the controller but don't start it")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Disable the operator console
    #[arg(long, help = "Run without reading key presses from the terminal")]
    no_keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let config = match KioskConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", args.config, e);
            return Err(e.into());
        }
    };

    let _log_guard = init_logging(&args, &config)?;

    info!("Starting kiosk v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    match config.validate() {
        Ok(()) if args.validate_config => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    let mut app = KioskApp::new(config).map_err(|e| {
        error!("Failed to create kiosk: {}", e);
        e
    })?;
    app.set_keyboard_enabled(!args.no_keyboard);

    app.initialize().map_err(|e| {
        error!("Failed to initialize kiosk: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - controller built but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    app.start().await.map_err(|e| {
        error!("Failed to start kiosk: {}", e);
        e
    })?;

    let exit_code = app.run().await.map_err(|e| {
        error!("Kiosk error during execution: {}", e);
        e
    })?;

    info!("Kiosk exited with code: {}", exit_code);
    drop(_log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args, config: &KioskConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kiosk={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // Daily rotated JSON log file alongside the console output
    let (file_layer, guard) = match &config.logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Kiosk Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Every value can be overridden with KIOSK_<SECTION>__<KEY> environment variables");
    println!();

    let default_config = toml::to_string_pretty(&KioskConfig::default())?;
    println!("{}", default_config);
    Ok(())
}
