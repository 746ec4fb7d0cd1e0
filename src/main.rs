//! cryptdisks - command line entry point
//!
//! Thin layer over the library: parse arguments, load settings, pick an
//! execution context and run one operation.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cryptdisks::cli::{Cli, Commands};
use cryptdisks::context::ExecutionContext;
use cryptdisks::crypttab;
use cryptdisks::error::CryptError;
use cryptdisks::luks;
use cryptdisks::process_guard::{self, ProcessGuard};
use cryptdisks::sanity;
use cryptdisks::settings::Settings;

/// Initialize the logger; RUST_LOG overrides the default level
fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Map an error to the process exit status
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<CryptError>() {
        Some(CryptError::CommandFailed {
            exit_code: Some(code),
            ..
        }) => u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(1),
        Some(
            CryptError::TargetNotFound { .. }
            | CryptError::InvalidSize(_)
            | CryptError::InvalidOption(_),
        ) => 2,
        _ => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);

    // Terminate spawned children if we receive SIGINT/SIGTERM/SIGHUP
    if let Err(e) = process_guard::init_signal_handlers() {
        tracing::warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ProcessGuard::new();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("✗ {:#}", err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load_or_default(cli.config.as_deref())?;
    debug!("Settings: {:?}", settings);

    let context: Box<dyn ExecutionContext> = match &cli.remote {
        Some(destination) => Box::new(settings.ssh_context(destination, cli.dry_run)),
        None => Box::new(settings.local_context(cli.dry_run)),
    };
    let context = context.as_ref();
    if cli.dry_run {
        info!("Dry-run mode: commands on {} are logged, not executed", context.describe());
    }

    let crypttab_or_default =
        |path: Option<PathBuf>| path.unwrap_or_else(|| settings.crypttab_path.clone());

    match cli.command {
        Commands::CreateImage { path, size } => {
            luks::create_image_file(context, &path, size)?;
            println!("✓ Created image file {} ({})", path.display(), size);
        }
        Commands::GenerateKey { path, size } => {
            let size = size.unwrap_or(settings.default_key_size);
            luks::generate_key_file(context, &path, size)?;
            println!("✓ Generated key file {} ({})", path.display(), size);
        }
        Commands::Format { device, key_file } => {
            luks::create_encrypted_filesystem(context, &device, key_file.as_deref())?;
            println!("✓ Formatted {} as LUKS", device.display());
        }
        Commands::Unlock {
            device,
            target,
            key_file,
            options,
        } => {
            luks::unlock_filesystem(context, &device, &target, key_file.as_deref(), options.as_slice())?;
            println!("✓ Unlocked {} as {}", device.display(), crypttab::mapper_path(&target).display());
        }
        Commands::Lock { target } => {
            luks::lock_filesystem(context, &target)?;
            println!("✓ Locked {}", target);
        }
        Commands::Start { target, crypttab } => {
            luks::cryptdisks_start_from(context, &target, crypttab_or_default(crypttab))?;
            println!("✓ Started {}", target);
        }
        Commands::Stop { target, crypttab } => {
            luks::cryptdisks_stop_from(context, &target, crypttab_or_default(crypttab))?;
            println!("✓ Stopped {}", target);
        }
        Commands::List { crypttab } => {
            let path = crypttab_or_default(crypttab);
            let entries = crypttab::parse_crypttab(context, &path)?;
            if entries.is_empty() {
                println!("No entries in {}", path.display());
            }
            for entry in entries {
                println!(
                    "{:<16} {:<48} {}",
                    entry.target,
                    entry.source_device.display(),
                    if entry.is_unlocked { "unlocked" } else { "locked" }
                );
            }
        }
        Commands::Check => {
            let result = sanity::verify_environment(context);
            println!("{}", sanity::format_report(&result));
            if !result.is_ok() {
                anyhow::bail!("Pre-flight check failed on {}", context.describe());
            }
        }
    }

    Ok(())
}
