//! keyward: seed management over a file-backed secret store
//!
//! Commands:
//!   status                  - show device and recovery state
//!   reset                   - initialize with a new BIP-39 mnemonic or SLIP-39 shares
//!   recover [--words "..."] - enter a BIP-39 mnemonic or one SLIP-39 share
//!   abort-recovery          - drop an in-progress SLIP-39 share set
//!   derive <path>           - print the public key at a derivation path
//!   upgrade                 - migrate a legacy store layout
//!   wipe --yes              - erase the device secret and settings

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use zeroize::Zeroizing;

use keyward_core::config::KeywardConfig;
use keyward_core::{format_path, parse_path, Curve, KeywardResult};
use keyward_device::{
    derive_node_without_passphrase, recover_device, reset_device, PassphraseSource,
    RecoveryOutcome, RecoveryRequest, ResetRequest, SecretLifecycleManager, Session,
    ShareAccumulator, Slip39Split,
};
use keyward_storage::{DeviceStorage, FileStore};

/// Bytes of device and host entropy mixed into a new secret
const ENTROPY_BYTES: usize = 32;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "keyward",
    version,
    about = "Hierarchical-deterministic seed manager",
    long_about = "keyward: create, recover and derive from a BIP-39 or SLIP-39 seed kept in a local secret store"
)]
struct Cli {
    /// Path to keyward.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "KEYWARD_CONFIG",
        default_value = "~/.config/keyward/config.toml"
    )]
    config: PathBuf,

    /// Secret store file (overrides config)
    #[arg(long, env = "KEYWARD_STORE")]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error; default from config)
    #[arg(long, env = "KEYWARD_LOG")]
    log: Option<String>,

    /// Log format (json, text; default from config)
    #[arg(long, env = "KEYWARD_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show device and recovery state
    Status,

    /// Initialize the device with a freshly generated secret
    Reset {
        /// Create SLIP-39 shares instead of a BIP-39 mnemonic
        #[arg(long)]
        slip39: bool,
        /// Number of SLIP-39 shares
        #[arg(long, default_value_t = 5)]
        shares: u8,
        /// Shares needed to recover
        #[arg(long, default_value_t = 3)]
        threshold: u8,
        /// Entropy strength in bits (default from config)
        #[arg(long)]
        strength: Option<u32>,
        /// Initialize now and back up later
        #[arg(long)]
        skip_backup: bool,
        /// Never show a backup
        #[arg(long, conflicts_with = "skip_backup")]
        no_backup: bool,
        /// Print the device entropy as well
        #[arg(long)]
        display_random: bool,
        /// Ask for a passphrase whenever keys are derived
        #[arg(long)]
        passphrase_protection: bool,
        #[arg(long)]
        label: Option<String>,
    },

    /// Enter a BIP-39 mnemonic or one SLIP-39 share
    ///
    /// SLIP-39 recovery takes one invocation per share; progress survives
    /// between invocations.
    Recover {
        /// Space-separated words (prompted without echo when omitted)
        #[arg(long)]
        words: Option<String>,
        /// Check the mnemonic against the stored one instead of restoring
        #[arg(long)]
        dry_run: bool,
        /// Accept BIP-39 mnemonics with unknown words or a bad checksum
        #[arg(long)]
        no_enforce_wordlist: bool,
        #[arg(long)]
        passphrase_protection: bool,
        #[arg(long)]
        label: Option<String>,
        /// Initial U2F counter
        #[arg(long, default_value_t = 0)]
        u2f_counter: u32,
    },

    /// Drop an in-progress SLIP-39 share set
    #[command(name = "abort-recovery")]
    AbortRecovery,

    /// Print the public key at a derivation path
    Derive {
        /// Path, e.g. m/44'/0'/0'/0/0
        path: String,
        #[arg(long, default_value = "secp256k1")]
        curve: Curve,
        /// Use the empty passphrase and skip namespace checks
        #[arg(long)]
        without_passphrase: bool,
    },

    /// Migrate a legacy store layout
    Upgrade,

    /// Erase the device secret, settings and recovery state
    Wipe {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path)?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);
    if config.is_default() {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    }
    let config = config.into_inner();

    let store_path = cli
        .store
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_else(|| expand_tilde(&config.store.path));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        store = %store_path.display(),
        "keyward starting"
    );
    let mut storage = open_storage(&store_path)?;

    match cli.command {
        Commands::Status => cmd_status(&mut storage),
        Commands::Reset {
            slip39,
            shares,
            threshold,
            strength,
            skip_backup,
            no_backup,
            display_random,
            passphrase_protection,
            label,
        } => {
            let request = ResetRequest {
                strength: strength.unwrap_or(config.reset.strength),
                slip39: slip39.then_some(Slip39Split {
                    count: shares,
                    threshold,
                    iteration_exponent: config.reset.slip39_iteration_exponent,
                }),
                display_random,
                skip_backup,
                no_backup,
                passphrase_protection,
                label,
            };
            cmd_reset(&mut storage, &request)
        }
        Commands::Recover {
            words,
            dry_run,
            no_enforce_wordlist,
            passphrase_protection,
            label,
            u2f_counter,
        } => {
            let request = RecoveryRequest {
                dry_run,
                enforce_wordlist: config.recovery.enforce_wordlist && !no_enforce_wordlist,
                passphrase_protection,
                label,
                u2f_counter,
            };
            cmd_recover(&mut storage, &request, words)
        }
        Commands::AbortRecovery => cmd_abort_recovery(&mut storage),
        Commands::Derive {
            path,
            curve,
            without_passphrase,
        } => cmd_derive(&config, &storage, &path, curve, without_passphrase),
        Commands::Upgrade => cmd_upgrade(&mut storage),
        Commands::Wipe { yes } => cmd_wipe(&mut storage, yes),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Loaded configuration, remembering whether it came from defaults so the
/// warning can be logged once logging is up.
enum LoadedConfig {
    File(KeywardConfig),
    Defaults(KeywardConfig),
}

impl LoadedConfig {
    fn is_default(&self) -> bool {
        matches!(self, LoadedConfig::Defaults(_))
    }

    fn into_inner(self) -> KeywardConfig {
        match self {
            LoadedConfig::File(c) | LoadedConfig::Defaults(c) => c,
        }
    }
}

impl std::ops::Deref for LoadedConfig {
    type Target = KeywardConfig;

    fn deref(&self) -> &KeywardConfig {
        match self {
            LoadedConfig::File(c) | LoadedConfig::Defaults(c) => c,
        }
    }
}

fn load_config(path: &Path) -> Result<LoadedConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok(LoadedConfig::File(config))
    } else {
        Ok(LoadedConfig::Defaults(KeywardConfig::default()))
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

fn open_storage(path: &Path) -> Result<DeviceStorage<FileStore>> {
    let store = FileStore::open(path)
        .with_context(|| format!("opening secret store: {}", path.display()))?;
    Ok(DeviceStorage::new(store))
}

// ── Prompts and progress ──────────────────────────────────────────────────────

/// Reads the passphrase from the terminal without echo.
struct PromptPassphrase;

impl PassphraseSource for PromptPassphrase {
    fn passphrase(&mut self) -> KeywardResult<SecretString> {
        let passphrase = rpassword::prompt_password("Passphrase: ")?;
        Ok(SecretString::from(passphrase))
    }
}

fn make_spinner(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .context("building spinner style")?,
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ── `keyward status` ──────────────────────────────────────────────────────────

fn cmd_status(storage: &mut DeviceStorage<FileStore>) -> Result<()> {
    let device_id = storage.device_id().context("reading device id")?;
    println!("keyward device {device_id}");
    println!("  store:        {}", storage.store().path().display());

    if storage.is_initialized() {
        let standard = storage
            .mnemonic_standard()
            .context("reading mnemonic standard")?;
        println!("  initialized:  yes");
        match standard {
            Some(standard) => println!("  standard:     {standard:?}"),
            None => println!("  standard:     unknown"),
        }
        println!(
            "  label:        {}",
            storage.label().unwrap_or_else(|| "(none)".into())
        );
        println!("  passphrase:   {}", if storage.has_passphrase() { "on" } else { "off" });
        println!("  needs backup: {}", storage.needs_backup());
        println!("  no backup:    {}", storage.no_backup());
    } else {
        println!("  initialized:  no");
    }

    if let Some(state) = storage.load_share_set().context("reading share set")? {
        println!(
            "  recovery:     {} of {} shares entered ({} words each), identifier {}",
            state.indices().len(),
            state.threshold,
            state.word_count()?,
            state.identifier
        );
    }
    Ok(())
}

// ── `keyward reset` ───────────────────────────────────────────────────────────

fn cmd_reset(storage: &mut DeviceStorage<FileStore>, request: &ResetRequest) -> Result<()> {
    let mut internal = Zeroizing::new([0u8; ENTROPY_BYTES]);
    let mut external = Zeroizing::new([0u8; ENTROPY_BYTES]);
    OsRng.fill_bytes(&mut internal[..]);
    OsRng.fill_bytes(&mut external[..]);

    let pb = make_spinner("reset")?;
    pb.set_message(if request.slip39.is_some() {
        "generating shares..."
    } else {
        "generating mnemonic..."
    });
    let result = reset_device(storage, request, &internal[..], &external[..], &mut OsRng);
    pb.finish_and_clear();
    let outcome = result.context("initializing device")?;

    if request.display_random {
        println!("Device entropy: {}", to_hex(&internal[..]));
    }
    match outcome.mnemonics.len() {
        0 => println!("Device initialized. No backup was shown."),
        1 => {
            println!("Write down your recovery mnemonic:");
            println!();
            println!("  {}", outcome.mnemonics[0].as_str());
        }
        n => {
            let threshold = request.slip39.map_or(n as u8, |s| s.threshold);
            println!("Write down each share; any {threshold} of {n} recover the device:");
            for (i, share) in outcome.mnemonics.iter().enumerate() {
                println!();
                println!("  share {}: {}", i + 1, share.as_str());
            }
        }
    }
    Ok(())
}

// ── `keyward recover` ─────────────────────────────────────────────────────────

fn cmd_recover(
    storage: &mut DeviceStorage<FileStore>,
    request: &RecoveryRequest,
    words: Option<String>,
) -> Result<()> {
    let input = match words {
        Some(words) => Zeroizing::new(words),
        None => Zeroizing::new(
            rpassword::prompt_password("Mnemonic or share: ").context("reading mnemonic")?,
        ),
    };
    let words: Vec<&str> = input.split_whitespace().collect();
    if words.is_empty() {
        anyhow::bail!("no words entered");
    }

    let outcome = recover_device(storage, request, &words).context("recovering device")?;
    match outcome {
        RecoveryOutcome::InProgress {
            remaining,
            word_count,
        } => {
            println!("Share accepted. {remaining} more {word_count}-word share(s) needed.");
        }
        RecoveryOutcome::Recovered => println!("Device recovered."),
        RecoveryOutcome::DryRunMatched => {
            println!("The entered mnemonic matches the one stored on the device.")
        }
    }
    Ok(())
}

fn cmd_abort_recovery(storage: &mut DeviceStorage<FileStore>) -> Result<()> {
    let mut accumulator = ShareAccumulator::new(storage);
    if !accumulator.in_progress() {
        println!("No recovery in progress.");
        return Ok(());
    }
    accumulator
        .abort_and_clear()
        .context("clearing share set")?;
    println!("Recovery aborted; entered shares were discarded.");
    Ok(())
}

// ── `keyward derive` ──────────────────────────────────────────────────────────

fn cmd_derive(
    config: &KeywardConfig,
    storage: &DeviceStorage<FileStore>,
    path: &str,
    curve: Curve,
    without_passphrase: bool,
) -> Result<()> {
    let path = parse_path(path).with_context(|| format!("parsing path {path}"))?;

    let node = if without_passphrase {
        derive_node_without_passphrase(storage, &path, curve)
    } else {
        let namespaces = config
            .keychain
            .namespaces()
            .context("resolving keychain namespaces")?;
        let mut session = Session::new();
        let mut keychain = session
            .keychain(storage, namespaces, &mut PromptPassphrase)
            .context("unlocking keychain")?;
        let node = keychain.derive(&path, curve);
        session.lock();
        node
    }
    .with_context(|| format!("deriving {}", format_path(&path)))?;

    println!("path:       {}", format_path(&path));
    println!("curve:      {curve}");
    println!("public key: {}", to_hex(node.public_key()));
    println!("chain code: {}", to_hex(node.chain_code()));
    Ok(())
}

// ── `keyward upgrade` / `keyward wipe` ────────────────────────────────────────

fn cmd_upgrade(storage: &mut DeviceStorage<FileStore>) -> Result<()> {
    let migrated = SecretLifecycleManager::new(storage)
        .upgrade_schema()
        .context("upgrading store layout")?;
    if migrated {
        println!("Store layout upgraded.");
    } else {
        println!("Store layout is current.");
    }
    Ok(())
}

fn cmd_wipe(storage: &mut DeviceStorage<FileStore>, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("refusing to wipe without --yes");
    }
    SecretLifecycleManager::new(storage)
        .wipe()
        .context("wiping device")?;
    println!("Device wiped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reset_slip39() {
        let cli = Cli::try_parse_from([
            "keyward", "reset", "--slip39", "--shares", "4", "--threshold", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Reset {
                slip39,
                shares,
                threshold,
                ..
            } => {
                assert!(slip39);
                assert_eq!((shares, threshold), (4, 2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_derive_curve() {
        let cli =
            Cli::try_parse_from(["keyward", "derive", "m/44'/0'", "--curve", "ed25519"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Derive {
                curve: Curve::Ed25519,
                ..
            }
        ));
    }

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(
            expand_tilde(Path::new("~/keyward/store.json")),
            PathBuf::from(home).join("keyward/store.json")
        );
        assert_eq!(
            expand_tilde(Path::new("/var/lib/keyward")),
            PathBuf::from("/var/lib/keyward")
        );
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_default());
        assert_eq!(loaded.reset.strength, 256);
    }

    #[test]
    fn test_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyward.toml");
        std::fs::write(&path, "[reset]\nstrength = 128\n").unwrap();
        let loaded = load_config(&path).unwrap();
        assert!(!loaded.is_default());
        assert_eq!(loaded.into_inner().reset.strength, 128);
    }

    #[test]
    fn test_bad_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyward.toml");
        std::fs::write(&path, "[reset]\nstrength = \"lots\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
