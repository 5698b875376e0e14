//! bitsplit: split files into shares, encrypt them, lock whole directories
//!
//! Commands:
//!   split <input> [share...]     - split a file into k-of-k shares
//!   join <output> <share...>     - recombine shares (or `join --spec <file>`)
//!   keygen <file>                - write a random key (raw or hex)
//!   encrypt / decrypt            - AES-GCM a single file
//!   lock / unlock                - encrypt a directory in place, key kept elsewhere
//!   config show                  - display current configuration

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;

use bitsplit_core::{BitsplitConfig, BitsplitError, ErrorKind};
use bitsplit_crypto::{
    decrypt, encrypt, generate_key, join_from, seeded_rng, split_into, LockKey, SplitScheme,
};
use bitsplit_lock::{candidate_locations, removable_volumes, Confirm, LockOptions, Locker};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "bitsplit",
    version,
    about = "Secret splitting and directory locking",
    long_about = "bitsplit: split files into shares that are useless alone, and lock \
                  directories with a key kept on removable media"
)]
struct Cli {
    /// Path to config.toml (default: ~/.config/bitsplit/config.toml)
    #[arg(long, short = 'c', env = "BITSPLIT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "BITSPLIT_LOG", global = true)]
    log: Option<String>,

    /// Log format; overrides config
    #[arg(long, env = "BITSPLIT_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    /// Answer yes to every confirmation
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a file into shares; all of them are needed to join it back
    Split {
        /// File to split
        input: PathBuf,
        /// Share files to write (default: <input>.key0, <input>.key1, ...)
        shares: Vec<PathBuf>,
        /// Number of shares (default: number of share files given, or 2)
        #[arg(long = "count", short = 'k')]
        count: Option<usize>,
        /// Overwrite existing share files without asking
        #[arg(long, short = 'f')]
        force: bool,
        #[arg(long, value_enum, default_value_t = SchemeArg::PerByte)]
        scheme: SchemeArg,
    },

    /// Recombine shares into the original file
    Join {
        /// Output file
        #[arg(required_unless_present = "spec")]
        output: Option<PathBuf>,
        /// Share files
        shares: Vec<PathBuf>,
        /// File whose first line is the output path and remaining lines the shares
        #[arg(long, conflicts_with_all = ["output", "shares"])]
        spec: Option<PathBuf>,
        /// Overwrite an existing output file without asking
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Write a fresh random key to a file
    Keygen {
        /// Key file to write
        file: PathBuf,
        /// Key length in bytes: 16, 24 or 32 (default: lock.key_size from config)
        #[arg(long = "length", short = 'l')]
        length: Option<usize>,
        /// Write the key as hex instead of raw bytes
        #[arg(long)]
        hex: bool,
        /// Overwrite an existing key file without asking
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Encrypt a file with AES-GCM
    Encrypt(EncryptArgs),

    /// Decrypt a file produced by `encrypt`
    Decrypt(DecryptArgs),

    /// Encrypt a directory in place and store its key in a key store
    Lock {
        /// Directory to lock (default: current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Key store directory (default: last removable volume, after confirmation)
        #[arg(long)]
        keydir: Option<PathBuf>,
    },

    /// Decrypt a locked directory and delete its key
    Unlock {
        /// Directory to unlock (default: current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Key store directory (default: probe configured locations, then removable volumes)
        #[arg(long)]
        keydir: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (defaults merged with the config file)
    Show,
}

#[derive(Args, Debug)]
struct EncryptArgs {
    input: PathBuf,
    /// Output file (omit with -r)
    #[arg(required_unless_present = "rewrite")]
    output: Option<PathBuf>,
    /// Where to write the key
    #[arg(long)]
    key_file: PathBuf,
    /// Use this hex key instead of generating one
    #[arg(long)]
    key: Option<String>,
    /// Write the key as hex instead of raw bytes
    #[arg(long)]
    hex: bool,
    /// Replace the input with the ciphertext
    #[arg(long = "rewrite", short = 'r', conflicts_with = "output")]
    rewrite: bool,
    /// Overwrite existing files without asking
    #[arg(long, short = 'f')]
    force: bool,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("key_source").required(true).args(["key_file", "key"])))]
struct DecryptArgs {
    input: PathBuf,
    /// Output file (omit with -r)
    #[arg(required_unless_present = "rewrite")]
    output: Option<PathBuf>,
    /// File holding the key
    #[arg(long)]
    key_file: Option<PathBuf>,
    /// Hex key
    #[arg(long)]
    key: Option<String>,
    /// The key file holds hex instead of raw bytes
    #[arg(long)]
    hex: bool,
    /// Replace the input with the plaintext
    #[arg(long = "rewrite", short = 'r', conflicts_with = "output")]
    rewrite: bool,
    /// Overwrite existing files without asking
    #[arg(long, short = 'f')]
    force: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum SchemeArg {
    PerByte,
    WholeBuffer,
}

impl From<SchemeArg> for SplitScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::PerByte => SplitScheme::PerByte,
            SchemeArg::WholeBuffer => SplitScheme::WholeBuffer,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = BitsplitConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = match &cli.log_format {
        Some(format) => format.clone(),
        None => LogFormat::from_str(&config.logging.format, true)
            .map_err(|e| anyhow::anyhow!("logging.format: {e}"))?,
    };
    init_logging(&level, &format);

    let mut confirm = StdinConfirm { assume_yes: cli.yes };

    match cli.command {
        Commands::Split { input, shares, count, force, scheme } => {
            let mut rng = seeded_rng(&config.entropy)?;
            let written = cmd_split(
                &input,
                &shares,
                count,
                scheme.into(),
                force,
                &mut confirm,
                &mut rng,
            )?;
            for path in written {
                println!("{}", path.display());
            }
            Ok(())
        }
        Commands::Join { output, shares, spec, force } => {
            let (output, shares) = match spec {
                Some(spec) => {
                    let text = fs::read_to_string(&spec)
                        .with_context(|| format!("reading join spec: {}", spec.display()))?;
                    parse_join_spec(&text)
                        .with_context(|| format!("parsing join spec: {}", spec.display()))?
                }
                None => (output.context("no output file given")?, shares),
            };
            cmd_join(&output, &shares, force, &mut confirm)
        }
        Commands::Keygen { file, length, hex, force } => {
            let mut rng = seeded_rng(&config.entropy)?;
            let length = length.unwrap_or(config.lock.key_size);
            cmd_keygen(&file, length, hex, force, &mut confirm, &mut rng)
        }
        Commands::Encrypt(args) => {
            let mut rng = seeded_rng(&config.entropy)?;
            cmd_encrypt(&args, config.lock.key_size, &mut confirm, &mut rng)
        }
        Commands::Decrypt(args) => cmd_decrypt(&args, &mut confirm),
        Commands::Lock { dir, keydir } => cmd_lock(&config, dir, keydir, confirm),
        Commands::Unlock { dir, keydir } => cmd_unlock(&config, dir, keydir, confirm),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_else(|_| ".".into());
            PathBuf::from(home).join(".config")
        })
        .join("bitsplit")
        .join("config.toml")
}

/// 2: key not found anywhere, 3: rollback failed (manual recovery), 4: not locked.
fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = err
        .chain()
        .find_map(|e| e.downcast_ref::<BitsplitError>())
        .map(BitsplitError::kind);
    match kind {
        Some(ErrorKind::KeyNotFoundAnywhere) => 2,
        Some(ErrorKind::RollbackFailure) => 3,
        Some(ErrorKind::NotLocked) => 4,
        _ => 1,
    }
}

// ── Confirmation ──────────────────────────────────────────────────────────────

/// Asks on stderr, reads the answer from stdin. `--yes` skips the question.
struct StdinConfirm {
    assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&mut self, question: &str) -> bool {
        if self.assume_yes {
            tracing::debug!(question, "assuming yes");
            return true;
        }
        eprint!("{question} [y/n] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        match io::stdin().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn check_overwrite(path: &Path, force: bool, confirm: &mut dyn Confirm) -> Result<()> {
    if force || !path.exists() {
        return Ok(());
    }
    if confirm.confirm(&format!("file {} already exists, overwrite it?", path.display())) {
        return Ok(());
    }
    Err(BitsplitError::Refused(format!(
        "{} already exists; use -f to overwrite",
        path.display()
    ))
    .into())
}

// ── `bitsplit split` / `bitsplit join` ────────────────────────────────────────

fn default_share_paths(input: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let mut name = input.as_os_str().to_os_string();
            name.push(format!(".key{i}"));
            PathBuf::from(name)
        })
        .collect()
}

fn cmd_split(
    input: &Path,
    shares: &[PathBuf],
    count: Option<usize>,
    scheme: SplitScheme,
    force: bool,
    confirm: &mut dyn Confirm,
    rng: &mut StdRng,
) -> Result<Vec<PathBuf>> {
    let paths = if shares.is_empty() {
        default_share_paths(input, count.unwrap_or(2))
    } else {
        if let Some(count) = count {
            if count != shares.len() {
                anyhow::bail!("{} share files given but -k {count}", shares.len());
            }
        }
        shares.to_vec()
    };

    let input_id = resolve_path(input);
    let mut seen = Vec::with_capacity(paths.len());
    for path in &paths {
        let id = resolve_path(path);
        if id == input_id {
            anyhow::bail!("share file {} is the input itself", path.display());
        }
        if seen.contains(&id) {
            anyhow::bail!("share file {} is listed twice", path.display());
        }
        seen.push(id);
    }

    for path in &paths {
        check_overwrite(path, force, confirm)?;
    }

    let file =
        File::open(input).with_context(|| format!("opening input: {}", input.display()))?;
    let mut outputs = paths
        .iter()
        .map(|p| {
            File::create(p)
                .map(BufWriter::new)
                .with_context(|| format!("creating share file: {}", p.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    split_into(BufReader::new(file), &mut outputs, scheme, rng)
        .with_context(|| format!("splitting {}", input.display()))?;
    tracing::info!(input = %input.display(), shares = paths.len(), ?scheme, "split complete");
    Ok(paths)
}

/// First line: output path. Every following non-empty line: a share path.
fn parse_join_spec(text: &str) -> Result<(PathBuf, Vec<PathBuf>)> {
    let mut lines = text.lines().map(str::trim);
    let output = lines
        .next()
        .filter(|l| !l.is_empty())
        .context("first line must name the output file")?;
    let shares = lines.filter(|l| !l.is_empty()).map(PathBuf::from).collect();
    Ok((PathBuf::from(output), shares))
}

/// Canonical form of `path`, resolving only the parent when the file doesn't
/// exist yet. Falls back to `path` as given.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

fn cmd_join(
    output: &Path,
    shares: &[PathBuf],
    force: bool,
    confirm: &mut dyn Confirm,
) -> Result<()> {
    let output_id = resolve_path(output);
    for share in shares {
        if resolve_path(share) == output_id {
            anyhow::bail!("output {} is also listed as a share", output.display());
        }
    }
    let mut inputs = shares
        .iter()
        .map(|p| {
            File::open(p)
                .map(BufReader::new)
                .with_context(|| format!("opening share: {}", p.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    check_overwrite(output, force, confirm)?;
    let out = File::create(output)
        .with_context(|| format!("creating output: {}", output.display()))?;
    join_from(&mut inputs, BufWriter::new(out))
        .with_context(|| format!("joining into {}", output.display()))?;
    tracing::info!(output = %output.display(), shares = shares.len(), "join complete");
    Ok(())
}

// ── `bitsplit keygen` ─────────────────────────────────────────────────────────

fn cmd_keygen(
    file: &Path,
    length: usize,
    hex: bool,
    force: bool,
    confirm: &mut dyn Confirm,
    rng: &mut StdRng,
) -> Result<()> {
    check_overwrite(file, force, confirm)?;
    let key = generate_key(length, rng)?;
    let written = if hex {
        fs::write(file, key.to_hex().as_bytes())
    } else {
        fs::write(file, key.as_bytes())
    };
    written.with_context(|| format!("writing key file: {}", file.display()))?;
    tracing::info!(file = %file.display(), key_bytes = key.len(), hex, "key generated");
    Ok(())
}

// ── `bitsplit encrypt` / `bitsplit decrypt` ───────────────────────────────────

fn cmd_encrypt(
    args: &EncryptArgs,
    key_size: usize,
    confirm: &mut dyn Confirm,
    rng: &mut StdRng,
) -> Result<()> {
    let output = args.output.as_deref().unwrap_or(&args.input);
    check_overwrite(&args.key_file, args.force, confirm)?;
    if !args.rewrite {
        check_overwrite(output, args.force, confirm)?;
    }

    let key = match &args.key {
        Some(hex) => LockKey::from_hex(hex)?,
        None => generate_key(key_size, rng)?,
    };

    let plaintext = zeroize::Zeroizing::new(
        fs::read(&args.input).with_context(|| format!("reading input: {}", args.input.display()))?,
    );
    let ciphertext = encrypt(&plaintext, key.as_bytes(), rng)?;

    let written = if args.hex {
        fs::write(&args.key_file, key.to_hex().as_bytes())
    } else {
        fs::write(&args.key_file, key.as_bytes())
    };
    written.with_context(|| format!("writing key file: {}", args.key_file.display()))?;
    fs::write(output, &ciphertext)
        .with_context(|| format!("writing output: {}", output.display()))?;

    tracing::info!(
        input = %args.input.display(),
        output = %output.display(),
        key_bytes = key.len(),
        "encrypted"
    );
    Ok(())
}

fn load_key(args: &DecryptArgs) -> Result<LockKey> {
    if let Some(hex) = &args.key {
        return Ok(LockKey::from_hex(hex)?);
    }
    let path = args.key_file.as_deref().context("no key given; use --key or --key-file")?;
    let bytes = zeroize::Zeroizing::new(
        fs::read(path).with_context(|| format!("reading key file: {}", path.display()))?,
    );
    let key = if args.hex {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| BitsplitError::InvalidKey(format!("{} is not hex text", path.display())))?;
        LockKey::from_hex(text)?
    } else {
        LockKey::from_bytes(bytes.to_vec())?
    };
    Ok(key)
}

fn cmd_decrypt(args: &DecryptArgs, confirm: &mut dyn Confirm) -> Result<()> {
    let output = args.output.as_deref().unwrap_or(&args.input);
    let key = load_key(args)?;

    let ciphertext =
        fs::read(&args.input).with_context(|| format!("reading input: {}", args.input.display()))?;
    let plaintext = zeroize::Zeroizing::new(
        decrypt(&ciphertext, key.as_bytes())
            .with_context(|| format!("decrypting {}", args.input.display()))?,
    );

    if !args.rewrite {
        check_overwrite(output, args.force, confirm)?;
    }
    fs::write(output, plaintext.as_slice())
        .with_context(|| format!("writing output: {}", output.display()))?;

    tracing::info!(input = %args.input.display(), output = %output.display(), "decrypted");
    Ok(())
}

// ── `bitsplit lock` / `bitsplit unlock` ───────────────────────────────────────

fn target_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("reading current directory"),
    }
}

fn cmd_lock(
    config: &BitsplitConfig,
    dir: Option<PathBuf>,
    keydir: Option<PathBuf>,
    mut confirm: StdinConfirm,
) -> Result<()> {
    let dir = target_dir(dir)?;
    let keydir = match keydir {
        Some(keydir) => keydir,
        None => {
            let volume = removable_volumes()
                .pop()
                .context("no removable volume found; pass --keydir")?;
            if !confirm.confirm(&format!("use {} as key storage?", volume.display())) {
                return Err(BitsplitError::Refused("no key store chosen".into()).into());
            }
            volume
        }
    };

    let rng = seeded_rng(&config.entropy)?;
    let mut locker = Locker::new(rng, confirm, LockOptions::from(&config.lock));
    let outcome = locker.lock(&dir, &keydir)?;

    println!("locked {} ({} files)", dir.display(), outcome.files);
    println!("key: {}", outcome.key_path.display());
    if let Some(snapshot) = outcome.leftover_snapshot {
        println!("note: snapshot {} could not be removed", snapshot.display());
    }
    Ok(())
}

fn cmd_unlock(
    config: &BitsplitConfig,
    dir: Option<PathBuf>,
    keydir: Option<PathBuf>,
    confirm: StdinConfirm,
) -> Result<()> {
    let dir = target_dir(dir)?;
    let rng = seeded_rng(&config.entropy)?;
    let mut locker = Locker::new(rng, confirm, LockOptions::from(&config.lock));

    let outcome = match keydir {
        Some(keydir) => locker.unlock(&dir, &keydir)?,
        None => locker.unlock_any(&dir, &candidate_locations(&config.keystore))?,
    };

    println!("unlocked {} ({} files)", dir.display(), outcome.files);
    println!("key store: {}", outcome.key_store.display());
    if !outcome.content_verified {
        println!("warning: files were added, removed or renamed while the directory was locked");
    }
    if outcome.restored_nested_marker {
        println!("note: the directory is still locked by an earlier key");
    }
    if let Some(key) = outcome.leftover_key {
        println!("note: key file {} could not be removed", key.display());
    }
    if let Some(snapshot) = outcome.leftover_snapshot {
        println!("note: snapshot {} could not be removed", snapshot.display());
    }
    Ok(())
}

// ── `bitsplit config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &BitsplitConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = config.to_toml().context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
