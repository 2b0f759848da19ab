//! entropypool CLI: create, feed, drain and inspect a persistent entropy pool.

mod commands;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use commands::{LayoutArg, OutputFormat};

#[derive(Parser)]
#[command(name = "entropypool")]
#[command(about = "entropypool: a persistent software entropy pool")]
#[command(version = entropypool_core::VERSION)]
struct Cli {
    /// Pool file to operate on
    #[arg(long, global = true, default_value = "entropypool.bin")]
    pool: PathBuf,

    /// Log more (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty pool file
    Create {
        /// JSON pool config; flags below override its fields
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pool size in bytes
        #[arg(long)]
        size: Option<usize>,

        /// Secure random algorithm name
        #[arg(long)]
        secure_random: Option<String>,

        /// Message digest algorithm name
        #[arg(long)]
        digest: Option<String>,

        /// Cipher algorithm name
        #[arg(long)]
        cipher: Option<String>,

        /// Substitute defaults for unsupported algorithm names
        #[arg(long)]
        fallback: bool,

        /// Replace an existing pool file
        #[arg(long)]
        force: bool,

        /// On-disk layout
        #[arg(long, value_enum, default_value_t = LayoutArg::Tagged)]
        layout: LayoutArg,

        /// Comment stored with the pool (tagged layout only)
        #[arg(long)]
        comment: Option<String>,
    },

    /// Feed files or directory trees into the pool (created if missing)
    Inject {
        /// Files or directories to read
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Draw bytes from the pool
    Extract {
        /// Number of bytes
        #[arg(short = 'n', long)]
        bytes: u32,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Hex)]
        format: OutputFormat,
    },

    /// Run the mixing pipeline
    Mix {
        /// How many times to mix
        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },

    /// Show pool state
    Info {
        /// Output JSON
        #[arg(long)]
        json: bool,

        /// Read only the file header
        #[arg(long)]
        header: bool,
    },

    /// Print the default pool config as JSON
    Config,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut stdout = std::io::stdout().lock();
    let result = match cli.command {
        Commands::Create {
            config,
            size,
            secure_random,
            digest,
            cipher,
            fallback,
            force,
            layout,
            comment,
        } => commands::create::run(
            &cli.pool,
            &commands::create::CreateArgs {
                config,
                size,
                secure_random,
                digest,
                cipher,
                fallback,
                force,
                layout: layout.into(),
                comment,
            },
            &mut stdout,
        ),
        Commands::Inject { paths } => commands::inject::run(&cli.pool, &paths, &mut stdout),
        Commands::Extract { bytes, format } => {
            commands::extract::run(&cli.pool, bytes, format, &mut stdout)
        }
        Commands::Mix { rounds } => commands::mix::run(&cli.pool, rounds, &mut stdout),
        Commands::Info { json, header } => commands::info::run(&cli.pool, json, header, &mut stdout),
        Commands::Config => commands::config::run(&mut stdout),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}
