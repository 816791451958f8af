//! logvfs Inspection Binary
//!
//! Looks inside a data directory: segments, raw loggables, virtual files.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use logvfs::vfs::{RandomAccessInput, DEFAULT_CLUSTER_SIZE};
use logvfs::{ClusteringStrategy, Config, Environment, Log, LogConfig, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// logvfs inspector
#[derive(Parser, Debug)]
#[command(name = "logvfs-inspect")]
#[command(about = "Inspect a logvfs data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./logvfs_data")]
    data_dir: PathBuf,

    /// Segment size the directory was written with
    #[arg(long, default_value_t = LogConfig::default().file_size)]
    file_size: u64,

    /// Cache page size
    #[arg(long, default_value_t = LogConfig::default().cache_page_size)]
    page_size: u32,

    /// Cluster size (first cluster size when growing)
    #[arg(long, default_value_t = DEFAULT_CLUSTER_SIZE)]
    cluster_size: u64,

    /// Maximum cluster size; selects growing clusters
    #[arg(long)]
    max_cluster_size: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List segment files
    Segments,

    /// Print loggable headers
    Dump {
        /// Address to start at
        #[arg(long, default_value = "0")]
        from: u64,

        /// Maximum number of loggables to print
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// List virtual files and their lengths
    Ls,

    /// Write a virtual file's content to stdout
    Cat {
        /// File path inside the VFS
        path: String,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,logvfs=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .file_size(args.file_size)
        .cache_page_size(args.page_size)
        .clustering(match args.max_cluster_size {
            Some(max) => ClusteringStrategy::growing(args.cluster_size, max),
            None => ClusteringStrategy::linear(args.cluster_size),
        })
        .build();

    if let Err(e) = run(args.command, config) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Segments => {
            let log = Log::open_dir(&config.data_dir, config.log.clone())?;
            for segment in log.segment_files()? {
                println!("{:016x}  {:>12} bytes", segment.start, segment.length);
            }
            println!("high address: {}", log.high_address());
            log.close()
        }
        Command::Dump { from, limit } => {
            let log = Log::open_dir(&config.data_dir, config.log.clone())?;
            for loggable in log.iter(from).take(limit) {
                let loggable = loggable?;
                println!(
                    "{:>12}  type=0x{:02x}  structure={}  len={}",
                    loggable.address,
                    loggable.loggable_type,
                    loggable.structure_id,
                    loggable.payload.len()
                );
            }
            log.close()
        }
        Command::Ls => {
            let env = Environment::open(config)?;
            let vfs = env.vfs();
            for name in vfs.file_names()? {
                let file = vfs.open_existing_file(&name)?;
                println!("{:>12}  {}", vfs.file_length(&file)?, name);
            }
            env.close()
        }
        Command::Cat { path } => {
            let env = Environment::open(config)?;
            let mut input = RandomAccessInput::open(env.vfs(), &path)?;
            let mut buf = vec![0u8; input.length()? as usize];
            input.read_bytes(&mut buf)?;
            std::io::stdout().write_all(&buf)?;
            drop(input);
            env.close()
        }
    }
}
