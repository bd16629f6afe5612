use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use mcsquash::coord::{BlockBox, RegionPos};
use mcsquash::extract::{extract_world, ExtractError, ExtractResponse};
use mcsquash::squash::{squash_server, SquashOptions};
use mcsquash::squashed::SquashedReader;
use mcsquash::validate::{validate, ValidateOptions};
use mcsquash::world::{Dimension, World};
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mcsquash", about = "Squashed region archives and block range exports for Minecraft worlds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export blocks, biomes and data versions of a block range as JSON
    #[command(allow_negative_numbers = true)]
    Extract {
        /// World directory (containing chunk/, squashed_region/ or region/)
        #[arg(short = 'w', long)]
        world: PathBuf,
        #[arg(short = 'x', long)]
        min_x: i32,
        #[arg(short = 'X', long)]
        max_x: i32,
        #[arg(short = 'y', long)]
        min_y: i32,
        #[arg(short = 'Y', long)]
        max_y: i32,
        #[arg(short = 'z', long)]
        min_z: i32,
        #[arg(short = 'Z', long)]
        max_z: i32,
        /// Pretty-print the JSON output
        #[arg(short = 'd', long)]
        pretty: bool,
    },
    /// Pack every region of a server's worlds into squashed archives
    Squash {
        server_dir: PathBuf,
        /// Parent directory for scratch files (default: system temp dir)
        #[arg(long)]
        temp_dir: Option<PathBuf>,
        /// Worker threads (0 = all cores)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,
    },
    /// Record fully generated chunks in the completeness index
    #[command(allow_negative_numbers = true)]
    Validate {
        /// Database directory holding <version>/<dimension>/index.txt
        #[arg(short = 'f', long = "db")]
        db_dir: PathBuf,
        #[arg(short = 'w', long)]
        world: PathBuf,
        /// 0 (overworld), -1 (nether) or 1 (end)
        #[arg(short = 'd', long)]
        dimension: Dimension,
        /// Game version tag, e.g. 1.20.1
        #[arg(short = 'v', long)]
        version: String,
        /// Worker threads (0 = all cores)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,
    },
    /// List the chunks stored in a squashed archive
    List {
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = match Cli::command().try_get_matches() {
        Ok(m) => m,
        Err(e) => return usage_error(e),
    };
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(c) => c,
        Err(e) => return usage_error(e),
    };

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `extract` reports bad arguments in its JSON error shape; everything else
/// gets clap's usual output.
fn usage_error(e: clap::Error) -> ExitCode {
    use clap::error::ErrorKind;
    let is_extract = std::env::args().nth(1).as_deref() == Some("extract");
    let informational = matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
    if is_extract && !informational {
        let message = e.kind().as_str().unwrap_or("invalid arguments");
        print_response(&ExtractResponse::error(message), false);
        return ExitCode::FAILURE;
    }
    let _ = e.print();
    if e.use_stderr() { ExitCode::from(2) } else { ExitCode::SUCCESS }
}

fn print_response(response: &ExtractResponse, pretty: bool) {
    match response.to_json(pretty) {
        Ok(json) => println!("{json}"),
        Err(e)   => eprintln!("Error: cannot serialize response: {e}"),
    }
}

fn run(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { world, min_x, max_x, min_y, max_y, min_z, max_z, pretty } => {
            let result = BlockBox::new((min_x, max_x), (min_y, max_y), (min_z, max_z))
                .map_err(ExtractError::from)
                .and_then(|bounds| extract_world(&World::new(world), &bounds));
            match result {
                Ok(extraction) => {
                    print_response(&ExtractResponse::from(&extraction), pretty);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    log::debug!("extract failed: {e:?}");
                    print_response(&ExtractResponse::error(e.to_string()), pretty);
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        // ── Squash ───────────────────────────────────────────────────────────
        Commands::Squash { server_dir, temp_dir, threads } => {
            let opts = SquashOptions { temp_root: temp_dir, threads };
            for (dim, summary) in squash_server(&server_dir, &opts)? {
                for report in summary.reports() {
                    println!("{report}");
                }
                log::info!(
                    "dimension {}: {} squashed, {} skipped, {} failed",
                    dim, summary.squashed(), summary.skipped(), summary.failed()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        // ── Validate ─────────────────────────────────────────────────────────
        Commands::Validate { db_dir, world, dimension, version, threads } => {
            println!("db:        {}", db_dir.display());
            println!("world:     {}", world.display());
            println!("dimension: {}", dimension);
            println!("version:   {}", version);
            let opts = ValidateOptions { db_dir, world_dir: world, dimension, version, threads };
            let report = validate(&opts)?;
            println!("{} chunks validated", report.added);
            if report.failed_regions > 0 {
                println!("{} region(s) failed, see log", report.failed_regions);
            }
            Ok(ExitCode::SUCCESS)
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let region = input
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| RegionPos::from_file_name(n, "s", "smca"));
            let mut reader = SquashedReader::new(BufReader::new(std::fs::File::open(&input)?))?;
            let slots = reader.slots()?;

            println!("Archive: {} ({} B, {} chunk(s))", input.display(), reader.byte_len(), slots.len());
            println!("{:<16} {:>5} {:>10} {:>10}  CRC32", "Chunk", "Slot", "Offset", "Length");
            for info in slots {
                let chunk = region
                    .and_then(|r| r.chunk_at_slot(info.slot))
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "?".into());
                println!("{:<16} {:>5} {:>10} {:>10}  {:08x}", chunk, info.slot, info.offset, info.length, info.crc32);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
