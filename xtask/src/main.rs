// Licensed under the Apache-2.0 license

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

mod cargo;
mod deps;
mod header;
mod init_packet;
mod precheckin;

pub static PROJECT_ROOT: LazyLock<PathBuf> = LazyLock::new(|| {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
});

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Xtask {
    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that Cargo.lock doesn't need to be updated
    CargoLock,
    /// Run clippy on all targets
    Clippy,
    /// Check that all crates use workspace dependencies
    Deps,
    /// Run cargo fmt
    Format,
    /// Add Apache-2.0 license headers to files that are missing them
    HeaderFix,
    /// Check all files for Apache-2.0 license headers
    HeaderCheck,
    /// Write the init packet carrying the CRC-16 of an application image
    InitPacket {
        /// Application image to be transferred
        #[arg(long)]
        image: PathBuf,

        /// Where to write the init packet
        #[arg(long)]
        output: PathBuf,

        /// Leave the CRC at 0 so the image is accepted unchecked
        #[arg(long, default_value_t = false)]
        no_crc: bool,
    },
    /// Run the checks required before opening a pull request
    Precheckin,
    /// Run host tests and build the firmware crates for the device target
    Test,
}

fn main() {
    let cli = Xtask::parse();
    let result = match &cli.xtask {
        Commands::CargoLock => cargo::cargo_lock(),
        Commands::Clippy => cargo::clippy(),
        Commands::Deps => deps::check(),
        Commands::Format => cargo::format(),
        Commands::HeaderFix => header::fix(),
        Commands::HeaderCheck => header::check(),
        Commands::InitPacket {
            image,
            output,
            no_crc,
        } => init_packet::create(image, output, *no_crc),
        Commands::Precheckin => precheckin::precheckin(),
        Commands::Test => cargo::test(),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
}
