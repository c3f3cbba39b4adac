// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command line tool for building and inspecting FRU EEPROM images.
//!
//! `fru-tool encode` reads a TOML description (see [`config`]) and writes
//! the binary image; `fru-tool decode` does the reverse, printing a TOML
//! description that feeds back into `encode`.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[clap(max_term_width = 80, about = "FRU EEPROM image builder")]
struct Args {
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Build an image from a TOML description
    Encode {
        /// FRU description (TOML)
        config: PathBuf,
        /// Where to write the image
        out: PathBuf,
        /// Overwrite the output if it already exists
        #[clap(long)]
        force: bool,
    },
    /// Print an image as a TOML description
    Decode {
        /// Image (or raw EEPROM dump) to read
        image: PathBuf,
    },
}

pub fn main() -> Result<()> {
    let args = Args::parse();
    match args.cmd {
        Cmd::Encode { config, out, force } => {
            let text = std::fs::read_to_string(&config)
                .with_context(|| format!("reading {}", config.display()))?;
            let desc: config::FruConfig = toml::from_str(&text)
                .with_context(|| format!("parsing {}", config.display()))?;
            let image = desc.to_image()?;
            if out.exists() && !force {
                bail!(
                    "{} already exists; use --force to overwrite",
                    out.display()
                );
            }
            std::fs::write(&out, &image)
                .with_context(|| format!("writing {}", out.display()))?;
        }
        Cmd::Decode { image } => {
            let blob = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let fru = fru_format::decode(&blob)
                .with_context(|| format!("decoding {}", image.display()))?;
            print!("{}", toml::to_string_pretty(&config::FruConfig::from_fru(&fru))?);
        }
    }

    Ok(())
}
