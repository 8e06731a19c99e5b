// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{crate_version, Parser, Subcommand};
use sfrender::{InstrumentBank, InstrumentTable, Performance, RenderOptions, Renderer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Renders MIDI performances to audio with SoundFont instruments."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Renders a MIDI file to a stereo WAV file.
    Render {
        /// The MIDI file to render.
        midi_path: PathBuf,
        /// The SoundFont providing the instrument.
        soundfont_path: PathBuf,
        /// Where to write the rendered WAV file.
        output_path: PathBuf,
        /// A render options file (YAML).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Overrides the configured number of render workers.
        #[arg(short, long)]
        threads: Option<usize>,
        /// Overrides the configured output sample rate.
        #[arg(short = 'r', long)]
        sample_rate: Option<u32>,
    },
    /// Lists the presets in a SoundFont.
    Presets {
        /// The SoundFont to inspect.
        soundfont_path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            midi_path,
            soundfont_path,
            output_path,
            config,
            threads,
            sample_rate,
        } => {
            let start = Instant::now();
            let mut options = match config {
                Some(path) => RenderOptions::from_file(&path)?,
                None => RenderOptions::default(),
            };
            if let Some(threads) = threads {
                options = options.with_thread_count(threads);
            }
            if let Some(sample_rate) = sample_rate {
                options = options.with_sample_rate(sample_rate);
            }

            let bank = InstrumentBank::from_file(&soundfont_path)?;
            let table = InstrumentTable::build(&bank, &options)?;
            let performance = Performance::from_file(&midi_path)?;

            let renderer = Renderer::with_table(options, Arc::new(table));
            let buffer = renderer.render(&performance)?;
            buffer.write_wav(&output_path)?;

            info!(
                seconds = buffer.duration(),
                elapsed_ms = start.elapsed().as_millis(),
                "Done"
            );
        }
        Commands::Presets { soundfont_path } => {
            let bank = InstrumentBank::from_file(&soundfont_path)?;

            if bank.presets.is_empty() {
                println!("No presets found.");
                return Ok(());
            }

            let mut presets: Vec<_> = bank.presets.iter().collect();
            presets.sort_by_key(|preset| (preset.bank, preset.program));

            println!("Presets (count: {}):", presets.len());
            for preset in presets {
                println!(
                    "- {:03}:{:03} ({} zones)",
                    preset.bank,
                    preset.program,
                    preset.zones.len()
                );
            }
        }
    }

    Ok(())
}
