//! Replays actuator scripts against a simulated register map.

mod script;
mod session;
mod sim;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ois_core::power::{REFERENCE_VARIANT, VariantId};

use session::Session;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "ois-emulator")]
#[command(about = "Replays OIS actuator command scripts against a simulated device")]
struct Cli {
    /// Script to run; reads stdin when omitted
    #[arg(value_name = "SCRIPT")]
    script: Option<PathBuf>,

    /// Directory holding settings buffers named in the script
    #[arg(short, long, default_value = ".")]
    settings: PathBuf,

    /// Directory holding firmware images; defaults to the settings directory
    #[arg(short, long)]
    blobs: Option<PathBuf>,

    /// Actuator variant selecting the default power sequences
    #[arg(long, default_value_t = REFERENCE_VARIANT.0)]
    variant: u8,

    /// Also write the transcript to this file
    #[arg(short, long)]
    transcript: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let blobs = cli.blobs.as_ref().unwrap_or(&cli.settings);
    let mut session = Session::new(&cli.settings, blobs, VariantId(cli.variant))?;

    let input: Box<dyn BufRead> = match &cli.script {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening script {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let mut transcript = cli
        .transcript
        .as_ref()
        .map(|path| {
            File::create(path)
                .map(BufWriter::new)
                .with_context(|| format!("creating transcript {}", path.display()))
        })
        .transpose()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (number, line) in input.lines().enumerate() {
        let line = line?;
        let responses = session
            .run_line(&line)
            .with_context(|| format!("script line {}", number + 1))?;
        if responses.is_empty() {
            continue;
        }

        let mut record = vec![format!("[+{:>6} ms] > {}", session.elapsed_ms(), line.trim())];
        record.extend(
            responses
                .iter()
                .map(|response| format!("[+{:>6} ms] < {response}", session.elapsed_ms())),
        );
        for entry in &record {
            writeln!(out, "{entry}")?;
            if let Some(writer) = transcript.as_mut() {
                writeln!(writer, "{entry}")?;
            }
        }
    }

    if let Some(writer) = transcript.as_mut() {
        writer.flush()?;
    }
    Ok(())
}
