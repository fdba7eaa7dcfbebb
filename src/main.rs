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
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use stepdrum::audio;
use stepdrum::config;
use stepdrum::feedback::{FeedbackRenderer, TracingCanvas};
use stepdrum::machine::DrumMachine;
use stepdrum::samples::SampleLoader;
use stepdrum::sequencer::{parse_pattern, Subdivision, TriggerObserver};
use tokio::runtime::Handle;

/// How long to wait for an audio device to start.
const SINK_STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to let the last hits ring out after a non-interactive run.
const RELEASE_TAIL: Duration = Duration::from_millis(600);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A three-voice step sequencer drum machine."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a pattern through the audio interface for a number of bars.
    Play {
        /// The device name to play through. Use "default" for the default output.
        device_name: String,
        /// The pattern to play. Should be in the form <VOICE>=<STEP>,<STEP>;...
        /// For example, kick=0,4;snare=2,6;hihat=0,1,2,3,4,5,6,7.
        #[arg[short, long]]
        pattern: String,
        /// The tempo in beats per minute.
        #[arg[short, long, default_value_t = 120.0]]
        tempo: f64,
        /// Steps per bar, 8 or 16.
        #[arg[short, long, default_value = "8"]]
        subdivision: Subdivision,
        /// Where to load the hi-hat sample from: a URL or a path.
        #[arg[long]]
        hihat: Option<String>,
        /// The number of bars to play.
        #[arg[short, long, default_value_t = 2]]
        bars: u32,
    },
    /// Loads and decodes a sample, verifying that it can be used as the hi-hat.
    VerifySample {
        /// A URL or path to the sample.
        source: String,
        /// The sample rate to decode to.
        #[arg[short = 'r', long, default_value_t = 44100]]
        sample_rate: u32,
    },
    /// Start will start the drum machine with a keyboard controller.
    Start {
        /// The path to the machine config.
        config_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            device_name,
            pattern,
            tempo,
            subdivision,
            hihat,
            bars,
        } => {
            let mut machine_config = config::Machine::new(config::Audio::new(&device_name))
                .with_tempo(tempo)
                .with_subdivision(subdivision);
            if let Some(hihat) = &hihat {
                machine_config = machine_config.with_hihat_sample(hihat);
            }
            let timing = machine_config.timing()?;

            let sink = audio::get_sink(machine_config.audio())?;
            let feedback: Arc<dyn TriggerObserver> = Arc::new(
                FeedbackRenderer::new(Arc::new(TracingCanvas::new()), Handle::try_current()?)
                    .with_clock(sink.clone()),
            );
            let machine = DrumMachine::new(sink.clone(), &machine_config, vec![feedback])?;
            for (step, voice) in parse_pattern(&pattern)? {
                machine.set(step, voice, true)?;
            }
            println!("{}", machine.grid());

            let sample_state = machine.ready().await?;
            if hihat.is_some() {
                println!("Hi-hat sample: {}", sample_state);
            }

            let started = Instant::now();
            while !sink.is_ready() {
                if started.elapsed() > SINK_STARTUP_TIMEOUT {
                    return Err(format!("audio device {} never became ready", sink).into());
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let bar = 240.0 / timing.bpm;
            machine.play();
            tokio::time::sleep(timing.start_delay + Duration::from_secs_f64(bar * bars as f64))
                .await;
            machine.stop();
            tokio::time::sleep(RELEASE_TAIL).await;
        }
        Commands::VerifySample {
            source,
            sample_rate,
        } => {
            let buffer = SampleLoader::new(sample_rate).load(&source).await?;
            println!(
                "{}: {} frames, {:.3}s at {} Hz",
                source,
                buffer.len(),
                buffer.duration(),
                buffer.sample_rate()
            );
        }
        Commands::Start { config_path } => {
            let mut controller =
                config::init_machine_and_controller(&PathBuf::from(&config_path))?;
            controller.join().await?;
        }
    }

    Ok(())
}
