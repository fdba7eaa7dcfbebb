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
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, span, warn, Instrument, Level};

use crate::machine::DrumMachine;
use crate::sequencer::{parse_pattern, GridError, PatternError, Subdivision, UnknownSubdivision};
use crate::synth::{UnknownVoice, Voice};

pub mod keyboard;

/// Controller events that will trigger behavior in the drum machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Flips one cell of the grid.
    Toggle { step: usize, voice: Voice },

    /// Turns on every cell of a pattern such as `kick=0,4;snare=2,6`.
    Pattern(Vec<(usize, Voice)>),

    /// Switches the subdivision. The grid is cleared.
    Subdivision(Subdivision),

    /// Starts the transport. If it's already playing, does nothing.
    Play,

    /// Stops the transport. If it isn't playing, does nothing.
    Stop,

    /// Prints the grid.
    Show,

    /// Plays a single hit of a voice right away.
    Hit(Voice),

    /// Stops the machine and closes the controller.
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("{0} needs an argument: {1}")]
    MissingArgument(&'static str, &'static str),

    #[error("invalid step '{0}'")]
    Step(String),

    #[error(transparent)]
    Voice(#[from] UnknownVoice),

    #[error(transparent)]
    Subdivision(#[from] UnknownSubdivision),

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// The commands the text drivers understand.
pub const COMMANDS: &str = "toggle <step> <voice>, pattern <voice=steps;...>, \
    subdivision <8|16>, play, stop, show, hit <voice>, quit";

/// Parses a text command into an event.
pub fn parse_command(input: &str) -> Result<Event, CommandError> {
    let mut words = input.split_whitespace();
    let command = words.next().ok_or(CommandError::Empty)?.to_lowercase();

    let event = match command.as_str() {
        "toggle" | "t" => {
            let step = words
                .next()
                .ok_or(CommandError::MissingArgument("toggle", "<step> <voice>"))?;
            let voice = words
                .next()
                .ok_or(CommandError::MissingArgument("toggle", "<step> <voice>"))?;
            Event::Toggle {
                step: step
                    .parse()
                    .map_err(|_| CommandError::Step(step.to_string()))?,
                voice: voice.parse()?,
            }
        }
        "pattern" => {
            let pattern: Vec<&str> = words.by_ref().collect();
            if pattern.is_empty() {
                return Err(CommandError::MissingArgument("pattern", "<voice=steps;...>"));
            }
            Event::Pattern(parse_pattern(&pattern.join(""))?)
        }
        "subdivision" | "sub" => Event::Subdivision(
            words
                .next()
                .ok_or(CommandError::MissingArgument("subdivision", "<8|16>"))?
                .parse()?,
        ),
        "play" => Event::Play,
        "stop" => Event::Stop,
        "show" => Event::Show,
        "hit" => Event::Hit(
            words
                .next()
                .ok_or(CommandError::MissingArgument("hit", "<voice>"))?
                .parse()?,
        ),
        "quit" | "exit" => Event::Quit,
        _ => return Err(CommandError::Unknown(command)),
    };
    Ok(event)
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a drum machine from a driver's events.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(machine: Arc<DrumMachine>, driver: Arc<dyn Driver>) -> Controller {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(machine, driver)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Applies one event to the machine. Returns false once the controller should close.
    pub fn handle_event(machine: &DrumMachine, event: Event) -> Result<bool, GridError> {
        match event {
            Event::Toggle { step, voice } => {
                let on = machine.toggle(step, voice)?;
                println!("{} step {} {}", voice, step, if on { "on" } else { "off" });
            }
            Event::Pattern(cells) => {
                for (step, voice) in cells {
                    machine.set(step, voice, true)?;
                }
            }
            Event::Subdivision(subdivision) => machine.set_subdivision(subdivision),
            Event::Play => {
                if !machine.play() {
                    info!("Already playing.");
                }
            }
            Event::Stop => {
                if !machine.stop() {
                    info!("Not playing, nothing to stop.");
                }
            }
            Event::Show => {
                println!("{}", machine.grid());
                println!(
                    "playing: {}, hi-hat sample: {}",
                    machine.is_playing(),
                    machine.sample_state()
                );
            }
            Event::Hit(voice) => {
                if let Err(e) = machine.audition(voice) {
                    warn!(%voice, err = %e, "Unable to play hit");
                }
            }
            Event::Quit => {
                machine.stop();
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Triggers machine events by watching the driver and getting events from it.
    async fn trigger_events(machine: Arc<DrumMachine>, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(subdivision = %machine.subdivision(), "Controller started.");

        loop {
            let open = match events_rx.recv().await {
                Some(event) => {
                    info!(event = format!("{:?}", event), "Received event.");
                    match Controller::handle_event(&machine, event) {
                        Ok(open) => open,
                        Err(e) => {
                            error!(err = %e, "Error talking to drum machine");
                            true
                        }
                    }
                }
                None => {
                    machine.stop();
                    false
                }
            };

            if !open {
                info!("Controller closing.");
                drop(events_rx);
                match join_handle.await {
                    Ok(Err(e)) => error!(err = %e, "Event monitor failed"),
                    Err(e) => error!("Error waiting for event monitor to stop: {}", e),
                    Ok(Ok(())) => {}
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, io, sync::Arc};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use super::*;
    use crate::{audio::mock, config, testutil::eventually};

    /// A driver that sends a fixed script of events, then closes.
    struct ScriptDriver {
        events: Vec<Event>,
    }

    impl Driver for ScriptDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events = self.events.clone();
            tokio::task::spawn_blocking(move || {
                for event in events {
                    if events_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("toggle 3 snare"),
            Ok(Event::Toggle {
                step: 3,
                voice: Voice::Snare
            })
        );
        assert_eq!(
            parse_command("  T 0 bd "),
            Ok(Event::Toggle {
                step: 0,
                voice: Voice::Kick
            })
        );
        assert_eq!(
            parse_command("subdivision 16"),
            Ok(Event::Subdivision(Subdivision::Sixteenth))
        );
        assert_eq!(
            parse_command("pattern kick=0,4; hh=2"),
            Ok(Event::Pattern(vec![
                (0, Voice::Kick),
                (4, Voice::Kick),
                (2, Voice::HiHat)
            ]))
        );
        assert_eq!(parse_command("PLAY"), Ok(Event::Play));
        assert_eq!(parse_command("stop"), Ok(Event::Stop));
        assert_eq!(parse_command("show"), Ok(Event::Show));
        assert_eq!(parse_command("hit hat"), Ok(Event::Hit(Voice::HiHat)));
        assert_eq!(parse_command("exit"), Ok(Event::Quit));
    }

    #[test]
    fn test_parse_command_errors() {
        assert_eq!(parse_command("   "), Err(CommandError::Empty));
        assert_eq!(
            parse_command("rewind"),
            Err(CommandError::Unknown("rewind".to_string()))
        );
        assert_eq!(
            parse_command("toggle 3"),
            Err(CommandError::MissingArgument("toggle", "<step> <voice>"))
        );
        assert_eq!(
            parse_command("toggle three kick"),
            Err(CommandError::Step("three".to_string()))
        );
        assert!(matches!(
            parse_command("toggle 1 cowbell"),
            Err(CommandError::Voice(_))
        ));
        assert!(matches!(
            parse_command("subdivision 12"),
            Err(CommandError::Subdivision(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() -> Result<(), Box<dyn Error>> {
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        let config = config::Machine::new(config::Audio::new("mock-device"));
        let machine = Arc::new(DrumMachine::new(sink.clone(), &config, vec![])?);
        let driver = Arc::new(ScriptDriver {
            events: vec![
                Event::Subdivision(Subdivision::Sixteenth),
                Event::Toggle {
                    step: 0,
                    voice: Voice::Kick,
                },
                Event::Toggle {
                    step: 99,
                    voice: Voice::Kick,
                },
                Event::Pattern(vec![(4, Voice::Snare)]),
                Event::Show,
                Event::Hit(Voice::Snare),
                Event::Play,
            ],
        });

        let mut controller = Controller::new(machine.clone(), driver);
        // The script ends without a quit, so the controller closes once the driver is done.
        controller.join().await?;

        let grid = machine.grid();
        assert_eq!(grid.len(), 16);
        assert!(grid.active_voices(0).contains(Voice::Kick));
        assert!(grid.active_voices(4).contains(Voice::Snare));
        assert!(!machine.is_playing());
        eventually(
            || sink.scheduled_starts().iter().any(|(label, _)| *label == "snare"),
            "Snare hit never scheduled",
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_quit_stops_machine() -> Result<(), Box<dyn Error>> {
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        let config = config::Machine::new(config::Audio::new("mock-device"));
        let machine = DrumMachine::new(sink, &config, vec![])?;

        assert!(Controller::handle_event(&machine, Event::Play)?);
        assert!(machine.is_playing());
        assert!(!Controller::handle_event(&machine, Event::Quit)?);
        assert!(!machine.is_playing());
        assert!(Controller::handle_event(
            &machine,
            Event::Toggle {
                step: 16,
                voice: Voice::Kick
            }
        )
        .is_err());
        Ok(())
    }
}
