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

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::{parse_command, Event, COMMANDS};

/// A controller that drives the drum machine with typed commands.
pub struct Driver {}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads one command and forwards it. Returns false once input is exhausted or the user
    /// quit, after sending a final quit event.
    fn monitor_io<R, W>(events_tx: &Sender<Event>, mut reader: R, mut writer: W) -> io::Result<bool>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(writer, "Command ({}): ", COMMANDS)?;
        writer.flush()?;
        let mut input: String = String::default();
        let event = if reader.read_line(&mut input)? == 0 {
            Event::Quit
        } else if input.trim().is_empty() {
            return Ok(true);
        } else {
            match parse_command(&input) {
                Ok(event) => event,
                Err(e) => {
                    warn!(input = input.trim(), err = %e, "Unrecognized input");
                    writeln!(writer, "{}", e)?;
                    return Ok(true);
                }
            }
        };

        let open = event != Event::Quit;
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(open)
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader};

    use tokio::sync::mpsc;

    use super::Driver;
    use crate::controller::Event;
    use crate::synth::Voice;

    fn get_event(input: &str) -> Result<(bool, Option<Event>), io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(input.as_bytes());
        let mut writer: Vec<u8> = Vec::new();
        let open = Driver::monitor_io(&sender, reader, &mut writer)?;
        assert!(String::from_utf8_lossy(&writer).starts_with("Command ("));

        // Force the sender to close.
        drop(sender);
        Ok((open, receiver.blocking_recv()))
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(get_event("play\n")?, (true, Some(Event::Play)));
        assert_eq!(get_event("stop\n")?, (true, Some(Event::Stop)));
        assert_eq!(
            get_event("toggle 2 hihat\n")?,
            (
                true,
                Some(Event::Toggle {
                    step: 2,
                    voice: Voice::HiHat
                })
            )
        );
        assert_eq!(get_event("quit\n")?, (false, Some(Event::Quit)));
        Ok(())
    }

    #[test]
    fn test_unrecognized_and_blank_input() -> Result<(), io::Error> {
        assert_eq!(get_event("unrecognized\n")?, (true, None));
        assert_eq!(get_event("\n")?, (true, None));
        Ok(())
    }

    #[test]
    fn test_end_of_input_quits() -> Result<(), io::Error> {
        assert_eq!(get_event("")?, (false, Some(Event::Quit)));
        Ok(())
    }
}
