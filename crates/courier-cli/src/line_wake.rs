//! Keyboard stand-in for the wake-word spotter: every line read from the
//! input (an Enter press on a terminal) counts as one utterance while the
//! loop is listening.

use std::io::{BufRead, BufReader};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use courier_perception::WakeWordCollaborator;
use courier_types::CourierError;
use tracing::debug;

pub struct LineWakeWord {
    lines: Receiver<()>,
    listening: bool,
}

impl LineWakeWord {
    /// Read wake events from standard input.
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(std::io::stdin()))
    }

    /// Read wake events from `reader` on a background thread.
    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in reader.lines() {
                if line.is_err() || tx.send(()).is_err() {
                    break;
                }
            }
            debug!("wake-word input closed");
        });
        Self {
            lines: rx,
            listening: false,
        }
    }

    fn drain(&self) {
        while self.lines.try_recv().is_ok() {}
    }
}

impl WakeWordCollaborator for LineWakeWord {
    fn start_listening(&mut self) -> Result<(), CourierError> {
        // Presses made while the vehicle was busy do not count.
        self.drain();
        self.listening = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CourierError> {
        self.listening = false;
        Ok(())
    }

    fn detect(&mut self) -> Result<bool, CourierError> {
        if !self.listening {
            return Ok(false);
        }
        match self.lines.try_recv() {
            Ok(()) => Ok(true),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(false),
        }
    }
}
