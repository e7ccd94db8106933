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
use std::{
    collections::BTreeMap,
    error::Error,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use super::UNIVERSE_SIZE;

/// Something that puts DMX frames on the wire.
pub trait DmxTransport: Send {
    /// A short name for logging.
    fn name(&self) -> &str;

    /// Sends a complete frame for a universe.
    fn send_dmx(
        &mut self,
        universe: u16,
        levels: &[u8; UNIVERSE_SIZE],
    ) -> Result<(), Box<dyn Error>>;

    /// Called once when the output stops.
    fn close(&mut self) {}
}

/// A single frame bound for the wire.
#[derive(Clone, Debug)]
pub struct DmxMessage {
    pub universe: u16,
    pub levels: [u8; UNIVERSE_SIZE],
}

enum OutputMessage {
    Frame(DmxMessage),
    Stop,
}

/// Queues frames to the output thread. Sending never blocks.
#[derive(Clone)]
pub struct OutputHandle {
    sender: Option<Sender<OutputMessage>>,
}

impl OutputHandle {
    /// A handle that discards everything sent to it.
    pub fn disconnected() -> OutputHandle {
        OutputHandle { sender: None }
    }

    pub fn send(&self, message: DmxMessage) {
        if let Some(sender) = &self.sender {
            if sender.send(OutputMessage::Frame(message)).is_err() {
                debug!("DMX output has stopped, dropping frame");
            }
        }
    }
}

/// Counters describing the output thread.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputStatus {
    pub frames_sent: u64,
    pub errors: u64,
    pub last_error: Option<String>,
}

/// Owns the thread that drains queued frames into a transport. The last frame of
/// each universe is resent once that universe has gone a keepalive interval
/// without a send, regardless of traffic on other universes.
pub struct DmxOutput {
    handle: OutputHandle,
    status: Arc<Mutex<OutputStatus>>,
    join_handle: Option<JoinHandle<()>>,
}

impl DmxOutput {
    pub fn start(transport: Box<dyn DmxTransport>, keepalive: Duration) -> DmxOutput {
        let (sender, receiver) = crossbeam_channel::unbounded::<OutputMessage>();
        let status = Arc::new(Mutex::new(OutputStatus::default()));

        let thread_status = status.clone();
        let join_handle = thread::spawn(move || {
            Self::output_thread(transport, receiver, keepalive, thread_status)
        });

        DmxOutput {
            handle: OutputHandle {
                sender: Some(sender),
            },
            status,
            join_handle: Some(join_handle),
        }
    }

    /// Gets a handle for queueing frames.
    pub fn handle(&self) -> OutputHandle {
        self.handle.clone()
    }

    pub fn status(&self) -> OutputStatus {
        self.status.lock().clone()
    }

    /// Stops the output thread after every queued frame has been sent.
    pub fn stop(&mut self) {
        let join_handle = match self.join_handle.take() {
            Some(join_handle) => join_handle,
            None => return,
        };

        if let Some(sender) = &self.handle.sender {
            let _ = sender.send(OutputMessage::Stop);
        }
        if join_handle.join().is_err() {
            error!("Error joining DMX output thread");
        }
    }

    fn output_thread(
        mut transport: Box<dyn DmxTransport>,
        receiver: Receiver<OutputMessage>,
        keepalive: Duration,
        status: Arc<Mutex<OutputStatus>>,
    ) {
        let span = span!(Level::INFO, "dmx output", transport = transport.name());
        let _enter = span.enter();
        info!("DMX output started");

        // The last frame of each universe and when it last went out.
        let mut last_frames: BTreeMap<u16, ([u8; UNIVERSE_SIZE], Instant)> = BTreeMap::new();
        let mut failing = false;
        let mut send = |transport: &mut Box<dyn DmxTransport>,
                        universe: u16,
                        levels: &[u8; UNIVERSE_SIZE]| {
            let result = transport.send_dmx(universe, levels);
            let mut status = status.lock();
            match result {
                Ok(()) => {
                    status.frames_sent += 1;
                    if failing {
                        info!(universe, "DMX output recovered");
                        failing = false;
                    }
                }
                Err(err) => {
                    status.errors += 1;
                    status.last_error = Some(err.to_string());
                    if failing {
                        debug!(universe, err = %err, "Error sending DMX");
                    } else {
                        error!(universe, err = %err, "Error sending DMX");
                        failing = true;
                    }
                }
            }
        };

        loop {
            let now = Instant::now();
            let timeout = last_frames
                .values()
                .map(|(_, sent_at)| (*sent_at + keepalive).saturating_duration_since(now))
                .min()
                .unwrap_or(keepalive);

            match receiver.recv_timeout(timeout) {
                Ok(OutputMessage::Frame(message)) => {
                    send(&mut transport, message.universe, &message.levels);
                    last_frames.insert(message.universe, (message.levels, Instant::now()));
                }
                Ok(OutputMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            let now = Instant::now();
            for (universe, (levels, sent_at)) in last_frames.iter_mut() {
                if now.duration_since(*sent_at) >= keepalive {
                    send(&mut transport, *universe, levels);
                    *sent_at = now;
                }
            }
        }

        transport.close();
        info!("DMX output stopped");
    }
}

impl Drop for DmxOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
/// Transport that records every frame it is asked to send.
pub struct MockTransport {
    pub sent_messages: Arc<Mutex<Vec<DmxMessage>>>,
    pub closed: Arc<Mutex<bool>>,
    pub should_fail: bool,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent_messages: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
            should_fail: false,
        }
    }
}

#[cfg(test)]
impl DmxTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    fn send_dmx(
        &mut self,
        universe: u16,
        levels: &[u8; UNIVERSE_SIZE],
    ) -> Result<(), Box<dyn Error>> {
        if self.should_fail {
            return Err("Mock transport failure".into());
        }

        self.sent_messages.lock().push(DmxMessage {
            universe,
            levels: *levels,
        });
        Ok(())
    }

    fn close(&mut self) {
        *self.closed.lock() = true;
    }
}

/// Gets the most recent frame recorded for a universe.
#[cfg(test)]
pub fn last_frame(sent: &Arc<Mutex<Vec<DmxMessage>>>, universe: u16) -> Option<[u8; UNIVERSE_SIZE]> {
    sent.lock()
        .iter()
        .rev()
        .find(|message| message.universe == universe)
        .map(|message| message.levels)
}
