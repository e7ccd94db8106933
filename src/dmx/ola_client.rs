// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
use std::{error::Error, net::TcpStream, thread, time::Duration};

use ola::{client::StreamingClientConfig, DmxBuffer, StreamingClient};
use tracing::{debug, info};

use super::{transport::DmxTransport, UNIVERSE_SIZE};

const CONNECT_ATTEMPTS: usize = 3;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Sends universes through a running OLA daemon.
pub struct OlaTransport {
    client: StreamingClient<TcpStream>,
    buffer: DmxBuffer,
}

impl OlaTransport {
    /// Connects to olad on the given port, retrying a few times before giving up.
    pub fn connect(port: u16) -> Result<OlaTransport, Box<dyn Error>> {
        let config = StreamingClientConfig {
            server_port: port,
            ..Default::default()
        };

        for attempt in 0..CONNECT_ATTEMPTS {
            // Don't sleep on the first attempt.
            if attempt > 0 {
                thread::sleep(CONNECT_RETRY_DELAY);
            }

            if let Ok(client) = ola::connect_with_config(config.clone()) {
                info!(port, "Connected to OLA");
                return Ok(OlaTransport {
                    client,
                    buffer: DmxBuffer::new(),
                });
            }

            debug!(port, attempt, "Error connecting to OLA, trying again.");
        }

        Err(format!("unable to connect to OLA on port {}", port).into())
    }
}

/// Copies a frame into an OLA buffer.
fn fill_buffer(buffer: &mut DmxBuffer, levels: &[u8; UNIVERSE_SIZE]) {
    for (slot, level) in levels.iter().enumerate() {
        buffer.set_channel(slot, *level);
    }
}

impl DmxTransport for OlaTransport {
    fn name(&self) -> &str {
        "ola"
    }

    fn send_dmx(
        &mut self,
        universe: u16,
        levels: &[u8; UNIVERSE_SIZE],
    ) -> Result<(), Box<dyn Error>> {
        fill_buffer(&mut self.buffer, levels);
        self.client.send_dmx(u32::from(universe), &self.buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_buffer() {
        let mut levels = [0u8; UNIVERSE_SIZE];
        levels[0] = 12;
        levels[511] = 255;

        let mut buffer = DmxBuffer::new();
        fill_buffer(&mut buffer, &levels);
        assert_eq!(buffer.len(), 512);
        assert_eq!([12u8, 0u8], buffer.as_slice()[0..2]);
        assert_eq!(255, buffer.as_slice()[511]);

        fill_buffer(&mut buffer, &[0u8; UNIVERSE_SIZE]);
        assert_eq!(0, buffer.as_slice()[0]);
    }
}
