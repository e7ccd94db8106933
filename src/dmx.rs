// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::collections::BTreeMap;

use tracing::warn;

pub mod ola_client;
pub mod sacn;
pub mod transport;
mod universe;

pub use transport::{DmxMessage, DmxOutput, DmxTransport, OutputHandle};
pub use universe::{Universe, UNIVERSE_SIZE};

/// The frame buffers for every universe the console drives. Devices write into the
/// frames, and a flush hands a frame to the output.
pub struct DmxBuffers {
    universes: BTreeMap<u16, Universe>,
    output: OutputHandle,
}

impl DmxBuffers {
    /// Creates dark frames for the given universes.
    pub fn new(universes: &[u16], output: OutputHandle) -> DmxBuffers {
        DmxBuffers {
            universes: universes.iter().map(|id| (*id, Universe::new(*id))).collect(),
            output,
        }
    }

    /// Returns true if the universe is driven by this console.
    pub fn contains(&self, universe: u16) -> bool {
        self.universes.contains_key(&universe)
    }

    pub fn universe(&self, universe: u16) -> Option<&Universe> {
        self.universes.get(&universe)
    }

    pub fn universe_mut(&mut self, universe: u16) -> Option<&mut Universe> {
        self.universes.get_mut(&universe)
    }

    /// Gets the level of a one based slot.
    pub fn level(&self, universe: u16, slot: u16) -> Option<u8> {
        let index = usize::from(slot).checked_sub(1)?;
        self.universes.get(&universe)?.get(index)
    }

    /// Sends the current frame of a universe to the output. Never blocks.
    pub fn flush(&self, universe: u16) {
        match self.universes.get(&universe) {
            Some(frame) => self.output.send(DmxMessage {
                universe,
                levels: *frame.levels(),
            }),
            None => warn!(universe, "Flush requested for an unknown universe"),
        }
    }

    /// Sends every frame.
    pub fn flush_all(&self) {
        for universe in self.universes.keys() {
            self.flush(*universe);
        }
    }

    /// Blacks out every frame without flushing.
    pub fn clear(&mut self) {
        for frame in self.universes.values_mut() {
            frame.clear();
        }
    }
}
