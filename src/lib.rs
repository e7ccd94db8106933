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
pub mod config;
pub mod console;
pub mod device;
pub mod dmx;
pub mod fixture;
pub mod patch;
pub mod shutdown;
pub mod undo;

#[cfg(test)]
mod testutil;

/// The highest channel number the console exposes.
pub const MAX_CHANNELS: u16 = 1024;

/// The universes a console drives when the configuration doesn't say otherwise.
pub const DEFAULT_UNIVERSES: [u16; 4] = [1, 2, 3, 4];
