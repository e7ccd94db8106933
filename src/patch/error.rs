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
use thiserror::Error;

use crate::device::DeviceError;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatchError {
    #[error("channel {channel} is outside of 1-{max}")]
    InvalidChannel { channel: u16, max: u16 },

    #[error("output {0} is outside of 1-512")]
    InvalidOutput(u16),

    #[error("universe {0} is not driven by this console")]
    UnknownUniverse(u16),

    #[error("{footprint} slots from output {output} run past the end of universe {universe}")]
    AddressOverflow {
        output: u16,
        universe: u16,
        footprint: u32,
    },

    #[error("selected channels are patched with different fixtures: {0}")]
    MixedFixtureSelection(String),

    #[error("no channels selected")]
    EmptySelection,

    #[error("channel {0} is not patched")]
    NotPatched(u16),

    #[error("unable to parse address {0:?}")]
    InvalidKeystring(String),

    #[error(transparent)]
    Device(#[from] DeviceError),
}
