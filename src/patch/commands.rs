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
use std::sync::Arc;

use super::{Address, PatchError};
use crate::{console::Rig, fixture::FixtureProfile, undo::Command};

/// Patches a channel to a single device, or depatches it when the output is 0.
pub struct PatchChannel {
    channel: u16,
    address: Address,
    profile: Arc<FixtureProfile>,
}

impl PatchChannel {
    pub fn new(channel: u16, address: Address, profile: Arc<FixtureProfile>) -> PatchChannel {
        PatchChannel {
            channel,
            address,
            profile,
        }
    }
}

impl Command<Rig> for PatchChannel {
    fn execute(&mut self, rig: &mut Rig) -> Result<(), PatchError> {
        rig.patch_channel(self.channel, self.address, self.profile.clone())
    }

    fn name(&self) -> String {
        if self.address.output == 0 {
            format!("Depatch channel {}", self.channel)
        } else {
            format!("Patch channel {} to {}", self.channel, self.address)
        }
    }
}

/// Adds a device to a channel alongside the ones it has.
pub struct InsertOutput {
    channel: u16,
    address: Address,
    profile: Arc<FixtureProfile>,
}

impl InsertOutput {
    pub fn new(channel: u16, address: Address, profile: Arc<FixtureProfile>) -> InsertOutput {
        InsertOutput {
            channel,
            address,
            profile,
        }
    }
}

impl Command<Rig> for InsertOutput {
    fn execute(&mut self, rig: &mut Rig) -> Result<(), PatchError> {
        rig.insert_output(self.channel, self.address, self.profile.clone())
    }

    fn name(&self) -> String {
        format!("Insert {} on channel {}", self.address, self.channel)
    }
}

/// Patches several channels to consecutive blocks as one step.
pub struct PatchSelection {
    channels: Vec<u16>,
    address: Address,
    profile: Arc<FixtureProfile>,
}

impl PatchSelection {
    pub fn new(channels: Vec<u16>, address: Address, profile: Arc<FixtureProfile>) -> PatchSelection {
        PatchSelection {
            channels,
            address,
            profile,
        }
    }
}

impl Command<Rig> for PatchSelection {
    fn execute(&mut self, rig: &mut Rig) -> Result<(), PatchError> {
        rig.patch_selection(&self.channels, self.address, self.profile.clone())
    }

    fn name(&self) -> String {
        let verb = if self.address.output == 0 {
            "Depatch"
        } else {
            "Patch"
        };
        match self.channels.as_slice() {
            [channel] => format!("{} channel {}", verb, channel),
            channels => format!("{} {} channels", verb, channels.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{dimmer, spot};

    #[test]
    fn test_names() {
        assert_eq!(
            PatchChannel::new(1, Address::new(1, 1), spot()).name(),
            "Patch channel 1 to 1.1"
        );
        assert_eq!(
            PatchChannel::new(4, Address::new(0, 2), spot()).name(),
            "Depatch channel 4"
        );
        assert_eq!(
            InsertOutput::new(2, Address::new(10, 3), dimmer()).name(),
            "Insert 10.3 on channel 2"
        );
        assert_eq!(
            PatchSelection::new(vec![1, 2, 3], Address::new(1, 1), dimmer()).name(),
            "Patch 3 channels"
        );
        assert_eq!(
            PatchSelection::new(vec![7], Address::new(0, 1), dimmer()).name(),
            "Depatch channel 7"
        );
    }
}
