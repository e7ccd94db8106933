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
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
    sync::Arc,
};

use tracing::{debug, info, warn};

use crate::{
    device::{Device, DeviceError},
    dmx::{DmxBuffers, UNIVERSE_SIZE},
    fixture::FixtureProfile,
    MAX_CHANNELS,
};

pub mod commands;
mod error;

pub use error::PatchError;

/// Where a device is patched: a one based output slot within a universe. An output of
/// 0 means no output at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub output: u16,
    pub universe: u16,
}

impl Address {
    pub fn new(output: u16, universe: u16) -> Address {
        Address { output, universe }
    }

    /// Parses an address typed on the keypad. "12.2" sets both parts, "12" keeps the
    /// current universe and ".2" keeps the current output.
    pub fn parse_keystring(text: &str, current: Address) -> Result<Address, PatchError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(PatchError::InvalidKeystring(text.to_string()));
        }

        let number = |part: &str, fallback: u16| -> Result<u16, PatchError> {
            if part.is_empty() {
                return Ok(fallback);
            }
            part.parse::<u16>()
                .map_err(|_| PatchError::InvalidKeystring(text.to_string()))
        };

        match trimmed.split_once('.') {
            Some((output, universe)) => Ok(Address {
                output: number(output, current.output)?,
                universe: number(universe, current.universe)?,
            }),
            None => Ok(Address {
                output: number(trimmed, current.output)?,
                universe: current.universe,
            }),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.output, self.universe)
    }
}

impl FromStr for Address {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PatchError::InvalidKeystring(s.to_string());
        let (output, universe) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Address {
            output: output.parse().map_err(|_| invalid())?,
            universe: universe.parse().map_err(|_| invalid())?,
        })
    }
}

/// Why a device left the patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepatchReason {
    /// The channel was patched to output 0.
    Requested,
    /// The channel was repatched over it.
    Replaced,
    /// Another channel was patched over its slots.
    Collision { by: u16 },
}

/// Changes to the patch that views of it need to know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchEvent {
    Patched {
        channel: u16,
        address: Address,
    },
    Depatched {
        channel: u16,
        address: Address,
        reason: DepatchReason,
    },
    /// The whole patch was replaced by undo or redo.
    Restored,
}

/// Maps channels to the devices patched on them. A channel may hold several devices,
/// keyed by address, and no two devices ever share a slot of a universe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchTable {
    channels: BTreeMap<u16, BTreeMap<Address, Device>>,
}

/// Universes touched by an operation, flushed once it completes.
type Touched = BTreeSet<u16>;

impl PatchTable {
    pub fn new() -> PatchTable {
        PatchTable::default()
    }

    /// The number of patched channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn is_patched(&self, channel: u16) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Iterates over patched channels in ascending order.
    pub fn channels(&self) -> impl Iterator<Item = (u16, &BTreeMap<Address, Device>)> {
        self.channels.iter().map(|(channel, devices)| (*channel, devices))
    }

    pub fn devices(&self, channel: u16) -> Option<&BTreeMap<Address, Device>> {
        self.channels.get(&channel)
    }

    pub fn device(&self, channel: u16, address: Address) -> Option<&Device> {
        self.channels.get(&channel)?.get(&address)
    }

    /// The profile a channel is patched with.
    pub fn profile(&self, channel: u16) -> Option<&Arc<FixtureProfile>> {
        self.channels
            .get(&channel)?
            .values()
            .next()
            .map(|device| device.profile())
    }

    /// The number of slots a channel drives, summed over its devices that have an
    /// output.
    pub fn channel_footprint(&self, channel: u16) -> u32 {
        self.channels
            .get(&channel)
            .map(|devices| {
                devices
                    .values()
                    .filter(|device| device.is_patched())
                    .map(|device| u32::from(device.footprint()))
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Finds the channel and address of the device driving a one based slot.
    pub fn slot_owner(&self, universe: u16, slot: u16) -> Option<(u16, Address)> {
        self.channels.iter().find_map(|(channel, devices)| {
            devices
                .iter()
                .find(|(_, device)| device.universe() == universe && device.covers(slot))
                .map(|(address, _)| (*channel, *address))
        })
    }

    /// Patches a channel to a single device, replacing whatever it held before. Devices
    /// of other channels in the way are depatched. An output of 0 depatches the channel
    /// instead, zeroing its levels on the wire first.
    pub fn patch_channel(
        &mut self,
        dmx: &mut DmxBuffers,
        channel: u16,
        address: Address,
        profile: Arc<FixtureProfile>,
    ) -> Result<Vec<PatchEvent>, PatchError> {
        validate_channel(channel)?;
        if address.output == 0 {
            return Ok(self.depatch(dmx, channel));
        }
        validate_placement(dmx, address, u32::from(profile.footprint()))?;

        let mut events = Vec::new();
        let mut touched = Touched::new();
        self.replace(dmx, channel, address, profile, &mut events, &mut touched);
        flush(dmx, &touched);
        Ok(events)
    }

    /// Adds another device to a channel, keeping the ones it already has. Devices in the
    /// way are depatched as they are for a patch.
    pub fn insert_output(
        &mut self,
        dmx: &mut DmxBuffers,
        channel: u16,
        address: Address,
        profile: Arc<FixtureProfile>,
    ) -> Result<Vec<PatchEvent>, PatchError> {
        validate_channel(channel)?;
        if address.output == 0 {
            validate_universe(dmx, address.universe)?;
        } else {
            validate_placement(dmx, address, u32::from(profile.footprint()))?;
        }

        let mut events = Vec::new();
        let mut touched = Touched::new();
        self.place(dmx, channel, address, profile, &mut events, &mut touched);
        flush(dmx, &touched);
        Ok(events)
    }

    /// Patches a selection of channels to consecutive blocks starting at the address.
    /// Nothing changes unless the whole selection fits and its patched channels all
    /// share one fixture.
    pub fn patch_selection(
        &mut self,
        dmx: &mut DmxBuffers,
        channels: &[u16],
        address: Address,
        profile: Arc<FixtureProfile>,
    ) -> Result<Vec<PatchEvent>, PatchError> {
        let mut seen = BTreeSet::new();
        let channels: Vec<u16> = channels
            .iter()
            .copied()
            .filter(|channel| seen.insert(*channel))
            .collect();
        if channels.is_empty() {
            return Err(PatchError::EmptySelection);
        }
        for channel in channels.iter() {
            validate_channel(*channel)?;
        }

        if address.output == 0 {
            return Ok(channels
                .iter()
                .flat_map(|channel| self.depatch(dmx, *channel))
                .collect());
        }

        let mut existing: Option<&Arc<FixtureProfile>> = None;
        for channel in channels.iter() {
            if let Some(patched) = self.profile(*channel) {
                match existing {
                    None => existing = Some(patched),
                    Some(first) if !first.is_same_fixture(patched) => {
                        return Err(PatchError::MixedFixtureSelection(format!(
                            "{} and {}",
                            first, patched
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        let footprint = u32::from(profile.footprint());
        let count = u32::try_from(channels.len()).unwrap_or(u32::MAX);
        validate_placement(dmx, address, footprint.saturating_mul(count))?;

        let mut events = Vec::new();
        let mut touched = Touched::new();
        for (channel, block) in channels.iter().zip(0u32..) {
            // The placement check above bounds every block inside the universe.
            let output = u32::from(address.output) + block * footprint;
            let block_address = Address::new(output as u16, address.universe);
            self.replace(
                dmx,
                *channel,
                block_address,
                profile.clone(),
                &mut events,
                &mut touched,
            );
        }
        flush(dmx, &touched);
        Ok(events)
    }

    /// Applies a change to every device of a channel, then encodes and flushes them.
    pub fn update_channel<F>(
        &mut self,
        dmx: &mut DmxBuffers,
        channel: u16,
        mut apply: F,
    ) -> Result<(), PatchError>
    where
        F: FnMut(&mut Device) -> Result<(), DeviceError>,
    {
        let devices = self
            .channels
            .get_mut(&channel)
            .ok_or(PatchError::NotPatched(channel))?;

        let mut result = Ok(());
        let mut touched = Touched::new();
        for device in devices.values_mut() {
            if let Err(err) = apply(device) {
                result = Err(err.into());
                break;
            }
            encode(device, dmx);
            touched.insert(device.universe());
        }
        flush(dmx, &touched);
        result
    }

    /// Redraws every frame from the patched devices and flushes all of them.
    pub fn rebuild(&self, dmx: &mut DmxBuffers) {
        dmx.clear();
        for devices in self.channels.values() {
            for device in devices.values() {
                encode(device, dmx);
            }
        }
        dmx.flush_all();
    }

    fn depatch(&mut self, dmx: &mut DmxBuffers, channel: u16) -> Vec<PatchEvent> {
        let devices = match self.channels.remove(&channel) {
            Some(devices) => devices,
            None => {
                debug!(channel, "Depatch of an unpatched channel");
                return Vec::new();
            }
        };

        let mut touched = Touched::new();
        let events = devices
            .into_iter()
            .map(|(address, mut device)| {
                retire(&mut device, dmx, &mut touched);
                info!(channel, %address, "Depatched");
                PatchEvent::Depatched {
                    channel,
                    address,
                    reason: DepatchReason::Requested,
                }
            })
            .collect();
        flush(dmx, &touched);
        events
    }

    /// Clears a channel and places a single device on it.
    fn replace(
        &mut self,
        dmx: &mut DmxBuffers,
        channel: u16,
        address: Address,
        profile: Arc<FixtureProfile>,
        events: &mut Vec<PatchEvent>,
        touched: &mut Touched,
    ) {
        if let Some(previous) = self.channels.remove(&channel) {
            for (previous_address, mut device) in previous {
                retire(&mut device, dmx, touched);
                events.push(PatchEvent::Depatched {
                    channel,
                    address: previous_address,
                    reason: DepatchReason::Replaced,
                });
            }
        }
        self.place(dmx, channel, address, profile, events, touched);
    }

    /// Places a device, depatching everything that overlaps it first.
    fn place(
        &mut self,
        dmx: &mut DmxBuffers,
        channel: u16,
        address: Address,
        profile: Arc<FixtureProfile>,
        events: &mut Vec<PatchEvent>,
        touched: &mut Touched,
    ) {
        let footprint = profile.footprint();
        for (owner, owner_address) in self.collisions(channel, address, footprint) {
            let mut device = match self.remove_device(owner, owner_address) {
                Some(device) => device,
                None => continue,
            };
            retire(&mut device, dmx, touched);

            let reason = if owner == channel {
                DepatchReason::Replaced
            } else {
                warn!(
                    channel = owner,
                    address = %owner_address,
                    by = channel,
                    "Depatched by a colliding patch"
                );
                DepatchReason::Collision { by: channel }
            };
            events.push(PatchEvent::Depatched {
                channel: owner,
                address: owner_address,
                reason,
            });
        }

        let device = Device::new(channel, address.output, address.universe, profile);
        encode(&device, dmx);
        touched.insert(address.universe);
        info!(channel, %address, fixture = %device.profile(), "Patched");

        self.channels
            .entry(channel)
            .or_default()
            .insert(address, device);
        events.push(PatchEvent::Patched { channel, address });
    }

    /// Lists the devices whose slots overlap the given range, along with anything
    /// already sitting at the same address on the same channel.
    fn collisions(&self, channel: u16, address: Address, footprint: u16) -> Vec<(u16, Address)> {
        let start = u32::from(address.output);
        let end = start + u32::from(footprint);

        let mut collisions = Vec::new();
        for (owner, devices) in self.channels.iter() {
            for (owner_address, device) in devices.iter() {
                if *owner == channel && *owner_address == address {
                    collisions.push((*owner, *owner_address));
                    continue;
                }
                if device.universe() != address.universe
                    || !device.is_patched()
                    || address.output == 0
                {
                    continue;
                }

                let owner_start = u32::from(device.output());
                let owner_end = owner_start + u32::from(device.footprint());
                if start < owner_end && owner_start < end {
                    collisions.push((*owner, *owner_address));
                }
            }
        }
        collisions
    }

    fn remove_device(&mut self, channel: u16, address: Address) -> Option<Device> {
        let devices = self.channels.get_mut(&channel)?;
        let device = devices.remove(&address);
        if devices.is_empty() {
            self.channels.remove(&channel);
        }
        device
    }
}

fn validate_channel(channel: u16) -> Result<(), PatchError> {
    if channel == 0 || channel > MAX_CHANNELS {
        return Err(PatchError::InvalidChannel {
            channel,
            max: MAX_CHANNELS,
        });
    }
    Ok(())
}

fn validate_universe(dmx: &DmxBuffers, universe: u16) -> Result<(), PatchError> {
    if !dmx.contains(universe) {
        return Err(PatchError::UnknownUniverse(universe));
    }
    Ok(())
}

/// Checks that a block of slots starting at the address fits in a known universe.
fn validate_placement(
    dmx: &DmxBuffers,
    address: Address,
    footprint: u32,
) -> Result<(), PatchError> {
    if address.output == 0 || usize::from(address.output) > UNIVERSE_SIZE {
        return Err(PatchError::InvalidOutput(address.output));
    }
    validate_universe(dmx, address.universe)?;

    let last = u64::from(address.output) + u64::from(footprint);
    if footprint > 0 && last - 1 > UNIVERSE_SIZE as u64 {
        return Err(PatchError::AddressOverflow {
            output: address.output,
            universe: address.universe,
            footprint,
        });
    }
    Ok(())
}

fn encode(device: &Device, dmx: &mut DmxBuffers) {
    match dmx.universe_mut(device.universe()) {
        Some(frame) => device.encode_into(frame),
        None => warn!(
            channel = device.channel(),
            universe = device.universe(),
            "Device patched to an unknown universe"
        ),
    }
}

/// Zeroes a device that is leaving the patch so its slots go dark.
fn retire(device: &mut Device, dmx: &mut DmxBuffers, touched: &mut Touched) {
    device.zero();
    encode(device, dmx);
    touched.insert(device.universe());
}

fn flush(dmx: &DmxBuffers, touched: &Touched) {
    for universe in touched {
        dmx.flush(*universe);
    }
}
