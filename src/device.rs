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
use std::{collections::HashMap, fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    dmx::Universe,
    fixture::{FixtureProfile, Parameter, ParameterGroup, ParameterType, ValueSpec},
};

/// Coarse wheel steps on 16 bit parameters move a whole high byte.
const COARSE_STEP_16BIT: i64 = 256;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeviceError {
    #[error("{fixture} has no parameter named {name}")]
    UnknownParameter { fixture: String, name: String },
}

/// The master scaler used by fixtures whose mode has no intensity of its own.
#[derive(Debug, Clone, PartialEq)]
struct VirtualIntensity {
    parameter: Parameter,
    factor: f64,
}

impl VirtualIntensity {
    fn update(&mut self, value: u32) {
        let max = self.parameter.values.max();
        self.factor = if max == 0 {
            0.0
        } else {
            f64::from(value) / f64::from(max)
        };
    }
}

/// A fixture profile patched to a channel at an output and universe.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    channel: u16,
    output: u16,
    universe: u16,
    profile: Arc<FixtureProfile>,
    values: HashMap<String, u32>,
    virtual_intensity: Option<VirtualIntensity>,
}

impl Device {
    /// Creates a device with every parameter at its default. Modes without an intensity
    /// parameter get a virtual one, starting at 0.
    pub fn new(channel: u16, output: u16, universe: u16, profile: Arc<FixtureProfile>) -> Device {
        let mut values: HashMap<String, u32> = profile
            .parameters()
            .iter()
            .map(|parameter| (parameter.name.clone(), parameter.default))
            .collect();

        let virtual_intensity = if profile.has_intensity() {
            None
        } else {
            let parameter = Parameter::virtual_intensity();
            values.insert(parameter.name.clone(), parameter.default);
            let mut virtual_intensity = VirtualIntensity {
                parameter,
                factor: 0.0,
            };
            virtual_intensity.update(virtual_intensity.parameter.default);
            Some(virtual_intensity)
        };

        Device {
            channel,
            output,
            universe,
            profile,
            values,
            virtual_intensity,
        }
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn output(&self) -> u16 {
        self.output
    }

    pub fn universe(&self) -> u16 {
        self.universe
    }

    pub fn profile(&self) -> &Arc<FixtureProfile> {
        &self.profile
    }

    /// The number of slots this device occupies.
    pub fn footprint(&self) -> u16 {
        self.profile.footprint()
    }

    /// Returns true if the device sends anything at all.
    pub fn is_patched(&self) -> bool {
        self.output != 0
    }

    /// Returns true if the device covers the given one based slot.
    pub fn covers(&self, slot: u16) -> bool {
        self.is_patched()
            && slot >= self.output
            && u32::from(slot) < u32::from(self.output) + u32::from(self.footprint())
    }

    /// The master scaler applied to color parameters, when the mode has no intensity.
    pub fn virtual_intensity(&self) -> Option<f64> {
        self.virtual_intensity.as_ref().map(|virt| virt.factor)
    }

    /// Looks up a parameter, including a synthesized virtual intensity.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.profile.parameter(name).or_else(|| {
            self.virtual_intensity
                .as_ref()
                .map(|virt| &virt.parameter)
                .filter(|parameter| parameter.name == name)
        })
    }

    /// Gets the current value of a parameter.
    pub fn value(&self, name: &str) -> Option<u32> {
        self.values.get(name).copied()
    }

    /// Sets a parameter, bringing the value into its range or table first. Returns the
    /// value that was stored.
    pub fn set_parameter(&mut self, name: &str, value: u32) -> Result<u32, DeviceError> {
        let parameter = self.parameter(name).ok_or_else(|| self.unknown(name))?;
        let value = parameter.values.clamp(value);
        self.store(name, value);
        Ok(value)
    }

    /// Moves a range parameter by a number of wheel steps. 16 bit parameters move a
    /// whole high byte per step unless fine is set. Table parameters don't move.
    pub fn step_parameter(&mut self, name: &str, steps: i32, fine: bool) -> Result<u32, DeviceError> {
        let parameter = self.parameter(name).ok_or_else(|| self.unknown(name))?;
        let current = self.value(name).unwrap_or(parameter.default);
        let (min, max) = match parameter.values {
            ValueSpec::Range { min, max, .. } => (min, max.max(min)),
            ValueSpec::Table(_) => {
                debug!(name, "Ignoring wheel on a table parameter");
                return Ok(current);
            }
        };

        let step = if parameter.kind.is_16bit() && !fine {
            COARSE_STEP_16BIT
        } else {
            1
        };
        let target = (i64::from(current) + i64::from(steps) * step)
            .clamp(i64::from(min), i64::from(max));
        // Clamped into a u32 range above.
        let value = u32::try_from(target).unwrap_or(min);
        self.store(name, value);
        Ok(value)
    }

    /// Sends every parameter back to its default.
    pub fn home(&mut self) {
        self.reset_with(|parameter| parameter.default);
    }

    /// Sends every parameter to its highlight value.
    pub fn highlight(&mut self) {
        self.reset_with(|parameter| parameter.highlight);
    }

    /// Sends every parameter to 0.
    pub fn zero(&mut self) {
        self.reset_with(|_| 0);
    }

    fn reset_with<F>(&mut self, level: F)
    where
        F: Fn(&Parameter) -> u32,
    {
        let mut levels: Vec<(String, u32)> = self
            .profile
            .parameters()
            .iter()
            .map(|parameter| (parameter.name.clone(), level(parameter)))
            .collect();
        if let Some(virt) = &self.virtual_intensity {
            levels.push((virt.parameter.name.clone(), level(&virt.parameter)));
        }

        for (name, value) in levels {
            self.store(&name, value);
        }
    }

    fn store(&mut self, name: &str, value: u32) {
        if let Some(virt) = self.virtual_intensity.as_mut() {
            if virt.parameter.name == name {
                virt.update(value);
            }
        }
        self.values.insert(name.to_string(), value);
    }

    fn unknown(&self, name: &str) -> DeviceError {
        DeviceError::UnknownParameter {
            fixture: self.profile.to_string(),
            name: name.to_string(),
        }
    }

    /// Writes the device's levels into its universe's frame. Encoding the same values
    /// twice writes the same bytes. Unpatched devices write nothing.
    pub fn encode_into(&self, frame: &mut Universe) {
        if !self.is_patched() {
            return;
        }

        for parameter in self.profile.parameters() {
            let mut value = self.value(&parameter.name).unwrap_or(parameter.default);
            if let Some(virt) = &self.virtual_intensity {
                if parameter.group == ParameterGroup::Color {
                    value = (f64::from(value) * virt.factor) as u32;
                }
            }

            match &parameter.kind {
                ParameterType::Htp8 | ParameterType::Ltp8 => {
                    let level = if value > 255 {
                        (value >> 8) & 0xFF
                    } else {
                        value
                    };
                    self.write(frame, parameter.offset.high_byte, level as u8);
                }
                ParameterType::Htp16 | ParameterType::Ltp16 => {
                    self.write(frame, parameter.offset.high_byte, ((value >> 8) & 0xFF) as u8);
                    self.write(frame, parameter.offset.low_byte, (value & 0xFF) as u8);
                }
                ParameterType::Virtual => {}
                ParameterType::Unsupported(kind) => warn!(
                    channel = self.channel,
                    parameter = %parameter.name,
                    kind = %kind,
                    "Skipping unsupported parameter type"
                ),
            }
        }
    }

    fn write(&self, frame: &mut Universe, offset: u16, level: u8) {
        let index = usize::from(self.output) + usize::from(offset) - 1;
        if !frame.set(index, level) {
            debug!(
                channel = self.channel,
                universe = self.universe,
                slot = index + 1,
                "Level falls past the end of the universe"
            );
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}.{} ({})",
            self.channel, self.output, self.universe, self.profile
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        fixture::TableEntry,
        testutil::{full_range, rgb, spot},
    };

    #[test]
    fn test_defaults() {
        let profile = Arc::new(FixtureProfile::new(
            "Wash",
            "Acme",
            "Wash",
            "Std",
            vec![
                full_range("Intensity", ParameterType::Htp8, ParameterGroup::Intensity),
                full_range("Zoom", ParameterType::Ltp8, ParameterGroup::Beam).with_default(128),
            ],
        ));
        let device = Device::new(4, 10, 2, profile);

        assert_eq!(device.value("Intensity"), Some(0));
        assert_eq!(device.value("Zoom"), Some(128));
        assert_eq!(device.virtual_intensity(), None);
        assert_eq!(device.footprint(), 2);
        assert_eq!(device.to_string(), "4 at 10.2 (Acme Wash (Std))");
    }

    #[test]
    fn test_virtual_intensity_scales_color() {
        let mut device = Device::new(1, 1, 1, rgb());
        assert_eq!(device.value("Intensity"), Some(0));
        assert_eq!(device.parameter("Intensity").unwrap().kind, ParameterType::Virtual);

        device.home();
        assert_eq!(device.virtual_intensity(), Some(0.0));

        device.set_parameter("Red", 200).unwrap();
        let mut frame = Universe::new(1);
        device.encode_into(&mut frame);
        assert_eq!(frame.get(0), Some(0));

        device.set_parameter("Intensity", 255).unwrap();
        assert_eq!(device.virtual_intensity(), Some(1.0));
        device.encode_into(&mut frame);
        assert_eq!(frame.get(0), Some(200));

        device.set_parameter("Intensity", 128).unwrap();
        device.encode_into(&mut frame);
        assert_eq!(frame.get(0), Some(100));
    }

    #[test]
    fn test_virtual_intensity_takes_no_slots() {
        let device = Device::new(1, 1, 1, rgb());
        assert_eq!(device.footprint(), 3);
    }

    #[test]
    fn test_encode_16bit() {
        let mut parameters: Vec<Parameter> = (0..5)
            .map(|i| full_range(&format!("Pad {}", i), ParameterType::Ltp8, ParameterGroup::Control))
            .collect();
        parameters.push(full_range("Tilt", ParameterType::Ltp16, ParameterGroup::Focus));
        let profile = Arc::new(FixtureProfile::new("Mover", "Acme", "Mover", "16bit", parameters));
        assert_eq!(
            profile.parameter("Tilt").unwrap().offset,
            crate::fixture::Offset {
                high_byte: 5,
                low_byte: 6
            }
        );

        let mut device = Device::new(1, 10, 1, profile);
        device.set_parameter("Tilt", 65535).unwrap();
        let mut frame = Universe::new(1);
        device.encode_into(&mut frame);

        assert_eq!(frame.get(10 + 5 - 1), Some(0xFF));
        assert_eq!(frame.get(10 + 6 - 1), Some(0xFF));

        device.set_parameter("Tilt", 0x1234).unwrap();
        device.encode_into(&mut frame);
        assert_eq!(frame.get(14), Some(0x12));
        assert_eq!(frame.get(15), Some(0x34));
    }

    #[test]
    fn test_encode_8bit_takes_high_byte() {
        let profile = Arc::new(FixtureProfile::new(
            "Odd",
            "Acme",
            "Odd",
            "",
            vec![Parameter::new(
                "Focus",
                ParameterType::Ltp8,
                ValueSpec::Range {
                    min: 0,
                    max: 1000,
                    percent: false,
                },
            )],
        ));
        let mut device = Device::new(1, 1, 1, profile);
        device.set_parameter("Focus", 300).unwrap();

        let mut frame = Universe::new(1);
        device.encode_into(&mut frame);
        assert_eq!(frame.get(0), Some(1));
    }

    #[test]
    fn test_encode_is_idempotent() {
        let mut device = Device::new(1, 20, 1, spot());
        device.set_parameter("Intensity", 40000).unwrap();
        device.set_parameter("Shutter", 17).unwrap();

        let mut first = Universe::new(1);
        device.encode_into(&mut first);
        let mut second = first.clone();
        device.encode_into(&mut second);

        assert_eq!(first, second);
        assert_eq!(first.get(19), Some((40000u32 >> 8) as u8));
        assert_eq!(first.get(20), Some((40000u32 & 0xFF) as u8));
        assert_eq!(first.get(21), Some(17));
    }

    #[test]
    fn test_unpatched_writes_nothing() {
        let mut device = Device::new(1, 0, 1, spot());
        device.highlight();

        let mut frame = Universe::new(1);
        device.encode_into(&mut frame);
        assert!(frame.levels().iter().all(|level| *level == 0));
        assert!(!device.covers(0));
        assert!(!device.covers(1));
    }

    #[test]
    fn test_encode_stops_at_end_of_universe() {
        let mut device = Device::new(1, 511, 1, spot());
        device.highlight();

        let mut frame = Universe::new(1);
        device.encode_into(&mut frame);
        assert_eq!(frame.get(510), Some(255));
        assert_eq!(frame.get(511), Some(255));
    }

    #[test]
    fn test_unsupported_parameter_is_skipped() {
        let profile = Arc::new(FixtureProfile::new(
            "Strange",
            "Acme",
            "Strange",
            "",
            vec![
                full_range("Intensity", ParameterType::Htp8, ParameterGroup::Intensity),
                Parameter::new(
                    "Macro",
                    ParameterType::parse("RGB24"),
                    ValueSpec::Range {
                        min: 0,
                        max: 255,
                        percent: false,
                    },
                ),
            ],
        ));
        let mut device = Device::new(1, 1, 1, profile);
        device.highlight();

        let mut frame = Universe::new(1);
        device.encode_into(&mut frame);
        assert_eq!(frame.get(0), Some(255));
        assert_eq!(frame.get(1), Some(0));
    }

    #[test]
    fn test_set_parameter_clamps() {
        let mut device = Device::new(1, 1, 1, spot());
        assert_eq!(device.set_parameter("Shutter", 1000), Ok(255));
        assert_eq!(device.value("Shutter"), Some(255));
        assert!(matches!(
            device.set_parameter("Pan", 10),
            Err(DeviceError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_set_parameter_table() {
        let profile = Arc::new(FixtureProfile::new(
            "Gobos",
            "Acme",
            "Gobos",
            "",
            vec![Parameter::new(
                "Gobo",
                ParameterType::Ltp8,
                ValueSpec::Table(vec![
                    TableEntry::new(10, 19, "Gobo 1"),
                    TableEntry::new(40, 49, "Gobo 2"),
                ]),
            )],
        ));
        let mut device = Device::new(1, 1, 1, profile);

        assert_eq!(device.set_parameter("Gobo", 15), Ok(15));
        assert_eq!(device.set_parameter("Gobo", 25), Ok(19));
        assert_eq!(device.set_parameter("Gobo", 35), Ok(40));
        assert_eq!(device.set_parameter("Gobo", 0), Ok(10));
        assert_eq!(device.step_parameter("Gobo", 3, false), Ok(10));
    }

    #[test]
    fn test_step_parameter() {
        let mut device = Device::new(1, 1, 1, spot());

        assert_eq!(device.step_parameter("Intensity", 2, false), Ok(512));
        assert_eq!(device.step_parameter("Intensity", 1, true), Ok(513));
        assert_eq!(device.step_parameter("Intensity", -10, false), Ok(0));
        assert_eq!(device.step_parameter("Intensity", 1000, false), Ok(65535));
        assert_eq!(device.step_parameter("Shutter", -5, false), Ok(0));
        assert_eq!(device.step_parameter("Shutter", 3, false), Ok(3));
    }

    #[test]
    fn test_home_highlight_zero() {
        let mut device = Device::new(1, 1, 1, rgb());

        device.highlight();
        assert_eq!(device.value("Red"), Some(255));
        assert_eq!(device.virtual_intensity(), Some(1.0));

        device.zero();
        assert_eq!(device.value("Red"), Some(0));
        assert_eq!(device.value("Intensity"), Some(0));
        assert_eq!(device.virtual_intensity(), Some(0.0));

        device.set_parameter("Green", 90).unwrap();
        device.home();
        assert_eq!(device.value("Green"), Some(0));
    }

    #[test]
    fn test_covers() {
        let device = Device::new(1, 10, 1, spot());

        assert!(!device.covers(9));
        assert!(device.covers(10));
        assert!(device.covers(12));
        assert!(!device.covers(13));
    }
}
