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
use std::fmt;

use serde::Deserialize;
use tracing::warn;

pub mod catalog;

pub use catalog::{Catalog, CatalogEntry, CatalogError};

/// The name of the parameter that controls a fixture's output level.
pub const INTENSITY: &str = "Intensity";

/// The encoding of a parameter on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterType {
    /// Highest takes precedence, one slot.
    Htp8,
    /// Latest takes precedence, one slot.
    Ltp8,
    /// Highest takes precedence, two slots (coarse, fine).
    Htp16,
    /// Latest takes precedence, two slots (coarse, fine).
    Ltp16,
    /// Exists only inside the console, occupies no slots.
    Virtual,
    /// A type the console doesn't know how to encode. Kept so that a single bad
    /// parameter doesn't make the whole fixture unusable.
    Unsupported(String),
}

impl ParameterType {
    /// Parses the type names used by fixture files.
    pub fn parse(name: &str) -> ParameterType {
        match name.trim().to_ascii_uppercase().as_str() {
            "HTP8" => ParameterType::Htp8,
            "LTP8" => ParameterType::Ltp8,
            "HTP16" => ParameterType::Htp16,
            "LTP16" => ParameterType::Ltp16,
            "VIRTUAL" => ParameterType::Virtual,
            _ => ParameterType::Unsupported(name.to_string()),
        }
    }

    /// The number of DMX slots this type occupies.
    pub fn slot_width(&self) -> u16 {
        match self {
            ParameterType::Htp8 | ParameterType::Ltp8 => 1,
            ParameterType::Htp16 | ParameterType::Ltp16 => 2,
            ParameterType::Virtual | ParameterType::Unsupported(_) => 0,
        }
    }

    /// Returns true for the two byte encodings.
    pub fn is_16bit(&self) -> bool {
        matches!(self, ParameterType::Htp16 | ParameterType::Ltp16)
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterType::Htp8 => write!(f, "HTP8"),
            ParameterType::Ltp8 => write!(f, "LTP8"),
            ParameterType::Htp16 => write!(f, "HTP16"),
            ParameterType::Ltp16 => write!(f, "LTP16"),
            ParameterType::Virtual => write!(f, "VIRTUAL"),
            ParameterType::Unsupported(name) => write!(f, "{} (unsupported)", name),
        }
    }
}

/// The functional group a parameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ParameterGroup {
    Intensity,
    Focus,
    Color,
    Beam,
    Effect,
    Control,
}

impl fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where a parameter's bytes live, relative to the device's first slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset {
    pub high_byte: u16,
    pub low_byte: u16,
}

/// A labelled sub-range of a table parameter, e.g. a gobo slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub start: u32,
    pub stop: u32,
    pub label: String,
}

impl TableEntry {
    pub fn new(start: u32, stop: u32, label: &str) -> TableEntry {
        TableEntry {
            start: start.min(stop),
            stop: start.max(stop),
            label: label.to_string(),
        }
    }

    /// Returns true if the value falls inside this entry.
    pub fn contains(&self, value: u32) -> bool {
        self.start <= value && value <= self.stop
    }
}

/// The values a parameter can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSpec {
    /// A continuous range.
    Range { min: u32, max: u32, percent: bool },
    /// A list of discrete buckets.
    Table(Vec<TableEntry>),
}

impl ValueSpec {
    /// Brings a value into this spec. Ranges clamp; tables keep values that land in a
    /// bucket and otherwise snap to the nearest bucket boundary.
    pub fn clamp(&self, value: u32) -> u32 {
        match self {
            ValueSpec::Range { min, max, .. } => value.clamp(*min, (*max).max(*min)),
            ValueSpec::Table(entries) => {
                if entries.is_empty() || entries.iter().any(|entry| entry.contains(value)) {
                    return value;
                }
                entries
                    .iter()
                    .flat_map(|entry| [entry.start, entry.stop])
                    .min_by_key(|boundary| boundary.abs_diff(value))
                    .unwrap_or(value)
            }
        }
    }

    /// The lowest acceptable value.
    pub fn min(&self) -> u32 {
        match self {
            ValueSpec::Range { min, .. } => *min,
            ValueSpec::Table(entries) => entries.iter().map(|e| e.start).min().unwrap_or(0),
        }
    }

    /// The highest acceptable value.
    pub fn max(&self) -> u32 {
        match self {
            ValueSpec::Range { max, .. } => *max,
            ValueSpec::Table(entries) => entries.iter().map(|e| e.stop).max().unwrap_or(0),
        }
    }
}

/// A single controllable attribute of a fixture mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterType,
    pub offset: Offset,
    pub default: u32,
    pub highlight: u32,
    pub values: ValueSpec,
    pub group: ParameterGroup,
}

impl Parameter {
    /// Creates a parameter with a zero default, a highlight at the top of its values and
    /// no offset. Offsets are assigned when the parameter is placed in a profile.
    pub fn new(name: &str, kind: ParameterType, values: ValueSpec) -> Parameter {
        Parameter {
            name: name.to_string(),
            highlight: values.max(),
            kind,
            offset: Offset::default(),
            default: 0,
            values,
            group: ParameterGroup::Control,
        }
    }

    /// The intensity synthesized for fixtures that have none of their own.
    pub fn virtual_intensity() -> Parameter {
        Parameter::new(
            INTENSITY,
            ParameterType::Virtual,
            ValueSpec::Range {
                min: 0,
                max: 255,
                percent: true,
            },
        )
        .with_group(ParameterGroup::Intensity)
    }

    pub fn with_group(mut self, group: ParameterGroup) -> Parameter {
        self.group = group;
        self
    }

    pub fn with_default(mut self, default: u32) -> Parameter {
        self.default = default;
        self
    }

    pub fn with_highlight(mut self, highlight: u32) -> Parameter {
        self.highlight = highlight;
        self
    }
}

/// An immutable fixture template: one mode of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureProfile {
    name: String,
    manufacturer: String,
    model_name: String,
    mode_name: String,
    parameters: Vec<Parameter>,
    footprint: u16,
}

impl FixtureProfile {
    /// Creates a profile from parameters in mode order. Offsets are synthesized from that
    /// order, so the order of the parameters is part of the wire layout.
    pub fn new(
        name: &str,
        manufacturer: &str,
        model_name: &str,
        mode_name: &str,
        mut parameters: Vec<Parameter>,
    ) -> FixtureProfile {
        let footprint = assign_offsets(&mut parameters);
        FixtureProfile {
            name: name.to_string(),
            manufacturer: manufacturer.to_string(),
            model_name: model_name.to_string(),
            mode_name: mode_name.to_string(),
            parameters,
            footprint,
        }
    }

    /// The built-in single channel dimmer.
    pub fn dimmer() -> FixtureProfile {
        FixtureProfile::new(
            "Dimmer",
            "Generic",
            "Dimmer",
            "",
            vec![Parameter::new(
                INTENSITY,
                ParameterType::Htp8,
                ValueSpec::Range {
                    min: 0,
                    max: 255,
                    percent: true,
                },
            )
            .with_group(ParameterGroup::Intensity)
            .with_highlight(255)],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn mode_name(&self) -> &str {
        &self.mode_name
    }

    /// The parameters in mode order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Gets a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }

    /// The number of DMX slots this mode occupies.
    pub fn footprint(&self) -> u16 {
        self.footprint
    }

    /// Returns true if the mode has its own Intensity parameter.
    pub fn has_intensity(&self) -> bool {
        self.parameter(INTENSITY).is_some()
    }

    /// Returns true if both profiles describe the same mode of the same model.
    pub fn is_same_fixture(&self, other: &FixtureProfile) -> bool {
        self.manufacturer == other.manufacturer
            && self.model_name == other.model_name
            && self.mode_name == other.mode_name
    }
}

impl fmt::Display for FixtureProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode_name.is_empty() {
            write!(f, "{} {}", self.manufacturer, self.model_name)
        } else {
            write!(
                f,
                "{} {} ({})",
                self.manufacturer, self.model_name, self.mode_name
            )
        }
    }
}

/// Walks the parameters in order and gives each its slot(s). Returns the footprint.
fn assign_offsets(parameters: &mut [Parameter]) -> u16 {
    let mut running = 0u16;
    for parameter in parameters.iter_mut() {
        match parameter.kind {
            ParameterType::Htp8 | ParameterType::Ltp8 => {
                parameter.offset = Offset {
                    high_byte: running,
                    low_byte: running,
                };
            }
            ParameterType::Htp16 | ParameterType::Ltp16 => {
                parameter.offset = Offset {
                    high_byte: running,
                    low_byte: running + 1,
                };
            }
            ParameterType::Virtual => parameter.offset = Offset::default(),
            ParameterType::Unsupported(ref kind) => {
                warn!(
                    parameter = parameter.name,
                    kind, "Parameter type not supported, it will not be output"
                );
                parameter.offset = Offset::default();
            }
        }
        running += parameter.kind.slot_width();
    }
    running
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> ValueSpec {
        ValueSpec::Range {
            min: 0,
            max: 255,
            percent: true,
        }
    }

    #[test]
    fn test_parse_types() {
        assert_eq!(ParameterType::parse("HTP8"), ParameterType::Htp8);
        assert_eq!(ParameterType::parse("ltp16"), ParameterType::Ltp16);
        assert_eq!(ParameterType::parse("VIRTUAL"), ParameterType::Virtual);
        assert_eq!(
            ParameterType::parse("HTP24"),
            ParameterType::Unsupported("HTP24".to_string())
        );
    }

    #[test]
    fn test_footprint_is_sum_of_slot_widths() {
        let profile = FixtureProfile::new(
            "Spot",
            "Acme",
            "Spot",
            "Standard",
            vec![
                Parameter::new("Pan", ParameterType::Ltp16, range()),
                Parameter::new("Intensity", ParameterType::Htp8, range()),
                Parameter::new("Gobo", ParameterType::Ltp8, range()),
                Parameter::new("Master", ParameterType::Virtual, range()),
                Parameter::new("Tilt", ParameterType::Htp16, range()),
            ],
        );

        let expected: u16 = profile
            .parameters()
            .iter()
            .map(|parameter| parameter.kind.slot_width())
            .sum();
        assert_eq!(expected, 6);
        assert_eq!(profile.footprint(), expected);
    }

    #[test]
    fn test_offsets_follow_mode_order() {
        let profile = FixtureProfile::new(
            "Spot",
            "Acme",
            "Spot",
            "Standard",
            vec![
                Parameter::new("Intensity", ParameterType::Htp16, range()),
                Parameter::new("Red", ParameterType::Ltp8, range()),
                Parameter::new("Pan", ParameterType::Ltp16, range()),
            ],
        );

        let offsets: Vec<Offset> = profile.parameters().iter().map(|p| p.offset).collect();
        assert_eq!(
            offsets,
            vec![
                Offset {
                    high_byte: 0,
                    low_byte: 1
                },
                Offset {
                    high_byte: 2,
                    low_byte: 2
                },
                Offset {
                    high_byte: 3,
                    low_byte: 4
                },
            ]
        );
    }

    #[test]
    fn test_unsupported_type_takes_no_slots() {
        let profile = FixtureProfile::new(
            "Odd",
            "Acme",
            "Odd",
            "",
            vec![
                Parameter::new("Weird", ParameterType::parse("HTP24"), range()),
                Parameter::new("Intensity", ParameterType::Htp8, range()),
            ],
        );

        assert_eq!(profile.footprint(), 1);
        assert_eq!(profile.parameter("Intensity").unwrap().offset.high_byte, 0);
    }

    #[test]
    fn test_range_clamp() {
        let spec = ValueSpec::Range {
            min: 10,
            max: 200,
            percent: false,
        };
        assert_eq!(spec.clamp(0), 10);
        assert_eq!(spec.clamp(100), 100);
        assert_eq!(spec.clamp(300), 200);
    }

    #[test]
    fn test_table_clamp_snaps_to_nearest_bucket() {
        let spec = ValueSpec::Table(vec![
            TableEntry::new(0, 9, "Open"),
            TableEntry::new(20, 29, "Gobo 1"),
            TableEntry::new(60, 69, "Gobo 2"),
        ]);
        assert_eq!(spec.clamp(5), 5);
        assert_eq!(spec.clamp(12), 9);
        assert_eq!(spec.clamp(18), 20);
        assert_eq!(spec.clamp(250), 69);
        assert_eq!(spec.clamp(25), 25);
        assert_eq!(spec.min(), 0);
        assert_eq!(spec.max(), 69);
    }

    #[test]
    fn test_dimmer() {
        let dimmer = FixtureProfile::dimmer();
        assert_eq!(dimmer.footprint(), 1);
        assert!(dimmer.has_intensity());
        assert_eq!(dimmer.to_string(), "Generic Dimmer");
    }
}
