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
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::fixture::{FixtureProfile, Parameter, ParameterGroup, ParameterType, ValueSpec};

/// A parameter covering the full range of its encoding.
pub fn full_range(name: &str, kind: ParameterType, group: ParameterGroup) -> Parameter {
    let max = if kind.is_16bit() { 65535 } else { 255 };
    Parameter::new(
        name,
        kind,
        ValueSpec::Range {
            min: 0,
            max,
            percent: true,
        },
    )
    .with_group(group)
}

/// A three slot fixture: a 16 bit intensity followed by an 8 bit shutter.
pub fn spot() -> Arc<FixtureProfile> {
    Arc::new(FixtureProfile::new(
        "Spot",
        "Acme",
        "Spot",
        "Basic",
        vec![
            full_range("Intensity", ParameterType::Htp16, ParameterGroup::Intensity),
            full_range("Shutter", ParameterType::Ltp8, ParameterGroup::Beam),
        ],
    ))
}

/// An RGB fixture with no intensity of its own.
pub fn rgb() -> Arc<FixtureProfile> {
    Arc::new(FixtureProfile::new(
        "LED Par",
        "Acme",
        "LED Par",
        "3ch",
        vec![
            full_range("Red", ParameterType::Ltp8, ParameterGroup::Color),
            full_range("Green", ParameterType::Ltp8, ParameterGroup::Color),
            full_range("Blue", ParameterType::Ltp8, ParameterGroup::Color),
        ],
    ))
}

pub fn dimmer() -> Arc<FixtureProfile> {
    Arc::new(FixtureProfile::dimmer())
}

/// Writes a small fixture library into the given directory.
pub fn write_catalog(root: &Path) {
    fs::create_dir_all(root.join("Acme")).unwrap();
    fs::write(
        root.join("index.json"),
        r#"{
            "Acme/Spot.json": {
                "manufacturer": "Acme",
                "model_name": "Spot",
                "modes": {"Basic": 3, "Extended": 6}
            },
            "Acme/LED Par.json": {
                "manufacturer": "Acme",
                "model_name": "LED Par",
                "modes": {"3ch": 3}
            },
            "Internal/Scroller.json": {
                "manufacturer": "Internal",
                "model_name": "Scroller",
                "modes": {"1ch": 1}
            }
        }"#,
    )
    .unwrap();
    fs::write(
        root.join("Acme").join("Spot.json"),
        r#"{
            "name": "Spot",
            "manufacturer": "Acme",
            "model_name": "Spot",
            "parameters": {
                "Intensity": {
                    "type": "HTP16",
                    "default": 0,
                    "highlight": 65535,
                    "range": {"Minimum": 0, "Maximum": 65535, "Percent": true}
                },
                "Shutter": {
                    "type": "LTP8",
                    "default": 255,
                    "highlight": 255,
                    "range": {"Minimum": 0, "Maximum": 255, "Percent": false}
                },
                "Pan": {
                    "type": "LTP16",
                    "default": 32768,
                    "highlight": 32768,
                    "range": {"Minimum": 0, "Maximum": 65535, "Percent": false}
                },
                "Gobo": {
                    "type": "LTP8",
                    "default": 0,
                    "highlight": 0,
                    "table": [
                        {"start": 0, "stop": 9, "label": "Open"},
                        [10, 19, "Gobo 1", true],
                        [20, 255, "Spin"]
                    ]
                }
            },
            "modes": [
                {"name": "Basic", "footprint": 3, "parameters": ["Shutter", "Intensity"]},
                {"name": "Extended", "footprint": 6, "parameters": ["Intensity", "Shutter", "Pan", "Gobo"]}
            ]
        }"#,
    )
    .unwrap();
    fs::write(
        root.join("Acme").join("LED Par.json"),
        r#"{
            "name": "LED Par",
            "manufacturer": "Acme",
            "model_name": "LED Par",
            "parameters": {
                "Red": {"type": "LTP8", "default": 0, "highlight": 255,
                        "range": {"Minimum": 0, "Maximum": 255, "Percent": true}},
                "Green": {"type": "LTP8", "default": 0, "highlight": 255,
                          "range": {"Minimum": 0, "Maximum": 255, "Percent": true}},
                "Blue": {"type": "LTP8", "default": 0, "highlight": 255,
                         "range": {"Minimum": 0, "Maximum": 255, "Percent": true}}
            },
            "modes": [
                {"name": "3ch", "footprint": 3, "parameters": ["Red", "Green", "Blue"]}
            ]
        }"#,
    )
    .unwrap();
}
