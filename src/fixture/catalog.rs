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
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{FixtureProfile, Parameter, ParameterGroup, ParameterType, TableEntry, ValueSpec};

/// The name of the index file inside a catalog directory.
pub const INDEX_FILE: &str = "index.json";

/// The name of the optional parameter group file inside a catalog directory.
/// Its entries are layered over the built-in groups.
pub const GROUPS_FILE: &str = "groups.json";

/// Manufacturers that are loadable but not offered in listings.
const HIDDEN_MANUFACTURERS: [&str; 2] = ["Internal", "Scrollers"];

/// Parameter groups used when the catalog doesn't ship its own map.
const DEFAULT_GROUPS: &[(&str, ParameterGroup)] = &[
    ("Intensity", ParameterGroup::Intensity),
    ("Dimmer", ParameterGroup::Intensity),
    ("Pan", ParameterGroup::Focus),
    ("Tilt", ParameterGroup::Focus),
    ("Pan Tilt Speed", ParameterGroup::Focus),
    ("Red", ParameterGroup::Color),
    ("Green", ParameterGroup::Color),
    ("Blue", ParameterGroup::Color),
    ("White", ParameterGroup::Color),
    ("Amber", ParameterGroup::Color),
    ("UV", ParameterGroup::Color),
    ("Lime", ParameterGroup::Color),
    ("Cyan", ParameterGroup::Color),
    ("Magenta", ParameterGroup::Color),
    ("Yellow", ParameterGroup::Color),
    ("CTO", ParameterGroup::Color),
    ("Hue", ParameterGroup::Color),
    ("Saturation", ParameterGroup::Color),
    ("Color Wheel", ParameterGroup::Color),
    ("Color Temperature", ParameterGroup::Color),
    ("Shutter", ParameterGroup::Beam),
    ("Strobe", ParameterGroup::Beam),
    ("Zoom", ParameterGroup::Beam),
    ("Focus", ParameterGroup::Beam),
    ("Iris", ParameterGroup::Beam),
    ("Frost", ParameterGroup::Beam),
    ("Prism", ParameterGroup::Beam),
    ("Gobo", ParameterGroup::Beam),
    ("Gobo Rotation", ParameterGroup::Beam),
    ("Effect", ParameterGroup::Effect),
    ("Effect Speed", ParameterGroup::Effect),
    ("Macro", ParameterGroup::Effect),
    ("Control", ParameterGroup::Control),
    ("Reset", ParameterGroup::Control),
    ("Lamp", ParameterGroup::Control),
];

/// Errors raised while reading fixture data.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("No fixture profile for {manufacturer} {model} mode '{mode}'")]
    ProfileNotFound {
        manufacturer: String,
        model: String,
        mode: String,
    },

    #[error("Mode '{mode}' is listed in the index but missing from {}", .path.display())]
    ModeNotFound { path: PathBuf, mode: String },

    #[error("Invalid parameter '{parameter}' in {}: {reason}", .path.display())]
    InvalidParameter {
        path: PathBuf,
        parameter: String,
        reason: String,
    },

    #[error("Unable to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A loadable fixture mode as listed by the index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CatalogEntry {
    pub manufacturer: String,
    pub model_name: String,
    pub mode: String,
    pub footprint: u16,
    pub file: String,
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, {} slots)",
            self.manufacturer, self.model_name, self.mode, self.footprint
        )
    }
}

/// A JSON representation of an index entry.
#[derive(Deserialize, Clone)]
struct IndexEntry {
    manufacturer: String,
    model_name: String,
    #[serde(default)]
    modes: BTreeMap<String, u16>,
}

/// A JSON representation of a fixture file.
#[derive(Deserialize)]
struct ProfileFile {
    #[serde(default)]
    name: String,
    manufacturer: String,
    model_name: String,
    parameters: HashMap<String, RawParameter>,
    modes: Vec<RawMode>,
}

#[derive(Deserialize)]
struct RawMode {
    name: String,
    footprint: Option<u16>,
    parameters: Vec<String>,
}

#[derive(Deserialize)]
struct RawParameter {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    default: u32,
    #[serde(default, alias = "highligt")]
    highlight: Option<u32>,
    range: Option<RawRange>,
    table: Option<Vec<RawTableEntry>>,
}

#[derive(Deserialize)]
struct RawRange {
    #[serde(rename = "Minimum", alias = "minimum", alias = "min")]
    min: u32,
    #[serde(rename = "Maximum", alias = "maximum", alias = "max")]
    max: u32,
    #[serde(default, rename = "Percent", alias = "percent")]
    percent: bool,
}

/// Table rows come either as objects or as the arrays written by the ASCII importer.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTableEntry {
    Object {
        start: u32,
        stop: u32,
        #[serde(default)]
        label: String,
    },
    Imported(u32, u32, String, bool),
    Plain(u32, u32, String),
}

impl From<RawTableEntry> for TableEntry {
    fn from(raw: RawTableEntry) -> TableEntry {
        match raw {
            RawTableEntry::Object { start, stop, label } => TableEntry::new(start, stop, &label),
            RawTableEntry::Imported(start, stop, label, _) => TableEntry::new(start, stop, &label),
            RawTableEntry::Plain(start, stop, label) => TableEntry::new(start, stop, &label),
        }
    }
}

/// The fixture library: an index of profile files plus the parameter group map.
pub struct Catalog {
    root: PathBuf,
    index: BTreeMap<String, IndexEntry>,
    groups: HashMap<String, ParameterGroup>,
    cache: HashMap<(String, String, String), Arc<FixtureProfile>>,
}

impl Catalog {
    /// A catalog with no library. Only the built-in dimmer is available.
    pub fn empty() -> Catalog {
        Catalog {
            root: PathBuf::new(),
            index: BTreeMap::new(),
            groups: default_groups(),
            cache: HashMap::new(),
        }
    }

    /// Loads the index (and parameter groups, if present) from the given directory.
    pub fn load(root: &Path) -> Result<Catalog, CatalogError> {
        info!(path = root.display().to_string(), "Loading fixture catalog");

        let index_path = root.join(INDEX_FILE);
        let index: BTreeMap<String, IndexEntry> = read_json(&index_path)?;

        let mut groups = default_groups();
        let groups_path = root.join(GROUPS_FILE);
        if groups_path.exists() {
            let custom: HashMap<String, ParameterGroup> = read_json(&groups_path)?;
            debug!(count = custom.len(), "Loaded parameter group overrides");
            groups.extend(custom);
        } else {
            debug!("No parameter group file, using defaults");
        }

        info!(files = index.len(), "Fixture catalog loaded");

        Ok(Catalog {
            root: root.to_path_buf(),
            index,
            groups,
            cache: HashMap::new(),
        })
    }

    /// Lists every visible fixture mode, sorted by manufacturer, model and mode.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<CatalogEntry> = self
            .index
            .iter()
            .filter(|(_, entry)| !HIDDEN_MANUFACTURERS.contains(&entry.manufacturer.as_str()))
            .flat_map(|(file, entry)| {
                entry.modes.iter().map(move |(mode, footprint)| CatalogEntry {
                    manufacturer: entry.manufacturer.clone(),
                    model_name: entry.model_name.clone(),
                    mode: mode.clone(),
                    footprint: *footprint,
                    file: file.clone(),
                })
            })
            .collect();
        entries.sort();
        entries
    }

    /// Gets the functional group of a parameter. Parts of multi-part fixtures
    /// ("Red PART 2") share the group of the base parameter.
    pub fn group_of(&self, parameter: &str) -> ParameterGroup {
        if let Some(group) = self.groups.get(parameter) {
            return *group;
        }
        parameter
            .split_once(" PART ")
            .and_then(|(base, _)| self.groups.get(base))
            .copied()
            .unwrap_or(ParameterGroup::Control)
    }

    /// Resolves a manufacturer/model/mode triple to a profile.
    pub fn load_profile(
        &mut self,
        manufacturer: &str,
        model: &str,
        mode: &str,
    ) -> Result<Arc<FixtureProfile>, CatalogError> {
        let key = (
            manufacturer.to_string(),
            model.to_string(),
            mode.to_string(),
        );
        if let Some(profile) = self.cache.get(&key) {
            return Ok(profile.clone());
        }

        let file = self.index.iter().find_map(|(file, entry)| {
            (entry.manufacturer == manufacturer
                && entry.model_name == model
                && entry.modes.contains_key(mode))
            .then(|| file.clone())
        });

        let profile = match file {
            Some(file) => Arc::new(self.read_profile(&self.root.join(file), mode)?),
            None => {
                let dimmer = FixtureProfile::dimmer();
                if dimmer.manufacturer() == manufacturer
                    && dimmer.model_name() == model
                    && dimmer.mode_name() == mode
                {
                    Arc::new(dimmer)
                } else {
                    return Err(CatalogError::ProfileNotFound {
                        manufacturer: manufacturer.to_string(),
                        model: model.to_string(),
                        mode: mode.to_string(),
                    });
                }
            }
        };

        info!(profile = profile.to_string(), "Loaded fixture profile");
        self.cache.insert(key, profile.clone());
        Ok(profile)
    }

    /// Reads one mode of a fixture file.
    fn read_profile(&self, path: &Path, mode: &str) -> Result<FixtureProfile, CatalogError> {
        let mut file: ProfileFile = read_json(path)?;
        let raw_mode = file
            .modes
            .iter()
            .find(|raw_mode| raw_mode.name == mode)
            .ok_or_else(|| CatalogError::ModeNotFound {
                path: path.to_path_buf(),
                mode: mode.to_string(),
            })?;

        let mut parameters = Vec::with_capacity(raw_mode.parameters.len());
        for name in raw_mode.parameters.iter() {
            let raw = file
                .parameters
                .remove(name)
                .ok_or_else(|| CatalogError::InvalidParameter {
                    path: path.to_path_buf(),
                    parameter: name.clone(),
                    reason: "listed in the mode but not defined".to_string(),
                })?;
            parameters.push(self.to_parameter(path, name, raw)?);
        }

        let name = if file.name.is_empty() {
            file.model_name.clone()
        } else {
            file.name.clone()
        };
        let profile = FixtureProfile::new(
            &name,
            &file.manufacturer,
            &file.model_name,
            &raw_mode.name,
            parameters,
        );

        if let Some(declared) = raw_mode.footprint {
            if declared != profile.footprint() {
                warn!(
                    path = path.display().to_string(),
                    declared,
                    computed = profile.footprint(),
                    "Declared footprint does not match the mode's parameters"
                );
            }
        }

        Ok(profile)
    }

    fn to_parameter(
        &self,
        path: &Path,
        name: &str,
        raw: RawParameter,
    ) -> Result<Parameter, CatalogError> {
        let kind = ParameterType::parse(&raw.kind);
        let invalid = |reason: &str| CatalogError::InvalidParameter {
            path: path.to_path_buf(),
            parameter: name.to_string(),
            reason: reason.to_string(),
        };

        let values = match (raw.range, raw.table) {
            (Some(range), None) => ValueSpec::Range {
                min: range.min,
                max: range.max,
                percent: range.percent,
            },
            (None, Some(table)) => {
                ValueSpec::Table(table.into_iter().map(TableEntry::from).collect())
            }
            (Some(_), Some(_)) => return Err(invalid("has both a range and a table")),
            (None, None) if kind == ParameterType::Virtual => ValueSpec::Range {
                min: 0,
                max: 255,
                percent: true,
            },
            (None, None) => return Err(invalid("has neither a range nor a table")),
        };

        let mut parameter = Parameter::new(name, kind, values)
            .with_group(self.group_of(name))
            .with_default(raw.default);
        if let Some(highlight) = raw.highlight {
            parameter = parameter.with_highlight(highlight);
        }
        Ok(parameter)
    }
}

fn default_groups() -> HashMap<String, ParameterGroup> {
    DEFAULT_GROUPS
        .iter()
        .map(|(name, group)| (name.to_string(), *group))
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
