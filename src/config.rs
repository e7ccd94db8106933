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
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use crate::{dmx::sacn::MAX_UNIVERSE, DEFAULT_UNIVERSES};

mod error;
mod output;
mod patch;

pub use error::ConfigError;
pub use output::{Backend, Input, Output};
pub use patch::{FixtureRef, PatchEntry};

pub const DEFAULT_UNDO_LIMIT: usize = 100;
pub const DEFAULT_TICK: Duration = Duration::from_millis(25);

/// A YAML representation of the console configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Console {
    /// The fixture catalog directory.
    fixtures: PathBuf,

    /// The universes the console drives.
    universes: Option<Vec<u16>>,

    /// How many undo steps are kept.
    undo_limit: Option<usize>,

    /// How often inbound frames are drained.
    tick: Option<String>,

    output: Option<Output>,

    input: Option<Input>,

    /// Channels patched at startup.
    patch: Option<Vec<PatchEntry>>,

    /// The directory relative paths are resolved against.
    #[serde(skip)]
    base_path: Option<PathBuf>,
}

impl Console {
    /// Parses a console configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Console, ConfigError> {
        let mut console = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Console>()?;
        console.base_path = path.parent().map(Path::to_path_buf);
        console.validate()?;
        Ok(console)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let universes = self.universes();
        if universes.is_empty() {
            return Err(ConfigError::Invalid {
                key: "universes",
                reason: "at least one universe is required".to_string(),
            });
        }
        if let Some(universe) = universes
            .iter()
            .find(|universe| **universe == 0 || **universe > MAX_UNIVERSE)
        {
            return Err(ConfigError::Invalid {
                key: "universes",
                reason: format!("{} is outside of 1-{}", universe, MAX_UNIVERSE),
            });
        }
        self.tick()?;
        self.output().keepalive()?;
        self.output().destination()?;
        for entry in self.patch() {
            entry.address()?;
        }
        Ok(())
    }

    /// The fixture catalog directory, resolved against the configuration file.
    pub fn fixtures(&self) -> PathBuf {
        match &self.base_path {
            Some(base_path) if self.fixtures.is_relative() => base_path.join(&self.fixtures),
            _ => self.fixtures.clone(),
        }
    }

    /// The universes the console drives, ascending and without repeats.
    pub fn universes(&self) -> Vec<u16> {
        let mut universes = self
            .universes
            .clone()
            .unwrap_or_else(|| DEFAULT_UNIVERSES.to_vec());
        universes.sort_unstable();
        universes.dedup();
        universes
    }

    pub fn undo_limit(&self) -> usize {
        self.undo_limit.unwrap_or(DEFAULT_UNDO_LIMIT)
    }

    pub fn tick(&self) -> Result<Duration, ConfigError> {
        parse_duration("tick", self.tick.as_ref(), DEFAULT_TICK)
    }

    pub fn output(&self) -> Output {
        self.output.clone().unwrap_or_default()
    }

    pub fn input(&self) -> Input {
        self.input.clone().unwrap_or_default()
    }

    pub fn patch(&self) -> &[PatchEntry] {
        self.patch.as_deref().unwrap_or(&[])
    }
}

/// Parses an optional duration string, falling back to a default.
fn parse_duration(
    key: &'static str,
    value: Option<&String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    value.map_or(Ok(default), |duration| {
        DurationString::from_string(duration.clone())
            .map(Duration::from)
            .map_err(|e| ConfigError::Duration {
                key,
                value: duration.clone(),
                reason: e.to_string(),
            })
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, net::IpAddr};

    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Console {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize::<Console>()
            .unwrap()
    }

    #[test]
    fn test_full_config() {
        let console = parse(
            r#"
            fixtures: /opt/fixtures
            universes: [3, 1, 3]
            undo_limit: 20
            tick: 10ms
            output:
              backend: ola
              source_name: FOH
              priority: 250
              destination: 10.0.0.5
              keepalive: 2s
              ola_port: 9100
            input:
              enabled: false
              queue_size: 8
            patch:
              - channel: 1
                address: "1.1"
                fixture:
                  manufacturer: Generic
                  model: Dimmer
              - channel: 2
                address: "10.3"
                fixture:
                  manufacturer: Acme
                  model: Spot
                  mode: Basic
            "#,
        );

        assert!(console.validate().is_ok());
        assert_eq!(console.fixtures(), PathBuf::from("/opt/fixtures"));
        assert_eq!(console.universes(), vec![1, 3]);
        assert_eq!(console.undo_limit(), 20);
        assert_eq!(console.tick().unwrap(), Duration::from_millis(10));

        let output = console.output();
        assert_eq!(output.backend(), Backend::Ola);
        assert_eq!(output.source_name(), "FOH");
        assert_eq!(output.priority(), 200);
        assert_eq!(
            output.destination().unwrap(),
            Some("10.0.0.5".parse::<IpAddr>().unwrap())
        );
        assert_eq!(output.keepalive().unwrap(), Duration::from_secs(2));
        assert_eq!(output.ola_port(), 9100);

        let input = console.input();
        assert!(!input.enabled());
        assert_eq!(input.queue_size(), 8);

        let patch = console.patch();
        assert_eq!(patch.len(), 2);
        assert_eq!(patch[0].channel(), 1);
        assert_eq!(patch[0].fixture().mode(), "");
        assert_eq!(patch[1].address().unwrap().to_string(), "10.3");
        assert_eq!(patch[1].fixture().model(), "Spot");
        assert_eq!(patch[1].fixture().mode(), "Basic");
    }

    #[test]
    fn test_defaults() {
        let console = parse("fixtures: fixtures");

        assert!(console.validate().is_ok());
        assert_eq!(console.universes(), DEFAULT_UNIVERSES.to_vec());
        assert_eq!(console.undo_limit(), DEFAULT_UNDO_LIMIT);
        assert_eq!(console.tick().unwrap(), DEFAULT_TICK);
        assert_eq!(console.output().backend(), Backend::Sacn);
        assert_eq!(console.output().priority(), 100);
        assert_eq!(console.output().destination().unwrap(), None);
        assert_eq!(console.output().keepalive().unwrap(), Duration::from_secs(1));
        assert!(console.input().enabled());
        assert_eq!(console.input().queue_size(), 64);
        assert!(console.patch().is_empty());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            parse("fixtures: f\ntick: soon").validate(),
            Err(ConfigError::Duration { key: "tick", .. })
        ));
        assert!(matches!(
            parse("fixtures: f\nuniverses: [0]").validate(),
            Err(ConfigError::Invalid { key: "universes", .. })
        ));
        assert!(matches!(
            parse("fixtures: f\nuniverses: [1, 64000]").validate(),
            Err(ConfigError::Invalid { key: "universes", .. })
        ));
        assert!(matches!(
            parse("fixtures: f\noutput:\n  destination: nowhere").validate(),
            Err(ConfigError::Invalid {
                key: "output.destination",
                ..
            })
        ));
    }

    #[test]
    fn test_relative_fixtures_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.yaml");
        fs::write(&path, "fixtures: library\nuniverses: [1]\n").unwrap();

        let console = Console::deserialize(&path).unwrap();
        assert_eq!(console.fixtures(), dir.path().join("library"));
        assert_eq!(console.universes(), vec![1]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Console::deserialize(&dir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
    }
}
