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
use std::{net::IpAddr, time::Duration};

use serde::Deserialize;

use super::{error::ConfigError, parse_duration};
use crate::dmx::sacn::{DEFAULT_PRIORITY, MAX_PRIORITY, MAX_SOURCE_NAME_LENGTH};

/// Overrides the hostname as the source name when the configuration has none.
const SOURCE_NAME_ENV: &str = "NINO_SOURCE_NAME";
const FALLBACK_SOURCE_NAME: &str = "nino";

pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(1);
pub const DEFAULT_OLA_PORT: u16 = 9010;
pub const DEFAULT_QUEUE_SIZE: usize = 64;

/// Which transport puts frames on the wire.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sacn,
    Ola,
}

/// A YAML representation of the DMX output.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Output {
    /// The transport to use. Defaults to sACN.
    backend: Option<Backend>,

    /// The sACN source name.
    source_name: Option<String>,

    /// The sACN priority, 0-200.
    priority: Option<u8>,

    /// Unicast destination. sACN is multicast when this is absent.
    destination: Option<String>,

    /// How long a universe may go without a frame before it's resent.
    keepalive: Option<String>,

    /// The port olad listens on.
    ola_port: Option<u16>,
}

impl Output {
    pub fn backend(&self) -> Backend {
        self.backend.unwrap_or_default()
    }

    /// The name announced in every sACN packet. Taken from the configuration, then
    /// NINO_SOURCE_NAME, then the hostname. Blank values are skipped and the result
    /// is cut to what fits in a packet without splitting a character.
    pub fn source_name(&self) -> String {
        let name = self
            .source_name
            .clone()
            .into_iter()
            .chain(std::env::var(SOURCE_NAME_ENV).ok())
            .chain(hostname::get().ok().and_then(|h| h.into_string().ok()))
            .map(|name| name.trim().to_string())
            .find(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_SOURCE_NAME.to_string());
        truncate_at_char_boundary(name, MAX_SOURCE_NAME_LENGTH)
    }

    pub fn priority(&self) -> u8 {
        self.priority.unwrap_or(DEFAULT_PRIORITY).min(MAX_PRIORITY)
    }

    pub fn destination(&self) -> Result<Option<IpAddr>, ConfigError> {
        self.destination
            .as_ref()
            .map(|destination| {
                destination.parse::<IpAddr>().map_err(|e| ConfigError::Invalid {
                    key: "output.destination",
                    reason: format!("{}: {}", destination, e),
                })
            })
            .transpose()
    }

    pub fn keepalive(&self) -> Result<Duration, ConfigError> {
        parse_duration("output.keepalive", self.keepalive.as_ref(), DEFAULT_KEEPALIVE)
    }

    pub fn ola_port(&self) -> u16 {
        self.ola_port.unwrap_or(DEFAULT_OLA_PORT)
    }
}

fn truncate_at_char_boundary(mut name: String, max_length: usize) -> String {
    if name.len() > max_length {
        let end = (0..=max_length)
            .rev()
            .find(|index| name.is_char_boundary(*index))
            .unwrap_or(0);
        name.truncate(end);
    }
    name
}

/// A YAML representation of the sACN input.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Input {
    /// Listen for other sources. Defaults to true.
    enabled: Option<bool>,

    /// How many inbound frames may wait for the next tick.
    queue_size: Option<usize>,
}

impl Input {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size.unwrap_or(DEFAULT_QUEUE_SIZE).max(1)
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn output(source_name: Option<&str>) -> Output {
        Output {
            source_name: source_name.map(str::to_string),
            ..Default::default()
        }
    }

    /// Runs a check with NINO_SOURCE_NAME set (or unset), restoring it afterwards.
    fn with_env(value: Option<&str>, check: impl FnOnce()) {
        let original = std::env::var(SOURCE_NAME_ENV).ok();
        match value {
            Some(value) => std::env::set_var(SOURCE_NAME_ENV, value),
            None => std::env::remove_var(SOURCE_NAME_ENV),
        }
        check();
        match original {
            Some(value) => std::env::set_var(SOURCE_NAME_ENV, value),
            None => std::env::remove_var(SOURCE_NAME_ENV),
        }
    }

    #[test]
    #[serial]
    fn test_configured_name_wins() {
        with_env(Some("Env Desk"), || {
            assert_eq!(output(Some("  FOH  ")).source_name(), "FOH");
        });
    }

    #[test]
    #[serial]
    fn test_env_name_when_unconfigured() {
        with_env(Some("Env Desk"), || {
            assert_eq!(output(None).source_name(), "Env Desk");
            assert_eq!(output(Some("   ")).source_name(), "Env Desk");
        });
    }

    #[test]
    #[serial]
    fn test_blank_env_falls_back() {
        with_env(Some(" "), || {
            let name = output(None).source_name();
            assert!(!name.trim().is_empty());
            assert!(name.len() <= MAX_SOURCE_NAME_LENGTH);
        });
    }

    #[test]
    #[serial]
    fn test_long_name_truncated() {
        with_env(None, || {
            let long = "x".repeat(100);
            assert_eq!(output(Some(&long)).source_name(), "x".repeat(63));

            // 31 two byte characters fill 62 bytes; the 32nd would end at byte 64.
            let wide = "é".repeat(40);
            let name = output(Some(&wide)).source_name();
            assert_eq!(name, "é".repeat(31));
            assert_eq!(name.len(), 62);
        });
    }
}
