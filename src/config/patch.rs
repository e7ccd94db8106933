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
use serde::Deserialize;

use super::error::ConfigError;
use crate::patch::Address;

/// A channel patched when the console starts.
#[derive(Deserialize, Clone, Debug)]
pub struct PatchEntry {
    channel: u16,

    /// The address as "<output>.<universe>".
    address: String,

    fixture: FixtureRef,
}

impl PatchEntry {
    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn address(&self) -> Result<Address, ConfigError> {
        self.address
            .parse::<Address>()
            .map_err(|e| ConfigError::Invalid {
                key: "patch.address",
                reason: e.to_string(),
            })
    }

    pub fn fixture(&self) -> &FixtureRef {
        &self.fixture
    }
}

/// Names a profile in the fixture catalog.
#[derive(Deserialize, Clone, Debug)]
pub struct FixtureRef {
    manufacturer: String,
    model: String,
    mode: Option<String>,
}

impl FixtureRef {
    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The mode, empty for single mode fixtures.
    pub fn mode(&self) -> &str {
        self.mode.as_deref().unwrap_or("")
    }
}
