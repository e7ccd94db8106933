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
use std::fmt;

/// A DMX universe is 512 channels.
pub const UNIVERSE_SIZE: usize = 512;

/// The levels of a single DMX universe.
#[derive(Clone, PartialEq, Eq)]
pub struct Universe {
    /// The universe number on the wire.
    id: u16,
    /// One level per slot, slot 1 at index 0.
    levels: [u8; UNIVERSE_SIZE],
}

impl Universe {
    /// Creates a new, dark universe.
    pub fn new(id: u16) -> Universe {
        Universe {
            id,
            levels: [0; UNIVERSE_SIZE],
        }
    }

    /// Gets the universe number.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Gets every level in slot order.
    pub fn levels(&self) -> &[u8; UNIVERSE_SIZE] {
        &self.levels
    }

    /// Gets the level at a zero based index.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.levels.get(index).copied()
    }

    /// Sets the level at a zero based index. Returns false if the index is outside
    /// of the universe.
    pub fn set(&mut self, index: usize, value: u8) -> bool {
        match self.levels.get_mut(index) {
            Some(level) => {
                *level = value;
                true
            }
            None => false,
        }
    }

    /// Blacks out the universe.
    pub fn clear(&mut self) {
        self.levels = [0; UNIVERSE_SIZE];
    }
}

impl fmt::Debug for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.levels.iter().filter(|level| **level > 0).count();
        f.debug_struct("Universe")
            .field("id", &self.id)
            .field("active_slots", &active)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut universe = Universe::new(1);

        assert!(universe.set(0, 50));
        assert!(universe.set(511, 200));
        assert_eq!(universe.get(0), Some(50));
        assert_eq!(universe.get(511), Some(200));
        assert_eq!([50u8, 0u8], universe.levels()[0..2]);
    }

    #[test]
    fn test_out_of_range() {
        let mut universe = Universe::new(1);

        assert!(!universe.set(512, 10));
        assert_eq!(universe.get(512), None);
        assert!(universe.levels().iter().all(|level| *level == 0));
    }

    #[test]
    fn test_clear() {
        let mut universe = Universe::new(3);
        universe.set(10, 255);
        universe.clear();

        assert_eq!(universe.id(), 3);
        assert_eq!(universe.get(10), Some(0));
    }
}
