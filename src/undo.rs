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
use std::collections::VecDeque;

use thiserror::Error;
use tracing::debug;

/// Something whose whole state can be captured and put back. Undo restores the
/// snapshot taken before a command ran rather than reversing the command.
pub trait Undoable {
    type Snapshot;
    type Error;

    /// Captures the current state.
    fn copy(&self) -> Self::Snapshot;

    /// Replaces the current state with a snapshot.
    fn restore(&mut self, snapshot: Self::Snapshot);

    /// Called after an undo has restored state.
    fn undone(&mut self) {}

    /// Called after a redo has run its command again.
    fn redone(&mut self) {}
}

/// A mutation that can be recorded in the undo history. Commands must be all or
/// nothing: a command that fails leaves its target unchanged.
pub trait Command<T: Undoable> {
    fn execute(&mut self, target: &mut T) -> Result<(), T::Error>;

    /// A short description for display.
    fn name(&self) -> String;
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UndoError<E> {
    #[error("nothing to undo")]
    EmptyUndoStack,

    #[error("nothing to redo")]
    EmptyRedoStack,

    #[error("{0}")]
    Command(E),
}

struct Entry<T: Undoable> {
    command: Box<dyn Command<T>>,
    before: T::Snapshot,
}

/// Two stack undo history with a cap on how many steps are kept.
pub struct UndoManager<T: Undoable> {
    undo_stack: VecDeque<Entry<T>>,
    redo_stack: Vec<Box<dyn Command<T>>>,
    max_history: usize,
}

impl<T: Undoable> UndoManager<T> {
    pub fn new(max_history: usize) -> UndoManager<T> {
        UndoManager {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    /// Runs a command and records it. A command that fails is not recorded and leaves
    /// the redo history alone.
    pub fn execute(
        &mut self,
        target: &mut T,
        mut command: Box<dyn Command<T>>,
    ) -> Result<(), UndoError<T::Error>> {
        let before = target.copy();
        command.execute(target).map_err(UndoError::Command)?;

        debug!(command = command.name(), "Executed");
        self.redo_stack.clear();
        self.push(Entry { command, before });
        Ok(())
    }

    /// Restores the state from before the most recent command.
    pub fn undo(&mut self, target: &mut T) -> Result<(), UndoError<T::Error>> {
        let entry = self.undo_stack.pop_back().ok_or(UndoError::EmptyUndoStack)?;

        target.restore(entry.before);
        target.undone();

        debug!(command = entry.command.name(), "Undone");
        self.redo_stack.push(entry.command);
        Ok(())
    }

    /// Runs the most recently undone command again.
    pub fn redo(&mut self, target: &mut T) -> Result<(), UndoError<T::Error>> {
        let mut command = self.redo_stack.pop().ok_or(UndoError::EmptyRedoStack)?;

        let before = target.copy();
        if let Err(err) = command.execute(target) {
            self.redo_stack.push(command);
            return Err(UndoError::Command(err));
        }
        target.redone();

        debug!(command = command.name(), "Redone");
        self.push(Entry { command, before });
        Ok(())
    }

    fn push(&mut self, entry: Entry<T>) {
        while self.undo_stack.len() >= self.max_history {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(entry);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Describes the command the next undo would revert.
    pub fn undo_name(&self) -> Option<String> {
        self.undo_stack.back().map(|entry| entry.command.name())
    }

    pub fn redo_name(&self) -> Option<String> {
        self.redo_stack.last().map(|command| command.name())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: i32,
        undone: usize,
        redone: usize,
    }

    impl Undoable for Counter {
        type Snapshot = i32;
        type Error = String;

        fn copy(&self) -> i32 {
            self.value
        }

        fn restore(&mut self, snapshot: i32) {
            self.value = snapshot;
        }

        fn undone(&mut self) {
            self.undone += 1;
        }

        fn redone(&mut self) {
            self.redone += 1;
        }
    }

    struct Add(i32);

    impl Command<Counter> for Add {
        fn execute(&mut self, target: &mut Counter) -> Result<(), String> {
            if target.value + self.0 < 0 {
                return Err("negative".to_string());
            }
            target.value += self.0;
            Ok(())
        }

        fn name(&self) -> String {
            format!("Add {}", self.0)
        }
    }

    #[test]
    fn test_undo_redo() {
        let mut counter = Counter::default();
        let mut manager = UndoManager::new(10);

        manager.execute(&mut counter, Box::new(Add(5))).unwrap();
        manager.execute(&mut counter, Box::new(Add(3))).unwrap();
        assert_eq!(counter.value, 8);
        assert_eq!(manager.undo_name(), Some("Add 3".to_string()));

        manager.undo(&mut counter).unwrap();
        assert_eq!(counter.value, 5);
        assert_eq!(counter.undone, 1);
        assert_eq!(manager.redo_name(), Some("Add 3".to_string()));

        manager.redo(&mut counter).unwrap();
        assert_eq!(counter.value, 8);
        assert_eq!(counter.redone, 1);
        assert!(!manager.can_redo());

        manager.undo(&mut counter).unwrap();
        manager.undo(&mut counter).unwrap();
        assert_eq!(counter.value, 0);
        assert!(!manager.can_undo());
        assert_eq!(manager.redo_count(), 2);
    }

    #[test]
    fn test_empty_stacks() {
        let mut counter = Counter::default();
        let mut manager: UndoManager<Counter> = UndoManager::new(10);

        assert_eq!(manager.undo(&mut counter), Err(UndoError::EmptyUndoStack));
        assert_eq!(manager.redo(&mut counter), Err(UndoError::EmptyRedoStack));
        assert_eq!(counter.undone, 0);
        assert_eq!(counter.value, 0);
    }

    #[test]
    fn test_new_command_clears_redo() {
        let mut counter = Counter::default();
        let mut manager = UndoManager::new(10);

        manager.execute(&mut counter, Box::new(Add(1))).unwrap();
        manager.undo(&mut counter).unwrap();
        assert!(manager.can_redo());

        manager.execute(&mut counter, Box::new(Add(2))).unwrap();
        assert!(!manager.can_redo());
        assert_eq!(counter.value, 2);
    }

    #[test]
    fn test_failed_command_not_recorded() {
        let mut counter = Counter::default();
        let mut manager = UndoManager::new(10);

        manager.execute(&mut counter, Box::new(Add(1))).unwrap();
        manager.undo(&mut counter).unwrap();

        assert_eq!(
            manager.execute(&mut counter, Box::new(Add(-5))),
            Err(UndoError::Command("negative".to_string()))
        );
        assert_eq!(manager.undo_count(), 0);
        assert!(manager.can_redo());
    }

    #[test]
    fn test_history_limit() {
        let mut counter = Counter::default();
        let mut manager = UndoManager::new(3);

        for _ in 0..5 {
            manager.execute(&mut counter, Box::new(Add(1))).unwrap();
        }
        assert_eq!(manager.undo_count(), 3);

        while manager.can_undo() {
            manager.undo(&mut counter).unwrap();
        }
        assert_eq!(counter.value, 2);
    }
}
