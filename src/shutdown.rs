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
use std::{sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

/// A shutdown handle is shared between the console loop and its worker threads. Each
/// holder is responsible for checking it and winding down once it's tripped.
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    /// Set to true once shutdown has been requested.
    requested: Arc<Mutex<bool>>,
    /// Wakes anyone waiting on the handle.
    condvar: Arc<Condvar>,
}

impl ShutdownHandle {
    pub fn new() -> ShutdownHandle {
        ShutdownHandle::default()
    }

    /// Returns true if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.requested.lock()
    }

    /// Requests shutdown and wakes every waiter. Repeated calls are harmless.
    pub fn shutdown(&self) {
        let mut requested = self.requested.lock();
        if !*requested {
            *requested = true;
            self.condvar.notify_all();
        }
    }

    /// Sleeps for up to the timeout. Returns true if shutdown was requested before or
    /// during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut requested = self.requested.lock();
        if !*requested {
            let _ = self.condvar.wait_for(&mut requested, timeout);
        }
        *requested
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_shutdown_wakes_waiter() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_shutdown());

        let join = {
            let handle = handle.clone();
            thread::spawn(move || handle.wait_timeout(Duration::from_secs(30)))
        };

        handle.shutdown();
        assert!(join.join().unwrap());
        assert!(handle.is_shutdown());
    }

    #[test]
    fn test_wait_times_out() {
        let handle = ShutdownHandle::new();
        assert!(!handle.wait_timeout(Duration::from_millis(5)));

        handle.shutdown();
        handle.shutdown();
        assert!(handle.wait_timeout(Duration::from_secs(30)));
    }
}
