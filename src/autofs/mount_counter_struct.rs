// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use parking_lot::{Condvar, Mutex};

// From standard library

// From this library

/// Number of active automounts, shared between the mount/unmount paths and the expire
/// driver.
///
/// The expire driver parks on the condition variable while the count is zero; the first
/// increment wakes it.
#[derive(Debug, Default)]
pub struct MountCounter {
    count: Mutex<usize>,
    wakeup: Condvar,
}

impl MountCounter {
    /// Creates a counter at zero.
    pub fn new() -> MountCounter {
        Self::default()
    }

    /// Records one more active mount and wakes the expire driver.
    pub fn increment(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.wakeup.notify_all();

        log::debug!("mounted count is {}", *count);
    }

    /// Records one mount gone.
    pub fn decrement(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);

        log::debug!("mounted count is {}", *count);
    }

    /// Returns the current number of active mounts.
    pub fn current(&self) -> usize {
        *self.count.lock()
    }

    /// Blocks until at least one mount is active.
    pub fn wait_until_active(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.wakeup.wait(&mut count);
        }
    }
}

#[cfg(test)]
#[allow(unused_imports)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};
    use std::sync::Arc;

    #[test]
    fn mount_counter_counts_up_and_down() {
        let counter = MountCounter::new();
        counter.increment();
        counter.increment();
        counter.decrement();

        let actual = counter.current();
        let expected = 1;
        assert_eq!(actual, expected);
    }

    #[test]
    fn mount_counter_never_goes_negative() {
        let counter = MountCounter::new();
        counter.decrement();

        let actual = counter.current();
        let expected = 0;
        assert_eq!(actual, expected);
    }

    #[test]
    fn mount_counter_wakes_a_parked_waiter() {
        let counter = Arc::new(MountCounter::new());

        let waiter = {
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                counter.wait_until_active();
                counter.current()
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(50));
        counter.increment();

        let observed = waiter.join().unwrap();
        assert!(observed >= 1);
    }
}
