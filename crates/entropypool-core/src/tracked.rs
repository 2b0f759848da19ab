//! Instrumented counters and values.
//!
//! Every mutable field of the pool that matters for auditing is wrapped in
//! one of these: the value travels together with how often it was modified
//! and when (milliseconds since the Unix epoch). Both are persisted and both
//! are fed to the rehash step.

use std::time::{SystemTime, UNIX_EPOCH};

/// Modification counts are persisted as signed 32-bit integers.
pub const MAX_COUNT: u32 = i32::MAX as u32;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// A bare event counter with the time of the last event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackedCount {
    count: u32,
    count_date: i64,
}

impl TrackedCount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a counter from stored fields.
    pub fn from_parts(count: u32, count_date: i64) -> Self {
        Self {
            count: count.min(MAX_COUNT),
            count_date,
        }
    }

    /// Record one event. Saturates at [`MAX_COUNT`].
    pub fn count(&mut self) {
        self.count = self.count.saturating_add(1).min(MAX_COUNT);
        self.count_date = now_millis();
    }

    pub fn get(&self) -> u32 {
        self.count
    }

    pub fn count_date(&self) -> i64 {
        self.count_date
    }
}

/// A value bundled with its modification count and last modification date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracked<T> {
    value: T,
    modify_count: u32,
    modify_date: i64,
}

impl<T> Tracked<T> {
    /// Wrap an initial value. Construction is not counted as a modification.
    pub fn new(value: T) -> Self {
        Self {
            value,
            modify_count: 0,
            modify_date: 0,
        }
    }

    pub fn from_parts(value: T, modify_count: u32, modify_date: i64) -> Self {
        Self {
            value,
            modify_count: modify_count.min(MAX_COUNT),
            modify_date,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Use the value in place without counting a modification.
    pub(crate) fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Replace the value and log the modification.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.log();
    }

    /// Update the value in place and log the modification.
    pub fn modify(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        self.log();
    }

    pub fn modify_count(&self) -> u32 {
        self.modify_count
    }

    pub fn modify_date(&self) -> i64 {
        self.modify_date
    }

    fn log(&mut self) {
        self.modify_count = self.modify_count.saturating_add(1).min(MAX_COUNT);
        self.modify_date = now_millis();
    }
}

impl<T: Copy> Tracked<T> {
    pub fn value(&self) -> T {
        self.value
    }
}
