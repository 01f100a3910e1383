//! Cache policy string parsing.
//!
//! The policy is a compact `"<maxEntries>:<retention>"` string where either
//! side may be empty. Retention is an integer magnitude followed by a single
//! unit character (`d`, `h`, `m`, `s`). A malformed sub-setting is logged and
//! skipped; the remaining sub-setting still applies.

use std::{num::NonZeroU64, time::Duration};

use tracing::warn;

/// Unit of a retention period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl RetentionUnit {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'd' => Some(Self::Days),
            'h' => Some(Self::Hours),
            'm' => Some(Self::Minutes),
            's' => Some(Self::Seconds),
            _ => None,
        }
    }

    pub fn seconds(self) -> u64 {
        match self {
            Self::Days => 86_400,
            Self::Hours => 3_600,
            Self::Minutes => 60,
            Self::Seconds => 1,
        }
    }
}

/// How long an entry is retained after its last access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub magnitude: NonZeroU64,
    pub unit: RetentionUnit,
}

impl Retention {
    /// Retention in whole seconds, saturating on overflow.
    pub fn as_secs(&self) -> u64 {
        self.magnitude.get().saturating_mul(self.unit.seconds())
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

/// Capacity and retention bounds parsed from the policy string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_entries: Option<NonZeroU64>,
    pub retention: Option<Retention>,
}

impl CachePolicy {
    /// Parse a policy string. Never fails: invalid parts are logged and dropped.
    pub fn parse(raw: &str) -> Self {
        let mut fields = raw.split(':').map(str::trim);

        let max_entries = fields
            .next()
            .filter(|field| !field.is_empty())
            .and_then(parse_max_entries);
        let retention = fields
            .next()
            .filter(|field| !field.is_empty())
            .and_then(parse_retention);

        let extra: Vec<&str> = fields.filter(|field| !field.is_empty()).collect();
        if !extra.is_empty() {
            warn!(
                policy = raw,
                ignored = ?extra,
                "ignoring trailing cache policy fields"
            );
        }

        Self {
            max_entries,
            retention,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.max_entries.is_some() || self.retention.is_some()
    }
}

fn parse_max_entries(field: &str) -> Option<NonZeroU64> {
    match field.parse::<u64>().ok().and_then(NonZeroU64::new) {
        Some(value) => Some(value),
        None => {
            warn!(
                value = field,
                "invalid cache max entries, capacity bound disabled"
            );
            None
        }
    }
}

fn parse_retention(field: &str) -> Option<Retention> {
    // `field` is non-empty, so a last char exists.
    let unit_char = field.chars().last()?;
    let Some(unit) = RetentionUnit::from_char(unit_char) else {
        warn!(
            value = field,
            unit = %unit_char,
            "unknown cache retention unit, retention disabled"
        );
        return None;
    };

    let digits = &field[..field.len() - unit_char.len_utf8()];
    match digits.parse::<u64>().ok().and_then(NonZeroU64::new) {
        Some(magnitude) => Some(Retention { magnitude, unit }),
        None => {
            warn!(
                value = field,
                "invalid cache retention magnitude, retention disabled"
            );
            None
        }
    }
}
