//! Update directives and tick notifications

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::ecs::{EntityId, Mode};

bitflags! {
    /// What an update call asks for
    ///
    /// Role bits describe the complete role set wanted after the call: a
    /// missing role is cleared. [`Directives::DROP`] overrides everything.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Directives: u8 {
        /// Act as a watcher (`w`)
        const WATCHER = 1 << 0;
        /// Act as a marker (`m`)
        const MARKER = 1 << 1;
        /// Remove the entity (`d`)
        const DROP = 1 << 2;
    }
}

impl Directives {
    /// Parse a directive string character by character.
    /// Unknown characters are ignored.
    pub fn parse(mode: &str) -> Self {
        mode.chars().fold(Self::empty(), |acc, c| match c {
            'w' => acc | Self::WATCHER,
            'm' => acc | Self::MARKER,
            'd' => acc | Self::DROP,
            _ => acc,
        })
    }

    /// Role flags requested by these directives
    pub fn roles(self) -> Mode {
        let mut roles = Mode::empty();
        roles.set(Mode::WATCHER, self.contains(Self::WATCHER));
        roles.set(Mode::MARKER, self.contains(Self::MARKER));
        roles
    }
}

impl FromStr for Directives {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Transition reported for a watcher/marker pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The marker is within the watcher's interest radius
    Move,
    /// The marker is beyond the watcher's leave radius
    Leave,
}

impl Event {
    /// Short lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Leave => "leave",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owned record of one callback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Notification {
    /// Watching entity
    pub watcher: EntityId,
    /// Observed entity
    pub marker: EntityId,
    /// What happened
    pub event: Event,
}

impl Notification {
    /// Create a notification
    pub fn new(watcher: EntityId, marker: EntityId, event: Event) -> Self {
        Self { watcher, marker, event }
    }
}
