use std::time::Duration;

use crate::types::ObjectGuid;

/// How long a PvP reference survives without being refreshed.
pub const PVP_COMBAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Key of a combat reference: the unordered pair of participants, stored
/// with the lower GUID first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CombatPair {
    low: ObjectGuid,
    high: ObjectGuid,
}

impl CombatPair {
    pub fn new(a: ObjectGuid, b: ObjectGuid) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> ObjectGuid {
        self.low
    }

    pub fn high(&self) -> ObjectGuid {
        self.high
    }

    pub fn contains(&self, guid: ObjectGuid) -> bool {
        self.low == guid || self.high == guid
    }
}

/// A single combat relationship shared by both participants.
///
/// `first` is the unit that initiated the engagement. Suppression is tracked
/// per side: a suppressed side keeps the reference but does not count it
/// towards its own in-combat state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatReference {
    pub first: ObjectGuid,
    pub second: ObjectGuid,
    pub is_pvp: bool,
    pub suppress_first: bool,
    pub suppress_second: bool,
    pvp_remaining: Duration,
}

impl CombatReference {
    pub(crate) fn new(first: ObjectGuid, second: ObjectGuid, is_pvp: bool) -> Self {
        Self {
            first,
            second,
            is_pvp,
            suppress_first: false,
            suppress_second: false,
            pvp_remaining: PVP_COMBAT_TIMEOUT,
        }
    }

    pub fn pair(&self) -> CombatPair {
        CombatPair::new(self.first, self.second)
    }

    /// The participant that is not `me`, or `None` if `me` is not part of
    /// this reference.
    pub fn get_other(&self, me: ObjectGuid) -> Option<ObjectGuid> {
        if me == self.first {
            Some(self.second)
        } else if me == self.second {
            Some(self.first)
        } else {
            None
        }
    }

    pub fn is_suppressed_for(&self, who: ObjectGuid) -> bool {
        if who == self.first {
            self.suppress_first
        } else if who == self.second {
            self.suppress_second
        } else {
            false
        }
    }

    /// Sets suppression for `who`'s side. Returns whether anything changed.
    pub(crate) fn suppress(&mut self, who: ObjectGuid) -> bool {
        let flag = if who == self.first {
            &mut self.suppress_first
        } else if who == self.second {
            &mut self.suppress_second
        } else {
            return false;
        };
        let changed = !*flag;
        *flag = true;
        changed
    }

    pub(crate) fn refresh(&mut self) {
        self.suppress_first = false;
        self.suppress_second = false;
        self.pvp_remaining = PVP_COMBAT_TIMEOUT;
    }

    pub fn pvp_remaining(&self) -> Option<Duration> {
        self.is_pvp.then_some(self.pvp_remaining)
    }

    /// Counts down the PvP timer. Returns true when it has run out.
    pub(crate) fn tick_pvp(&mut self, diff: Duration) -> bool {
        if !self.is_pvp {
            return false;
        }
        self.pvp_remaining = self.pvp_remaining.saturating_sub(diff);
        self.pvp_remaining.is_zero()
    }
}
