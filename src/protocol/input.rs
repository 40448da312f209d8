//! Per-frame input: what we send, and how the opponent's arrives.

use crate::common::messages::InputFrame;

/// Buttons held this frame, merged from every local device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeldInput {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub attack1: bool,
    pub attack2: bool,
}

impl HeldInput {
    /// Combine two devices (e.g. keyboard and touch): a button is held if
    /// either holds it.
    pub fn merge(self, other: HeldInput) -> HeldInput {
        HeldInput {
            up: self.up || other.up,
            down: self.down || other.down,
            left: self.left || other.left,
            right: self.right || other.right,
            attack1: self.attack1 || other.attack1,
            attack2: self.attack2 || other.attack2,
        }
    }
}

/// Turns held attack buttons into single-frame presses.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    attack1_was_held: bool,
    attack2_was_held: bool,
}

impl EdgeDetector {
    /// The frame to transmit for this tick's held buttons.
    pub fn frame(&mut self, held: HeldInput) -> InputFrame {
        let frame = InputFrame {
            up: held.up,
            down: held.down,
            left: held.left,
            right: held.right,
            attack1_press: held.attack1 && !self.attack1_was_held,
            attack2_press: held.attack2 && !self.attack2_was_held,
        };
        self.attack1_was_held = held.attack1;
        self.attack2_was_held = held.attack2;
        frame
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// An attack the remote player triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attack {
    Primary,
    Secondary,
}

/// Local stand-in for the remote player.
///
/// Directions follow the newest frame received. Attack presses are latched
/// until the simulation takes them, so a press is acted on exactly once no
/// matter how frames and simulation ticks interleave.
#[derive(Debug, Default)]
pub struct RemotePuppet {
    latest: InputFrame,
    attack1_pending: bool,
    attack2_pending: bool,
    frames_received: u64,
}

impl RemotePuppet {
    pub fn apply(&mut self, frame: InputFrame) {
        self.latest = frame;
        self.attack1_pending |= frame.attack1_press;
        self.attack2_pending |= frame.attack2_press;
        self.frames_received += 1;
    }

    /// Directions currently held by the remote player.
    pub fn held(&self) -> HeldInput {
        HeldInput {
            up: self.latest.up,
            down: self.latest.down,
            left: self.latest.left,
            right: self.latest.right,
            attack1: false,
            attack2: false,
        }
    }

    /// Take the next latched attack; the primary attack wins a tie.
    pub fn take_attack(&mut self) -> Option<Attack> {
        if self.attack1_pending {
            self.attack1_pending = false;
            Some(Attack::Primary)
        } else if self.attack2_pending {
            self.attack2_pending = false;
            Some(Attack::Secondary)
        } else {
            None
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
