//! Pulse shapes and the event-to-pulse table.

use crate::node::InputEventType;

/// Shape of one haptic response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HapticPulse {
    /// Fixed strength for `duration` seconds.
    Simple { strength: f32, duration: f32 },
    /// Strength moves from `start` to `end` over `duration` seconds.
    Ramped {
        start: f32,
        end: f32,
        duration: f32,
        ease_in: bool,
        ease_out: bool,
    },
}

impl HapticPulse {
    pub fn simple(strength: f32, duration: f32) -> Self {
        Self::Simple { strength, duration }
    }

    pub fn ramped(start: f32, end: f32, duration: f32, ease_in: bool, ease_out: bool) -> Self {
        Self::Ramped {
            start,
            end,
            duration,
            ease_in,
            ease_out,
        }
    }

    pub fn duration(&self) -> f32 {
        match *self {
            Self::Simple { duration, .. } | Self::Ramped { duration, .. } => duration,
        }
    }

    /// A pulse that would produce no vibration is invalid.
    pub fn is_valid(&self) -> bool {
        match *self {
            Self::Simple { strength, duration } => strength > 0.0 && duration > 0.0,
            Self::Ramped { start, end, duration, .. } => (start > 0.0 || end > 0.0) && duration > 0.0,
        }
    }
}

/// Pulse played for an interaction event.
pub fn pulse_for_event(kind: InputEventType) -> HapticPulse {
    match kind {
        InputEventType::HoverEnter => HapticPulse::simple(0.11, 0.017),
        InputEventType::HoverExit => HapticPulse::simple(0.075, 0.017),
        InputEventType::GrabStart => HapticPulse::ramped(0.375, 0.15, 0.068, false, true),
        InputEventType::GrabEnd => HapticPulse::simple(0.225, 0.025),
        InputEventType::ActivateDown => HapticPulse::simple(0.375, 0.068),
        InputEventType::ActivateUp => HapticPulse::simple(0.15, 0.017),
    }
}

/// Ease `t` in `[0, 1]`: both ends use smoothstep, one end a quadratic.
pub fn ease(t: f32, ease_in: bool, ease_out: bool) -> f32 {
    match (ease_in, ease_out) {
        (true, true) => t * t * (3.0 - 2.0 * t),
        (true, false) => t * t,
        (false, true) => 1.0 - (1.0 - t) * (1.0 - t),
        (false, false) => t,
    }
}
