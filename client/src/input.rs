//! Client input state and its conversion into input messages

use shared::{InputMessage, PlayerAction, Vector2};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Tracks held actions and decides when an input message is due
pub struct InputManager {
    actions: BTreeSet<PlayerAction>,
    cursor: Vector2,
    send_interval: Duration,
    last_input_sent: Option<Instant>,
    changed: bool,
}

impl InputManager {
    /// Creates a manager with nothing held that resends at least every
    /// `send_interval`
    pub fn new(send_interval: Duration) -> Self {
        Self {
            actions: BTreeSet::new(),
            cursor: Vector2::default(),
            send_interval,
            last_input_sent: None,
            changed: false,
        }
    }

    /// Starts holding an action; a new action makes the next poll send
    pub fn press(&mut self, action: PlayerAction) {
        self.changed |= self.actions.insert(action);
    }

    /// Stops holding an action
    pub fn release(&mut self, action: PlayerAction) {
        self.changed |= self.actions.remove(&action);
    }

    /// Moves the aim point in world coordinates
    pub fn set_cursor(&mut self, cursor: Vector2) {
        if cursor != self.cursor {
            self.cursor = cursor;
            self.changed = true;
        }
    }

    /// Actions currently held
    pub fn actions(&self) -> &BTreeSet<PlayerAction> {
        &self.actions
    }

    /// Returns the input to send now, if any: immediately after a change,
    /// otherwise once per send interval so the server keeps receiving acks.
    pub fn poll(&mut self, now: Instant, ack_version: u32) -> Option<InputMessage> {
        let due = match self.last_input_sent {
            Some(last) => now.saturating_duration_since(last) >= self.send_interval,
            None => true,
        };
        if !self.changed && !due {
            return None;
        }

        self.changed = false;
        self.last_input_sent = Some(now);
        Some(InputMessage {
            version: ack_version,
            actions: self.actions.clone(),
            cursor: self.cursor,
        })
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(33))
    }
}
