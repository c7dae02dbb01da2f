//! Turn-Taking Gate
//!
//! Decides when the human may contribute: the discussion must be waiting for
//! them and nothing may be queued or playing. Recording while a participant
//! is still speaking would capture their voice.

use crate::playback::PlaybackStatus;
use caseai_common::Message;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// Published gate state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateState {
    pub awaiting_input: bool,
    pub recording_allowed: bool,
}

#[derive(Debug)]
struct Inputs {
    awaiting_input: bool,
    playback_idle: bool,
    /// Messages observed so far
    observed: u64,
}

/// The floor taken by [`TurnGate::begin_turn`], returned with
/// [`TurnGate::abandon_turn`] if the turn could not be stored
#[derive(Debug)]
#[must_use]
pub struct TurnTicket {
    observed: u64,
}

#[derive(Debug)]
pub struct TurnGate {
    inputs: Mutex<Inputs>,
    state: watch::Sender<GateState>,
}

impl TurnGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::default());
        Self {
            inputs: Mutex::new(Inputs {
                awaiting_input: false,
                playback_idle: true,
                observed: 0,
            }),
            state,
        }
    }

    fn inputs(&self) -> MutexGuard<'_, Inputs> {
        self.inputs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Recompute and publish while the inputs lock is held
    fn publish(&self, inputs: &Inputs) {
        let next = GateState {
            awaiting_input: inputs.awaiting_input,
            recording_allowed: inputs.awaiting_input && inputs.playback_idle,
        };
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(
                "Gate: awaiting_input={} recording_allowed={}",
                next.awaiting_input, next.recording_allowed
            );
            *current = next;
            true
        });
    }

    /// Apply a newly delivered message
    ///
    /// Human turns close the gate; a simulated turn opens it only when it
    /// carries `awaiting_user_input`, and clears it otherwise.
    pub fn observe(&self, message: &Message) {
        let mut inputs = self.inputs();
        inputs.awaiting_input = !message.is_human && message.awaiting_user_input;
        inputs.observed = inputs.observed.wrapping_add(1);
        self.publish(&inputs);
    }

    /// Take the floor if recording is allowed, closing the gate until the
    /// turn is stored or abandoned. `None` while the gate is closed.
    pub fn begin_turn(&self) -> Option<TurnTicket> {
        let mut inputs = self.inputs();
        if !(inputs.awaiting_input && inputs.playback_idle) {
            return None;
        }
        inputs.awaiting_input = false;
        self.publish(&inputs);
        Some(TurnTicket {
            observed: inputs.observed,
        })
    }

    /// The turn was not stored: reopen, unless a message arrived meanwhile and
    /// already decided the gate
    pub fn abandon_turn(&self, ticket: TurnTicket) {
        let mut inputs = self.inputs();
        if inputs.observed != ticket.observed {
            debug!("Gate: turn abandoned after newer messages, leaving gate as is");
            return;
        }
        inputs.awaiting_input = true;
        self.publish(&inputs);
    }

    pub fn set_playback(&self, status: &PlaybackStatus) {
        let mut inputs = self.inputs();
        inputs.playback_idle = status.is_idle();
        self.publish(&inputs);
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// Resolve once recording is allowed
    pub async fn wait_until_open(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed
        let _ = rx.wait_for(|s| s.recording_allowed).await;
    }
}

impl Default for TurnGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseai_common::SessionId;
    use std::sync::Arc;
    use std::time::Duration;

    fn message(is_human: bool, awaiting: bool) -> Message {
        Message {
            message_id: 1,
            started_case_id: SessionId::new(),
            persona_id: None,
            persona_name: None,
            persona_role: None,
            content: "x".to_string(),
            is_human,
            awaiting_user_input: awaiting,
            time_sent: chrono::Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    fn busy() -> PlaybackStatus {
        PlaybackStatus {
            queue_len: 1,
            is_playing: false,
            current_speaker: None,
        }
    }

    #[test]
    fn test_awaiting_opens_when_idle() {
        let gate = TurnGate::new();
        assert!(!gate.state().recording_allowed);

        gate.observe(&message(false, true));
        assert_eq!(
            gate.state(),
            GateState {
                awaiting_input: true,
                recording_allowed: true
            }
        );
    }

    #[test]
    fn test_busy_playback_keeps_gate_closed() {
        let gate = TurnGate::new();
        gate.set_playback(&busy());
        gate.observe(&message(false, true));

        let state = gate.state();
        assert!(state.awaiting_input);
        assert!(!state.recording_allowed);

        gate.set_playback(&PlaybackStatus {
            queue_len: 0,
            is_playing: true,
            current_speaker: Some("Professor Chen".to_string()),
        });
        assert!(!gate.state().recording_allowed);

        gate.set_playback(&PlaybackStatus::default());
        assert!(gate.state().recording_allowed);
    }

    #[test]
    fn test_cleared_by_human_or_unflagged_message() {
        let gate = TurnGate::new();

        gate.observe(&message(false, true));
        gate.observe(&message(true, false));
        assert!(!gate.state().awaiting_input);

        gate.observe(&message(false, true));
        gate.observe(&message(false, false));
        assert!(!gate.state().awaiting_input);
    }

    #[test]
    fn test_begin_turn_only_when_open() {
        let gate = TurnGate::new();
        assert!(gate.begin_turn().is_none());

        gate.set_playback(&busy());
        gate.observe(&message(false, true));
        assert!(gate.begin_turn().is_none());
        assert!(gate.state().awaiting_input);

        gate.set_playback(&PlaybackStatus::default());
        let _ticket = gate.begin_turn().expect("gate open");
        assert_eq!(gate.state(), GateState::default());
        assert!(gate.begin_turn().is_none());
    }

    #[test]
    fn test_abandoned_turn_reopens_gate() {
        let gate = TurnGate::new();
        gate.observe(&message(false, true));

        let ticket = gate.begin_turn().expect("gate open");
        gate.abandon_turn(ticket);
        assert_eq!(
            gate.state(),
            GateState {
                awaiting_input: true,
                recording_allowed: true
            }
        );
    }

    #[test]
    fn test_abandoned_turn_yields_to_newer_messages() {
        let gate = TurnGate::new();
        gate.observe(&message(false, true));
        let ticket = gate.begin_turn().expect("gate open");

        // Another participant spoke while the turn was in flight
        gate.observe(&message(false, false));
        gate.abandon_turn(ticket);
        assert!(!gate.state().awaiting_input);
    }

    #[tokio::test]
    async fn test_wait_until_open() {
        let gate = Arc::new(TurnGate::new());
        gate.set_playback(&busy());
        gate.observe(&message(false, true));

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_until_open().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.set_playback(&PlaybackStatus::default());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("gate never opened")
            .unwrap();
    }
}
