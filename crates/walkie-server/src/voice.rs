//! Exclusive ownership of the single push-to-talk channel.
//!
//! The arbiter is a two-state machine, `Idle` or `Busy(grant)`. The first
//! start request processed while idle wins; every other request is turned
//! away with the current speaker's name. Nothing is queued: a rejected
//! speaker retries on their own.

use walkie_common::SessionId;

/// The right to transmit, held by exactly one session at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceGrant {
    pub session: SessionId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChannelState {
    Idle,
    Busy(VoiceGrant),
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Granted(VoiceGrant),
    Busy { current_speaker: String },
}

#[derive(Debug)]
pub struct VoiceArbiter {
    state: ChannelState,
}

impl VoiceArbiter {
    pub fn new() -> Self {
        Self {
            state: ChannelState::Idle,
        }
    }

    /// Try to take the channel for `session`.
    pub fn request_start(&mut self, session: &SessionId, name: &str) -> StartOutcome {
        match &self.state {
            ChannelState::Idle => {
                let grant = VoiceGrant {
                    session: session.clone(),
                    name: name.to_string(),
                };
                self.state = ChannelState::Busy(grant.clone());
                StartOutcome::Granted(grant)
            }
            ChannelState::Busy(holder) => StartOutcome::Busy {
                current_speaker: holder.name.clone(),
            },
        }
    }

    /// Whether an audio frame from `session` may be relayed.
    pub fn may_relay(&self, session: &SessionId) -> bool {
        self.is_holder(session)
    }

    /// Release the channel if `session` holds it. Returns the released grant.
    pub fn request_stop(&mut self, session: &SessionId) -> Option<VoiceGrant> {
        if !self.is_holder(session) {
            return None;
        }
        match std::mem::replace(&mut self.state, ChannelState::Idle) {
            ChannelState::Busy(grant) => Some(grant),
            ChannelState::Idle => None,
        }
    }

    /// A disconnecting holder is released exactly as if it had stopped.
    pub fn release_disconnected(&mut self, session: &SessionId) -> Option<VoiceGrant> {
        self.request_stop(session)
    }

    pub fn holder(&self) -> Option<&VoiceGrant> {
        match &self.state {
            ChannelState::Busy(grant) => Some(grant),
            ChannelState::Idle => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ChannelState::Idle)
    }

    fn is_holder(&self, session: &SessionId) -> bool {
        matches!(&self.state, ChannelState::Busy(grant) if &grant.session == session)
    }
}

impl Default for VoiceArbiter {
    fn default() -> Self {
        Self::new()
    }
}
