//! Per-user generation sessions.
//!
//! A session walks `Idle -> AwaitingPrimaryAsset -> AwaitingSecondaryAsset ->
//! AwaitingConfirmation -> Debiting -> Generating -> Idle`, with a separate
//! `VideoGenerating` step reachable from `Idle` once a result exists. Every transition is a
//! check-and-set performed while holding the map entry, and no entry is held across an
//! `.await`; two racing confirmations therefore cannot both enter `Debiting`.

use crate::media::MediaRef;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingPrimaryAsset,
    AwaitingSecondaryAsset,
    AwaitingConfirmation,
    Debiting,
    Generating,
    VideoGenerating,
}

impl SessionState {
    /// States that own an in-flight debit or generation call.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Debiting | Self::Generating | Self::VideoGenerating)
    }
}

/// Which upload a user wants to replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSlot {
    /// The car photo
    Primary,
    /// The rim photo
    Secondary,
}

#[derive(Debug, Clone)]
pub struct GenerationSession {
    pub state: SessionState,
    pub car: Option<MediaRef>,
    pub wheel: Option<MediaRef>,
    /// Latest successful image, the input of the video flow
    pub last_result: Option<MediaRef>,
    touched_at: Instant,
}

impl Default for GenerationSession {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            car: None,
            wheel: None,
            last_result: None,
            touched_at: Instant::now(),
        }
    }
}

/// Both uploads, handed out when a confirmation wins the race into `Debiting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub car: MediaRef,
    pub wheel: MediaRef,
}

/// Keyed store of sessions, one per chat account.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, GenerationSession>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a user's session; users without one are `Idle`.
    #[must_use]
    pub fn get(&self, external_id: &str) -> GenerationSession {
        self.sessions
            .get(external_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn state(&self, external_id: &str) -> SessionState {
        self.sessions
            .get(external_id)
            .map_or(SessionState::Idle, |entry| entry.state)
    }

    /// Runs `f` on the user's session under the entry lock, creating it when missing.
    fn with_session<T>(
        &self,
        external_id: &str,
        f: impl FnOnce(&mut GenerationSession) -> T,
    ) -> T {
        let mut entry = self.sessions.entry(external_id.to_string()).or_default();
        entry.touched_at = Instant::now();
        f(entry.value_mut())
    }

    /// Supersedes the session with a fresh one awaiting the car photo.
    ///
    /// Returns `false` while a debit or generation is in flight.
    pub fn start(&self, external_id: &str) -> bool {
        self.with_session(external_id, |session| {
            if session.state.is_busy() {
                return false;
            }
            session.state = SessionState::AwaitingPrimaryAsset;
            session.car = None;
            session.wheel = None;
            true
        })
    }

    /// Which slot an incoming photo fills, if the session is waiting for one.
    #[must_use]
    pub fn expected_slot(&self, external_id: &str) -> Option<AssetSlot> {
        match self.state(external_id) {
            SessionState::AwaitingPrimaryAsset => Some(AssetSlot::Primary),
            SessionState::AwaitingSecondaryAsset => Some(AssetSlot::Secondary),
            _ => None,
        }
    }

    /// Stores an uploaded asset and advances. Returns the new state, or `None` when the
    /// session is not waiting for this slot any more.
    pub fn submit_asset(
        &self,
        external_id: &str,
        slot: AssetSlot,
        asset: MediaRef,
    ) -> Option<SessionState> {
        self.with_session(external_id, |session| {
            match (slot, session.state) {
                (AssetSlot::Primary, SessionState::AwaitingPrimaryAsset) => {
                    session.car = Some(asset);
                    session.state = if session.wheel.is_some() {
                        SessionState::AwaitingConfirmation
                    } else {
                        SessionState::AwaitingSecondaryAsset
                    };
                }
                (AssetSlot::Secondary, SessionState::AwaitingSecondaryAsset)
                    if session.car.is_some() =>
                {
                    session.wheel = Some(asset);
                    session.state = SessionState::AwaitingConfirmation;
                }
                _ => return None,
            }
            Some(session.state)
        })
    }

    /// Goes back to the awaiting state of `slot`, keeping the other asset.
    pub fn request_replacement(&self, external_id: &str, slot: AssetSlot) -> bool {
        self.with_session(external_id, |session| {
            let allowed = match slot {
                AssetSlot::Primary => matches!(
                    session.state,
                    SessionState::AwaitingSecondaryAsset | SessionState::AwaitingConfirmation
                ),
                AssetSlot::Secondary => session.state == SessionState::AwaitingConfirmation,
            };
            if allowed {
                session.state = match slot {
                    AssetSlot::Primary => SessionState::AwaitingPrimaryAsset,
                    AssetSlot::Secondary => SessionState::AwaitingSecondaryAsset,
                };
            }
            allowed
        })
    }

    /// `AwaitingConfirmation -> Debiting`. Only one caller ever receives the uploads.
    pub fn begin_debit(&self, external_id: &str) -> Option<PendingUpload> {
        self.with_session(external_id, |session| {
            if session.state != SessionState::AwaitingConfirmation {
                return None;
            }
            let upload = PendingUpload {
                car: session.car.clone()?,
                wheel: session.wheel.clone()?,
            };
            session.state = SessionState::Debiting;
            Some(upload)
        })
    }

    /// `Debiting -> Generating`.
    pub fn begin_generating(&self, external_id: &str) -> bool {
        self.with_session(external_id, |session| {
            let ok = session.state == SessionState::Debiting;
            if ok {
                session.state = SessionState::Generating;
            }
            ok
        })
    }

    /// `Idle -> VideoGenerating`, handing out the result the video is made from.
    pub fn begin_video(&self, external_id: &str) -> Option<MediaRef> {
        self.with_session(external_id, |session| {
            if session.state != SessionState::Idle {
                return None;
            }
            let result = session.last_result.clone()?;
            session.state = SessionState::VideoGenerating;
            Some(result)
        })
    }

    /// Ends an attempt and returns to `Idle`. The uploads are consumed either way, so a retry
    /// starts with fresh photos; a new result supersedes the previous one.
    pub fn finish(&self, external_id: &str, result: Option<MediaRef>) {
        self.with_session(external_id, |session| {
            session.state = SessionState::Idle;
            session.car = None;
            session.wheel = None;
            if let Some(result) = result {
                session.last_result = Some(result);
            }
        });
    }

    /// Abandons the current flow unless an attempt is in flight.
    pub fn cancel(&self, external_id: &str) -> bool {
        self.with_session(external_id, |session| {
            if session.state.is_busy() {
                return false;
            }
            session.state = SessionState::Idle;
            session.car = None;
            session.wheel = None;
            true
        })
    }

    /// Drops sessions untouched for longer than `ttl`. In-flight sessions always stay.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        let now = Instant::now();
        self.sessions.retain(|_, session| {
            session.state.is_busy() || now.duration_since(session.touched_at) < ttl
        });
        before.saturating_sub(self.sessions.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
