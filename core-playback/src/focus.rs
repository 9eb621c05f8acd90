//! Audio-focus bookkeeping.
//!
//! [`FocusController`] decides what a focus change means for the transport;
//! the engine carries the resulting [`FocusAction`] out against the device and
//! the arbitrator.

use bridge_traits::focus::FocusChange;

const FULL_VOLUME: f32 = 1.0;

/// Focus bookkeeping owned by the playback engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FocusState {
    pub granted: bool,
    pub ducked: bool,
    pub was_playing_before_transient_loss: bool,
}

/// Device-side effects of a focus change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FocusAction {
    pub volume: Option<f32>,
    pub pause: bool,
    pub resume: bool,
    /// Give the grant back to the arbitrator.
    pub abandon: bool,
}

#[derive(Debug, Clone)]
pub struct FocusController {
    state: FocusState,
    duck_volume: f32,
}

impl FocusController {
    pub fn new(duck_volume: f32) -> Self {
        Self {
            state: FocusState::default(),
            duck_volume,
        }
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn is_granted(&self) -> bool {
        self.state.granted
    }

    /// A fresh grant supersedes any resume owed from a transient loss.
    pub fn granted(&mut self) {
        self.state.granted = true;
        self.state.was_playing_before_transient_loss = false;
    }

    /// Forget the grant after an explicit abandon.
    pub fn abandoned(&mut self) {
        self.state = FocusState::default();
    }

    pub fn on_change(&mut self, change: FocusChange, is_playing: bool) -> FocusAction {
        match change {
            FocusChange::Gain => {
                self.state.granted = true;
                self.state.ducked = false;
                let resume = std::mem::take(&mut self.state.was_playing_before_transient_loss);
                FocusAction {
                    volume: Some(FULL_VOLUME),
                    resume,
                    ..FocusAction::default()
                }
            }
            // The grant is suspended; playing before the gain must ask again.
            FocusChange::TransientLoss => {
                self.state.granted = false;
                self.state.was_playing_before_transient_loss = is_playing;
                FocusAction {
                    pause: true,
                    ..FocusAction::default()
                }
            }
            FocusChange::TransientLossDuck => {
                self.state.ducked = true;
                FocusAction {
                    volume: Some(self.duck_volume),
                    ..FocusAction::default()
                }
            }
            FocusChange::Loss => {
                self.state = FocusState::default();
                FocusAction {
                    pause: true,
                    abandon: true,
                    ..FocusAction::default()
                }
            }
        }
    }
}
