//! What the host gives us: modal dialogs, per-player input permissions and
//! the tick loop (see [`formwork_core::TickScheduler`]).

use futures::future::LocalBoxFuture;
use thiserror::Error;

use formwork_core::PlayerId;

use crate::input::InputCategory;

/// How the player left a dialog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DialogResponse {
    pub cancelled: bool,
    pub selection: Option<usize>,
}

impl DialogResponse {
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            selection: None,
        }
    }

    pub fn selected(index: usize) -> Self {
        Self {
            cancelled: false,
            selection: Some(index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("player {0} is no longer connected")]
    PlayerLeft(PlayerId),
    #[error("host rejected the dialog: {0}")]
    Rejected(String),
}

/// One modal dialog under construction. Consumed by [`Dialog::show`].
pub trait Dialog {
    fn set_title_text(&mut self, text: &str);
    fn add_labeled_text(&mut self, text: &str);
    fn add_button(&mut self, text: &str);
    /// Resolves once the player picks a button or dismisses the dialog.
    fn show(
        self: Box<Self>,
        player: &PlayerId,
    ) -> LocalBoxFuture<'static, Result<DialogResponse, HostError>>;
}

pub trait DialogHost {
    fn create_dialog(&self) -> Box<dyn Dialog>;
    /// Dismisses every open dialog of `player`; pending shows resolve as
    /// cancelled.
    fn close_dialogs(&self, player: &PlayerId);
}

pub trait PlayerInput {
    fn is_permission_enabled(&self, player: &PlayerId, category: InputCategory) -> bool;
    fn set_permission(&self, player: &PlayerId, category: InputCategory, enabled: bool);
}
