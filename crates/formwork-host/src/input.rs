use std::collections::HashMap;

use bitflags::bitflags;

use formwork_core::PlayerId;

use crate::surface::PlayerInput;

bitflags! {
    /// Player input the host can switch off while a dialog is up.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct InputCategory: u8 {
        const CAMERA   = 0b0000_0001;
        const MOVEMENT = 0b0000_0010;
    }
}

/// Per-player input locks. Locking saves the prior permission of each
/// category; unlocking puts it back.
#[derive(Debug, Default)]
pub struct InputLocks {
    saved: HashMap<PlayerId, Vec<(InputCategory, bool)>>,
}

impl InputLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `player` was already locked (nothing changes).
    pub fn lock(
        &mut self,
        player: &PlayerId,
        categories: InputCategory,
        input: &dyn PlayerInput,
    ) -> bool {
        if self.saved.contains_key(player) {
            return false;
        }
        let prior: Vec<_> = categories
            .iter()
            .map(|c| (c, input.is_permission_enabled(player, c)))
            .collect();
        for (c, _) in &prior {
            input.set_permission(player, *c, false);
        }
        log::debug!("locked {categories:?} for {player}");
        self.saved.insert(player.clone(), prior);
        true
    }

    /// Returns `false` if `player` was not locked.
    pub fn unlock(&mut self, player: &PlayerId, input: &dyn PlayerInput) -> bool {
        let Some(prior) = self.saved.remove(player) else {
            return false;
        };
        for (c, enabled) in prior {
            input.set_permission(player, c, enabled);
        }
        log::debug!("restored input for {player}");
        true
    }

    pub fn is_locked(&self, player: &PlayerId) -> bool {
        self.saved.contains_key(player)
    }
}
