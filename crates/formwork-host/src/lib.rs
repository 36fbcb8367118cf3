//! Host glue: the surfaces a game server provides (dialogs, input
//! permissions, the tick loop) and the [`Presenter`] that drives components
//! through them.
//!
//! ```rust,ignore
//! let presenter = Presenter::new(dialogs, input, ticks, RuntimeConfig::default());
//! presenter.open(PlayerId::new("alex"), "shop", shop_component, ShopProps { page: 0 });
//! ```

pub mod config;
pub mod input;
pub mod presenter;
pub mod surface;

pub use config::RuntimeConfig;
pub use input::{InputCategory, InputLocks};
pub use presenter::{Outcome, PresentError, Presenter};
pub use surface::{Dialog, DialogHost, DialogResponse, HostError, PlayerInput};
