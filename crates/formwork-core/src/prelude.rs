pub use crate::context::{Context, use_context};
pub use crate::effects::{Dispose, IntoCleanup, on_unmount};
pub use crate::error::{HookError, HookKind, RenderError};
pub use crate::fiber::{FiberFlags, FiberId, PlayerId};
pub use crate::hooks::{
    Dispatch, Setter, use_effect, use_effect_with, use_reducer, use_ref, use_state,
};
pub use crate::registry::{Registry, render_child};
pub use crate::scheduler::{ManualTicks, TaskHandle, TickScheduler};
pub use crate::suspense::{SuspenseRecord, suspense_boundary, use_suspended_state};
pub use crate::view::{
    Callback, Component, IntoSettle, Node, Segment, SegmentSlot, SerializeContext, Settle, View,
    ViewKind, callback,
};
