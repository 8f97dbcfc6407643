mod callbacks;
mod entity_channel;
mod event;
mod sub_view;
mod view_computer;

pub use callbacks::{CallbackId, ComponentCallback, Dispatcher, EntityCallback, ViewCallbacks};
pub use entity_channel::{EntityChannel, StagedAuthority, StagedEntity};
pub use event::ViewEvent;
pub use sub_view::{RefreshTrigger, SubView, SubViewDelta, SubViewFilter, ViewContext};
pub use view_computer::ViewDeltaComputer;
