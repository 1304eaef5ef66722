//! Wire-level types shared between the scan manager daemon and its
//! collaborators: response status kinds, task lifecycle states, resource
//! kinds, and the generic rows the backend returns for `GET_*` rendering.

mod resource;
mod status;
mod task;

pub use resource::{ResourceKind, ResourceRow};
pub use status::StatusKind;
pub use task::TaskStatus;
