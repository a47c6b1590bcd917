//! CLI command implementations

mod action;
mod cast;
mod config;
mod discover;
mod info;
mod list;
mod snapshot;
mod status;
mod stop;

pub use action::{action, ActionArgs};
pub use cast::{cast, CastArgs};
pub use config::{config, ConfigArgs};
pub use discover::{discover, DiscoverArgs};
pub use info::{info, InfoArgs};
pub use list::list_sources;
pub use snapshot::{snapshot, SnapshotArgs};
pub use status::status;
pub use stop::{stop, StopArgs};
