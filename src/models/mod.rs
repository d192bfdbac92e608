mod account;
mod event;
mod resource;

pub use account::Account;
pub use event::{ClickEvent, GeoInfo, NewClickEvent, NewOpenEvent, OpenEvent};
pub use resource::{Campaign, ResourceKind, ResourceRecord, ResourceStatus, TrackedLink};
