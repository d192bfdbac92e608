pub mod handlers;
pub mod routes;
pub mod urls;

pub use handlers::{TrackingState, TRANSPARENT_PNG};
pub use routes::create_tracking_router;
