//! API endpoint implementations.

mod nightscout;
mod share;

pub use nightscout::NightscoutApi;
pub use share::{SHARE_SERVER_OUTSIDE_US, SHARE_SERVER_US, ShareApi};
