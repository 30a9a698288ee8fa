//! Device Metadata
//!
//! Identity and control information the server reports about itself.
//! Nothing in here changes while the server runs.

pub mod control;
pub mod identity;

pub use control::{ControlBlock, CONFORMITY_LEVEL, DEFAULT_SERVER_ID, MAX_SERVER_ID_LEN};
pub use identity::{DeviceIdentity, MAX_OBJECT_LEN};
