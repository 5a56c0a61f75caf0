//! Ready-to-use protocol handlers.

mod reef;

pub use reef::{ACTION_EXECUTED, ReefProtocol, ReefProtocolConfig, params_field};
