pub use scripthub_core::app::App;
pub use scripthub_types::error::{Error, HubResult};
pub use scripthub_types::types::Timestamp;

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
