pub mod logging;
pub mod metrics;

pub use logging::{
    init_with_service, try_init_structured_logging, LogConfig, LogFormat, LoggingGuard,
};
