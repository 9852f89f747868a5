pub mod api;
pub mod core;
pub mod scanner;

use std::sync::Once;

static LOGGER: Once = Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        // a host may already have installed its own logger
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .try_init();
    });
}
