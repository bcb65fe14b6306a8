pub mod app;

use tracing::{error, warn};
use uuid::Uuid;

use app::config::load_config;
use app::logging::init_logging;

pub fn run() {
    let trace_id = Uuid::new_v4().to_string();
    let loaded = load_config(&trace_id);
    let config = loaded.clone().unwrap_or_default();
    init_logging(&config.logging.log_level);
    if let Err(err) = &loaded {
        warn!(trace_id = %trace_id, error = %err, "config unreadable, using defaults");
    }

    if let Err(err) = app::console::run(&config) {
        error!(error = %err, "console terminated");
        std::process::exit(1);
    }
}
