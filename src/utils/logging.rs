use log::{debug, error, info, warn};

/// Initialize the logger
pub fn init_logger() {
    // A second init (tests, embedding binaries) is harmless
    let _ = env_logger::try_init();
}

/// Log an informational message
pub fn log_info(message: &str) {
    info!("{}", message);
}

/// Log a debug message
pub fn log_debug(message: &str) {
    debug!("{}", message);
}

/// Log a warning message
pub fn log_warning(message: &str) {
    warn!("{}", message);
}

/// Log an error message
pub fn log_error(message: &str) {
    error!("{}", message);
}

/// Log the remote endpoints an operation will talk to
pub fn log_endpoint_details(network: &str, explorer_url: &str, prover_url: &str) {
    info!(
        "Endpoints for {}: explorer={} prover={}",
        network, explorer_url, prover_url
    );
}
