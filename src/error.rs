// Fatal error reporting
//
// Environment errors (no usable GPU, no matching memory type, missing
// validation layer) and GPU calls failing outside the success / suboptimal /
// out-of-date set cannot be recovered at runtime. They end the process.

/// Log the full error chain and abort the process.
pub fn fatal(err: anyhow::Error) -> ! {
    log::error!("Fatal renderer error: {:?}", err);
    std::process::abort()
}
