//! `strand info`: Display the effective configuration and environment.

use crate::output::StyledOutput;
use std::path::Path;
use strand_core::SchedulerConfig;

pub fn execute(
    config: &SchedulerConfig,
    config_path: Option<&Path>,
    out: &mut StyledOutput,
) -> anyhow::Result<()> {
    out.heading(&format!("strand v{}", env!("CARGO_PKG_VERSION")));
    out.field(
        "platform",
        format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH),
    );
    out.field(
        "config file",
        config_path.map_or_else(|| "(none)".to_string(), |p| p.display().to_string()),
    );
    println!();

    out.heading("Scheduler:");
    out.field("compute workers", config.compute_workers);
    out.field("io workers", 1);
    out.field("stack size", format!("{} bytes", config.stack_size));
    out.field(
        "max tasks",
        config
            .max_tasks
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string()),
    );
    out.field("idle", format!("{:?}", config.idle).to_lowercase());
    out.field("idle backoff", format!("{:?}", config.idle_backoff()));
    println!();

    out.heading("Environment:");
    for var in ["STRAND_CONFIG", "STRAND_COMPUTE_WORKERS", "STRAND_LOG", "NO_COLOR"] {
        match std::env::var(var) {
            Ok(val) => out.field(var, val),
            Err(_) => out.field(var, "(default)"),
        }
    }

    Ok(())
}
