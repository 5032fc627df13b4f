//! CLI subcommands

pub mod cat;
pub mod info;
pub mod io_load;
pub mod yield_load;

use crate::output::StyledOutput;
use strand_core::SchedulerStats;

/// Print the counters every workload reports
pub fn print_stats(out: &mut StyledOutput, stats: &SchedulerStats) {
    out.heading("Scheduler:");
    out.field("tasks created", stats.tasks_created);
    out.field("tasks completed", stats.tasks_completed);
    if stats.tasks_panicked > 0 {
        out.field("tasks panicked", stats.tasks_panicked);
    }
    out.field("yields", stats.yields);
    out.field("io requests", stats.io_requests);
}
