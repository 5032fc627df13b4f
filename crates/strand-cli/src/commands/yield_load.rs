//! `strand yield`: cooperative switching throughput.

use crate::output::StyledOutput;
use std::time::Instant;
use strand_core::{Scheduler, SchedulerConfig};

pub fn execute(
    config: SchedulerConfig,
    tasks: usize,
    yields: usize,
    out: &mut StyledOutput,
) -> anyhow::Result<()> {
    let workers = config.compute_workers;
    let start = Instant::now();

    let mut scheduler = Scheduler::init(config)?;
    for _ in 0..tasks {
        scheduler.create(move |cx| {
            for _ in 0..yields {
                cx.yield_now();
            }
        })?;
    }
    scheduler.shutdown()?;

    let elapsed = start.elapsed();
    let stats = scheduler.stats();
    anyhow::ensure!(
        stats.tasks_completed == tasks as u64,
        "{} of {} tasks completed",
        stats.tasks_completed,
        tasks
    );

    out.success(&format!(
        "{} tasks x {} yields on {} compute worker(s)",
        tasks, yields, workers
    ));
    super::print_stats(out, &stats);
    out.field("elapsed", format!("{:.2?}", elapsed));
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        out.field("yields/sec", format!("{:.0}", stats.yields as f64 / secs));
    }
    Ok(())
}
