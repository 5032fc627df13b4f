//! `strand io`: write, read back and verify one scratch file per task.

use crate::output::StyledOutput;
use anyhow::Context;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use strand_core::{OpenOptions, RawFd, Scheduler, SchedulerConfig, TaskContext};

/// Chunk size for each read and write request
const CHUNK: usize = 1024;

pub fn execute(
    config: SchedulerConfig,
    tasks: usize,
    bytes: usize,
    dir: Option<PathBuf>,
    keep: bool,
    out: &mut StyledOutput,
) -> anyhow::Result<()> {
    let owned_dir = dir.is_none();
    let dir = dir.unwrap_or_else(|| {
        std::env::temp_dir().join(format!("strand-io-{}", std::process::id()))
    });
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let failures = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut scheduler = Scheduler::init(config)?;
    for i in 0..tasks {
        let path = dir.join(format!("task-{}.dat", i));
        let failures = failures.clone();
        scheduler.create(move |cx| {
            if let Err(e) = round_trip(cx, &path, i, bytes) {
                log::error!("{}: {}", path.display(), e);
                failures.fetch_add(1, Ordering::Relaxed);
            }
        })?;
    }
    scheduler.shutdown()?;
    let elapsed = start.elapsed();

    if owned_dir && !keep {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            log::warn!("failed to remove {}: {}", dir.display(), e);
        }
    }

    let failed = failures.load(Ordering::Relaxed);
    anyhow::ensure!(failed == 0, "{} of {} tasks failed verification", failed, tasks);

    out.success(&format!("{} tasks verified {} bytes each", tasks, bytes));
    super::print_stats(out, &scheduler.stats());
    out.field("elapsed", format!("{:.2?}", elapsed));
    if keep || !owned_dir {
        out.field("files", dir.display());
    }
    Ok(())
}

fn pattern(task: usize, len: usize) -> Vec<u8> {
    (0..len).map(|j| b'a' + ((task + j) % 26) as u8).collect()
}

fn round_trip(
    cx: &TaskContext,
    path: &std::path::Path,
    task: usize,
    bytes: usize,
) -> std::io::Result<()> {
    let options = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644);
    let fd = cx.open_with(path, &options)?;

    let expected = pattern(task, bytes);
    let result = write_and_read_back(cx, fd, &expected);
    cx.close(fd)?;
    let actual = result?;

    if actual != expected {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("read back {} bytes that do not match", actual.len()),
        ));
    }
    Ok(())
}

fn write_and_read_back(
    cx: &TaskContext,
    fd: RawFd,
    expected: &[u8],
) -> std::io::Result<Vec<u8>> {
    for chunk in expected.chunks(CHUNK) {
        let mut written = 0;
        while written < chunk.len() {
            // write() zeroes its buffer, so each attempt gets a fresh copy.
            let mut pending = chunk[written..].to_vec();
            written += cx.write(fd, &mut pending)?;
        }
        cx.yield_now();
    }

    cx.seek(fd, SeekFrom::Start(0))?;
    let mut actual = Vec::with_capacity(expected.len());
    let mut buf = [0u8; CHUNK];
    loop {
        let n = cx.read(fd, &mut buf)?;
        if n == 0 {
            break;
        }
        actual.extend_from_slice(&buf[..n]);
    }
    Ok(actual)
}
