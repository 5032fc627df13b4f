//! `strand cat`: concurrent reads through the I/O executor.
//!
//! One task per file; output is printed in argument order once every task
//! has finished.

use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strand_core::{OpenOptions, Scheduler, SchedulerConfig, TaskContext};

const READ_CHUNK: usize = 8192;

type Slot = Option<io::Result<Vec<u8>>>;

pub fn execute(config: SchedulerConfig, files: Vec<PathBuf>) -> anyhow::Result<()> {
    let slots: Arc<Mutex<Vec<Slot>>> = Arc::new(Mutex::new(
        std::iter::repeat_with(|| None).take(files.len()).collect(),
    ));

    let mut scheduler = Scheduler::init(config)?;
    for (index, path) in files.iter().cloned().enumerate() {
        let slots = slots.clone();
        scheduler.create(move |cx| {
            let contents = read_all(cx, &path);
            slots.lock()[index] = Some(contents);
        })?;
    }
    scheduler.shutdown()?;

    let slots = std::mem::take(&mut *slots.lock());
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let mut failed = 0;

    for (path, slot) in files.iter().zip(slots) {
        match slot {
            Some(Ok(contents)) => stdout.write_all(&contents)?,
            Some(Err(e)) => {
                failed += 1;
                eprintln!("strand: {}: {}", path.display(), e);
            }
            None => {
                failed += 1;
                eprintln!("strand: {}: task did not finish", path.display());
            }
        }
    }
    stdout.flush()?;

    anyhow::ensure!(failed == 0, "{} of {} files could not be read", failed, files.len());
    Ok(())
}

fn read_all(cx: &TaskContext, path: &Path) -> io::Result<Vec<u8>> {
    let fd = cx.open_with(path, &OpenOptions::new().read(true))?;
    let mut contents = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];

    let result = loop {
        match cx.read(fd, &mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => contents.extend_from_slice(&buf[..n]),
            Err(e) => break Err(e),
        }
    };

    cx.close(fd)?;
    result.map(|()| contents)
}
