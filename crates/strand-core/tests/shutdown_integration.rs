//! Integration tests for the drain-then-stop shutdown protocol

use parking_lot::Mutex;
use std::ffi::CString;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strand_core::{OpenOptions, Scheduler, SchedulerConfig, StrandError};

fn make_fifo(path: &Path) {
    let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
    // SAFETY: c_path is a valid NUL-terminated string.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    assert_eq!(rc, 0, "mkfifo failed: {}", std::io::Error::last_os_error());
}

#[test]
fn test_shutdown_drains_pending_open() {
    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("drain.fifo");
    make_fifo(&fifo);

    let mut scheduler = Scheduler::init(SchedulerConfig::default()).unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let sink = received.clone();
    let task_fifo = fifo.clone();
    scheduler
        .create(move |cx| {
            // Blocks the I/O executor until a writer shows up.
            let fd = cx
                .open_with(&task_fifo, &OpenOptions::new().read(true))
                .unwrap();
            let mut buf = [0u8; 64];
            loop {
                let n = cx.read(fd, &mut buf).unwrap();
                if n == 0 {
                    break;
                }
                sink.lock().extend_from_slice(&buf[..n]);
            }
            cx.close(fd).unwrap();
        })
        .unwrap();

    // The open is in flight once the task has been handed to the I/O
    // executor.
    let deadline = Instant::now() + Duration::from_secs(10);
    while scheduler.stats().io_requests == 0 {
        assert!(Instant::now() < deadline, "open never reached the I/O executor");
        std::thread::sleep(Duration::from_millis(1));
    }

    let stopper = std::thread::spawn(move || {
        scheduler.shutdown().unwrap();
        scheduler
    });

    // Shutdown has begun but cannot finish while the open is pending.
    std::thread::sleep(Duration::from_millis(50));
    assert!(!stopper.is_finished());

    let mut writer = std::fs::OpenOptions::new().write(true).open(&fifo).unwrap();
    writer.write_all(b"after shutdown").unwrap();
    drop(writer);

    let scheduler = stopper.join().unwrap();
    assert_eq!(received.lock().as_slice(), b"after shutdown");

    let stats = scheduler.stats();
    assert_eq!(stats.tasks_completed, 1);
    assert_eq!(stats.tasks_panicked, 0);
}

#[test]
fn test_shutdown_waits_for_long_running_tasks() {
    let config = SchedulerConfig::default().with_compute_workers(2);
    let mut scheduler = Scheduler::init(config).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..4 {
        let done = done.clone();
        scheduler
            .create(move |cx| {
                for _ in 0..5 {
                    std::thread::sleep(Duration::from_millis(2));
                    cx.yield_now();
                }
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    scheduler.shutdown().unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 4);
}

#[test]
fn test_shutdown_with_no_tasks() {
    for workers in [1, 2] {
        let config = SchedulerConfig::default().with_compute_workers(workers);
        let mut scheduler = Scheduler::init(config).unwrap();
        scheduler.shutdown().unwrap();
        assert_eq!(scheduler.stats().tasks_created, 0);
    }
}

#[test]
fn test_usage_errors_after_shutdown() {
    let mut scheduler = Scheduler::init(SchedulerConfig::default()).unwrap();
    scheduler.shutdown().unwrap();

    assert!(matches!(scheduler.create(|_| {}), Err(StrandError::ShutDown)));
    assert!(matches!(scheduler.shutdown(), Err(StrandError::ShutDown)));
}

#[test]
fn test_wait_idle_then_reuse() {
    let mut scheduler = Scheduler::init(SchedulerConfig::default()).unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    for batch in 0..3 {
        for _ in 0..10 {
            let done = done.clone();
            scheduler
                .create(move |cx| {
                    cx.yield_now();
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert!(scheduler.wait_idle(Duration::from_secs(10)));
        assert_eq!(done.load(Ordering::SeqCst), (batch + 1) * 10);
        assert_eq!(scheduler.live_tasks(), 0);
    }

    scheduler.shutdown().unwrap();
}

#[test]
fn test_dropping_scheduler_drains() {
    let done = Arc::new(AtomicUsize::new(0));
    {
        let config = SchedulerConfig::default().with_compute_workers(2);
        let scheduler = Scheduler::init(config).unwrap();
        for _ in 0..8 {
            let done = done.clone();
            scheduler
                .create(move |cx| {
                    cx.yield_now();
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
    }
    assert_eq!(done.load(Ordering::SeqCst), 8);
}
