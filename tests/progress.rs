//! Progress reporters.

use ironshard::progress::{CountingProgress, LogProgress, NoProgress, ProgressReporter};

#[test]
fn log_progress_reports_once_per_stride() {
    let progress = LogProgress::new(10);
    progress.start("train", Some(35));
    progress.advance(4);
    assert_eq!(progress.reports(), 0);
    progress.advance(6);
    assert_eq!(progress.reports(), 1);
    // one jump over two boundaries logs a single line
    progress.advance(15);
    assert_eq!(progress.reports(), 2);
    progress.advance(10);
    assert_eq!(progress.done(), 35);
    assert_eq!(progress.reports(), 3);
    progress.finish();
    assert_eq!(progress.reports(), 4);

    progress.start("val", None);
    assert_eq!((progress.done(), progress.reports()), (0, 0));
    progress.advance(9);
    progress.finish();
    assert_eq!(progress.reports(), 1);
}

#[test]
fn zero_stride_reports_every_advance() {
    let progress = LogProgress::new(0);
    progress.start("x", None);
    for _ in 0..3 {
        progress.advance(1);
    }
    assert_eq!(progress.reports(), 3);
}

#[test]
fn counting_progress_tallies_across_clones() {
    let progress = CountingProgress::new();
    let handle = progress.clone();
    handle.start("train", Some(5));
    handle.advance(2);
    handle.advance(3);
    handle.finish();
    let state = progress.snapshot();
    assert_eq!(state.started, vec![("train".to_string(), Some(5))]);
    assert_eq!((state.advanced, state.finished), (5, 1));

    NoProgress.start("ignored", None);
    NoProgress.advance(1);
    NoProgress.finish();
}
