//! End-to-end scenarios driving the full `Orchestrator` against real
//! temporary directories, mirroring the teacher's integration-style tests
//! for `indexing/scanner.rs` and `indexing/store.rs`.

use std::sync::mpsc;
use std::time::Duration;

use locate_lib::{Orchestrator, QueryMode};
use locate_scanner::ScanConfig;
use locate_watcher::WatchConfig;

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while waited < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(step);
        waited += step;
    }
    cond()
}

fn query_names(orch: &Orchestrator, pattern: &str, mode: QueryMode) -> Vec<String> {
    let (tx, rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();
    orch.query(
        pattern,
        mode,
        false,
        move |_seq, e| tx.send(e.name.clone()).unwrap(),
        move || done_tx.send(()).unwrap(),
    );
    done_rx.recv().unwrap();
    rx.try_iter().collect()
}

#[test]
fn directory_move_in_is_indexed_within_a_couple_seconds() {
    let root = tempfile::tempdir().unwrap();
    let external = tempfile::tempdir().unwrap();
    std::fs::write(external.path().join("one.txt"), b"1").unwrap();
    std::fs::create_dir(external.path().join("nested")).unwrap();
    std::fs::write(external.path().join("nested/two.txt"), b"22").unwrap();

    let orch = Orchestrator::new(ScanConfig::default(), WatchConfig::default());
    orch.add_root(root.path()).unwrap();
    orch.start().unwrap();

    std::fs::rename(external.path(), root.path().join("moved")).unwrap();

    let ok = wait_until(|| orch.status().entry_count == 2, Duration::from_secs(2));
    assert!(ok, "expected both moved-in files to be indexed");

    let hits = query_names(&orch, "two", QueryMode::Substring);
    assert_eq!(hits, vec!["two.txt".to_string()]);

    orch.stop();
}

#[test]
fn query_preemption_lets_the_newer_query_win() {
    let root = tempfile::tempdir().unwrap();
    for i in 0..2000 {
        std::fs::write(root.path().join(format!("f{i}.txt")), b"x").unwrap();
    }

    let orch = Orchestrator::new(ScanConfig::default(), WatchConfig::default());
    orch.add_root(root.path()).unwrap();
    orch.start().unwrap();
    wait_until(|| orch.status().entry_count == 2000, Duration::from_secs(5));

    let first_rows = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let first_rows_clone = std::sync::Arc::clone(&first_rows);
    let (first_done_tx, first_done_rx) = mpsc::channel();
    orch.query(
        "f",
        QueryMode::Substring,
        false,
        move |_seq, _e| {
            first_rows_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::thread::sleep(Duration::from_micros(50));
        },
        move || first_done_tx.send(()).unwrap(),
    );

    let (second_tx, second_rx) = mpsc::channel();
    let (second_done_tx, second_done_rx) = mpsc::channel();
    orch.query(
        "f1",
        QueryMode::Substring,
        false,
        move |_seq, e| second_tx.send(e.name.clone()).unwrap(),
        move || second_done_tx.send(()).unwrap(),
    );

    first_done_rx.recv().unwrap();
    second_done_rx.recv().unwrap();
    let second_hits: Vec<String> = second_rx.try_iter().collect();
    assert!(!second_hits.is_empty());
    assert!(first_rows.load(std::sync::atomic::Ordering::SeqCst) < 2000);

    orch.stop();
}

#[test]
fn root_removal_purges_and_stops_further_updates() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("old.txt"), b"x").unwrap();

    let orch = Orchestrator::new(ScanConfig::default(), WatchConfig::default());
    orch.add_root(root.path()).unwrap();
    orch.start().unwrap();
    wait_until(|| orch.status().entry_count == 1, Duration::from_secs(2));

    assert!(orch.remove_root(root.path()));
    let hits = query_names(&orch, "", QueryMode::Substring);
    assert!(hits.is_empty());

    std::fs::write(root.path().join("after_removal.txt"), b"y").unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(orch.status().entry_count, 0);

    orch.stop();
}
