//! Store lock behavior across concurrent sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use grokctx::config::Config;
use grokctx::lock::{LockMode, StoreLock};
use grokctx::session::Session;
use grokctx_core::testing::{MockProvider, WhitespaceTokenizer};
use tempfile::TempDir;

const READERS: usize = 5;

#[test]
fn test_readers_hold_shared_lock_together() {
    let tmp = TempDir::new().unwrap();
    let store = tmp.path().join(".grok");
    let barrier = Arc::new(Barrier::new(READERS));
    let (tx, rx) = mpsc::channel();

    for _ in 0..READERS {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        let tx = tx.clone();
        thread::spawn(move || {
            let _lock = StoreLock::acquire(&store, LockMode::Shared).unwrap();
            // every reader must hold the lock before any of them proceeds
            barrier.wait();
            tx.send(()).unwrap();
        });
    }

    for _ in 0..READERS {
        rx.recv_timeout(Duration::from_secs(10))
            .expect("shared locks were serialized");
    }
}

#[test]
fn test_writer_blocks_readers_until_released() {
    let tmp = TempDir::new().unwrap();
    let store = tmp.path().join(".grok");
    let writer = StoreLock::acquire(&store, LockMode::Exclusive).unwrap();
    let acquired = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = store.clone();
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let _lock = StoreLock::acquire(&store, LockMode::Shared).unwrap();
            acquired.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(200));
    assert!(!acquired.load(Ordering::SeqCst), "reader got in while writer held the lock");
    drop(writer);
    reader.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_reader_session_blocks_writer_session() {
    let tmp = TempDir::new().unwrap();
    let cfg = Config::minimal();
    let path = Session::init(tmp.path(), &cfg, Arc::new(WhitespaceTokenizer)).unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let provider = MockProvider::new();
    let reader = rt
        .block_on(Session::open(
            &path,
            LockMode::Shared,
            &cfg,
            Arc::new(WhitespaceTokenizer),
            &provider,
        ))
        .unwrap();

    let opened = Arc::new(AtomicBool::new(false));
    let writer = {
        let path = path.clone();
        let cfg = cfg.clone();
        let opened = Arc::clone(&opened);
        thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let provider = MockProvider::new();
            let session = rt
                .block_on(Session::open(
                    &path,
                    LockMode::Exclusive,
                    &cfg,
                    Arc::new(WhitespaceTokenizer),
                    &provider,
                ))
                .unwrap();
            opened.store(true, Ordering::SeqCst);
            session.save().unwrap();
        })
    };

    thread::sleep(Duration::from_millis(200));
    assert!(!opened.load(Ordering::SeqCst), "writer opened while a reader held the store");
    drop(reader);
    writer.join().unwrap();
    assert!(opened.load(Ordering::SeqCst));
}

#[test]
fn test_waiting_open_leaves_runtime_responsive() {
    let tmp = TempDir::new().unwrap();
    let cfg = Config::minimal();
    let path = Session::init(tmp.path(), &cfg, Arc::new(WhitespaceTokenizer)).unwrap();
    let held = StoreLock::acquire(&path, LockMode::Exclusive).unwrap();
    let (tx, rx) = mpsc::channel();

    let writer = thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let provider = MockProvider::new();
            let open = Session::open(&path, LockMode::Exclusive, &cfg, Arc::new(WhitespaceTokenizer), &provider);
            tokio::pin!(open);
            // a timer on the same single-threaded runtime still fires
            tokio::select! {
                _ = &mut open => panic!("writer opened while the lock was held"),
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
            tx.send(()).unwrap();
            open.await.unwrap();
        });
    });

    rx.recv_timeout(Duration::from_secs(10))
        .expect("waiting for the lock blocked the runtime");
    drop(held);
    writer.join().unwrap();
}
