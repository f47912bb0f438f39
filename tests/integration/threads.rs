//! Behaviour across threads

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use uibridge::runtime::registry::{self, Cookie};
use uibridge::{Element, Handle, HandleScope, InstanceRegistry, RecordingApi, SharedApi};

#[test]
fn test_independent_stacks_per_thread() {
    let api = RecordingApi::shared();
    let shared: SharedApi = api.clone();

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let shared = shared.clone();
            thread::spawn(move || {
                let outer = HandleScope::open_with(shared);
                let common = Element::wrap(Handle::from_raw(0xC0DE)).unwrap();
                for n in 0..10 {
                    let inner = HandleScope::open();
                    assert!(Element::wrap(Handle::from_raw(0xC0DE)).unwrap().ptr_eq(&common));
                    Element::wrap(Handle::from_raw(0x1_0000 * (t + 1) + n)).unwrap();
                    inner.close().unwrap();
                }
                assert_eq!(HandleScope::depth(), 1);
                outer.close().unwrap();
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(api.use_count(Handle::from_raw(0xC0DE)), 4);
    assert_eq!(api.total_live(), 0);
}

struct Renderer {
    frames: AtomicUsize,
}

extern "C" fn on_frame(cookie: u64) -> i32 {
    let Some(cookie) = Cookie::from_raw(cookie) else {
        return -1;
    };
    registry::dispatch(cookie, |r: &Renderer| r.frames.fetch_add(1, Ordering::SeqCst)) as i32
}

#[test]
fn test_callback_from_render_thread() {
    let renderer = Arc::new(Renderer {
        frames: AtomicUsize::new(0),
    });
    let raw = registry::protect(&renderer).as_raw();

    let render_thread = thread::spawn(move || (0..5).map(|_| on_frame(raw)).collect::<Vec<_>>());
    assert_eq!(render_thread.join().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(renderer.frames.load(Ordering::SeqCst), 5);
    assert_eq!(on_frame(0), -1);
}

#[test]
fn test_registry_under_contention() {
    let registry = Arc::new(InstanceRegistry::new());
    let keep: Vec<Arc<usize>> = (0..8).map(Arc::new).collect();

    let workers: Vec<_> = keep
        .iter()
        .cloned()
        .map(|instance| {
            let registry = registry.clone();
            thread::spawn(move || {
                let cookie = registry.protect(&instance);
                for n in 0..50 {
                    let temporary = Arc::new(n);
                    registry.protect(&temporary);
                    assert_eq!(registry.protect(&instance), cookie);
                    let resolved = registry.resolve::<usize>(cookie).unwrap().unwrap();
                    assert!(Arc::ptr_eq(&resolved, &instance));
                }
                cookie
            })
        })
        .collect();

    let cookies: Vec<Cookie> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    registry.sweep();

    assert_eq!(registry.len(), keep.len());
    for (cookie, instance) in cookies.iter().zip(&keep) {
        let resolved = registry.resolve::<usize>(*cookie).unwrap().unwrap();
        assert!(Arc::ptr_eq(&resolved, instance));
    }
}
