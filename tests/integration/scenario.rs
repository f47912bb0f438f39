//! End-to-end scope and callback flows

use std::sync::Arc;

use parking_lot::Mutex;
use uibridge::runtime::registry;
use uibridge::runtime::scope::{ApiEvent, ApiOp};
use uibridge::{
    install_default_api, Element, ElementRef, Handle, HandleScope, NativeValue, RecordingApi,
    SharedApi, Value,
};

const BODY: Handle = Handle::from_raw(0xAAAA);

#[test]
fn test_nested_scope_scenario() {
    let api = RecordingApi::shared();
    let shared: SharedApi = api.clone();
    install_default_api(shared);

    let s1 = HandleScope::open();
    let from_s1 = Element::wrap(BODY).unwrap();
    assert_eq!(api.use_count(BODY), 1);

    let s2 = HandleScope::open();
    let from_s2 = Element::wrap(BODY).unwrap();
    assert_eq!(api.use_count(BODY), 1);
    assert!(from_s2.ptr_eq(&from_s1));

    s2.close().unwrap();
    assert_eq!(api.unuse_count(BODY), 0);
    assert!(!from_s1.is_dropped());

    s1.close().unwrap();
    assert_eq!(api.unuse_count(BODY), 1);
    assert_eq!(
        api.events(),
        vec![
            ApiEvent {
                op: ApiOp::Use,
                handle: BODY
            },
            ApiEvent {
                op: ApiOp::Unuse,
                handle: BODY
            },
        ]
    );
}

/// A control living on the Rust side, reachable from engine callbacks
struct Button {
    element: ElementRef,
    clicks: Mutex<Vec<NativeValue>>,
}

impl Button {
    fn on_click(
        &self,
        args: &[Value],
    ) -> uibridge::Result<()> {
        HandleScope::scoped(|| {
            let element = self.element.element()?;
            assert_eq!(element.handle(), self.element.handle());
            self.clicks.lock().extend(Value::to_natives(args));
            Ok(())
        })
    }
}

#[test]
fn test_control_callback_flow() {
    let api = RecordingApi::shared();
    let button_handle = Handle::from_raw(0xB0B0);

    let button = HandleScope::scoped_with(api.clone(), || {
        let element = Element::wrap(button_handle)?;
        Ok(Arc::new(Button {
            element: ElementRef::new(&element)?,
            clicks: Mutex::new(Vec::new()),
        }))
    })
    .unwrap();
    assert_eq!(api.live_refs(button_handle), 1);

    let cookie = registry::protect(&button);

    // the engine calls back with the cookie and an argument vector
    let args = Value::from_natives(&[NativeValue::Int(1), NativeValue::from("left")]);
    let scope = HandleScope::open_with(api.clone());
    registry::dispatch(cookie, |b: &Button| b.on_click(&args)).unwrap();
    scope.close().unwrap();

    assert_eq!(
        *button.clicks.lock(),
        vec![NativeValue::Int(1), NativeValue::from("left")]
    );

    drop(button);
    assert_eq!(api.live_refs(button_handle), 0);
    assert!(registry::resolve::<Button>(cookie).unwrap().is_none());
}

#[test]
fn test_large_selection_released() {
    let api = RecordingApi::shared();
    let selection: Vec<Handle> = (1..=100).map(|n| Handle::from_raw(n * 8)).collect();

    let owned = HandleScope::scoped_with(api.clone(), || {
        for &h in &selection {
            Element::wrap(h)?;
        }
        Ok(selection.len())
    })
    .unwrap();

    assert_eq!(owned, 100);
    assert_eq!(api.total_live(), 0);
    for &h in &selection {
        assert_eq!(api.use_count(h), 1);
        assert_eq!(api.unuse_count(h), 1);
    }
}
