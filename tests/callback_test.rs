use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use v8js::{Context, Error};

#[test]
fn test_echo_returns_first_argument() {
    let ctx = Context::new();
    let echo = ctx
        .new_function(|info| Ok(info.get_arg(0).duplicate()))
        .unwrap();

    let global = ctx.global().unwrap();
    global.set("echo", echo.consume()).unwrap();

    let result = ctx.run_script("echo(42)", "echo.js").unwrap();
    assert_eq!(result.int32(), 42);

    let none = ctx.run_script("echo()", "echo.js").unwrap();
    assert!(none.is_null());
}

#[test]
fn test_host_call_from_rust() {
    let ctx = Context::new();
    let double = ctx
        .new_function(|info| Ok(info.context().new_int32(info.get_arg(0).int32() * 2)))
        .unwrap();

    let result = double
        .call(&ctx.undefined_value(), [ctx.new_int32(21).unwrap().consume()])
        .unwrap();
    assert_eq!(result.int32(), 42);
}

#[test]
fn test_receiver_is_this() {
    let ctx = Context::new();
    let object = ctx.new_object().unwrap();
    object.set("name", ctx.new_string("box").unwrap().consume()).unwrap();
    object
        .set_object_method("describe", |info| {
            let name = info.this().get("name")?.string();
            Ok(info.context().new_string(&format!("I am {name}")))
        })
        .unwrap();

    let result = object.method_call("describe", []).unwrap();
    assert_eq!(result.string(), "I am box");
}

#[test]
fn test_nested_script_calls() {
    let ctx = Context::new();
    let global = ctx.global().unwrap();

    global
        .set_object_method("viaScript", |info| {
            let inner = info.get_arg(0).int32();
            let result = info
                .context()
                .run_script(&format!("{inner} + 1"), "nested.js")?;
            Ok(Some(result))
        })
        .unwrap();

    let result = ctx
        .run_script("viaScript(viaScript(1))", "outer.js")
        .unwrap();
    assert_eq!(result.int32(), 3);
}

#[test]
fn test_closure_state() {
    let ctx = Context::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let global = ctx.global().unwrap();
    global
        .set_object_method("tick", move |info| {
            let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(info.context().new_int32(count as i32))
        })
        .unwrap();

    let last = ctx
        .run_script("tick(); tick(); tick()", "tick.js")
        .unwrap();

    assert_eq!(last.int32(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_error_from_handler_is_catchable() {
    let ctx = Context::new();
    let global = ctx.global().unwrap();
    global
        .set_object_method("strict", |info| {
            if info.is_empty() {
                return Err(Error::host("strict() needs an argument"));
            }
            Ok(None)
        })
        .unwrap();

    let message = ctx
        .run_script("try { strict() } catch (e) { e.message }", "strict.js")
        .unwrap();
    assert_eq!(message.string(), "strict() needs an argument");

    let err = ctx.run_script("strict()", "uncaught.js").unwrap_err();
    assert!(matches!(err, Error::Exception(ref m) if m.contains("needs an argument")));
}

#[test]
fn test_reusable_function_shared_by_objects() {
    let ctx = Context::new();
    let method = ctx
        .new_function(|info| Ok(info.this().get("n").ok()))
        .unwrap()
        .into_reusable();

    let mut objects = Vec::new();
    for n in 0..3 {
        let object = ctx.new_object().unwrap();
        object.set("n", ctx.new_int32(n).unwrap().consume()).unwrap();
        object.set("read", method.consume()).unwrap();
        objects.push(object);
    }

    for (n, object) in objects.iter().enumerate() {
        assert_eq!(object.method_call("read", []).unwrap().int32(), n as i32);
    }

    method.dispose();
    assert_eq!(objects[2].method_call("read", []).unwrap().int32(), 2);
}

#[test]
fn test_close_from_inside_a_callback() {
    let ctx = Context::new();
    let inside = Arc::new(parking_lot::Mutex::new(None));
    let slot = inside.clone();

    let global = ctx.global().unwrap();
    global
        .set_object_method("shutdown", move |info| {
            let ctx = info.context();
            let value = ctx.new_string("made inside");
            ctx.close();

            // Teardown waits for the outermost call to return
            *slot.lock() = Some((value, ctx.is_closed(), ctx.new_int32(1).is_some()));
            Ok(None)
        })
        .unwrap();

    let result = ctx.run_script("shutdown(); while (true) {}", "shutdown.js");
    assert!(matches!(result, Err(Error::Terminated)), "{result:?}");
    assert!(ctx.is_closed());

    let (value, closed_inside, usable_inside) = inside.lock().take().unwrap();
    assert!(!closed_inside);
    assert!(usable_inside);

    let value = value.unwrap();
    assert_eq!(value.string(), "");
    assert!(!value.is_string());
    assert!(matches!(ctx.run_script("1", "late.js"), Err(Error::ContextClosed)));
}
