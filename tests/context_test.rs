use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use v8js::{Context, ContextOptions, Error};

#[test]
fn test_close_is_idempotent() {
    let ctx = Context::new();
    assert!(!ctx.is_closed());

    ctx.close();
    ctx.close();

    assert!(ctx.is_closed());
    assert!(ctx.global().is_none());
    assert!(matches!(
        ctx.run_script("1", "closed.js"),
        Err(Error::ContextClosed)
    ));
}

#[test]
fn test_constructors_return_none_after_close() {
    let ctx = Context::new();
    ctx.close();

    assert!(ctx.new_string("s").is_none());
    assert!(ctx.new_int32(1).is_none());
    assert!(ctx.new_int64(1).is_none());
    assert!(ctx.new_number(1.0).is_none());
    assert!(ctx.new_boolean(true).is_none());
    assert!(ctx.new_big_int(1).is_none());
    assert!(ctx.new_object().is_none());
    assert!(ctx.new_array_buffer(vec![1u8]).is_none());
    assert!(ctx.new_function(|_| Ok(None)).is_none());
    assert!(ctx.new_array([]).is_err());
}

#[test]
fn test_script_errors() {
    let ctx = Context::new();

    let err = ctx.run_script("let = ;", "broken.js").unwrap_err();
    assert!(matches!(err, Error::Compile { ref name, .. } if name == "broken.js"));

    let err = ctx.run_script("throw new Error('bad')", "throw.js").unwrap_err();
    assert!(matches!(err, Error::Exception(ref message) if message.contains("bad")));

    // A failed script leaves the context usable
    assert_eq!(ctx.run_script("6 * 7", "ok.js").unwrap().int32(), 42);
}

#[test]
fn test_global_state_persists_between_scripts() {
    let ctx = Context::new();

    ctx.run_script("globalThis.counter = 1", "init.js").unwrap();
    ctx.run_script("counter += 1", "inc.js").unwrap();

    let global = ctx.global().unwrap();
    assert_eq!(global.get("counter").unwrap().int32(), 2);
}

#[test]
fn test_custom_options() {
    let options = ContextOptions {
        heap_max_mb: 64,
        ..ContextOptions::default()
    };

    let ctx = Context::open(options);
    assert_eq!(ctx.run_script("'ok'", "opts.js").unwrap().string(), "ok");
}

#[test]
fn test_release_from_other_threads_after_close() {
    let ctx = Context::new();
    let values: Vec<_> = (0..64).map(|i| ctx.new_int32(i).unwrap()).collect();

    ctx.close();

    let handles: Vec<_> = values
        .into_iter()
        .map(|mut value| {
            thread::spawn(move || {
                value.release();
                value.release();
                value.is_released()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn test_concurrent_close_and_release() {
    for _ in 0..8 {
        let ctx = Context::new();
        let values: Vec<_> = (0..200)
            .map(|i| ctx.new_string(&format!("value-{i}")).unwrap())
            .collect();

        let barrier = Arc::new(Barrier::new(2));

        let releaser = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for mut value in values {
                    value.release();
                }
            })
        };

        let closer = {
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                ctx.close();
            })
        };

        releaser.join().unwrap();
        closer.join().unwrap();

        assert!(ctx.is_closed());
        assert_eq!(ctx.pending_releases(), 0);
    }
}

#[test]
fn test_operations_from_many_threads_are_serialized() {
    let ctx = Context::new();
    ctx.run_script("globalThis.hits = 0", "init.js").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ctx = ctx.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    ctx.run_script("hits += 1", "hit.js").unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ctx.run_script("hits", "read.js").unwrap().int32(), 200);
}

#[test]
fn test_close_terminates_running_script() {
    let ctx = Context::new();

    let runner = {
        let ctx = ctx.clone();
        thread::spawn(move || ctx.run_script("while (true) {}", "spin.js"))
    };

    thread::sleep(Duration::from_millis(100));
    ctx.close();

    let result = runner.join().unwrap();
    assert!(matches!(result, Err(Error::Terminated)));
    assert!(ctx.is_closed());
}

#[test]
fn test_values_keep_context_alive() {
    let ctx = Context::new();
    let value = ctx.new_string("outlives").unwrap();

    drop(ctx);

    assert!(!value.context().is_closed());
    assert_eq!(value.string(), "outlives");

    value.context().close();
    assert_eq!(value.string(), "");
}

#[test]
fn test_release_while_another_thread_holds_the_context() {
    let ctx = Context::new();
    let value = ctx.new_string("dropped elsewhere").unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let global = ctx.global().unwrap();
    let gate = barrier.clone();
    global
        .set_object_method("pause", move |_| {
            gate.wait(); // inside the engine
            gate.wait(); // value dropped
            Ok(None)
        })
        .unwrap();

    let dropper = {
        let ctx = ctx.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            drop(value);
            let pending = ctx.pending_releases();
            barrier.wait();
            pending
        })
    };

    ctx.run_script("pause()", "pause.js").unwrap();
    assert_eq!(dropper.join().unwrap(), 1);
    assert_eq!(ctx.pending_releases(), 1);

    // The next entry drains the queue
    assert_eq!(ctx.run_script("1 + 1", "drain.js").unwrap().int32(), 2);
    assert_eq!(ctx.pending_releases(), 0);
}
