use std::sync::Arc;

use parking_lot::Mutex;
use v8js::Error;
use v8js::plugin::{Initializer, Module, Phase, PluginOptions};

fn recorder(log: &Arc<Mutex<Vec<String>>>, phase: &'static str, name: &'static str) -> Module {
    let log_init = log.clone();
    let log_boot = log.clone();
    let log_close = log.clone();

    Module::new(name)
        .on_init(move |_| {
            log_init.lock().push(format!("{phase}:init:{name}"));
            Ok(())
        })
        .on_boot(move |_| {
            log_boot.lock().push(format!("{phase}:boot:{name}"));
            Ok(())
        })
        .on_close(move |_| {
            log_close.lock().push(format!("{phase}:close:{name}"));
            Ok(())
        })
}

fn phase_entries(log: &Arc<Mutex<Vec<String>>>, kind: &str) -> String {
    log.lock()
        .iter()
        .filter(|entry| entry.contains(&format!(":{kind}:")))
        .map(|entry| entry.rsplit(':').next().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_module_hook_order() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut initializer = Initializer::new();
    for name in ["test1", "test2", "test3"] {
        initializer.modules.push(Arc::new(recorder(&log, "m", name)));
    }

    let mut plugin = initializer.create_plugin(PluginOptions::default());
    plugin.launch().unwrap();

    assert_eq!(phase_entries(&log, "init"), "test1test2test3");
    assert_eq!(phase_entries(&log, "boot"), "test1test2test3");
    assert_eq!(phase_entries(&log, "close"), "");

    plugin.close().unwrap().join().unwrap();

    assert_eq!(phase_entries(&log, "close"), "test3test2test1");
    assert_eq!(plugin.phase(), Phase::Closed);
}

#[test]
fn test_entry_and_start_command() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("main.js"),
        "globalThis.started = false; function start() { started = system.greeting + '!'; }",
    )
    .unwrap();

    let mut initializer = Initializer::new();
    initializer.entry = Some("main.js".to_string());
    initializer.start_command = Some("start()".to_string());
    initializer
        .modules
        .push(Arc::new(Module::new("greeting").on_init(|plugin| {
            let value = plugin
                .runtime()?
                .new_string("hello")
                .ok_or(Error::ContextClosed)?;
            plugin.add_builtin("greeting", value);
            Ok(())
        })));

    let mut plugin = initializer.create_plugin(PluginOptions::new(dir.path()));
    plugin.launch().unwrap();

    let started = plugin
        .runtime()
        .unwrap()
        .run_script("started", "check.js")
        .unwrap();
    assert_eq!(started.string(), "hello!");

    plugin.close().unwrap().join().unwrap();
}

#[test]
fn test_missing_entry_fails_load() {
    let dir = tempfile::tempdir().unwrap();

    let mut initializer = Initializer::new();
    initializer.entry = Some("absent.js".to_string());

    let mut plugin = initializer.create_plugin(PluginOptions::new(dir.path()));
    plugin.init().unwrap();

    assert!(matches!(plugin.load(), Err(Error::Io(_))));
    assert_eq!(plugin.phase(), Phase::Initialized);
}

#[test]
fn test_entry_script_error_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.js"), "throw new Error('no boot')").unwrap();

    let mut initializer = Initializer::new();
    initializer.entry = Some("bad.js".to_string());

    let mut plugin = initializer.create_plugin(PluginOptions::new(dir.path()));
    let err = plugin.launch().unwrap_err();

    assert!(matches!(err, Error::Exception(ref m) if m.contains("no boot")));
}

#[test]
fn test_failing_init_hook_stops_launch() {
    let mut initializer = Initializer::new();
    initializer
        .modules
        .push(Arc::new(Module::new("broken").on_init(|_| Err(Error::host("init failed")))));

    let mut plugin = initializer.create_plugin(PluginOptions::default());

    assert!(matches!(plugin.launch(), Err(Error::Host(ref m)) if m == "init failed"));
    assert_eq!(plugin.phase(), Phase::Created);
}

#[test]
fn test_failing_close_hook_does_not_block_others() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut initializer = Initializer::new();
    initializer.modules.push(Arc::new(recorder(&log, "m", "first")));
    initializer
        .modules
        .push(Arc::new(Module::new("broken").on_close(|_| Err(Error::host("close failed")))));

    let mut plugin = initializer.create_plugin(PluginOptions::default());
    plugin.launch().unwrap();
    plugin.close().unwrap().join().unwrap();

    assert_eq!(phase_entries(&log, "close"), "first");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_async() {
    let mut plugin = Initializer::new().create_plugin(PluginOptions::default());
    plugin.launch().unwrap();

    let runtime = plugin.runtime().unwrap().clone();
    plugin.close_async().unwrap().await.unwrap();

    assert!(runtime.is_closed());
}

#[test]
fn test_close_async_requires_runtime() {
    let mut plugin = Initializer::new().create_plugin(PluginOptions::default());

    assert!(plugin.close_async().is_err());
    assert_eq!(plugin.phase(), Phase::Created);
}
