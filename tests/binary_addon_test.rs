use std::sync::Arc;

use v8js::Context;
use v8js::addons::BinaryAddon;
use v8js::plugin::{Initializer, PluginOptions};

fn context_with_addon() -> Context {
    let ctx = Context::new();
    let global = ctx.global().unwrap();
    global
        .set("Binary", BinaryAddon::new().convert(&ctx).unwrap().consume())
        .unwrap();
    ctx
}

#[test]
fn test_digests() {
    let ctx = context_with_addon();
    let data = "new Uint8Array([97, 98, 99])";

    let cases = [
        ("Md5Sum", "900150983cd24fb0d6963f7d28e17f72"),
        ("Sha1Sum", "a9993e364706816aba3e25717850c26c9cd0d89d"),
        (
            "Sha256Sum",
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        ),
        (
            "Sha512Sum",
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f",
        ),
    ];

    for (method, expected) in cases {
        let sum = ctx
            .run_script(&format!("Binary.{method}({data})"), "digest.js")
            .unwrap();
        assert_eq!(sum.string(), expected, "{method}");
    }
}

#[test]
fn test_digest_of_array_buffer() {
    let ctx = context_with_addon();

    let sum = ctx
        .run_script("Binary.Md5Sum(new ArrayBuffer(0))", "empty.js")
        .unwrap();
    assert_eq!(sum.string(), "d41d8cd98f00b204e9800998ecf8427e");
}

#[test]
fn test_base64() {
    let ctx = context_with_addon();

    let encoded = ctx
        .run_script(
            "Binary.Base64Encode(Uint8Array.from('hello world', (c) => c.charCodeAt(0)))",
            "encode.js",
        )
        .unwrap();
    assert_eq!(encoded.string(), "aGVsbG8gd29ybGQ=");

    let decoded = ctx
        .run_script("Binary.Base64Decode('aGVsbG8gd29ybGQ=')", "decode.js")
        .unwrap();
    assert!(decoded.is_array_buffer());
    assert_eq!(decoded.array_buffer_content().unwrap(), b"hello world");
}

#[test]
fn test_binary_module_in_plugin() {
    let mut initializer = Initializer::new();
    initializer.modules.push(Arc::new(BinaryAddon::module("Binary")));

    let mut plugin = initializer.create_plugin(PluginOptions::default());
    plugin.launch().unwrap();

    let sum = plugin
        .runtime()
        .unwrap()
        .run_script("Binary.Sha1Sum(new Uint8Array([]))", "plugin.js")
        .unwrap();
    assert_eq!(sum.string(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");

    plugin.close().unwrap().join().unwrap();
}
