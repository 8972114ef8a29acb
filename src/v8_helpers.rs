//! Byte buffer helpers shared by value construction and extraction.

/// An ArrayBuffer holding `bytes`.
///
/// Without the sandbox the backing store adopts the Rust allocation. With it,
/// V8 owns all buffer memory and the bytes are copied in.
pub fn array_buffer_from_bytes<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    bytes: Vec<u8>,
) -> v8::Local<'s, v8::ArrayBuffer> {
    if bytes.is_empty() {
        return v8::ArrayBuffer::new(scope, 0);
    }

    adopt_bytes(scope, bytes)
}

#[cfg(not(feature = "sandbox"))]
fn adopt_bytes<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    bytes: Vec<u8>,
) -> v8::Local<'s, v8::ArrayBuffer> {
    let store = v8::ArrayBuffer::new_backing_store_from_vec(bytes).make_shared();
    v8::ArrayBuffer::with_backing_store(scope, &store)
}

#[cfg(feature = "sandbox")]
fn adopt_bytes<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    bytes: Vec<u8>,
) -> v8::Local<'s, v8::ArrayBuffer> {
    let buffer = v8::ArrayBuffer::new(scope, bytes.len());
    let store = buffer.get_backing_store();

    if let Some(data) = store.data() {
        // SAFETY: fresh buffer of bytes.len() bytes, not yet reachable from script
        let dest = unsafe { std::slice::from_raw_parts_mut(data.as_ptr() as *mut u8, bytes.len()) };
        dest.copy_from_slice(&bytes);
    }

    buffer
}

/// Copies the bytes of an ArrayBuffer or any ArrayBuffer view.
///
/// Returns `None` for every other kind of value.
pub fn copy_buffer_contents(
    scope: &v8::PinScope<'_, '_>,
    value: v8::Local<'_, v8::Value>,
) -> Option<Vec<u8>> {
    if let Ok(view) = v8::Local::<v8::ArrayBufferView>::try_from(value) {
        let mut bytes = vec![0u8; view.byte_length()];
        view.copy_contents(&mut bytes);
        return Some(bytes);
    }

    let buffer = v8::Local::<v8::ArrayBuffer>::try_from(value).ok()?;
    let len = buffer.byte_length();

    if len == 0 {
        return Some(Vec::new());
    }

    let view = v8::Uint8Array::new(scope, buffer, 0, len)?;
    let mut bytes = vec![0u8; len];
    view.copy_contents(&mut bytes);
    Some(bytes)
}
