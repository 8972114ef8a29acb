//! Methods shared by every script request object.
//!
//! Each receives the request named by `this.id`.

use super::HttpAddon;
use super::request::{Request, header, header_fields, header_values};
use crate::addons::{strings, text};
use crate::callback::FunctionCallbackInfo;
use crate::error::Result;
use crate::value::JsValue;

pub(super) type RequestMethod =
    fn(&HttpAddon, &FunctionCallbackInfo, &mut Request) -> Result<Option<JsValue>>;

pub(super) const REQUEST_METHODS: &[(&str, RequestMethod)] = &[
    ("GetID", get_id),
    ("GetURL", get_url),
    ("SetURL", set_url),
    ("GetProxy", get_proxy),
    ("SetProxy", set_proxy),
    ("GetMethod", get_method),
    ("SetMethod", set_method),
    ("GetBody", get_body),
    ("GetBodyArrayBuffer", get_body_array_buffer),
    ("SetBody", set_body),
    ("FinishedAt", finished_at),
    ("ExecuteStatus", execute_status),
    ("ResetHeader", reset_header),
    ("SetHeader", set_header),
    ("AddHeader", add_header),
    ("DelHeader", del_header),
    ("GetHeader", get_header),
    ("HeaderValues", get_header_values),
    ("HeaderFields", get_header_fields),
    ("ResponseStatusCode", response_status_code),
    ("ResponseBody", response_body),
    ("ResponseBodyArrayBuffer", response_body_array_buffer),
    ("ResponseHeader", response_header),
    ("ResponseHeaderValues", response_header_values),
    ("ResponseHeaderFields", response_header_fields),
    ("Execute", execute),
];

fn arg(info: &FunctionCallbackInfo, index: usize) -> String {
    info.get_arg(index).string()
}

fn get_id(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    text(info, req.id())
}

fn get_url(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    text(info, &req.url)
}

fn set_url(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    req.url = arg(info, 0);
    Ok(None)
}

fn get_proxy(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    text(info, &req.proxy)
}

fn set_proxy(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    req.proxy = arg(info, 0);
    Ok(None)
}

fn get_method(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    text(info, &req.method)
}

fn set_method(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    req.method = arg(info, 0);
    Ok(None)
}

fn get_body(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    text(info, &String::from_utf8_lossy(&req.body))
}

fn get_body_array_buffer(
    _: &HttpAddon,
    info: &FunctionCallbackInfo,
    req: &mut Request,
) -> Result<Option<JsValue>> {
    Ok(info.context().new_array_buffer(req.body.clone()))
}

fn set_body(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    req.body = arg(info, 0).into_bytes();
    Ok(None)
}

fn finished_at(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    Ok(info.context().new_int64(req.finished_at()))
}

fn execute_status(
    _: &HttpAddon,
    info: &FunctionCallbackInfo,
    req: &mut Request,
) -> Result<Option<JsValue>> {
    Ok(info.context().new_int32(req.status() as i32))
}

fn reset_header(_: &HttpAddon, _: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    req.headers.clear();
    Ok(None)
}

fn set_header(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    req.set_header(&arg(info, 0), &arg(info, 1))?;
    Ok(None)
}

fn add_header(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    req.add_header(&arg(info, 0), &arg(info, 1))?;
    Ok(None)
}

fn del_header(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    req.del_header(&arg(info, 0));
    Ok(None)
}

fn get_header(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    text(info, &header(&req.headers, &arg(info, 0)))
}

fn get_header_values(
    _: &HttpAddon,
    info: &FunctionCallbackInfo,
    req: &mut Request,
) -> Result<Option<JsValue>> {
    strings(info, &header_values(&req.headers, &arg(info, 0)))
}

fn get_header_fields(
    _: &HttpAddon,
    info: &FunctionCallbackInfo,
    req: &mut Request,
) -> Result<Option<JsValue>> {
    strings(info, &header_fields(&req.headers))
}

fn response_status_code(
    _: &HttpAddon,
    info: &FunctionCallbackInfo,
    req: &mut Request,
) -> Result<Option<JsValue>> {
    Ok(info.context().new_int32(i32::from(req.response().status)))
}

fn response_body(_: &HttpAddon, info: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    text(info, &String::from_utf8_lossy(&req.response().body))
}

fn response_body_array_buffer(
    _: &HttpAddon,
    info: &FunctionCallbackInfo,
    req: &mut Request,
) -> Result<Option<JsValue>> {
    Ok(info.context().new_array_buffer(req.response().body.clone()))
}

fn response_header(
    _: &HttpAddon,
    info: &FunctionCallbackInfo,
    req: &mut Request,
) -> Result<Option<JsValue>> {
    text(info, &header(&req.response().headers, &arg(info, 0)))
}

fn response_header_values(
    _: &HttpAddon,
    info: &FunctionCallbackInfo,
    req: &mut Request,
) -> Result<Option<JsValue>> {
    strings(info, &header_values(&req.response().headers, &arg(info, 0)))
}

fn response_header_fields(
    _: &HttpAddon,
    info: &FunctionCallbackInfo,
    req: &mut Request,
) -> Result<Option<JsValue>> {
    strings(info, &header_fields(&req.response().headers))
}

fn execute(addon: &HttpAddon, _: &FunctionCallbackInfo, req: &mut Request) -> Result<Option<JsValue>> {
    req.execute(addon.options())?;
    Ok(None)
}
