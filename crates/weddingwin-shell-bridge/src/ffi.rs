//! C ABI for native shells that host the bridge logic in-process.
//!
//! Every function takes NUL-terminated UTF-8 and returns either a string the
//! caller releases with [`wwb_shell_free_string`] or null on invalid input.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use weddingwin_bridge_protocol::{BridgeMessage, Delivery, now_millis};

use crate::callback::parse_callback;
use crate::redirect::{CallbackTarget, rewrite_redirect_uri};
use crate::script::render_delivery_script;

pub const WWB_SHELL_FFI_CONTRACT_VERSION: u32 = 1;

fn with_c_string_input(input: *const c_char) -> Option<String> {
    if input.is_null() {
        return None;
    }

    // SAFETY: Caller guarantees `input` points to a valid NUL-terminated string.
    let c_str = unsafe { CStr::from_ptr(input) };
    c_str.to_str().ok().map(ToString::to_string)
}

fn into_raw_c_string(output: String) -> *mut c_char {
    CString::new(output)
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

pub fn parse_callback_url_json(raw_url: &str) -> Option<String> {
    serde_json::to_string(&parse_callback(raw_url, now_millis())).ok()
}

pub fn rewrite_auth_url_string(
    auth_url: &str,
    callback_url: &str,
    client_id: Option<&str>,
) -> Option<String> {
    let target = CallbackTarget::parse(callback_url).ok()?;
    rewrite_redirect_uri(auth_url, &target, client_id)
        .ok()
        .map(String::from)
}

pub fn is_callback_url_string(raw_url: &str, callback_url: &str) -> bool {
    let Ok(target) = CallbackTarget::parse(callback_url) else {
        return false;
    };
    url::Url::parse(raw_url.trim()).is_ok_and(|url| target.matches(&url))
}

/// Validates a page message and returns it re-encoded.
pub fn decode_bridge_message_json(raw_message: &str) -> Option<String> {
    BridgeMessage::from_json(raw_message).ok()?.to_json().ok()
}

pub fn render_delivery_script_string(delivery_json: &str, namespace: &str) -> Option<String> {
    let delivery = Delivery::from_json(delivery_json).ok()?;
    render_delivery_script(&delivery, namespace).ok()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn wwb_shell_parse_callback_url(raw_url: *const c_char) -> *mut c_char {
    let Some(raw_url) = with_c_string_input(raw_url) else {
        return std::ptr::null_mut();
    };

    parse_callback_url_json(&raw_url)
        .map(into_raw_c_string)
        .unwrap_or(std::ptr::null_mut())
}

/// `client_id` may be null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wwb_shell_rewrite_auth_url(
    auth_url: *const c_char,
    callback_url: *const c_char,
    client_id: *const c_char,
) -> *mut c_char {
    let (Some(auth_url), Some(callback_url)) =
        (with_c_string_input(auth_url), with_c_string_input(callback_url))
    else {
        return std::ptr::null_mut();
    };
    let client_id = with_c_string_input(client_id);

    rewrite_auth_url_string(&auth_url, &callback_url, client_id.as_deref())
        .map(into_raw_c_string)
        .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn wwb_shell_is_callback_url(
    raw_url: *const c_char,
    callback_url: *const c_char,
) -> bool {
    match (with_c_string_input(raw_url), with_c_string_input(callback_url)) {
        (Some(raw_url), Some(callback_url)) => is_callback_url_string(&raw_url, &callback_url),
        _ => false,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn wwb_shell_decode_bridge_message(
    raw_message: *const c_char,
) -> *mut c_char {
    let Some(raw_message) = with_c_string_input(raw_message) else {
        return std::ptr::null_mut();
    };

    decode_bridge_message_json(&raw_message)
        .map(into_raw_c_string)
        .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn wwb_shell_render_delivery_script(
    delivery_json: *const c_char,
    namespace: *const c_char,
) -> *mut c_char {
    let (Some(delivery_json), Some(namespace)) =
        (with_c_string_input(delivery_json), with_c_string_input(namespace))
    else {
        return std::ptr::null_mut();
    };

    render_delivery_script_string(&delivery_json, &namespace)
        .map(into_raw_c_string)
        .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn wwb_shell_free_string(raw: *mut c_char) {
    if raw.is_null() {
        return;
    }

    // SAFETY: `raw` must originate from `CString::into_raw` in this crate.
    let _ = unsafe { CString::from_raw(raw) };
}

#[unsafe(no_mangle)]
pub extern "C" fn wwb_shell_ffi_contract_version() -> u32 {
    WWB_SHELL_FFI_CONTRACT_VERSION
}

#[cfg(test)]
mod tests {
    use std::ffi::{CStr, CString};
    use std::ptr;

    use super::*;

    const CALLBACK: &str = "https://www.weddingwin.ca/auth/native-callback";

    #[test]
    fn ffi_helpers_parse_and_classify_callbacks() {
        let parsed = parse_callback_url_json(&format!("{CALLBACK}?error=access_denied"))
            .expect("encoded outcome");
        assert!(parsed.contains("\"kind\":\"provider_error\""));
        assert!(parsed.contains("\"reason\":\"access_denied\""));

        assert!(is_callback_url_string(&format!("{CALLBACK}#access_token=x"), CALLBACK));
        assert!(!is_callback_url_string("https://www.weddingwin.ca/home", CALLBACK));
        assert!(!is_callback_url_string(CALLBACK, "weddingwin://auth"));
    }

    #[test]
    fn ffi_helpers_rewrite_auth_url() {
        let rewritten = rewrite_auth_url_string(
            "https://accounts.google.com/o/oauth2/v2/auth?redirect_uri=weddingwin%3A%2F%2Fauth",
            CALLBACK,
            Some("cid"),
        )
        .expect("rewritten");
        assert!(rewritten.contains(
            "redirect_uri=https%3A%2F%2Fwww.weddingwin.ca%2Fauth%2Fnative-callback"
        ));
        assert!(rewritten.contains("client_id=cid"));
        assert_eq!(rewrite_auth_url_string("nope", CALLBACK, None), None);
    }

    #[test]
    fn ffi_helpers_decode_message_and_render_delivery() {
        let message = decode_bridge_message_json(
            r#"{"type":"LOGIN_GOOGLE","url":"https://accounts.google.com/o/oauth2/auth","timestamp":1}"#,
        )
        .expect("decoded");
        assert!(message.contains("\"type\":\"LOGIN_GOOGLE\""));
        assert_eq!(decode_bridge_message_json(r#"{"type":"LOGIN_GOOGLE"}"#), None);

        let script = render_delivery_script_string(
            r#"{"kind":"failure","failure":{"kind":"cancelled","reason":"cancelled"}}"#,
            "window.bridge",
        )
        .expect("script");
        assert_eq!(script, r#"window.bridge.notifyError("cancelled", null, "cancelled");"#);
    }

    #[test]
    fn ffi_round_trips_through_c_strings() {
        let input = CString::new(format!("{CALLBACK}?access_token=T1")).expect("c string");
        // SAFETY: `input` is a valid NUL-terminated string; output is freed below.
        let output = unsafe { wwb_shell_parse_callback_url(input.as_ptr()) };
        assert!(!output.is_null());
        // SAFETY: non-null output was produced by `into_raw_c_string`.
        let decoded = unsafe { CStr::from_ptr(output) }
            .to_str()
            .expect("utf8")
            .to_string();
        assert!(decoded.contains("\"accessToken\":\"T1\""));
        // SAFETY: `output` came from this crate and is freed once.
        unsafe { wwb_shell_free_string(output) };
    }

    #[test]
    fn ffi_contract_version_export_is_stable() {
        assert_eq!(WWB_SHELL_FFI_CONTRACT_VERSION, 1);
        assert_eq!(wwb_shell_ffi_contract_version(), WWB_SHELL_FFI_CONTRACT_VERSION);
    }

    #[test]
    fn ffi_returns_null_for_invalid_pointer_input() {
        // SAFETY: null input pointers are intentionally exercised.
        let result = unsafe { wwb_shell_parse_callback_url(ptr::null()) };
        assert!(result.is_null());
        // SAFETY: null input pointers are intentionally exercised.
        let result = unsafe { wwb_shell_rewrite_auth_url(ptr::null(), ptr::null(), ptr::null()) };
        assert!(result.is_null());
        // SAFETY: null input pointers are intentionally exercised.
        assert!(!unsafe { wwb_shell_is_callback_url(ptr::null(), ptr::null()) });
    }
}
