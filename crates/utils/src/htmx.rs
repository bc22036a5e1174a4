//! HTMX request detection and response headers.
//!
//! Handlers return [`HxResponse`] when they need to drive the browser:
//! `HX-Redirect` for client-side navigation, `HX-Trigger` for events such as
//! toasts, `HX-Refresh` to reload the page.

use std::fmt::Write as _;

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value, json};

pub const HX_REQUEST: &str = "hx-request";
pub const HX_REDIRECT: &str = "hx-redirect";
pub const HX_TRIGGER: &str = "hx-trigger";
pub const HX_REFRESH: &str = "hx-refresh";

/// Event name the layout script listens to for toast notifications.
pub const TOAST_EVENT: &str = "showToast";

/// True when the request was issued by htmx.
pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get(HX_REQUEST)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug)]
pub struct HxResponse {
    status: StatusCode,
    body: String,
    redirect: Option<String>,
    triggers: Map<String, Value>,
    refresh: bool,
}

impl Default for HxResponse {
    fn default() -> Self {
        Self::empty()
    }
}

impl HxResponse {
    pub fn empty() -> Self {
        Self {
            status: StatusCode::OK,
            body: String::new(),
            redirect: None,
            triggers: Map::new(),
            refresh: false,
        }
    }

    pub fn fragment(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::empty()
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.redirect = Some(url.into());
        self
    }

    pub fn trigger(mut self, event: &str) -> Self {
        self.triggers.insert(event.to_string(), Value::Null);
        self
    }

    pub fn trigger_with(mut self, event: &str, detail: Value) -> Self {
        self.triggers.insert(event.to_string(), detail);
        self
    }

    pub fn toast(self, message: &str, kind: ToastKind) -> Self {
        self.trigger_with(TOAST_EVENT, json!({ "message": message, "type": kind }))
    }

    pub fn refresh(mut self) -> Self {
        self.refresh = true;
        self
    }

    /// Value of the `HX-Trigger` header, if any event was registered.
    pub fn trigger_header(&self) -> Option<String> {
        if self.triggers.is_empty() {
            return None;
        }
        let all_null = self.triggers.values().all(Value::is_null);
        if all_null {
            // Plain comma-separated form when no event carries detail.
            Some(self.triggers.keys().cloned().collect::<Vec<_>>().join(", "))
        } else {
            Some(ascii_json(&Value::Object(self.triggers.clone())))
        }
    }
}

impl IntoResponse for HxResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        if let Some(url) = &self.redirect {
            match HeaderValue::from_str(url) {
                Ok(value) => {
                    headers.insert(HX_REDIRECT, value);
                }
                Err(error) => tracing::warn!(?error, %url, "invalid HX-Redirect target"),
            }
        }
        if let Some(trigger) = self.trigger_header() {
            match HeaderValue::from_str(&trigger) {
                Ok(value) => {
                    headers.insert(HX_TRIGGER, value);
                }
                Err(error) => tracing::warn!(?error, "invalid HX-Trigger payload"),
            }
        }
        if self.refresh {
            headers.insert(HX_REFRESH, HeaderValue::from_static("true"));
        }
        (self.status, headers, Html(self.body)).into_response()
    }
}

/// Redirect that works for both htmx and plain browser requests.
pub fn redirect(htmx: bool, to: &str) -> Response {
    if htmx {
        return HxResponse::empty().redirect(to).into_response();
    }
    match HeaderValue::from_str(to) {
        Ok(location) => (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response(),
        Err(_) => (StatusCode::SEE_OTHER, [(header::LOCATION, "/")]).into_response(),
    }
}

/// Serialize JSON with every non-ASCII character `\u`-escaped so the result
/// is a valid header value.
fn ascii_json(value: &Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() && !ch.is_ascii_control() {
            out.push(ch);
        } else {
            let mut buf = [0u16; 2];
            for unit in ch.encode_utf16(&mut buf) {
                let _ = write!(out, "\\u{:04x}", unit);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_htmx_header() {
        let mut headers = HeaderMap::new();
        assert!(!is_htmx(&headers));
        headers.insert(HX_REQUEST, HeaderValue::from_static("true"));
        assert!(is_htmx(&headers));
    }

    #[test]
    fn toast_sets_json_trigger() {
        let response = HxResponse::empty()
            .toast("Saved", ToastKind::Success)
            .into_response();
        let trigger = response.headers().get(HX_TRIGGER).unwrap().to_str().unwrap();
        let parsed: Value = serde_json::from_str(trigger).unwrap();
        assert_eq!(parsed["showToast"]["message"], "Saved");
        assert_eq!(parsed["showToast"]["type"], "success");
    }

    #[test]
    fn bare_triggers_are_comma_separated() {
        let hx = HxResponse::empty().trigger("messageSent").trigger("refreshList");
        assert_eq!(hx.trigger_header().unwrap(), "messageSent, refreshList");
    }

    #[test]
    fn non_ascii_toast_is_header_safe() {
        let response = HxResponse::empty()
            .toast("Facture créée ✓", ToastKind::Info)
            .into_response();
        let trigger = response.headers().get(HX_TRIGGER).unwrap().to_str().unwrap();
        let parsed: Value = serde_json::from_str(trigger).unwrap();
        assert_eq!(parsed["showToast"]["message"], "Facture créée ✓");
    }

    #[test]
    fn redirect_differs_for_htmx() {
        let hx = redirect(true, "/auth/login");
        assert_eq!(hx.status(), StatusCode::OK);
        assert_eq!(hx.headers().get(HX_REDIRECT).unwrap(), "/auth/login");

        let plain = redirect(false, "/auth/login");
        assert_eq!(plain.status(), StatusCode::SEE_OTHER);
        assert_eq!(plain.headers().get(header::LOCATION).unwrap(), "/auth/login");
    }
}
