use serde::Serialize;
use weddingwin_bridge_protocol::{Delivery, ProtocolError};

use crate::config::BridgeConfig;
use crate::session::{PageSink, SinkError};

/// Renders the JS that hands `delivery` to the page's notifier entry points
/// under `namespace`.
pub fn render_delivery_script(
    delivery: &Delivery,
    namespace: &str,
) -> Result<String, ProtocolError> {
    let attempt = js_literal(&delivery.attempt_id())?;
    match delivery {
        Delivery::Success { credential, .. } => Ok(format!(
            "{namespace}.notifySuccess({}, {attempt});",
            js_literal(credential)?
        )),
        Delivery::Failure { failure, .. } => Ok(format!(
            "{namespace}.notifyError({}, {attempt}, {});",
            js_literal(&failure.reason)?,
            js_literal(&failure.kind)?
        )),
    }
}

/// JSON is a JS expression except for U+2028/U+2029, and `</` must not end
/// an inline script block.
fn js_literal<T: Serialize + ?Sized>(value: &T) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(value)?;
    Ok(json
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
        .replace("</", "<\\/"))
}

/// [`PageSink`] that evaluates the rendered script through `evaluate`,
/// typically the webview's JS evaluation call.
pub struct ScriptSink<F> {
    namespace: String,
    evaluate: F,
}

impl<F> ScriptSink<F>
where
    F: Fn(String) -> Result<(), SinkError> + Send + Sync,
{
    pub fn new(namespace: impl Into<String>, evaluate: F) -> Self {
        Self {
            namespace: namespace.into(),
            evaluate,
        }
    }

    /// Uses the config's `injectionNamespace`.
    pub fn from_config(config: &BridgeConfig, evaluate: F) -> Self {
        Self::new(config.injection_namespace.trim(), evaluate)
    }
}

impl<F> std::fmt::Debug for ScriptSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptSink")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<F> PageSink for ScriptSink<F>
where
    F: Fn(String) -> Result<(), SinkError> + Send + Sync,
{
    fn deliver(&self, delivery: &Delivery) -> Result<(), SinkError> {
        let script = render_delivery_script(delivery, &self.namespace)?;
        (self.evaluate)(script)
    }
}
