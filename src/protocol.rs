use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON-RPC version tag carried by every outgoing message
pub const JSONRPC_VERSION: &str = "2.0";

/// Value encoding requested from (or sent to) the device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Raw numeric value
    Val,
    /// Text value
    Str,
    /// Percentage 0..100
    Pct,
}

impl Format {
    /// The key carrying the value in a parameter object
    pub fn key(self) -> &'static str {
        match self {
            Format::Val => "val",
            Format::Str => "str",
            Format::Pct => "pct",
        }
    }
}

/// Outgoing methods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Method {
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "bmp")]
    Bump,
    #[serde(rename = "get")]
    Get,
    #[serde(rename = "sub")]
    Subscribe,
    #[serde(rename = "unsub")]
    Unsubscribe,
}

/// A `{param, fmt}` pair as used by get/sub/unsub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRequest {
    pub param: String,
    pub fmt: Format,
}

impl ParamRequest {
    pub fn new(param: impl Into<String>, fmt: Format) -> Self {
        Self {
            param: param.into(),
            fmt,
        }
    }
}

/// Outgoing request envelope
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub method: Method,
    pub params: Value,
}

impl Request {
    fn new(method: Method, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }

    /// Write a value: `{"param": p, <fmt>: value}`
    pub fn set(param: &str, value: impl Into<Value>, fmt: Format) -> Self {
        Self::new(Method::Set, value_params(param, value.into(), fmt))
    }

    /// Relative adjustment: `{"param": p, <fmt>: delta}`
    pub fn bump(param: &str, delta: impl Into<Value>, fmt: Format) -> Self {
        Self::new(Method::Bump, value_params(param, delta.into(), fmt))
    }

    /// One-shot read
    pub fn get(param: &str, fmt: Format) -> Self {
        Self::new(Method::Get, json!({ "param": param, "fmt": fmt }))
    }

    /// Subscribe to one parameter
    pub fn subscribe(param: &str, fmt: Format) -> Self {
        Self::new(Method::Subscribe, json!({ "param": param, "fmt": fmt }))
    }

    /// Subscribe to a batch of parameters in a single message
    pub fn subscribe_many(params: &[ParamRequest]) -> Self {
        let list = params
            .iter()
            .map(|p| json!({ "param": p.param, "fmt": p.fmt }))
            .collect();
        Self::new(Method::Subscribe, Value::Array(list))
    }

    pub fn unsubscribe(param: &str, fmt: Format) -> Self {
        Self::new(Method::Unsubscribe, json!({ "param": param, "fmt": fmt }))
    }

    /// Serialize as one newline-terminated line
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

fn value_params(param: &str, value: Value, fmt: Format) -> Value {
    let mut obj = Map::new();
    obj.insert("param".to_string(), Value::String(param.to_string()));
    obj.insert(fmt.key().to_string(), value);
    Value::Object(obj)
}

/// Methods the device sends
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InboundMethod {
    Update,
    GetResp,
    Error,
    #[serde(other)]
    Other,
}

/// Incoming message envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub method: Option<InboundMethod>,
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    /// Decode one line or datagram
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(trim_ascii(bytes))
    }

    /// Whether this message carries parameter values
    pub fn carries_values(&self) -> bool {
        matches!(
            self.method,
            Some(InboundMethod::Update) | Some(InboundMethod::GetResp)
        )
    }

    /// Parameter objects in this message; a single object counts as a list of one
    pub fn updates(&self) -> Vec<ParamUpdate> {
        match &self.params {
            Value::Object(obj) => ParamUpdate::from_object(obj.clone()).into_iter().collect(),
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .filter_map(ParamUpdate::from_object)
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// A full parameter object from an `update` or `getResp` message
#[derive(Debug, Clone, PartialEq)]
pub struct ParamUpdate {
    param: String,
    fields: Map<String, Value>,
}

impl ParamUpdate {
    /// Requires a string `param` key
    pub fn from_object(fields: Map<String, Value>) -> Option<Self> {
        let param = fields.get("param")?.as_str()?.to_string();
        Some(Self { param, fields })
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    /// Raw value under the format's key
    pub fn value(&self, fmt: Format) -> Option<&Value> {
        self.fields.get(fmt.key())
    }

    pub fn val(&self) -> Option<f64> {
        self.value(Format::Val).and_then(as_number)
    }

    pub fn str(&self) -> Option<&str> {
        self.value(Format::Str).and_then(Value::as_str)
    }

    pub fn pct(&self) -> Option<f64> {
        self.value(Format::Pct).and_then(as_number)
    }

    /// The whole object as received
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

// The device sometimes reports numbers as strings.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_mute_wire_format() {
        let line = serde_json::to_string(&Request::set("ZoneMute_0", 0, Format::Val)).unwrap();
        assert_eq!(
            line,
            r#"{"jsonrpc":"2.0","method":"set","params":{"param":"ZoneMute_0","val":0}}"#
        );
    }

    #[test]
    fn test_bump_uses_bmp_method() {
        let value = serde_json::to_value(Request::bump("ZoneGain_2", -5, Format::Pct)).unwrap();
        assert_eq!(value["method"], "bmp");
        assert_eq!(value["params"], json!({"param": "ZoneGain_2", "pct": -5}));
    }

    #[test]
    fn test_get_and_unsubscribe_params() {
        let get = serde_json::to_value(Request::get("KeepAlive", Format::Str)).unwrap();
        assert_eq!(get["method"], "get");
        assert_eq!(get["params"], json!({"param": "KeepAlive", "fmt": "str"}));

        let unsub = serde_json::to_value(Request::unsubscribe("ZoneName_1", Format::Str)).unwrap();
        assert_eq!(unsub["method"], "unsub");
        assert_eq!(unsub["jsonrpc"], "2.0");
    }

    #[test]
    fn test_subscribe_many_is_one_array() {
        let req = Request::subscribe_many(&[
            ParamRequest::new("A", Format::Val),
            ParamRequest::new("B", Format::Str),
        ]);
        let value = serde_json::to_value(req).unwrap();
        assert_eq!(value["method"], "sub");
        assert_eq!(
            value["params"],
            json!([{"param": "A", "fmt": "val"}, {"param": "B", "fmt": "str"}])
        );
    }

    #[test]
    fn test_to_line_is_newline_terminated() {
        let line = Request::get("X", Format::Val).to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_single_object_params_normalized() {
        let single = Notification::parse(br#"{"method":"update","params":{"param":"A","val":1}}"#).unwrap();
        let list = Notification::parse(br#"{"method":"update","params":[{"param":"A","val":1}]}"#).unwrap();
        assert_eq!(single.updates(), list.updates());
        assert_eq!(single.updates().len(), 1);
    }

    #[test]
    fn test_inbound_methods() {
        let resp = Notification::parse(b"{\"method\":\"getResp\",\"params\":[]}\r\n").unwrap();
        assert_eq!(resp.method, Some(InboundMethod::GetResp));
        assert!(resp.carries_values());

        let err = Notification::parse(br#"{"method":"error","params":{"code":-32601}}"#).unwrap();
        assert_eq!(err.method, Some(InboundMethod::Error));
        assert!(!err.carries_values());

        let other = Notification::parse(br#"{"method":"hello"}"#).unwrap();
        assert_eq!(other.method, Some(InboundMethod::Other));
    }

    #[test]
    fn test_entries_without_param_are_skipped() {
        let msg = Notification::parse(
            br#"{"method":"update","params":[{"val":1},{"param":"B","str":"Bar"},7]}"#,
        )
        .unwrap();
        let updates = msg.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].param(), "B");
        assert_eq!(updates[0].str(), Some("Bar"));
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        assert!(Notification::parse(b"{not json").is_err());
    }

    #[test]
    fn test_numeric_accessors() {
        let msg = Notification::parse(
            br#"{"method":"update","params":{"param":"G","val":-6.5,"pct":"42"}}"#,
        )
        .unwrap();
        let update = &msg.updates()[0];
        assert_eq!(update.val(), Some(-6.5));
        assert_eq!(update.pct(), Some(42.0));
        assert_eq!(update.str(), None);
        assert_eq!(update.fields().len(), 3);
    }
}
