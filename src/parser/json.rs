use std::borrow::Cow;

use serde::Deserialize;

use super::{is_ip, LogFormat, RawFields};

#[derive(Deserialize)]
struct RawLogItem {
    timestamp: serde_json::Number, // $msec
    clientip: String,              // $remote_addr
    #[serde(default)]
    user: Option<String>, // $remote_user
    #[serde(default)]
    method: Option<String>, // $request_method
    url: String, // $request_uri
    #[serde(default)]
    http_host: Option<String>, // $host
    status: u16, // $status
    #[serde(default)]
    size: Option<serde_json::Value>, // $body_bytes_sent, number or string
}

// Some templates quote every variable, so `"size":"-"` shows up too
fn size_text(size: serde_json::Value) -> Option<String> {
    match size {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

#[derive(Default)]
pub struct JsonFormat {}

impl LogFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse<'a>(&self, line: &'a str) -> Option<RawFields<'a>> {
        if !line.starts_with('{') {
            return None;
        }
        let raw: RawLogItem = serde_json::from_str(line).ok()?;
        if !is_ip(&raw.clientip) {
            return None;
        }
        // $request_uri is origin-form; glue the host back on
        let url = match raw.http_host {
            Some(host) if raw.url.starts_with('/') => format!("{}{}", host, raw.url),
            _ => raw.url,
        };

        Some(RawFields {
            epoch: Some(Cow::Owned(raw.timestamp.to_string())),
            client: Some(Cow::Owned(raw.clientip)),
            user: raw.user.map(Cow::Owned),
            method: raw.method.map(Cow::Owned),
            url: Some(Cow::Owned(url)),
            status: Some(raw.status),
            size: raw.size.and_then(size_text).map(Cow::Owned),
            ..Default::default()
        })
    }
}
