// Squid native access log:
//
//   time elapsed client code/status bytes method URL user hierarchy/from type
//
// e.g. `1286536309.586    921 192.168.0.68 TCP_MISS/200 507 CONNECT www.google.com:443 - DIRECT/www.google.com -`

use regex::Regex;

use super::{capture, is_ip, LogFormat, RawFields};

const PATTERN: &str = r"^(?P<epoch>\d+(?:\.\d+)?)\s+(?P<elapsed>-?\d+)\s+(?P<client>\S+)\s+(?P<cache>[A-Z_]+)/(?P<status>\d{3})\s+(?P<size>\d+|-)\s+(?P<method>[A-Za-z_]+|-)\s+(?P<url>\S+)(?:\s+(?P<user>\S+))?";

pub struct SquidFormat {
    re: Regex,
}

impl Default for SquidFormat {
    fn default() -> Self {
        Self {
            re: Regex::new(PATTERN).expect("squid log pattern is valid"),
        }
    }
}

impl LogFormat for SquidFormat {
    fn name(&self) -> &'static str {
        "squid"
    }

    fn parse<'a>(&self, line: &'a str) -> Option<RawFields<'a>> {
        let caps = self.re.captures(line)?;
        let client = capture(&caps, "client")?;
        if !is_ip(&client) {
            return None;
        }
        let status: u16 = caps.name("status")?.as_str().parse().ok()?;

        Some(RawFields {
            epoch: capture(&caps, "epoch"),
            client: Some(client),
            user: capture(&caps, "user"),
            method: capture(&caps, "method"),
            url: capture(&caps, "url"),
            status: Some(status),
            size: capture(&caps, "size"),
            cache_status: capture(&caps, "cache"),
            ..Default::default()
        })
    }
}
