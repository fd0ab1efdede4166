// Short proxy lines as emitted for denied or errored requests; there is no
// request line, only the target host (or nothing at all):
//
//   time client [user] code/status bytes [host]

use regex::Regex;

use super::{capture, is_ip, LogFormat, RawFields};

const PATTERN: &str = r"^(?P<epoch>\d+(?:\.\d+)?)\s+(?P<client>\S+)\s+(?:(?P<user>\S+)\s+)?(?P<cache>[A-Z_]+)/(?P<status>\d{3})\s+(?P<size>\d+|-)(?:\s+(?P<url>\S+))?\s*$";

pub struct ShortFormat {
    re: Regex,
}

impl Default for ShortFormat {
    fn default() -> Self {
        Self {
            re: Regex::new(PATTERN).expect("short log pattern is valid"),
        }
    }
}

impl LogFormat for ShortFormat {
    fn name(&self) -> &'static str {
        "short"
    }

    fn parse<'a>(&self, line: &'a str) -> Option<RawFields<'a>> {
        let caps = self.re.captures(line)?;
        // `-` stands for an unknown client
        let client = capture(&caps, "client")?;
        let client = if client == "-" {
            None
        } else if is_ip(&client) {
            Some(client)
        } else {
            return None;
        };
        let status: u16 = caps.name("status")?.as_str().parse().ok()?;

        Some(RawFields {
            epoch: capture(&caps, "epoch"),
            client,
            user: capture(&caps, "user"),
            url: capture(&caps, "url"),
            status: Some(status),
            size: capture(&caps, "size"),
            cache_status: capture(&caps, "cache"),
            ..Default::default()
        })
    }
}
