// Common/combined log format, as written by Apache, nginx and most proxies
// with a CLF-style access log:
//
//   client ident user [date] "METHOD url PROTO" status size ["referer" "ua"]
//
// Some proxy appliances wrap the record in a syslog envelope that starts with
// a quote and escape the request quotes (`\"GET ... HTTP/1.1\"`). Both are
// accepted.

use regex::Regex;

use super::{capture, is_ip, LogFormat, RawFields};

const PATTERN: &str = r#"^(?:"[^"]*?\s)?(?P<client>\S+)\s+(?P<ident>\S+)\s+(?P<user>\S+)\s+\[(?P<date>[^\]]+)\]\s+\\?"(?P<method>[A-Za-z]+)\s+(?P<url>[^\s"\\]+)(?:\s+HTTP/[0-9.]+)?\\?"\s+(?P<status>\d{3})\s+(?P<size>\d+|-)(?:\s|$)"#;

pub struct CombinedFormat {
    re: Regex,
}

impl Default for CombinedFormat {
    fn default() -> Self {
        Self {
            re: Regex::new(PATTERN).expect("combined log pattern is valid"),
        }
    }
}

impl LogFormat for CombinedFormat {
    fn name(&self) -> &'static str {
        "combined"
    }

    fn parse<'a>(&self, line: &'a str) -> Option<RawFields<'a>> {
        let caps = self.re.captures(line)?;
        let client = capture(&caps, "client")?;
        if !is_ip(&client) {
            return None;
        }
        let status: u16 = caps.name("status")?.as_str().parse().ok()?;

        Some(RawFields {
            date: capture(&caps, "date"),
            client: Some(client),
            user: capture(&caps, "user"),
            method: capture(&caps, "method"),
            url: capture(&caps, "url"),
            status: Some(status),
            size: capture(&caps, "size"),
            ..Default::default()
        })
    }
}
