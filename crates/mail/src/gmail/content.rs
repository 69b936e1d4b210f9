//! Header and body content helpers
//!
//! Address list parsing, tolerant base64 decoding, HTML entity handling and
//! transport-security detection.

use std::sync::LazyLock;

use base64::prelude::*;
use regex::Regex;

use super::api::Header;
use crate::models::EmailAddress;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9-]*(\s[^<>]*)?/?>|<!--.*?-->|<!DOCTYPE[^>]*>").unwrap());

/// `Received` trace markers meaning the hop was encrypted
static TLS_TRACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ESMTPS|ESMTPSA|LMTPS|UTF8SMTPS)\b|\bTLS_?v?1[._]?[0-3]\b|version=TLS|\(using TLS").unwrap()
});

/// Headers whose presence reports TLS delivery explicitly
const TLS_REPORT_HEADERS: &[&str] = &["TLS-Report-Domain", "TLS-Report-Submitter", "X-TLS-Report"];

/// Find a header value by name (case-insensitive)
pub fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// All values for a header name, in order
pub fn find_headers<'a>(headers: &'a [Header], name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .iter()
        .filter(move |h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Parse a header value holding one or more addresses
///
/// Handles quoted display names with commas and address groups. Values
/// `mailparse` rejects are split on commas outside quotes and brackets.
pub fn parse_address_list(value: &str) -> Vec<EmailAddress> {
    if value.trim().is_empty() {
        return Vec::new();
    }

    match mailparse::addrparse(value) {
        Ok(list) => {
            let mut out = Vec::new();
            for addr in list.iter() {
                match addr {
                    mailparse::MailAddr::Single(info) => out.push(from_single(info)),
                    mailparse::MailAddr::Group(group) => {
                        out.extend(group.addrs.iter().map(from_single))
                    }
                }
            }
            out
        }
        Err(_) => split_addresses(value)
            .into_iter()
            .map(EmailAddress::parse)
            .filter(|a| !a.email.is_empty())
            .collect(),
    }
}

fn from_single(info: &mailparse::SingleInfo) -> EmailAddress {
    EmailAddress {
        name: info
            .display_name
            .as_ref()
            .map(|n| n.trim().trim_matches('"').to_string())
            .filter(|n| !n.is_empty()),
        email: info.addr.trim().to_string(),
    }
}

/// Split on commas that are not inside quotes or angle brackets
fn split_addresses(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => depth += 1,
            '>' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                parts.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Decode base64 body data to bytes
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
pub fn decode_base64_bytes(data: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let data = data.trim();
    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    decoders.iter().find_map(|d| d.decode(data).ok())
}

/// Decode base64 body data to text, replacing invalid UTF-8
pub fn decode_base64_body(data: &str) -> Option<String> {
    decode_base64_bytes(data).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Re-encode provider (URL-safe) base64 as standard base64 for `data:` URIs
pub fn to_standard_base64(data: &str) -> Option<String> {
    decode_base64_bytes(data).map(|bytes| BASE64_STANDARD.encode(bytes))
}

/// Decode named and numeric HTML entities in a single pass
///
/// "&amp;lt;" decodes to "&lt;", not "<".
pub fn decode_html_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

/// Whether the text contains anything that looks like markup
pub fn contains_html_tags(s: &str) -> bool {
    TAG_RE.is_match(s)
}

/// Render plain text as HTML line breaks
pub fn plain_text_to_html(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\n', "<br>")
}

/// Whether transport headers indicate the message travelled over TLS
pub fn was_sent_with_tls(headers: &[Header]) -> bool {
    if TLS_REPORT_HEADERS
        .iter()
        .any(|name| find_header(headers, name).is_some())
    {
        return true;
    }
    find_headers(headers, "Received").any(|value| TLS_TRACE_RE.is_match(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, value: &str) -> Header {
        Header {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_parse_address_list() {
        let addrs = parse_address_list("alice@example.com, Bob <bob@example.com>");
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].email, "alice@example.com");
        assert_eq!(addrs[1].email, "bob@example.com");
        assert_eq!(addrs[1].name, Some("Bob".to_string()));
    }

    #[test]
    fn test_parse_address_list_quoted_comma() {
        let addrs = parse_address_list("\"Doe, Jane\" <jane@example.com>, carol@example.com");
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].name.as_deref(), Some("Doe, Jane"));
        assert_eq!(addrs[0].email, "jane@example.com");
        assert_eq!(addrs[1].email, "carol@example.com");
    }

    #[test]
    fn test_split_addresses_fallback() {
        let parts = split_addresses("\"A, B\" <a@x.com>,, c@x.com ");
        assert_eq!(parts, vec!["\"A, B\" <a@x.com>", "c@x.com"]);
    }

    #[test]
    fn test_decode_base64_body() {
        // "Hello, World!" in base64url
        assert_eq!(decode_base64_body("SGVsbG8sIFdvcmxkIQ"), Some("Hello, World!".to_string()));
        // padded standard alphabet
        assert_eq!(decode_base64_body("SGVsbG8sIFdvcmxkIQ=="), Some("Hello, World!".to_string()));
    }

    #[test]
    fn test_to_standard_base64() {
        // 0xfb 0xff encodes to "-_8" in URL-safe, "+/8=" in standard
        assert_eq!(to_standard_base64("-_8").as_deref(), Some("+/8="));
    }

    #[test]
    fn test_decode_html_entities() {
        assert_eq!(decode_html_entities("Hello &amp; welcome &lt;user&gt;"), "Hello & welcome <user>");
        assert_eq!(decode_html_entities("&#39;quoted&#x27; &#169;"), "'quoted' \u{a9}");
        assert_eq!(decode_html_entities("&amp;lt;"), "&lt;");
        assert_eq!(
            decode_html_entities("&copy; 2024 &mdash; it&rsquo;s &nbsp;here"),
            "\u{a9} 2024 \u{2014} it\u{2019}s \u{a0}here"
        );
    }

    #[test]
    fn test_contains_html_tags() {
        assert!(contains_html_tags("<p>Hi</p>"));
        assert!(contains_html_tags("<br/>"));
        assert!(!contains_html_tags("a < b and c > d"));
        assert!(!contains_html_tags("plain words"));
    }

    #[test]
    fn test_tls_from_received_header() {
        let headers = vec![header(
            "Received",
            "from mail.example.com by mx.google.com with ESMTPS id abc",
        )];
        assert!(was_sent_with_tls(&headers));

        let plain = vec![header("Received", "from mail.example.com by mx with SMTP id abc")];
        assert!(!was_sent_with_tls(&plain));
    }

    #[test]
    fn test_tls_from_report_header() {
        let headers = vec![header("TLS-Report-Domain", "example.com")];
        assert!(was_sent_with_tls(&headers));
    }
}
