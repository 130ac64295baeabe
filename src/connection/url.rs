//! Connection-string parsing
//!
//! Grammar: `provider://[principal[:secret]@]host[:port][/path][?key=value&...]`.
//! The grammar is looser than RFC 3986 on purpose: the principal of a
//! filesystem connection is a directory and may contain `/`, so the string is
//! split by hand instead of going through a URL parser. The query string is
//! decoded with `form_urlencoded`; the principal and secret are
//! percent-decoded, so `%3F` stands for a literal `?` in a password.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::form_urlencoded;

use crate::{Error, Result};

/// Raw pieces of a connection string, before any provider-specific mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUrl {
    pub protocol: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: Option<String>,
    pub search_params: BTreeMap<String, String>,
}

/// Characters that would change how a credential splits. `/` is left alone
/// so directories stay readable.
const CREDENTIAL: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'#')
    .add(b'%')
    .add(b':')
    .add(b'?')
    .add(b'@');

/// Escape a principal or secret for use in a connection string.
pub fn encode_credential(value: &str) -> String {
    utf8_percent_encode(value, CREDENTIAL).to_string()
}

fn decode_credential(value: &str) -> Result<String> {
    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| {
            Error::config("Invalid configuration url: credentials are not valid UTF-8")
        })
}

/// Extract the provider key: the text before `://`, or the whole string.
pub fn provider_key(url: &str) -> &str {
    let url = url.trim();
    match url.find("://") {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// Parse a connection string. Never panics; malformed input is an `Error::Config`.
pub fn parse_url(input: &str) -> Result<ParsedUrl> {
    let url = input.trim();
    if url.is_empty() {
        return Err(Error::config("Please provide a valid configuration url"));
    }

    let Some(idx) = url.find("://") else {
        validate_protocol(url)?;
        return Ok(ParsedUrl {
            protocol: Some(url.to_string()),
            ..Default::default()
        });
    };

    let protocol = &url[..idx];
    validate_protocol(protocol)?;

    let rest = &url[idx + 3..];
    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };

    // The last '@' separates credentials from the locator; directories may contain '@'.
    let (credentials, locator) = match rest.rfind('@') {
        Some(at) => (Some(&rest[..at]), &rest[at + 1..]),
        None => (None, rest),
    };

    let (username, password) = match credentials {
        Some(creds) => match creds.split_once(':') {
            Some((user, pass)) => (non_empty(user), non_empty(pass)),
            None => (non_empty(creds), None),
        },
        None => (None, None),
    };
    let username = username.as_deref().map(decode_credential).transpose()?;
    let password = password.as_deref().map(decode_credential).transpose()?;

    let (host_port, path) = match locator.split_once('/') {
        Some((host, path)) => (host, non_empty(path)),
        None => (locator, None),
    };

    let (host, port) = split_port(host_port)?;

    let search_params = query
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    Ok(ParsedUrl {
        protocol: Some(protocol.to_string()),
        username,
        password,
        host,
        port,
        path,
        search_params,
    })
}

fn validate_protocol(protocol: &str) -> Result<()> {
    if protocol.is_empty() {
        return Err(Error::config("Invalid configuration url: missing provider"));
    }
    let valid = protocol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(Error::config(format!(
            "Invalid configuration url: '{}' is not a valid provider",
            protocol
        )));
    }
    Ok(())
}

fn split_port(host_port: &str) -> Result<(Option<String>, Option<String>)> {
    match host_port.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() => {
            if !port.chars().all(|c| c.is_ascii_digit()) || port.parse::<u16>().is_err() {
                return Err(Error::config(format!(
                    "Invalid configuration url: '{}' is not a valid port",
                    port
                )));
            }
            Ok((non_empty(host), Some(port.to_string())))
        }
        _ => Ok((non_empty(host_port), None)),
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_only() {
        let parsed = parse_url("gcs").unwrap();
        assert_eq!(parsed.protocol.as_deref(), Some("gcs"));
        assert_eq!(parsed.host, None);
        assert_eq!(provider_key("  gcs "), "gcs");
        assert_eq!(provider_key("s3://a:b@c"), "s3");
    }

    #[test]
    fn test_full_url() {
        let parsed =
            parse_url("minio://key:sec:ret@play.min.io:9000/the-bucket/sub?useSSL=false&region=eu")
                .unwrap();
        assert_eq!(parsed.protocol.as_deref(), Some("minio"));
        assert_eq!(parsed.username.as_deref(), Some("key"));
        assert_eq!(parsed.password.as_deref(), Some("sec:ret"));
        assert_eq!(parsed.host.as_deref(), Some("play.min.io"));
        assert_eq!(parsed.port.as_deref(), Some("9000"));
        assert_eq!(parsed.path.as_deref(), Some("the-bucket/sub"));
        assert_eq!(parsed.search_params.get("useSSL").map(String::as_str), Some("false"));
        assert_eq!(parsed.search_params.get("region").map(String::as_str), Some("eu"));
    }

    #[test]
    fn test_directory_principal() {
        let parsed = parse_url("local:///tmp/data@photos").unwrap();
        assert_eq!(parsed.username.as_deref(), Some("/tmp/data"));
        assert_eq!(parsed.password, None);
        assert_eq!(parsed.host.as_deref(), Some("photos"));

        let bare = parse_url("local://data/files").unwrap();
        assert_eq!(bare.username, None);
        assert_eq!(bare.host.as_deref(), Some("data"));
        assert_eq!(bare.path.as_deref(), Some("files"));
    }

    #[test]
    fn test_query_is_percent_decoded() {
        let parsed = parse_url("s3://bucket?endpoint=http%3A%2F%2Flocalhost%3A9000").unwrap();
        assert_eq!(
            parsed.search_params.get("endpoint").map(String::as_str),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn test_credentials_are_percent_decoded() {
        let parsed = parse_url("s3://us%3Aer:pa%3Fss%40word@bucket").unwrap();
        assert_eq!(parsed.username.as_deref(), Some("us:er"));
        assert_eq!(parsed.password.as_deref(), Some("pa?ss@word"));
        assert_eq!(parsed.host.as_deref(), Some("bucket"));
        assert_eq!(encode_credential("pa?ss@word"), "pa%3Fss%40word");
        assert_eq!(encode_credential("/tmp/data"), "/tmp/data");
    }

    #[test]
    fn test_malformed_urls() {
        assert!(parse_url("").is_err());
        assert!(parse_url("   ").is_err());
        assert!(parse_url("://bucket").is_err());
        assert!(parse_url("s 3://bucket").is_err());
        assert!(parse_url("minio://k:s@host:port/bucket").is_err());
        assert!(parse_url("minio://k:s@host:99999/bucket").is_err());
    }
}
