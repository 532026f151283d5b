//! Request parsing helpers.

use crate::error::{KvError, KvResult};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::Uri;
use hyper::body::Incoming;
use std::collections::HashMap;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Read a whole request body, refusing anything over [`MAX_BODY_BYTES`].
pub async fn read_body(body: Incoming) -> KvResult<Bytes> {
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(KvError::BodyTooLarge {
            limit: MAX_BODY_BYTES,
        }),
        Err(e) => Err(KvError::MalformedBody(e.to_string())),
    }
}

/// Value of query parameter `name`, percent-decoded.
///
/// A value whose decoded bytes are not UTF-8 is rejected rather than
/// replaced, so a key is never silently rewritten into another one.
pub fn query_param(uri: &Uri, name: &'static str) -> KvResult<Option<String>> {
    match parse_query(uri.query()).remove(name) {
        None => Ok(None),
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| KvError::InvalidParameter {
                name,
                reason: "not valid UTF-8".to_string(),
            }),
    }
}

/// Decode a query string into raw value bytes. `+` is a space; the first
/// occurrence of a key wins.
pub fn parse_query(raw: Option<&str>) -> HashMap<String, Vec<u8>> {
    let mut map = HashMap::new();
    let Some(qs) = raw else {
        return map;
    };

    for part in qs.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = part.split_once('=').unwrap_or((part, ""));
        let name = String::from_utf8_lossy(&decode_component(k)).into_owned();
        map.entry(name).or_insert_with(|| decode_component(v));
    }
    map
}

fn decode_component(raw: &str) -> Vec<u8> {
    let spaced = raw.replace('+', " ");
    percent_encoding::percent_decode_str(&spaced).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(map: &'a HashMap<String, Vec<u8>>, name: &str) -> Option<&'a str> {
        map.get(name).map(|v| std::str::from_utf8(v).unwrap())
    }

    #[test]
    fn query_values_are_decoded() {
        let uri: Uri = "/get?key=user%3A1&x=a+b".parse().unwrap();
        assert_eq!(query_param(&uri, "key").unwrap().as_deref(), Some("user:1"));
        assert_eq!(query_param(&uri, "x").unwrap().as_deref(), Some("a b"));
        assert_eq!(query_param(&uri, "missing").unwrap(), None);
    }

    #[test]
    fn bare_and_empty_params() {
        let map = parse_query(Some("flag&key=&&key=second"));
        assert_eq!(value(&map, "flag"), Some(""));
        assert_eq!(value(&map, "key"), Some(""));
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn encoded_plus_stays_plus() {
        let map = parse_query(Some("peerAddress=10.0.0.1%3A5000&v=1%2B1"));
        assert_eq!(value(&map, "peerAddress"), Some("10.0.0.1:5000"));
        assert_eq!(value(&map, "v"), Some("1+1"));
    }

    #[test]
    fn non_utf8_value_is_rejected() {
        let uri: Uri = "/get?key=%FF%FE".parse().unwrap();
        let err = query_param(&uri, "key").unwrap_err();
        assert!(matches!(err, KvError::InvalidParameter { name: "key", .. }));

        // Multi-byte UTF-8 still decodes
        let uri: Uri = "/get?key=caf%C3%A9".parse().unwrap();
        assert_eq!(query_param(&uri, "key").unwrap().as_deref(), Some("café"));
    }
}
