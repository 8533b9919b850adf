//! Cookie-carried identity: the player token and the last used name.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

pub const PLAYER_ID_COOKIE: &str = "player_id";
pub const PLAYER_NAME_COOKIE: &str = "player_name";
/// Thirty days.
pub const COOKIE_MAX_AGE: u64 = 60 * 60 * 24 * 30;

/// Value of the named cookie, if the request carries one.
pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

pub fn player_id(headers: &HeaderMap) -> Option<&str> {
    cookie(headers, PLAYER_ID_COOKIE)
}

/// Name remembered from the last join. Undecodable cookies are ignored.
pub fn recent_name(headers: &HeaderMap) -> Option<String> {
    cookie(headers, PLAYER_NAME_COOKIE).and_then(decode_name)
}

pub fn encode_name(name: &str) -> String {
    URL_SAFE_NO_PAD.encode(name.as_bytes())
}

pub fn decode_name(encoded: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

fn set_cookie(name: &str, value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{name}={value}; Max-Age={COOKIE_MAX_AGE}; Path=/; SameSite=Lax"
    ))
    .ok()
}

/// Appends both identity cookies to a response's headers.
pub fn remember(headers: &mut HeaderMap, player_id: &str, name: &str) {
    let cookies = [
        set_cookie(PLAYER_ID_COOKIE, player_id),
        set_cookie(PLAYER_NAME_COOKIE, &encode_name(name)),
    ];
    for value in cookies.into_iter().flatten() {
        headers.append(SET_COOKIE, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_cookie(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(raw).unwrap());
        headers
    }

    #[test]
    fn finds_cookie_among_others() {
        let headers = with_cookie("theme=dark; player_id=abc-123 ; other=1");
        assert_eq!(player_id(&headers), Some("abc-123"));
        assert_eq!(cookie(&headers, "missing"), None);
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        assert_eq!(player_id(&with_cookie("player_id=")), None);
    }

    #[test]
    fn names_survive_cookie_encoding() {
        let name = "Zoë 🎲";
        let encoded = encode_name(name);
        assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        let headers = with_cookie(&format!("player_name={encoded}"));
        assert_eq!(recent_name(&headers).as_deref(), Some(name));
    }

    #[test]
    fn garbage_name_cookie_is_ignored() {
        assert_eq!(recent_name(&with_cookie("player_name=%%%")), None);
    }

    #[test]
    fn remember_sets_both_cookies() {
        let mut headers = HeaderMap::new();
        remember(&mut headers, "p-1", "ann");
        let values: Vec<_> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values[0].starts_with("player_id=p-1;"));
        assert!(values[1].starts_with(&format!("player_name={};", encode_name("ann"))));
        assert!(values.iter().all(|v| v.contains("Max-Age=2592000")));
    }
}
