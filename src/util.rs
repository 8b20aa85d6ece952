use reqwest::Url;

/// Parse "true"/"false"/"1"/"0" from an owned String.
pub fn parse_bool_flag(s: String) -> Option<bool> {
    parse_bool_str(&s)
}

/// Parse "true"/"false"/"1"/"0" from a &str.
pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Returns true for localhost, loopback IPv4/IPv6, and 0.0.0.0 URLs.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let parsed = match Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    match parsed.host_str() {
        Some(host) => {
            let normalized = host.trim().to_ascii_lowercase();
            normalized == "localhost"
                || normalized == "[::1]"
                || normalized == "::1"
                || normalized == "0.0.0.0"
                || normalized.starts_with("127.")
        }
        None => false,
    }
}

/// Derives the WebSocket stream endpoint served next to a REST base URL:
/// `https://host:port/anything` becomes `wss://host:port/ws/stream`.
pub fn derive_stream_url(api_url: &str) -> Option<String> {
    let mut parsed = Url::parse(api_url.trim()).ok()?;
    let scheme = match parsed.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return None,
    };
    parsed.set_scheme(scheme).ok()?;
    parsed.set_path("/ws/stream");
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Appends `runId` and `since` to a stream endpoint, replacing any previous values.
pub fn stream_url_for_run(base: &Url, run_id: &str, since: u64) -> Url {
    let mut url = base.clone();
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "runId" && key != "since")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("runId", run_id);
        pairs.append_pair("since", &since.to_string());
    }
    url
}
