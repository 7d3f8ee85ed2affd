//! Hop-by-hop header handling shared by the director and the transformer.
use http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{CONNECTION, UPGRADE},
};

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// True when any `Connection` value lists the `upgrade` token.
pub fn connection_has_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// An upgrade request names `upgrade` in `Connection` and carries an `Upgrade` header.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    connection_has_upgrade(headers) && headers.contains_key(UPGRADE)
}

/// Remove hop-by-hop headers, including any extra ones listed in `Connection`.
///
/// With `keep_upgrade` the `Connection: upgrade` / `Upgrade` pair survives so a
/// protocol switch can still be negotiated end to end.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, keep_upgrade: bool) {
    let listed = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok());

    let doomed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_hop_by_hop(name))
        .cloned()
        .chain(listed)
        .filter(|name| !(keep_upgrade && (*name == CONNECTION || *name == UPGRADE)))
        .collect();

    for name in doomed {
        headers.remove(&name);
    }

    if keep_upgrade {
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
    }
}
