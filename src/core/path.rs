//! Path and query composition for outbound requests.
//!
//! Both functions are pure string joins. Nothing is normalized beyond the single
//! slash at the join point: internal `//` and `..` segments pass through untouched.

/// Join a target's base path with the inbound request path.
///
/// * both sides have the slash: the duplicate is dropped
/// * neither side has it: exactly one is inserted
/// * otherwise the two are concatenated as-is
pub fn join_paths(base_path: &str, request_path: &str) -> String {
    let base_has_slash = base_path.ends_with('/');
    let request_has_slash = request_path.starts_with('/');

    match (base_has_slash, request_has_slash) {
        (true, true) => format!("{base_path}{}", &request_path[1..]),
        (false, false) => format!("{base_path}/{request_path}"),
        _ => format!("{base_path}{request_path}"),
    }
}

/// Merge the target's base query with the inbound query, base first.
pub fn merge_query(base_query: &str, request_query: &str) -> String {
    if base_query.is_empty() || request_query.is_empty() {
        format!("{base_query}{request_query}")
    } else {
        format!("{base_query}&{request_query}")
    }
}
