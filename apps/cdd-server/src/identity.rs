use axum::http::HeaderMap;
use cdd_contracts::CallerIdentity;

pub(crate) const SUBJECT_HEADER: &str = "x-cdd-subject";
pub(crate) const ROLES_HEADER: &str = "x-cdd-roles";

/// Caller identity asserted by an upstream authenticator. No subject header means anonymous.
pub(crate) fn from_headers(headers: &HeaderMap) -> Option<CallerIdentity> {
    let subject = headers
        .get(SUBJECT_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    let roles = headers
        .get(ROLES_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    Some(
        roles
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .fold(CallerIdentity::new(subject), CallerIdentity::with_role),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn anonymous_without_subject() {
        let mut headers = HeaderMap::new();
        headers.insert(ROLES_HEADER, HeaderValue::from_static("admin"));
        assert_eq!(from_headers(&headers), None);
        headers.insert(SUBJECT_HEADER, HeaderValue::from_static("  "));
        assert_eq!(from_headers(&headers), None);
    }

    #[test]
    fn parses_subject_and_roles() {
        let mut headers = HeaderMap::new();
        headers.insert(SUBJECT_HEADER, HeaderValue::from_static("alice"));
        headers.insert(ROLES_HEADER, HeaderValue::from_static("admin, editor,,"));
        let identity = from_headers(&headers).unwrap();
        assert_eq!(identity.subject, "alice");
        assert!(identity.has_role("admin"));
        assert!(identity.has_role("editor"));
        assert_eq!(identity.roles.len(), 2);
    }
}
