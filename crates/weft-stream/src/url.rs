// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Navigation target resolution (RFC 3986 §5.2, without percent-normalisation).

/// Resolve `target` against the absolute `base` URI.
///
/// Absolute targets are returned unchanged. If `base` has no scheme the
/// target is returned as given.
pub fn resolve_url(base: &str, target: &str) -> String {
    if has_scheme(target) {
        return target.to_owned();
    }
    let Some((scheme, rest)) = base.split_once("://") else {
        return target.to_owned();
    };
    if let Some(authority_relative) = target.strip_prefix("//") {
        return format!("{scheme}://{authority_relative}");
    }

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, path_and_more) = rest.split_at(authority_end);
    let base_no_fragment = path_and_more.split('#').next().unwrap_or_default();
    let (base_path, base_query) = match base_no_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (base_no_fragment, None),
    };
    let origin = format!("{scheme}://{authority}");

    if target.is_empty() {
        return match base_query {
            Some(query) => format!("{origin}{base_path}?{query}"),
            None => format!("{origin}{base_path}"),
        };
    }
    if target.starts_with('#') {
        return format!("{origin}{base_no_fragment}{target}");
    }
    if target.starts_with('?') {
        return format!("{origin}{base_path}{target}");
    }

    let (target_path, suffix) = match target.find(['?', '#']) {
        Some(i) => target.split_at(i),
        None => (target, ""),
    };
    let merged = if target_path.starts_with('/') {
        target_path.to_owned()
    } else {
        match base_path.rfind('/') {
            Some(i) => format!("{}{target_path}", &base_path[..=i]),
            None => format!("/{target_path}"),
        }
    };
    format!("{origin}{}{suffix}", remove_dot_segments(&merged))
}

fn has_scheme(text: &str) -> bool {
    let Some(colon) = text.find(':') else {
        return false;
    };
    let scheme = &text[..colon];
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn remove_dot_segments(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => {
                if i == last {
                    out.push("");
                }
            }
            ".." => {
                out.pop();
                if i == last {
                    out.push("");
                }
            }
            s => out.push(s),
        }
    }
    format!("/{}", out.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://shop.test/catalog/items?page=2#top";

    #[test]
    fn absolute_targets_pass_through() {
        assert_eq!(resolve_url(BASE, "https://other.test/x"), "https://other.test/x");
        assert_eq!(resolve_url(BASE, "mailto:a@b.test"), "mailto:a@b.test");
    }

    #[test]
    fn relative_targets_resolve_against_base() {
        assert_eq!(resolve_url(BASE, "/login"), "https://shop.test/login");
        assert_eq!(resolve_url(BASE, "cart"), "https://shop.test/catalog/cart");
        assert_eq!(resolve_url(BASE, "../about?x=1"), "https://shop.test/about?x=1");
        assert_eq!(resolve_url(BASE, "./"), "https://shop.test/catalog/");
        assert_eq!(resolve_url(BASE, "?page=3"), "https://shop.test/catalog/items?page=3");
        assert_eq!(resolve_url(BASE, "#reviews"), "https://shop.test/catalog/items?page=2#reviews");
        assert_eq!(resolve_url(BASE, "//cdn.test/a"), "https://cdn.test/a");
    }

    #[test]
    fn base_without_path() {
        assert_eq!(resolve_url("http://localhost:8080", "moved"), "http://localhost:8080/moved");
        assert_eq!(resolve_url("not a uri", "/x"), "/x");
    }
}
