use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::types::Endpoint;

/// Hosts that show up in community mirror lists but are never file mirrors.
const JUNK_MARKERS: &[&str] = &[
    "facebook.com",
    "fb.com",
    "groups",
    "google.com",
    "youtube.com",
    "twitter.com",
    "pastebin.com",
    "wixsite.com",
    ".tk",
    "yolasite.com",
    "blogspot.com",
];

const DEFAULT_CATEGORY: &str = "General";

/// Load a JSON array of endpoints (`[{"id", "name", "url", "category"}]`).
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<Endpoint>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read catalog: {}", path.as_ref().display()))?;
    let endpoints: Vec<Endpoint> = serde_json::from_str(&content)
        .with_context(|| format!("invalid catalog JSON: {}", path.as_ref().display()))?;

    let mut seen = HashSet::new();
    for e in &endpoints {
        if !seen.insert(e.id.as_str()) {
            bail!("duplicate endpoint id in catalog: {}", e.id);
        }
    }
    Ok(endpoints)
}

/// Parse a plain-text mirror list into endpoints.
///
/// Supported lines:
/// - numbered header: `3. SOME NETWORK FTP SERVER` sets the category and name
/// - entry: `- http://10.16.100.244/` adds an endpoint under the current header
/// - anything else is ignored
///
/// Trailing slashes are stripped, duplicates and junk hosts dropped. Output is
/// sorted by category then name, and ids are numbered in that order.
pub fn parse_mirror_list(s: &str) -> Vec<Endpoint> {
    let mut out: Vec<Endpoint> = Vec::new();
    let mut seen = HashSet::new();
    let mut category = DEFAULT_CATEGORY.to_string();

    for raw_line in s.lines() {
        let line = raw_line.trim();

        if let Some(header) = parse_header(line) {
            category = header;
            continue;
        }

        let Some(url) = parse_entry(line) else {
            continue;
        };
        let lower = url.to_lowercase();
        if JUNK_MARKERS.iter().any(|m| lower.contains(m)) {
            continue;
        }
        if seen.insert(url.clone()) {
            out.push(Endpoint {
                id: String::new(),
                name: category.clone(),
                url,
                category: category.clone(),
            });
        }
    }

    out.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
    for (i, e) in out.iter_mut().enumerate() {
        e.id = format!("ftp-{:04}", i + 1);
    }
    out
}

/// Load and parse a mirror list file.
pub fn load_mirror_list(path: impl AsRef<Path>) -> Result<Vec<Endpoint>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read mirror list: {}", path.as_ref().display()))?;
    Ok(parse_mirror_list(&content))
}

/// Wrap ad-hoc addresses (e.g. from the command line) as endpoints.
pub fn endpoints_from_addresses<S: AsRef<str>>(addresses: &[S]) -> Vec<Endpoint> {
    addresses
        .iter()
        .enumerate()
        .map(|(i, a)| Endpoint::new(format!("arg-{}", i + 1), a.as_ref()))
        .collect()
}

/// Concatenate endpoints from several sources, rejecting ids that repeat across them.
///
/// Results are correlated by id, so two endpoints sharing one would be indistinguishable.
pub fn merge_endpoints<I>(sources: I) -> Result<Vec<Endpoint>>
where
    I: IntoIterator<Item = Vec<Endpoint>>,
{
    let mut out: Vec<Endpoint> = Vec::new();
    let mut seen = HashSet::new();
    for source in sources {
        for e in source {
            if !seen.insert(e.id.clone()) {
                bail!("duplicate endpoint id across inputs: {} ({})", e.id, e.url);
            }
            out.push(e);
        }
    }
    Ok(out)
}

// `12. NAME (TAG) FTP SERVER` -> `NAME (TAG)`
fn parse_header(line: &str) -> Option<String> {
    let (num, rest) = line.split_once('.')?;
    if num.is_empty() || !num.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    const SUFFIX: &str = "FTP SERVER";
    let mut title = rest.trim();
    if let Some(cut) = title.len().checked_sub(SUFFIX.len()) {
        if title.is_char_boundary(cut)
            && title[cut..].eq_ignore_ascii_case(SUFFIX)
            && title[..cut].ends_with(char::is_whitespace)
        {
            title = title[..cut].trim_end();
        }
    }
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

fn parse_entry(line: &str) -> Option<String> {
    let rest = line.strip_prefix('-')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let token = rest.split_whitespace().next()?;
    if !(token.starts_with("http://") || token.starts_with("https://")) {
        return None;
    }
    Some(token.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_strip_suffix() {
        assert_eq!(
            parse_header("1. BUSINESS NETWORK (FTPBD) FTP SERVER").as_deref(),
            Some("BUSINESS NETWORK (FTPBD)")
        );
        assert_eq!(parse_header("22. Circle Network").as_deref(), Some("Circle Network"));
        assert_eq!(parse_header("1.5 Gbps"), None);
        assert_eq!(parse_header("- http://x"), None);
    }

    #[test]
    fn entries_need_web_scheme() {
        assert_eq!(
            parse_entry("- http://10.16.100.244/").as_deref(),
            Some("http://10.16.100.244")
        );
        assert_eq!(
            parse_entry("-   https://ftp.example.net/  (movies)").as_deref(),
            Some("https://ftp.example.net")
        );
        assert_eq!(parse_entry("- ftp://10.0.0.1"), None);
        assert_eq!(parse_entry("http://10.0.0.1"), None);
    }

    #[test]
    fn list_is_filtered_deduped_sorted() {
        let input = r#"
            Intro text that is ignored
            2. ZETA NET FTP SERVER
            - http://10.0.0.9/
            - http://10.0.0.9
            - https://www.facebook.com/groups/zeta
            1. ALPHA LINK FTP SERVER
            - http://172.16.0.1/
            - http://mirror.tk/
        "#;
        let list = parse_mirror_list(input);
        let urls: Vec<_> = list.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["http://172.16.0.1", "http://10.0.0.9"]);
        assert_eq!(list[0].id, "ftp-0001");
        assert_eq!(list[0].category, "ALPHA LINK");
        assert_eq!(list[1].id, "ftp-0002");
        assert_eq!(list[1].name, "ZETA NET");
    }

    #[test]
    fn entries_before_any_header_are_general() {
        let list = parse_mirror_list("- http://10.1.1.1\n");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].category, "General");
    }

    #[test]
    fn merge_rejects_ids_shared_between_sources() {
        let from_catalog = vec![Endpoint::new("ftp-0001", "http://10.0.0.1")];
        let from_list = parse_mirror_list("1. NET FTP SERVER\n- http://10.0.0.2/\n");
        assert_eq!(from_list[0].id, "ftp-0001");

        let err = merge_endpoints([from_catalog.clone(), from_list]).unwrap_err();
        assert!(err.to_string().contains("ftp-0001"), "{err}");

        let merged = merge_endpoints([
            from_catalog,
            endpoints_from_addresses(&["ftp://10.0.0.3"]),
        ])
        .unwrap();
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["ftp-0001", "arg-1"]);
    }

    #[test]
    fn addresses_get_positional_ids() {
        let eps = endpoints_from_addresses(&["http://a", "ftp://b"]);
        assert_eq!(eps[0].id, "arg-1");
        assert_eq!(eps[1].url, "ftp://b");
    }
}
