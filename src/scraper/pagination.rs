use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::scraper::template::{HttpMethod, PAGE_PLACEHOLDER, PreparedTemplate, UrlPaging};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";
const FRESHNESS_PARAMS: [&str; 2] = ["timestamp", "ts"];

static FRESHNESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(timestamp|ts)=\d+").expect("static regex"));

/// One fully resolved HTTP request for a single page.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// Derive the request for `page` (1-based). `now_ms` is the epoch-millisecond
/// value written into freshness parameters.
pub fn build_request(prepared: &PreparedTemplate, page: u32, now_ms: i64) -> ConcreteRequest {
    let template = &prepared.template;

    let url = page_url(&template.url, prepared.url_paging, page);
    let url = refresh_timestamps(&url, now_ms);

    let body = match (&template.body, template.method) {
        (Some(body @ Value::Object(_)), HttpMethod::Post) => Some(rewrite_body(prepared, body, page)),
        (Some(body), HttpMethod::Post) => Some(body.clone()),
        _ => None,
    };

    ConcreteRequest {
        method: template.method,
        url,
        headers: merge_headers(&template.headers),
        body,
    }
}

fn page_url(url: &str, paging: UrlPaging, page: u32) -> String {
    match paging {
        UrlPaging::Placeholder => url.replacen(PAGE_PLACEHOLDER, &page.to_string(), 1),
        UrlPaging::QueryParam => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{url}{separator}page={page}")
        }
        UrlPaging::None => url.to_string(),
    }
}

/// Overwrite `timestamp`/`ts` query parameters with the current time. Falls
/// back to a textual replace when the URL does not parse.
pub fn refresh_timestamps(url: &str, now_ms: i64) -> String {
    let now = now_ms.to_string();
    let url = url.replace(TIMESTAMP_PLACEHOLDER, &now);

    match Url::parse(&url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if !pairs.iter().any(|(k, _)| FRESHNESS_PARAMS.contains(&k.as_str())) {
                return url;
            }
            parsed.query_pairs_mut().clear().extend_pairs(pairs.iter().map(|(k, v)| {
                if FRESHNESS_PARAMS.contains(&k.as_str()) {
                    (k.as_str(), now.as_str())
                } else {
                    (k.as_str(), v.as_str())
                }
            }));
            parsed.to_string()
        }
        Err(_) => FRESHNESS_RE
            .replace(&url, |caps: &regex::Captures<'_>| format!("{}={now}", &caps[1]))
            .into_owned(),
    }
}

fn rewrite_body(prepared: &PreparedTemplate, body: &Value, page: u32) -> Value {
    let paging = &prepared.body_paging;
    let mut body = body.clone();
    let Some(obj) = body.as_object_mut() else {
        return body;
    };
    let page = u64::from(page);

    if paging.page {
        obj.insert("page".into(), page.into());
    }
    if paging.page_index {
        obj.insert("pageIndex".into(), page.into());
    }
    if paging.offset {
        obj.insert("offset".into(), ((page - 1) * paging.offset_step()).into());
    }
    if paging.rewrite_page_size
        && let Some(size) = paging.page_size
    {
        obj.insert("pageSize".into(), size.into());
    }

    body
}

/// Defaults first, then template headers replacing them case-insensitively.
fn merge_headers(template_headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("User-Agent".to_string(), USER_AGENT.to_string()),
    ]);
    for (name, value) in template_headers {
        headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        headers.insert(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::mapper::FieldMapping;
    use crate::scraper::template::RequestTemplate;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn template(url: &str, method: HttpMethod, body: Option<Value>) -> PreparedTemplate {
        RequestTemplate {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body,
            data_path: "data.list".into(),
            mapping: FieldMapping {
                title: "name".into(),
                ..Default::default()
            },
            strict_data_path: false,
        }
        .prepare()
    }

    #[test]
    fn offset_follows_limit_for_every_page() {
        let prepared = template(
            "https://x/api",
            HttpMethod::Post,
            Some(json!({ "limit": 25, "offset": 0 })),
        );
        for page in 1..=6u32 {
            let req = build_request(&prepared, page, NOW);
            let body = req.body.unwrap();
            assert_eq!(body["offset"], json!(u64::from(page - 1) * 25));
            assert_eq!(body["limit"], json!(25));
        }
    }

    #[test]
    fn offset_without_limit_uses_page_size_or_default() {
        let with_size = template(
            "https://x/api",
            HttpMethod::Post,
            Some(json!({ "offset": 0, "pageSize": 10 })),
        );
        assert_eq!(build_request(&with_size, 3, NOW).body.unwrap()["offset"], json!(20));

        let bare = template("https://x/api", HttpMethod::Post, Some(json!({ "offset": 0 })));
        assert_eq!(build_request(&bare, 2, NOW).body.unwrap()["offset"], json!(20));
    }

    #[test]
    fn page_keys_are_set_and_page_size_coerced() {
        let prepared = template(
            "https://x/api",
            HttpMethod::Post,
            Some(json!({ "page": 1, "pageIndex": 1, "pageSize": "15", "keyword": "rust" })),
        );
        let body = build_request(&prepared, 4, NOW).body.unwrap();
        assert_eq!(body["page"], json!(4));
        assert_eq!(body["pageIndex"], json!(4));
        assert_eq!(body["pageSize"], json!(15));
        assert_eq!(body["keyword"], json!("rust"));
        assert!(body.get("offset").is_none());
    }

    #[test]
    fn url_placeholder_and_query_append() {
        let placeholder = template("https://x/api?page={page}&size=20", HttpMethod::Get, None);
        assert_eq!(
            build_request(&placeholder, 3, NOW).url,
            "https://x/api?page=3&size=20"
        );

        let bare = template("https://x/api", HttpMethod::Get, None);
        assert_eq!(build_request(&bare, 2, NOW).url, "https://x/api?page=2");

        let with_query = template("https://x/api?q=rust", HttpMethod::Get, None);
        assert_eq!(
            build_request(&with_query, 2, NOW).url,
            "https://x/api?q=rust&page=2"
        );

        let post = template("https://x/api", HttpMethod::Post, None);
        let req = build_request(&post, 2, NOW);
        assert_eq!(req.url, "https://x/api");
        assert_eq!(req.body, None);
    }

    #[test]
    fn freshness_params_are_refreshed() {
        let refreshed = refresh_timestamps("https://x/api?timestamp=1&q=a", NOW);
        assert_eq!(refreshed, format!("https://x/api?timestamp={NOW}&q=a"));

        let ts = refresh_timestamps("https://x/api?ts=5", NOW);
        assert_eq!(ts, format!("https://x/api?ts={NOW}"));

        let placeholder = refresh_timestamps("https://x/api?timestamp={timestamp}", NOW);
        assert_eq!(placeholder, format!("https://x/api?timestamp={NOW}"));

        let untouched = refresh_timestamps("https://x/api?q=a%20b", NOW);
        assert_eq!(untouched, "https://x/api?q=a%20b");

        let relative = refresh_timestamps("/api/list?TS=12&x=1", NOW);
        assert_eq!(relative, format!("/api/list?TS={NOW}&x=1"));
    }

    #[test]
    fn get_requests_never_carry_a_body() {
        let prepared = template("https://x/api", HttpMethod::Get, Some(json!({ "page": 1 })));
        assert_eq!(build_request(&prepared, 2, NOW).body, None);
    }

    #[test]
    fn template_headers_override_defaults() {
        let mut prepared = template("https://x/api", HttpMethod::Get, None);
        prepared
            .template
            .headers
            .insert("content-type".into(), "application/json;charset=UTF-8".into());
        let headers = build_request(&prepared, 1, NOW).headers;
        assert_eq!(headers.len(), 2);
        assert_eq!(
            headers.get("content-type").map(String::as_str),
            Some("application/json;charset=UTF-8")
        );
        assert!(headers.contains_key("User-Agent"));
    }
}
