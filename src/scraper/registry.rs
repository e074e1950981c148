use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::scraper::mapper::FieldMapping;
use crate::scraper::template::{HttpMethod, TemplateDraft};

const BUILTIN_SITES: &str = include_str!("../../config/sites.json");

/// Defaults for one known recruitment site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDefinition {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    /// Host names that identify the site from a base URL.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Free-text nicknames that map a search query onto this site's tag.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub data_path: Option<String>,
    #[serde(default)]
    pub mapping: Option<FieldMapping>,
    /// Detail-page URL with an `{id}` placeholder for the external job id.
    #[serde(default)]
    pub detail_url: Option<String>,
}

impl SiteDefinition {
    pub fn detail_url_for(&self, external_id: &str) -> Option<String> {
        self.detail_url
            .as_ref()
            .map(|pattern| pattern.replace("{id}", external_id))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Proposal {
    pub known: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub template: TemplateDraft,
}

/// Site id -> template defaults. Built-in entries come from
/// `config/sites.json`; an optional file replaces or extends them.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<SiteDefinition>,
}

impl SiteRegistry {
    pub fn builtin() -> Result<Self, serde_json::Error> {
        Ok(Self {
            sites: serde_json::from_str(BUILTIN_SITES)?,
        })
    }

    /// Built-in catalog, overlaid with the entries in `path` when given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut registry = Self::builtin()?;
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)?;
            let extra: Vec<SiteDefinition> = serde_json::from_str(&raw)?;
            tracing::info!("Loaded {} site definitions from {}", extra.len(), path.display());
            registry.merge(extra);
        }
        Ok(registry)
    }

    pub fn merge(&mut self, definitions: Vec<SiteDefinition>) {
        for def in definitions {
            match self.sites.iter_mut().find(|s| s.id == def.id) {
                Some(existing) => *existing = def,
                None => self.sites.push(def),
            }
        }
    }

    pub fn sites(&self) -> &[SiteDefinition] {
        &self.sites
    }

    pub fn get(&self, id: &str) -> Option<&SiteDefinition> {
        self.sites.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }

    /// Look a site up by id first, then by the host of `base_url`.
    pub fn resolve(&self, site: Option<&str>, base_url: &str) -> Option<&SiteDefinition> {
        if let Some(found) = site.and_then(|id| self.get(id)) {
            return Some(found);
        }
        let host = Url::parse(base_url).ok()?.host_str()?.to_ascii_lowercase();
        self.sites
            .iter()
            .find(|s| s.hosts.iter().any(|h| host == *h || host.ends_with(&format!(".{h}"))))
    }

    /// Best-effort starting template. Unknown sites only get a method and
    /// Origin/Referer headers; url, dataPath and mapping are left to the user.
    pub fn propose(&self, site: Option<&str>, base_url: &str) -> Proposal {
        let Some(def) = self.resolve(site, base_url) else {
            return Proposal {
                known: false,
                site: None,
                template: TemplateDraft {
                    method: Some(HttpMethod::Get),
                    headers: Some(with_origin_headers(BTreeMap::new(), base_url)),
                    ..Default::default()
                },
            };
        };

        Proposal {
            known: true,
            site: Some(def.id.clone()),
            template: TemplateDraft {
                url: def.endpoint.clone(),
                method: Some(def.method.unwrap_or_default()),
                headers: Some(with_origin_headers(def.headers.clone(), base_url)),
                body: def.body.clone(),
                data_path: def.data_path.clone(),
                mapping: def.mapping.clone(),
                strict_data_path: None,
            },
        }
    }

    /// Fill the gaps of a caller-supplied draft from the catalog. Caller
    /// values always win.
    pub fn enrich(&self, site: &str, target_url: &str, draft: TemplateDraft) -> TemplateDraft {
        let proposed = self.propose(Some(site), target_url).template;
        let uses_catalog_endpoint = draft.url.is_none();

        let headers = match draft.headers {
            Some(headers) => with_origin_headers(headers, target_url),
            None => proposed.headers.unwrap_or_default(),
        };

        TemplateDraft {
            url: draft.url.or(proposed.url),
            method: draft.method.or(proposed.method),
            headers: Some(headers),
            body: if uses_catalog_endpoint {
                draft.body.or(proposed.body)
            } else {
                draft.body
            },
            data_path: draft
                .data_path
                .filter(|p| !p.is_empty())
                .or(proposed.data_path),
            mapping: draft.mapping.or(proposed.mapping),
            strict_data_path: draft.strict_data_path,
        }
    }

    /// Site ids whose aliases appear in a free-text query.
    pub fn alias_targets(&self, query: &str) -> Vec<String> {
        self.sites
            .iter()
            .filter(|s| s.aliases.iter().any(|a| query.contains(a.as_str())))
            .map(|s| s.id.clone())
            .collect()
    }
}

/// Add `Origin` and `Referer` derived from `base_url` when missing.
fn with_origin_headers(
    mut headers: BTreeMap<String, String>,
    base_url: &str,
) -> BTreeMap<String, String> {
    let Ok(parsed) = Url::parse(base_url) else {
        return headers;
    };
    let has = |headers: &BTreeMap<String, String>, name: &str| {
        headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    };
    if !has(&headers, "Origin") {
        headers.insert("Origin".into(), parsed.origin().ascii_serialization());
    }
    if !has(&headers, "Referer") {
        headers.insert("Referer".into(), base_url.to_string());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn builtin_catalog_parses() {
        let registry = SiteRegistry::builtin().unwrap();
        let ids: Vec<_> = registry.sites().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["tencent", "bytedance", "alibaba"]);
        let tencent = registry.get("Tencent").unwrap();
        assert_eq!(tencent.method, Some(HttpMethod::Post));
        assert_eq!(
            tencent.detail_url_for("123").as_deref(),
            Some("https://join.qq.com/post.html?id=123")
        );
    }

    #[test]
    fn resolves_by_host_when_id_unknown() {
        let registry = SiteRegistry::builtin().unwrap();
        let def = registry
            .resolve(Some("custom"), "https://careers.tencent.com/search.html")
            .unwrap();
        assert_eq!(def.id, "tencent");
        assert!(registry.resolve(None, "https://example.org/jobs").is_none());
        assert!(registry.resolve(None, "not a url").is_none());
    }

    #[test]
    fn proposal_for_known_site_is_complete() {
        let registry = SiteRegistry::builtin().unwrap();
        let proposal = registry.propose(Some("bytedance"), "https://jobs.bytedance.com/experienced");
        assert!(proposal.known);
        let template = proposal.template;
        let headers = template.headers.clone().unwrap();
        assert_eq!(headers["Origin"], "https://jobs.bytedance.com");
        assert_eq!(headers["Referer"], "https://jobs.bytedance.com/experienced");
        assert_eq!(template.data_path.as_deref(), Some("data.job_post_list"));
        assert!(template.into_template().is_ok());
    }

    #[test]
    fn proposal_for_unknown_site_leaves_shape_to_the_user() {
        let registry = SiteRegistry::builtin().unwrap();
        let proposal = registry.propose(Some("acme"), "https://jobs.acme.io/list");
        assert!(!proposal.known);
        assert_eq!(proposal.template.method, Some(HttpMethod::Get));
        assert_eq!(proposal.template.url, None);
        assert_eq!(proposal.template.data_path, None);
        assert_eq!(proposal.template.mapping, None);
        assert_eq!(
            proposal.template.headers.unwrap()["Origin"],
            "https://jobs.acme.io"
        );
    }

    #[test]
    fn enrich_keeps_caller_values() {
        let registry = SiteRegistry::builtin().unwrap();
        let draft: TemplateDraft = serde_json::from_value(json!({
            "url": "https://join.qq.com/api/v1/position/searchPosition?timestamp=1",
            "headers": { "origin": "https://join.qq.com", "Cookie": "a=b" },
            "body": { "pageIndex": 1, "pageSize": 10 }
        }))
        .unwrap();

        let enriched = registry.enrich("tencent", "https://join.qq.com/post.html", draft);
        let headers = enriched.headers.clone().unwrap();
        assert_eq!(headers["origin"], "https://join.qq.com");
        assert!(!headers.contains_key("Origin"));
        assert_eq!(headers["Referer"], "https://join.qq.com/post.html");
        assert_eq!(enriched.method, Some(HttpMethod::Post));
        assert_eq!(enriched.body, Some(json!({ "pageIndex": 1, "pageSize": 10 })));
        assert_eq!(enriched.data_path.as_deref(), Some("data.positionList"));
        assert_eq!(enriched.mapping.unwrap().title, "positionTitle");
    }

    #[test]
    fn enrich_for_unknown_site_does_not_invent_a_shape() {
        let registry = SiteRegistry::builtin().unwrap();
        let draft = TemplateDraft {
            url: Some("https://api.acme.io/jobs".into()),
            ..Default::default()
        };
        let enriched = registry.enrich("acme", "https://acme.io/careers", draft);
        assert_eq!(enriched.data_path, None);
        assert!(enriched.into_template().is_err());
    }

    #[test]
    fn file_entries_override_and_extend() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!([
                { "id": "tencent", "displayName": "Tencent (override)", "dataPath": "Data.Posts" },
                { "id": "acme", "hosts": ["acme.io"], "aliases": ["艾克米"] }
            ])
        )
        .unwrap();

        let registry = SiteRegistry::load(Some(file.path())).unwrap();
        assert_eq!(registry.sites().len(), 4);
        assert_eq!(registry.get("tencent").unwrap().data_path.as_deref(), Some("Data.Posts"));
        assert_eq!(registry.resolve(None, "https://jobs.acme.io/").unwrap().id, "acme");
        assert_eq!(registry.alias_targets("艾克米 后端"), ["acme"]);
    }

    #[test]
    fn alias_targets_match_substrings() {
        let registry = SiteRegistry::builtin().unwrap();
        assert_eq!(registry.alias_targets("字节跳动 后端"), ["bytedance"]);
        assert_eq!(registry.alias_targets("腾讯 阿里"), ["tencent", "alibaba"]);
        assert!(registry.alias_targets("rust").is_empty());
    }
}
