use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scraper::mapper::FieldMapping;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const PAGE_PLACEHOLDER: &str = "{page}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// Declarative description of how to fetch one page from a third-party API.
/// This is the stored wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    pub data_path: String,
    pub mapping: FieldMapping,
    /// Treat an unresolvable `dataPath` as an error instead of end-of-data.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub strict_data_path: bool,
}

/// A possibly incomplete template, as sent by callers or proposed by the
/// site registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<FieldMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_data_path: Option<bool>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("request template has no url")]
    MissingUrl,
    #[error("request template has no dataPath")]
    MissingDataPath,
    #[error("request template has no mapping for title")]
    MissingTitleMapping,
}

impl TemplateDraft {
    /// Validate the draft into a runnable template.
    pub fn into_template(self) -> Result<RequestTemplate, TemplateError> {
        let url = self
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or(TemplateError::MissingUrl)?;
        let data_path = self
            .data_path
            .filter(|p| !p.trim().is_empty())
            .ok_or(TemplateError::MissingDataPath)?;
        let mapping = self
            .mapping
            .filter(|m| !m.title.trim().is_empty())
            .ok_or(TemplateError::MissingTitleMapping)?;

        Ok(RequestTemplate {
            url,
            method: self.method.unwrap_or_default(),
            headers: self.headers.unwrap_or_default(),
            body: self.body,
            data_path,
            mapping,
            strict_data_path: self.strict_data_path.unwrap_or(false),
        })
    }
}

impl From<RequestTemplate> for TemplateDraft {
    fn from(t: RequestTemplate) -> Self {
        TemplateDraft {
            url: Some(t.url),
            method: Some(t.method),
            headers: Some(t.headers),
            body: t.body,
            data_path: Some(t.data_path),
            mapping: Some(t.mapping),
            strict_data_path: Some(t.strict_data_path),
        }
    }
}

/// Where the page number goes in the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlPaging {
    /// Substitute the `{page}` placeholder.
    Placeholder,
    /// Append `page=<n>` to the query string.
    QueryParam,
    None,
}

/// Pagination keys recognised in a JSON request body, detected once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyPaging {
    pub page: bool,
    pub page_index: bool,
    pub offset: bool,
    /// Coerced value of `limit`, when the key is present.
    pub limit: Option<u64>,
    /// Coerced value of `pageSize`, when the key is present.
    pub page_size: Option<u64>,
    /// `pageSize` was present but not a JSON number.
    pub rewrite_page_size: bool,
}

impl BodyPaging {
    pub fn detect(body: &Value) -> Self {
        let Some(obj) = body.as_object() else {
            return Self::default();
        };
        let page_size = obj.get("pageSize");
        BodyPaging {
            page: obj.contains_key("page"),
            page_index: obj.contains_key("pageIndex"),
            offset: obj.contains_key("offset"),
            limit: obj.get("limit").map(coerce_size),
            page_size: page_size.map(coerce_size),
            rewrite_page_size: page_size.is_some_and(|v| !v.is_number()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Step used to derive `offset`: `limit` wins when present, then a
    /// non-zero `pageSize`, then the default.
    pub fn offset_step(&self) -> u64 {
        self.limit
            .or(self.page_size.filter(|&n| n > 0))
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

/// Numbers are truncated, strings parse their leading digits; anything else
/// (or a zero from a string) falls back to the default page size.
fn coerce_size(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(DEFAULT_PAGE_SIZE),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits
                .parse::<u64>()
                .ok()
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_PAGE_SIZE)
        }
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// A template with its pagination style resolved.
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    pub template: RequestTemplate,
    pub url_paging: UrlPaging,
    pub body_paging: BodyPaging,
}

impl RequestTemplate {
    pub fn prepare(self) -> PreparedTemplate {
        let url_paging = if self.url.contains(PAGE_PLACEHOLDER) {
            UrlPaging::Placeholder
        } else if self.method == HttpMethod::Get {
            UrlPaging::QueryParam
        } else {
            UrlPaging::None
        };
        let body_paging = self
            .body
            .as_ref()
            .map(BodyPaging::detect)
            .unwrap_or_default();

        PreparedTemplate {
            template: self,
            url_paging,
            body_paging,
        }
    }
}

impl PreparedTemplate {
    /// Page size the loop compares the extracted record count against.
    pub fn expected_page_size(&self) -> u64 {
        self.body_paging
            .page_size
            .or(self.body_paging.limit)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }
}
