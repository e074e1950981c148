use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scraper::path;

/// Logical job field -> source path inside one raw record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub title: String,
    #[serde(default)]
    pub external_job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_max: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
}

/// A job record after mapping. `source_website` is left empty here and
/// stamped by whoever knows which site the records came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedJob {
    pub title: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub department: Option<String>,
    pub job_type: Option<String>,
    pub experience_level: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub skills: Option<Vec<String>>,
    pub original_url: Option<String>,
    pub external_job_id: Option<String>,
    #[serde(default)]
    pub source_website: String,
}

impl NormalizedJob {
    /// Accept a record when it carries either a title or an external id.
    /// Stricter checks happen at persistence time.
    pub fn is_acceptable(&self) -> bool {
        !self.title.is_empty()
            || self
                .external_job_id
                .as_deref()
                .is_some_and(|id| !id.is_empty())
    }
}

/// Map one raw record through the field mapping. Never fails; unresolved
/// paths simply leave the field empty.
pub fn map_record(record: &Value, mapping: &FieldMapping) -> NormalizedJob {
    let text = |path: Option<&String>| path.and_then(|p| lookup(record, p)).and_then(as_text);
    let number =
        |path: Option<&String>| path.and_then(|p| lookup(record, p)).and_then(parse_number);

    NormalizedJob {
        title: text(Some(&mapping.title)).unwrap_or_default(),
        company_name: text(mapping.company.as_ref()),
        location: text(mapping.location.as_ref()),
        department: text(mapping.department.as_ref()),
        job_type: text(mapping.job_type.as_ref()),
        experience_level: text(mapping.experience_level.as_ref()),
        salary_min: number(mapping.salary_min.as_ref()),
        salary_max: number(mapping.salary_max.as_ref()),
        description: text(mapping.description.as_ref()),
        requirements: text(mapping.requirements.as_ref()),
        skills: mapping
            .skills
            .as_ref()
            .and_then(|p| lookup(record, p))
            .and_then(parse_skills),
        original_url: text(mapping.original_url.as_ref()),
        external_job_id: text(Some(&mapping.external_job_id)),
        source_website: String::new(),
    }
}

/// Resolve a path and clean string leaves on the way out.
fn lookup(record: &Value, path: &str) -> Option<Value> {
    match path::resolve(record, path)? {
        Value::String(s) => Some(Value::String(clean_text(s))),
        other => Some(other.clone()),
    }
}

/// Collapse whitespace runs (newlines and tabs included) and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn as_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(clean_text(s)),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Null | Value::Object(_) => None,
    }
}

/// Numbers pass through; strings keep only digits and dots and parse as the
/// longest leading float. No unit multipliers are applied ("15k" is 15).
pub fn parse_number(value: Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let stripped: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            leading_float(&stripped)
        }
        _ => None,
    }
}

fn leading_float(s: &str) -> Option<f64> {
    let mut seen_dot = false;
    let end = s
        .char_indices()
        .find(|&(_, c)| {
            if c == '.' {
                if seen_dot {
                    return true;
                }
                seen_dot = true;
            }
            false
        })
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let candidate = &s[..end];
    if !candidate.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    candidate.parse::<f64>().ok()
}

const SKILL_DELIMITERS: [char; 4] = [',', '，', ';', '；'];

pub fn parse_skills(value: Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(SKILL_DELIMITERS)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(String::from)
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping() -> FieldMapping {
        FieldMapping {
            title: "name".into(),
            external_job_id: "id".into(),
            location: Some("city".into()),
            salary_min: Some("pay.min".into()),
            salary_max: Some("pay.max".into()),
            skills: Some("tags".into()),
            ..Default::default()
        }
    }

    #[test]
    fn cleans_whitespace_in_strings() {
        let record = json!({ "name": "  Backend\n\tEngineer   (Rust) ", "id": "A1" });
        let job = map_record(&record, &mapping());
        assert_eq!(job.title, "Backend Engineer (Rust)");
        assert_eq!(job.external_job_id.as_deref(), Some("A1"));
        assert!(job.source_website.is_empty());
    }

    #[test]
    fn salary_strips_units_without_multiplying() {
        let record = json!({ "name": "x", "pay": { "min": "15k", "max": 30000 } });
        let job = map_record(&record, &mapping());
        assert_eq!(job.salary_min, Some(15.0));
        assert_eq!(job.salary_max, Some(30000.0));

        assert_eq!(parse_number(json!("1.5万/月")), Some(1.5));
        assert_eq!(parse_number(json!("1.2.3")), Some(1.2));
        assert_eq!(parse_number(json!("negotiable")), None);
        assert_eq!(parse_number(json!(true)), None);
    }

    #[test]
    fn skills_split_on_ascii_and_fullwidth_delimiters() {
        let record = json!({ "name": "x", "tags": "Go, Rust；Python" });
        let job = map_record(&record, &mapping());
        assert_eq!(
            job.skills,
            Some(vec!["Go".to_string(), "Rust".to_string(), "Python".to_string()])
        );

        assert_eq!(
            parse_skills(json!(["k8s", 3])),
            Some(vec!["k8s".to_string(), "3".to_string()])
        );
        assert_eq!(parse_skills(json!({ "a": 1 })), None);
    }

    #[test]
    fn validity_gate_needs_title_or_id() {
        let blank = map_record(&json!({ "name": "" }), &mapping());
        assert!(!blank.is_acceptable());

        let id_only = map_record(&json!({ "id": 42 }), &mapping());
        assert_eq!(id_only.external_job_id.as_deref(), Some("42"));
        assert!(id_only.is_acceptable());

        let title_only = map_record(&json!({ "name": "SRE" }), &mapping());
        assert!(title_only.is_acceptable());
    }

    #[test]
    fn scalar_arrays_join_into_text() {
        let record = json!({ "name": "x", "city": ["Shenzhen", " Beijing "] });
        let job = map_record(&record, &mapping());
        assert_eq!(job.location.as_deref(), Some("Shenzhen, Beijing"));

        let nested = map_record(&json!({ "name": "x", "city": { "n": 1 } }), &mapping());
        assert_eq!(nested.location, None);
    }

    #[test]
    fn mapping_deserializes_with_optional_fields() {
        let mapping: FieldMapping =
            serde_json::from_value(json!({ "title": "PostName", "department": "CategoryName" }))
                .unwrap();
        assert_eq!(mapping.title, "PostName");
        assert!(mapping.external_job_id.is_empty());
        assert_eq!(mapping.department.as_deref(), Some("CategoryName"));
    }
}
