//! `Bundle` assembly for search results and version history.

use crate::history::{HistoryAction, VersionHistoryEntry};
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("history snapshot {resource_type}/{resource_id}/_history/{version_id} is not valid JSON: {source}")]
    Snapshot {
        resource_type: String,
        resource_id: String,
        version_id: i32,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleType {
    Searchset,
    History,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: &'static str,
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    pub total: usize,
    pub link: Vec<BundleLink>,
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    fn new(bundle_type: BundleType, total: usize) -> Self {
        Self {
            resource_type: "Bundle",
            bundle_type,
            total,
            link: Vec::new(),
            entry: Vec::new(),
        }
    }

    pub fn link_url(&self, relation: &str) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == relation)
            .map(|l| l.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

impl BundleLink {
    fn new(relation: &str, url: String) -> Self {
        Self {
            relation: relation.to_string(),
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<BundleEntrySearch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleEntryRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<BundleEntryResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleEntrySearch {
    pub mode: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleEntryRequest {
    pub method: &'static str,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntryResponse {
    pub status: String,
    pub etag: String,
    pub last_modified: String,
}

/// Paging context of a searchset.
#[derive(Debug, Clone, Copy)]
pub struct SearchBundleLinks<'a> {
    /// FHIR base, e.g. `https://ehr.example.org/fhir`; prefixes entry `fullUrl`s.
    pub server_base_url: &'a str,
    /// Search endpoint the links point at, e.g. `https://ehr.example.org/fhir/CarePlan`.
    pub base_url: &'a str,
    /// Original query string without the leading `?`.
    pub query: &'a str,
    pub count: usize,
    pub offset: usize,
    pub total: usize,
}

impl SearchBundleLinks<'_> {
    /// The request's query with only `_count` and `_offset` rewritten.
    fn page_url(&self, offset: usize) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in url::form_urlencoded::parse(self.query.as_bytes()) {
            if key != "_count" && key != "_offset" {
                serializer.append_pair(&key, &value);
            }
        }
        serializer.append_pair("_count", &self.count.to_string());
        serializer.append_pair("_offset", &offset.to_string());
        format!("{}?{}", self.base_url, serializer.finish())
    }
}

/// Build a searchset bundle with `self`, and when applicable `next` and
/// `previous`, links. A `_count=0` page has no neighbours.
pub fn search_bundle_with_links(resources: Vec<JsonValue>, links: &SearchBundleLinks) -> Bundle {
    let mut bundle = Bundle::new(BundleType::Searchset, links.total);

    bundle
        .link
        .push(BundleLink::new("self", links.page_url(links.offset)));
    if links.count > 0 && links.offset + links.count < links.total {
        bundle.link.push(BundleLink::new(
            "next",
            links.page_url(links.offset + links.count),
        ));
    }
    if links.count > 0 && links.offset > 0 {
        bundle.link.push(BundleLink::new(
            "previous",
            links.page_url(links.offset.saturating_sub(links.count)),
        ));
    }

    bundle.entry = resources
        .into_iter()
        .map(|resource| {
            let full_url = match (
                resource.get("resourceType").and_then(JsonValue::as_str),
                resource.get("id").and_then(JsonValue::as_str),
            ) {
                (Some(rt), Some(id)) => Some(format!("{}/{}/{}", links.server_base_url, rt, id)),
                _ => None,
            };
            BundleEntry {
                full_url,
                resource: Some(resource),
                search: Some(BundleEntrySearch { mode: "match" }),
                request: None,
                response: None,
            }
        })
        .collect();

    bundle
}

/// Build the history bundle of one resource, newest version first.
///
/// `base_url` is the FHIR base; delete entries carry no resource. The `self`
/// link is present even when the page is empty.
pub fn history_bundle(
    resource_type: &str,
    resource_id: &str,
    entries: &[VersionHistoryEntry],
    total: usize,
    base_url: &str,
) -> Result<Bundle, BundleError> {
    let mut bundle = Bundle::new(BundleType::History, total);
    bundle.link.push(BundleLink::new(
        "self",
        format!("{}/{}/{}/_history", base_url, resource_type, resource_id),
    ));

    let mut ordered: Vec<&VersionHistoryEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| b.version_id.cmp(&a.version_id));

    for entry in ordered {
        let resource = if entry.is_delete() {
            None
        } else {
            Some(entry.resource().map_err(|source| BundleError::Snapshot {
                resource_type: entry.resource_type.clone(),
                resource_id: entry.resource_id.clone(),
                version_id: entry.version_id,
                source,
            })?)
        };

        let request_url = match entry.action {
            HistoryAction::Create => entry.resource_type.clone(),
            _ => format!("{}/{}", entry.resource_type, entry.resource_id),
        };
        let status = match entry.action {
            HistoryAction::Create => "201 Created",
            HistoryAction::Update => "200 OK",
            HistoryAction::Delete => "204 No Content",
        };

        bundle.entry.push(BundleEntry {
            full_url: Some(format!(
                "{}/{}/{}",
                base_url, entry.resource_type, entry.resource_id
            )),
            resource,
            search: None,
            request: Some(BundleEntryRequest {
                method: entry.action.http_method(),
                url: request_url,
            }),
            response: Some(BundleEntryResponse {
                status: status.to_string(),
                etag: format!("W/\"{}\"", entry.version_id),
                last_modified: entry
                    .recorded_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        });
    }

    Ok(bundle)
}
