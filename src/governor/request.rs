//! Logical search requests.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::governor::pagination::Page;

/// Searchable resource types of the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// Primary records.
    Projects,
    /// Records linked to projects.
    Publications,
}

impl Resource {
    /// Search endpoint path.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Projects => "/v2/projects/search",
            Resource::Publications => "/v2/publications/search",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Projects => "projects",
            Resource::Publications => "publications",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical search: what to look for and which page of it.
///
/// `offset` and `limit` are optional; absent values take the configured
/// defaults when the request is resolved against its pagination ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub resource: Resource,

    /// Filter object passed through to the API (`pi_names`, `fiscal_years`, ...).
    #[serde(default = "empty_object")]
    pub criteria: Value,

    /// Restrict the returned fields. Empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl SearchRequest {
    pub fn new(resource: Resource, criteria: Value) -> Self {
        Self {
            resource,
            criteria,
            include_fields: Vec::new(),
            offset: None,
            limit: None,
        }
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn include_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// JSON body sent to the search endpoint for the resolved `page`.
    ///
    /// This is also what the cache fingerprints, so two requests that only
    /// differ in whether they spelled out the default page share an entry.
    pub fn body(&self, page: Page) -> Value {
        let criteria = if self.criteria.is_null() {
            empty_object()
        } else {
            self.criteria.clone()
        };
        let mut body = json!({
            "criteria": criteria,
            "offset": page.offset,
            "limit": page.limit,
        });
        if !self.include_fields.is_empty() {
            body["include_fields"] = json!(self.include_fields);
        }
        body
    }
}
