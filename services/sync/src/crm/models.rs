use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One deal record from the CRM search API. Property values arrive as
/// strings; typed access goes through the helper methods. Transient: a deal
/// lives only for the duration of one reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, Option<String>>,
}

impl Deal {
    /// A property value, treating absent and empty-string as missing.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(|v| v.as_deref())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.property("dealname")
    }

    pub fn stage(&self) -> Option<&str> {
        self.property("dealstage")
    }

    pub fn pipeline(&self) -> Option<&str> {
        self.property("pipeline")
    }

    pub fn amount(&self) -> Option<&str> {
        self.property("amount")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<Deal>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl SearchResponse {
    pub fn next_cursor(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .map(|n| n.after.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<PagingNext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagingNext {
    pub after: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    #[serde(default)]
    pub properties: CompanyProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProperties {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub industry: Option<String>,
}

impl Company {
    /// Best available display name: name, then domain.
    pub fn display_name(&self) -> Option<&str> {
        self.properties
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.properties.domain.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationResponse {
    #[serde(default)]
    pub results: Vec<AssociationRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmPipeline {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub stages: Vec<CrmStage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmStage {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelinesResponse {
    #[serde(default)]
    pub results: Vec<CrmPipeline>,
}
