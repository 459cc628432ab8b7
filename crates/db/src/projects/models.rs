use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Prospect,
    Pitch,
    Active,
    Completed,
    Abandoned,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prospect => "prospect",
            Self::Pitch => "pitch",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "prospect" => Ok(Self::Prospect),
            "pitch" => Ok(Self::Pitch),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("unknown project status: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommercialModel {
    RevenueShare,
    FixedFee,
    Internal,
}

impl CommercialModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RevenueShare => "revenue_share",
            Self::FixedFee => "fixed_fee",
            Self::Internal => "internal",
        }
    }
}

impl FromStr for CommercialModel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "revenue_share" => Ok(Self::RevenueShare),
            "fixed_fee" => Ok(Self::FixedFee),
            "internal" => Ok(Self::Internal),
            _ => Err(format!("unknown commercial model: {value}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub client_id: Uuid,
    pub code: String,
    pub name: String,
    pub status: ProjectStatus,
    pub commercial_model: CommercialModel,
    /// Contract value in minor currency units (cents).
    pub amount_minor: i64,
    pub value_owner_id: Uuid,
    pub practice_id: Uuid,
    pub notes: Option<String>,
    pub external_deal_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
