//! Report schema
//!

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::attachment::Attachment;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize, Serialize, ToSchema)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

impl Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown risk level: {}", s))
    }
}

/// Browsers send `""` for an unselected risk level.
fn empty_risk_as_none<'de, D>(deserializer: D) -> Result<Option<RiskLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(val) if val.trim().is_empty() => Ok(None),
        Some(val) => RiskLevel::from_str(&val)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Only runs when the key is there, so a missing key stays `None`.
fn present_risk<'de, D>(deserializer: D) -> Result<Option<Option<RiskLevel>>, D::Error>
where
    D: Deserializer<'de>,
{
    empty_risk_as_none(deserializer).map(Some)
}

/// The user-supplied part of a report.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportFields {
    pub applicant_name: String,
    pub inspection_date: String,
    pub district: String,
    pub ds_division: String,
    pub gn_division: String,
    pub observations: String,
    #[serde(
        deserialize_with = "empty_risk_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub risk_level: Option<RiskLevel>,
    pub recommendation: String,
    pub attachments: Vec<Attachment>,
}

/// A stored hazard-inspection report.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Assigned by the server at creation, never changes
    pub id: i64,
    #[serde(flatten)]
    pub fields: ReportFields,
    /// UTC timestamp of the report creation, missing on incomplete records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn new(id: i64, fields: ReportFields) -> Self {
        Self {
            id,
            fields,
            created_at: Some(Utc::now()),
        }
    }
}

/// A partial update, every field present replaces the stored one wholesale.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspection_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ds_division: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gn_division: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    /// `Some(None)` clears the stored level, sent as `""` or `null`
    #[serde(
        default,
        deserialize_with = "present_risk",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<RiskLevel>)]
    pub risk_level: Option<Option<RiskLevel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl ReportPatch {
    /// Shallow merge over `report`; `id` and `createdAt` are never touched.
    pub fn apply(self, report: &mut Report) {
        let fields = &mut report.fields;
        if let Some(val) = self.applicant_name {
            fields.applicant_name = val;
        }
        if let Some(val) = self.inspection_date {
            fields.inspection_date = val;
        }
        if let Some(val) = self.district {
            fields.district = val;
        }
        if let Some(val) = self.ds_division {
            fields.ds_division = val;
        }
        if let Some(val) = self.gn_division {
            fields.gn_division = val;
        }
        if let Some(val) = self.observations {
            fields.observations = val;
        }
        if let Some(val) = self.risk_level {
            fields.risk_level = val;
        }
        if let Some(val) = self.recommendation {
            fields.recommendation = val;
        }
        if let Some(val) = self.attachments {
            fields.attachments = val;
        }
    }
}
