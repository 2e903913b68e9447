//! Report validation rules, per wizard step and for the whole report
//!

use serde::{Deserialize, Serialize};

use crate::report::{ReportFields, RiskLevel};

pub const MIN_OBSERVATIONS_CHARS: usize = 10;
pub const MIN_HIGH_RISK_RECOMMENDATION_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Step {
    General = 1,
    Location = 2,
    Observations = 3,
    Risk = 4,
    Recommendation = 5,
    Review = 6,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::General,
        Step::Location,
        Step::Observations,
        Step::Risk,
        Step::Recommendation,
        Step::Review,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn title(&self) -> &'static str {
        match self {
            Step::General => "General Information",
            Step::Location => "Location Details",
            Step::Observations => "Site Observations",
            Step::Risk => "Risk Assessment",
            Step::Recommendation => "Recommendations",
            Step::Review => "Review",
        }
    }

    pub fn next(&self) -> Option<Step> {
        Step::try_from(self.number() + 1).ok()
    }

    pub fn prev(&self) -> Option<Step> {
        Step::try_from(self.number().checked_sub(1)?).ok()
    }

    /// Every rule this step enforces that `fields` breaks.
    pub fn violations(&self, fields: &ReportFields) -> Vec<String> {
        let mut messages = Vec::new();
        match self {
            Step::General => {
                if is_blank(&fields.applicant_name) {
                    messages.push("Applicant name is required".to_string());
                }
                if is_blank(&fields.inspection_date) {
                    messages.push("Inspection date is required".to_string());
                }
            }
            Step::Location => {
                if is_blank(&fields.district) {
                    messages.push("District is required".to_string());
                }
                if is_blank(&fields.ds_division) {
                    messages.push("DS division is required".to_string());
                }
                if is_blank(&fields.gn_division) {
                    messages.push("GN division is required".to_string());
                }
            }
            Step::Observations => {
                if char_len(&fields.observations) < MIN_OBSERVATIONS_CHARS {
                    messages.push(format!(
                        "Observations must be at least {} characters",
                        MIN_OBSERVATIONS_CHARS
                    ));
                }
            }
            Step::Risk => {
                if fields.risk_level.is_none() {
                    messages.push("Select a risk level".to_string());
                }
            }
            Step::Recommendation => {
                if fields.risk_level == Some(RiskLevel::High)
                    && char_len(&fields.recommendation) < MIN_HIGH_RISK_RECOMMENDATION_CHARS
                {
                    messages.push(format!(
                        "Recommendation must be at least {} characters for high risk reports",
                        MIN_HIGH_RISK_RECOMMENDATION_CHARS
                    ));
                }
            }
            Step::Review => {}
        }
        messages
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> Self {
        step.number()
    }
}

impl TryFrom<u8> for Step {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Step::ALL
            .into_iter()
            .find(|step| step.number() == value)
            .ok_or_else(|| format!("No wizard step {}", value))
    }
}

/// Re-runs every step's rules, used before a report is submitted.
pub fn validate_report(fields: &ReportFields) -> Result<(), Vec<String>> {
    let messages: Vec<String> = Step::ALL
        .iter()
        .flat_map(|step| step.violations(fields))
        .collect();
    match messages.is_empty() {
        true => Ok(()),
        false => Err(messages),
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Length in characters as typed, surrounding whitespace included.
fn char_len(value: &str) -> usize {
    value.chars().count()
}
