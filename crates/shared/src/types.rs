//! Common types used across Praxis

use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Subscription tier for billing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Essential,
    Pro,
    Enterprise,
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        Self::Essential
    }
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn all() -> [SubscriptionTier; 3] {
        [Self::Essential, Self::Pro, Self::Enterprise]
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "essential" => Ok(Self::Essential),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown subscription tier '{}'", other)),
        }
    }
}

/// Stored subscription status
///
/// This is the persisted field on the user record. The status presented to
/// callers is computed at read time from this plus `trial_ends_at` /
/// `subscription_ends_at` (see `praxis-billing::subscriptions`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform role on a user record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Therapist,
    Admin,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// AI feature categories metered against monthly quotas
///
/// Each variant maps to one counter column on `monthly_usage` and one
/// ceiling column on `tier_limits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AiFeature {
    SessionAnalysis,
    TranscriptSummary,
    TreatmentPlan,
    ProgressReport,
    RiskAssessment,
    NoteAssist,
}

impl AiFeature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionAnalysis => "session_analysis",
            Self::TranscriptSummary => "transcript_summary",
            Self::TreatmentPlan => "treatment_plan",
            Self::ProgressReport => "progress_report",
            Self::RiskAssessment => "risk_assessment",
            Self::NoteAssist => "note_assist",
        }
    }

    /// Counter column on `monthly_usage` for this feature
    ///
    /// Also the ceiling column name on `tier_limits` with the `_count`
    /// suffix replaced by `_limit`. Both are compiled-in identifiers, never
    /// user input.
    pub fn counter_column(&self) -> &'static str {
        match self {
            Self::SessionAnalysis => "session_analysis_count",
            Self::TranscriptSummary => "transcript_summary_count",
            Self::TreatmentPlan => "treatment_plan_count",
            Self::ProgressReport => "progress_report_count",
            Self::RiskAssessment => "risk_assessment_count",
            Self::NoteAssist => "note_assist_count",
        }
    }

    pub fn limit_column(&self) -> &'static str {
        match self {
            Self::SessionAnalysis => "session_analysis_limit",
            Self::TranscriptSummary => "transcript_summary_limit",
            Self::TreatmentPlan => "treatment_plan_limit",
            Self::ProgressReport => "progress_report_limit",
            Self::RiskAssessment => "risk_assessment_limit",
            Self::NoteAssist => "note_assist_limit",
        }
    }

    pub fn all() -> [AiFeature; 6] {
        [
            Self::SessionAnalysis,
            Self::TranscriptSummary,
            Self::TreatmentPlan,
            Self::ProgressReport,
            Self::RiskAssessment,
            Self::NoteAssist,
        ]
    }
}

impl std::fmt::Display for AiFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AiFeature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session_analysis" => Ok(Self::SessionAnalysis),
            "transcript_summary" => Ok(Self::TranscriptSummary),
            "treatment_plan" => Ok(Self::TreatmentPlan),
            "progress_report" => Ok(Self::ProgressReport),
            "risk_assessment" => Ok(Self::RiskAssessment),
            "note_assist" => Ok(Self::NoteAssist),
            other => Err(format!("unknown AI feature '{}'", other)),
        }
    }
}

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

/// How a payment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    /// Applied from the client's prepaid credit balance
    CreditBalance,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::Transfer => "transfer",
            Self::CreditBalance => "credit_balance",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "transfer" => Ok(Self::Transfer),
            "credit_balance" => Ok(Self::CreditBalance),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

/// Therapy session scheduling status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TherapySessionStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl TherapySessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

/// Clinical note category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Progress,
    Intake,
    TreatmentPlan,
    Discharge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn tier_round_trips_through_str() {
        for tier in SubscriptionTier::all() {
            assert_eq!(SubscriptionTier::from_str(tier.as_str()), Ok(tier));
        }
    }

    #[test]
    fn feature_columns_are_distinct() {
        let mut counters: Vec<&str> = AiFeature::all().iter().map(|f| f.counter_column()).collect();
        counters.sort_unstable();
        counters.dedup();
        assert_eq!(counters.len(), 6);
    }

    #[test]
    fn unknown_feature_is_rejected() {
        assert!(AiFeature::from_str("dream_interpretation").is_err());
    }
}
