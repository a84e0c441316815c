//! Knowledge Store Schema
//!
//! Data structures for holons, evidence, relations and waivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// Bounded context used when none is configured
pub const DEFAULT_CONTEXT_ID: &str = "default";

/// Congruence level meaning "same bounded context, no discount"
pub const DEFAULT_CONGRUENCE_LEVEL: i64 = 3;

/// What a holon records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolonType {
    Hypothesis,
    Decision,
    #[serde(rename = "DRR")]
    Drr,
}

impl HolonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HolonType::Hypothesis => "hypothesis",
            HolonType::Decision => "decision",
            HolonType::Drr => "DRR",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "decision" => HolonType::Decision,
            "DRR" | "drr" => HolonType::Drr,
            _ => HolonType::Hypothesis,
        }
    }
}

/// Whether a claim is about a built system or about a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolonKind {
    /// Code / architecture claims
    System,
    /// Process / methodology claims
    Episteme,
}

impl HolonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HolonKind::System => "system",
            HolonKind::Episteme => "episteme",
        }
    }

    /// Strict parse; unknown kinds are rejected by callers
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(HolonKind::System),
            "episteme" => Some(HolonKind::Episteme),
            _ => None,
        }
    }

    /// Propagating relation used when this kind depends on another holon
    pub fn dependency_relation(&self) -> RelationType {
        match self {
            HolonKind::System => RelationType::ComponentOf,
            HolonKind::Episteme => RelationType::ConstituentOf,
        }
    }
}

/// Evidentiary maturity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Unsubstantiated
    L0,
    /// Logically verified
    L1,
    /// Empirically validated
    L2,
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "DRR")]
    Drr,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::L0 => "L0",
            Layer::L1 => "L1",
            Layer::L2 => "L2",
            Layer::Invalid => "invalid",
            Layer::Drr => "DRR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "L0" => Some(Layer::L0),
            "L1" => Some(Layer::L1),
            "L2" => Some(Layer::L2),
            "invalid" => Some(Layer::Invalid),
            "DRR" => Some(Layer::Drr),
            _ => None,
        }
    }

    /// Layers that have a directory under `knowledge/`
    pub fn is_projected(&self) -> bool {
        !matches!(self, Layer::Drr)
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded by an evidence row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Degrade,
    Fail,
    Refine,
}

impl Verdict {
    /// Case-insensitive parse
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pass" => Some(Verdict::Pass),
            "degrade" => Some(Verdict::Degrade),
            "fail" => Some(Verdict::Fail),
            "refine" => Some(Verdict::Refine),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Degrade => "degrade",
            Verdict::Fail => "fail",
            Verdict::Refine => "refine",
        }
    }
}

/// Typed edge between two holon ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationType {
    /// part -> whole
    #[serde(rename = "componentOf")]
    ComponentOf,
    /// episteme analogue of componentOf
    #[serde(rename = "constituentOf")]
    ConstituentOf,
    /// dependent -> dependency
    #[serde(rename = "dependsOn")]
    DependsOn,
    /// alternative -> decision context
    #[serde(rename = "memberOf")]
    MemberOf,
    /// DRR -> chosen alternative
    #[serde(rename = "selects")]
    Selects,
    /// DRR -> rejected alternative
    #[serde(rename = "rejects")]
    Rejects,
    /// evidence -> holon
    #[serde(rename = "verifiedBy")]
    VerifiedBy,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::ComponentOf => "componentOf",
            RelationType::ConstituentOf => "constituentOf",
            RelationType::DependsOn => "dependsOn",
            RelationType::MemberOf => "memberOf",
            RelationType::Selects => "selects",
            RelationType::Rejects => "rejects",
            RelationType::VerifiedBy => "verifiedBy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "componentOf" => Some(RelationType::ComponentOf),
            "constituentOf" => Some(RelationType::ConstituentOf),
            "dependsOn" => Some(RelationType::DependsOn),
            "memberOf" => Some(RelationType::MemberOf),
            "selects" => Some(RelationType::Selects),
            "rejects" => Some(RelationType::Rejects),
            "verifiedBy" => Some(RelationType::VerifiedBy),
            _ => None,
        }
    }

    /// Whether reliability flows along this edge (weakest-link)
    pub fn propagates(&self) -> bool {
        matches!(
            self,
            RelationType::ComponentOf | RelationType::ConstituentOf | RelationType::DependsOn
        )
    }

    /// True when the edge source is the one that needs the target.
    /// componentOf/constituentOf point from the part to the whole, so
    /// there the target needs the source.
    pub fn source_is_dependent(&self) -> bool {
        matches!(self, RelationType::DependsOn)
    }
}

/// A knowledge unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holon {
    /// Stable slug
    pub id: String,
    pub holon_type: HolonType,
    pub kind: Option<HolonKind>,
    pub layer: Layer,
    pub title: String,
    pub content: String,
    /// Bounded-context grouping
    pub context_id: String,
    /// Where the claim applies
    pub scope: String,
    /// Winner id for DRR holons
    pub parent_id: Option<String>,
    pub cached_reliability: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a holon
#[derive(Debug, Clone)]
pub struct NewHolon {
    pub id: String,
    pub holon_type: HolonType,
    pub kind: Option<HolonKind>,
    pub layer: Layer,
    pub title: String,
    pub content: String,
    pub context_id: String,
    pub scope: String,
    pub parent_id: Option<String>,
}

impl NewHolon {
    /// A fresh L0 hypothesis in the given context
    pub fn hypothesis(
        id: impl Into<String>,
        kind: HolonKind,
        title: impl Into<String>,
        content: impl Into<String>,
        scope: impl Into<String>,
        context_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            holon_type: HolonType::Hypothesis,
            kind: Some(kind),
            layer: Layer::L0,
            title: title.into(),
            content: content.into(),
            context_id: context_id.into(),
            scope: scope.into(),
            parent_id: None,
        }
    }
}

/// A dated claim about a holon's validity. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub holon_id: String,
    /// Free-form: logic, empirical, audit_report, verification...
    pub evidence_type: String,
    pub content: String,
    /// Stored lower-case
    pub verdict: String,
    /// Level this evidence licenses promotion to
    pub assurance_level: Option<String>,
    /// Pointer to the artifact that produced it
    pub carrier_ref: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Evidence {
    /// Expiry is judged at read time against `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.map(|until| now > until).unwrap_or(false)
    }
}

/// Fields required to record evidence
#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub id: String,
    pub holon_id: String,
    pub evidence_type: String,
    pub content: String,
    pub verdict: String,
    pub assurance_level: Option<String>,
    pub carrier_ref: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Directed, typed edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    /// 1..=3; None when the row carries no level
    pub congruence_level: Option<i64>,
}

/// A dependency as seen from the holon that needs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub holon_id: String,
    pub congruence_level: Option<i64>,
}

/// Result of a guarded relation insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOutcome {
    Created,
    /// The edge would have closed a cycle and was not written
    SkippedCycle,
}

/// Time-boxed exemption from decay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waiver {
    pub id: String,
    pub evidence_id: String,
    pub waived_by: String,
    pub waived_until: DateTime<Utc>,
    pub rationale: String,
}

impl Waiver {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.waived_until > now
    }
}

/// Expired, unwaived evidence row for the freshness report
#[derive(Debug, Clone)]
pub struct StaleEvidence {
    pub evidence_id: String,
    pub holon_id: String,
    pub holon_title: String,
    pub holon_layer: String,
    pub evidence_type: String,
    pub days_overdue: i64,
}

/// Active waiver joined with its holon for reporting
#[derive(Debug, Clone)]
pub struct WaiverReport {
    pub evidence_id: String,
    pub holon_id: String,
    pub holon_title: String,
    pub waived_until: DateTime<Utc>,
    pub waived_by: String,
    pub rationale: String,
    pub days_until_expiry: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_verdict_parse_is_case_insensitive() {
        assert_eq!(Verdict::parse("PASS"), Some(Verdict::Pass));
        assert_eq!(Verdict::parse("Degrade"), Some(Verdict::Degrade));
        assert_eq!(Verdict::parse("fail"), Some(Verdict::Fail));
        assert_eq!(Verdict::parse("maybe"), None);
    }

    #[test]
    fn test_propagating_relations() {
        assert!(RelationType::ComponentOf.propagates());
        assert!(RelationType::ConstituentOf.propagates());
        assert!(RelationType::DependsOn.propagates());
        assert!(!RelationType::MemberOf.propagates());
        assert!(!RelationType::Selects.propagates());
        assert!(!RelationType::VerifiedBy.propagates());
    }

    #[test]
    fn test_kind_picks_dependency_relation() {
        assert_eq!(
            HolonKind::System.dependency_relation(),
            RelationType::ComponentOf
        );
        assert_eq!(
            HolonKind::Episteme.dependency_relation(),
            RelationType::ConstituentOf
        );
    }

    #[test]
    fn test_layer_strings() {
        for layer in [Layer::L0, Layer::L1, Layer::L2, Layer::Invalid, Layer::Drr] {
            assert_eq!(Layer::parse(layer.as_str()), Some(layer));
        }
        assert!(!Layer::Drr.is_projected());
    }

    #[test]
    fn test_evidence_expiry_and_waiver_window() {
        let now = Utc::now();
        let evidence = Evidence {
            id: "e1".to_string(),
            holon_id: "h".to_string(),
            evidence_type: "test".to_string(),
            content: String::new(),
            verdict: "pass".to_string(),
            assurance_level: None,
            carrier_ref: None,
            valid_until: Some(now - Duration::days(1)),
            created_at: now,
        };
        assert!(evidence.is_expired_at(now));

        let waiver = Waiver {
            id: "w".to_string(),
            evidence_id: "e1".to_string(),
            waived_by: "user".to_string(),
            waived_until: now + Duration::days(2),
            rationale: "pending rerun".to_string(),
        };
        assert!(waiver.is_active_at(now));
        assert!(!waiver.is_active_at(now + Duration::days(3)));
    }
}
