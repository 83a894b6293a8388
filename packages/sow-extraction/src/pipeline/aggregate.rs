//! Aggregation: flatten candidates, put them in canonical order, assign
//! identifiers and build whole records.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tracing::debug;

use super::completeness;
use crate::knowledge::KnowledgeBase;
use crate::types::evidence::EvidenceTrail;
use crate::types::record::{
    normalize_value, CandidateRecord, FieldValue, SourceId, SowRecord, ValidationStatus,
};
use crate::types::source::SourceType;

/// Hands out `SOW_001`, `SOW_002`, ... Never reuses a number.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> SourceId {
        let id = SourceId::new(self.next);
        self.next += 1;
        id
    }
}

/// Sort candidates by source type, then capability index, then position.
///
/// The result does not depend on the order capabilities finished in.
pub fn canonical_order(candidates: &mut [CandidateRecord]) {
    candidates.sort_by_key(|c| (c.source_type, c.provenance.sort_key()));
}

/// Turn candidates into records with identifiers assigned in canonical order.
pub fn aggregate(
    mut candidates: Vec<CandidateRecord>,
    kb: &KnowledgeBase,
    ids: &mut IdAllocator,
) -> Vec<SowRecord> {
    canonical_order(&mut candidates);
    let records: Vec<SowRecord> = candidates
        .into_iter()
        .map(|c| build_record(c, kb, ids.allocate()))
        .collect();
    debug!(records = records.len(), "Aggregated candidates");
    records
}

/// Build a record from one candidate. Required fields come first in
/// knowledge-base order, supplementary fields after.
pub fn build_record(candidate: CandidateRecord, kb: &KnowledgeBase, id: SourceId) -> SowRecord {
    let CandidateRecord {
        source_type,
        mut fields,
        description,
        provenance,
    } = candidate;

    let mut ordered: IndexMap<String, FieldValue> = IndexMap::new();
    for spec in kb.required_fields(source_type) {
        let value = fields.shift_remove(&spec.name).flatten();
        ordered.insert(spec.name.clone(), FieldValue::extracted(value));
    }
    for (name, value) in fields {
        ordered.insert(name, FieldValue::extracted(value));
    }

    let description = normalize_value(description).unwrap_or_else(|| describe(source_type, &ordered));

    let mut record = SowRecord {
        source_id: id,
        source_type,
        description,
        fields: ordered,
        missing_fields: Vec::new(),
        completeness_score: 0.0,
        links: BTreeSet::new(),
        validation_status: ValidationStatus::Unvalidated,
        attribution: None,
        compliance_flags: Vec::new(),
        notes: Vec::new(),
        absorbed: Vec::new(),
        provenance: vec![provenance],
        evidence: EvidenceTrail::default(),
    };
    completeness::refresh(&mut record, kb);
    record
}

/// Human-readable description from type and key fields.
pub fn describe(source_type: SourceType, fields: &IndexMap<String, FieldValue>) -> String {
    let get = |name: &str| fields.get(name).and_then(|f| f.value.clone());
    let or = |name: &str, fallback: &str| get(name).unwrap_or_else(|| fallback.to_string());

    match source_type {
        SourceType::EmploymentIncome => {
            let title = or("job_title", "Employment");
            match get("employer_name") {
                Some(employer) => format!("{title} at {employer}"),
                None => title,
            }
        }
        SourceType::BusinessIncome => format!("Income from {}", or("business_name", "business")),
        SourceType::BusinessDividends => {
            format!("Dividends from {}", or("company_name", "company"))
        }
        SourceType::SaleOfBusiness => format!("Sale of {}", or("business_name", "business")),
        SourceType::SaleOfAsset => format!("Sale of {}", or("asset_description", "asset")),
        SourceType::SaleOfProperty => {
            format!("Sale of property: {}", or("property_address", "address unknown"))
        }
        SourceType::Inheritance => {
            format!("Inheritance from {}", or("deceased_name", "unknown person"))
        }
        SourceType::Gift => format!("Gift from {}", or("donor_name", "donor")),
        SourceType::DivorceSettlement => format!(
            "Divorce settlement from {}",
            or("former_spouse_name", "former spouse")
        ),
        SourceType::LotteryWinnings => format!("Winnings from {}", or("lottery_name", "lottery")),
        SourceType::InsurancePayout => {
            let provider = or("insurance_provider", "insurer");
            match get("policy_type") {
                Some(policy) => format!("{policy} payout from {provider}"),
                None => format!("Insurance payout from {provider}"),
            }
        }
    }
}
