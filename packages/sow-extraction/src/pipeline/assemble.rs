//! Result assembly: compliance flags, summary numbers and the envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::completeness;
use crate::types::envelope::{FollowUpItem, ResultEnvelope, RunWarning, Summary};
use crate::types::record::{Attribution, SourceId, SowRecord};
use crate::types::source::{HolderContext, SourceType};

const LOAN_WORDS: &[&str] = &["loan", "repay", "paid back", "owe", "debt", "thank you"];
const APPROXIMATE_WORDS: &[&str] = &[
    "around",
    "approximately",
    "about",
    "roughly",
    "circa",
    "estimate",
    "maybe",
    "~",
];
const CONTINGENT_WORDS: &[&str] = &[
    "earnout",
    "earn-out",
    "pending",
    "expected",
    "subject to",
    "contingent",
    "deferred",
    "installment",
];
const VAGUE_PAY_WORDS: &[&str] = &["good", "decent", "reasonable", "high", "substantial", "significant"];
const AMOUNT_FIELDS: &[&str] = &[
    "gift_value",
    "amount_inherited",
    "settlement_amount",
    "sale_proceeds",
    "payout_amount",
    "gross_amount_won",
];

fn contains_any(value: &str, words: &[&str]) -> bool {
    let lower = value.to_lowercase();
    words.iter().any(|w| lower.contains(w))
}

/// Compliance concerns a reviewer should look at. Data-quality markers,
/// never errors.
pub fn compliance_flags(record: &SowRecord) -> Vec<String> {
    let mut flags = Vec::new();
    let get = |field: &str| record.value(field).unwrap_or_default();

    if record.source_type == SourceType::Gift
        && (contains_any(get("reason_for_gift"), LOAN_WORDS)
            || contains_any(get("donor_source_of_wealth"), LOAN_WORDS))
    {
        flags.push(
            "Ambiguous transaction: wording suggests a loan repayment or payment rather than a gift"
                .to_string(),
        );
    }

    for &field in AMOUNT_FIELDS {
        let value = get(field);
        if !value.is_empty() && contains_any(value, APPROXIMATE_WORDS) {
            flags.push(format!(
                "Estimated value: {field} '{value}' is approximate, exact amount should be verified"
            ));
        }
    }

    if matches!(
        record.source_type,
        SourceType::SaleOfBusiness | SourceType::SaleOfAsset | SourceType::SaleOfProperty
    ) && contains_any(get("sale_proceeds"), CONTINGENT_WORDS)
    {
        flags.push(
            "Contingent payment: sale proceeds include pending or deferred amounts".to_string(),
        );
    }

    if record.source_type == SourceType::EmploymentIncome {
        let pay = get("annual_compensation");
        if contains_any(pay, VAGUE_PAY_WORDS) && !pay.chars().any(|c| c.is_ascii_digit()) {
            flags.push(format!(
                "Vague compensation: '{pay}' is qualitative, a specific amount is required"
            ));
        }
    }

    if record.source_type == SourceType::LotteryWinnings
        && !record
            .fields
            .iter()
            .any(|(name, value)| name.contains("verification") && value.is_populated())
    {
        flags.push(
            "Missing verification: lottery winnings require payout confirmation".to_string(),
        );
    }

    if record.attribution == Some(Attribution::Ambiguous) {
        flags.push("Ambiguous attribution: cannot tell which joint holder this belongs to".to_string());
    }

    flags
}

/// Summary numbers over the final records.
pub fn summarize(records: &[SowRecord], merges: usize) -> Summary {
    let fully_complete = records.iter().filter(|r| r.is_complete()).count();
    let links: usize = records.iter().map(|r| r.links.len()).sum();
    Summary {
        total_sources_identified: records.len(),
        fully_complete_sources: fully_complete,
        sources_with_missing_fields: records.len() - fully_complete,
        overall_completeness_score: completeness::aggregate(records),
        // Each link is stored on both ends.
        overlap_links: links / 2,
        merges_performed: merges,
    }
}

/// Everything the envelope is built from.
#[derive(Debug)]
pub struct AssemblyInput {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub metadata: HolderContext,
    pub records: Vec<SowRecord>,
    pub retired_ids: BTreeMap<SourceId, SourceId>,
    pub merges: usize,
    pub follow_ups: Vec<FollowUpItem>,
    pub follow_up_questions: Vec<String>,
    pub warnings: Vec<RunWarning>,
}

/// Build the envelope. Records are emitted in identifier order with
/// compliance flags attached.
pub fn assemble(input: AssemblyInput) -> ResultEnvelope {
    let AssemblyInput {
        run_id,
        started_at,
        metadata,
        mut records,
        retired_ids,
        merges,
        follow_ups,
        follow_up_questions,
        warnings,
    } = input;

    records.sort_by_key(|r| r.source_id);
    for record in &mut records {
        for flag in compliance_flags(record) {
            if !record.compliance_flags.contains(&flag) {
                record.compliance_flags.push(flag);
            }
        }
    }

    let summary = summarize(&records, merges);
    ResultEnvelope {
        run_id,
        started_at,
        finished_at: Utc::now(),
        metadata,
        sources_of_wealth: records,
        summary,
        follow_ups,
        follow_up_questions,
        retired_ids,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record_with;

    #[test]
    fn test_gift_flags() {
        let record = record_with(
            SourceType::Gift,
            &[
                ("donor_name", "Margaret Hill"),
                ("gift_value", "around £50,000"),
                ("reason_for_gift", "Paid back a loan from 2015"),
            ],
        );
        let flags = compliance_flags(&record);
        assert_eq!(flags.len(), 2);
        assert!(flags[0].starts_with("Ambiguous transaction"));
        assert!(flags[1].starts_with("Estimated value: gift_value"));
    }

    #[test]
    fn test_contingent_and_vague_pay() {
        let sale = record_with(
            SourceType::SaleOfBusiness,
            &[("sale_proceeds", "£2m upfront plus £1m earnout")],
        );
        assert!(compliance_flags(&sale)[0].starts_with("Contingent payment"));

        let job = record_with(
            SourceType::EmploymentIncome,
            &[("annual_compensation", "a good salary")],
        );
        assert!(compliance_flags(&job)[0].starts_with("Vague compensation"));

        let paid = record_with(
            SourceType::EmploymentIncome,
            &[("annual_compensation", "high, around 95,000")],
        );
        assert!(compliance_flags(&paid).is_empty());
    }

    #[test]
    fn test_lottery_needs_verification() {
        let bare = record_with(SourceType::LotteryWinnings, &[("lottery_name", "EuroMillions")]);
        assert_eq!(compliance_flags(&bare).len(), 1);

        let verified = record_with(
            SourceType::LotteryWinnings,
            &[
                ("lottery_name", "EuroMillions"),
                ("verification_documents", "Camelot payout letter"),
            ],
        );
        assert!(compliance_flags(&verified).is_empty());
    }

    #[test]
    fn test_summary_counts_links_once() {
        let mut a = record_with(
            SourceType::LotteryWinnings,
            &[
                ("lottery_name", "EuroMillions"),
                ("win_date", "2018"),
                ("gross_amount_won", "£1m"),
                ("country_of_win", "UK"),
            ],
        );
        let mut b = record_with(SourceType::Gift, &[("donor_name", "Margaret Hill")]);
        b.source_id = SourceId::new(2);
        a.links.insert(b.source_id);
        b.links.insert(a.source_id);

        let summary = summarize(&[a, b], 1);
        assert_eq!(summary.total_sources_identified, 2);
        assert_eq!(summary.fully_complete_sources, 1);
        assert_eq!(summary.sources_with_missing_fields, 1);
        assert_eq!(summary.overlap_links, 1);
        assert_eq!(summary.merges_performed, 1);
        assert!((summary.overall_completeness_score - (1.0 + 1.0 / 6.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_assemble_orders_records_and_is_stable() {
        let mut later = record_with(SourceType::Gift, &[("donor_name", "Margaret Hill")]);
        later.source_id = SourceId::new(3);
        let earlier = record_with(SourceType::LotteryWinnings, &[]);

        let input = || AssemblyInput {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            metadata: HolderContext::unknown(),
            records: vec![later.clone(), earlier.clone()],
            retired_ids: BTreeMap::new(),
            merges: 0,
            follow_ups: vec![],
            follow_up_questions: vec![],
            warnings: vec![],
        };
        let envelope = assemble(input());
        let ids: Vec<String> = envelope
            .sources_of_wealth
            .iter()
            .map(|r| r.source_id.to_string())
            .collect();
        assert_eq!(ids, vec!["SOW_001", "SOW_003"]);
        assert_eq!(envelope.sources_of_wealth[0].compliance_flags.len(), 1);
    }
}
