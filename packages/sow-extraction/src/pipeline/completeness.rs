//! Completeness scoring and missing-field bookkeeping.

use indexmap::IndexMap;

use crate::error::{SchemaError, SchemaResult};
use crate::knowledge::{FieldSpec, KnowledgeBase};
use crate::types::record::{FieldValue, MissingField, SearchState, SowRecord};
use crate::types::source::SourceType;

pub const REASON_NOT_STATED: &str = "Not stated in narrative";
pub const REASON_EXHAUSTED: &str = "Searched narrative, no verifiable value";
pub const REASON_INHERITED_PROPERTY: &str = "Not applicable (property was inherited, not purchased)";

/// Share of required fields holding a non-empty value.
///
/// A type with no required fields has no defined score and is rejected.
pub fn score_required(
    source_type: SourceType,
    required: &[FieldSpec],
    fields: &IndexMap<String, FieldValue>,
) -> SchemaResult<f64> {
    if required.is_empty() {
        return Err(SchemaError::NoRequiredFields(source_type));
    }
    let present = required
        .iter()
        .filter(|spec| {
            fields
                .get(&spec.name)
                .and_then(|f| f.value.as_deref())
                .is_some_and(|v| !v.trim().is_empty())
        })
        .count();
    Ok(present as f64 / required.len() as f64)
}

/// Score a record against the knowledge base.
pub fn score(record: &SowRecord, kb: &KnowledgeBase) -> f64 {
    let required = kb.required_fields(record.source_type);
    // Validated knowledge bases never have empty required sets.
    score_required(record.source_type, required, &record.fields).unwrap_or(0.0)
}

/// Mean of per-record scores, or 0 when there are no records.
pub fn aggregate(records: &[SowRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.completeness_score).sum::<f64>() / records.len() as f64
}

/// Recompute score and missing-field list, keeping each missing field's
/// search state.
pub fn refresh(record: &mut SowRecord, kb: &KnowledgeBase) {
    let required = kb.required_fields(record.source_type);

    let missing: Vec<MissingField> = required
        .iter()
        .filter(|spec| !record.is_populated(&spec.name))
        .map(|spec| {
            let search_state = record
                .missing(&spec.name)
                .map_or(SearchState::Pending, |m| m.search_state);
            MissingField {
                field_name: spec.name.clone(),
                reason: missing_reason(record, &spec.name, search_state),
                search_state,
            }
        })
        .collect();

    record.missing_fields = missing;
    record.completeness_score = score(record, kb);
}

fn missing_reason(record: &SowRecord, field: &str, state: SearchState) -> String {
    if field == "original_purchase_price"
        && record
            .value("original_acquisition_method")
            .is_some_and(|m| m.to_lowercase().contains("inherit"))
    {
        return REASON_INHERITED_PROPERTY.to_string();
    }
    match state {
        SearchState::Exhausted => REASON_EXHAUSTED.to_string(),
        _ => REASON_NOT_STATED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record_with;

    #[test]
    fn test_score_counts_only_required_fields() {
        let kb = KnowledgeBase::bundled().unwrap();
        let mut record = record_with(
            SourceType::LotteryWinnings,
            &[
                ("lottery_name", "EuroMillions"),
                ("win_date", "June 2018"),
                ("ticket_number", "12345"),
            ],
        );
        refresh(&mut record, &kb);

        assert_eq!(record.completeness_score, 0.5);
        let missing: Vec<&str> = record
            .missing_fields
            .iter()
            .map(|m| m.field_name.as_str())
            .collect();
        assert_eq!(missing, vec!["gross_amount_won", "country_of_win"]);
        assert!(record
            .missing_fields
            .iter()
            .all(|m| m.reason == REASON_NOT_STATED && m.search_state == SearchState::Pending));
    }

    #[test]
    fn test_empty_string_is_null() {
        let kb = KnowledgeBase::bundled().unwrap();
        let mut record = record_with(
            SourceType::LotteryWinnings,
            &[
                ("lottery_name", "EuroMillions"),
                ("win_date", "June 2018"),
                ("gross_amount_won", "£1,000,000"),
            ],
        );
        record.fields.insert(
            "country_of_win".into(),
            FieldValue {
                value: Some("  ".into()),
                origin: crate::types::record::FieldOrigin::Extracted,
            },
        );
        assert_eq!(score(&record, &kb), 0.75);
    }

    #[test]
    fn test_full_record_scores_one() {
        let kb = KnowledgeBase::bundled().unwrap();
        let mut record = record_with(
            SourceType::LotteryWinnings,
            &[
                ("lottery_name", "EuroMillions"),
                ("win_date", "June 2018"),
                ("gross_amount_won", "£1,000,000"),
                ("country_of_win", "UK"),
            ],
        );
        refresh(&mut record, &kb);
        assert_eq!(record.completeness_score, 1.0);
        assert!(record.is_complete());
    }

    #[test]
    fn test_zero_required_fields_rejected() {
        let err = score_required(SourceType::Gift, &[], &IndexMap::new()).unwrap_err();
        assert!(matches!(err, SchemaError::NoRequiredFields(SourceType::Gift)));
    }

    #[test]
    fn test_inherited_property_reason() {
        let kb = KnowledgeBase::bundled().unwrap();
        let mut record = record_with(
            SourceType::SaleOfProperty,
            &[("original_acquisition_method", "Inherited from father")],
        );
        refresh(&mut record, &kb);
        assert_eq!(
            record.missing("original_purchase_price").unwrap().reason,
            REASON_INHERITED_PROPERTY
        );
    }

    #[test]
    fn test_exhausted_state_survives_refresh() {
        let kb = KnowledgeBase::bundled().unwrap();
        let mut record = record_with(SourceType::Gift, &[("donor_name", "Margaret Hill")]);
        refresh(&mut record, &kb);
        record.missing_fields[0].search_state = SearchState::Exhausted;
        refresh(&mut record, &kb);
        assert_eq!(record.missing_fields[0].search_state, SearchState::Exhausted);
        assert_eq!(record.missing_fields[0].reason, REASON_EXHAUSTED);
    }

    #[test]
    fn test_aggregate_of_nothing_is_zero() {
        assert_eq!(aggregate(&[]), 0.0);
    }
}
