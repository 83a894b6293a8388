//! Follow-up hand-off: the remaining missing fields, and questions for the
//! client about them.

use std::time::Duration;

use tracing::{debug, warn};

use super::completeness::REASON_INHERITED_PROPERTY;
use crate::knowledge::KnowledgeBase;
use crate::traits::capability::FollowUpWriter;
use crate::types::config::{FollowUpConfig, RetryPolicy};
use crate::types::envelope::{FollowUpItem, Phase, RunWarning};
use crate::types::record::SowRecord;
use crate::types::source::HolderContext;

/// One item per remaining missing field, in record order.
pub fn follow_up_items(records: &[SowRecord]) -> Vec<FollowUpItem> {
    records
        .iter()
        .flat_map(|record| {
            record.missing_fields.iter().map(|m| FollowUpItem {
                source_id: record.source_id,
                field_name: m.field_name.clone(),
                reason: m.reason.clone(),
            })
        })
        .collect()
}

/// Deterministic questions: at most `per_record` per record and `total`
/// overall, skipping fields that do not apply.
pub fn fallback_questions(
    records: &[SowRecord],
    kb: &KnowledgeBase,
    config: &FollowUpConfig,
) -> Vec<String> {
    let mut questions = Vec::new();
    for record in records {
        let asked = record
            .missing_fields
            .iter()
            .filter(|m| m.reason != REASON_INHERITED_PROPERTY)
            .take(config.per_record);
        for missing in asked {
            if questions.len() >= config.total {
                return questions;
            }
            let readable = kb
                .field(record.source_type, &missing.field_name)
                .map(|spec| spec.readable_name())
                .unwrap_or_else(|| missing.field_name.replace('_', " "));
            questions.push(format!("For {}: What is the {readable}?", record.description));
        }
    }
    questions
}

/// Ask the follow-up capability to phrase questions, falling back to the
/// deterministic ones when it is absent, fails or returns nothing.
#[allow(clippy::too_many_arguments)]
pub async fn phrase_questions(
    writer: Option<&dyn FollowUpWriter>,
    holder: &HolderContext,
    records: &[SowRecord],
    items: &[FollowUpItem],
    kb: &KnowledgeBase,
    config: &FollowUpConfig,
    retry: &RetryPolicy,
    call_timeout: Duration,
) -> (Vec<String>, Option<RunWarning>) {
    if items.is_empty() {
        return (Vec::new(), None);
    }

    let Some(writer) = writer else {
        return (fallback_questions(records, kb, config), None);
    };

    match retry
        .run("follow_up", Some(call_timeout), || {
            writer.phrase_questions(holder, items)
        })
        .await
    {
        Ok(questions) if !questions.is_empty() => {
            debug!(count = questions.len(), "Follow-up questions phrased");
            (questions, None)
        }
        Ok(_) => (fallback_questions(records, kb, config), None),
        Err(e) => {
            warn!(error = %e, "Follow-up writer failed, using fallback questions");
            let warning =
                RunWarning::new(Phase::FollowUp, format!("follow-up writer failed: {e}"));
            (fallback_questions(records, kb, config), Some(warning))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record_with, MockFollowUp};
    use crate::types::record::SourceId;
    use crate::types::source::SourceType;

    fn records() -> Vec<SowRecord> {
        let mut gift = record_with(SourceType::Gift, &[("donor_name", "Margaret Hill")]);
        gift.source_id = SourceId::new(2);
        vec![
            record_with(
                SourceType::LotteryWinnings,
                &[("lottery_name", "EuroMillions"), ("win_date", "2018")],
            ),
            gift,
        ]
    }

    #[test]
    fn test_items_in_record_order() {
        let items = follow_up_items(&records());
        assert_eq!(items.len(), 2 + 5);
        assert_eq!(items[0].source_id.to_string(), "SOW_001");
        assert_eq!(items[0].field_name, "gross_amount_won");
        assert_eq!(items[2].source_id.to_string(), "SOW_002");
        assert_eq!(items[2].field_name, "relationship_to_donor");
    }

    #[test]
    fn test_fallback_limits() {
        let kb = KnowledgeBase::bundled().unwrap();
        let questions = fallback_questions(&records(), &kb, &FollowUpConfig::default());
        assert_eq!(questions.len(), 4);
        assert_eq!(
            questions[0],
            "For Winnings from EuroMillions: What is the gross amount won?"
        );

        let tight = FollowUpConfig {
            per_record: 2,
            total: 3,
        };
        assert_eq!(fallback_questions(&records(), &kb, &tight).len(), 3);
    }

    #[tokio::test]
    async fn test_writer_failure_falls_back() {
        let kb = KnowledgeBase::bundled().unwrap();
        let records = records();
        let items = follow_up_items(&records);
        let writer = MockFollowUp::new().failing();

        let (questions, warning) = phrase_questions(
            Some(&writer),
            &HolderContext::unknown(),
            &records,
            &items,
            &kb,
            &FollowUpConfig::default(),
            &RetryPolicy::none(),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(questions.len(), 4);
        assert_eq!(warning.unwrap().phase, Phase::FollowUp);
    }

    #[tokio::test]
    async fn test_writer_questions_used() {
        let kb = KnowledgeBase::bundled().unwrap();
        let records = records();
        let items = follow_up_items(&records);
        let writer = MockFollowUp::new().with_questions(vec!["How much did you win?".into()]);

        let (questions, warning) = phrase_questions(
            Some(&writer),
            &HolderContext::unknown(),
            &records,
            &items,
            &kb,
            &FollowUpConfig::default(),
            &RetryPolicy::none(),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(questions, vec!["How much did you win?".to_string()]);
        assert!(warning.is_none());
        assert_eq!(writer.received().len(), items.len());
    }
}
