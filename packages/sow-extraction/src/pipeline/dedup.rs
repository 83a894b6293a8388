//! Deduplication and overlap resolution.
//!
//! Two outcomes for a pair of records:
//! - **Merge**: same source type and matching identity keys. The
//!   lower-numbered record absorbs the other; the higher id is retired.
//! - **Link**: believed to come from the same real-world event but kept
//!   apart (a property sale whose proceeds funded a gift).
//!
//! Both are computed over records in canonical (id) order and iterated to
//! a fixpoint, so running dedup over its own output changes nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::completeness;
use crate::knowledge::{FieldFormat, KnowledgeBase};
use crate::text;
use crate::types::config::DedupConfig;
use crate::types::evidence::EvidenceEntry;
use crate::types::record::{Attribution, SourceId, SowRecord};
use crate::types::source::{HolderContext, SourceType};

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").unwrap());

const DEATH_TERMS: &[&str] = &["death", "died", "passed away", "passed", "deceased", "late"];

/// Retired identifier -> canonical identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasMap(BTreeMap<SourceId, SourceId>);

impl AliasMap {
    /// Retire `retired` in favour of `canonical`, repointing anything that
    /// was already retired into `retired`.
    pub fn retire(&mut self, retired: SourceId, canonical: SourceId) {
        for target in self.0.values_mut() {
            if *target == retired {
                *target = canonical;
            }
        }
        self.0.insert(retired, canonical);
    }

    /// Canonical id for any id, retired or not.
    pub fn resolve(&self, id: SourceId) -> SourceId {
        let mut current = id;
        while let Some(next) = self.0.get(&current) {
            current = *next;
        }
        current
    }

    pub fn is_retired(&self, id: SourceId) -> bool {
        self.0.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<SourceId, SourceId> {
        self.0
    }
}

/// Symmetric set of overlap links, stored as ordered pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlapLinks(BTreeSet<(SourceId, SourceId)>);

impl OverlapLinks {
    /// Insert a link. Returns false if it already existed or is a self-link.
    pub fn insert(&mut self, a: SourceId, b: SourceId) -> bool {
        if a == b {
            return false;
        }
        self.0.insert((a.min(b), a.max(b)))
    }

    pub fn contains(&self, a: SourceId, b: SourceId) -> bool {
        self.0.contains(&(a.min(b), a.max(b)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &(SourceId, SourceId)> {
        self.0.iter()
    }

    /// Collect links already recorded on records.
    pub fn from_records(records: &[SowRecord]) -> Self {
        let mut links = Self::default();
        for record in records {
            for other in &record.links {
                links.insert(record.source_id, *other);
            }
        }
        links
    }
}

/// Why two records were linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkReason {
    SharedEntity,
    FundingCue,
    DeathEvent,
}

impl LinkReason {
    fn describe(&self) -> &'static str {
        match self {
            LinkReason::SharedEntity => "shared named entity",
            LinkReason::FundingCue => "narrative connects the two events",
            LinkReason::DeathEvent => "same death event",
        }
    }
}

/// Output of a dedup pass.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub records: Vec<SowRecord>,
    pub aliases: AliasMap,
    pub links: OverlapLinks,
    pub merges: usize,
}

/// Merge duplicates, detect overlap links and attribute joint-account
/// records.
pub fn deduplicate(
    records: Vec<SowRecord>,
    narrative: &str,
    holder: &HolderContext,
    kb: &KnowledgeBase,
    config: &DedupConfig,
) -> DedupOutcome {
    let mut records = records;
    records.sort_by_key(|r| r.source_id);

    let mut aliases = AliasMap::default();
    let mut merges = 0;

    loop {
        let mut merged_any = false;
        let mut kept: Vec<SowRecord> = Vec::with_capacity(records.len());

        for record in records {
            match kept.iter().position(|c| should_merge(c, &record, config)) {
                Some(i) => {
                    debug!(
                        canonical = %kept[i].source_id,
                        retired = %record.source_id,
                        "Merging duplicate record"
                    );
                    aliases.retire(record.source_id, kept[i].source_id);
                    merge_into(&mut kept[i], record, kb);
                    merges += 1;
                    merged_any = true;
                }
                None => kept.push(record),
            }
        }

        records = kept;
        if !merged_any {
            break;
        }
    }

    for record in &mut records {
        let own = record.source_id;
        record.links = record
            .links
            .iter()
            .map(|l| aliases.resolve(*l))
            .filter(|l| *l != own)
            .collect();
    }

    let links = link_records(&mut records, narrative, holder, kb, config);
    attribute_joint(&mut records, holder);

    info!(
        records = records.len(),
        merges,
        links = links.len(),
        "Dedup complete"
    );

    DedupOutcome {
        records,
        aliases,
        links,
        merges,
    }
}

/// Same type and identity keys at least `merge_threshold` similar. Null
/// primary keys never merge; populated qualifiers must agree.
pub fn should_merge(a: &SowRecord, b: &SowRecord, config: &DedupConfig) -> bool {
    if a.source_type != b.source_type || a.source_id == b.source_id {
        return false;
    }
    let Some(key) = config.identity_key(a.source_type) else {
        return false;
    };
    let (Some(left), Some(right)) = (a.value(&key.primary), b.value(&key.primary)) else {
        return false;
    };
    if text::similarity(left, right) < config.merge_threshold {
        return false;
    }
    key.qualifiers.iter().all(|q| match (a.value(q), b.value(q)) {
        (Some(x), Some(y)) => text::similarity(x, y) >= config.merge_threshold,
        _ => true,
    })
}

/// Fold `other` into `canonical`: union of fields, higher-confidence origin
/// wins conflicts (ties keep the canonical value), discarded values go to
/// the evidence trail.
pub fn merge_into(canonical: &mut SowRecord, other: SowRecord, kb: &KnowledgeBase) {
    let retired = other.source_id;

    for (name, incoming) in other.fields {
        let Some(value) = incoming.value else {
            canonical.fields.entry(name).or_insert(incoming);
            continue;
        };
        match canonical.value(&name).map(str::to_string) {
            None => {
                canonical.set_field(&name, Some(value), incoming.origin);
            }
            Some(existing) if text::normalize(&existing) == text::normalize(&value) => {}
            Some(existing) => {
                let current_origin = canonical.origin(&name).unwrap_or(incoming.origin);
                if incoming.origin > current_origin {
                    canonical.set_field(&name, Some(value), incoming.origin);
                    canonical.evidence.push(EvidenceEntry::note(
                        &name,
                        format!("merge with {retired}: replaced {existing:?}"),
                    ));
                } else {
                    canonical.evidence.push(EvidenceEntry::note(
                        &name,
                        format!("merge with {retired}: discarded {value:?}"),
                    ));
                }
            }
        }
    }

    canonical.evidence.extend(other.evidence.entries().iter().cloned());
    canonical.links.extend(other.links);
    canonical.links.remove(&canonical.source_id);
    canonical.provenance.extend(other.provenance);
    canonical.absorbed.push(retired);
    canonical.absorbed.extend(other.absorbed);
    for flag in other.compliance_flags {
        if !canonical.compliance_flags.contains(&flag) {
            canonical.compliance_flags.push(flag);
        }
    }
    canonical.notes.push(format!("Merged duplicate {retired}"));
    completeness::refresh(canonical, kb);
}

/// Values that identify who or what a record is about.
fn entity_anchors<'a>(record: &'a SowRecord, kb: &KnowledgeBase) -> Vec<&'a str> {
    kb.required_fields(record.source_type)
        .iter()
        .filter(|spec| spec.format.is_entity())
        .filter_map(|spec| record.value(&spec.name))
        .filter(|v| !text::tokens(v).is_empty())
        .collect()
}

/// Anchors usable inside a single narrative sentence: entities plus
/// places and amounts.
fn sentence_anchors<'a>(record: &'a SowRecord, kb: &KnowledgeBase) -> Vec<(&'a str, FieldFormat)> {
    kb.required_fields(record.source_type)
        .iter()
        .filter(|spec| {
            spec.format.is_entity()
                || matches!(spec.format, FieldFormat::Location | FieldFormat::Money)
        })
        .filter_map(|spec| record.value(&spec.name).map(|v| (v, spec.format)))
        .collect()
}

fn is_holder(value: &str, holder_names: &[String], threshold: f64) -> bool {
    holder_names
        .iter()
        .any(|h| text::similarity(value, h) >= threshold)
}

fn shares_entity(
    a: &SowRecord,
    b: &SowRecord,
    kb: &KnowledgeBase,
    holder_names: &[String],
    config: &DedupConfig,
) -> bool {
    let mentioned_in = |anchor: &str, record: &SowRecord| {
        !is_holder(anchor, holder_names, config.merge_threshold)
            && record
                .texts()
                .any(|t| text::mentions(t, anchor, config.mention_threshold))
    };
    entity_anchors(a, kb).into_iter().any(|x| mentioned_in(x, b))
        || entity_anchors(b, kb).into_iter().any(|x| mentioned_in(x, a))
}

fn amount_mentioned(sentence: &str, amount: &str) -> bool {
    let Some(wanted) = NUMBER.find(amount).map(|m| m.as_str().replace(',', "")) else {
        return false;
    };
    NUMBER
        .find_iter(sentence)
        .any(|m| m.as_str().replace(',', "") == wanted)
}

fn is_life_payout(record: &SowRecord) -> bool {
    record.source_type == SourceType::InsurancePayout
        && (record
            .value("policy_type")
            .is_some_and(|p| text::contains_phrase(p, "life"))
            || record
                .value("claim_event_description")
                .is_some_and(|c| DEATH_TERMS.iter().any(|t| text::contains_phrase(c, t))))
}

fn same_death_event(
    inheritance: &SowRecord,
    payout: &SowRecord,
    unique_pair: bool,
) -> bool {
    if !is_life_payout(payout) {
        return false;
    }
    match inheritance.value("deceased_name") {
        Some(deceased) => {
            let names = text::tokens(deceased);
            payout.texts().any(|t| {
                let tokens = text::tokens(t);
                names.iter().any(|n| tokens.contains(n))
            }) || unique_pair
        }
        None => unique_pair,
    }
}

/// Records a funding-cue sentence refers to.
fn sentence_mentions(
    sentence: &str,
    records: &[SowRecord],
    kb: &KnowledgeBase,
    holder_names: &[String],
    config: &DedupConfig,
) -> Vec<usize> {
    let mut type_counts: BTreeMap<SourceType, usize> = BTreeMap::new();
    for r in records {
        *type_counts.entry(r.source_type).or_default() += 1;
    }

    records
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            let by_anchor = sentence_anchors(r, kb).into_iter().any(|(value, format)| {
                match format {
                    FieldFormat::Money => amount_mentioned(sentence, value),
                    _ => {
                        !is_holder(value, holder_names, config.merge_threshold)
                            && text::mentions(sentence, value, config.mention_threshold)
                    }
                }
            });
            let by_term = type_counts.get(&r.source_type) == Some(&1)
                && r.source_type
                    .event_terms()
                    .iter()
                    .any(|t| text::contains_phrase(sentence, t));
            by_anchor || by_term
        })
        .map(|(i, _)| i)
        .collect()
}

/// Detect overlap links among canonical records and record them on both
/// sides. Existing links are kept.
pub fn link_records(
    records: &mut [SowRecord],
    narrative: &str,
    holder: &HolderContext,
    kb: &KnowledgeBase,
    config: &DedupConfig,
) -> OverlapLinks {
    let holder_names = holder.holder_names();
    let mut found: Vec<(usize, usize, LinkReason)> = Vec::new();

    let inheritances = records
        .iter()
        .filter(|r| r.source_type == SourceType::Inheritance)
        .count();
    let life_payouts = records.iter().filter(|r| is_life_payout(r)).count();
    let unique_pair = inheritances == 1 && life_payouts == 1;

    for i in 0..records.len() {
        for j in (i + 1)..records.len() {
            let (a, b) = (&records[i], &records[j]);
            let reason = if shares_entity(a, b, kb, &holder_names, config) {
                Some(LinkReason::SharedEntity)
            } else {
                match (a.source_type, b.source_type) {
                    (SourceType::Inheritance, SourceType::InsurancePayout)
                        if same_death_event(a, b, unique_pair) =>
                    {
                        Some(LinkReason::DeathEvent)
                    }
                    (SourceType::InsurancePayout, SourceType::Inheritance)
                        if same_death_event(b, a, unique_pair) =>
                    {
                        Some(LinkReason::DeathEvent)
                    }
                    _ => None,
                }
            };
            if let Some(reason) = reason {
                found.push((i, j, reason));
            }
        }
    }

    // Cue scope: the cue sentence plus the one before it.
    let spans = text::sentence_spans(narrative);
    for (k, span) in spans.iter().enumerate() {
        let sentence = &narrative[span.clone()];
        if !config
            .funding_cues
            .iter()
            .any(|cue| text::contains_phrase(sentence, cue))
        {
            continue;
        }
        let start = if k > 0 { spans[k - 1].start } else { span.start };
        let scope = &narrative[start..span.end];
        let mentioned = sentence_mentions(scope, records, kb, &holder_names, config);
        for (x, &i) in mentioned.iter().enumerate() {
            for &j in &mentioned[x + 1..] {
                found.push((i, j, LinkReason::FundingCue));
            }
        }
    }

    for (i, j, reason) in found {
        let (a_id, b_id) = (records[i].source_id, records[j].source_id);
        if records[i].links.insert(b_id) {
            records[i]
                .notes
                .push(format!("Overlaps with {b_id}: {}", reason.describe()));
        }
        if records[j].links.insert(a_id) {
            records[j]
                .notes
                .push(format!("Overlaps with {a_id}: {}", reason.describe()));
        }
    }

    OverlapLinks::from_records(records)
}

/// On joint accounts, attribute each record to the single holder it
/// mentions; otherwise mark it ambiguous. Individual accounts are left
/// unattributed.
pub fn attribute_joint(records: &mut [SowRecord], holder: &HolderContext) {
    if !holder.is_joint() {
        return;
    }

    let names = holder.joint_names();
    if names.len() < 2 {
        debug!(holders = names.len(), "Joint account without separable holders");
        for record in records.iter_mut() {
            record.attribution = Some(Attribution::Ambiguous);
        }
        return;
    }

    let holder_tokens: Vec<Vec<String>> = names
        .iter()
        .map(|h| text::tokens(h))
        .collect();
    let distinctive: Vec<Vec<String>> = holder_tokens
        .iter()
        .enumerate()
        .map(|(i, tokens)| {
            tokens
                .iter()
                .filter(|t| {
                    holder_tokens
                        .iter()
                        .enumerate()
                        .all(|(j, other)| i == j || !other.contains(t))
                })
                .cloned()
                .collect()
        })
        .collect();

    for record in records.iter_mut() {
        let record_tokens: BTreeSet<String> = record.texts().flat_map(text::tokens).collect();
        let mentioned: Vec<&String> = names
            .iter()
            .zip(&distinctive)
            .zip(&holder_tokens)
            .filter(|((_, own), all)| {
                let probe = if own.is_empty() { *all } else { *own };
                !probe.is_empty() && probe.iter().any(|t| record_tokens.contains(t))
            })
            .map(|((name, _), _)| name)
            .collect();

        record.attribution = Some(match mentioned.as_slice() {
            [only] => Attribution::Holder((*only).clone()),
            _ => Attribution::Ambiguous,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record_with;
    use crate::types::record::FieldOrigin;
    use crate::types::source::AccountType;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::bundled().unwrap()
    }

    fn with_id(mut record: SowRecord, n: u32) -> SowRecord {
        record.source_id = SourceId::new(n);
        record
    }

    #[test]
    fn test_merge_same_employer() {
        let kb = kb();
        let a = with_id(
            record_with(
                SourceType::EmploymentIncome,
                &[("employer_name", "Meridian Capital"), ("job_title", "Analyst")],
            ),
            1,
        );
        let b = with_id(
            record_with(
                SourceType::EmploymentIncome,
                &[
                    ("employer_name", "Meridian Capital Ltd"),
                    ("annual_compensation", "£250,000"),
                ],
            ),
            2,
        );

        let outcome = deduplicate(vec![b, a], "", &HolderContext::unknown(), &kb, &DedupConfig::default());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.merges, 1);

        let merged = &outcome.records[0];
        assert_eq!(merged.source_id, SourceId::new(1));
        assert_eq!(merged.value("job_title"), Some("Analyst"));
        assert_eq!(merged.value("annual_compensation"), Some("£250,000"));
        assert_eq!(merged.absorbed, vec![SourceId::new(2)]);
        assert_eq!(outcome.aliases.resolve(SourceId::new(2)), SourceId::new(1));
    }

    #[test]
    fn test_null_key_never_merges() {
        let kb = kb();
        let a = with_id(record_with(SourceType::Gift, &[("gift_value", "£5,000")]), 1);
        let b = with_id(record_with(SourceType::Gift, &[("gift_value", "£5,000")]), 2);
        let outcome = deduplicate(vec![a, b], "", &HolderContext::unknown(), &kb, &DedupConfig::default());
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.merges, 0);
    }

    #[test]
    fn test_disagreeing_qualifier_blocks_merge() {
        let config = DedupConfig::default();
        let a = with_id(
            record_with(
                SourceType::Gift,
                &[("donor_name", "Margaret Hill"), ("gift_date", "2015")],
            ),
            1,
        );
        let b = with_id(
            record_with(
                SourceType::Gift,
                &[("donor_name", "Margaret Hill"), ("gift_date", "2021")],
            ),
            2,
        );
        assert!(!should_merge(&a, &b, &config));

        let c = with_id(record_with(SourceType::Gift, &[("donor_name", "Mrs Margaret Hill")]), 3);
        assert!(should_merge(&a, &c, &config));
    }

    #[test]
    fn test_conflict_prefers_higher_origin_and_notes_discard() {
        let kb = kb();
        let mut canonical = with_id(
            record_with(SourceType::Gift, &[("donor_name", "Margaret Hill"), ("gift_value", "£90,000")]),
            1,
        );
        let mut other = with_id(
            record_with(SourceType::Gift, &[("donor_name", "Margaret Hill")]),
            2,
        );
        other.set_field("gift_value", Some("£100,000".into()), FieldOrigin::Validated);

        merge_into(&mut canonical, other, &kb);
        assert_eq!(canonical.value("gift_value"), Some("£100,000"));
        let note = canonical.evidence.for_field("gift_value").last().unwrap();
        assert!(note.query.contains("£90,000"));
    }

    #[test]
    fn test_tie_keeps_canonical_value() {
        let kb = kb();
        let mut canonical = with_id(
            record_with(SourceType::Gift, &[("donor_name", "Margaret Hill"), ("gift_value", "£90,000")]),
            1,
        );
        let other = with_id(
            record_with(SourceType::Gift, &[("donor_name", "Margaret Hill"), ("gift_value", "£95,000")]),
            2,
        );
        merge_into(&mut canonical, other, &kb);
        assert_eq!(canonical.value("gift_value"), Some("£90,000"));
        assert!(canonical
            .evidence
            .for_field("gift_value")
            .any(|e| e.query.contains("£95,000")));
    }

    #[test]
    fn test_funding_cue_links_property_and_gift() {
        let kb = kb();
        let narrative = "My grandmother Margaret Hill sold her house at 12 Rose Lane, Bath in \
            2019 for £450,000. She used the proceeds to give me £100,000 towards my first flat.";
        let property = with_id(
            record_with(
                SourceType::SaleOfProperty,
                &[("property_address", "12 Rose Lane, Bath"), ("sale_proceeds", "£450,000")],
            ),
            1,
        );
        let gift = with_id(
            record_with(
                SourceType::Gift,
                &[("donor_name", "Margaret Hill"), ("gift_value", "£100,000")],
            ),
            2,
        );

        let outcome = deduplicate(
            vec![property, gift],
            narrative,
            &HolderContext::individual("Emma Hill"),
            &kb,
            &DedupConfig::default(),
        );
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.links.len(), 1);
        assert!(outcome.links.contains(SourceId::new(1), SourceId::new(2)));
        assert!(outcome.records[0].links.contains(&SourceId::new(2)));
        assert!(outcome.records[1].links.contains(&SourceId::new(1)));
    }

    #[test]
    fn test_shared_entity_links_across_types() {
        let kb = kb();
        let income = with_id(
            record_with(SourceType::BusinessIncome, &[("business_name", "Hill Joinery Ltd")]),
            1,
        );
        let dividends = with_id(
            record_with(SourceType::BusinessDividends, &[("company_name", "Hill Joinery")]),
            2,
        );
        let outcome = deduplicate(
            vec![income, dividends],
            "",
            &HolderContext::unknown(),
            &kb,
            &DedupConfig::default(),
        );
        assert_eq!(outcome.links.len(), 1);
    }

    #[test]
    fn test_holder_name_does_not_link() {
        let kb = kb();
        let a = with_id(record_with(SourceType::Gift, &[("donor_name", "Emma Hill"), ("gift_date", "2010")]), 1);
        let mut b = with_id(
            record_with(SourceType::Inheritance, &[("deceased_name", "Arthur Jones")]),
            2,
        );
        b.description = "Inheritance received by Emma Hill".into();
        let outcome = deduplicate(
            vec![a, b],
            "",
            &HolderContext::individual("Emma Hill"),
            &kb,
            &DedupConfig::default(),
        );
        assert!(outcome.links.is_empty());
    }

    #[test]
    fn test_inheritance_links_life_payout() {
        let kb = kb();
        let inheritance = with_id(
            record_with(SourceType::Inheritance, &[("deceased_name", "Robert Hill")]),
            1,
        );
        let payout = with_id(
            record_with(
                SourceType::InsurancePayout,
                &[("policy_type", "Life insurance"), ("insurance_provider", "Aviva")],
            ),
            2,
        );
        let outcome = deduplicate(
            vec![inheritance, payout],
            "",
            &HolderContext::unknown(),
            &kb,
            &DedupConfig::default(),
        );
        assert_eq!(outcome.links.len(), 1);
        assert!(outcome.records[0].notes.iter().any(|n| n.contains("death")));
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let kb = kb();
        let narrative = "She used the proceeds from 12 Rose Lane to give me £100,000.";
        let records = vec![
            with_id(record_with(SourceType::SaleOfProperty, &[("property_address", "12 Rose Lane")]), 1),
            with_id(record_with(SourceType::Gift, &[("donor_name", "Margaret Hill"), ("gift_value", "£100,000")]), 2),
            with_id(record_with(SourceType::Gift, &[("donor_name", "Margaret Hill")]), 3),
        ];
        let holder = HolderContext::unknown();
        let config = DedupConfig::default();

        let once = deduplicate(records, narrative, &holder, &kb, &config);
        let twice = deduplicate(once.records.clone(), narrative, &holder, &kb, &config);
        assert_eq!(once.records, twice.records);
        assert_eq!(twice.merges, 0);
    }

    #[test]
    fn test_alias_chain_repointed() {
        let mut aliases = AliasMap::default();
        aliases.retire(SourceId::new(3), SourceId::new(2));
        aliases.retire(SourceId::new(2), SourceId::new(1));
        assert_eq!(aliases.resolve(SourceId::new(3)), SourceId::new(1));
        assert_eq!(aliases.resolve(SourceId::new(4)), SourceId::new(4));
        assert!(aliases.is_retired(SourceId::new(2)));
    }

    #[test]
    fn test_joint_attribution() {
        let holder = HolderContext::joint(["James Carter", "Susan Carter"]);
        let mut records = vec![
            record_with(SourceType::EmploymentIncome, &[("employer_name", "Acme")]),
            record_with(SourceType::Gift, &[("donor_name", "Peter Carter")]),
        ];
        records[0].description = "James's salary at Acme".into();
        records[1].description = "Gift from Peter Carter".into();
        attribute_joint(&mut records, &holder);

        assert_eq!(
            records[0].attribution,
            Some(Attribution::Holder("James Carter".into()))
        );
        assert_eq!(records[1].attribution, Some(Attribution::Ambiguous));
    }

    #[test]
    fn test_joint_attribution_from_combined_holder_name() {
        let holder = HolderContext {
            holder_name: Some("James and Susan Carter".into()),
            account_type: Some(AccountType::Joint),
            joint_holders: vec![],
            ..Default::default()
        };
        let mut records = vec![
            record_with(SourceType::Gift, &[("donor_name", "Margaret Hill")]),
            record_with(SourceType::EmploymentIncome, &[("employer_name", "Acme")]),
        ];
        records[0].description = "Gift to Susan from her aunt Margaret Hill".into();
        records[1].description = "Salary at Acme".into();
        attribute_joint(&mut records, &holder);

        assert_eq!(
            records[0].attribution,
            Some(Attribution::Holder("Susan Carter".into()))
        );
        assert_eq!(records[1].attribution, Some(Attribution::Ambiguous));
    }

    #[test]
    fn test_joint_without_separable_holders_is_ambiguous() {
        let holder = HolderContext {
            holder_name: Some("The Carters".into()),
            account_type: Some(AccountType::Joint),
            ..Default::default()
        };
        let mut records = vec![record_with(
            SourceType::Gift,
            &[("donor_name", "James Carter")],
        )];
        attribute_joint(&mut records, &holder);
        assert_eq!(records[0].attribution, Some(Attribution::Ambiguous));

        let mut records = vec![record_with(SourceType::Gift, &[])];
        attribute_joint(&mut records, &HolderContext::individual("Emma Hill"));
        assert_eq!(records[0].attribution, None);
    }
}
