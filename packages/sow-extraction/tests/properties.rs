//! Property tests for the pipeline's invariants.

use proptest::prelude::*;
use sow_extraction::{
    pipeline::{build_record, deduplicate, FieldSearcher},
    AccountType, CandidateRecord, DedupConfig, FieldOrigin, HolderContext, KnowledgeBase,
    NarrativeToolbox, RetryPolicy, SearchConfig, SourceId, SourceType, SowRecord,
};

const VALUES: &[&str] = &[
    "Margaret Hill",
    "Meridian Capital",
    "£450,000",
    "March 2012",
    "12 Rose Lane, Bath",
    "United Kingdom",
    "40%",
    "grandmother",
];

/// Types that merge with each other or link across types (inheritance with
/// a life payout, a property sale funding a gift).
const LINKABLE: &[SourceType] = &[
    SourceType::Gift,
    SourceType::EmploymentIncome,
    SourceType::Inheritance,
    SourceType::InsurancePayout,
    SourceType::SaleOfProperty,
];

const SENTENCES: &[&str] = &[
    "I joined Meridian Capital in 1985.",
    "My grandmother Margaret Hill gave me £100,000 in 2019.",
    "She sold her house at 12 Rose Lane, Bath for £450,000.",
    "I earn £95,000 a year as a Senior Analyst.",
    "We won £1m on the EuroMillions in June 2018.",
    "My father Robert Hill died in March 2018 and left me his estate.",
    "I own 40% of Hill Joinery Ltd which I founded in 2001.",
    "After Robert Hill died his life insurance paid out £200,000.",
    "Susan inherited the house and used the proceeds to give James a gift.",
    "Nothing else to report.",
];

fn kb() -> KnowledgeBase {
    KnowledgeBase::bundled().unwrap()
}

fn source_type() -> impl Strategy<Value = SourceType> {
    (0..SourceType::ALL.len()).prop_map(|i| SourceType::ALL[i])
}

/// A record of some type with a random subset of its required fields set.
fn record(kb: &KnowledgeBase, source_type: SourceType, picks: &[Option<usize>], id: u32) -> SowRecord {
    let candidate = kb
        .required_fields(source_type)
        .iter()
        .zip(picks)
        .fold(CandidateRecord::new(source_type), |c, (spec, pick)| match pick {
            Some(i) => c.with_field(spec.name.clone(), VALUES[*i % VALUES.len()]),
            None => c.with_null(spec.name.clone()),
        });
    build_record(candidate, kb, SourceId::new(id))
}

fn picks() -> impl Strategy<Value = Vec<Option<usize>>> {
    prop::collection::vec(prop::option::of(0..VALUES.len()), 8)
}

fn holder() -> impl Strategy<Value = HolderContext> {
    prop_oneof![
        Just(HolderContext::unknown()),
        Just(HolderContext::individual("Emma Hill")),
        Just(HolderContext::joint(["James Carter", "Susan Carter"])),
        Just(HolderContext {
            holder_name: Some("James and Susan Carter".into()),
            account_type: Some(AccountType::Joint),
            ..Default::default()
        }),
    ]
}

fn narrative() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(SENTENCES), 1..5).prop_map(|s| s.join(" "))
}

proptest! {
    #[test]
    fn property_completeness_is_a_ratio(source_type in source_type(), picks in picks()) {
        let kb = kb();
        let record = record(&kb, source_type, &picks, 1);

        prop_assert!((0.0..=1.0).contains(&record.completeness_score));
        prop_assert_eq!(record.completeness_score == 1.0, record.is_complete());
        prop_assert_eq!(record.fields.len(), kb.required_fields(source_type).len());
    }

    #[test]
    fn property_dedup_is_idempotent(
        entries in prop::collection::vec((prop::sample::select(LINKABLE), picks()), 1..6),
        narrative in narrative(),
        holder in holder(),
    ) {
        let kb = kb();
        let records: Vec<SowRecord> = entries
            .iter()
            .enumerate()
            .map(|(i, (t, p))| record(&kb, *t, p, i as u32 + 1))
            .collect();
        let config = DedupConfig::default();

        let once = deduplicate(records, &narrative, &holder, &kb, &config);
        let twice = deduplicate(once.records.clone(), &narrative, &holder, &kb, &config);

        prop_assert_eq!(twice.merges, 0);
        prop_assert_eq!(&once.records, &twice.records);
        for record in &once.records {
            prop_assert!(!record.links.contains(&record.source_id));
            prop_assert_eq!(record.attribution.is_some(), holder.is_joint());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn property_search_recovers_only_quotes_within_budget(
        source_type in source_type(),
        narrative in narrative(),
        max_invocations in 0usize..20,
    ) {
        let kb = kb();
        let record = record(&kb, source_type, &[], 1);
        let toolbox = NarrativeToolbox::new();
        let retry = RetryPolicy::none();
        let config = SearchConfig { max_invocations, ..Default::default() };
        let searcher = FieldSearcher::new(&toolbox, &narrative, &config, &retry);

        let (records, _) = tokio_test::block_on(searcher.recover(&[record], &kb));
        let record = &records[0];

        for (name, value) in &record.fields {
            prop_assert!(record.evidence.invocations(name) <= 5);
            prop_assert!(record.evidence.invocations(name) <= max_invocations.max(1));
            if value.origin == FieldOrigin::SearchRecovered {
                let text = value.value.as_deref().unwrap_or_default();
                prop_assert!(narrative.contains(text), "{} = {:?}", name, text);
            }
        }
    }
}
