//! Regex fragments for the value shapes found in wealth narratives.
//!
//! Fragments contain no capturing groups so they can be embedded inside
//! larger patterns where capture group 1 is the value.

use std::sync::LazyLock;

use regex::Regex;

use crate::knowledge::FieldFormat;
use crate::traits::toolbox::EntityKind;

const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec";

/// Dates: "1st January 2020", "March 2015", "Q3 2019", "03/04/2019", "1985".
pub static DATE: LazyLock<String> = LazyLock::new(|| {
    format!(
        r"(?:\b\d{{1,2}}(?:st|nd|rd|th)?[ \t]+(?:{MONTHS})\.?,?[ \t]+\d{{4}}|\b(?:{MONTHS})\.?[ \t]+\d{{1,2}}(?:st|nd|rd|th)?,[ \t]+\d{{4}}|\b(?:{MONTHS})\.?[ \t]+\d{{4}}|\bQ[1-4][ \t]+\d{{4}}|\b\d{{1,2}}[/.-]\d{{1,2}}[/.-]\d{{2,4}}\b|\b(?:19|20)\d{{2}}\b)"
    )
});

/// Amounts: "£450,000", "$2.5m", "1.2 million pounds", "300,000 GBP".
pub const MONEY: &str = r"(?:[£$€][ \t]?\d[\d,]*(?:\.\d+)?(?:[ \t]?(?:million|thousand|billion|bn|m|k)\b)?|\b\d[\d,]*(?:\.\d+)?[ \t]?(?:million|thousand|billion)?[ \t]?(?:pounds|GBP|USD|EUR|dollars|euros)\b)";

/// Percentages: "40%", "12.5 per cent".
pub const PERCENTAGE: &str = r"(?:\b\d{1,3}(?:\.\d+)?[ \t]?(?:%|per[ \t]?cent\b|percent\b))";

/// Person names, optionally with an honorific.
pub const PERSON: &str = r"(?:\b(?:Mr|Mrs|Ms|Miss|Dr|Sir|Lady|Lord)\.?[ \t]+[A-Z][a-z]+(?:[ \t]+[A-Z][a-z'-]+)*|\b[A-Z][a-z]+(?:[ \t]+[A-Z][a-z'-]+){1,2})";

/// Organisations: capitalised words ending in a corporate suffix, or a
/// well-known institution.
pub const ORGANIZATION: &str = r"(?:\b[A-Z][\w&'-]*(?:[ \t]+(?:&[ \t]+)?[A-Z][\w&'-]*)*[ \t]+(?:Ltd|PLC|plc|Inc|LLC|LLP|Limited|Corporation|Corp|Group|Holdings|Partners|Bank|Insurance|Assurance|Trust|Capital|Consulting|Associates|Lottery)\b\.?|\b(?:HSBC|Barclays|Lloyds|NatWest|Santander|Goldman Sachs|JP Morgan|Morgan Stanley|Deloitte|PwC|KPMG|Aviva|Prudential|Legal & General|Zurich Insurance|EuroMillions|National Lottery)\b)";

/// Street addresses and well-known places.
pub const LOCATION: &str = r"(?:\b\d+[ \t]+[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)*[ \t]+(?:Road|Street|Lane|Avenue|Drive|Close|Way|Place|Square|Gardens|Crescent|Court|Terrace|Row|Hill|Mews)\b(?:,[ \t]*[A-Z][a-z]+)*|\b(?:United Kingdom|UK|England|Scotland|Wales|Northern Ireland|Ireland|United States|USA|France|Germany|Spain|Italy|Portugal|Switzerland|Monaco|Luxembourg|Netherlands|Singapore|Hong Kong|Dubai|UAE|Australia|Canada|Japan|China|London|Manchester|Edinburgh|Birmingham|Bristol|Bath|Leeds|Glasgow|Oxford|Cambridge|New York|Paris|Geneva|Zurich|Frankfurt|Madrid|Sydney|Toronto|Tokyo)\b)";

/// Any run of capitalised words: employer, buyer, lottery names.
pub const PROPER_NOUN: &str = r"(?:\b[A-Z][\w&'-]*(?:[ \t]+(?:&[ \t]+|of[ \t]+|and[ \t]+)?[A-Z][\w&'-]*)*)";

/// A free-text clause.
pub const CLAUSE: &str = r"(?:[^.;\n]{3,160})";

static PERSON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PERSON).unwrap());
static ORGANIZATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(ORGANIZATION).unwrap());
static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(MONEY).unwrap());
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(&DATE).unwrap());
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(LOCATION).unwrap());
static PERCENTAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(PERCENTAGE).unwrap());

/// Compiled recognizer for an entity kind.
pub fn entity_regex(kind: EntityKind) -> &'static Regex {
    match kind {
        EntityKind::Person => &PERSON_RE,
        EntityKind::Organization => &ORGANIZATION_RE,
        EntityKind::Money => &MONEY_RE,
        EntityKind::Date => &DATE_RE,
        EntityKind::Location => &LOCATION_RE,
        EntityKind::Percentage => &PERCENTAGE_RE,
    }
}

/// Fragment matching a value of the given field format.
pub fn value_fragment(format: FieldFormat) -> &'static str {
    match format {
        FieldFormat::Name | FieldFormat::Organization => PROPER_NOUN,
        FieldFormat::Date => DATE.as_str(),
        FieldFormat::Money => MONEY,
        FieldFormat::Percentage => PERCENTAGE,
        FieldFormat::Location => LOCATION,
        FieldFormat::Text => CLAUSE,
    }
}

/// Pattern capturing the value of a field right after one of its cues,
/// allowing a few intervening words ("joined Meridian Capital in 1985").
pub fn cue_anchored(cues: &[String], format: FieldFormat) -> Option<String> {
    let alternatives: Vec<String> = cues
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| regex::escape(c).replace(' ', r"\s+"))
        .collect();
    if alternatives.is_empty() {
        return None;
    }

    let gap = match format {
        FieldFormat::Text => "",
        _ => r"(?:[^\s.;]+\s+){0,6}?",
    };
    Some(format!(
        r"(?i:\b(?:{})\b)[\s,:]+{gap}({})",
        alternatives.join("|"),
        value_fragment(format)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(kind: EntityKind, text: &str) -> Option<String> {
        entity_regex(kind).find(text).map(|m| m.as_str().to_string())
    }

    #[test]
    fn test_money() {
        assert_eq!(first(EntityKind::Money, "sold for £450,000 in"), Some("£450,000".into()));
        assert_eq!(first(EntityKind::Money, "a bonus of $2.5m"), Some("$2.5m".into()));
        assert_eq!(
            first(EntityKind::Money, "about 300,000 GBP"),
            Some("300,000 GBP".into())
        );
        assert_eq!(first(EntityKind::Money, "no amounts here"), None);
    }

    #[test]
    fn test_dates() {
        assert_eq!(first(EntityKind::Date, "joined in 1985"), Some("1985".into()));
        assert_eq!(
            first(EntityKind::Date, "died on 1st January 2020"),
            Some("1st January 2020".into())
        );
        assert_eq!(first(EntityKind::Date, "in March 2015 she"), Some("March 2015".into()));
        assert_eq!(first(EntityKind::Date, "Q3 2019 results"), Some("Q3 2019".into()));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(first(EntityKind::Percentage, "owns 40% of"), Some("40%".into()));
        assert_eq!(
            first(EntityKind::Percentage, "a 12.5 per cent stake"),
            Some("12.5 per cent".into())
        );
    }

    #[test]
    fn test_organization_and_location() {
        assert_eq!(
            first(EntityKind::Organization, "worked at Meridian Capital for years"),
            Some("Meridian Capital".into())
        );
        assert_eq!(
            first(EntityKind::Location, "the house at 12 Rose Lane, Bath was sold"),
            Some("12 Rose Lane, Bath".into())
        );
        assert_eq!(first(EntityKind::Location, "based in London"), Some("London".into()));
    }

    #[test]
    fn test_cue_anchored_date() {
        let cues = vec!["joined".to_string(), "started".to_string()];
        let pattern = cue_anchored(&cues, FieldFormat::Date).unwrap();
        let re = Regex::new(&pattern).unwrap();

        let caps = re.captures("He joined in 1985 as a trainee.").unwrap();
        assert_eq!(&caps[1], "1985");

        let caps = re.captures("She JOINED Meridian Capital in March 2001.").unwrap();
        assert_eq!(&caps[1], "March 2001");
    }

    #[test]
    fn test_cue_anchored_name() {
        let cues = vec!["worked at".to_string()];
        let pattern = cue_anchored(&cues, FieldFormat::Organization).unwrap();
        let re = Regex::new(&pattern).unwrap();
        let caps = re.captures("I worked at Meridian Capital in London.").unwrap();
        assert_eq!(&caps[1], "Meridian Capital");
    }

    #[test]
    fn test_no_cues_no_pattern() {
        assert!(cue_anchored(&[], FieldFormat::Date).is_none());
    }
}
