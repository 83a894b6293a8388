//! The source-of-wealth knowledge base: required fields per source type.
//!
//! Loaded once, validated, then shared read-only (`Arc<KnowledgeBase>`).
//! A default document is compiled into the library; a file path can
//! override it.

use std::path::Path;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SchemaError, SchemaResult};
use crate::traits::capability::FieldUpdates;
use crate::types::source::SourceType;

const BUNDLED: &str = include_str!("../knowledge_base/sow_requirements.json");

/// The shape a field value is expected to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    Name,
    Organization,
    Date,
    Money,
    Percentage,
    Location,
    Text,
}

impl FieldFormat {
    /// Formats that name a person or company.
    pub fn is_entity(&self) -> bool {
        matches!(self, FieldFormat::Name | FieldFormat::Organization)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldFormat::Name => "name",
            FieldFormat::Organization => "organization",
            FieldFormat::Date => "date",
            FieldFormat::Money => "money",
            FieldFormat::Percentage => "percentage",
            FieldFormat::Location => "location",
            FieldFormat::Text => "text",
        }
    }
}

/// One required field of a source type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    pub format: FieldFormat,
    /// Phrases that typically precede the value in a narrative
    pub cues: Vec<String>,
}

impl FieldSpec {
    /// Field name as a reader would say it: `employment_start_date` ->
    /// `employment start date`.
    pub fn readable_name(&self) -> String {
        self.name.replace('_', " ")
    }
}

/// A validated source-type entry. Always has at least one required field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTypeSpec {
    pub source_type: SourceType,
    pub display_name: String,
    pub description: String,
    required_fields: Vec<FieldSpec>,
}

impl SourceTypeSpec {
    pub fn required_fields(&self) -> &[FieldSpec] {
        &self.required_fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.required_fields.iter().find(|f| f.name == name)
    }
}

/// Field-format constraints handed to the revalidation capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldConstraints {
    pub source_type: SourceType,
    pub fields: Vec<FieldSpec>,
    /// JSON schema of the expected [`FieldUpdates`] answer
    pub schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    source_of_wealth_types: Option<IndexMap<String, RawType>>,
}

#[derive(Debug, Deserialize)]
struct RawType {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    required_fields: IndexMap<String, RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(default)]
    description: String,
    #[serde(default = "default_format")]
    format: FieldFormat,
    #[serde(default)]
    cues: Vec<String>,
}

fn default_format() -> FieldFormat {
    FieldFormat::Text
}

/// Required-field definitions for all source types.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBase {
    types: IndexMap<SourceType, SourceTypeSpec>,
}

impl KnowledgeBase {
    /// The knowledge base compiled into the library.
    pub fn bundled() -> SchemaResult<Self> {
        Self::from_json(BUNDLED)
    }

    /// Load and validate a knowledge base file.
    pub fn from_path(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let kb = Self::from_json(&json)?;
        info!(path = %path.display(), "Loaded knowledge base");
        Ok(kb)
    }

    /// Parse and validate a knowledge base document.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let raw: RawDocument = serde_json::from_str(json)?;
        let raw_types = raw.source_of_wealth_types.ok_or(SchemaError::MissingRoot)?;

        let mut types = IndexMap::new();
        for (key, raw_type) in raw_types {
            let source_type: SourceType = key.parse()?;
            if raw_type.required_fields.is_empty() {
                return Err(SchemaError::NoRequiredFields(source_type));
            }

            let required_fields = raw_type
                .required_fields
                .into_iter()
                .map(|(name, f)| FieldSpec {
                    name,
                    description: f.description,
                    format: f.format,
                    cues: f.cues,
                })
                .collect();

            types.insert(
                source_type,
                SourceTypeSpec {
                    source_type,
                    display_name: raw_type
                        .display_name
                        .unwrap_or_else(|| source_type.as_str().replace('_', " ")),
                    description: raw_type.description,
                    required_fields,
                },
            );
        }

        if let Some(missing) = SourceType::ALL.iter().find(|t| !types.contains_key(*t)) {
            return Err(SchemaError::MissingSourceType(*missing));
        }

        types.sort_keys();
        debug!(types = types.len(), "Validated knowledge base");
        Ok(Self { types })
    }

    /// Entry for a source type. Present for every type once validated.
    pub fn spec(&self, source_type: SourceType) -> &SourceTypeSpec {
        &self.types[&source_type]
    }

    pub fn required_fields(&self, source_type: SourceType) -> &[FieldSpec] {
        self.spec(source_type).required_fields()
    }

    pub fn field(&self, source_type: SourceType, name: &str) -> Option<&FieldSpec> {
        self.spec(source_type).field(name)
    }

    pub fn is_required(&self, source_type: SourceType, name: &str) -> bool {
        self.field(source_type, name).is_some()
    }

    pub fn specs(&self) -> impl Iterator<Item = &SourceTypeSpec> {
        self.types.values()
    }

    /// Constraints for re-extraction: per-field format, description and
    /// cues, plus the schema of the expected answer with the field names
    /// spelled out.
    pub fn constraints(&self, source_type: SourceType) -> FieldConstraints {
        let fields = self.required_fields(source_type).to_vec();

        let mut schema = serde_json::to_value(schemars::schema_for!(FieldUpdates))
            .unwrap_or(serde_json::Value::Null);
        let properties: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    serde_json::json!({
                        "type": ["string", "null"],
                        "description": f.description,
                        "format": f.format.as_str(),
                    }),
                )
            })
            .collect();
        if let Some(slot) = schema.pointer_mut("/properties/fields") {
            slot["properties"] = serde_json::Value::Object(properties);
        }

        FieldConstraints {
            source_type,
            fields,
            schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_has_every_type() {
        let kb = KnowledgeBase::bundled().unwrap();
        for t in SourceType::ALL {
            assert!(!kb.required_fields(t).is_empty());
        }
        assert_eq!(kb.specs().count(), 11);
    }

    #[test]
    fn test_bundled_field_order() {
        let kb = KnowledgeBase::bundled().unwrap();
        let names: Vec<&str> = kb
            .required_fields(SourceType::EmploymentIncome)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "employer_name",
                "job_title",
                "employment_start_date",
                "employment_end_date",
                "annual_compensation",
                "country_of_employment",
            ]
        );
        assert_eq!(kb.required_fields(SourceType::SaleOfProperty).len(), 7);
        assert_eq!(kb.required_fields(SourceType::LotteryWinnings).len(), 4);
    }

    #[test]
    fn test_missing_type_rejected() {
        let json = r#"{"source_of_wealth_types": {
            "gift": {"required_fields": {"donor_name": {"format": "name"}}}
        }}"#;
        let err = KnowledgeBase::from_json(json).unwrap_err();
        assert!(matches!(err, SchemaError::MissingSourceType(SourceType::EmploymentIncome)));
    }

    #[test]
    fn test_empty_required_set_rejected() {
        let json = r#"{"source_of_wealth_types": {"gift": {"required_fields": {}}}}"#;
        let err = KnowledgeBase::from_json(json).unwrap_err();
        assert!(matches!(err, SchemaError::NoRequiredFields(SourceType::Gift)));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"source_of_wealth_types": {"pension": {"required_fields": {"x": {}}}}}"#;
        let err = KnowledgeBase::from_json(json).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownSourceType(ref t) if t == "pension"));
    }

    #[test]
    fn test_missing_root_rejected() {
        let err = KnowledgeBase::from_json("{}").unwrap_err();
        assert!(matches!(err, SchemaError::MissingRoot));
        assert!(matches!(
            KnowledgeBase::from_json("not json").unwrap_err(),
            SchemaError::JsonParse(_)
        ));
    }

    #[test]
    fn test_constraints_schema_lists_fields() {
        let kb = KnowledgeBase::bundled().unwrap();
        let constraints = kb.constraints(SourceType::Gift);
        assert_eq!(constraints.fields.len(), 6);

        let props = constraints
            .schema
            .pointer("/properties/fields/properties")
            .unwrap();
        assert_eq!(props["gift_value"]["format"], "money");
        assert_eq!(props["donor_name"]["format"], "name");
    }
}
