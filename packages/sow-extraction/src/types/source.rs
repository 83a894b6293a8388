//! Source-of-wealth kinds and account-holder context.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// One of the fixed kinds of wealth source.
///
/// Declaration order is the canonical order used by aggregation and dedup,
/// so the derived `Ord` is load-bearing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    EmploymentIncome,
    BusinessIncome,
    BusinessDividends,
    SaleOfBusiness,
    SaleOfAsset,
    SaleOfProperty,
    Inheritance,
    Gift,
    DivorceSettlement,
    LotteryWinnings,
    InsurancePayout,
}

impl SourceType {
    /// Every source type, in canonical order.
    pub const ALL: [SourceType; 11] = [
        SourceType::EmploymentIncome,
        SourceType::BusinessIncome,
        SourceType::BusinessDividends,
        SourceType::SaleOfBusiness,
        SourceType::SaleOfAsset,
        SourceType::SaleOfProperty,
        SourceType::Inheritance,
        SourceType::Gift,
        SourceType::DivorceSettlement,
        SourceType::LotteryWinnings,
        SourceType::InsurancePayout,
    ];

    /// Get the wire name for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::EmploymentIncome => "employment_income",
            SourceType::BusinessIncome => "business_income",
            SourceType::BusinessDividends => "business_dividends",
            SourceType::SaleOfBusiness => "sale_of_business",
            SourceType::SaleOfAsset => "sale_of_asset",
            SourceType::SaleOfProperty => "sale_of_property",
            SourceType::Inheritance => "inheritance",
            SourceType::Gift => "gift",
            SourceType::DivorceSettlement => "divorce_settlement",
            SourceType::LotteryWinnings => "lottery_winnings",
            SourceType::InsurancePayout => "insurance_payout",
        }
    }

    /// Words a narrative uses when it refers to an event of this kind
    /// without naming it ("the proceeds of the house funded the gift").
    pub fn event_terms(&self) -> &'static [&'static str] {
        match self {
            SourceType::EmploymentIncome => &["salary", "bonus", "employment", "wages"],
            SourceType::BusinessIncome => &["business", "company", "profits"],
            SourceType::BusinessDividends => &["dividend", "dividends", "shares"],
            SourceType::SaleOfBusiness => &["sold the business", "sale of the business"],
            SourceType::SaleOfAsset => &["sold the", "sale of the"],
            SourceType::SaleOfProperty => &["house", "flat", "property", "home", "apartment"],
            SourceType::Inheritance => &["inherited", "inheritance", "estate", "will"],
            SourceType::Gift => &["gift", "gifted", "gave"],
            SourceType::DivorceSettlement => &["divorce", "settlement"],
            SourceType::LotteryWinnings => &["lottery", "jackpot", "won"],
            SourceType::InsurancePayout => &["insurance", "policy", "payout"],
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownSourceType(s.to_string()))
    }
}

/// Whether the account is held by one person or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Individual,
    Joint,
}

/// Account-holder context produced by the metadata step. Every field is
/// optional; a failed metadata step yields [`HolderContext::unknown`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HolderContext {
    pub holder_name: Option<String>,
    pub account_type: Option<AccountType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joint_holders: Vec<String>,
    pub stated_net_worth: Option<f64>,
    pub currency: Option<String>,
}

impl HolderContext {
    /// Fallback context used when metadata extraction fails.
    pub fn unknown() -> Self {
        Self {
            holder_name: Some("Unknown".to_string()),
            account_type: Some(AccountType::Individual),
            joint_holders: Vec::new(),
            stated_net_worth: None,
            currency: Some("GBP".to_string()),
        }
    }

    /// Create a context for a single named holder.
    pub fn individual(name: impl Into<String>) -> Self {
        Self {
            holder_name: Some(name.into()),
            account_type: Some(AccountType::Individual),
            ..Default::default()
        }
    }

    /// Create a context for a joint account.
    pub fn joint(holders: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let joint_holders: Vec<String> = holders.into_iter().map(Into::into).collect();
        Self {
            holder_name: Some(joint_holders.join(" and ")),
            account_type: Some(AccountType::Joint),
            joint_holders,
            ..Default::default()
        }
    }

    /// Set stated net worth.
    pub fn with_net_worth(mut self, amount: f64) -> Self {
        self.stated_net_worth = Some(amount);
        self
    }

    /// Set currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn is_joint(&self) -> bool {
        self.account_type == Some(AccountType::Joint)
    }

    /// Individual names on a joint account. Without an explicit holder
    /// list the combined `holder_name` is split on " and ", so
    /// "James and Susan Carter" gives "James Carter" and "Susan Carter".
    pub fn joint_names(&self) -> Vec<String> {
        if !self.joint_holders.is_empty() {
            return self.joint_holders.clone();
        }
        let Some(combined) = self.holder_name.as_deref() else {
            return Vec::new();
        };
        let parts: Vec<&str> = combined
            .split(" and ")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        // A bare first name borrows the surname of the last part.
        let surname = parts
            .last()
            .filter(|last| last.split_whitespace().count() > 1)
            .and_then(|last| last.split_whitespace().last());
        parts
            .iter()
            .map(|part| match surname {
                Some(surname) if part.split_whitespace().count() == 1 => {
                    format!("{part} {surname}")
                }
                _ => part.to_string(),
            })
            .collect()
    }

    /// Every name the account holder(s) go by.
    pub fn holder_names(&self) -> Vec<String> {
        if self.is_joint() {
            return self.joint_names();
        }
        let mut names = self.joint_holders.clone();
        if let Some(name) = self.holder_name.as_deref() {
            if name != "Unknown" {
                names.push(name.to_string());
            }
        }
        names
    }
}

/// Parse a stated amount such as `"£1,800,000"`, `"2.5m"` or `"450k"`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let lower = text.trim().to_lowercase();
    let digits: String = lower
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let base: f64 = digits.parse().ok()?;

    let multiplier = if lower.contains("billion") || lower.ends_with("bn") {
        1_000_000_000.0
    } else if lower.contains("million") || lower.ends_with('m') {
        1_000_000.0
    } else if lower.contains("thousand") || lower.ends_with('k') {
        1_000.0
    } else {
        1.0
    };

    Some(base * multiplier)
}
