use crate::error::{NormalizerError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Canonical income statement field.
///
/// The first twelve variants are mapping targets sourced from raw statement
/// lines. The rest are computed by the derivation engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Field {
    #[serde(rename = "Revenue")]
    #[schemars(description = "Top-line sales for the period")]
    Revenue,

    #[serde(rename = "Total COGS")]
    #[schemars(description = "Cost of goods sold / cost of revenue")]
    TotalCogs,

    #[serde(rename = "Gross Profit")]
    #[schemars(description = "Revenue less cost of revenue. Derived as Revenue - Total COGS when not reported.")]
    GrossProfit,

    #[serde(rename = "SG&A")]
    #[schemars(description = "Selling, general and administrative expenses")]
    SellingGeneralAdministrative,

    #[serde(rename = "R&D")]
    #[schemars(description = "Research and development expenses")]
    ResearchDevelopment,

    #[serde(rename = "S&M")]
    #[schemars(description = "Sales and marketing expenses, when reported separately from SG&A")]
    SalesMarketing,

    #[serde(rename = "Operating Income")]
    #[schemars(description = "Operating income. Derived as Gross Profit - Operating Expenses when not reported.")]
    OperatingIncome,

    #[serde(rename = "Pretax Income")]
    #[schemars(description = "Income before income taxes")]
    PretaxIncome,

    #[serde(rename = "Taxes")]
    #[schemars(description = "Income tax expense. Derived as Pretax Income - Net Income when not reported.")]
    Taxes,

    #[serde(rename = "Net Income")]
    #[schemars(description = "Bottom-line net income")]
    NetIncome,

    #[serde(rename = "EPS")]
    #[schemars(description = "Diluted earnings per share")]
    Eps,

    #[serde(rename = "Net Interest Income")]
    #[schemars(description = "Net non-operating interest income or expense")]
    NetInterestIncome,

    #[serde(rename = "Operating Expenses")]
    #[schemars(description = "SG&A + R&D + S&M, with unresolved parts counted as zero")]
    OperatingExpenses,

    #[serde(rename = "Tax Percentage")]
    TaxPercentage,

    #[serde(rename = "Net Margin")]
    NetMargin,

    #[serde(rename = "Operating Margin")]
    OperatingMargin,

    #[serde(rename = "Net Income Y/Y")]
    NetIncomeYoy,

    #[serde(rename = "Revenue Y/Y")]
    RevenueYoy,

    #[serde(rename = "Gross Margin")]
    GrossMargin,
}

impl Field {
    /// Fields resolved from raw statement lines, in default configuration order.
    pub const MAPPING_TARGETS: [Field; 12] = [
        Field::Revenue,
        Field::TotalCogs,
        Field::GrossProfit,
        Field::SellingGeneralAdministrative,
        Field::ResearchDevelopment,
        Field::SalesMarketing,
        Field::OperatingIncome,
        Field::PretaxIncome,
        Field::Taxes,
        Field::NetIncome,
        Field::Eps,
        Field::NetInterestIncome,
    ];

    /// Columns of the final table, in their fixed presentation order.
    pub const OUTPUT_COLUMNS: [Field; 17] = [
        Field::Revenue,
        Field::TotalCogs,
        Field::GrossProfit,
        Field::SellingGeneralAdministrative,
        Field::ResearchDevelopment,
        Field::OperatingIncome,
        Field::PretaxIncome,
        Field::Taxes,
        Field::TaxPercentage,
        Field::NetIncome,
        Field::Eps,
        Field::NetInterestIncome,
        Field::NetMargin,
        Field::OperatingMargin,
        Field::NetIncomeYoy,
        Field::RevenueYoy,
        Field::GrossMargin,
    ];

    pub const ALL: [Field; 19] = [
        Field::Revenue,
        Field::TotalCogs,
        Field::GrossProfit,
        Field::SellingGeneralAdministrative,
        Field::ResearchDevelopment,
        Field::SalesMarketing,
        Field::OperatingIncome,
        Field::PretaxIncome,
        Field::Taxes,
        Field::NetIncome,
        Field::Eps,
        Field::NetInterestIncome,
        Field::OperatingExpenses,
        Field::TaxPercentage,
        Field::NetMargin,
        Field::OperatingMargin,
        Field::NetIncomeYoy,
        Field::RevenueYoy,
        Field::GrossMargin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Revenue => "Revenue",
            Field::TotalCogs => "Total COGS",
            Field::GrossProfit => "Gross Profit",
            Field::SellingGeneralAdministrative => "SG&A",
            Field::ResearchDevelopment => "R&D",
            Field::SalesMarketing => "S&M",
            Field::OperatingIncome => "Operating Income",
            Field::PretaxIncome => "Pretax Income",
            Field::Taxes => "Taxes",
            Field::NetIncome => "Net Income",
            Field::Eps => "EPS",
            Field::NetInterestIncome => "Net Interest Income",
            Field::OperatingExpenses => "Operating Expenses",
            Field::TaxPercentage => "Tax Percentage",
            Field::NetMargin => "Net Margin",
            Field::OperatingMargin => "Operating Margin",
            Field::NetIncomeYoy => "Net Income Y/Y",
            Field::RevenueYoy => "Revenue Y/Y",
            Field::GrossMargin => "Gross Margin",
        }
    }

    pub fn is_mapping_target(&self) -> bool {
        Self::MAPPING_TARGETS.contains(self)
    }

    /// Monetary columns are scaled into millions for display.
    pub fn is_monetary(&self) -> bool {
        matches!(
            self,
            Field::Revenue
                | Field::TotalCogs
                | Field::GrossProfit
                | Field::SellingGeneralAdministrative
                | Field::ResearchDevelopment
                | Field::SalesMarketing
                | Field::OperatingIncome
                | Field::PretaxIncome
                | Field::Taxes
                | Field::NetIncome
                | Field::NetInterestIncome
                | Field::OperatingExpenses
        )
    }

    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            Field::TaxPercentage
                | Field::NetMargin
                | Field::OperatingMargin
                | Field::NetIncomeYoy
                | Field::RevenueYoy
                | Field::GrossMargin
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = NormalizerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s.trim())
            .ok_or_else(|| NormalizerError::InvalidMappingConfig {
                field: s.to_string(),
                details: "not a canonical field name".to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TargetAliases {
    #[schemars(description = "The canonical target field this entry configures")]
    pub field: Field,

    #[schemars(
        description = "Vendor line-item names accepted as sources for the field, in preference order. The first one present in a statement is the default choice."
    )]
    pub aliases: Vec<String>,
}

/// Static target-field to alias-list table driving candidate discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MappingConfig {
    #[schemars(description = "One entry per mapping target, in the order they are resolved")]
    pub targets: Vec<TargetAliases>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        let entry = |field: Field, aliases: &[&str]| TargetAliases {
            field,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        };

        Self {
            targets: vec![
                entry(Field::Revenue, &["Total Revenue", "Operating Revenue"]),
                entry(Field::TotalCogs, &["Cost Of Revenue"]),
                entry(Field::GrossProfit, &["Gross Profit"]),
                entry(
                    Field::SellingGeneralAdministrative,
                    &["Selling General And Administration", "General & Administrative"],
                ),
                entry(Field::ResearchDevelopment, &["Research And Development"]),
                entry(
                    Field::SalesMarketing,
                    &[
                        "Sales And Marketing",
                        "Selling and Marketing",
                        "Selling Expenses",
                        "Marketing Expense",
                    ],
                ),
                entry(Field::OperatingIncome, &["Operating Income"]),
                entry(Field::PretaxIncome, &["Pretax Income"]),
                entry(Field::Taxes, &["Income Tax Expense", "Taxes"]),
                entry(Field::NetIncome, &["Net Income"]),
                entry(Field::Eps, &["Diluted EPS"]),
                entry(
                    Field::NetInterestIncome,
                    &[
                        "Net Non Operating Interest Income Expense",
                        "Other Income Expense",
                    ],
                ),
            ],
        }
    }
}

impl MappingConfig {
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.targets.iter().map(|t| t.field)
    }

    pub fn aliases(&self, field: Field) -> Option<&[String]> {
        self.targets
            .iter()
            .find(|t| t.field == field)
            .map(|t| t.aliases.as_slice())
    }

    /// Replaces (or appends) the alias list for one field.
    pub fn with_aliases<I, S>(mut self, field: Field, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let aliases: Vec<String> = aliases.into_iter().map(Into::into).collect();
        match self.targets.iter_mut().find(|t| t.field == field) {
            Some(target) => target.aliases = aliases,
            None => self.targets.push(TargetAliases { field, aliases }),
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for target in &self.targets {
            if !target.field.is_mapping_target() {
                return Err(NormalizerError::InvalidMappingConfig {
                    field: target.field.to_string(),
                    details: "computed fields cannot be mapped from raw lines".to_string(),
                });
            }
            if !seen.insert(target.field) {
                return Err(NormalizerError::InvalidMappingConfig {
                    field: target.field.to_string(),
                    details: "field is configured more than once".to_string(),
                });
            }
            if target.aliases.is_empty() {
                return Err(NormalizerError::InvalidMappingConfig {
                    field: target.field.to_string(),
                    details: "at least one alias is required".to_string(),
                });
            }
            if let Some(idx) = target.aliases.iter().position(|a| a.trim().is_empty()) {
                return Err(NormalizerError::InvalidMappingConfig {
                    field: target.field.to_string(),
                    details: format!("alias #{} is blank", idx + 1),
                });
            }
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(MappingConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Options for a single analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisOptions {
    #[schemars(description = "Prepend a trailing-twelve-month period built from sub-annual data")]
    pub include_ttm: bool,

    #[schemars(description = "Number of most recent sub-annual periods summed into the TTM period")]
    pub ttm_periods: usize,

    #[schemars(description = "Divisor applied to monetary columns in the display table (1e6 = millions)")]
    pub display_scale: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_ttm: true,
            ttm_periods: 4,
            display_scale: 1_000_000.0,
        }
    }
}

impl AnalysisOptions {
    pub fn validate(&self) -> Result<()> {
        if self.ttm_periods == 0 {
            return Err(NormalizerError::InvalidOptions(
                "ttm_periods must be at least 1".to_string(),
            ));
        }
        if !self.display_scale.is_finite() || self.display_scale <= 0.0 {
            return Err(NormalizerError::InvalidOptions(format!(
                "display_scale must be a positive number, got {}",
                self.display_scale
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_covers_every_target() {
        let config = MappingConfig::default();
        assert!(config.validate().is_ok());

        let fields: Vec<Field> = config.fields().collect();
        assert_eq!(fields, Field::MAPPING_TARGETS.to_vec());
        assert_eq!(
            config.aliases(Field::Revenue).unwrap(),
            &["Total Revenue".to_string(), "Operating Revenue".to_string()]
        );
    }

    #[test]
    fn test_field_names_round_trip_through_from_str() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
        assert!("Free Cash Flow".parse::<Field>().is_err());
    }

    #[test]
    fn test_field_serializes_with_display_name() {
        let json = serde_json::to_string(&Field::SellingGeneralAdministrative).unwrap();
        assert_eq!(json, "\"SG&A\"");
        let back: Field = serde_json::from_str("\"Revenue Y/Y\"").unwrap();
        assert_eq!(back, Field::RevenueYoy);
    }

    #[test]
    fn test_with_aliases_overrides_defaults() {
        let config = MappingConfig::default().with_aliases(Field::Revenue, ["Revenue"]);
        assert_eq!(config.aliases(Field::Revenue).unwrap(), &["Revenue".to_string()]);
        assert_eq!(config.targets.len(), 12);
    }

    #[test]
    fn test_validation_rejects_computed_and_duplicate_fields() {
        let computed = MappingConfig {
            targets: vec![TargetAliases {
                field: Field::GrossMargin,
                aliases: vec!["Gross Margin".to_string()],
            }],
        };
        assert!(matches!(
            computed.validate(),
            Err(NormalizerError::InvalidMappingConfig { .. })
        ));

        let duplicate = MappingConfig::default().with_aliases(Field::Eps, ["Diluted EPS"]);
        let mut targets = duplicate.targets.clone();
        targets.push(targets[0].clone());
        assert!(MappingConfig { targets }.validate().is_err());

        let blank = MappingConfig::default().with_aliases(Field::Eps, ["  "]);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_and_schema() {
        let json = MappingConfig::default().to_json().unwrap();
        assert!(json.contains("\"Total COGS\""));
        let loaded = MappingConfig::from_json(&json).unwrap();
        assert_eq!(loaded, MappingConfig::default());

        let schema = MappingConfig::schema_as_json().unwrap();
        assert!(schema.contains("aliases"));
    }

    #[test]
    fn test_analysis_options_defaults_and_validation() {
        let options = AnalysisOptions::default();
        assert!(options.include_ttm);
        assert_eq!(options.ttm_periods, 4);
        assert!(options.validate().is_ok());

        let partial: AnalysisOptions = serde_json::from_str(r#"{"include_ttm": false}"#).unwrap();
        assert!(!partial.include_ttm);
        assert_eq!(partial.ttm_periods, 4);

        let zero = AnalysisOptions { ttm_periods: 0, ..AnalysisOptions::default() };
        assert!(matches!(zero.validate(), Err(NormalizerError::InvalidOptions(_))));
        let bad_scale = AnalysisOptions { display_scale: 0.0, ..AnalysisOptions::default() };
        assert!(bad_scale.validate().is_err());
    }
}
