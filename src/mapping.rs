use crate::error::{NormalizerError, Result};
use crate::expression::{has_operator, FieldExpression};
use crate::schema::{Field, MappingConfig};
use crate::statement::{RawStatement, StatementRow};
use crate::utils::format_millions;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the source for one target field is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "method", content = "input", rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    #[schemars(description = "Use the first configured alias present in the statement")]
    FirstMatch,

    #[schemars(description = "Use this candidate column, which must be in the candidate list")]
    Choose(String),

    #[schemars(
        description = "A 1-based candidate index ('2'), an arithmetic expression over indices ('1+2-3'), or a raw column name present in the statement"
    )]
    Custom(String),
}

/// Raw columns eligible for one target field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidates {
    pub columns: Vec<String>,
    /// False when no alias matched and `columns` lists every raw column.
    pub matched: bool,
}

impl Candidates {
    /// The "first matching alias", absent in degraded mode.
    pub fn default_choice(&self) -> Option<&str> {
        if self.matched {
            self.columns.first().map(String::as_str)
        } else {
            None
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.matched
    }
}

/// Candidate columns for a field: aliases present in the statement, in alias
/// order. Exact names are tried for every alias first; only when none match
/// is a case-insensitive pass made. With no match at all every raw column
/// becomes a candidate.
pub fn find_candidates(statement: &RawStatement, aliases: &[String]) -> Candidates {
    let mut columns: Vec<String> = Vec::new();
    let mut push = |column: &str| {
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
    };

    for alias in aliases.iter().filter(|a| statement.has_column(a)) {
        push(alias.as_str());
    }
    if !aliases.iter().any(|a| statement.has_column(a)) {
        for column in aliases.iter().filter_map(|a| statement.find_column_ignore_case(a)) {
            push(column);
        }
    }

    if columns.is_empty() {
        Candidates {
            columns: statement.columns().to_vec(),
            matched: false,
        }
    } else {
        Candidates {
            columns,
            matched: true,
        }
    }
}

/// Outcome of resolving one field: the expression to use and, when the
/// requested selection could not be honoured, why.
#[derive(Debug)]
pub struct Resolution {
    pub field: Field,
    pub candidates: Candidates,
    pub expression: FieldExpression,
    pub issue: Option<NormalizerError>,
}

/// Resolves one target field. Pure: identical inputs give identical output.
///
/// A failed selection falls back to the first matching alias, or leaves the
/// field unresolved when there is none.
pub fn resolve(
    field: Field,
    statement: &RawStatement,
    candidates: Candidates,
    policy: &SelectionPolicy,
) -> Resolution {
    let outcome = select(statement, &candidates, policy);

    let (expression, issue) = match outcome {
        Ok(Some(expression)) => (expression, None),
        Ok(None) => match candidates.default_choice() {
            Some(column) => (FieldExpression::Direct(column.to_string()), None),
            None => (
                FieldExpression::Unresolved,
                Some(NormalizerError::UnresolvedField(field)),
            ),
        },
        Err(issue) => {
            let fallback = candidates
                .default_choice()
                .map(|c| FieldExpression::Direct(c.to_string()))
                .unwrap_or(FieldExpression::Unresolved);
            (fallback, Some(issue))
        }
    };

    Resolution {
        field,
        candidates,
        expression,
        issue,
    }
}

/// `Ok(None)` means "use the default".
fn select(
    statement: &RawStatement,
    candidates: &Candidates,
    policy: &SelectionPolicy,
) -> Result<Option<FieldExpression>> {
    match policy {
        SelectionPolicy::FirstMatch => Ok(None),

        SelectionPolicy::Choose(column) => {
            if candidates.columns.iter().any(|c| c == column) {
                Ok(Some(FieldExpression::Direct(column.clone())))
            } else {
                Err(NormalizerError::UnrecognizedInput(column.clone()))
            }
        }

        SelectionPolicy::Custom(input) => {
            let input = input.trim();
            if input.is_empty() {
                return Ok(None);
            }

            if input.bytes().all(|b| b.is_ascii_digit()) {
                let index = input.parse::<usize>().unwrap_or(usize::MAX);
                return if (1..=candidates.columns.len()).contains(&index) {
                    Ok(Some(FieldExpression::Direct(
                        candidates.columns[index - 1].clone(),
                    )))
                } else {
                    Err(NormalizerError::OutOfRangeSelection {
                        index,
                        len: candidates.columns.len(),
                    })
                };
            }

            if statement.has_column(input) {
                return Ok(Some(FieldExpression::Direct(input.to_string())));
            }

            let typed_name = !input.contains('`') && !input.bytes().any(|b| b.is_ascii_digit());
            if has_operator(input) || input.contains('`') {
                let expr = match FieldExpression::parse_indexed(input, &candidates.columns) {
                    Ok(expr) => expr,
                    // e.g. "Non-Operating Income": a name, not an expression
                    Err(NormalizerError::InvalidExpression { .. }) if typed_name => {
                        return Err(NormalizerError::UnrecognizedInput(input.to_string()))
                    }
                    Err(e) => return Err(e),
                };
                if let Some(unknown) = expr.columns().into_iter().find(|c| !statement.has_column(c)) {
                    return Err(NormalizerError::UnrecognizedInput(unknown.to_string()));
                }
                return Ok(Some(FieldExpression::from_expr(expr)));
            }

            Err(NormalizerError::UnrecognizedInput(input.to_string()))
        }
    }
}

/// Every configured target field with its resolved expression.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserMapping {
    entries: BTreeMap<Field, FieldExpression>,
}

static UNRESOLVED: FieldExpression = FieldExpression::Unresolved;

impl UserMapping {
    /// Builds a mapping that covers exactly the fields of `config`.
    pub fn from_entries(
        config: &MappingConfig,
        entries: BTreeMap<Field, FieldExpression>,
    ) -> Result<Self> {
        for field in entries.keys() {
            if config.aliases(*field).is_none() {
                return Err(NormalizerError::InvalidMappingConfig {
                    field: field.to_string(),
                    details: "mapping entry for a field missing from the config".to_string(),
                });
            }
        }
        for field in config.fields() {
            if !entries.contains_key(&field) {
                return Err(NormalizerError::InvalidMappingConfig {
                    field: field.to_string(),
                    details: "config field has no mapping entry".to_string(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Loads a persisted mapping; stored expressions are re-parsed.
    pub fn from_json(json: &str, config: &MappingConfig) -> Result<Self> {
        let entries: BTreeMap<Field, FieldExpression> = serde_json::from_str(json)?;
        Self::from_entries(config, entries)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, field: Field) -> &FieldExpression {
        self.entries.get(&field).unwrap_or(&UNRESOLVED)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &FieldExpression)> {
        self.entries.iter().map(|(f, e)| (*f, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unresolved_fields(&self) -> Vec<Field> {
        self.iter()
            .filter(|(_, e)| !e.is_resolved())
            .map(|(f, _)| f)
            .collect()
    }
}

/// All resolutions of one mapping pass.
#[derive(Debug)]
pub struct MappingReport {
    pub mapping: UserMapping,
    pub resolutions: Vec<Resolution>,
}

impl MappingReport {
    pub fn issues(&self) -> impl Iterator<Item = (Field, &NormalizerError)> {
        self.resolutions
            .iter()
            .filter_map(|r| r.issue.as_ref().map(|issue| (r.field, issue)))
    }

    pub fn degraded_fields(&self) -> Vec<Field> {
        self.resolutions
            .iter()
            .filter(|r| r.candidates.is_degraded())
            .map(|r| r.field)
            .collect()
    }

    pub fn resolution(&self, field: Field) -> Option<&Resolution> {
        self.resolutions.iter().find(|r| r.field == field)
    }
}

pub struct MappingResolver<'a> {
    config: &'a MappingConfig,
}

impl<'a> MappingResolver<'a> {
    pub fn new(config: &'a MappingConfig) -> Self {
        Self { config }
    }

    pub fn candidates(&self, statement: &RawStatement, field: Field) -> Candidates {
        let aliases = self.config.aliases(field).unwrap_or(&[]);
        find_candidates(statement, aliases)
    }

    /// Resolves every configured field. Fields absent from `selections` use
    /// [`SelectionPolicy::FirstMatch`].
    pub fn resolve_all(
        &self,
        statement: &RawStatement,
        selections: &BTreeMap<Field, SelectionPolicy>,
    ) -> Result<MappingReport> {
        self.config.validate()?;

        let default_policy = SelectionPolicy::FirstMatch;
        let mut entries = BTreeMap::new();
        let mut resolutions = Vec::with_capacity(self.config.targets.len());

        for field in self.config.fields() {
            let candidates = self.candidates(statement, field);
            if candidates.is_degraded() {
                warn!(
                    "No configured alias for '{}' found in statement; offering all {} columns",
                    field,
                    candidates.columns.len()
                );
            }

            let policy = selections.get(&field).unwrap_or(&default_policy);
            let resolution = resolve(field, statement, candidates, policy);

            match &resolution.issue {
                Some(issue) => warn!(
                    "Mapping for '{}' fell back to {}: {}",
                    field, resolution.expression, issue
                ),
                None => debug!("Mapped '{}' -> {}", field, resolution.expression),
            }

            entries.insert(field, resolution.expression.clone());
            resolutions.push(resolution);
        }

        Ok(MappingReport {
            mapping: UserMapping::from_entries(self.config, entries)?,
            resolutions,
        })
    }

    pub fn resolve_defaults(&self, statement: &RawStatement) -> Result<MappingReport> {
        self.resolve_all(statement, &BTreeMap::new())
    }
}

/// A candidate as shown to the person choosing a mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePreview {
    pub index: usize,
    pub column: String,
    pub value: Option<f64>,
    pub display: String,
}

/// Latest value of `column`, preferring the sub-annual statement (exact, then
/// case-insensitive name) and falling back to the annual one.
fn latest_value(column: &str, annual: &RawStatement, sub_annual: Option<&RawStatement>) -> Option<f64> {
    if let Some(sub) = sub_annual {
        let name = if sub.has_column(column) {
            Some(column)
        } else {
            sub.find_column_ignore_case(column)
        };
        if let Some(name) = name {
            return sub.latest().and_then(|row| row.number(name));
        }
    }
    annual.latest().and_then(|row| row.number(column))
}

pub fn preview_candidates(
    candidates: &Candidates,
    annual: &RawStatement,
    sub_annual: Option<&RawStatement>,
) -> Vec<CandidatePreview> {
    candidates
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = latest_value(column, annual, sub_annual);
            CandidatePreview {
                index: i + 1,
                column: column.clone(),
                value,
                display: format_millions(value),
            }
        })
        .collect()
}

/// Value an expression would take on the most recent preview period.
pub fn preview_expression(
    expression: &FieldExpression,
    annual: &RawStatement,
    sub_annual: Option<&RawStatement>,
) -> Option<f64> {
    match expression {
        FieldExpression::Direct(column) => latest_value(column, annual, sub_annual),
        FieldExpression::Arithmetic(_) => {
            let row: &StatementRow = sub_annual
                .and_then(RawStatement::latest)
                .or_else(|| annual.latest())?;
            expression.evaluate(row)
        }
        FieldExpression::Unresolved => None,
    }
}
