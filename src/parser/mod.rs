use crate::error::{ValuationError, ValuationResult};
use crate::types::Assumptions;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Contents of an assumptions overrides file.
///
/// Top-level numeric keys override the default parameter values. The
/// optional `scenarios` table maps a scenario name to further overrides
/// applied on top of the top-level ones.
///
/// ```yaml
/// purchase_price: 120
/// revenue_growth: 0.07
/// scenarios:
///   downside:
///     revenue_growth: 0.01
///     exit_multiple: 6.5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssumptionsFile {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scenarios: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(flatten)]
    pub overrides: BTreeMap<String, f64>,
}

impl AssumptionsFile {
    pub fn scenario_names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    /// Apply the top-level overrides, then the named scenario
    pub fn apply(&self, mut base: Assumptions, scenario: Option<&str>) -> ValuationResult<Assumptions> {
        for (name, value) in &self.overrides {
            base.set(name, *value)?;
        }

        if let Some(scenario) = scenario {
            let overrides = self.scenarios.get(scenario).ok_or_else(|| {
                let available: Vec<&str> = self.scenario_names().collect();
                ValuationError::Validation(if available.is_empty() {
                    format!("unknown scenario '{}': the file defines no scenarios", scenario)
                } else {
                    format!(
                        "unknown scenario '{}' (available: {})",
                        scenario,
                        available.join(", ")
                    )
                })
            })?;
            for (name, value) in overrides {
                base.set(name, *value).map_err(|e| match e {
                    ValuationError::Validation(msg) => {
                        ValuationError::Validation(format!("scenario '{}': {}", scenario, msg))
                    }
                    other => other,
                })?;
            }
        }

        base.validate()?;
        Ok(base)
    }
}

/// Parse the YAML text of an overrides file
pub fn parse_assumptions(content: &str) -> ValuationResult<AssumptionsFile> {
    if content.trim().is_empty() {
        return Ok(AssumptionsFile::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

/// Load assumptions: defaults, then the overrides file, then the scenario
pub fn load_assumptions(path: Option<&Path>, scenario: Option<&str>) -> ValuationResult<Assumptions> {
    let Some(path) = path else {
        if let Some(scenario) = scenario {
            return Err(ValuationError::Validation(format!(
                "scenario '{}' requires an assumptions file",
                scenario
            )));
        }
        return Ok(Assumptions::default());
    };

    let content = std::fs::read_to_string(path)?;
    let file = parse_assumptions(&content)?;
    debug!(
        path = %path.display(),
        overrides = file.overrides.len(),
        scenarios = file.scenarios.len(),
        "assumptions file loaded"
    );
    file.apply(Assumptions::default(), scenario)
}

/// Render assumptions as an overrides file, one commented block per category
pub fn assumptions_to_yaml(assumptions: &Assumptions) -> ValuationResult<String> {
    let mut out = String::from("# Valuation model assumptions\n");
    let mut current = None;
    let mut block = Mapping::new();

    for param in assumptions.parameters() {
        if current != Some(param.category) {
            if let Some(category) = current {
                push_block(&mut out, category.title(), std::mem::take(&mut block))?;
            }
            current = Some(param.category);
        }
        block.insert(
            Value::String(param.name.clone()),
            Value::Number(param.value.into()),
        );
    }
    if let Some(category) = current {
        push_block(&mut out, category.title(), block)?;
    }

    Ok(out)
}

fn push_block(out: &mut String, title: &str, block: Mapping) -> ValuationResult<()> {
    out.push_str(&format!("\n# {}\n", title));
    out.push_str(&serde_yaml::to_string(&Value::Mapping(block))?);
    Ok(())
}
