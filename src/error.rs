use thiserror::Error;

pub type ValuationResult<T> = Result<T, ValuationError>;

#[derive(Error, Debug)]
pub enum ValuationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Formula error: {0}")]
    Formula(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Export error: {0}")]
    Export(String),
}

/// Find the closest match for `name` among `candidates`.
///
/// Case-insensitive exact match wins, then prefix, then substring.
pub fn find_similar<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = name.to_lowercase();
    let candidates: Vec<&str> = candidates.into_iter().collect();

    if let Some(exact) = candidates.iter().find(|c| c.to_lowercase() == needle) {
        return Some((*exact).to_string());
    }
    if let Some(prefix) = candidates
        .iter()
        .find(|c| c.to_lowercase().starts_with(&needle) || needle.starts_with(&c.to_lowercase()))
    {
        return Some((*prefix).to_string());
    }
    candidates
        .iter()
        .find(|c| c.to_lowercase().contains(&needle) || needle.contains(&c.to_lowercase()))
        .map(|c| (*c).to_string())
}

/// Render an "unknown name" message with a suggestion when one exists
pub fn unknown_name_message<'a, I>(kind: &str, name: &str, candidates: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    match find_similar(name, candidates) {
        Some(suggestion) => format!("unknown {} '{}' (did you mean '{}'?)", kind, name, suggestion),
        None => format!("unknown {} '{}'", kind, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_similar_exact_case_insensitive() {
        let names = ["purchase_price", "tax_rate"];
        assert_eq!(
            find_similar("TAX_RATE", names),
            Some("tax_rate".to_string())
        );
    }

    #[test]
    fn test_find_similar_prefix() {
        let names = ["revenue_growth", "revenue_multiple"];
        assert_eq!(
            find_similar("revenue_gr", names),
            Some("revenue_growth".to_string())
        );
    }

    #[test]
    fn test_find_similar_contains() {
        let names = ["initial_revenue"];
        assert_eq!(
            find_similar("revenue", names),
            Some("initial_revenue".to_string())
        );
    }

    #[test]
    fn test_find_similar_none() {
        assert_eq!(find_similar("zzz", ["alpha", "beta"]), None);
    }

    #[test]
    fn test_unknown_name_message_with_suggestion() {
        let msg = unknown_name_message("parameter", "tax", ["tax_rate"]);
        assert_eq!(msg, "unknown parameter 'tax' (did you mean 'tax_rate'?)");
    }

    #[test]
    fn test_error_display() {
        let err = ValuationError::InvalidPath("model.csv".to_string());
        assert_eq!(err.to_string(), "Invalid output path: model.csv");
    }
}
