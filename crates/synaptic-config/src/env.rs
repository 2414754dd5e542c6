use std::sync::OnceLock;

use regex::{Captures, Regex};
use synaptic_core::SynapticError;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid placeholder regex")
    })
}

/// Expand `${VAR}` and `${VAR:-default}` references from the process environment.
pub fn expand_env(content: &str) -> Result<String, SynapticError> {
    expand_env_with(content, |name| std::env::var(name).ok())
}

/// Expand `${VAR}` and `${VAR:-default}` references using `lookup`.
///
/// A reference without a default whose variable is not set is an error.
pub fn expand_env_with<F>(content: &str, lookup: F) -> Result<String, SynapticError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Vec<String> = Vec::new();

    let expanded = placeholder().replace_all(content, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(SynapticError::Config(format!(
            "environment variable(s) not set: {}",
            missing.join(", ")
        )));
    }

    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "MONGODB_URI" => Some("mongodb://localhost:27017".to_string()),
            "DB" => Some("rag".to_string()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_variables() {
        let out = expand_env_with("uri = \"${MONGODB_URI}/${DB}\"", lookup).unwrap();
        assert_eq!(out, "uri = \"mongodb://localhost:27017/rag\"");
    }

    #[test]
    fn falls_back_to_default() {
        let out = expand_env_with("${MISSING:-vector_index}", lookup).unwrap();
        assert_eq!(out, "vector_index");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let err = expand_env_with("${NOPE} and ${ALSO_NOPE}", lookup).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("NOPE"));
        assert!(msg.contains("ALSO_NOPE"));
    }

    #[test]
    fn leaves_plain_dollars_alone() {
        let out = expand_env_with("price: $5, regex: ^a$", lookup).unwrap();
        assert_eq!(out, "price: $5, regex: ^a$");
    }
}
