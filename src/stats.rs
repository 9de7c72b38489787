//! Invocation statistics loader.
//!
//! The trim engine never decides on its own which methods are reachable; it
//! takes that set as input, usually sourced from a profiler or a prior run
//! of the instrumented program dumping which methods were actually called.
//! This module just loads that JSON document and narrows it to the set of
//! method names the caller cares about.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct StatsDocument {
    assemblies: Vec<AssemblyStats>,
}

#[derive(Debug, Deserialize)]
struct AssemblyStats {
    #[serde(rename = "assemblyName")]
    assembly_name: String,
    methods: Vec<MethodStats>,
}

#[derive(Debug, Deserialize)]
struct MethodStats {
    #[serde(rename = "fullName")]
    full_name: String,
    #[allow(dead_code)]
    invocations: u64,
}

/// Parse an invocation statistics JSON document and return the set of
/// `fullName` strings recorded for `assembly_name`. Matching the assembly
/// name is case-insensitive, matching the teacher's metadata-name comparisons
/// throughout this crate.
pub fn load_invoked_methods(json: &str, assembly_name: &str) -> Result<HashSet<String>> {
    let document: StatsDocument =
        serde_json::from_str(json).map_err(|err| Error::ValidationError(err.to_string()))?;

    let target = assembly_name.to_lowercase();
    let mut methods = HashSet::new();
    for assembly in &document.assemblies {
        if assembly.assembly_name.to_lowercase() != target {
            continue;
        }
        for method in &assembly.methods {
            methods.insert(method.full_name.clone());
        }
    }
    Ok(methods)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
        "assemblies": [
            {
                "assemblyName": "MyApp",
                "methods": [
                    { "fullName": "MyApp.Program.Main", "invocations": 1 },
                    { "fullName": "MyApp.Widget..ctor", "invocations": 4 }
                ]
            },
            {
                "assemblyName": "Other",
                "methods": [
                    { "fullName": "Other.Thing.Go", "invocations": 1 }
                ]
            }
        ]
    }
    "#;

    #[test]
    fn filters_to_requested_assembly() {
        let methods = load_invoked_methods(SAMPLE, "MyApp").unwrap();
        assert_eq!(methods.len(), 2);
        assert!(methods.contains("MyApp.Program.Main"));
        assert!(!methods.contains("Other.Thing.Go"));
    }

    #[test]
    fn assembly_name_match_is_case_insensitive() {
        let methods = load_invoked_methods(SAMPLE, "myapp").unwrap();
        assert_eq!(methods.len(), 2);
    }

    #[test]
    fn unknown_assembly_yields_empty_set() {
        let methods = load_invoked_methods(SAMPLE, "DoesNotExist").unwrap();
        assert!(methods.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(load_invoked_methods("not json", "MyApp").is_err());
    }
}
