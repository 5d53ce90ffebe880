//! Composition of utility source into generated artifacts.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use super::{UtilityDescriptor, UtilityMap};

/// Injection failures abort the session; the loop cannot meaningfully
/// continue executing code that references capabilities it cannot resolve.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown utility requested for injection: {0}")]
    UnknownUtility(String),
}

/// Banner line marking an injected utility block. Also the idempotence
/// guard: a utility whose banner is already present is never injected twice.
pub fn utility_banner(name: &str) -> String {
    format!("// ==== utility: {} ====", name)
}

/// Preamble that makes external packages available inside the sandbox.
///
/// The actual install semantics belong to the sandbox environment; the
/// preamble only has to trigger them before the utility source runs.
pub fn install_preamble(dependencies: &BTreeSet<String>, language: &str) -> String {
    if dependencies.is_empty() {
        return String::new();
    }
    let packages = dependencies
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");

    match language.to_ascii_lowercase().as_str() {
        "typescript" | "javascript" => format!(
            "// ==== sandbox dependencies ====\n\
             import {{ execSync }} from \"node:child_process\";\n\
             execSync(\"npm install --no-save {}\", {{ stdio: \"ignore\" }});\n",
            packages
        ),
        "python" => format!(
            "# ==== sandbox dependencies ====\n\
             import subprocess\n\
             subprocess.run([\"pip\", \"install\", \"--quiet\", {}], check=False)\n",
            dependencies
                .iter()
                .map(|d| format!("\"{}\"", d))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        _ => format!("// sandbox dependencies: {}\n", packages),
    }
}

/// Prepend the named utilities' source to `code`.
///
/// Composition order: installer preamble, then each utility's source in
/// alphabetical name order, then a blank separator, then the original code
/// verbatim. Idempotent: utilities already present (by banner) are skipped,
/// and when nothing is left to add the code is returned unchanged.
pub fn inject(
    code: &str,
    detected: &[String],
    snapshot: &UtilityMap,
    language: &str,
) -> Result<String, RegistryError> {
    let mut utilities: Vec<Arc<UtilityDescriptor>> = Vec::new();
    for name in detected {
        let utility = snapshot
            .get(name)
            .ok_or_else(|| RegistryError::UnknownUtility(name.clone()))?;
        utilities.push(Arc::clone(utility));
    }
    utilities.sort_by(|a, b| a.name.cmp(&b.name));
    utilities.dedup_by(|a, b| a.name == b.name);
    utilities.retain(|u| !code.contains(&utility_banner(&u.name)));

    if utilities.is_empty() {
        return Ok(code.to_string());
    }

    let dependencies: BTreeSet<String> = utilities
        .iter()
        .flat_map(|u| u.dependencies.iter().cloned())
        .collect();

    let mut composed = install_preamble(&dependencies, language);
    for utility in &utilities {
        composed.push_str(&utility_banner(&utility.name));
        composed.push('\n');
        composed.push_str(utility.source.trim_end());
        composed.push('\n');
    }
    composed.push('\n');
    composed.push_str(code);
    Ok(composed)
}
