use licensegate_contracts::{CatalogEntry, Submission};
use serde_json::Value;

use crate::catalog::find_exact;
use crate::intake::{license_value, resolve_classifier, resolve_tool};

pub const AUTO_APPROVE_CLASSIFIER: &str = "license request";
pub const MAX_AUTO_APPROVED_LICENSES: f64 = 5.0;
const APPROVED_CATEGORY: &str = "approved softwares";
const UNIDENTIFIED_LICENSE: &str = "unidentified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoApproval {
    Approve,
    Deny { reason_code: &'static str },
}

impl AutoApproval {
    pub fn is_approved(self) -> bool {
        matches!(self, AutoApproval::Approve)
    }

    pub fn reason_code(self) -> &'static str {
        match self {
            AutoApproval::Approve => "auto_approved",
            AutoApproval::Deny { reason_code } => reason_code,
        }
    }
}

/// Requested license count. Absent means zero; anything that does not read as a number is NaN.
pub fn license_count(sub: &Submission) -> f64 {
    match license_value(sub) {
        None => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Some(_) => f64::NAN,
    }
}

/// Rules that need no catalog: the classifier and the license count.
pub fn precheck(sub: &Submission) -> Result<(), &'static str> {
    let classifier = resolve_classifier(sub).unwrap_or_default();
    if classifier.trim().to_lowercase() != AUTO_APPROVE_CLASSIFIER {
        return Err("classifier_mismatch");
    }
    let count = license_count(sub);
    if !count.is_finite() || count > MAX_AUTO_APPROVED_LICENSES {
        return Err("license_count_exceeded");
    }
    Ok(())
}

/// Rules against the catalog: the tool exists verbatim and one match is approved and licensed.
pub fn catalog_gate(tool: Option<&str>, catalog: &[CatalogEntry]) -> AutoApproval {
    let matches = tool.map(|t| find_exact(t, catalog)).unwrap_or_default();
    if matches.is_empty() {
        return AutoApproval::Deny {
            reason_code: "tool_not_in_catalog",
        };
    }
    let approved = matches.iter().any(|entry| {
        entry.category.trim().eq_ignore_ascii_case(APPROVED_CATEGORY)
            && !entry
                .license_type
                .trim()
                .eq_ignore_ascii_case(UNIDENTIFIED_LICENSE)
    });
    if approved {
        AutoApproval::Approve
    } else {
        AutoApproval::Deny {
            reason_code: "catalog_entry_not_approved",
        }
    }
}

pub fn evaluate_auto_approval(sub: &Submission, catalog: &[CatalogEntry]) -> AutoApproval {
    if let Err(reason_code) = precheck(sub) {
        return AutoApproval::Deny { reason_code };
    }
    catalog_gate(resolve_tool(sub).as_deref(), catalog)
}

pub fn should_auto_approve(sub: &Submission, catalog: &[CatalogEntry]) -> bool {
    evaluate_auto_approval(sub, catalog).is_approved()
}
