//! Mapping from a loosely shaped [`Submission`] to a canonical [`RequestRecord`].
//!
//! Precedence for every aliased field is top-level fields first, in declaration order, then the
//! nested form payload, then the fixed default.

use chrono::{DateTime, NaiveDate, Utc};
use licensegate_contracts::{
    FormPayload, RequestOverview, RequestRecord, RequestStatus, RequestType, Submission,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const DEFAULT_TOOL: &str = "Unknown Tool";
pub const DEFAULT_DEPARTMENT: &str = "General";
pub const DEFAULT_RISK: &str = "Low";
pub const DEFAULT_USER_NAME: &str = "Unknown User";
pub const DEFAULT_VENDOR: &str = "N/A";
pub const DEFAULT_LICENSES: &str = "N/A";
pub const DEFAULT_TIMELINE: &str = "Not specified";

static PRINCIPAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("principal regex"));

/// Basic email-shape check used for notification principals.
pub fn is_valid_principal(text: &str) -> bool {
    PRINCIPAL_RE.is_match(text)
}

pub fn classify_request_type(classifier: &str) -> RequestType {
    let text = classifier.to_lowercase();
    if text.contains("license request") {
        RequestType::Reuse
    } else if text.contains("new software request") {
        RequestType::New
    } else if text.contains("reuse") {
        RequestType::Reuse
    } else {
        RequestType::New
    }
}

/// Title-cased words of the email local-part, split on `.`, `_` and `-`.
pub fn derive_user_name(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    local
        .split(['.', '_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_display_date(ts: DateTime<Utc>) -> String {
    ts.format("%b %d, %Y").to_string()
}

pub fn resolve_tool(sub: &Submission) -> Option<String> {
    first_text([
        sub.tool.as_deref(),
        sub.tool_name.as_deref(),
        sub.software_name.as_deref(),
        form(sub).and_then(|f| f.tool_name.as_deref()),
    ])
}

pub fn resolve_classifier(sub: &Submission) -> Option<String> {
    first_text([
        sub.request_type.as_deref(),
        form(sub).and_then(|f| f.request_type.as_deref()),
    ])
}

/// Caller hint for id allocation.
pub fn resolve_id_hint(sub: &Submission) -> Option<String> {
    first_text([
        sub.id.as_deref(),
        sub.request_id.as_deref(),
        form(sub).and_then(|f| f.request_id.as_deref()),
    ])
}

/// An explicit, recognizable status wins; otherwise the auto-approval verdict decides.
pub fn resolve_status(sub: &Submission, auto_approved: bool) -> RequestStatus {
    match sub.status.as_deref().and_then(RequestStatus::parse) {
        Some(status) => status,
        None if auto_approved => RequestStatus::Approved,
        None => RequestStatus::Pending,
    }
}

/// First present license value: required licenses, number of users, then the form payload's
/// required licenses.
pub fn license_value(sub: &Submission) -> Option<&Value> {
    sub.required_licenses
        .as_ref()
        .or(sub.number_of_users.as_ref())
        .or_else(|| form(sub).and_then(|f| f.required_licenses.as_ref()))
}

pub fn build_record(
    id: String,
    sub: &Submission,
    status: RequestStatus,
    now: DateTime<Utc>,
) -> RequestRecord {
    let tool = resolve_tool(sub).unwrap_or_else(|| DEFAULT_TOOL.to_string());
    let classifier = resolve_classifier(sub);
    let request_type = classify_request_type(classifier.as_deref().unwrap_or_default());
    let (user_name, user_email) = resolve_identity(sub);
    let requester = first_text([sub.requester.as_deref()]).unwrap_or_else(|| user_name.clone());
    let department = first_text([
        sub.department.as_deref(),
        form(sub).and_then(|f| f.department.as_deref()),
    ])
    .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string());
    let risk = first_text([sub.risk.as_deref()]).unwrap_or_else(|| DEFAULT_RISK.to_string());
    let use_case = first_text([
        sub.use_case.as_deref(),
        form(sub).and_then(|f| f.use_case.as_deref()),
    ])
    .unwrap_or_default();
    let justification = first_text([
        sub.justification.as_deref(),
        form(sub).and_then(|f| f.justification.as_deref()),
    ])
    .unwrap_or_default();
    let vendor = first_text([
        sub.vendor.as_deref(),
        form(sub).and_then(|f| f.vendor.as_deref()),
    ]);
    let timeline = first_text([
        sub.timeline.as_deref(),
        form(sub).and_then(|f| f.timeline.as_deref()),
    ]);
    let licenses = license_value(sub).cloned();
    let created = resolve_timestamp(sub).unwrap_or(now);

    let request_overview = RequestOverview {
        type_label: classifier
            .clone()
            .unwrap_or_else(|| request_type.label().to_string()),
        tool: tool.clone(),
        vendor: vendor.clone().unwrap_or_else(|| DEFAULT_VENDOR.to_string()),
        department: department.clone(),
        licenses: licenses
            .as_ref()
            .and_then(value_text)
            .unwrap_or_else(|| DEFAULT_LICENSES.to_string()),
        timeline: timeline
            .clone()
            .unwrap_or_else(|| DEFAULT_TIMELINE.to_string()),
    };

    let mut form_payload = sub.form_payload.clone().unwrap_or_default();
    form_payload.request_type = Some(request_overview.type_label.clone());
    form_payload.tool_name = Some(tool.clone());
    form_payload.department = Some(department.clone());
    form_payload.vendor = vendor;
    form_payload.timeline = timeline;
    form_payload.required_licenses = licenses;
    if form_payload.number_of_users.is_none() {
        form_payload.number_of_users = sub.number_of_users.clone();
    }
    form_payload.use_case = Some(use_case.clone());
    form_payload.justification = Some(justification.clone());
    form_payload.user_email = Some(user_email.clone());
    form_payload.user_name = Some(user_name.clone());

    RequestRecord {
        id,
        tool,
        requester,
        user_name,
        user_email,
        department,
        status,
        request_type,
        risk,
        date: format_display_date(created),
        created_at: created.to_rfc3339(),
        use_case,
        justification,
        request_overview,
        form_payload,
    }
}

/// `(user_name, user_email)`. Email-shaped name fields count as an email source, never a name.
fn resolve_identity(sub: &Submission) -> (String, String) {
    let name_candidates = [
        sub.user_name.as_deref(),
        sub.name.as_deref(),
        form(sub).and_then(|f| f.user_name.as_deref()),
    ];
    let email = first_text([
        sub.user_email.as_deref(),
        sub.email.as_deref(),
        form(sub).and_then(|f| f.user_email.as_deref()),
    ])
    .or_else(|| {
        name_candidates
            .iter()
            .flatten()
            .map(|v| v.trim())
            .find(|v| v.contains('@'))
            .map(str::to_string)
    })
    .unwrap_or_default();

    let explicit_name = name_candidates
        .iter()
        .flatten()
        .map(|v| v.trim())
        .find(|v| !v.is_empty() && !v.contains('@'))
        .map(str::to_string);
    let user_name = explicit_name
        .or_else(|| Some(derive_user_name(&email)).filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_USER_NAME.to_string());
    (user_name, email)
}

fn resolve_timestamp(sub: &Submission) -> Option<DateTime<Utc>> {
    [sub.created_at.as_deref(), sub.date.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|raw| {
            let raw = raw.trim();
            DateTime::parse_from_rfc3339(raw)
                .map(|v| v.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|dt| dt.and_utc())
                })
        })
}

fn form(sub: &Submission) -> Option<&FormPayload> {
    sub.form_payload.as_ref()
}

fn first_text<'a, const N: usize>(candidates: [Option<&'a str>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
