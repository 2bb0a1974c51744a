//! Request intake and catalog logic with no I/O: text normalization, catalog matching, request id
//! allocation, the auto-approval gate, submission mapping and the in-memory request store.

pub mod catalog;
pub mod ids;
pub mod intake;
pub mod policy;
pub mod store;
pub mod text;

pub use catalog::{catalog_entry, find_exact, has_keyword_match, parse_catalog_csv};
pub use ids::{
    extract_first_int, is_reasonable_id, next_id, next_id_above, ID_CEILING, ID_FLOOR, ID_PREFIX,
};
pub use intake::{
    build_record, classify_request_type, derive_user_name, format_display_date,
    is_valid_principal, license_value, resolve_classifier, resolve_id_hint, resolve_status,
    resolve_tool,
};
pub use policy::{
    catalog_gate, evaluate_auto_approval, license_count, precheck, should_auto_approve,
    AutoApproval,
};
pub use store::RequestStore;
pub use text::{normalize, tokenize, STOP_WORDS};
