use licensegate_contracts::CatalogEntry;

use crate::text::{normalize, tokenize};

const NAME_HEADER: &str = "software name";
const CATEGORY_HEADER: &str = "category";
const LICENSE_TYPE_HEADER: &str = "license type";

pub fn catalog_entry(software_name: &str, category: &str, license_type: &str) -> CatalogEntry {
    let software_name = software_name.trim().to_string();
    CatalogEntry {
        normalized_software_name: normalize(&software_name),
        software_keywords: tokenize(&software_name),
        software_name,
        category: category.trim().to_string(),
        license_type: license_type.trim().to_string(),
    }
}

/// Parse the master software list. Missing columns and unreadable cells become empty strings;
/// rows the CSV reader cannot frame are skipped.
pub fn parse_catalog_csv(text: &str) -> Vec<CatalogEntry> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .byte_headers()
        .map(|row| {
            row.iter()
                .map(|cell| {
                    String::from_utf8_lossy(cell)
                        .trim_start_matches('\u{feff}')
                        .trim()
                        .to_ascii_lowercase()
                })
                .collect()
        })
        .unwrap_or_default();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let name_col = column(NAME_HEADER);
    let category_col = column(CATEGORY_HEADER);
    let license_col = column(LICENSE_TYPE_HEADER);

    reader
        .byte_records()
        .filter_map(Result::ok)
        .map(|row| {
            let cell = |idx: Option<usize>| {
                idx.and_then(|i| row.get(i))
                    .map(|raw| String::from_utf8_lossy(raw).into_owned())
                    .unwrap_or_default()
            };
            catalog_entry(&cell(name_col), &cell(category_col), &cell(license_col))
        })
        .collect()
}

/// Entries whose normalized name equals the normalized query.
pub fn find_exact<'a>(tool_text: &str, catalog: &'a [CatalogEntry]) -> Vec<&'a CatalogEntry> {
    let wanted = normalize(tool_text);
    if wanted.is_empty() {
        return Vec::new();
    }
    catalog
        .iter()
        .filter(|entry| entry.normalized_software_name == wanted)
        .collect()
}

/// Fuzzy match: substring containment either way, else keyword overlap. A single-keyword query
/// needs one shared keyword; a multi-keyword query needs two.
pub fn has_keyword_match(tool_text: &str, entry: &CatalogEntry) -> bool {
    let wanted = normalize(tool_text);
    let name = &entry.normalized_software_name;
    if !wanted.is_empty()
        && !name.is_empty()
        && (name.contains(wanted.as_str()) || wanted.contains(name.as_str()))
    {
        return true;
    }

    let keywords = tokenize(tool_text);
    let overlap = keywords
        .iter()
        .filter(|k| entry.software_keywords.contains(*k))
        .count();
    if keywords.len() <= 1 {
        overlap >= 1
    } else {
        overlap >= 2
    }
}
