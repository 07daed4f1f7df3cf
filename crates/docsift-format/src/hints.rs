//! Hint generation: cheap deterministic candidates for each requested
//! field, derived from pattern matching and entity recognition.
//!
//! Categories are a registry keyed by field-name substrings; adding a
//! category means adding a table entry, not another branch in the
//! orchestration logic.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use docsift_core::ner::{Entity, EntityType};
use docsift_core::{Block, ExtractionRequest, Hint, HintLayer};

use crate::LayoutText;

/// Heuristic category inferred from a field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    Email,
    Phone,
    Date,
    Amount,
    Identifier,
    Organization,
    Person,
    Location,
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+?\d{1,3}[\s-]?)?\b\d{10}\b").unwrap());

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}[/\-.]\d{1,2}[/\-.]\d{2,4}\b").unwrap());

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:₹|\$|€|£|INR|USD|EUR|GBP)\s?\d{1,3}(?:,\d{3})*(?:\.\d{2})?|\b\d{1,3}(?:,\d{3})*\.\d{2}\b")
        .unwrap()
});

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z]{1,5}[-/]?\d{3,}(?:[-/]\d+)*\b|\b\d{5,}\b").unwrap()
});

struct CategoryDef {
    category: FieldCategory,
    /// Field-name substrings that select this category. First match
    /// in table order wins, so the more specific entries come first.
    name_keys: &'static [&'static str],
    pattern: Option<&'static Lazy<Regex>>,
    entity_types: &'static [EntityType],
}

static REGISTRY: &[CategoryDef] = &[
    CategoryDef {
        category: FieldCategory::Email,
        name_keys: &["email", "e-mail", "mail"],
        pattern: Some(&EMAIL_RE),
        entity_types: &[],
    },
    CategoryDef {
        category: FieldCategory::Phone,
        name_keys: &["phone", "mobile", "tel", "fax"],
        pattern: Some(&PHONE_RE),
        entity_types: &[],
    },
    CategoryDef {
        category: FieldCategory::Date,
        name_keys: &["date", "due", "issued"],
        pattern: Some(&DATE_RE),
        entity_types: &[EntityType::Date],
    },
    CategoryDef {
        category: FieldCategory::Amount,
        name_keys: &["amount", "total", "price", "cost", "subtotal", "tax", "balance"],
        pattern: Some(&AMOUNT_RE),
        entity_types: &[EntityType::Money],
    },
    CategoryDef {
        category: FieldCategory::Organization,
        name_keys: &["vendor", "supplier", "company", "organization", "customer", "client"],
        pattern: None,
        entity_types: &[EntityType::Organization],
    },
    CategoryDef {
        category: FieldCategory::Person,
        name_keys: &["person", "contact", "attention", "signatory"],
        pattern: None,
        entity_types: &[EntityType::Person],
    },
    CategoryDef {
        category: FieldCategory::Location,
        name_keys: &["address", "city", "country", "location"],
        pattern: None,
        entity_types: &[EntityType::Location],
    },
    // Identifier last: "number" would otherwise shadow phone_number.
    CategoryDef {
        category: FieldCategory::Identifier,
        name_keys: &["number", "id", "code", "reference", "no"],
        pattern: Some(&IDENTIFIER_RE),
        entity_types: &[],
    },
];

/// Infer the hint category for a field name, if any. A field matching
/// no category still participates downstream with an empty hint list.
pub fn infer_category(field_name: &str) -> Option<FieldCategory> {
    let lowered = field_name.to_lowercase();
    REGISTRY
        .iter()
        .find(|def| def.name_keys.iter().any(|key| lowered.contains(key)))
        .map(|def| def.category)
}

fn registry_entry(category: FieldCategory) -> &'static CategoryDef {
    REGISTRY
        .iter()
        .find(|def| def.category == category)
        .expect("every category has a registry entry")
}

/// Dedup key: NFKC-normalized, lowercased, whitespace-collapsed.
fn normalize_value(value: &str) -> String {
    let normalized: String = value.nfkc().collect();
    normalized
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build per-field hints from two independent layers: pattern matches
/// run per block (so each hint carries its source block), and entities
/// over the concatenated text, filtered to the category's types.
/// Hints are deduplicated by normalized value and capped at
/// `max_per_field`. Output order is deterministic: request order for
/// fields, document order within a field, pattern layer first.
pub fn build_hints(
    layout: &LayoutText,
    blocks: &[Block],
    entities: &[Entity],
    request: &ExtractionRequest,
    max_per_field: usize,
) -> Vec<(String, Vec<Hint>)> {
    let order = crate::reading_order(blocks);

    request
        .requested_fields
        .iter()
        .map(|field| {
            let mut field_hints: Vec<Hint> = Vec::new();
            let mut seen: Vec<String> = Vec::new();

            if let Some(category) = infer_category(field) {
                let def = registry_entry(category);

                if let Some(pattern) = def.pattern {
                    for &block_index in &order {
                        if field_hints.len() >= max_per_field {
                            break;
                        }
                        for m in pattern.find_iter(&blocks[block_index].text) {
                            let value = m.as_str().trim();
                            if value.is_empty() {
                                continue;
                            }
                            push_hint(
                                &mut field_hints,
                                &mut seen,
                                Hint {
                                    value: value.to_string(),
                                    block_index: Some(block_index),
                                    layer: HintLayer::Pattern,
                                },
                                max_per_field,
                            );
                        }
                    }
                }

                for entity in entities {
                    if field_hints.len() >= max_per_field {
                        break;
                    }
                    if !def.entity_types.contains(&entity.entity_type) {
                        continue;
                    }
                    let value = entity.text.trim();
                    if value.is_empty() {
                        continue;
                    }
                    push_hint(
                        &mut field_hints,
                        &mut seen,
                        Hint {
                            value: value.to_string(),
                            block_index: entity.start.and_then(|o| layout.block_at(o)),
                            layer: HintLayer::Entity,
                        },
                        max_per_field,
                    );
                }
            }

            (field.clone(), field_hints)
        })
        .collect()
}

fn push_hint(hints: &mut Vec<Hint>, seen: &mut Vec<String>, hint: Hint, max: usize) {
    if hints.len() >= max {
        return;
    }
    let key = normalize_value(&hint.value);
    if seen.contains(&key) {
        return;
    }
    seen.push(key);
    hints.push(hint);
}
