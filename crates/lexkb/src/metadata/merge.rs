//! Metadata merge engine.
//!
//! Decides which freshly extracted fields may be written over what the entry
//! already holds. Pure: no I/O, and the same `(extracted, existing)` pair
//! always yields the same updates.

use super::{is_meaningful, MetadataField, MetadataMap};

/// Computes the metadata updates for an entry.
///
/// - A field already meaningful in `existing` is kept, whatever extraction says.
/// - Always-refreshed fields take the extracted value whenever there is one.
/// - A field without a meaningful extracted value is left untouched.
pub fn merge(extracted: &MetadataMap, existing: &MetadataMap) -> MetadataMap {
    let mut updates = MetadataMap::new();

    for field in MetadataField::ALL {
        let Some(candidate) = extracted.get(&field).filter(|v| is_meaningful(v)) else {
            continue;
        };

        let existing_wins =
            !field.is_always_refreshed() && existing.get(&field).is_some_and(is_meaningful);
        if existing_wins {
            continue;
        }

        updates.insert(field, candidate.clone());
    }

    updates
}

/// Fields still worth asking the extractor for, given what the entry holds.
pub fn fields_to_extract(existing: &MetadataMap) -> Vec<MetadataField> {
    MetadataField::ALL
        .iter()
        .copied()
        .filter(|field| {
            field.is_always_refreshed() || !existing.get(field).is_some_and(is_meaningful)
        })
        .collect()
}
