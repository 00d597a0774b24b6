use crate::graph::AttributeDecl;
use modelsync_api::PropertyValue;

/// Canonical form of an attribute value, so two values compare equal exactly
/// when the declared collection semantics say they are the same.
///
/// Ordered collections keep their order; unordered ones are sorted. Unique
/// collections drop repeated values, keeping the first occurrence.
pub fn normalize(decl: &AttributeDecl, value: PropertyValue) -> PropertyValue {
    let PropertyValue::List(mut items) = value else {
        return value;
    };
    if !decl.many {
        return PropertyValue::List(items);
    }
    match (decl.ordered, decl.unique) {
        (true, true) => {
            let mut kept: Vec<PropertyValue> = Vec::with_capacity(items.len());
            for item in items {
                if !kept.contains(&item) {
                    kept.push(item);
                }
            }
            PropertyValue::List(kept)
        }
        (true, false) => PropertyValue::List(items),
        (false, unique) => {
            items.sort_by(|a, b| a.canonical_cmp(b));
            if unique {
                items.dedup();
            }
            PropertyValue::List(items)
        }
    }
}
