//! Image reference discovery and in-place rewriting for search responses.
//!
//! References live at `<items_field>[*].<image_field>`. Anything that is not
//! a non-empty string, or is already a `data:` URI, is left alone.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::fetch::image::is_data_uri;

fn references<'a>(response: &'a Value, items_field: &str, image_field: &'a str) -> impl Iterator<Item = &'a str> {
    response
        .get(items_field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(move |item| item.get(image_field).and_then(Value::as_str))
        .filter(|url| !url.trim().is_empty() && !is_data_uri(url))
}

/// Unique image URLs in first-seen order.
pub fn image_urls(response: &Value, items_field: &str, image_field: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    references(response, items_field, image_field)
        .filter(|url| seen.insert(*url))
        .map(str::to_string)
        .collect()
}

/// Replace every reference found in `replacements`. Returns how many fields
/// changed.
pub fn apply(response: &mut Value, items_field: &str, image_field: &str, replacements: &HashMap<String, String>) -> usize {
    let Some(items) = response.get_mut(items_field).and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut changed = 0;
    for item in items {
        let Some(field) = item.get_mut(image_field) else {
            continue;
        };
        if let Some(url) = field.as_str()
            && let Some(replacement) = replacements.get(url)
            && replacement != url
        {
            *field = Value::String(replacement.clone());
            changed += 1;
        }
    }
    changed
}
