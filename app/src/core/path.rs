use serde_json::Value;

/// Resolves a dotted key chain like `config.dimmername` inside nested JSON objects.
///
/// Missing keys, `null` values and paths that run through a non-object all resolve to `None`.
pub fn lookup<'a>(data: &'a Value, key_chain: &str) -> Option<&'a Value> {
    if key_chain.is_empty() {
        return None;
    }

    let value = key_chain
        .split('.')
        .try_fold(data, |current, key| current.as_object()?.get(key))?;

    if value.is_null() { None } else { Some(value) }
}

pub fn lookup_or<'a>(data: &'a Value, key_chain: &str, default: &'a Value) -> &'a Value {
    lookup(data, key_chain).unwrap_or(default)
}
