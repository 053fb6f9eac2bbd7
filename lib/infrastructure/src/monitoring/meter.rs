use cached::proc_macro::cached;
use opentelemetry::KeyValue;

/// Adds one to the named counter. Instruments are created once per name.
pub fn increment(name: &'static str, labels: &[(&str, &str)]) {
    let labels: Vec<KeyValue> = labels
        .iter()
        .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string()))
        .collect();

    counter(name).add(1, &labels)
}

#[cached]
fn counter(name: &'static str) -> opentelemetry::metrics::Counter<u64> {
    opentelemetry::global::meter("pvdimmer").u64_counter(name).build()
}
