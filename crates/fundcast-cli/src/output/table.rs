use serde_json::Value;
use tabled::{builder::Builder, Table};

/// Render the output envelope as tables: scalar summary first, percentile
/// blocks and array sections after, then warnings and methodology.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result(result);
                print_envelope_trailer(map);
            } else {
                print_flat_object(value);
            }
        }
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

fn print_result(result: &Value) {
    let Value::Object(map) = result else {
        print_flat_object(result);
        return;
    };

    // Scalar summary.
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if !val.is_object() && !val.is_array() {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
    }
    println!("{}", Table::from(builder));

    // Percentile blocks share a shape; render them side by side.
    let percentile_rows = ["p25", "p50", "p75", "p90", "median", "mean", "std_dev"];
    let blocks: Vec<(&str, &Value)> = ["moic", "tvpi"]
        .iter()
        .filter_map(|name| map.get(*name).map(|v| (*name, v)))
        .collect();
    if !blocks.is_empty() {
        let mut builder = Builder::default();
        let mut header = vec!["Statistic".to_string()];
        header.extend(blocks.iter().map(|(name, _)| name.to_uppercase()));
        builder.push_record(header);
        for row in percentile_rows {
            let mut record = vec![row.to_string()];
            for (_, block) in &blocks {
                record.push(format_value(block.get(row).unwrap_or(&Value::Null)));
            }
            builder.push_record(record);
        }
        println!("\n{}", Table::from(builder));
    }

    // Array sections with object rows (e.g. validation check summaries).
    for (key, val) in map {
        if let Value::Array(arr) = val {
            if arr.first().is_some_and(Value::is_object) {
                println!("\n{}:", key);
                print_array_table(arr);
            }
        }
    }
}

fn print_envelope_trailer(envelope: &serde_json::Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }
    if let Some(Value::String(methodology)) = envelope.get("methodology") {
        println!("\nMethodology: {}", methodology);
    }
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        println!("{}", Table::from(builder));
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);
        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
