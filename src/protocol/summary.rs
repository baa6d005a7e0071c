//! Per-source summary table of a decoded package

use std::fmt::Write;

use crate::types::{ContainerType, DataPackage, TaggedValue};

const UNEXPECTED: &str = " (Check...unexpected data type!)";

/// Render the layout of every record in a package.
///
/// Each source lists its metadata, data and array entries as
/// `path, container, container shape, type` rows.
pub fn render_package(package: &DataPackage) -> String {
    let mut out = String::new();
    for (key, record) in package {
        let _ = writeln!(out, "source: {key}");
        let _ = writeln!(out, "Total bytes received: {}\n", record.bytes_received());
        out.push_str("path, container, container shape, type\n");

        section(&mut out, "metadata");
        for (path, value) in record.metadata() {
            tagged_row(&mut out, path, value);
        }

        section(&mut out, "data");
        for (path, value) in record.fields() {
            tagged_row(&mut out, path, value);
        }

        section(&mut out, "array");
        for (path, view) in record.arrays() {
            let _ = writeln!(
                out,
                "{path}, {}, {}, {}",
                view.container_type(),
                shape_string(view.shape()),
                view.dtype()
            );
        }

        out.push('\n');
    }
    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{title}\n{}", "-".repeat(title.len()));
}

fn tagged_row(out: &mut String, path: &str, value: &TaggedValue) {
    let _ = write!(
        out,
        "{path}, {}, {}, {}",
        value.container_type(),
        shape_string(&value.shape()),
        value.dtype()
    );
    if value.container_type() == ContainerType::Map || value.value().is_ext() {
        out.push_str(UNEXPECTED);
    }
    out.push('\n');
}

fn shape_string(shape: &[usize]) -> String {
    if shape.is_empty() {
        return String::new();
    }
    let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
    format!("[{}]", dims.join(", "))
}
