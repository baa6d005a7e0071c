//! Structural trace of an undissected multipart reply

use bytes::Bytes;
use rmpv::Value;

/// Line printed before every frame of a trace.
pub const SEPARATOR: &str = "\n----------new message----------\n";

/// Render every frame of a reply, each preceded by [`SEPARATOR`].
pub fn render_reply(frames: &[Bytes]) -> String {
    let mut out = String::new();
    for frame in frames {
        out.push_str(SEPARATOR);
        out.push_str(&render_frame(frame));
    }
    out
}

/// Render one frame.
///
/// Frames holding exactly one msgpack value are unfolded; anything else
/// (raw array payloads) is summarized by its length.
pub fn render_frame(frame: &[u8]) -> String {
    let mut out = String::new();
    let mut cursor = frame;
    match rmpv::decode::read_value(&mut cursor) {
        Ok(value) if cursor.is_empty() => render_value(&value, 0, false, &mut out),
        _ => out.push_str(&format!("(raw {} bytes)", frame.len())),
    }
    out.push('\n');
    out
}

fn render_value(value: &Value, depth: usize, is_key: bool, out: &mut String) {
    match value {
        Value::Nil => out.push_str("null"),
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::F32(f) => out.push_str(&f.to_string()),
        Value::F64(f) => out.push_str(&f.to_string()),
        Value::String(s) => {
            out.push('"');
            out.push_str(&String::from_utf8_lossy(s.as_bytes()));
            out.push('"');
        }
        Value::Binary(b) if is_key => out.push_str(&String::from_utf8_lossy(b)),
        Value::Binary(_) => out.push_str("(bin)"),
        Value::Ext(..) => {}
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render_value(item, depth, false, out);
            }
            out.push(']');
        }
        Value::Map(entries) => {
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('\n');
                out.push_str(&"    ".repeat(depth));
                render_value(key, depth, true, out);
                out.push_str(": ");
                render_value(value, depth + 1, false, out);
            }
        }
    }
}
