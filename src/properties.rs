//! `Properties` (spec §6): the serialization boundary `GraphDescription`
//! uses for node config, edge lists, and linearization order, plus the
//! diagnostic write channel (spec §11 supplemental, spec §7 "Nodes may
//! report diagnostic messages through the `Properties` interface without
//! affecting execution").

/// Opaque color value; kept as a plain RGBA f32 tuple rather than pulling
/// in a color-management crate the teacher doesn't otherwise depend on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// Read/write access to one level of a hierarchical key/value document
/// (spec §6). A single implementor, [`JsonProperties`], backs both
/// directions; `GraphDescription::to_properties`/`from_properties` only
/// ever see this trait.
pub trait Properties {
    fn begin_child(&mut self, name: &str);
    fn end_child(&mut self);

    fn bool(&mut self, name: &str, value: &mut bool);
    fn i32(&mut self, name: &str, value: &mut i32);
    fn i64(&mut self, name: &str, value: &mut i64);
    fn u32(&mut self, name: &str, value: &mut u32);
    fn u64(&mut self, name: &str, value: &mut u64);
    fn f32(&mut self, name: &str, value: &mut f32);
    fn text(&mut self, name: &str, value: &mut String);
    fn color(&mut self, name: &str, value: &mut Color);

    /// `options` is the closed set of valid strings; `value` is read/written
    /// by index into it.
    fn enum_option(&mut self, name: &str, options: &[&str], value: &mut usize);

    /// Opaque blob pass-through for node-specific config shapes the graph
    /// crate itself doesn't know (spec §6 "JSON pass-through for opaque
    /// blobs").
    fn json(&mut self, name: &str, value: &mut serde_json::Value);

    /// Write-only diagnostic message, surfaced without affecting execution
    /// (spec §7, §11 supplemental).
    fn diagnostic(&mut self, text: &str);
}

/// Whether a [`JsonProperties`] instance is reading from or writing into
/// its backing `serde_json::Value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

/// Concrete `Properties` backed by a `serde_json::Value` tree, mirroring
/// the "hierarchical key/value document (JSON is acceptable)" format spec
/// §6 names for the graph description file. One instance walks either a
/// document being deserialized into live state (`Mode::Read`) or live
/// state being serialized out (`Mode::Write`).
pub struct JsonProperties {
    mode: Mode,
    stack: Vec<serde_json::Value>,
    names: Vec<String>,
    pub diagnostics: Vec<String>,
}

impl JsonProperties {
    pub fn reader(document: serde_json::Value) -> Self {
        JsonProperties {
            mode: Mode::Read,
            stack: vec![document],
            names: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn writer() -> Self {
        JsonProperties {
            mode: Mode::Write,
            stack: vec![serde_json::Value::Object(Default::default())],
            names: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Consumes the writer, returning the document built up so far. Panics
    /// if called on a reader or with unbalanced `begin_child`/`end_child`
    /// calls, both of which indicate a caller bug, not a data error.
    pub fn into_document(mut self) -> serde_json::Value {
        assert_eq!(self.mode, Mode::Write, "into_document called on a reader");
        assert_eq!(self.stack.len(), 1, "unbalanced begin_child/end_child");
        self.stack.pop().unwrap()
    }

    fn top_object(&mut self) -> &mut serde_json::Map<String, serde_json::Value> {
        self.stack
            .last_mut()
            .expect("Properties stack underflow")
            .as_object_mut()
            .expect("Properties node is not an object")
    }
}

macro_rules! scalar_accessor {
    ($method:ident, $ty:ty, $as_fn:ident, $from:expr) => {
        fn $method(&mut self, name: &str, value: &mut $ty) {
            match self.mode {
                Mode::Read => {
                    if let Some(found) = self.top_object().get(name).and_then(|v| v.$as_fn()) {
                        *value = found as $ty;
                    }
                }
                Mode::Write => {
                    let v = $from(*value);
                    self.top_object().insert(name.to_string(), v);
                }
            }
        }
    };
}

impl Properties for JsonProperties {
    fn begin_child(&mut self, name: &str) {
        match self.mode {
            Mode::Read => {
                let child = self
                    .top_object()
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
                self.stack.push(child);
            }
            Mode::Write => {
                self.stack.push(serde_json::Value::Object(Default::default()));
            }
        }
        self.names.push(name.to_string());
    }

    fn end_child(&mut self) {
        let child = self.stack.pop().expect("end_child without matching begin_child");
        let name = self.names.pop().expect("end_child without matching begin_child");
        if self.mode == Mode::Write {
            self.top_object().insert(name, child);
        }
    }

    scalar_accessor!(bool, bool, as_bool, serde_json::Value::from);
    scalar_accessor!(i32, i32, as_i64, serde_json::Value::from);
    scalar_accessor!(i64, i64, as_i64, serde_json::Value::from);
    scalar_accessor!(u32, u32, as_u64, serde_json::Value::from);
    scalar_accessor!(u64, u64, as_u64, serde_json::Value::from);

    fn f32(&mut self, name: &str, value: &mut f32) {
        match self.mode {
            Mode::Read => {
                if let Some(found) = self.top_object().get(name).and_then(|v| v.as_f64()) {
                    *value = found as f32;
                }
            }
            Mode::Write => {
                self.top_object()
                    .insert(name.to_string(), serde_json::Value::from(*value as f64));
            }
        }
    }

    fn text(&mut self, name: &str, value: &mut String) {
        match self.mode {
            Mode::Read => {
                if let Some(found) = self.top_object().get(name).and_then(|v| v.as_str()) {
                    *value = found.to_string();
                }
            }
            Mode::Write => {
                self.top_object()
                    .insert(name.to_string(), serde_json::Value::from(value.clone()));
            }
        }
    }

    fn color(&mut self, name: &str, value: &mut Color) {
        match self.mode {
            Mode::Read => {
                if let Some(arr) = self.top_object().get(name).and_then(|v| v.as_array()) {
                    if let [r, g, b, a] = arr.as_slice() {
                        value.r = r.as_f64().unwrap_or(value.r as f64) as f32;
                        value.g = g.as_f64().unwrap_or(value.g as f64) as f32;
                        value.b = b.as_f64().unwrap_or(value.b as f64) as f32;
                        value.a = a.as_f64().unwrap_or(value.a as f64) as f32;
                    }
                }
            }
            Mode::Write => {
                let arr = serde_json::json!([value.r, value.g, value.b, value.a]);
                self.top_object().insert(name.to_string(), arr);
            }
        }
    }

    fn enum_option(&mut self, name: &str, options: &[&str], value: &mut usize) {
        match self.mode {
            Mode::Read => {
                if let Some(found) = self.top_object().get(name).and_then(|v| v.as_str()) {
                    if let Some(index) = options.iter().position(|o| *o == found) {
                        *value = index;
                    }
                }
            }
            Mode::Write => {
                let chosen = options.get(*value).copied().unwrap_or("");
                self.top_object()
                    .insert(name.to_string(), serde_json::Value::from(chosen));
            }
        }
    }

    fn json(&mut self, name: &str, value: &mut serde_json::Value) {
        match self.mode {
            Mode::Read => {
                if let Some(found) = self.top_object().get(name) {
                    *value = found.clone();
                }
            }
            Mode::Write => {
                self.top_object().insert(name.to_string(), value.clone());
            }
        }
    }

    fn diagnostic(&mut self, text: &str) {
        log::warn!("diagnostic: {}", text);
        self.diagnostics.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        let mut writer = JsonProperties::writer();
        let mut extent = 1920u32;
        writer.u32("width", &mut extent);
        let doc = writer.into_document();

        let mut reader = JsonProperties::reader(doc);
        let mut read_back = 0u32;
        reader.u32("width", &mut read_back);
        assert_eq!(read_back, 1920);
    }

    #[test]
    fn missing_key_leaves_value_untouched() {
        let mut reader = JsonProperties::reader(serde_json::json!({}));
        let mut value = 42i32;
        reader.i32("missing", &mut value);
        assert_eq!(value, 42);
    }

    #[test]
    fn diagnostic_does_not_affect_stored_document() {
        let mut writer = JsonProperties::writer();
        writer.diagnostic("node stalled waiting on upload");
        assert_eq!(writer.diagnostics.len(), 1);
        let doc = writer.into_document();
        assert_eq!(doc, serde_json::json!({}));
    }
}
