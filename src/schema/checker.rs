use serde_json::{Map, Value};

use super::Violation;

/// Walks a JSON value and collects every contract violation it finds.
#[derive(Debug, Default)]
pub struct Checker {
    violations: Vec<Violation>,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn child(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, path: &str, message: impl Into<String>) {
        self.violations.push(Violation {
            path: if path.is_empty() { "$".to_string() } else { path.to_string() },
            message: message.into(),
        });
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    pub fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value.as_object() {
            Some(obj) => Some(obj),
            None => {
                self.fail(path, format!("expected object, found {}", type_name(value)));
                None
            }
        }
    }

    fn field<'a>(&mut self, obj: &'a Map<String, Value>, key: &str, path: &str) -> Option<&'a Value> {
        match obj.get(key) {
            Some(value) => Some(value),
            None => {
                self.fail(&child(path, key), "missing required field");
                None
            }
        }
    }

    pub fn string(&mut self, obj: &Map<String, Value>, key: &str, path: &str) {
        if let Some(value) = self.field(obj, key, path) {
            if !value.is_string() {
                self.fail(&child(path, key), format!("expected string, found {}", type_name(value)));
            }
        }
    }

    /// A string that must also be non-blank.
    pub fn non_empty_string(&mut self, obj: &Map<String, Value>, key: &str, path: &str) {
        if let Some(value) = self.field(obj, key, path) {
            match value.as_str() {
                Some(s) if !s.trim().is_empty() => {}
                Some(_) => self.fail(&child(path, key), "must not be empty"),
                None => self.fail(&child(path, key), format!("expected string, found {}", type_name(value))),
            }
        }
    }

    /// Present and either `null` or a string.
    pub fn nullable_string(&mut self, obj: &Map<String, Value>, key: &str, path: &str) {
        if let Some(value) = self.field(obj, key, path) {
            if !(value.is_null() || value.is_string()) {
                self.fail(
                    &child(path, key),
                    format!("expected string or null, found {}", type_name(value)),
                );
            }
        }
    }

    pub fn boolean(&mut self, obj: &Map<String, Value>, key: &str, path: &str) {
        if let Some(value) = self.field(obj, key, path) {
            if !value.is_boolean() {
                self.fail(&child(path, key), format!("expected boolean, found {}", type_name(value)));
            }
        }
    }

    pub fn one_of(&mut self, obj: &Map<String, Value>, key: &str, path: &str, allowed: &[&str]) {
        if let Some(value) = self.field(obj, key, path) {
            match value.as_str() {
                Some(s) if allowed.contains(&s) => {}
                Some(s) => self.fail(
                    &child(path, key),
                    format!("unknown value {:?}, expected one of {}", s, allowed.join(", ")),
                ),
                None => self.fail(&child(path, key), format!("expected string, found {}", type_name(value))),
            }
        }
    }

    /// Integer within `min..=max`. Out-of-range values are rejected, not clamped.
    pub fn integer_in_range(&mut self, obj: &Map<String, Value>, key: &str, path: &str, min: i64, max: i64) {
        if let Some(value) = self.field(obj, key, path) {
            match value.as_i64() {
                Some(n) if (min..=max).contains(&n) => {}
                Some(n) => self.fail(&child(path, key), format!("{} is outside {}..={}", n, min, max)),
                None => self.fail(&child(path, key), format!("expected integer, found {}", value)),
            }
        }
    }

    pub fn string_array(&mut self, obj: &Map<String, Value>, key: &str, path: &str) {
        if let Some(items) = self.array(obj, key, path) {
            for (i, item) in items.iter().enumerate() {
                if !item.is_string() {
                    self.fail(
                        &format!("{}[{}]", child(path, key), i),
                        format!("expected string, found {}", type_name(item)),
                    );
                }
            }
        }
    }

    pub fn array<'a>(&mut self, obj: &'a Map<String, Value>, key: &str, path: &str) -> Option<&'a Vec<Value>> {
        let value = self.field(obj, key, path)?;
        match value.as_array() {
            Some(items) => Some(items),
            None => {
                self.fail(&child(path, key), format!("expected array, found {}", type_name(value)));
                None
            }
        }
    }

    /// Applies `check` to every object element of `obj[key]`.
    pub fn each_object<F>(&mut self, obj: &Map<String, Value>, key: &str, path: &str, mut check: F)
    where
        F: FnMut(&mut Self, &Map<String, Value>, &str),
    {
        let Some(items) = self.array(obj, key, path) else {
            return;
        };
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{}[{}]", child(path, key), i);
            if let Some(item_obj) = self.object(item, &item_path) {
                check(self, item_obj, &item_path);
            }
        }
    }
}
