use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Field-level validation failures, reported together.
#[derive(Debug, Default)]
pub struct FieldErrors {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| json!(message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        let names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        let message = format!("invalid or missing fields: {}", names.join(", "));
        err(
            id,
            "validation_failed",
            message,
            Some(json!({ "fields": self.fields })),
        )
    }
}
