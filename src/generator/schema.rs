// src/generator/schema.rs — Target schemas for structured model output
//
// Each schema gets three hooks around serde: `normalize` patches the raw
// document (shape coercions, defaults), serde does the structural check,
// and `validate` enforces ranges serde can't express.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::core::types::{LayoutPlan, ReviewResult};

const DEFAULT_LENGTH_M: f64 = 20.0;
const DEFAULT_WIDTH_M: f64 = 12.0;

/// Request-side facts used to fill gaps in model output.
#[derive(Debug, Clone)]
pub struct SchemaContext {
    pub store_name: String,
    pub city: String,
}

impl SchemaContext {
    pub fn new(store_name: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            city: city.into(),
        }
    }
}

pub trait OutputSchema: DeserializeOwned + Sized {
    /// Human-readable name for logs and audit entries.
    const NAME: &'static str;

    /// Wrapper key some models nest the payload under.
    const ENVELOPE: Option<&'static str> = None;

    fn normalize(doc: &mut Map<String, Value>, ctx: &SchemaContext);

    fn validate(&self) -> Result<(), String>;

    /// Text embedded in the prompt describing the expected JSON.
    fn format_instructions() -> String;
}

fn set_default(doc: &mut Map<String, Value>, key: &str, value: Value) {
    if matches!(doc.get(key), None | Some(Value::Null)) {
        doc.insert(key.to_string(), value);
    }
}

fn check_score(score: f64) -> Result<(), String> {
    if !score.is_finite() || !(0.0..=10.0).contains(&score) {
        return Err(format!("best_practice_score {score} outside [0, 10]"));
    }
    Ok(())
}

// ─── LayoutPlan ─────────────────────────────────────────────────

/// Coerce `{length, width}` or `[l, w, ...]` into a two-element array.
fn normalize_dimensions(doc: &mut Map<String, Value>) {
    let Some(dims) = doc.get("dimensions_m") else {
        return;
    };
    let coerced = match dims {
        Value::Object(m) => {
            let length = m.get("length").and_then(Value::as_f64).unwrap_or(DEFAULT_LENGTH_M);
            let width = m.get("width").and_then(Value::as_f64).unwrap_or(DEFAULT_WIDTH_M);
            json!([length, width])
        }
        Value::Array(items) if items.len() > 2 => Value::Array(items[..2].to_vec()),
        _ => return,
    };
    doc.insert("dimensions_m".into(), coerced);
}

impl OutputSchema for LayoutPlan {
    const NAME: &'static str = "layout plan";
    const ENVELOPE: Option<&'static str> = Some("store_layout");

    fn normalize(doc: &mut Map<String, Value>, ctx: &SchemaContext) {
        normalize_dimensions(doc);

        if let Some(Value::String(side)) = doc.get_mut("entrance_side") {
            *side = side.trim().to_lowercase();
        }

        set_default(
            doc,
            "store_name",
            json!(format!("{} - {}", ctx.store_name, ctx.city)),
        );
        set_default(doc, "city", json!(ctx.city));
        set_default(doc, "zones", json!([]));
        set_default(doc, "compliance_notes", json!([]));
        set_default(doc, "best_practice_score", json!(0.0));
    }

    fn validate(&self) -> Result<(), String> {
        check_score(self.best_practice_score)?;

        let (length, width) = self.dimensions_m;
        if !(length.is_finite() && width.is_finite() && length > 0.0 && width > 0.0) {
            return Err(format!(
                "dimensions_m must be two positive numbers (got {length} x {width})"
            ));
        }

        let outside = self.zones_out_of_bounds();
        if !outside.is_empty() {
            return Err(format!(
                "zones outside the {length} x {width} m floor: {}",
                outside.join(", ")
            ));
        }
        Ok(())
    }

    fn format_instructions() -> String {
        r#"Return ONLY a JSON object (no prose) with exactly these fields:
{
  "store_name": string,
  "city": string,
  "dimensions_m": [length, width],          // metres, both > 0
  "entrance_side": "north" | "south" | "east" | "west",
  "zones": [
    {
      "name": string,
      "x": number, "y": number,             // bottom-left corner, metres
      "width": number, "height": number,    // > 0; zone must fit inside the floor
      "fixtures": [string],
      "products": [string]
    }
  ],
  "compliance_notes": [string],
  "best_practice_score": number             // 0 to 10
}"#
        .to_string()
    }
}

// ─── ReviewResult ───────────────────────────────────────────────

impl OutputSchema for ReviewResult {
    const NAME: &'static str = "review";

    fn normalize(doc: &mut Map<String, Value>, _ctx: &SchemaContext) {
        // absent verdict never counts as compliant
        set_default(doc, "is_compliant", json!(false));
        set_default(doc, "best_practice_score", json!(0.0));
        set_default(doc, "issues", json!([]));
        set_default(doc, "suggestions", json!([]));
    }

    fn validate(&self) -> Result<(), String> {
        check_score(self.best_practice_score)
    }

    fn format_instructions() -> String {
        r#"Return ONLY a JSON object (no prose):
{
  "is_compliant": boolean,
  "best_practice_score": number,   // 0 to 10
  "issues": [string],
  "suggestions": [string]
}"#
        .to_string()
    }
}

/// Run normalize → deserialize → validate on an already-parsed document.
pub fn decode_document<T: OutputSchema>(doc: Value, ctx: &SchemaContext) -> Result<T, String> {
    let doc = match T::ENVELOPE {
        Some(key) => super::extract::unwrap_envelope(doc, key),
        None => doc,
    };
    let Value::Object(mut map) = doc else {
        return Err(format!("{} must be a JSON object", T::NAME));
    };

    T::normalize(&mut map, ctx);
    let value: T = serde_json::from_value(Value::Object(map))
        .map_err(|e| format!("{} does not match schema: {e}", T::NAME))?;
    value.validate()?;
    Ok(value)
}
