use crate::context::ReconcileContext;
use crate::error::RemoteError;
use crate::flow::{Pattern, PatternValue};
use crate::remote::*;
use serde_json::json;

/// The remote attributes of a field holding that pattern. `None` when the pattern is
/// not supported: nothing is written for it.
pub fn pattern_attributes(pattern: &Pattern, field_choice: bool) -> Option<Attributes> {
    let value = match &pattern.value {
        PatternValue::Fixed(v) => json!({
            "valueType": "singleValue",
            "singleValue": v.as_str(),
        }),
        PatternValue::List(values) => json!({
            "valueType": "valueList",
            "valueList": values.iter().map(|v| v.as_str()).collect::<Vec<&str>>(),
        }),
        PatternValue::Counter(c) => json!({
            "valueType": if c.up { "increment" } else { "decrement" },
            "startValue": c.start.as_str(),
            "stepValue": c.step.as_str(),
            "countValue": c.count,
        }),
        PatternValue::Random(r) => json!({
            "valueType": "repeatableRandomRange",
            "minValue": r.min.as_str(),
            "maxValue": r.max.as_str(),
            "stepValue": r.step.as_str(),
            "seed": r.seed,
            "countValue": r.count,
        }),
        PatternValue::Unsupported(choice) => {
            log::warn!("Pattern choice {choice} is not supported, the field keeps its value");
            return None;
        }
    };
    let mut attributes = match value {
        serde_json::Value::Object(attributes) => attributes,
        _ => Attributes::new(),
    };
    attributes.insert("auto".to_string(), json!(false));
    attributes.insert("activeFieldChoice".to_string(), json!(field_choice));
    Some(attributes)
}

/// Write a pattern into the field `field_type_id` of a stack.
///
/// A field with an ingress result name is marked for tracking and its href is
/// registered under that name.
pub fn resolve(
    store: &mut impl RemoteStore,
    stack: &Href,
    field_type_id: &str,
    pattern: &Pattern,
    field_choice: bool,
    ctx: &mut ReconcileContext,
) -> Result<(), RemoteError> {
    let field = store
        .find(stack, Kind::Field, &[Filter::exact("fieldTypeId", field_type_id)])?
        .into_iter()
        .next()
        .ok_or_else(|| RemoteError::MissingField {
            stack: stack.clone(),
            field: field_type_id.to_string(),
        })?;
    let mut attributes = pattern_attributes(pattern, field_choice).unwrap_or_default();
    if let Some(name) = &pattern.ingress_result_name {
        attributes.insert("trackingEnabled".to_string(), json!(true));
        ctx.registry.insert(name, field.clone());
    }
    update_if_changed(store, &field, attributes)?;
    Ok(())
}
