use crate::extract::normalize::normalize_entity;
use crate::extract::routine::RoutineError;
use crate::model::{EntityBatch, ExtractedEntity};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

/// Checks a routine's declared return value and converts it into a batch
///
/// The value must be an object holding `entities_found` (a list of type-name
/// strings) and `payloads` (type name to list of entity objects; older
/// routines call it `files_created`). Violating
/// that outer shape rejects the whole result. Inside, a type mismatch voids
/// only the affected entity type, and nameless entities are dropped.
pub fn validate_routine_output(
    value: &Value,
    base: &Url,
    max_entities_per_type: usize,
) -> Result<EntityBatch, RoutineError> {
    let root = value
        .as_object()
        .ok_or_else(|| RoutineError::Schema("return value is not a mapping".into()))?;

    let found = root
        .get("entities_found")
        .and_then(Value::as_array)
        .ok_or_else(|| RoutineError::Schema("entities_found is missing or not a list".into()))?;

    let mut type_names = Vec::with_capacity(found.len());
    for entry in found {
        match entry.as_str() {
            Some(name) => type_names.push(name.trim().to_lowercase()),
            None => {
                return Err(RoutineError::Schema(
                    "entities_found must contain type names, not objects".into(),
                ))
            }
        }
    }

    let payloads = root
        .get("payloads")
        .or_else(|| root.get("files_created"))
        .and_then(Value::as_object)
        .ok_or_else(|| RoutineError::Schema("payloads is missing or not a mapping".into()))?;

    let mut batch = EntityBatch::new();
    for type_name in type_names {
        let Some(raw) = lookup_payload(payloads, &type_name) else {
            debug!(entity_type = %type_name, "Declared type has no payload");
            continue;
        };

        match convert_type(raw, base, max_entities_per_type) {
            Ok(entities) => batch.insert(&type_name, entities),
            Err(reason) => {
                warn!(entity_type = %type_name, %reason, "Voiding entity type");
            }
        }
    }

    Ok(batch)
}

fn lookup_payload<'a>(payloads: &'a Map<String, Value>, type_name: &str) -> Option<&'a Value> {
    payloads.get(type_name).or_else(|| {
        payloads
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(type_name))
            .map(|(_, v)| v)
    })
}

fn convert_type(raw: &Value, base: &Url, max: usize) -> Result<Vec<ExtractedEntity>, String> {
    let items = raw
        .as_array()
        .ok_or_else(|| "payload is not a list".to_string())?;

    let mut entities = Vec::new();
    for item in items {
        let object = item
            .as_object()
            .ok_or_else(|| "payload entry is not an object".to_string())?;

        let entity = entity_from_object(object)?;
        if let Some(entity) = normalize_entity(entity, base) {
            entities.push(entity);
        }
    }

    if entities.len() > max {
        warn!(kept = max, dropped = entities.len() - max, "Routine exceeded entity cap");
        entities.truncate(max);
    }

    Ok(entities)
}

/// Maps a JSON object onto an entity; unknown keys go to `extra`
fn entity_from_object(object: &Map<String, Value>) -> Result<ExtractedEntity, String> {
    let mut entity = ExtractedEntity::default();

    for (key, value) in object {
        let slot = match key.as_str() {
            "name" | "title" => Some(&mut entity.name),
            _ => None,
        };
        if let Some(slot) = slot {
            if let Some(text) = scalar_text(key, value)? {
                if slot.is_empty() {
                    *slot = text;
                }
            }
            continue;
        }

        let target = match key.as_str() {
            "price" => &mut entity.price,
            "url" | "product_url" | "href" => &mut entity.url,
            "image_url" | "image" => &mut entity.image_url,
            "identifier" | "product_id" | "item_number" | "id" => &mut entity.identifier,
            "description" => &mut entity.description,
            "brand" => &mut entity.brand,
            "availability" => &mut entity.availability,
            "category_type" => &mut entity.category_type,
            _ => {
                entity.extra.insert(key.clone(), value.clone());
                continue;
            }
        };

        if let Some(text) = scalar_text(key, value)? {
            if target.is_none() {
                *target = Some(text);
            }
        }
    }

    Ok(entity)
}

/// Known fields accept strings, numbers or null
fn scalar_text(key: &str, value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
            Err(format!("field '{}' has the wrong type", key))
        }
    }
}
