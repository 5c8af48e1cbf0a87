use crate::html::absolutize;
use crate::model::ExtractedEntity;
use url::Url;

/// Cleans an entity before it leaves a strategy
///
/// Collapses whitespace in text fields, absolutizes links against the site
/// origin and drops the entity when its name is empty.
pub fn normalize_entity(mut entity: ExtractedEntity, base: &Url) -> Option<ExtractedEntity> {
    entity.name = collapse_whitespace(&entity.name);
    if entity.name.is_empty() {
        return None;
    }

    entity.price = clean_text(entity.price);
    entity.identifier = clean_text(entity.identifier);
    entity.description = clean_text(entity.description);
    entity.brand = clean_text(entity.brand);
    entity.availability = clean_text(entity.availability);
    entity.category_type = clean_text(entity.category_type);
    entity.url = entity.url.and_then(|u| absolutize(&u, base));
    entity.image_url = entity.image_url.and_then(|u| absolutize(&u, base));

    Some(entity)
}

/// Trims and collapses runs of whitespace into single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| collapse_whitespace(&v))
        .filter(|v| !v.is_empty())
}
