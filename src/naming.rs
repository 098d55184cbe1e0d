// so regular expressions don't have to be recompiled
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WORD_BOUNDARY: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
    static ref SEGMENT_SEPARATOR: Regex = Regex::new(r"::|\\").unwrap();
}

pub const ENTITIES_SEGMENT: &str = "Entities";
pub const MODELS_SEGMENT: &str = "Models";
pub const MODEL_SUFFIX: &str = "Model";

/// `parent_category` -> `parentCategory`
pub fn camel_case(snake: &str) -> String {
    let mut camel = String::with_capacity(snake.len());
    let mut upper_next = false;
    for c in snake.chars() {
        if c == '_' {
            upper_next = !camel.is_empty();
        } else if upper_next {
            camel.extend(c.to_uppercase());
            upper_next = false;
        } else {
            camel.push(c);
        }
    }
    camel
}

/// `parentCategory` -> `parent_category`
pub fn snake_case(camel: &str) -> String {
    WORD_BOUNDARY.replace_all(camel, "${1}_${2}").to_lowercase()
}

pub fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn lcfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Last segment of a qualified type name, `blog::Entities::Post` -> `Post`.
pub fn short_name(type_name: &str) -> &str {
    SEGMENT_SEPARATOR
        .split(type_name)
        .last()
        .unwrap_or(type_name)
}

/// Model type name for an entity type name: the `Entities` segment becomes
/// `Models` and `Model` is appended, keeping whichever separator the name uses.
///
/// `Blog\Entities\Post` -> `Blog\Models\PostModel`
pub fn model_name(entity_type: &str) -> String {
    let separator = SEGMENT_SEPARATOR
        .find(entity_type)
        .map(|m| m.as_str())
        .unwrap_or("::");
    let segments: Vec<&str> = SEGMENT_SEPARATOR
        .split(entity_type)
        .map(|segment| {
            if segment == ENTITIES_SEGMENT {
                MODELS_SEGMENT
            } else {
                segment
            }
        })
        .collect();
    segments.join(separator) + MODEL_SUFFIX
}

/// Default table name of an entity type: the snake cased short name.
pub fn table_name(entity_type: &str) -> String {
    snake_case(short_name(entity_type))
}
