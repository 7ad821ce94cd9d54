//! Document tree exchanged with the host.
//!
//! Only chapters are typed, and only in the parts the walker needs: `name`,
//! `content` and `sub_items`. A chapter keeps every field it was received
//! with, in input order, and is written back from that map with the current
//! `content` and `sub_items` substituted in place. Other section kinds are
//! kept as raw JSON, so a round trip reproduces everything the preprocessor
//! does not touch.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Externally tagged name of the chapter section kind.
const CHAPTER_TAG: &str = "Chapter";

const NAME: &str = "name";
const CONTENT: &str = "content";
const SUB_ITEMS: &str = "sub_items";

/// The book: an ordered list of sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Book {
    pub(crate) sections: Vec<BookItem>,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

/// One section of the book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) enum BookItem {
    Chapter(Chapter),
    /// Separators, part titles and kinds this version does not know.
    #[serde(untagged)]
    Opaque(Value),
}

impl<'de> Deserialize<'de> for BookItem {
    /// A section tagged `Chapter` must be a well-formed chapter; anything
    /// else is carried through untouched.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(mut section) = value else {
            return Ok(Self::Opaque(value));
        };
        let Some(chapter) = section.remove(CHAPTER_TAG) else {
            return Ok(Self::Opaque(Value::Object(section)));
        };
        if !section.is_empty() {
            return Err(de::Error::custom(
                "chapter section must hold nothing but the chapter",
            ));
        }
        let Value::Object(fields) = chapter else {
            return Err(de::Error::custom("chapter must be a JSON object"));
        };
        Chapter::from_fields(fields)
            .map(Self::Chapter)
            .map_err(de::Error::custom)
    }
}

/// A chapter. Only `content` is ever modified.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Chapter {
    pub(crate) name: String,
    pub(crate) content: String,
    pub(crate) sub_items: Vec<BookItem>,
    /// Every field as received; `content` and `sub_items` are stale here.
    fields: Map<String, Value>,
}

impl Chapter {
    fn from_fields(mut fields: Map<String, Value>) -> Result<Self, String> {
        let name = match fields.get(NAME) {
            Some(Value::String(name)) => name.clone(),
            Some(_) => return Err("chapter name must be a string".to_owned()),
            None => return Err("chapter without a name".to_owned()),
        };
        // Taking leaves a null in place, which keeps the field position
        let content = match fields.get_mut(CONTENT).map(Value::take) {
            Some(Value::String(content)) => content,
            Some(_) => return Err(format!("chapter '{name}': content must be a string")),
            None => return Err(format!("chapter '{name}' has no content")),
        };
        let sub_items = match fields.get_mut(SUB_ITEMS).map(Value::take) {
            Some(items) => serde_json::from_value(items)
                .map_err(|e| format!("chapter '{name}': invalid sub_items: {e}"))?,
            None => Vec::new(),
        };

        Ok(Self {
            name,
            content,
            sub_items,
            fields,
        })
    }
}

impl Serialize for Chapter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            match key.as_str() {
                CONTENT => map.serialize_entry(key, &self.content)?,
                SUB_ITEMS => map.serialize_entry(key, &self.sub_items)?,
                _ => map.serialize_entry(key, value)?,
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "sections": [
                {"Chapter": {
                    "name": "Intro",
                    "content": "# Intro\n",
                    "number": [1],
                    "sub_items": [
                        {"Chapter": {
                            "name": "Nested",
                            "content": "nested",
                            "number": [1, 1],
                            "sub_items": [],
                            "path": "intro/nested.md",
                            "source_path": "intro/nested.md",
                            "parent_names": ["Intro"]
                        }}
                    ],
                    "path": "intro.md",
                    "source_path": "intro.md",
                    "parent_names": []
                }},
                "Separator",
                {"PartTitle": "Reference"},
                {"Hologram": {"future": true}}
            ],
            "__non_exhaustive": null
        })
    }

    #[test]
    fn test_parse_chapters_and_opaque_sections() {
        let book: Book = serde_json::from_value(sample()).unwrap();

        assert_eq!(book.sections.len(), 4);
        let BookItem::Chapter(intro) = &book.sections[0] else {
            panic!("expected chapter");
        };
        assert_eq!(intro.name, "Intro");
        assert_eq!(intro.content, "# Intro\n");
        assert_eq!(intro.sub_items.len(), 1);
        assert_eq!(book.sections[1], BookItem::Opaque(json!("Separator")));
        assert_eq!(
            book.sections[2],
            BookItem::Opaque(json!({"PartTitle": "Reference"}))
        );
        assert!(book.extra.contains_key("__non_exhaustive"));
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let original = sample();
        let book: Book = serde_json::from_value(original.clone()).unwrap();

        assert_eq!(serde_json::to_value(&book).unwrap(), original);
    }

    #[test]
    fn test_round_trip_preserves_key_order() {
        let input = r#"{"sections":[{"Chapter":{"name":"A","content":"x","number":null,"sub_items":[],"path":null,"source_path":null,"parent_names":[],"draft_marker":1}}],"__non_exhaustive":null}"#;
        let book: Book = serde_json::from_str(input).unwrap();

        assert_eq!(serde_json::to_string(&book).unwrap(), input);
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let input = r#"{"sections":[{"Chapter":{"name":"A","content":"x","path":"a.md","parent_names":[]}},{"Chapter":{"content":"y","name":"B","sub_items":[]}}],"__non_exhaustive":null}"#;
        let book: Book = serde_json::from_str(input).unwrap();

        assert_eq!(serde_json::to_string(&book).unwrap(), input);
    }

    #[test]
    fn test_content_rewritten_in_place() {
        let input = r#"{"sections":[{"Chapter":{"name":"A","content":"x","number":[1],"sub_items":[{"Chapter":{"name":"B","content":"y","sub_items":[]}}],"path":"a.md"}}]}"#;
        let mut book: Book = serde_json::from_str(input).unwrap();
        let BookItem::Chapter(chapter) = &mut book.sections[0] else {
            panic!("expected chapter");
        };
        chapter.content = "X".to_owned();
        let BookItem::Chapter(nested) = &mut chapter.sub_items[0] else {
            panic!("expected chapter");
        };
        nested.content = "Y".to_owned();

        assert_eq!(
            serde_json::to_string(&book).unwrap(),
            input.replace(r#""content":"x""#, r#""content":"X""#)
                .replace(r#""content":"y""#, r#""content":"Y""#)
        );
    }

    #[test]
    fn test_malformed_chapter_is_rejected() {
        let malformed = [
            json!({"Chapter": {"name": "A", "content": 7, "sub_items": []}}),
            json!({"Chapter": {"name": "A", "sub_items": []}}),
            json!({"Chapter": {"content": "x"}}),
            json!({"Chapter": "A"}),
            json!({"Chapter": {"name": "A", "content": "x"}, "Separator": null}),
            json!({"Chapter": {"name": "A", "content": "x", "sub_items": [
                {"Chapter": {"name": "B", "content": false}}
            ]}}),
        ];
        for section in malformed {
            let book = json!({"sections": [section]});
            assert!(
                serde_json::from_value::<Book>(book.clone()).is_err(),
                "accepted {book}"
            );
        }
    }
}
