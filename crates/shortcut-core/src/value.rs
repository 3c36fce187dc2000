//! Typed parameter values and the references they carry.
//!
//! Every action parameter that is not a bare string, number or flag is one of
//! the wrappers built here: literal text, text with a single embedded
//! reference, a direct reference (optionally coerced to a content type), or an
//! ordered key/value mapping. `to_plist` produces the exact nesting the host
//! runtime expects.

use crate::error::{Result, ShortcutError};
use plist::{Dictionary, Value};
use std::fmt;
use uuid::Uuid;

/// Object replacement character standing in for an embedded reference.
pub const PLACEHOLDER: &str = "\u{FFFC}";
/// Range key of the single attachment inside a text value.
pub const PLACEHOLDER_RANGE: &str = "{0, 1}";
/// Variable name the runtime binds to the current item inside a repeat.
pub const REPEAT_ITEM: &str = "Repeat Item";

const TEXT_TOKEN_STRING: &str = "WFTextTokenString";
const TEXT_TOKEN_ATTACHMENT: &str = "WFTextTokenAttachment";
const DICTIONARY_FIELD_VALUE: &str = "WFDictionaryFieldValue";
const COERCION_AGGRANDIZEMENT: &str = "WFCoercionVariableAggrandizement";

// ---------------------------------------------------------------------------
// ContentType
// ---------------------------------------------------------------------------

/// Content item classes, used both as coercion targets and as the document's
/// accepted-input declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Url,
    Text,
    Dictionary,
    Number,
}

impl ContentType {
    pub fn item_class(self) -> &'static str {
        match self {
            ContentType::Url => "WFURLContentItem",
            ContentType::Text => "WFStringContentItem",
            ContentType::Dictionary => "WFDictionaryContentItem",
            ContentType::Number => "WFNumberContentItem",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.item_class())
    }
}

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

/// What a value points at when it is not a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// A document-scoped named variable.
    Variable(String),
    /// A named output of the action carrying `step` as its UUID.
    Output { step: Uuid, label: String },
    /// Whatever was shared into the shortcut.
    ShortcutInput,
    Clipboard,
    /// The current element inside a repeat-each body.
    RepeatItem,
}

impl Reference {
    fn attachment(&self, coercion: Option<ContentType>) -> Value {
        let mut d = Dictionary::new();
        match self {
            Reference::Variable(name) => {
                d.insert("Type".into(), "Variable".into());
                d.insert("VariableName".into(), name.as_str().into());
            }
            Reference::Output { step, label } => {
                d.insert("Type".into(), "ActionOutput".into());
                d.insert("OutputName".into(), label.as_str().into());
                d.insert("OutputUUID".into(), format_uuid(step).into());
            }
            Reference::ShortcutInput => {
                d.insert("Type".into(), "ExtensionInput".into());
            }
            Reference::Clipboard => {
                d.insert("Type".into(), "Clipboard".into());
            }
            Reference::RepeatItem => {
                d.insert("Type".into(), "Variable".into());
                d.insert("VariableName".into(), REPEAT_ITEM.into());
            }
        }
        if let Some(target) = coercion {
            let mut agg = Dictionary::new();
            agg.insert("Type".into(), COERCION_AGGRANDIZEMENT.into());
            agg.insert("CoercionItemClass".into(), target.item_class().into());
            d.insert(
                "Aggrandizements".into(),
                Value::Array(vec![Value::Dictionary(agg)]),
            );
        }
        Value::Dictionary(d)
    }

    /// Wrapper used for the `WFInput` of a conditional, which nests the
    /// attachment one level deeper than a plain direct reference.
    pub fn condition_input(&self) -> Value {
        let mut d = Dictionary::new();
        d.insert("Type".into(), "Variable".into());
        d.insert("Variable".into(), direct_wrapper(self.attachment(None)));
        Value::Dictionary(d)
    }

    /// Parse an attachment dictionary back into a reference. Unknown
    /// attachment types yield `None`.
    pub fn from_attachment(d: &Dictionary) -> Option<Reference> {
        match d.get("Type").and_then(Value::as_string)? {
            "Variable" => {
                let name = d.get("VariableName").and_then(Value::as_string)?;
                if name == REPEAT_ITEM {
                    Some(Reference::RepeatItem)
                } else {
                    Some(Reference::Variable(name.to_string()))
                }
            }
            "ActionOutput" => {
                let label = d.get("OutputName").and_then(Value::as_string)?;
                let step = d
                    .get("OutputUUID")
                    .and_then(Value::as_string)
                    .and_then(|s| Uuid::parse_str(s).ok())?;
                Some(Reference::Output {
                    step,
                    label: label.to_string(),
                })
            }
            "ExtensionInput" => Some(Reference::ShortcutInput),
            "Clipboard" => Some(Reference::Clipboard),
            _ => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Variable(name) => write!(f, "var:{name}"),
            Reference::Output { step, label } => write!(f, "{}:{label}", format_uuid(step)),
            Reference::ShortcutInput => f.write_str("shortcut input"),
            Reference::Clipboard => f.write_str("clipboard"),
            Reference::RepeatItem => f.write_str("repeat item"),
        }
    }
}

/// Identifiers are written upper-case, as the runtime itself writes them.
pub fn format_uuid(id: &Uuid) -> String {
    id.hyphenated()
        .encode_upper(&mut Uuid::encode_buffer())
        .to_string()
}

// ---------------------------------------------------------------------------
// TypedValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Literal(String),
    /// A text value whose whole content is one embedded reference.
    Text(Reference),
    Direct {
        reference: Reference,
        coercion: Option<ContentType>,
    },
}

impl TypedValue {
    pub fn reference(&self) -> Option<&Reference> {
        match self {
            TypedValue::Literal(_) => None,
            TypedValue::Text(r) => Some(r),
            TypedValue::Direct { reference, .. } => Some(reference),
        }
    }

    pub fn coercion(&self) -> Option<ContentType> {
        match self {
            TypedValue::Direct { coercion, .. } => *coercion,
            _ => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            TypedValue::Literal(_) => "literal text",
            TypedValue::Text(_) => "text with an embedded reference",
            TypedValue::Direct { .. } => "a direct reference",
        }
    }

    pub fn to_plist(&self) -> Value {
        match self {
            TypedValue::Literal(s) => {
                let mut inner = Dictionary::new();
                inner.insert("string".into(), s.as_str().into());
                text_wrapper(inner)
            }
            TypedValue::Text(reference) => {
                let mut ranges = Dictionary::new();
                ranges.insert(PLACEHOLDER_RANGE.into(), reference.attachment(None));
                let mut inner = Dictionary::new();
                inner.insert("attachmentsByRange".into(), Value::Dictionary(ranges));
                inner.insert("string".into(), PLACEHOLDER.into());
                text_wrapper(inner)
            }
            TypedValue::Direct {
                reference,
                coercion,
            } => direct_wrapper(reference.attachment(*coercion)),
        }
    }
}

fn text_wrapper(inner: Dictionary) -> Value {
    let mut d = Dictionary::new();
    d.insert("Value".into(), Value::Dictionary(inner));
    d.insert("WFSerializationType".into(), TEXT_TOKEN_STRING.into());
    Value::Dictionary(d)
}

fn direct_wrapper(attachment: Value) -> Value {
    let mut d = Dictionary::new();
    d.insert("Value".into(), attachment);
    d.insert("WFSerializationType".into(), TEXT_TOKEN_ATTACHMENT.into());
    Value::Dictionary(d)
}

// ---------------------------------------------------------------------------
// KeyedMapping
// ---------------------------------------------------------------------------

/// Ordered key/value literal. Keys are neither sorted nor deduplicated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyedMapping {
    pairs: Vec<(String, TypedValue)>,
}

impl KeyedMapping {
    pub fn pairs(&self) -> &[(String, TypedValue)] {
        &self.pairs
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.pairs.iter().filter_map(|(_, v)| v.reference())
    }

    pub fn to_plist(&self) -> Value {
        let items = self
            .pairs
            .iter()
            .map(|(key, value)| {
                let mut item = Dictionary::new();
                item.insert("WFItemType".into(), Value::Integer(0i64.into()));
                item.insert("WFKey".into(), literal(key.as_str()).to_plist());
                item.insert("WFValue".into(), value.to_plist());
                Value::Dictionary(item)
            })
            .collect();
        let mut inner = Dictionary::new();
        inner.insert("WFDictionaryFieldValueItems".into(), Value::Array(items));
        let mut d = Dictionary::new();
        d.insert("Value".into(), Value::Dictionary(inner));
        d.insert("WFSerializationType".into(), DICTIONARY_FIELD_VALUE.into());
        Value::Dictionary(d)
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

pub fn literal(s: impl Into<String>) -> TypedValue {
    TypedValue::Literal(s.into())
}

/// Text whose content is the current value of variable `name`.
pub fn text_with_variable(name: &str) -> Result<TypedValue> {
    if name.is_empty() {
        return Err(ShortcutError::EmptyVariableName);
    }
    Ok(TypedValue::Text(Reference::Variable(name.to_string())))
}

pub fn direct_variable_ref(name: &str) -> Result<TypedValue> {
    if name.is_empty() {
        return Err(ShortcutError::EmptyVariableName);
    }
    Ok(direct(Reference::Variable(name.to_string())))
}

/// `label` must be one of the outputs the target action produces; that is
/// checked by validation, not here.
pub fn direct_output_ref(step: Uuid, label: impl Into<String>) -> TypedValue {
    direct(Reference::Output {
        step,
        label: label.into(),
    })
}

pub fn direct(reference: Reference) -> TypedValue {
    TypedValue::Direct {
        reference,
        coercion: None,
    }
}

pub fn with_coercion(value: TypedValue, target: ContentType) -> Result<TypedValue> {
    match value {
        TypedValue::Direct { reference, .. } => Ok(TypedValue::Direct {
            reference,
            coercion: Some(target),
        }),
        other => Err(ShortcutError::CoercionRequiresReference(other.kind_name())),
    }
}

pub fn keyed_mapping<K, I>(pairs: I) -> KeyedMapping
where
    K: Into<String>,
    I: IntoIterator<Item = (K, TypedValue)>,
{
    KeyedMapping {
        pairs: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(v: &Value) -> &Dictionary {
        v.as_dictionary().expect("dictionary")
    }

    #[test]
    fn literal_wraps_string_as_text_token() {
        let v = literal("max").to_plist();
        let d = dict(&v);
        assert_eq!(
            d.get("WFSerializationType").and_then(Value::as_string),
            Some("WFTextTokenString")
        );
        let inner = dict(d.get("Value").unwrap());
        assert_eq!(inner.get("string").and_then(Value::as_string), Some("max"));
        assert!(inner.get("attachmentsByRange").is_none());
    }

    #[test]
    fn text_with_variable_places_attachment_at_placeholder() {
        let v = text_with_variable("videoURL").unwrap().to_plist();
        let inner = dict(dict(&v).get("Value").unwrap());
        assert_eq!(
            inner.get("string").and_then(Value::as_string),
            Some("\u{FFFC}")
        );
        let ranges = dict(inner.get("attachmentsByRange").unwrap());
        assert_eq!(ranges.len(), 1);
        let att = dict(ranges.get("{0, 1}").unwrap());
        assert_eq!(att.get("Type").and_then(Value::as_string), Some("Variable"));
        assert_eq!(
            att.get("VariableName").and_then(Value::as_string),
            Some("videoURL")
        );
    }

    #[test]
    fn empty_variable_name_is_rejected() {
        assert!(matches!(
            text_with_variable(""),
            Err(ShortcutError::EmptyVariableName)
        ));
        assert!(matches!(
            direct_variable_ref(""),
            Err(ShortcutError::EmptyVariableName)
        ));
    }

    #[test]
    fn direct_output_ref_serializes_upper_case_uuid() {
        let id = Uuid::new_v4();
        let v = direct_output_ref(id, "Contents of URL").to_plist();
        let d = dict(&v);
        assert_eq!(
            d.get("WFSerializationType").and_then(Value::as_string),
            Some("WFTextTokenAttachment")
        );
        let att = dict(d.get("Value").unwrap());
        assert_eq!(att.get("Type").and_then(Value::as_string), Some("ActionOutput"));
        let written = att.get("OutputUUID").and_then(Value::as_string).unwrap();
        assert_eq!(written, id.to_string().to_uppercase());
        assert_eq!(Reference::from_attachment(att).unwrap(), Reference::Output {
            step: id,
            label: "Contents of URL".into()
        });
    }

    #[test]
    fn coercion_on_literal_fails() {
        let err = with_coercion(literal("x"), ContentType::Url).unwrap_err();
        assert!(matches!(err, ShortcutError::CoercionRequiresReference(_)));
        let err = with_coercion(text_with_variable("a").unwrap(), ContentType::Url).unwrap_err();
        assert!(matches!(err, ShortcutError::CoercionRequiresReference(_)));
    }

    #[test]
    fn coercion_adds_aggrandizement() {
        let v = with_coercion(direct_variable_ref("url").unwrap(), ContentType::Url).unwrap();
        assert_eq!(v.coercion(), Some(ContentType::Url));
        let plist = v.to_plist();
        let att = dict(dict(&plist).get("Value").unwrap());
        let aggs = att.get("Aggrandizements").and_then(Value::as_array).unwrap();
        assert_eq!(aggs.len(), 1);
        let agg = dict(&aggs[0]);
        assert_eq!(
            agg.get("Type").and_then(Value::as_string),
            Some("WFCoercionVariableAggrandizement")
        );
        assert_eq!(
            agg.get("CoercionItemClass").and_then(Value::as_string),
            Some("WFURLContentItem")
        );
    }

    #[test]
    fn keyed_mapping_keeps_order_and_duplicates() {
        let m = keyed_mapping([
            ("b", literal("1")),
            ("a", literal("2")),
            ("b", literal("3")),
        ]);
        let keys: Vec<&str> = m.pairs().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["b", "a", "b"]);

        let plist = m.to_plist();
        let d = dict(&plist);
        assert_eq!(
            d.get("WFSerializationType").and_then(Value::as_string),
            Some("WFDictionaryFieldValue")
        );
        let items = dict(d.get("Value").unwrap())
            .get("WFDictionaryFieldValueItems")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(items.len(), 3);
        let first = dict(&items[0]);
        assert_eq!(first.get("WFItemType").and_then(Value::as_signed_integer), Some(0));
    }

    #[test]
    fn condition_input_nests_direct_reference() {
        let v = Reference::Variable("status".into()).condition_input();
        let d = dict(&v);
        assert_eq!(d.get("Type").and_then(Value::as_string), Some("Variable"));
        let wrapped = dict(d.get("Variable").unwrap());
        assert_eq!(
            wrapped.get("WFSerializationType").and_then(Value::as_string),
            Some("WFTextTokenAttachment")
        );
    }

    #[test]
    fn repeat_item_round_trips_through_attachment() {
        let plist = direct(Reference::RepeatItem).to_plist();
        let att = dict(dict(&plist).get("Value").unwrap());
        assert_eq!(Reference::from_attachment(att), Some(Reference::RepeatItem));
    }
}
