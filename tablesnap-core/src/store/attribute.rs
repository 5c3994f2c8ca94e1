//! Conversion between DynamoDB attribute values and JSON records.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Number, Value};

use crate::record::Record;
use crate::{Result, TableSnapError};

pub(crate) type Item = HashMap<String, AttributeValue>;

pub(crate) fn item_to_record(item: &Item) -> Result<Record> {
    item.iter()
        .map(|(name, attribute)| Ok((name.clone(), attribute_to_value(attribute)?)))
        .collect()
}

pub(crate) fn record_to_item(record: Record) -> Item {
    record
        .into_iter()
        .map(|(name, value)| (name, value_to_attribute(value)))
        .collect()
}

fn attribute_to_value(attribute: &AttributeValue) -> Result<Value> {
    let value = match attribute {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => Value::Number(parse_number(n)?),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::M(map) => Value::Object(item_to_record(map)?),
        AttributeValue::L(list) => Value::Array(
            list.iter()
                .map(attribute_to_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        // Sets have no JSON counterpart; they come back as lists on restore
        AttributeValue::Ss(set) => Value::Array(set.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(set) => Value::Array(
            set.iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::B(_) | AttributeValue::Bs(_) => {
            return Err(TableSnapError::retrieval(
                "binary attributes cannot be exported to JSON",
            ))
        }
        other => {
            return Err(TableSnapError::retrieval(format!(
                "unsupported attribute value: {other:?}"
            )))
        }
    };
    Ok(value)
}

fn value_to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(items) => {
            AttributeValue::L(items.into_iter().map(value_to_attribute).collect())
        }
        Value::Object(record) => AttributeValue::M(record_to_item(record)),
    }
}

/// DynamoDB numbers are decimal strings of up to 38 digits; valid JSON
/// numbers keep their exact text
fn parse_number(raw: &str) -> Result<Number> {
    if let Ok(number) = serde_json::from_str::<Number>(raw) {
        return Ok(number);
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| TableSnapError::retrieval(format!("invalid number attribute '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_attributes() {
        let item: Item = [
            ("id".to_string(), AttributeValue::N("7".to_string())),
            ("name".to_string(), AttributeValue::S("ada".to_string())),
            ("active".to_string(), AttributeValue::Bool(true)),
            ("deleted_at".to_string(), AttributeValue::Null(true)),
            ("score".to_string(), AttributeValue::N("1.5".to_string())),
        ]
        .into_iter()
        .collect();

        let record = item_to_record(&item).unwrap();
        assert_eq!(
            Value::Object(record),
            json!({"id": 7, "name": "ada", "active": true, "deleted_at": null, "score": 1.5})
        );
    }

    #[test]
    fn test_nested_record_back_to_item() {
        let record = json!({"id": 1, "tags": ["a", 2], "address": {"city": "Oslo"}})
            .as_object()
            .cloned()
            .unwrap();

        let item = record_to_item(record.clone());
        assert_eq!(item.get("id"), Some(&AttributeValue::N("1".to_string())));
        assert!(matches!(item.get("tags"), Some(AttributeValue::L(list)) if list.len() == 2));
        assert_eq!(item_to_record(&item).unwrap(), record);
    }

    #[test]
    fn test_sets_become_arrays() {
        let item: Item = [(
            "ns".to_string(),
            AttributeValue::Ns(vec!["1".to_string(), "2".to_string()]),
        )]
        .into_iter()
        .collect();

        assert_eq!(
            Value::Object(item_to_record(&item).unwrap()),
            json!({"ns": [1, 2]})
        );
    }

    #[test]
    fn test_number_with_exponent() {
        assert_eq!(parse_number("1E+2").unwrap().as_f64(), Some(100.0));
        assert!(parse_number("abc").is_err());
    }

    #[test]
    fn test_wide_numbers_keep_every_digit() {
        for raw in ["12345678901234567890123", "3.14159265358979323846264338327950288"] {
            let item: Item = [("n".to_string(), AttributeValue::N(raw.to_string()))]
                .into_iter()
                .collect();

            let record = item_to_record(&item).unwrap();
            assert_eq!(record["n"].to_string(), raw);
            assert_eq!(
                record_to_item(record).get("n"),
                Some(&AttributeValue::N(raw.to_string()))
            );
        }
    }
}
