//! Result types returned by operations.

use serde_json::{Map, Value as Json};

use crate::aggregate::{AggregateFunction, Aggregation};
use crate::value::Value;

/// A raw row as returned by a driver: ordered `(column, value)` pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub values: Vec<(String, Value)>,
}

impl Row {
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    /// Get a column value by name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Take a column value out of the row, leaving null behind.
    pub fn take(&mut self, column: &str) -> Option<Value> {
        self.values
            .iter_mut()
            .find(|(name, _)| name == column)
            .map(|(_, value)| std::mem::replace(value, Value::Null))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.values
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

/// A materialized record of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Entity name.
    pub entity: String,
    /// Selected scalar fields, in declaration order.
    pub fields: Vec<(String, Value)>,
    /// Included relations, in request order.
    pub relations: Vec<(String, RelationValue)>,
}

/// The value of an included relation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    One(Option<Box<EntityRecord>>),
    Many(Vec<EntityRecord>),
}

impl EntityRecord {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            fields: vec![],
            relations: vec![],
        }
    }

    /// Get a scalar field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Get an included relation.
    pub fn relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations
            .iter()
            .find(|(rel, _)| rel == name)
            .map(|(_, value)| value)
    }

    /// Records of an included to-many relation, empty when not included.
    pub fn many(&self, name: &str) -> &[EntityRecord] {
        match self.relation(name) {
            Some(RelationValue::Many(records)) => records,
            _ => &[],
        }
    }

    /// Record of an included to-one relation.
    pub fn one(&self, name: &str) -> Option<&EntityRecord> {
        match self.relation(name) {
            Some(RelationValue::One(Some(record))) => Some(record),
            _ => None,
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        for (name, relation) in &self.relations {
            let json = match relation {
                RelationValue::One(None) => Json::Null,
                RelationValue::One(Some(record)) => record.to_json(),
                RelationValue::Many(records) => {
                    Json::Array(records.iter().map(EntityRecord::to_json).collect())
                }
            };
            map.insert(name.clone(), json);
        }
        Json::Object(map)
    }
}

/// One computed aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateValue {
    pub aggregation: Aggregation,
    pub value: Value,
}

impl AggregateValue {
    pub fn new(aggregation: Aggregation, value: Value) -> Self {
        Self { aggregation, value }
    }
}

fn find_aggregate<'a>(
    values: &'a [AggregateValue],
    function: AggregateFunction,
    field: Option<&str>,
) -> Option<&'a Value> {
    values
        .iter()
        .find(|v| v.aggregation.function == function && v.aggregation.field.as_deref() == field)
        .map(|v| &v.value)
}

fn aggregates_to_json(values: &[AggregateValue], map: &mut Map<String, Json>) {
    for v in values {
        let bucket = map
            .entry(v.aggregation.function.key().to_string())
            .or_insert_with(|| Json::Object(Map::new()));
        if let Json::Object(fields) = bucket {
            fields.insert(
                v.aggregation
                    .field
                    .clone()
                    .unwrap_or_else(|| "_all".to_string()),
                v.value.to_json(),
            );
        }
    }
}

/// Result of `aggregate`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateRecord {
    pub values: Vec<AggregateValue>,
}

impl AggregateRecord {
    /// Look up an aggregate; `field` is `None` for `_count._all`.
    pub fn get(&self, function: AggregateFunction, field: Option<&str>) -> Option<&Value> {
        find_aggregate(&self.values, function, field)
    }

    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        aggregates_to_json(&self.values, &mut map);
        Json::Object(map)
    }
}

/// One group of a `groupBy` result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupRecord {
    /// Grouping field values, in `by` order.
    pub keys: Vec<(String, Value)>,
    pub aggregates: Vec<AggregateValue>,
}

impl GroupRecord {
    pub fn key(&self, field: &str) -> Option<&Value> {
        self.keys
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn get(&self, function: AggregateFunction, field: Option<&str>) -> Option<&Value> {
        find_aggregate(&self.aggregates, function, field)
    }

    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        for (name, value) in &self.keys {
            map.insert(name.clone(), value.to_json());
        }
        aggregates_to_json(&self.aggregates, &mut map);
        Json::Object(map)
    }
}

/// Number of records affected by a bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchCount {
    pub count: u64,
}

impl BatchCount {
    pub fn new(count: u64) -> Self {
        Self { count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn athlete(id: i64, name: &str) -> EntityRecord {
        EntityRecord {
            entity: "Athlete".into(),
            fields: vec![("id".into(), Value::Int(id)), ("firstName".into(), name.into())],
            relations: vec![],
        }
    }

    #[test]
    fn test_record_to_json_with_relations() {
        let mut club = EntityRecord::new("Club");
        club.fields.push(("id".into(), Value::Int(1)));
        club.relations.push((
            "athletes".into(),
            RelationValue::Many(vec![athlete(1, "Ada"), athlete(2, "Bo")]),
        ));
        club.relations.push(("owner".into(), RelationValue::One(None)));

        assert_eq!(
            club.to_json(),
            serde_json::json!({
                "id": 1,
                "athletes": [
                    {"id": 1, "firstName": "Ada"},
                    {"id": 2, "firstName": "Bo"}
                ],
                "owner": null
            })
        );
        assert_eq!(club.many("athletes").len(), 2);
        assert!(club.one("owner").is_none());
    }

    #[test]
    fn test_aggregate_record_json() {
        let record = AggregateRecord {
            values: vec![
                AggregateValue::new(Aggregation::count(), Value::Int(3)),
                AggregateValue::new(Aggregation::avg("weight"), Value::Float(61.5)),
                AggregateValue::new(Aggregation::max("weight"), Value::Float(70.0)),
            ],
        };
        assert_eq!(
            record.get(AggregateFunction::Avg, Some("weight")),
            Some(&Value::Float(61.5))
        );
        assert_eq!(
            record.to_json(),
            serde_json::json!({
                "_count": {"_all": 3},
                "_avg": {"weight": 61.5},
                "_max": {"weight": 70.0}
            })
        );
    }

    #[test]
    fn test_row_take() {
        let mut row = Row::new(vec![("id".into(), Value::Int(9))]);
        assert_eq!(row.take("id"), Some(Value::Int(9)));
        assert_eq!(row.get("id"), Some(&Value::Null));
        assert_eq!(row.take("missing"), None);
    }
}
