//! Parsing of JSON argument documents.
//!
//! Argument documents follow the familiar `where`/`orderBy`/`select` shape:
//!
//! ```json
//! {
//!   "where": { "club": { "is": { "name": "Ippon" } }, "weight": { "gte": 60 } },
//!   "orderBy": [{ "lastName": "asc" }, { "entries": { "_count": "desc" } }],
//!   "take": -3,
//!   "cursor": { "id": 42 },
//!   "include": { "entries": { "take": 2 } }
//! }
//! ```
//!
//! Parsing is structural only. Whether `club` is a relation or `weight` is
//! numeric is decided by the filter compiler against the schema registry.

use serde_json::{Map, Value as Json};

use crate::aggregate::{
    AggregateArgs, AggregateFunction, Aggregation, CountArgs, GroupByArgs, GroupOrderBy,
    GroupOrderTarget, Having, HavingCondition,
};
use crate::error::Error;
use crate::filter::{Condition, FieldFilter, FieldOp, Filter, QueryMode, RelationFilter, UniqueWhere};
use crate::mutation::{
    CreateArgs, CreateManyArgs, Data, DataValue, DeleteArgs, DeleteManyArgs, UpdateArgs,
    UpdateManyArgs, UpsertArgs,
};
use crate::operation::{Operation, OperationKind};
use crate::query::{
    FindArgs, FindUniqueArgs, NullsOrder, OrderBy, OrderTarget, SelectItem, Selection, SortOrder,
};
use crate::value::Value;

type Result<T> = std::result::Result<T, Error>;

const RELATION_QUANTIFIERS: &[&str] = &["is", "isNot", "every", "some", "none"];
const SELECTION_KEYS: &[&str] = &["select", "include", "omit"];

fn child(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn object<'a>(json: &'a Json, path: &str) -> Result<&'a Map<String, Json>> {
    json.as_object()
        .ok_or_else(|| Error::invalid(path, "expected an object"))
}

fn check_keys(map: &Map<String, Json>, allowed: &[&[&str]], path: &str) -> Result<()> {
    for key in map.keys() {
        if !allowed.iter().any(|set| set.contains(&key.as_str())) {
            return Err(Error::invalid(child(path, key), "unknown argument"));
        }
    }
    Ok(())
}

fn scalar(json: &Json, path: &str) -> Result<Value> {
    Value::from_json(json).ok_or_else(|| Error::invalid(path, "expected a scalar value"))
}

fn scalar_list(json: &Json, path: &str) -> Result<Vec<Value>> {
    let items = json
        .as_array()
        .ok_or_else(|| Error::invalid(path, "expected an array"))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| scalar(item, &format!("{path}[{i}]")))
        .collect()
}

fn string(json: &Json, path: &str) -> Result<String> {
    json.as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::invalid(path, "expected a string"))
}

fn unsigned(json: &Json, path: &str) -> Result<u64> {
    json.as_u64()
        .ok_or_else(|| Error::invalid(path, "expected a non-negative integer"))
}

fn signed(json: &Json, path: &str) -> Result<i64> {
    json.as_i64()
        .ok_or_else(|| Error::invalid(path, "expected an integer"))
}

fn boolean(json: &Json, path: &str) -> Result<bool> {
    json.as_bool()
        .ok_or_else(|| Error::invalid(path, "expected a boolean"))
}

fn single_entry<'a>(map: &'a Map<String, Json>, path: &str) -> Result<(&'a String, &'a Json)> {
    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(Error::invalid(path, "expected exactly one key")),
    }
}

/// Parse a `where` document.
pub fn parse_filter(json: &Json, path: &str) -> Result<Filter> {
    let map = object(json, path)?;
    let mut filter = Filter::new();
    for (key, value) in map {
        let at = child(path, key);
        let condition = match key.as_str() {
            "AND" => Condition::And(filter_list(value, &at)?),
            "OR" => Condition::Or(filter_list(value, &at)?),
            "NOT" => Condition::Not(filter_list(value, &at)?),
            _ => match value {
                Json::Object(inner)
                    if !inner.is_empty()
                        && inner
                            .keys()
                            .all(|k| RELATION_QUANTIFIERS.contains(&k.as_str())) =>
                {
                    Condition::Relation {
                        relation: key.clone(),
                        filter: parse_relation_filter(inner, &at)?,
                    }
                }
                Json::Object(inner) => Condition::Field {
                    field: key.clone(),
                    filter: parse_field_filter(inner, &at)?,
                },
                other => Condition::Field {
                    field: key.clone(),
                    filter: FieldFilter::equals(scalar(other, &at)?),
                },
            },
        };
        filter.conditions.push(condition);
    }
    Ok(filter)
}

fn filter_list(json: &Json, path: &str) -> Result<Vec<Filter>> {
    match json {
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_filter(item, &format!("{path}[{i}]")))
            .collect(),
        other => Ok(vec![parse_filter(other, path)?]),
    }
}

fn parse_relation_filter(map: &Map<String, Json>, path: &str) -> Result<RelationFilter> {
    let (key, value) = single_entry(map, path)?;
    let at = child(path, key);
    let optional = |value: &Json| -> Result<Option<Filter>> {
        match value {
            Json::Null => Ok(None),
            other => parse_filter(other, &at).map(Some),
        }
    };
    let filter = match key.as_str() {
        "is" => RelationFilter::Is(optional(value)?),
        "isNot" => RelationFilter::IsNot(optional(value)?),
        "every" => RelationFilter::Every(parse_filter(value, &at)?),
        "some" => RelationFilter::Some(parse_filter(value, &at)?),
        "none" => RelationFilter::None(parse_filter(value, &at)?),
        _ => return Err(Error::invalid(at, "unknown relation quantifier")),
    };
    Ok(filter)
}

/// Parse the operator object of a scalar field filter.
pub fn parse_field_filter(map: &Map<String, Json>, path: &str) -> Result<FieldFilter> {
    let mut filter = FieldFilter::default();
    for (key, value) in map {
        let at = child(path, key);
        let op = match key.as_str() {
            "mode" => {
                filter.mode = match string(value, &at)?.as_str() {
                    "default" => QueryMode::Default,
                    "insensitive" => QueryMode::Insensitive,
                    _ => return Err(Error::invalid(at, "expected \"default\" or \"insensitive\"")),
                };
                continue;
            }
            "equals" => FieldOp::Equals(scalar(value, &at)?),
            "not" => match value {
                Json::Object(inner) => FieldOp::Not(Box::new(parse_field_filter(inner, &at)?)),
                other => FieldOp::Not(Box::new(FieldFilter::equals(scalar(other, &at)?))),
            },
            "in" => FieldOp::In(scalar_list(value, &at)?),
            "notIn" => FieldOp::NotIn(scalar_list(value, &at)?),
            "lt" => FieldOp::Lt(scalar(value, &at)?),
            "lte" => FieldOp::Lte(scalar(value, &at)?),
            "gt" => FieldOp::Gt(scalar(value, &at)?),
            "gte" => FieldOp::Gte(scalar(value, &at)?),
            "contains" => FieldOp::Contains(string(value, &at)?),
            "startsWith" => FieldOp::StartsWith(string(value, &at)?),
            "endsWith" => FieldOp::EndsWith(string(value, &at)?),
            _ => return Err(Error::invalid(at, "unknown operator")),
        };
        filter.ops.push(op);
    }
    Ok(filter)
}

/// Parse a unique `where` document. Composite keys may be nested under the
/// constraint name: `{ "clubId_name": { "clubId": 1, "name": "Juniors" } }`.
pub fn parse_unique(json: &Json, path: &str) -> Result<UniqueWhere> {
    let map = object(json, path)?;
    let mut unique = UniqueWhere::new();
    for (key, value) in map {
        let at = child(path, key);
        match value {
            Json::Object(inner) => {
                for (field, v) in inner {
                    unique = unique.and(field.clone(), scalar(v, &child(&at, field))?);
                }
            }
            other => unique = unique.and(key.clone(), scalar(other, &at)?),
        }
    }
    Ok(unique)
}

fn parse_sort(json: &Json, path: &str) -> Result<SortOrder> {
    match string(json, path)?.as_str() {
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        _ => Err(Error::invalid(path, "expected \"asc\" or \"desc\"")),
    }
}

/// Parse `"asc"` or `{ "sort": "asc", "nulls": "last" }`.
fn parse_sort_spec(json: &Json, path: &str) -> Result<(SortOrder, Option<NullsOrder>)> {
    match json {
        Json::Object(map) => {
            check_keys(map, &[&["sort", "nulls"]], path)?;
            let sort_path = child(path, "sort");
            let sort = map
                .get("sort")
                .ok_or_else(|| Error::invalid(&sort_path, "missing sort direction"))
                .and_then(|v| parse_sort(v, &sort_path))?;
            let nulls = match map.get("nulls") {
                None => None,
                Some(v) => {
                    let nulls_path = child(path, "nulls");
                    match string(v, &nulls_path)?.as_str() {
                        "first" => Some(NullsOrder::First),
                        "last" => Some(NullsOrder::Last),
                        _ => return Err(Error::invalid(nulls_path, "expected \"first\" or \"last\"")),
                    }
                }
            };
            Ok((sort, nulls))
        }
        other => Ok((parse_sort(other, path)?, None)),
    }
}

/// Parse an `orderBy` document: one object or an array of single-key objects.
pub fn parse_order_by(json: &Json, path: &str) -> Result<Vec<OrderBy>> {
    let entries: Vec<(&Json, String)> = match json {
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (item, format!("{path}[{i}]")))
            .collect(),
        other => vec![(other, path.to_string())],
    };

    let mut order_by = Vec::with_capacity(entries.len());
    for (entry, at) in entries {
        let map = object(entry, &at)?;
        let (key, value) = single_entry(map, &at)?;
        let at = child(&at, key);
        let order = match value {
            Json::Object(inner) if inner.contains_key("sort") => {
                let (order, nulls) = parse_sort_spec(value, &at)?;
                OrderBy {
                    target: OrderTarget::Field(key.clone()),
                    order,
                    nulls,
                }
            }
            Json::Object(inner) => {
                let (field, spec) = single_entry(inner, &at)?;
                let (order, nulls) = parse_sort_spec(spec, &child(&at, field))?;
                let target = if field == "_count" {
                    OrderTarget::RelationCount(key.clone())
                } else {
                    OrderTarget::Relation {
                        relation: key.clone(),
                        field: field.clone(),
                    }
                };
                OrderBy {
                    target,
                    order,
                    nulls,
                }
            }
            other => OrderBy {
                target: OrderTarget::Field(key.clone()),
                order: parse_sort(other, &at)?,
                nulls: None,
            },
        };
        order_by.push(order);
    }
    Ok(order_by)
}

/// Parse the `select`/`include`/`omit` keys of an argument object.
pub fn parse_selection(map: &Map<String, Json>, path: &str) -> Result<Selection> {
    let select = match map.get("select") {
        None | Some(Json::Null) => None,
        Some(json) => {
            let at = child(path, "select");
            let mut items = Vec::new();
            for (key, value) in object(json, &at)? {
                match value {
                    Json::Bool(true) => items.push(SelectItem::Field(key.clone())),
                    Json::Bool(false) => {}
                    Json::Object(_) => items.push(SelectItem::Relation(
                        key.clone(),
                        parse_find_args(value, &child(&at, key))?,
                    )),
                    _ => return Err(Error::invalid(child(&at, key), "expected true or an object")),
                }
            }
            Some(items)
        }
    };

    let include = match map.get("include") {
        None | Some(Json::Null) => None,
        Some(json) => {
            let at = child(path, "include");
            let mut relations = Vec::new();
            for (key, value) in object(json, &at)? {
                match value {
                    Json::Bool(true) => relations.push((key.clone(), FindArgs::new())),
                    Json::Bool(false) => {}
                    Json::Object(_) => {
                        relations.push((key.clone(), parse_find_args(value, &child(&at, key))?))
                    }
                    _ => return Err(Error::invalid(child(&at, key), "expected true or an object")),
                }
            }
            Some(relations)
        }
    };

    let mut omit = Vec::new();
    if let Some(json) = map.get("omit") {
        let at = child(path, "omit");
        for (key, value) in object(json, &at)? {
            if boolean(value, &child(&at, key))? {
                omit.push(key.clone());
            }
        }
    }

    Selection::new(select, include, omit)
}

/// Parse `findMany`/`findFirst` arguments; also used for nested includes.
pub fn parse_find_args(json: &Json, path: &str) -> Result<FindArgs> {
    if json.is_null() {
        return Ok(FindArgs::new());
    }
    let map = object(json, path)?;
    check_keys(
        map,
        &[&["where", "orderBy", "skip", "take", "cursor"], SELECTION_KEYS],
        path,
    )?;
    let mut args = FindArgs::new();
    if let Some(v) = map.get("where") {
        args.filter = Some(parse_filter(v, &child(path, "where"))?);
    }
    if let Some(v) = map.get("orderBy") {
        args.order_by = parse_order_by(v, &child(path, "orderBy"))?;
    }
    if let Some(v) = map.get("skip") {
        args.skip = Some(unsigned(v, &child(path, "skip"))?);
    }
    if let Some(v) = map.get("take") {
        args.take = Some(signed(v, &child(path, "take"))?);
    }
    if let Some(v) = map.get("cursor") {
        args.cursor = Some(parse_unique(v, &child(path, "cursor"))?);
    }
    args.selection = parse_selection(map, path)?;
    Ok(args)
}

fn required<'a>(map: &'a Map<String, Json>, key: &str, path: &str) -> Result<&'a Json> {
    map.get(key)
        .ok_or_else(|| Error::invalid(child(path, key), "missing required argument"))
}

fn retry_flag(map: &Map<String, Json>, path: &str) -> Result<bool> {
    match map.get("retrySafe") {
        None => Ok(false),
        Some(v) => boolean(v, &child(path, "retrySafe")),
    }
}

/// Parse a create or update payload.
pub fn parse_data(json: &Json, path: &str) -> Result<Data> {
    let map = object(json, path)?;
    let mut data = Data::new();
    for (key, value) in map {
        let at = child(path, key);
        let change = match value {
            Json::Object(inner) => {
                let (op, operand) = single_entry(inner, &at)?;
                let op_at = child(&at, op);
                match op.as_str() {
                    "set" => DataValue::Set(scalar(operand, &op_at)?),
                    "increment" => DataValue::Increment(scalar(operand, &op_at)?),
                    "decrement" => DataValue::Decrement(scalar(operand, &op_at)?),
                    "multiply" => DataValue::Multiply(scalar(operand, &op_at)?),
                    "divide" => DataValue::Divide(scalar(operand, &op_at)?),
                    "connect" => DataValue::Connect(parse_unique(operand, &op_at)?),
                    "disconnect" => {
                        if !boolean(operand, &op_at)? {
                            continue;
                        }
                        DataValue::Disconnect
                    }
                    _ => return Err(Error::invalid(op_at, "unknown write operation")),
                }
            }
            other => DataValue::Set(scalar(other, &at)?),
        };
        data.entries.push((key.clone(), change));
    }
    Ok(data)
}

fn optional_filter(map: &Map<String, Json>, path: &str) -> Result<Option<Filter>> {
    map.get("where")
        .map(|v| parse_filter(v, &child(path, "where")))
        .transpose()
}

fn optional_u64(map: &Map<String, Json>, key: &str, path: &str) -> Result<Option<u64>> {
    map.get(key)
        .map(|v| unsigned(v, &child(path, key)))
        .transpose()
}

fn optional_order(map: &Map<String, Json>, path: &str) -> Result<Vec<OrderBy>> {
    match map.get("orderBy") {
        None => Ok(vec![]),
        Some(v) => parse_order_by(v, &child(path, "orderBy")),
    }
}

/// Parse the `_count`/`_sum`/`_avg`/`_min`/`_max` keys of an argument object.
fn parse_aggregations(map: &Map<String, Json>, path: &str) -> Result<Vec<Aggregation>> {
    let mut aggregations = Vec::new();
    for (key, value) in map {
        let Some(function) = AggregateFunction::from_key(key) else {
            continue;
        };
        let at = child(path, key);
        match value {
            Json::Bool(true) if function == AggregateFunction::Count => {
                aggregations.push(Aggregation::count());
            }
            Json::Object(fields) => {
                for (field, flag) in fields {
                    if !boolean(flag, &child(&at, field))? {
                        continue;
                    }
                    let field = if field == "_all" && function == AggregateFunction::Count {
                        None
                    } else {
                        Some(field.clone())
                    };
                    aggregations.push(Aggregation { function, field });
                }
            }
            _ => return Err(Error::invalid(at, "expected an object of fields")),
        }
    }
    Ok(aggregations)
}

const AGGREGATE_KEYS: &[&str] = &["_count", "_sum", "_avg", "_min", "_max"];

/// Parse `aggregate` arguments.
pub fn parse_aggregate_args(json: &Json, path: &str) -> Result<AggregateArgs> {
    let map = object(json, path)?;
    check_keys(
        map,
        &[&["where", "orderBy", "skip", "take"], AGGREGATE_KEYS],
        path,
    )?;
    Ok(AggregateArgs {
        filter: optional_filter(map, path)?,
        order_by: optional_order(map, path)?,
        skip: optional_u64(map, "skip", path)?,
        take: optional_u64(map, "take", path)?,
        aggregations: parse_aggregations(map, path)?,
    })
}

/// Parse `count` arguments.
pub fn parse_count_args(json: &Json, path: &str) -> Result<CountArgs> {
    if json.is_null() {
        return Ok(CountArgs::new());
    }
    let map = object(json, path)?;
    check_keys(map, &[&["where", "skip", "take"]], path)?;
    Ok(CountArgs {
        filter: optional_filter(map, path)?,
        skip: optional_u64(map, "skip", path)?,
        take: optional_u64(map, "take", path)?,
    })
}

/// Parse a `having` document. Aggregate conditions are written field first:
/// `{ "weight": { "_avg": { "gt": 60 } } }`.
pub fn parse_having(json: &Json, path: &str) -> Result<Having> {
    let map = object(json, path)?;
    let mut having = Having::new();
    for (key, value) in map {
        let at = child(path, key);
        let list = |json: &Json| -> Result<Vec<Having>> {
            match json {
                Json::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| parse_having(item, &format!("{at}[{i}]")))
                    .collect(),
                other => Ok(vec![parse_having(other, &at)?]),
            }
        };
        match key.as_str() {
            "AND" => having.conditions.push(HavingCondition::And(list(value)?)),
            "OR" => having.conditions.push(HavingCondition::Or(list(value)?)),
            "NOT" => having.conditions.push(HavingCondition::Not(list(value)?)),
            _ => match value {
                Json::Object(inner) if inner.keys().any(|k| k.starts_with('_')) => {
                    for (agg_key, filter) in inner {
                        let agg_at = child(&at, agg_key);
                        let function = AggregateFunction::from_key(agg_key)
                            .ok_or_else(|| Error::invalid(&agg_at, "unknown aggregate"))?;
                        having.conditions.push(HavingCondition::Aggregate {
                            aggregation: Aggregation {
                                function,
                                field: Some(key.clone()),
                            },
                            filter: parse_field_filter(object(filter, &agg_at)?, &agg_at)?,
                        });
                    }
                }
                Json::Object(inner) => having.conditions.push(HavingCondition::Field {
                    field: key.clone(),
                    filter: parse_field_filter(inner, &at)?,
                }),
                other => having.conditions.push(HavingCondition::Field {
                    field: key.clone(),
                    filter: FieldFilter::equals(scalar(other, &at)?),
                }),
            },
        }
    }
    Ok(having)
}

fn parse_group_order(json: &Json, path: &str) -> Result<Vec<GroupOrderBy>> {
    let entries: Vec<(&Json, String)> = match json {
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (item, format!("{path}[{i}]")))
            .collect(),
        other => vec![(other, path.to_string())],
    };
    let mut order_by = Vec::new();
    for (entry, at) in entries {
        let (key, value) = single_entry(object(entry, &at)?, &at)?;
        let at = child(&at, key);
        match AggregateFunction::from_key(key) {
            Some(function) => {
                let (field, sort) = single_entry(object(value, &at)?, &at)?;
                let field = if field == "_all" && function == AggregateFunction::Count {
                    None
                } else {
                    Some(field.clone())
                };
                order_by.push(GroupOrderBy {
                    target: GroupOrderTarget::Aggregate(Aggregation { function, field }),
                    order: parse_sort(sort, &at)?,
                });
            }
            None => order_by.push(GroupOrderBy::field(key.clone(), parse_sort(value, &at)?)),
        }
    }
    Ok(order_by)
}

/// Parse `groupBy` arguments.
pub fn parse_group_by_args(json: &Json, path: &str) -> Result<GroupByArgs> {
    let map = object(json, path)?;
    check_keys(
        map,
        &[&["by", "where", "having", "orderBy", "skip", "take"], AGGREGATE_KEYS],
        path,
    )?;
    let by_path = child(path, "by");
    let by = match required(map, "by", path)? {
        Json::String(field) => vec![field.clone()],
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| string(item, &format!("{by_path}[{i}]")))
            .collect::<Result<Vec<_>>>()?,
        _ => return Err(Error::invalid(by_path, "expected a field name or an array")),
    };
    Ok(GroupByArgs {
        by,
        filter: optional_filter(map, path)?,
        having: map
            .get("having")
            .map(|v| parse_having(v, &child(path, "having")))
            .transpose()?,
        aggregations: parse_aggregations(map, path)?,
        order_by: match map.get("orderBy") {
            None => vec![],
            Some(v) => parse_group_order(v, &child(path, "orderBy"))?,
        },
        skip: optional_u64(map, "skip", path)?,
        take: optional_u64(map, "take", path)?,
    })
}

/// Parse an operation's argument document.
pub fn parse_operation(entity: &str, kind: OperationKind, args: &Json) -> Result<Operation> {
    let entity = entity.to_string();
    let empty = Json::Object(Map::new());
    let args = if args.is_null() { &empty } else { args };
    let path = "";

    let operation = match kind {
        OperationKind::FindUnique => {
            let map = object(args, path)?;
            check_keys(map, &[&["where"], SELECTION_KEYS], path)?;
            Operation::FindUnique {
                entity,
                args: FindUniqueArgs {
                    unique: parse_unique(required(map, "where", path)?, "where")?,
                    selection: parse_selection(map, path)?,
                },
            }
        }
        OperationKind::FindFirst => Operation::FindFirst {
            entity,
            args: parse_find_args(args, path)?,
        },
        OperationKind::FindMany => Operation::FindMany {
            entity,
            args: parse_find_args(args, path)?,
        },
        OperationKind::Create => {
            let map = object(args, path)?;
            check_keys(map, &[&["data", "retrySafe"], SELECTION_KEYS], path)?;
            Operation::Create {
                entity,
                args: CreateArgs {
                    data: parse_data(required(map, "data", path)?, "data")?,
                    selection: parse_selection(map, path)?,
                    retry_safe: retry_flag(map, path)?,
                },
            }
        }
        OperationKind::CreateMany => {
            let map = object(args, path)?;
            check_keys(map, &[&["data", "skipDuplicates", "retrySafe"]], path)?;
            let rows = required(map, "data", path)?
                .as_array()
                .ok_or_else(|| Error::invalid("data", "expected an array"))?;
            Operation::CreateMany {
                entity,
                args: CreateManyArgs {
                    data: rows
                        .iter()
                        .enumerate()
                        .map(|(i, row)| parse_data(row, &format!("data[{i}]")))
                        .collect::<Result<Vec<_>>>()?,
                    skip_duplicates: match map.get("skipDuplicates") {
                        None => false,
                        Some(v) => boolean(v, "skipDuplicates")?,
                    },
                    retry_safe: retry_flag(map, path)?,
                },
            }
        }
        OperationKind::Update => {
            let map = object(args, path)?;
            check_keys(map, &[&["where", "data", "retrySafe"], SELECTION_KEYS], path)?;
            Operation::Update {
                entity,
                args: UpdateArgs {
                    unique: parse_unique(required(map, "where", path)?, "where")?,
                    data: parse_data(required(map, "data", path)?, "data")?,
                    selection: parse_selection(map, path)?,
                    retry_safe: retry_flag(map, path)?,
                },
            }
        }
        OperationKind::UpdateMany => {
            let map = object(args, path)?;
            check_keys(
                map,
                &[&["where", "data", "limit", "orderBy", "retrySafe"]],
                path,
            )?;
            Operation::UpdateMany {
                entity,
                args: UpdateManyArgs {
                    filter: optional_filter(map, path)?,
                    data: parse_data(required(map, "data", path)?, "data")?,
                    limit: optional_u64(map, "limit", path)?,
                    order_by: optional_order(map, path)?,
                    retry_safe: retry_flag(map, path)?,
                },
            }
        }
        OperationKind::Upsert => {
            let map = object(args, path)?;
            check_keys(
                map,
                &[&["where", "create", "update", "retrySafe"], SELECTION_KEYS],
                path,
            )?;
            Operation::Upsert {
                entity,
                args: UpsertArgs {
                    unique: parse_unique(required(map, "where", path)?, "where")?,
                    create: parse_data(required(map, "create", path)?, "create")?,
                    update: parse_data(required(map, "update", path)?, "update")?,
                    selection: parse_selection(map, path)?,
                    retry_safe: retry_flag(map, path)?,
                },
            }
        }
        OperationKind::Delete => {
            let map = object(args, path)?;
            check_keys(map, &[&["where", "retrySafe"], SELECTION_KEYS], path)?;
            Operation::Delete {
                entity,
                args: DeleteArgs {
                    unique: parse_unique(required(map, "where", path)?, "where")?,
                    selection: parse_selection(map, path)?,
                    retry_safe: retry_flag(map, path)?,
                },
            }
        }
        OperationKind::DeleteMany => {
            let map = object(args, path)?;
            check_keys(map, &[&["where", "limit", "orderBy", "retrySafe"]], path)?;
            Operation::DeleteMany {
                entity,
                args: DeleteManyArgs {
                    filter: optional_filter(map, path)?,
                    limit: optional_u64(map, "limit", path)?,
                    order_by: optional_order(map, path)?,
                    retry_safe: retry_flag(map, path)?,
                },
            }
        }
        OperationKind::Aggregate => Operation::Aggregate {
            entity,
            args: parse_aggregate_args(args, path)?,
        },
        OperationKind::GroupBy => Operation::GroupBy {
            entity,
            args: parse_group_by_args(args, path)?,
        },
        OperationKind::Count => Operation::Count {
            entity,
            args: parse_count_args(args, path)?,
        },
        OperationKind::QueryRaw | OperationKind::ExecuteRaw => {
            let map = object(args, path)?;
            check_keys(map, &[&["sql", "params"]], path)?;
            let sql = string(required(map, "sql", path)?, "sql")?;
            let params = match map.get("params") {
                None => vec![],
                Some(v) => scalar_list(v, "params")?,
            };
            if kind == OperationKind::QueryRaw {
                Operation::QueryRaw { sql, params }
            } else {
                Operation::ExecuteRaw { sql, params }
            }
        }
    };
    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SelectionShape;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_filter_shapes() {
        let filter = parse_filter(
            &json!({
                "lastName": { "startsWith": "Mc", "mode": "insensitive" },
                "belt": "BLACK",
                "club": { "is": { "city": "Leeds" } },
                "entries": { "none": {} },
                "OR": [{ "weight": { "lt": 60 } }, { "weight": null }]
            }),
            "where",
        )
        .unwrap();

        assert_eq!(filter.conditions.len(), 5);
        let has = |pred: &dyn Fn(&Condition) -> bool| filter.conditions.iter().any(pred);
        assert!(has(&|c| matches!(c, Condition::Relation { relation, filter: RelationFilter::Is(Some(_)) } if relation == "club")));
        assert!(has(&|c| matches!(c, Condition::Relation { relation, filter: RelationFilter::None(f) } if relation == "entries" && f.is_empty())));
        assert!(has(&|c| matches!(c, Condition::Or(branches) if branches.len() == 2)));
        assert!(has(&|c| matches!(c, Condition::Field { field, filter } if field == "lastName" && filter.mode == QueryMode::Insensitive)));
        assert!(has(&|c| matches!(c, Condition::Field { field, filter } if field == "belt" && filter.ops == vec![FieldOp::Equals(Value::from("BLACK"))])));
    }

    #[test]
    fn test_parse_relation_is_null() {
        let filter = parse_filter(&json!({ "weightClass": { "is": null } }), "").unwrap();
        assert_eq!(
            filter.conditions,
            vec![Condition::Relation {
                relation: "weightClass".into(),
                filter: RelationFilter::Is(None),
            }]
        );
    }

    #[test]
    fn test_parse_unknown_operator() {
        let err = parse_filter(&json!({ "name": { "like": "%a%" } }), "where").unwrap_err();
        assert_eq!(err, Error::invalid("where.name.like", "unknown operator"));
    }

    #[test]
    fn test_parse_order_by_forms() {
        let order = parse_order_by(
            &json!([
                { "lastName": "asc" },
                { "weight": { "sort": "desc", "nulls": "last" } },
                { "club": { "name": "asc" } },
                { "entries": { "_count": "desc" } }
            ]),
            "orderBy",
        )
        .unwrap();

        assert_eq!(
            order,
            vec![
                OrderBy::asc("lastName"),
                OrderBy::desc("weight").with_nulls(NullsOrder::Last),
                OrderBy::relation("club", "name"),
                OrderBy::relation_count("entries").with_order(SortOrder::Desc),
            ]
        );
    }

    #[test]
    fn test_parse_order_by_rejects_multi_key_object() {
        let err = parse_order_by(&json!({ "a": "asc", "b": "desc" }), "orderBy").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_parse_find_args_with_include() {
        let args = parse_find_args(
            &json!({
                "where": { "clubId": 1 },
                "take": -3,
                "cursor": { "id": 10 },
                "include": { "entries": { "take": 2, "orderBy": { "createdAt": "desc" } }, "club": true },
                "omit": { "email": true }
            }),
            "",
        )
        .unwrap();

        assert_eq!(args.take, Some(-3));
        assert_eq!(args.cursor, Some(UniqueWhere::by("id", 10)));
        assert_eq!(args.selection.omit, vec!["email".to_string()]);
        match &args.selection.shape {
            SelectionShape::Include(relations) => {
                assert_eq!(relations.len(), 2);
                let entries = relations.iter().find(|(name, _)| name == "entries").unwrap();
                assert_eq!(entries.1.take, Some(2));
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_parse_select_and_include_conflict() {
        let err = parse_find_args(
            &json!({ "select": { "id": true }, "include": { "club": true } }),
            "",
        )
        .unwrap_err();
        assert_eq!(err, Error::SelectAndInclude);
    }

    #[test]
    fn test_parse_composite_unique() {
        let unique =
            parse_unique(&json!({ "clubId_name": { "clubId": 2, "name": "Juniors" } }), "where")
                .unwrap();
        assert_eq!(unique.get("clubId"), Some(&Value::Int(2)));
        assert_eq!(unique.get("name"), Some(&Value::from("Juniors")));
    }

    #[test]
    fn test_parse_data_operations() {
        let data = parse_data(
            &json!({
                "seed": { "increment": 1 },
                "status": "CONFIRMED",
                "weightClass": { "disconnect": true },
                "athlete": { "connect": { "id": 3 } }
            }),
            "data",
        )
        .unwrap();
        assert_eq!(data.get("seed"), Some(&DataValue::Increment(Value::Int(1))));
        assert_eq!(data.get("status"), Some(&DataValue::Set(Value::from("CONFIRMED"))));
        assert_eq!(data.get("weightClass"), Some(&DataValue::Disconnect));
        assert_eq!(
            data.get("athlete"),
            Some(&DataValue::Connect(UniqueWhere::by("id", 3)))
        );
    }

    #[test]
    fn test_parse_group_by() {
        let args = parse_group_by_args(
            &json!({
                "by": ["gender"],
                "_avg": { "weight": true },
                "_count": { "_all": true },
                "having": { "weight": { "_avg": { "gt": 60 } } },
                "orderBy": [{ "_avg": { "weight": "desc" } }, { "gender": "asc" }]
            }),
            "",
        )
        .unwrap();

        assert_eq!(args.by, vec!["gender".to_string()]);
        assert!(args.aggregations.contains(&Aggregation::avg("weight")));
        assert!(args.aggregations.contains(&Aggregation::count()));
        assert_eq!(
            args.order_by,
            vec![
                GroupOrderBy::aggregate(Aggregation::avg("weight"), SortOrder::Desc),
                GroupOrderBy::field("gender", SortOrder::Asc),
            ]
        );
        let having = args.having.unwrap();
        assert!(matches!(
            &having.conditions[0],
            HavingCondition::Aggregate { aggregation, .. } if *aggregation == Aggregation::avg("weight")
        ));
    }

    #[test]
    fn test_parse_operation_create_many() {
        let op = parse_operation(
            "User",
            OperationKind::CreateMany,
            &json!({
                "data": [{ "email": "a@x.io", "name": "A" }, { "email": "b@x.io", "name": "B" }],
                "skipDuplicates": true
            }),
        )
        .unwrap();
        match op {
            Operation::CreateMany { entity, args } => {
                assert_eq!(entity, "User");
                assert_eq!(args.data.len(), 2);
                assert!(args.skip_duplicates);
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn test_parse_operation_missing_where() {
        let err = parse_operation("Athlete", OperationKind::FindUnique, &json!({})).unwrap_err();
        assert_eq!(err, Error::invalid("where", "missing required argument"));
    }
}
