//! Filter compilation: validates caller filters against the schema.

use ormkit_proto::{
    Aggregation, AggregateFunction, Condition, FieldFilter, FieldOp, Filter, QueryMode,
    RelationFilter, UniqueWhere, Value,
};

use super::predicate::{
    ComparisonOp, FieldComparison, Operand, PredicateNode, Quantifier, RelationPredicate, UniqueKey,
};
use crate::error::FilterError;
use crate::schema::{EntityDefinition, FieldDefinition, Member, RelationDefinition, ScalarKind, SchemaRegistry};

/// What a comparison is checked against: a field, or an aggregate of one.
#[derive(Debug, Clone)]
pub(crate) struct Target<'a> {
    pub entity: &'a str,
    pub name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
    pub range: bool,
    pub variants: Option<&'a [String]>,
}

impl<'a> Target<'a> {
    pub fn field(
        registry: &'a SchemaRegistry,
        entity: &'a EntityDefinition,
        field: &'a FieldDefinition,
    ) -> Self {
        Self {
            entity: &entity.name,
            name: field.name.clone(),
            kind: field.kind.clone(),
            nullable: field.nullable,
            range: field.supports_range(),
            variants: registry.variants_of(&field.kind),
        }
    }

    /// The value domain of an aggregate. `field` is `None` only for `_count._all`.
    pub fn aggregate(
        registry: &'a SchemaRegistry,
        entity: &'a EntityDefinition,
        aggregation: &Aggregation,
        field: Option<&'a FieldDefinition>,
    ) -> Self {
        let (kind, nullable, range, variants) = match (aggregation.function, field) {
            (AggregateFunction::Count, _) | (_, None) => (ScalarKind::Int, false, true, None),
            (AggregateFunction::Avg, Some(_)) => (ScalarKind::Float, true, true, None),
            (AggregateFunction::Sum, Some(f)) => (f.kind.clone(), true, true, None),
            (_, Some(f)) => (
                f.kind.clone(),
                true,
                f.supports_range(),
                registry.variants_of(&f.kind),
            ),
        };
        Self {
            entity: &entity.name,
            name: aggregation.label(),
            kind,
            nullable,
            range,
            variants,
        }
    }

    fn invalid_operator(&self, operator: &str) -> FilterError {
        FilterError::InvalidOperator {
            entity: self.entity.to_string(),
            field: self.name.clone(),
            operator: operator.to_string(),
            kind: self.kind.to_string(),
        }
    }

    fn invalid_value(&self, message: impl Into<String>) -> FilterError {
        FilterError::InvalidValue {
            entity: self.entity.to_string(),
            field: self.name.clone(),
            message: message.into(),
        }
    }

    fn coerce(&self, value: &Value) -> Result<Value, FilterError> {
        self.kind
            .coerce(value, self.variants)
            .map_err(|message| self.invalid_value(message))
    }

    fn coerce_present(&self, value: &Value, operator: &str) -> Result<Value, FilterError> {
        if value.is_null() {
            return Err(self.invalid_value(format!("'{operator}' does not accept null")));
        }
        self.coerce(value)
    }
}

/// Compiles caller filters into [`PredicateNode`] trees.
pub struct FilterCompiler<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Compile a `where` filter for `entity`.
    pub fn compile(&self, entity: &str, filter: &Filter) -> Result<PredicateNode, FilterError> {
        let entity = self.registry.require(entity)?;
        self.compile_filter(entity, filter)
    }

    /// Compile an optional filter; absent filters match every row.
    pub fn compile_optional(
        &self,
        entity: &str,
        filter: Option<&Filter>,
    ) -> Result<PredicateNode, FilterError> {
        match filter {
            Some(filter) => self.compile(entity, filter),
            None => {
                self.registry.require(entity)?;
                Ok(PredicateNode::always())
            }
        }
    }

    /// Resolve a unique filter to exactly one declared unique key.
    pub fn compile_unique(&self, entity: &str, unique: &UniqueWhere) -> Result<UniqueKey, FilterError> {
        let def = self.registry.require(entity)?;
        let supplied: Vec<String> = unique.fields.iter().map(|(name, _)| name.clone()).collect();

        for name in &supplied {
            if def.field(name).is_none() {
                return Err(FilterError::UnknownField {
                    entity: def.name.clone(),
                    field: name.clone(),
                });
            }
        }

        let keys = def.unique_keys();
        let matched = keys.iter().find(|key| {
            key.fields.len() == supplied.len() && key.fields.iter().all(|f| supplied.contains(f))
        });
        let Some(key) = matched else {
            let overlap = |fields: &[String]| fields.iter().filter(|f| supplied.contains(f)).count();
            let closest = keys
                .iter()
                .filter(|key| overlap(&key.fields) > 0)
                .max_by_key(|key| (overlap(&key.fields), std::cmp::Reverse(key.fields.len())))
                .or_else(|| keys.first())
                .map(|key| key.fields.clone())
                .unwrap_or_default();
            return Err(FilterError::IncompleteKey {
                entity: def.name.clone(),
                supplied,
                closest,
            });
        };

        let mut fields = Vec::with_capacity(key.fields.len());
        for name in &key.fields {
            let field = def.field(name).ok_or_else(|| FilterError::UnknownField {
                entity: def.name.clone(),
                field: name.clone(),
            })?;
            let target = Target::field(self.registry, def, field);
            let raw = unique.get(name).unwrap_or(&Value::Null);
            fields.push((name.clone(), target.coerce_present(raw, "equals")?));
        }

        Ok(UniqueKey {
            entity: def.name.clone(),
            name: key.name.clone(),
            fields,
        })
    }

    fn compile_filter(
        &self,
        entity: &EntityDefinition,
        filter: &Filter,
    ) -> Result<PredicateNode, FilterError> {
        let nodes = filter
            .conditions
            .iter()
            .map(|condition| self.compile_condition(entity, condition))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PredicateNode::all(nodes))
    }

    fn compile_all(
        &self,
        entity: &EntityDefinition,
        filters: &[Filter],
    ) -> Result<Vec<PredicateNode>, FilterError> {
        filters
            .iter()
            .map(|filter| self.compile_filter(entity, filter))
            .collect()
    }

    fn compile_condition(
        &self,
        entity: &EntityDefinition,
        condition: &Condition,
    ) -> Result<PredicateNode, FilterError> {
        match condition {
            Condition::And(filters) => Ok(PredicateNode::And(self.compile_all(entity, filters)?)),
            Condition::Or(filters) => Ok(PredicateNode::Or(self.compile_all(entity, filters)?)),
            // NOT [a, b] holds when no branch holds.
            Condition::Not(filters) => Ok(PredicateNode::And(
                self.compile_all(entity, filters)?
                    .into_iter()
                    .map(|node| PredicateNode::Not(Box::new(node)))
                    .collect(),
            )),
            Condition::Field { field, filter } => match entity.member(field) {
                Some(Member::Field(def)) => {
                    let target = Target::field(self.registry, entity, def);
                    self.compile_comparison(&target, &Operand::Column(field.clone()), filter)
                }
                Some(Member::Relation(_)) => Err(FilterError::InvalidOperator {
                    entity: entity.name.clone(),
                    field: field.clone(),
                    operator: filter.ops.first().map(FieldOp::name).unwrap_or("equals").to_string(),
                    kind: "relation".to_string(),
                }),
                None => Err(unknown_field(entity, field)),
            },
            Condition::Relation { relation, filter } => match entity.member(relation) {
                Some(Member::Relation(def)) => self.compile_relation(entity, def, filter),
                Some(Member::Field(def)) => Err(FilterError::InvalidOperator {
                    entity: entity.name.clone(),
                    field: relation.clone(),
                    operator: filter.name().to_string(),
                    kind: def.kind.to_string(),
                }),
                None => Err(unknown_field(entity, relation)),
            },
        }
    }

    fn compile_relation(
        &self,
        entity: &EntityDefinition,
        relation: &RelationDefinition,
        filter: &RelationFilter,
    ) -> Result<PredicateNode, FilterError> {
        let target = self.registry.require(&relation.target)?;
        let (quantifier, inner) = match (relation.is_to_many(), filter) {
            (false, RelationFilter::Is(Some(f))) => (Quantifier::Exists, Some(f)),
            (false, RelationFilter::Is(None)) => (Quantifier::NotExists, None),
            (false, RelationFilter::IsNot(Some(f))) => (Quantifier::NotExists, Some(f)),
            (false, RelationFilter::IsNot(None)) => (Quantifier::Exists, None),
            (true, RelationFilter::Every(f)) => (Quantifier::Every, Some(f)),
            (true, RelationFilter::Some(f)) => (Quantifier::Exists, Some(f)),
            (true, RelationFilter::None(f)) => (Quantifier::NotExists, Some(f)),
            (to_many, other) => {
                return Err(FilterError::InvalidOperator {
                    entity: entity.name.clone(),
                    field: relation.name.clone(),
                    operator: other.name().to_string(),
                    kind: if to_many { "to-many relation" } else { "to-one relation" }.to_string(),
                })
            }
        };

        let predicate = match inner {
            Some(f) if !f.is_empty() => Some(Box::new(self.compile_filter(target, f)?)),
            Some(_) if quantifier == Quantifier::Every => Some(Box::new(PredicateNode::always())),
            _ => None,
        };

        Ok(PredicateNode::Relation(RelationPredicate {
            relation: relation.name.clone(),
            target: target.name.clone(),
            local: relation.local_columns().to_vec(),
            remote: relation.remote_columns().to_vec(),
            quantifier,
            predicate,
        }))
    }

    /// Compile the operators of one field filter against `target`.
    pub(crate) fn compile_comparison(
        &self,
        target: &Target<'_>,
        operand: &Operand,
        filter: &FieldFilter,
    ) -> Result<PredicateNode, FilterError> {
        self.compile_ops(target, operand, filter, false, false)
    }

    fn compile_ops(
        &self,
        target: &Target<'_>,
        operand: &Operand,
        filter: &FieldFilter,
        insensitive: bool,
        negated: bool,
    ) -> Result<PredicateNode, FilterError> {
        let insensitive = insensitive || filter.mode == QueryMode::Insensitive;
        if insensitive && !target.kind.is_text() {
            return Err(target.invalid_operator("mode"));
        }

        let compare = |op: ComparisonOp| {
            PredicateNode::Field(FieldComparison {
                operand: operand.clone(),
                op,
                insensitive,
            })
        };

        let mut nodes = Vec::with_capacity(filter.ops.len());
        for op in &filter.ops {
            let node = match op {
                FieldOp::Equals(value) => {
                    let value = target.coerce(value)?;
                    if value.is_null() {
                        if !target.nullable && !negated {
                            return Err(target.invalid_value("field is not nullable"));
                        }
                        compare(ComparisonOp::IsNull)
                    } else {
                        compare(ComparisonOp::Equals(value))
                    }
                }
                FieldOp::Not(inner) => PredicateNode::Not(Box::new(
                    self.compile_ops(target, operand, inner, insensitive, true)?,
                )),
                FieldOp::In(values) => compare(ComparisonOp::In(coerce_list(target, values, op)?)),
                FieldOp::NotIn(values) => {
                    compare(ComparisonOp::NotIn(coerce_list(target, values, op)?))
                }
                FieldOp::Lt(value) => compare(ComparisonOp::Lt(coerce_range(target, value, op)?)),
                FieldOp::Lte(value) => compare(ComparisonOp::Lte(coerce_range(target, value, op)?)),
                FieldOp::Gt(value) => compare(ComparisonOp::Gt(coerce_range(target, value, op)?)),
                FieldOp::Gte(value) => compare(ComparisonOp::Gte(coerce_range(target, value, op)?)),
                FieldOp::Contains(pattern) => {
                    require_text(target, op)?;
                    compare(ComparisonOp::Contains(pattern.clone()))
                }
                FieldOp::StartsWith(pattern) => {
                    require_text(target, op)?;
                    compare(ComparisonOp::StartsWith(pattern.clone()))
                }
                FieldOp::EndsWith(pattern) => {
                    require_text(target, op)?;
                    compare(ComparisonOp::EndsWith(pattern.clone()))
                }
            };
            nodes.push(node);
        }
        Ok(PredicateNode::all(nodes))
    }
}

fn unknown_field(entity: &EntityDefinition, field: &str) -> FilterError {
    FilterError::UnknownField {
        entity: entity.name.clone(),
        field: field.to_string(),
    }
}

fn coerce_list(target: &Target<'_>, values: &[Value], op: &FieldOp) -> Result<Vec<Value>, FilterError> {
    values
        .iter()
        .map(|value| target.coerce_present(value, op.name()))
        .collect()
}

fn coerce_range(target: &Target<'_>, value: &Value, op: &FieldOp) -> Result<Value, FilterError> {
    if !target.range {
        return Err(target.invalid_operator(op.name()));
    }
    target.coerce_present(value, op.name())
}

fn require_text(target: &Target<'_>, op: &FieldOp) -> Result<(), FilterError> {
    if target.kind.is_text() {
        Ok(())
    } else {
        Err(target.invalid_operator(op.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::registry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_logical_lists() {
        let registry = registry();
        let compiler = FilterCompiler::new(&registry);

        let and = compiler.compile("Athlete", &Filter::new().and(vec![])).unwrap();
        assert_eq!(and, PredicateNode::And(vec![]));

        let or = compiler.compile("Athlete", &Filter::new().or(vec![])).unwrap();
        assert_eq!(or, PredicateNode::Or(vec![]));

        let not = compiler.compile("Athlete", &Filter::new().not(vec![])).unwrap();
        assert!(not.is_always());
    }

    #[test]
    fn test_not_list_negates_each_branch() {
        let registry = registry();
        let compiler = FilterCompiler::new(&registry);
        let filter = Filter::new().not(vec![
            Filter::new().eq("belt", "BLACK"),
            Filter::new().eq("gender", "FEMALE"),
        ]);
        let PredicateNode::And(nodes) = compiler.compile("Athlete", &filter).unwrap() else {
            panic!("expected AND");
        };
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| matches!(n, PredicateNode::Not(_))));
    }

    #[test]
    fn test_values_coerced_to_field_kind() {
        let registry = registry();
        let compiler = FilterCompiler::new(&registry);
        let node = compiler
            .compile("Athlete", &Filter::new().field("weight", FieldFilter::gt(60)))
            .unwrap();
        let PredicateNode::Field(cmp) = node else {
            panic!("expected comparison");
        };
        assert_eq!(cmp.op, ComparisonOp::Gt(Value::Float(60.0)));
    }

    #[test]
    fn test_equals_null_on_nullable_field() {
        let registry = registry();
        let compiler = FilterCompiler::new(&registry);
        let node = compiler
            .compile("Athlete", &Filter::new().eq("email", Value::Null))
            .unwrap();
        assert!(matches!(
            node,
            PredicateNode::Field(FieldComparison { op: ComparisonOp::IsNull, .. })
        ));

        let err = compiler
            .compile("Athlete", &Filter::new().eq("firstName", Value::Null))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidValue { .. }));

        let not_null = compiler
            .compile("Athlete", &Filter::new().field("firstName", FieldFilter::is_not_null()))
            .unwrap();
        assert!(matches!(not_null, PredicateNode::Not(_)));
    }

    #[test]
    fn test_operator_kind_mismatches() {
        let registry = registry();
        let compiler = FilterCompiler::new(&registry);

        let err = compiler
            .compile("Athlete", &Filter::new().field("belt", FieldFilter::gt("BLUE")))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperator { ref operator, .. } if operator == "gt"));

        let err = compiler
            .compile("Athlete", &Filter::new().field("weight", FieldFilter::contains("6")))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperator { ref operator, .. } if operator == "contains"));

        let err = compiler
            .compile("Athlete", &Filter::new().eq("belt", "PURPLE"))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidValue { .. }));

        let err = compiler
            .compile("Athlete", &Filter::new().eq("nickname", "x"))
            .unwrap_err();
        assert!(matches!(err, FilterError::UnknownField { .. }));
    }

    #[test]
    fn test_relation_quantifiers() {
        let registry = registry();
        let compiler = FilterCompiler::new(&registry);

        let node = compiler
            .compile(
                "Club",
                &Filter::new().relation("athletes", RelationFilter::every(Filter::new().eq("belt", "BLACK"))),
            )
            .unwrap();
        let PredicateNode::Relation(rel) = node else {
            panic!("expected relation predicate");
        };
        assert_eq!(rel.quantifier, Quantifier::Every);
        assert_eq!(rel.target, "Athlete");
        assert_eq!(rel.local, vec!["id".to_string()]);
        assert_eq!(rel.remote, vec!["clubId".to_string()]);

        let node = compiler
            .compile("Entry", &Filter::new().relation("weightClass", RelationFilter::is_null()))
            .unwrap();
        assert!(matches!(
            node,
            PredicateNode::Relation(RelationPredicate { quantifier: Quantifier::NotExists, predicate: None, .. })
        ));

        let err = compiler
            .compile("Club", &Filter::new().relation("athletes", RelationFilter::is_null()))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperator { ref kind, .. } if kind == "to-many relation"));

        let err = compiler
            .compile("Athlete", &Filter::new().relation("club", RelationFilter::some(Filter::new())))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperator { ref kind, .. } if kind == "to-one relation"));
    }

    #[test]
    fn test_compile_unique_keys() {
        let registry = registry();
        let compiler = FilterCompiler::new(&registry);

        let key = compiler
            .compile_unique("Team", &UniqueWhere::by("name", "Red").and("clubId", 1))
            .unwrap();
        assert_eq!(key.name, "clubId_name");
        assert_eq!(
            key.fields,
            vec![
                ("clubId".to_string(), Value::Int(1)),
                ("name".to_string(), Value::from("Red")),
            ]
        );

        let err = compiler
            .compile_unique("Team", &UniqueWhere::by("clubId", 1))
            .unwrap_err();
        match err {
            FilterError::IncompleteKey { closest, .. } => {
                assert_eq!(closest, vec!["clubId".to_string(), "name".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = compiler
            .compile_unique("Athlete", &UniqueWhere::by("firstName", "Ana"))
            .unwrap_err();
        assert!(matches!(err, FilterError::IncompleteKey { .. }));
    }

    #[test]
    fn test_unknown_entity() {
        let registry = registry();
        let compiler = FilterCompiler::new(&registry);
        let err = compiler.compile("Referee", &Filter::new()).unwrap_err();
        assert!(matches!(err, FilterError::UnknownEntity { .. }));
    }
}
