//! Query planning: resolves find arguments into an [`ExecutionPlan`].
//!
//! The planner validates ordering, pagination and the include graph
//! against the schema, compiles filters and resolves the effective
//! selection of every level.

use std::collections::HashSet;

use ormkit_proto::{FindArgs, OrderBy, OrderTarget, SelectItem, Selection, SelectionShape, SortOrder};

use super::plan::{ExecutionPlan, IncludePlan, OrderKey, PlannedOrder, Window};
use crate::error::{Error, FilterError, PlanError};
use crate::filter::{FilterCompiler, PredicateNode, UniqueKey};
use crate::schema::{EntityDefinition, SchemaRegistry};

/// Plans reads against a schema registry.
pub struct QueryPlanner<'a> {
    registry: &'a SchemaRegistry,
    compiler: FilterCompiler<'a>,
    max_depth: usize,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(registry: &'a SchemaRegistry, max_depth: usize) -> Self {
        Self {
            registry,
            compiler: FilterCompiler::new(registry),
            max_depth,
        }
    }

    /// Plan a `findMany`-style read.
    pub fn plan(&self, entity: &str, args: &FindArgs) -> Result<ExecutionPlan, Error> {
        let def = self.registry.require(entity)?;
        let mut path = vec![def.name.clone()];
        let plan = self.plan_level(def, args, &mut path, 0)?;
        tracing::trace!(entity = %def.name, depth = plan.depth(), "planned read");
        Ok(plan)
    }

    /// Plan a read of the record identified by `key`.
    pub fn plan_unique(&self, key: &UniqueKey, selection: &Selection) -> Result<ExecutionPlan, Error> {
        self.plan_selected(&key.entity, key.predicate(), selection)
    }

    /// Plan a read of the rows matching `predicate`, returned with `selection`.
    pub fn plan_selected(
        &self,
        entity: &str,
        predicate: PredicateNode,
        selection: &Selection,
    ) -> Result<ExecutionPlan, Error> {
        let def = self.registry.require(entity)?;
        let args = FindArgs::new().with_selection(selection.clone());
        let mut path = vec![def.name.clone()];
        let mut plan = self.plan_level(def, &args, &mut path, 0)?;
        plan.predicate = predicate;
        Ok(plan)
    }

    fn plan_level(
        &self,
        entity: &EntityDefinition,
        args: &FindArgs,
        path: &mut Vec<String>,
        depth: usize,
    ) -> Result<ExecutionPlan, Error> {
        let predicate = self.compiler.compile_optional(&entity.name, args.filter.as_ref())?;
        let order = self.plan_order(entity, &args.order_by)?;
        let window = self.plan_window(entity, args, &order)?;
        let (output, requested) = resolve_selection(entity, &args.selection)?;

        let mut includes = Vec::with_capacity(requested.len());
        for (name, include_args) in requested {
            includes.push(self.plan_include(entity, &name, &include_args, path, depth)?);
        }

        let mut needed: HashSet<&str> = output.iter().map(String::as_str).collect();
        needed.extend(entity.primary_key.iter().map(String::as_str));
        for include in &includes {
            needed.extend(include.local.iter().map(String::as_str));
        }
        if let Window::Cursor { key, .. } = &window {
            needed.extend(key.fields.iter().map(|(name, _)| name.as_str()));
        }
        let columns = entity
            .fields
            .iter()
            .filter(|f| needed.contains(f.name.as_str()))
            .map(|f| f.name.clone())
            .collect();

        Ok(ExecutionPlan {
            entity: entity.name.clone(),
            columns,
            output,
            predicate,
            order,
            window,
            includes,
        })
    }

    fn plan_include(
        &self,
        entity: &EntityDefinition,
        name: &str,
        args: &FindArgs,
        path: &mut Vec<String>,
        depth: usize,
    ) -> Result<IncludePlan, Error> {
        let relation = entity.relation(name).ok_or_else(|| PlanError::UnknownRelation {
            entity: entity.name.clone(),
            relation: name.to_string(),
        })?;
        if depth + 1 > self.max_depth {
            return Err(PlanError::DepthExceeded {
                depth: depth + 1,
                max: self.max_depth,
            }
            .into());
        }
        if path.contains(&relation.target) {
            return Err(PlanError::CyclicInclude {
                path: format!("{} -> {}", path.join(" -> "), relation.target),
            }
            .into());
        }
        if !relation.is_to_many() && (args.has_window() || !args.order_by.is_empty()) {
            return Err(PlanError::ToOneWindow {
                relation: relation.name.clone(),
            }
            .into());
        }

        let target = self.registry.require(&relation.target)?;
        path.push(target.name.clone());
        let planned = self.plan_level(target, args, path, depth + 1);
        path.pop();
        let mut plan = planned?;

        // The included rows are grouped by their join columns.
        for column in relation.remote_columns() {
            if !plan.columns.contains(column) {
                plan.columns.push(column.clone());
            }
        }

        Ok(IncludePlan {
            relation: relation.name.clone(),
            to_many: relation.is_to_many(),
            local: relation.local_columns().to_vec(),
            remote: relation.remote_columns().to_vec(),
            plan,
        })
    }

    fn plan_order(
        &self,
        entity: &EntityDefinition,
        order_by: &[OrderBy],
    ) -> Result<Vec<PlannedOrder>, Error> {
        let mut planned = Vec::with_capacity(order_by.len() + entity.primary_key.len());
        for entry in order_by {
            let key = match &entry.target {
                OrderTarget::Field(field) => {
                    require_field(entity, field)?;
                    OrderKey::Column(field.clone())
                }
                OrderTarget::Relation { relation, field } => {
                    let rel = entity.relation(relation).ok_or_else(|| PlanError::UnknownRelation {
                        entity: entity.name.clone(),
                        relation: relation.clone(),
                    })?;
                    if rel.is_to_many() {
                        return Err(PlanError::InvalidOrder {
                            entity: entity.name.clone(),
                            target: format!("{relation}.{field}"),
                            reason: "to-many relations can only be ordered by _count".to_string(),
                        }
                        .into());
                    }
                    let target = self.registry.require(&rel.target)?;
                    require_field(target, field)?;
                    OrderKey::Joined {
                        relation: rel.name.clone(),
                        target: target.name.clone(),
                        local: rel.local_columns().to_vec(),
                        remote: rel.remote_columns().to_vec(),
                        field: field.clone(),
                    }
                }
                OrderTarget::RelationCount(relation) => {
                    let rel = entity.relation(relation).ok_or_else(|| PlanError::UnknownRelation {
                        entity: entity.name.clone(),
                        relation: relation.clone(),
                    })?;
                    if !rel.is_to_many() {
                        return Err(PlanError::InvalidOrder {
                            entity: entity.name.clone(),
                            target: format!("{relation}._count"),
                            reason: "_count applies to to-many relations only".to_string(),
                        }
                        .into());
                    }
                    OrderKey::RelationCount {
                        relation: rel.name.clone(),
                        target: rel.target.clone(),
                        local: rel.local_columns().to_vec(),
                        remote: rel.remote_columns().to_vec(),
                    }
                }
            };
            planned.push(PlannedOrder {
                key,
                order: entry.order,
                nulls: entry.nulls,
            });
        }

        // Primary key tiebreaker keeps row order deterministic.
        for column in &entity.primary_key {
            let present = planned
                .iter()
                .any(|o| matches!(&o.key, OrderKey::Column(c) if c == column));
            if !present {
                planned.push(PlannedOrder {
                    key: OrderKey::Column(column.clone()),
                    order: SortOrder::Asc,
                    nulls: None,
                });
            }
        }
        Ok(planned)
    }

    fn plan_window(
        &self,
        entity: &EntityDefinition,
        args: &FindArgs,
        order: &[PlannedOrder],
    ) -> Result<Window, Error> {
        let skip = args.skip.unwrap_or(0);
        let Some(cursor) = &args.cursor else {
            return Ok(Window::Offset {
                skip,
                take: args.take,
            });
        };
        if args.take == Some(0) {
            return Err(PlanError::InvalidTake.into());
        }
        let key = self.compiler.compile_unique(&entity.name, cursor)?;
        for planned in order {
            match &planned.key {
                OrderKey::Column(name) => {
                    if entity.field(name).is_some_and(|f| f.nullable) {
                        return Err(PlanError::UnsupportedCursorOrder {
                            key: name.clone(),
                            reason: "the field is nullable".to_string(),
                        }
                        .into());
                    }
                }
                other => {
                    return Err(PlanError::UnsupportedCursorOrder {
                        key: other.label(),
                        reason: "only fields of the queried entity can order a cursor".to_string(),
                    }
                    .into())
                }
            }
        }
        Ok(Window::Cursor {
            key,
            skip,
            take: args.take,
        })
    }
}

fn require_field(entity: &EntityDefinition, field: &str) -> Result<(), FilterError> {
    match entity.field(field) {
        Some(_) => Ok(()),
        None => Err(FilterError::UnknownField {
            entity: entity.name.clone(),
            field: field.to_string(),
        }),
    }
}

/// Resolve a selection into output fields (declaration order) and the
/// relations to include.
fn resolve_selection(
    entity: &EntityDefinition,
    selection: &Selection,
) -> Result<(Vec<String>, Vec<(String, FindArgs)>), Error> {
    let mut selected: HashSet<&str> = HashSet::new();
    let mut includes: Vec<(String, FindArgs)> = Vec::new();
    let mut include = |name: &str, args: FindArgs| {
        match includes.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = args,
            None => includes.push((name.to_string(), args)),
        }
    };

    match &selection.shape {
        SelectionShape::Scalars => selected.extend(entity.scalar_names()),
        SelectionShape::Include(relations) => {
            selected.extend(entity.scalar_names());
            for (name, args) in relations {
                include(name, args.clone());
            }
        }
        SelectionShape::Fields(items) => {
            for item in items {
                match item {
                    SelectItem::Field(name) => {
                        if let Some(field) = entity.field(name) {
                            selected.insert(field.name.as_str());
                        } else if entity.relation(name).is_some() {
                            include(name, FindArgs::default());
                        } else {
                            return Err(FilterError::UnknownField {
                                entity: entity.name.clone(),
                                field: name.clone(),
                            }
                            .into());
                        }
                    }
                    SelectItem::Relation(name, args) => include(name, args.clone()),
                }
            }
        }
    }

    for name in &selection.omit {
        if entity.field(name).is_none() {
            return Err(FilterError::UnknownField {
                entity: entity.name.clone(),
                field: name.clone(),
            }
            .into());
        }
        selected.remove(name.as_str());
    }

    let output = entity
        .fields
        .iter()
        .filter(|f| selected.contains(f.name.as_str()))
        .map(|f| f.name.clone())
        .collect();
    Ok((output, includes))
}
