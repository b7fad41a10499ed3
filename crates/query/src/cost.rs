//! Static cost and depth analysis
//!
//! An operation is priced before any resolver runs. Scalars cost
//! `scalar_cost`, object fields `object_cost` plus their children, and list
//! fields multiply their children by the requested page size.

use crate::ast::{
    Field, FragmentDefinition, InputValue, OperationDefinition, Selection, SelectionSet,
};
use crate::schema::Schema;
use gazette_core::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;

/// Arguments whose value multiplies the cost of a list field's children
pub const MULTIPLIER_ARGUMENTS: &[&str] = &["limit", "first"];

/// How introspection root fields are priced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrospectionPolicy {
    /// Free and depth-neutral
    Exempt,
    /// Flat cost, counted as a single level of depth
    FixedCost(u64),
}

impl Default for IntrospectionPolicy {
    fn default() -> Self {
        IntrospectionPolicy::FixedCost(1000)
    }
}

/// Limits and weights used by [`estimate`] and [`accept`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostPolicy {
    pub max_cost: u64,
    pub max_depth: u32,
    pub scalar_cost: u64,
    pub object_cost: u64,
    pub default_list_size: u64,
    pub max_list_size: u64,
    pub introspection: IntrospectionPolicy,
}

impl Default for CostPolicy {
    fn default() -> Self {
        Self {
            max_cost: 5000,
            max_depth: 10,
            scalar_cost: 1,
            object_cost: 2,
            default_list_size: 10,
            max_list_size: 100,
            introspection: IntrospectionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub cost: u64,
    pub depth: u32,
}

impl CostEstimate {
    fn merge(self, other: CostEstimate) -> CostEstimate {
        CostEstimate {
            cost: self.cost.saturating_add(other.cost),
            depth: self.depth.max(other.depth),
        }
    }
}

/// Price `operation` without executing it.
///
/// Fragments are expanded in place, each priced once per parent type. A
/// fragment that spreads itself, directly or not, is rejected as malformed.
pub fn estimate(
    operation: &OperationDefinition,
    fragments: &HashMap<String, FragmentDefinition>,
    schema: &Schema,
    variables: &Map<String, Value>,
    policy: &CostPolicy,
) -> Result<CostEstimate, ApiError> {
    let Some(root) = schema.root_type(operation.kind) else {
        return Err(ApiError::malformed(
            format!("Schema does not support {} operations", operation.kind),
            Some(operation.location),
        ));
    };
    let estimator = Estimator {
        fragments,
        schema,
        variables,
        policy,
        priced: RefCell::new(HashMap::new()),
    };
    let mut active = Vec::new();
    estimator.selection_set(&operation.selection_set, &root.name, true, &mut active)
}

/// Admit or reject an estimate. Depth is checked before cost.
pub fn accept(estimate: &CostEstimate, policy: &CostPolicy) -> Result<(), ApiError> {
    if estimate.depth > policy.max_depth {
        return Err(ApiError::DepthLimit {
            measured: u64::from(estimate.depth),
            limit: u64::from(policy.max_depth),
        });
    }
    if estimate.cost > policy.max_cost {
        return Err(ApiError::ComplexityLimit {
            measured: estimate.cost,
            limit: policy.max_cost,
        });
    }
    Ok(())
}

struct Estimator<'a> {
    fragments: &'a HashMap<String, FragmentDefinition>,
    schema: &'a Schema,
    variables: &'a Map<String, Value>,
    policy: &'a CostPolicy,
    /// Fragment prices keyed by name, parent type and root position
    priced: RefCell<HashMap<(&'a str, String, bool), CostEstimate>>,
}

impl<'a> Estimator<'a> {
    fn selection_set(
        &self,
        selection_set: &'a SelectionSet,
        parent: &str,
        is_root: bool,
        active: &mut Vec<&'a str>,
    ) -> Result<CostEstimate, ApiError> {
        let mut total = CostEstimate::default();

        for selection in selection_set {
            let part = match selection {
                Selection::Field(field) => {
                    if field.name == "__typename" {
                        continue;
                    }
                    if is_root && Schema::is_introspection_field(&field.name) {
                        match self.policy.introspection {
                            IntrospectionPolicy::Exempt => CostEstimate::default(),
                            IntrospectionPolicy::FixedCost(cost) => CostEstimate { cost, depth: 1 },
                        }
                    } else {
                        let Some(definition) = self.schema.field(parent, &field.name) else {
                            continue;
                        };
                        let named = definition.ty.named();
                        if self.schema.is_leaf(named) {
                            CostEstimate {
                                cost: self.policy.scalar_cost,
                                depth: 0,
                            }
                        } else {
                            let children =
                                self.selection_set(&field.selection_set, named, false, active)?;
                            let children_cost = if definition.ty.is_list() {
                                children.cost.saturating_mul(self.multiplier(field))
                            } else {
                                children.cost
                            };
                            CostEstimate {
                                cost: self.policy.object_cost.saturating_add(children_cost),
                                depth: children.depth.saturating_add(1),
                            }
                        }
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let Some(fragment) = self.fragments.get(&spread.name) else {
                        continue;
                    };
                    let key = (fragment.name.as_str(), parent.to_string(), is_root);
                    let known = self.priced.borrow().get(&key).copied();
                    if let Some(known) = known {
                        total = total.merge(known);
                        continue;
                    }
                    if active.contains(&fragment.name.as_str()) {
                        return Err(ApiError::malformed(
                            format!("Cannot spread fragment \"{}\" within itself", spread.name),
                            Some(spread.location),
                        ));
                    }
                    active.push(fragment.name.as_str());
                    let part =
                        self.selection_set(&fragment.selection_set, parent, is_root, active)?;
                    active.pop();
                    self.priced.borrow_mut().insert(key, part);
                    part
                }
                Selection::InlineFragment(inline) => {
                    self.selection_set(&inline.selection_set, parent, is_root, active)?
                }
            };
            total = total.merge(part);
        }

        Ok(total)
    }

    fn multiplier(&self, field: &Field) -> u64 {
        let requested = MULTIPLIER_ARGUMENTS
            .iter()
            .filter_map(|name| field.argument(name))
            .find_map(|value| match value {
                InputValue::Int(n) => Some(*n),
                InputValue::Variable(var) => self.variables.get(var).and_then(Value::as_i64),
                _ => None,
            });

        match requested {
            Some(n) => u64::try_from(n.max(1))
                .unwrap_or(1)
                .min(self.policy.max_list_size),
            None => self.policy.default_list_size,
        }
    }
}
