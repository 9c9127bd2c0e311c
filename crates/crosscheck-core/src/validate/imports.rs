//! Import checks: missing definitions and artifact-level import cycles.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::warn;

use crate::errors::ConsistencyResult;
use crate::guards::{MAX_CYCLES_PER_COMPONENT, MAX_CYCLE_SEARCH_STEPS};
use crate::index::{CrossArtifactIndex, Resolution};
use crate::models::{Issue, IssueCategory, IssueLocation, Location, Reference, ReferenceKind};
use crate::validate::naming::group_references;
use crate::validate::severity::{classify, Ambiguity, Resolvability};
use crate::validate::Validator;

pub struct ImportValidator;

/// Artifact import graph. Each edge remembers where the first import
/// creating it sits.
pub struct ImportGraph {
    graph: DiGraph<String, Location>,
    nodes: HashMap<String, NodeIndex>,
}

/// `from pkg import mod` names a module of the batch rather than a symbol.
fn submodule_target<'a>(index: &'a CrossArtifactIndex, reference: &Reference) -> Option<&'a str> {
    let module = reference.module.as_deref()?;
    index.module_target(
        &format!("{module}.{}", reference.referenced_name),
        &reference.referencing_artifact_id,
    )
}

impl ImportGraph {
    /// Edge A→B when A imports a name whose canonical definition lives in B,
    /// or a module path that maps to B.
    pub fn build(index: &CrossArtifactIndex) -> Self {
        let mut graph: DiGraph<String, Location> = DiGraph::new();
        let mut nodes = HashMap::new();
        for artifact_id in index.artifact_ids() {
            nodes.insert(artifact_id.to_string(), graph.add_node(artifact_id.to_string()));
        }
        let mut this = Self { graph, nodes };

        for reference in index.references().iter().filter(|r| r.kind == ReferenceKind::Import) {
            let from = reference.referencing_artifact_id.as_str();
            let by_definition = index
                .resolve(&reference.referenced_name, ReferenceKind::Import)
                .canonical()
                .map(|s| s.defining_artifact_id.clone());
            let target = by_definition
                .or_else(|| submodule_target(index, reference).map(str::to_string))
                .or_else(|| {
                    reference
                        .module
                        .as_deref()
                        .and_then(|m| index.module_target(m, from))
                        .map(str::to_string)
                });
            if let Some(to) = target {
                this.add_edge(from, &to, reference.location);
            }
        }
        for import in index.module_imports() {
            let from = import.referencing_artifact_id.as_str();
            if let Some(to) = index.module_target(&import.module, from) {
                let to = to.to_string();
                this.add_edge(from, &to, import.location);
            }
        }
        this
    }

    fn add_edge(&mut self, from: &str, to: &str, location: Location) {
        if from == to {
            return;
        }
        let (Some(&a), Some(&b)) = (self.nodes.get(from), self.nodes.get(to)) else {
            return;
        };
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, location);
        }
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.nodes.get(from), self.nodes.get(to)) {
            (Some(&a), Some(&b)) => self.graph.find_edge(a, b).is_some(),
            _ => false,
        }
    }

    /// Elementary cycles, each as `(artifact_id, location of its import of
    /// the next member)` pairs starting from the earliest artifact in batch
    /// order. Cycles are searched per strongly connected component, and at
    /// most [`MAX_CYCLES_PER_COMPONENT`] are listed for each.
    pub fn cycles(&self) -> Vec<Vec<(String, Location)>> {
        let mut cycles = Vec::new();
        let mut components = tarjan_scc(&self.graph);
        components.retain(|c| c.len() > 1);
        for component in &mut components {
            component.sort();
        }
        components.sort();

        for component in components {
            let found = self.component_cycles(&component);
            if found.len() == MAX_CYCLES_PER_COMPONENT {
                warn!(
                    "Import cycle listing truncated at {} for a component of {} artifacts",
                    MAX_CYCLES_PER_COMPONENT,
                    component.len()
                );
            }
            for path in found {
                let members: Vec<(String, Location)> = path
                    .iter()
                    .zip(path.iter().cycle().skip(1))
                    .filter_map(|(&node, &next)| {
                        let edge = self.graph.find_edge(node, next)?;
                        Some((self.graph.node_weight(node)?.clone(), *self.graph.edge_weight(edge)?))
                    })
                    .collect();
                cycles.push(members);
            }
        }
        cycles
    }

    /// Backtracking search: each cycle is found from its lowest node, and
    /// only nodes above that start are visited, so no rotation repeats.
    fn component_cycles(&self, component: &[NodeIndex]) -> Vec<Vec<NodeIndex>> {
        let mut found = Vec::new();
        let mut steps = 0usize;
        for &start in component {
            let mut path = vec![start];
            let mut stack = vec![self.successors(start, start, component)];
            while let Some(frontier) = stack.last_mut() {
                steps += 1;
                if found.len() >= MAX_CYCLES_PER_COMPONENT || steps > MAX_CYCLE_SEARCH_STEPS {
                    return found;
                }
                match frontier.pop() {
                    Some(next) if next == start => found.push(path.clone()),
                    Some(next) if !path.contains(&next) => {
                        path.push(next);
                        stack.push(self.successors(next, start, component));
                    }
                    Some(_) => {}
                    None => {
                        stack.pop();
                        path.pop();
                    }
                }
            }
        }
        found
    }

    /// Successors of `node` inside the component, never below `start`,
    /// reversed so popping yields them in ascending order.
    fn successors(&self, node: NodeIndex, start: NodeIndex, component: &[NodeIndex]) -> Vec<NodeIndex> {
        let mut next: Vec<NodeIndex> = self
            .graph
            .neighbors(node)
            .filter(|n| *n >= start && component.binary_search(n).is_ok())
            .collect();
        next.sort_unstable_by(|a, b| b.cmp(a));
        next
    }
}

impl ImportValidator {
    fn missing_definitions(&self, index: &CrossArtifactIndex) -> Vec<Issue> {
        let allow = index.allow_list();
        let groups = group_references(index, |r| {
            r.kind == ReferenceKind::Import
                && !allow.allows_name(&r.referenced_name)
                && !r.module.as_deref().is_some_and(|m| allow.allows_module(m))
        });

        let mut issues = Vec::new();
        for ((artifact_id, name), references) in groups {
            // Near-duplicates are naming issues, not missing definitions.
            if index.resolve(name, ReferenceKind::Import) != Resolution::Unresolved
                || references.iter().any(|r| submodule_target(index, r).is_some())
            {
                continue;
            }
            let module = references
                .first()
                .and_then(|r| r.module.as_deref())
                .unwrap_or_default();
            let from = if module.is_empty() {
                String::new()
            } else {
                format!(" from `{module}`")
            };
            let locations = references
                .iter()
                .map(|r| IssueLocation::new(artifact_id, r.location))
                .collect();
            issues.push(Issue::new(
                IssueCategory::MissingDefinition,
                classify(IssueCategory::MissingDefinition, Resolvability::Unresolvable, Ambiguity::Unique),
                name,
                format!("`{name}` is imported{from} but defined in no artifact of the batch"),
                locations,
            ));
        }
        issues
    }

    fn import_cycles(&self, index: &CrossArtifactIndex) -> Vec<Issue> {
        let graph = ImportGraph::build(index);
        let mut issues = Vec::new();
        for members in graph.cycles() {
            let ids: Vec<String> = members.iter().map(|(id, _)| id.clone()).collect();
            let mut route = ids.clone();
            route.extend(ids.first().cloned());
            let locations = members
                .iter()
                .map(|(id, location)| IssueLocation::new(id.as_str(), *location))
                .collect();
            issues.push(
                Issue::new(
                    IssueCategory::ImportCycle,
                    classify(IssueCategory::ImportCycle, Resolvability::Unresolvable, Ambiguity::Unique),
                    route.join(" -> "),
                    format!("Import cycle between artifacts: {}", route.join(" -> ")),
                    locations,
                )
                .with_artifacts(ids),
            );
        }
        issues
    }
}

impl Validator for ImportValidator {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn validate(&self, index: &CrossArtifactIndex) -> ConsistencyResult<Vec<Issue>> {
        let mut issues = self.missing_definitions(index);
        issues.extend(self.import_cycles(index));
        Ok(issues)
    }
}
