//! Stage graph
//!
//! Builds a validated DAG out of stage declarations. Stages live in an arena
//! indexed by [`StageId`]; edges point from a stage to the stages it needs
//! (its parent and its copy sources).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::core::stage::{Stage, StageDef, StageId};
use crate::error::{EdgeKind, GraphError};

/// Validated stage graph
#[derive(Debug, Clone)]
pub struct StageGraph {
    stages: Vec<Stage>,
    by_name: HashMap<String, StageId>,
    order: Vec<StageId>,
}

impl StageGraph {
    /// Build and validate a graph from stage declarations
    ///
    /// Checks, in this order: unique names, resolvable references, no cycles.
    /// References may name stages declared later in the list.
    pub fn new(defs: Vec<StageDef>) -> Result<Self, GraphError> {
        let mut by_name = HashMap::with_capacity(defs.len());
        for (index, def) in defs.iter().enumerate() {
            if by_name.insert(def.name.clone(), StageId(index)).is_some() {
                return Err(GraphError::DuplicateStageName {
                    name: def.name.clone(),
                });
            }
        }

        let resolve = |stage: &str, reference: &str, edge: EdgeKind| {
            by_name
                .get(reference)
                .copied()
                .ok_or_else(|| GraphError::UnknownStageReference {
                    stage: stage.to_string(),
                    reference: reference.to_string(),
                    edge,
                })
        };

        let mut stages = Vec::with_capacity(defs.len());
        for (index, def) in defs.into_iter().enumerate() {
            let parent = def
                .from
                .as_deref()
                .map(|p| resolve(&def.name, p, EdgeKind::DeriveFrom))
                .transpose()?;
            let copy_sources = def
                .copy
                .iter()
                .map(|edge| resolve(&def.name, &edge.from, EdgeKind::CopyFrom))
                .collect::<Result<Vec<_>, _>>()?;

            stages.push(Stage {
                id: StageId(index),
                name: def.name.clone(),
                parent,
                copy_sources,
                build_type: def.build_type.clone().unwrap_or_default(),
                args: def.args.clone(),
                def,
            });
        }

        let mut graph = Self {
            stages,
            by_name,
            order: Vec::new(),
        };
        graph.order = graph.compute_order()?;
        graph.inherit_configuration();

        tracing::debug!(
            "Stage order: {}",
            graph
                .order
                .iter()
                .map(|id| graph.stage(*id).name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        Ok(graph)
    }

    /// Stages this stage needs: parent first, then copy sources
    fn dependencies(&self, id: StageId) -> impl Iterator<Item = StageId> + '_ {
        let stage = &self.stages[id.0];
        stage.parent.into_iter().chain(stage.copy_sources.iter().copied())
    }

    /// Kahn's algorithm; the ready set is a min-heap on declaration index so
    /// ties always resolve in declaration order.
    fn compute_order(&self) -> Result<Vec<StageId>, GraphError> {
        let count = self.stages.len();
        let mut pending = vec![0usize; count];
        let mut dependents: Vec<Vec<StageId>> = vec![Vec::new(); count];

        for stage in &self.stages {
            let unique: HashSet<StageId> = self.dependencies(stage.id).collect();
            pending[stage.id.0] = unique.len();
            for dep in unique {
                dependents[dep.0].push(stage.id);
            }
        }

        let mut ready: BinaryHeap<Reverse<StageId>> = pending
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| Reverse(StageId(i)))
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for dependent in &dependents[id.0] {
                pending[dependent.0] -= 1;
                if pending[dependent.0] == 0 {
                    ready.push(Reverse(*dependent));
                }
            }
        }

        if order.len() < count {
            let stuck: Vec<StageId> = (0..count)
                .map(StageId)
                .filter(|id| pending[id.0] > 0)
                .collect();
            return Err(GraphError::CyclicDependency {
                cycle: self.find_cycle(&stuck),
            });
        }

        Ok(order)
    }

    /// Locate one cycle among stages left over by the topological sort
    fn find_cycle(&self, stuck: &[StageId]) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        let mut path = Vec::new();

        for start in stuck {
            if visited.contains(start) {
                continue;
            }
            if let Some(cycle) = self.cycle_dfs(*start, &mut visited, &mut on_path, &mut path) {
                return cycle;
            }
        }

        // Unreachable for a graph that failed Kahn's algorithm
        stuck.iter().map(|id| self.stage(*id).name.clone()).collect()
    }

    fn cycle_dfs(
        &self,
        node: StageId,
        visited: &mut HashSet<StageId>,
        on_path: &mut HashSet<StageId>,
        path: &mut Vec<StageId>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        on_path.insert(node);
        path.push(node);

        for dep in self.dependencies(node) {
            if on_path.contains(&dep) {
                let start = path.iter().position(|id| *id == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|id| self.stage(*id).name.clone())
                    .collect();
                cycle.push(self.stage(dep).name.clone());
                return Some(cycle);
            }
            if !visited.contains(&dep) {
                if let Some(cycle) = self.cycle_dfs(dep, visited, on_path, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        on_path.remove(&node);
        None
    }

    /// Fill in build type and arguments from parents, in dependency order
    fn inherit_configuration(&mut self) {
        for index in 0..self.order.len() {
            let id = self.order[index];
            let Some(parent) = self.stages[id.0].parent else {
                continue;
            };
            let (parent_type, parent_args) = {
                let p = &self.stages[parent.0];
                (p.build_type.clone(), p.args.clone())
            };

            let stage = &mut self.stages[id.0];
            if stage.def.build_type.is_none() {
                stage.build_type = parent_type;
            }
            let mut args = parent_args;
            args.extend(stage.def.args.clone());
            stage.args = args;
        }
    }

    /// Stage by id
    pub fn stage(&self, id: StageId) -> &Stage {
        &self.stages[id.0]
    }

    /// Stage by name
    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.by_name.get(name).map(|id| self.stage(*id))
    }

    /// All stages in declaration order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the graph has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// One linearization consistent with every derive-from and copy-from edge
    pub fn topological_order(&self) -> Vec<&Stage> {
        self.order.iter().map(|id| self.stage(*id)).collect()
    }

    /// Derive-from chain above a stage, nearest parent first
    pub fn ancestors(&self, id: StageId) -> Vec<StageId> {
        let mut chain = Vec::new();
        let mut current = self.stage(id).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.stage(parent).parent;
        }
        chain
    }

    /// Graphviz rendering: derive edges solid, copy edges dashed
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph stages {\n");
        output.push_str("    rankdir=TB;\n");
        output.push_str("    node [shape=box];\n");
        output.push('\n');

        for stage in &self.stages {
            match stage.source() {
                Some(source) => output.push_str(&format!(
                    "    \"{}\" [label=\"{}\\n{} {}\"];\n",
                    stage.name, stage.name, source.name, stage.build_type
                )),
                None => output.push_str(&format!("    \"{}\";\n", stage.name)),
            }
        }
        output.push('\n');

        for stage in &self.stages {
            if let Some(parent) = stage.parent {
                output.push_str(&format!(
                    "    \"{}\" -> \"{}\" [style=solid, label=\"derive\"];\n",
                    self.stage(parent).name,
                    stage.name
                ));
            }
            for source in &stage.copy_sources {
                output.push_str(&format!(
                    "    \"{}\" -> \"{}\" [style=dashed, label=\"copy\"];\n",
                    self.stage(*source).name,
                    stage.name
                ));
            }
        }

        output.push_str("}\n");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stage::BuildType;
    use crate::test_utils::generators::stage_dag;
    use proptest::prelude::*;

    fn names(graph: &StageGraph) -> Vec<&str> {
        graph
            .topological_order()
            .into_iter()
            .map(|s| s.name.as_str())
            .collect()
    }

    #[test]
    fn test_simple_chain_order() {
        let graph = StageGraph::new(vec![
            StageDef::new("base"),
            StageDef::new("dev").derive_from("base"),
            StageDef::new("test").derive_from("dev"),
        ])
        .unwrap();

        assert_eq!(names(&graph), vec!["base", "dev", "test"]);
    }

    #[test]
    fn test_forward_reference_is_reordered() {
        let graph = StageGraph::new(vec![
            StageDef::new("deploy").derive_from("base").copy_from("build", &["/app"]),
            StageDef::new("build").derive_from("base"),
            StageDef::new("base"),
        ])
        .unwrap();

        assert_eq!(names(&graph), vec!["base", "build", "deploy"]);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let graph = StageGraph::new(vec![
            StageDef::new("base"),
            StageDef::new("zeta").derive_from("base"),
            StageDef::new("alpha").derive_from("base"),
            StageDef::new("mid").derive_from("base"),
        ])
        .unwrap();

        assert_eq!(names(&graph), vec!["base", "zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_duplicate_stage_name() {
        let err = StageGraph::new(vec![StageDef::new("base"), StageDef::new("base")]).unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateStageName {
                name: "base".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_parent_reference() {
        let err = StageGraph::new(vec![StageDef::new("dev").derive_from("missing")]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownStageReference {
                stage: "dev".to_string(),
                reference: "missing".to_string(),
                edge: EdgeKind::DeriveFrom,
            }
        );
    }

    #[test]
    fn test_unknown_copy_reference() {
        let err = StageGraph::new(vec![
            StageDef::new("base"),
            StageDef::new("deploy").copy_from("nowhere", &["/x"]),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownStageReference {
                edge: EdgeKind::CopyFrom,
                ..
            }
        ));
    }

    #[test]
    fn test_two_stage_cycle_is_reported() {
        let err = StageGraph::new(vec![
            StageDef::new("a").derive_from("b"),
            StageDef::new("b").derive_from("a"),
        ])
        .unwrap_err();

        let GraphError::CyclicDependency { cycle } = err else {
            panic!("expected a cycle error");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
    }

    #[test]
    fn test_self_copy_is_a_cycle() {
        let err = StageGraph::new(vec![StageDef::new("a").copy_from("a", &["/x"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::CyclicDependency {
                cycle: vec!["a".to_string(), "a".to_string()]
            }
        );
    }

    #[test]
    fn test_cycle_through_copy_edge() {
        let err = StageGraph::new(vec![
            StageDef::new("base"),
            StageDef::new("x").derive_from("base").copy_from("y", &["/out"]),
            StageDef::new("y").derive_from("x"),
        ])
        .unwrap_err();
        assert!(matches!(err, GraphError::CyclicDependency { .. }));
    }

    #[test]
    fn test_configuration_is_inherited() {
        let graph = StageGraph::new(vec![
            StageDef::new("base").with_arg("CC", "clang"),
            StageDef::new("dev")
                .derive_from("base")
                .with_build_type(BuildType::Debug)
                .with_arg("JOBS", "4"),
            StageDef::new("test").derive_from("dev").with_arg("JOBS", "8"),
        ])
        .unwrap();

        let test = graph.get("test").unwrap();
        assert_eq!(test.build_type, BuildType::Debug);
        assert_eq!(test.args.get("CC").map(String::as_str), Some("clang"));
        assert_eq!(test.args.get("JOBS").map(String::as_str), Some("8"));

        let base = graph.get("base").unwrap();
        assert_eq!(base.build_type, BuildType::Release);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let graph = StageGraph::new(vec![
            StageDef::new("base"),
            StageDef::new("dev").derive_from("base"),
            StageDef::new("build").derive_from("dev"),
        ])
        .unwrap();

        let build = graph.get("build").unwrap().id;
        let chain: Vec<&str> = graph
            .ancestors(build)
            .into_iter()
            .map(|id| graph.stage(id).name.as_str())
            .collect();
        assert_eq!(chain, vec!["dev", "base"]);
        assert!(graph.ancestors(graph.get("base").unwrap().id).is_empty());
    }

    #[test]
    fn test_dot_output_distinguishes_edges() {
        let graph = StageGraph::new(vec![
            StageDef::new("base"),
            StageDef::new("build").derive_from("base"),
            StageDef::new("deploy").derive_from("base").copy_from("build", &["/app"]),
        ])
        .unwrap();

        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph stages {"));
        assert!(dot.contains("\"base\" -> \"build\" [style=solid"));
        assert!(dot.contains("\"build\" -> \"deploy\" [style=dashed"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_order_respects_every_edge(defs in stage_dag(12)) {
            let graph = StageGraph::new(defs).unwrap();
            let order = graph.topological_order();
            prop_assert_eq!(order.len(), graph.len());

            let position: HashMap<StageId, usize> =
                order.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

            for stage in graph.stages() {
                if let Some(parent) = stage.parent {
                    prop_assert!(position[&parent] < position[&stage.id]);
                }
                for source in &stage.copy_sources {
                    prop_assert!(position[source] < position[&stage.id]);
                }
            }
        }

        #[test]
        fn prop_order_is_deterministic(defs in stage_dag(12)) {
            let first = StageGraph::new(defs.clone()).unwrap();
            let second = StageGraph::new(defs).unwrap();
            prop_assert_eq!(names(&first), names(&second));
        }
    }
}
