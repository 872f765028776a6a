//! Dependency sort - build-time ordering of a pipe bundle
//!
//! Edges go from a controller to the pipes it references. Codes absent from
//! the bundle are ignored. The order is a depth-first pre-order from the root
//! pipes (never referenced), alphabetical among roots and among siblings, so
//! every pipe comes before its dependencies unless it was already reached
//! through another path.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::blueprint::PipeBlueprint;
use crate::error::{PipeError, Result};
use crate::pipe::Pipe;

/// Anything that names the pipes it references
pub trait PipeReferences {
    fn referenced_pipe_codes(&self) -> Vec<&str>;
}

impl PipeReferences for PipeBlueprint {
    fn referenced_pipe_codes(&self) -> Vec<&str> {
        PipeBlueprint::referenced_pipe_codes(self)
    }
}

impl PipeReferences for Pipe {
    fn referenced_pipe_codes(&self) -> Vec<&str> {
        self.child_pipe_codes()
    }
}

impl<T: PipeReferences> PipeReferences for Arc<T> {
    fn referenced_pipe_codes(&self) -> Vec<&str> {
        self.as_ref().referenced_pipe_codes()
    }
}

type Adjacency<'a> = FxHashMap<&'a str, Vec<&'a str>>;

/// Order pipes so that each comes before its in-bundle dependencies.
///
/// Fails with a definition error naming the cycle when references loop.
pub fn sort_pipes_by_dependencies<T: PipeReferences>(
    pipes: &BTreeMap<String, T>,
) -> Result<Vec<(&str, &T)>> {
    let adjacency = build_adjacency(pipes);
    detect_cycles(pipes, &adjacency)?;

    let referenced: FxHashSet<&str> = adjacency.values().flatten().copied().collect();
    let mut visited: FxHashSet<&str> = FxHashSet::default();
    let mut order: Vec<&str> = Vec::with_capacity(pipes.len());

    fn visit<'a>(
        code: &'a str,
        adjacency: &Adjacency<'a>,
        visited: &mut FxHashSet<&'a str>,
        order: &mut Vec<&'a str>,
    ) {
        if !visited.insert(code) {
            return;
        }
        order.push(code);
        if let Some(children) = adjacency.get(code) {
            for child in children {
                visit(child, adjacency, visited, order);
            }
        }
    }

    // BTreeMap keys are already alphabetical
    for code in pipes.keys().map(String::as_str) {
        if !referenced.contains(code) {
            visit(code, &adjacency, &mut visited, &mut order);
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|code| pipes.get_key_value(code))
        .map(|(code, pipe)| (code.as_str(), pipe))
        .collect())
}

fn build_adjacency<T: PipeReferences>(pipes: &BTreeMap<String, T>) -> Adjacency<'_> {
    pipes
        .iter()
        .map(|(code, pipe)| {
            let mut children: Vec<&str> = pipe
                .referenced_pipe_codes()
                .into_iter()
                .filter_map(|child| pipes.get_key_value(child).map(|(k, _)| k.as_str()))
                .collect();
            children.sort_unstable();
            children.dedup();
            (code.as_str(), children)
        })
        .collect()
}

/// Detect cycles using DFS with three-color marking.
///
/// - White: unvisited
/// - Gray: on the current DFS path
/// - Black: fully processed
///
/// Reaching a Gray node closes a cycle, reported as `a → b → a`.
fn detect_cycles<T>(pipes: &BTreeMap<String, T>, adjacency: &Adjacency<'_>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    fn dfs<'a>(
        node: &'a str,
        adjacency: &Adjacency<'a>,
        colors: &mut FxHashMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
    ) -> std::result::Result<(), String> {
        colors.insert(node, Color::Gray);
        stack.push(node);

        if let Some(neighbors) = adjacency.get(node) {
            for &neighbor in neighbors {
                match colors.get(neighbor) {
                    Some(Color::Gray) => {
                        let cycle_start = stack
                            .iter()
                            .position(|x| *x == neighbor)
                            .unwrap_or(0);
                        return Err(format!("{} → {}", stack[cycle_start..].join(" → "), neighbor));
                    }
                    Some(Color::White) | None => dfs(neighbor, adjacency, colors, stack)?,
                    Some(Color::Black) => {}
                }
            }
        }

        stack.pop();
        colors.insert(node, Color::Black);
        Ok(())
    }

    let mut colors: FxHashMap<&str, Color> = pipes
        .keys()
        .map(|code| (code.as_str(), Color::White))
        .collect();
    let mut stack: Vec<&str> = Vec::new();

    for code in pipes.keys().map(String::as_str) {
        if colors.get(code) == Some(&Color::White) {
            dfs(code, adjacency, &mut colors, &mut stack)
                .map_err(|cycle| PipeError::DependencyCycle { cycle })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Minimal reference holder
    #[derive(Debug)]
    struct Node(Vec<&'static str>);

    impl PipeReferences for Node {
        fn referenced_pipe_codes(&self) -> Vec<&str> {
            self.0.clone()
        }
    }

    fn bundle(edges: &[(&str, &[&'static str])]) -> BTreeMap<String, Node> {
        edges
            .iter()
            .map(|(code, refs)| (code.to_string(), Node(refs.to_vec())))
            .collect()
    }

    fn codes<T>(sorted: &[(&str, &T)]) -> Vec<String> {
        sorted.iter().map(|(code, _)| code.to_string()).collect()
    }

    #[test]
    fn three_node_cycle_is_a_definition_error() {
        let pipes = bundle(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let err = sort_pipes_by_dependencies(&pipes).unwrap_err();
        assert!(matches!(err, PipeError::DependencyCycle { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Definition);
        assert!(err.to_string().contains("a → b → c → a"));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let pipes = bundle(&[("loop", &["loop"])]);
        assert!(sort_pipes_by_dependencies(&pipes).is_err());
    }

    #[test]
    fn diamond_visits_shared_dependency_once() {
        // top → left, right; left → bottom; right → bottom
        let pipes = bundle(&[
            ("top", &["right", "left"]),
            ("left", &["bottom"]),
            ("right", &["bottom"]),
            ("bottom", &[]),
        ]);
        let sorted = sort_pipes_by_dependencies(&pipes).unwrap();
        assert_eq!(codes(&sorted), vec!["top", "left", "bottom", "right"]);
    }

    #[test]
    fn unknown_references_are_ignored() {
        let pipes = bundle(&[("flow", &["elsewhere", "step"]), ("step", &[])]);
        let sorted = sort_pipes_by_dependencies(&pipes).unwrap();
        assert_eq!(codes(&sorted), vec!["flow", "step"]);
    }

    #[test]
    fn roots_are_alphabetical() {
        let pipes = bundle(&[("zulu", &[]), ("alpha", &["mike"]), ("mike", &[])]);
        let sorted = sort_pipes_by_dependencies(&pipes).unwrap();
        assert_eq!(codes(&sorted), vec!["alpha", "mike", "zulu"]);
    }

    #[test]
    fn every_pipe_is_emitted_once() {
        let pipes = bundle(&[
            ("a", &["b", "c"]),
            ("b", &["c", "d"]),
            ("c", &["d"]),
            ("d", &[]),
            ("e", &["d"]),
        ]);
        let sorted = sort_pipes_by_dependencies(&pipes).unwrap();
        assert_eq!(codes(&sorted), vec!["a", "b", "c", "d", "e"]);
    }
}
