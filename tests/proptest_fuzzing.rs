//! Property-based tests for parsing and ordering logic
//!
//! Coverage targets:
//! - Prompt templates (pipe/template.rs)
//! - Condition expressions (pipe/definition.rs)
//! - Dependency sort (dag/sort.rs)
//! - Concept compatibility (concept/library.rs)

use proptest::prelude::*;

// =============================================================================
// Templates
// =============================================================================

mod template_fuzzing {
    use super::*;
    use pipegraph::concept::ConceptLibrary;
    use pipegraph::pipe::{ConditionExpression, Template};
    use pipegraph::{StuffContent, StuffFactory, WorkingMemory};

    prop_compose! {
        /// Template with one inline `$name` reference between plain text
        fn arb_inline_template()(
            prefix in "[a-zA-Z ,!]{0,20}",
            name in r"[a-z][a-z0-9_]{0,15}",
            suffix in " [a-zA-Z ,!]{0,20}"
        ) -> (String, String, String) {
            (prefix, name, suffix)
        }
    }

    proptest! {
        #[test]
        fn parsing_never_panics(source in ".*") {
            let _ = Template::parse(source.as_str());
        }

        #[test]
        fn expression_parsing_never_panics(source in ".*") {
            let _ = ConditionExpression::parse(&source);
        }

        #[test]
        fn plain_text_renders_verbatim(source in "[^$@{]*") {
            let template = Template::parse(source.as_str()).unwrap();
            prop_assert!(template.required_variables().is_empty());
            prop_assert_eq!(template.render(&WorkingMemory::new()).unwrap(), source);
        }

        #[test]
        fn inline_reference_is_substituted(
            (prefix, name, suffix) in arb_inline_template(),
            value in "[ -~]{0,30}",
        ) {
            prop_assume!(name != "main_stuff");
            let concepts = ConceptLibrary::new();
            let stuff = StuffFactory::new(&concepts)
                .make_stuff(StuffContent::text(value.as_str()), None, Some(&name), None)
                .unwrap();
            let mut memory = WorkingMemory::new();
            memory.add_new_stuff(&name, stuff).unwrap();

            let template = Template::parse(format!("{prefix}${name}{suffix}")).unwrap();
            prop_assert_eq!(template.required_variables(), vec![name.clone()]);
            prop_assert_eq!(
                template.render(&memory).unwrap(),
                format!("{prefix}{value}{suffix}")
            );
        }
    }
}

// =============================================================================
// Dependency sort
// =============================================================================

mod sort_fuzzing {
    use super::*;
    use pipegraph::dag::{sort_pipes_by_dependencies, PipeReferences};
    use std::collections::BTreeMap;

    #[derive(Debug)]
    struct Node(Vec<String>);

    impl PipeReferences for Node {
        fn referenced_pipe_codes(&self) -> Vec<&str> {
            self.0.iter().map(String::as_str).collect()
        }
    }

    prop_compose! {
        /// Acyclic bundle: pipe `p{i}` may only reference `p{j}` with j > i
        fn arb_dag()(size in 1usize..12)(
            edges in proptest::collection::vec(
                proptest::collection::vec(any::<bool>(), size),
                size,
            ),
            size in Just(size),
        ) -> BTreeMap<String, Node> {
            (0..size)
                .map(|i| {
                    let refs = (i + 1..size)
                        .filter(|&j| edges[i][j])
                        .map(|j| format!("p{j:02}"))
                        .collect();
                    (format!("p{i:02}"), Node(refs))
                })
                .collect()
        }
    }

    proptest! {
        #[test]
        fn acyclic_bundles_sort_to_a_permutation(pipes in arb_dag()) {
            let sorted = sort_pipes_by_dependencies(&pipes).unwrap();
            let mut codes: Vec<&str> = sorted.iter().map(|(code, _)| *code).collect();
            prop_assert_eq!(codes.len(), pipes.len());
            codes.sort_unstable();
            codes.dedup();
            prop_assert_eq!(codes.len(), pipes.len());
        }

        #[test]
        fn back_edge_is_always_a_cycle(pipes in arb_dag(), from in 0usize..12) {
            let mut pipes = pipes;
            let last = format!("p{:02}", pipes.len() - 1);
            let from = format!("p{:02}", from % pipes.len());
            pipes.get_mut(&from).unwrap().0.push(last.clone());
            pipes.get_mut(&last).unwrap().0.push(from.clone());
            prop_assert!(sort_pipes_by_dependencies(&pipes).is_err());
        }
    }
}

// =============================================================================
// Concept compatibility
// =============================================================================

mod compatibility_fuzzing {
    use super::*;
    use pipegraph::concept::NativeConceptCode;
    use pipegraph::{Concept, ConceptLibrary};
    use std::sync::Arc;

    /// `Level0 → Level1 → … → native.Text`
    fn refinement_chain(depth: usize) -> (ConceptLibrary, Vec<Arc<Concept>>) {
        let concepts = (0..depth)
            .map(|i| {
                let refines = if i + 1 < depth {
                    format!("Level{}", i + 1)
                } else {
                    "Text".to_string()
                };
                Concept::make(&format!("Level{i}"), "ladder", "", None, Some(&refines)).unwrap()
            })
            .collect();
        let mut library = ConceptLibrary::new();
        let chain = library.add_concepts(concepts).unwrap();
        (library, chain)
    }

    proptest! {
        #[test]
        fn refinement_is_reflexive_and_transitive(
            depth in 1usize..8,
            a in 0usize..8,
            b in 0usize..8,
        ) {
            let (library, chain) = refinement_chain(depth);
            let (a, b) = (a % depth, b % depth);

            prop_assert!(library.is_compatible(&chain[a], &chain[a], true));
            prop_assert_eq!(library.is_compatible(&chain[a], &chain[b], true), a <= b);

            let text = library.native(NativeConceptCode::Text);
            prop_assert!(library.is_compatible(&chain[a], &text, true));
            prop_assert!(!library.is_compatible(&text, &chain[a], false));
        }

        #[test]
        fn anything_accepts_every_concept(depth in 1usize..8, a in 0usize..8) {
            let (library, chain) = refinement_chain(depth);
            let anything = library.native(NativeConceptCode::Anything);
            prop_assert!(library.is_compatible(&chain[a % depth], &anything, true));
        }
    }
}
