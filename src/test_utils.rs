//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;
    use proptest::sample::Index;

    use crate::core::stage::{BuildType, SourceBuild, StageDef};

    /// Generate a valid stage name (lowercase alphanumeric with hyphens)
    pub fn stage_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}"
    }

    /// Generate a build type, mostly the CMake standard ones
    pub fn build_type() -> impl Strategy<Value = BuildType> {
        prop_oneof![
            Just(BuildType::Debug),
            Just(BuildType::Release),
            Just(BuildType::RelWithDebInfo),
            Just(BuildType::MinSizeRel),
            Just(BuildType::Custom("Coverage".to_string())),
        ]
    }

    /// Raw edges for `n` stages: optional parent and copy sources per stage,
    /// each pointing at an earlier stage
    fn edges(n: usize) -> impl Strategy<Value = Vec<(Option<Index>, Vec<Index>)>> {
        prop::collection::vec(
            (
                prop::option::of(any::<Index>()),
                prop::collection::vec(any::<Index>(), 0..3),
            ),
            n,
        )
    }

    fn to_def(i: usize, parent: Option<&Index>, copies: &[Index]) -> StageDef {
        let mut def = StageDef::new(format!("s{i}"));
        if i > 0 {
            if let Some(p) = parent {
                def = def.derive_from(format!("s{}", p.index(i)));
            }
            for c in copies {
                def = def.copy_from(format!("s{}", c.index(i)), &["/out/*"]);
            }
        }
        def
    }

    /// Generate an acyclic stage list of up to `max_stages` stages,
    /// declared in shuffled order so forward references occur
    pub fn stage_dag(max_stages: usize) -> impl Strategy<Value = Vec<StageDef>> {
        (1..=max_stages)
            .prop_flat_map(edges)
            .prop_map(|edges| {
                edges
                    .iter()
                    .enumerate()
                    .map(|(i, (parent, copies))| to_def(i, parent.as_ref(), copies))
                    .collect::<Vec<_>>()
            })
            .prop_shuffle()
    }

    /// Like [`stage_dag`], with some stages building one of two shared
    /// dependencies at a random build type
    pub fn stage_dag_with_sources(max_stages: usize) -> impl Strategy<Value = Vec<StageDef>> {
        (1..=max_stages)
            .prop_flat_map(|n| {
                (
                    edges(n),
                    prop::collection::vec(
                        prop::option::of((prop_oneof![Just("fmt"), Just("zlib")], build_type())),
                        n,
                    ),
                )
            })
            .prop_map(|(edges, sources)| {
                edges
                    .iter()
                    .zip(sources)
                    .enumerate()
                    .map(|(i, ((parent, copies), source))| {
                        let mut def = to_def(i, parent.as_ref(), copies);
                        if let Some((name, build_type)) = source {
                            def = def.with_build_type(build_type).with_source(SourceBuild {
                                name: name.to_string(),
                                version: "1.0.0".to_string(),
                                flags: Vec::new(),
                                command: "make install".to_string(),
                                install_manifest: None,
                            });
                        }
                        def
                    })
                    .collect::<Vec<_>>()
            })
            .prop_shuffle()
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_stage_name_generator(name in stage_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_stage_dag_names_are_unique(defs in stage_dag(10)) {
            let names: HashSet<&str> = defs.iter().map(|d| d.name.as_str()).collect();
            prop_assert_eq!(names.len(), defs.len());
        }
    }
}
