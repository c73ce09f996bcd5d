//! Dependency graph derived from the index.
//!
//! Building a graph is a pure function of a [`WorkspaceIndex`]: no I/O, no
//! caching. Every call reflects exactly the index it was given.
//!
//! - A key with definitions and no references is **orphaned**.
//! - A key with references and no definitions is **missing**.
//! - A key in both maps is **resolved**.
//!
//! Orphaned and missing keys are disjoint by construction. On top of the key
//! classification, references are linked to the definitions they resolve to,
//! and those links are folded into a file-level graph used to find circular
//! dependencies between files.

use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::index::WorkspaceIndex;
use crate::key::TableKey;
use crate::types::DefinitionKind;

/// A reference resolved to a file defining its key.
///
/// A file with several definitions of the key yields one edge, pointing at
/// the first of them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    /// Shared table key
    pub key: TableKey,
    /// File containing the reference
    pub from_file: String,
    /// Line of the reference
    pub from_line: u32,
    /// File containing the definition
    pub to_file: String,
    /// Line of the definition
    pub to_line: u32,
}

/// A file that depends on another file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEdge {
    /// Referencing file
    pub from: String,
    /// Defining file
    pub to: String,
}

/// Counts and key classifications for the whole workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStats {
    /// Indexed files
    pub total_files: usize,
    /// Definition entries
    pub total_definitions: usize,
    /// Reference entries
    pub total_references: usize,
    /// Definition entries of kind table
    pub tables: usize,
    /// Definition entries of kind view
    pub views: usize,
    /// Definition entries of kind CTE
    pub ctes: usize,
    /// Keys both defined and referenced
    pub resolved_keys: usize,
    /// Defined keys nobody references, sorted
    pub orphaned_definitions: Vec<TableKey>,
    /// Referenced keys nobody defines, sorted
    pub missing_definitions: Vec<TableKey>,
    /// Groups of files that depend on each other in a cycle
    pub circular_dependencies: Vec<Vec<String>>,
}

/// Derived view of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDependencyGraph {
    /// Reference → definition links, sorted
    pub edges: Vec<DependencyEdge>,
    /// Distinct file → file dependencies without self-edges, sorted
    pub file_edges: Vec<FileEdge>,
    /// Summary counts and classifications
    pub stats: WorkspaceStats,
}

/// Builds [`WorkspaceDependencyGraph`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    /// Derive the dependency graph of `index`.
    #[must_use]
    pub fn build(index: &WorkspaceIndex) -> WorkspaceDependencyGraph {
        let definitions = index.definition_map();
        let references = index.reference_map();

        let mut orphaned: Vec<TableKey> = definitions
            .keys()
            .filter(|key| !references.contains_key(*key))
            .cloned()
            .collect();
        orphaned.sort();

        let mut missing: Vec<TableKey> = references
            .keys()
            .filter(|key| !definitions.contains_key(*key))
            .cloned()
            .collect();
        missing.sort();

        let mut edges = Vec::new();
        let mut file_edges: BTreeSet<FileEdge> = BTreeSet::new();
        let mut resolved_keys = 0;
        for (key, refs) in references {
            let Some(defs) = definitions.get(key) else {
                continue;
            };
            resolved_keys += 1;

            // First definition line per defining file.
            let mut defining_files: BTreeMap<&str, u32> = BTreeMap::new();
            for definition in defs {
                defining_files
                    .entry(definition.file_path.as_str())
                    .and_modify(|line| *line = (*line).min(definition.line_number))
                    .or_insert(definition.line_number);
            }

            let referencing_files: BTreeSet<&str> =
                refs.iter().map(|r| r.file_path.as_str()).collect();
            for from in &referencing_files {
                for to in defining_files.keys().filter(|to| *to != from) {
                    file_edges.insert(FileEdge {
                        from: (*from).to_string(),
                        to: (*to).to_string(),
                    });
                }
            }

            for reference in refs {
                for (to_file, to_line) in &defining_files {
                    edges.push(DependencyEdge {
                        key: key.clone(),
                        from_file: reference.file_path.clone(),
                        from_line: reference.line_number,
                        to_file: (*to_file).to_string(),
                        to_line: *to_line,
                    });
                }
            }
        }
        edges.sort();
        let file_edges: Vec<FileEdge> = file_edges.into_iter().collect();

        let (mut tables, mut views, mut ctes) = (0, 0, 0);
        for definition in definitions.values().flatten() {
            match definition.kind {
                DefinitionKind::Table => tables += 1,
                DefinitionKind::View => views += 1,
                DefinitionKind::Cte => ctes += 1,
            }
        }

        let stats = WorkspaceStats {
            total_files: index.file_count(),
            total_definitions: index.definition_count(),
            total_references: index.reference_count(),
            tables,
            views,
            ctes,
            resolved_keys,
            orphaned_definitions: orphaned,
            missing_definitions: missing,
            circular_dependencies: find_file_cycles(&file_edges),
        };

        WorkspaceDependencyGraph {
            edges,
            file_edges,
            stats,
        }
    }
}

/// Shorthand for [`GraphBuilder::build`].
#[must_use]
pub fn build_graph(index: &WorkspaceIndex) -> WorkspaceDependencyGraph {
    GraphBuilder::build(index)
}

/// Strongly connected components of the file graph with more than one file.
fn find_file_cycles(file_edges: &[FileEdge]) -> Vec<Vec<String>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut node_map: HashMap<&str, NodeIndex> = HashMap::new();

    for edge in file_edges {
        let from = *node_map
            .entry(edge.from.as_str())
            .or_insert_with(|| graph.add_node(edge.from.as_str()));
        let to = *node_map
            .entry(edge.to.as_str())
            .or_insert_with(|| graph.add_node(edge.to.as_str()));
        graph.add_edge(from, to, ());
    }

    let mut cycles: Vec<Vec<String>> = algo::tarjan_scc(&graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|component| {
            let mut files: Vec<String> = component
                .into_iter()
                .map(|node| graph[node].to_string())
                .collect();
            files.sort();
            files
        })
        .collect();
    cycles.sort();
    cycles
}
