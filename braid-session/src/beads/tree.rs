//! Dependency tree construction for bead display and work composition.
//!
//! Turns a flat bead list (each carrying its own dependency edges) into an
//! ordered forest with per-row depth, last-child flag, and a box-drawing
//! prefix. Tolerates cycles and dangling edges: malformed input degrades to
//! roots or orphans, never an error.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{Bead, BeadStatus};

/// One rendered row of the dependency forest.
#[derive(Debug, Clone, Serialize)]
pub struct TreeRow {
    pub bead: Bead,
    pub depth: usize,
    pub prefix: String,
    pub last_child: bool,
    /// An ancestor fetched only to preserve tree structure.
    pub placeholder: bool,
}

/// Build the ordered dependency forest for a bead set.
///
/// `fetch` optionally resolves ancestors referenced by edges but absent from
/// the set (typically closed parents). Resolution iterates until no new
/// ancestors appear, tracking already-fetched ids so unknown or cyclic
/// references cannot loop. Fetched ancestors are flagged as placeholders and
/// dropped from the output unless at least one of their children is visible.
pub fn build_tree(input: &[Bead], fetch: Option<&dyn Fn(&str) -> Option<Bead>>) -> Vec<TreeRow> {
    let mut builder = Builder::new(input);
    if let Some(fetch) = fetch {
        builder.resolve_ancestors(fetch);
    }
    builder.build()
}

struct Builder {
    items: Vec<Bead>,
    index: HashMap<String, usize>,
    placeholders: HashSet<String>,
    children: HashMap<String, Vec<String>>,
    visited: HashSet<String>,
    rows: Vec<TreeRow>,
    child_counts: Vec<usize>,
}

impl Builder {
    fn new(input: &[Bead]) -> Self {
        let mut items = Vec::with_capacity(input.len());
        let mut index = HashMap::new();
        for bead in input {
            if !index.contains_key(&bead.id) {
                index.insert(bead.id.clone(), items.len());
                items.push(bead.clone());
            }
        }
        Self {
            items,
            index,
            placeholders: HashSet::new(),
            children: HashMap::new(),
            visited: HashSet::new(),
            rows: Vec::new(),
            child_counts: Vec::new(),
        }
    }

    /// Iteratively merge in missing ancestors until none are discovered.
    ///
    /// The fetched set guards termination: an id is asked for at most once,
    /// whether or not the backend knows it.
    fn resolve_ancestors(&mut self, fetch: &dyn Fn(&str) -> Option<Bead>) {
        let mut fetched: HashSet<String> = HashSet::new();
        loop {
            let mut missing: Vec<String> = Vec::new();
            for bead in &self.items {
                for dep in bead.blocking_deps() {
                    if !self.index.contains_key(dep) && !fetched.contains(dep) {
                        missing.push(dep.to_string());
                    }
                }
            }
            missing.sort();
            missing.dedup();
            if missing.is_empty() {
                break;
            }

            for id in missing {
                fetched.insert(id.clone());
                if let Some(bead) = fetch(&id) {
                    if !self.index.contains_key(&bead.id) {
                        self.placeholders.insert(bead.id.clone());
                        self.index.insert(bead.id.clone(), self.items.len());
                        self.items.push(bead);
                    }
                }
            }
        }
    }

    fn build(mut self) -> Vec<TreeRow> {
        // Invert edges into parent -> children, keeping only visible targets.
        for bead in &self.items {
            for dep in bead.blocking_deps() {
                if self.index.contains_key(dep) {
                    let kids = self.children.entry(dep.to_string()).or_default();
                    if !kids.contains(&bead.id) {
                        kids.push(bead.id.clone());
                    }
                }
            }
        }

        // Roots: every dependency target points outside the visible set.
        let mut roots: Vec<String> = self
            .items
            .iter()
            .filter(|b| b.blocking_deps().all(|d| !self.index.contains_key(d)))
            .map(|b| b.id.clone())
            .collect();
        roots.sort_by(|a, b| {
            let pa = self.placeholders.contains(a);
            let pb = self.placeholders.contains(b);
            pb.cmp(&pa)
                .then_with(|| self.priority_of(a).cmp(&self.priority_of(b)))
                .then_with(|| a.cmp(b))
        });

        let mut cols = Vec::new();
        let root_count = roots.len();
        for (i, root) in roots.iter().enumerate() {
            self.visit(root, &mut cols, i == root_count - 1, true);
        }

        // Anything unreachable from a root (e.g. an isolated cycle component)
        // is appended flat.
        let orphans: Vec<String> = self
            .items
            .iter()
            .filter(|b| !self.visited.contains(&b.id))
            .map(|b| b.id.clone())
            .collect();
        for id in orphans {
            self.visited.insert(id.clone());
            self.rows.push(TreeRow {
                bead: self.items[self.index[&id]].clone(),
                depth: 0,
                prefix: String::new(),
                last_child: true,
                placeholder: self.placeholders.contains(&id),
            });
            self.child_counts.push(0);
        }

        // A placeholder only earns its row by showing visible descendants.
        let counts = self.child_counts;
        self.rows
            .into_iter()
            .zip(counts)
            .filter(|(row, count)| !row.placeholder || *count > 0)
            .map(|(row, _)| row)
            .collect()
    }

    fn visit(&mut self, id: &str, cols: &mut Vec<bool>, last: bool, is_root: bool) {
        if !self.visited.insert(id.to_string()) {
            // Already emitted elsewhere; back-edges stop here.
            return;
        }

        let depth = if is_root { 0 } else { cols.len() + 1 };
        let prefix = if is_root {
            String::new()
        } else {
            let mut s = String::new();
            for &more in cols.iter() {
                s.push_str(if more { "│   " } else { "    " });
            }
            s.push_str(if last { "└── " } else { "├── " });
            s
        };

        let row_idx = self.rows.len();
        self.rows.push(TreeRow {
            bead: self.items[self.index[id]].clone(),
            depth,
            prefix,
            last_child: last,
            placeholder: self.placeholders.contains(id),
        });
        self.child_counts.push(0);

        let mut kids: Vec<String> = self
            .children
            .get(id)
            .map(|k| {
                k.iter()
                    .filter(|c| !self.visited.contains(*c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        kids.sort_by(|a, b| {
            self.priority_of(a)
                .cmp(&self.priority_of(b))
                .then_with(|| a.cmp(b))
        });

        let kid_count = kids.len();
        for (i, kid) in kids.iter().enumerate() {
            if self.visited.contains(kid) {
                continue;
            }
            let before = self.rows.len();
            if !is_root {
                cols.push(!last);
            }
            self.visit(kid, cols, i == kid_count - 1, false);
            if !is_root {
                cols.pop();
            }
            if self.rows.len() > before {
                self.child_counts[row_idx] += 1;
            }
        }
    }

    fn priority_of(&self, id: &str) -> i64 {
        self.items[self.index[id]].priority
    }
}

/// Convenience for callers that hide closed beads but still want closed
/// ancestors resolved: true for beads worth showing on their own.
pub fn is_visible(bead: &Bead) -> bool {
    bead.status != BeadStatus::Closed
}
