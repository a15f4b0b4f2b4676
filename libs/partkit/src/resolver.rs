//! Dependency resolution: plan the part graph, then run each factory once.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::part::{AnyPart, Deps, PartId, PartKey, Resolved};

/// Structured errors raised while wiring parts. All of them are fatal.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "missing dependency '{part}'{}",
        required_by.as_ref().map(|by| format!(" required by '{by}'")).unwrap_or_default()
    )]
    MissingDependency {
        part: String,
        required_by: Option<String>,
    },
    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },
    #[error("part '{part}' did not declare a dependency on '{dependency}'")]
    UndeclaredDependency { part: String, dependency: String },
    #[error("output of part '{part}' has an unexpected type")]
    TypeMismatch { part: String },
    #[error("factory of part '{part}' failed")]
    Factory {
        part: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White, // unvisited
    Gray,  // on the current path
    Black, // planned
}

/// Resolver over a list of parts. List order does not express dependency order.
pub struct Resolver {
    parts: Vec<AnyPart>,
    index: HashMap<PartId, usize>,
}

impl Resolver {
    pub fn new(parts: impl IntoIterator<Item = AnyPart>) -> Self {
        let mut unique = Vec::new();
        let mut index = HashMap::new();
        for part in parts {
            if index.contains_key(&part.id) {
                tracing::debug!(part = %part.name, "part supplied twice; resolving once");
                continue;
            }
            index.insert(part.id, unique.len());
            unique.push(part);
        }
        Self {
            parts: unique,
            index,
        }
    }

    pub fn contains(&self, id: PartId) -> bool {
        self.index.contains_key(&id)
    }

    /// Depth-first plan over every supplied part: dependencies come before
    /// their dependents. Fails before any factory runs.
    pub fn plan(&self) -> Result<Vec<usize>, ResolveError> {
        let mut colors = vec![Color::White; self.parts.len()];
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(self.parts.len());

        for i in 0..self.parts.len() {
            if colors[i] == Color::White {
                self.visit(i, &mut colors, &mut path, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        colors: &mut [Color],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), ResolveError> {
        colors[node] = Color::Gray;
        path.push(node);

        let part = &self.parts[node];
        for dep in &part.deps {
            let Some(&next) = self.index.get(&dep.id) else {
                return Err(ResolveError::MissingDependency {
                    part: dep.name().to_string(),
                    required_by: Some(part.name().to_string()),
                });
            };
            match colors[next] {
                Color::Gray => {
                    // back edge: report the cycle closed on its first part
                    let start = path.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|&i| self.parts[i].name().to_string())
                        .collect();
                    cycle.push(self.parts[next].name().to_string());
                    return Err(ResolveError::CycleDetected { path: cycle });
                }
                Color::White => self.visit(next, colors, path, order)?,
                Color::Black => {}
            }
        }

        path.pop();
        colors[node] = Color::Black;
        order.push(node);
        Ok(())
    }

    /// Run every factory exactly once, in planned order, awaiting each.
    pub async fn resolve(&self) -> Result<Resolved, ResolveError> {
        let order = self.plan()?;
        let mut resolved = Resolved::default();

        for i in order {
            let part = &self.parts[i];
            let mut outputs = HashMap::with_capacity(part.deps.len());
            for dep in &part.deps {
                if let Some(out) = resolved.output(&dep.id) {
                    outputs.insert(dep.id, Arc::clone(out));
                }
            }

            tracing::debug!(part = %part.name, deps = part.deps.len(), "resolving part");
            let output = (part.build)(Deps::new(Arc::clone(&part.name), outputs))
                .await
                .map_err(|source| ResolveError::Factory {
                    part: part.name().to_string(),
                    source,
                })?;
            resolved.insert(part.id, Arc::clone(&part.name), output);
        }

        tracing::info!(parts = ?resolved.order(), "Part dependency order resolved");
        Ok(resolved)
    }
}

/// Resolve every part in `parts` and return the output of `root`.
///
/// `root` must itself be in the list. Missing or cyclic dependencies are
/// reported before any factory runs.
pub async fn resolve_application<T: Send + Sync + 'static>(
    parts: &[AnyPart],
    root: &impl PartKey<T>,
) -> Result<Arc<T>, ResolveError> {
    let resolver = Resolver::new(parts.iter().cloned());
    let token = root.token();
    if !resolver.contains(token.id()) {
        return Err(ResolveError::MissingDependency {
            part: token.name().to_string(),
            required_by: None,
        });
    }
    let resolved = resolver.resolve().await?;
    resolved.take(root)
}
