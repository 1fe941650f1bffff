use std::fmt;
use std::sync::Arc;

use crate::config::ExecConfig;
use crate::graph::{Graph, MemoryGraph};
use crate::model::VarAlloc;

/// Per-execution state shared by every operator of one query.
///
/// Cloning is cheap. The synthetic-variable allocator lives here so that two
/// executions running side by side never draw from the same counter.
#[derive(Clone)]
pub struct ExecContext {
    config: Arc<ExecConfig>,
    graph: Arc<dyn Graph>,
    triple_vars: Arc<VarAlloc>,
}

impl ExecContext {
    /// Creates a context over `graph`.
    pub fn new(config: ExecConfig, graph: Arc<dyn Graph>) -> Self {
        Self {
            config: Arc::new(config),
            graph,
            triple_vars: Arc::new(VarAlloc::triple_terms()),
        }
    }

    /// Context over an empty graph with default options.
    pub fn detached() -> Self {
        Self::new(ExecConfig::default(), Arc::new(MemoryGraph::empty()))
    }

    /// Execution options.
    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Active graph.
    pub fn graph(&self) -> &Arc<dyn Graph> {
        &self.graph
    }

    /// Allocator for RDF-star intermediate variables.
    pub fn triple_vars(&self) -> &VarAlloc {
        &self.triple_vars
    }

    /// Same context with different options and a fresh allocator.
    pub fn with_config(&self, config: ExecConfig) -> Self {
        Self::new(config, Arc::clone(&self.graph))
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("config", &self.config)
            .field("triple_vars", &self.triple_vars.allocated())
            .finish()
    }
}
