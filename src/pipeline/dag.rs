use crate::constants::*;
use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// The stages a toll data run is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Expand,
    ExtractCsv,
    ExtractTsv,
    ExtractFixedWidth,
    Consolidate,
    Transform,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::Expand,
        StepKind::ExtractCsv,
        StepKind::ExtractTsv,
        StepKind::ExtractFixedWidth,
        StepKind::Consolidate,
        StepKind::Transform,
    ];

    pub fn step_name(&self) -> &'static str {
        match self {
            StepKind::Expand => STAGE_EXPAND,
            StepKind::ExtractCsv => STAGE_EXTRACT_CSV,
            StepKind::ExtractTsv => STAGE_EXTRACT_TSV,
            StepKind::ExtractFixedWidth => STAGE_EXTRACT_FIXED_WIDTH,
            StepKind::Consolidate => STAGE_CONSOLIDATE,
            StepKind::Transform => STAGE_TRANSFORM,
        }
    }

    /// Steps whose outputs this step reads.
    pub fn dependencies(&self) -> Vec<StepKind> {
        match self {
            StepKind::Expand => vec![],
            StepKind::ExtractCsv | StepKind::ExtractTsv | StepKind::ExtractFixedWidth => {
                vec![StepKind::Expand]
            }
            StepKind::Consolidate => vec![
                StepKind::ExtractCsv,
                StepKind::ExtractTsv,
                StepKind::ExtractFixedWidth,
            ],
            StepKind::Transform => vec![StepKind::Consolidate],
        }
    }

    pub fn from_name(name: &str) -> Option<StepKind> {
        StepKind::ALL.into_iter().find(|k| k.step_name() == name)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step_name())
    }
}

/// Directed acyclic graph of steps. An edge `(a, b)` means `b` reads what
/// `a` writes, so `a` must finish first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineDag {
    nodes: Vec<StepKind>,
    edges: Vec<(StepKind, StepKind)>,
}

impl PipelineDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full toll data graph: expand, three extractors, consolidate,
    /// transform.
    pub fn toll_data() -> Self {
        let mut dag = Self::new();
        for kind in StepKind::ALL {
            dag.nodes.push(kind);
            for dep in kind.dependencies() {
                dag.edges.push((dep, kind));
            }
        }
        dag
    }

    pub fn add_node(&mut self, kind: StepKind) -> Result<()> {
        if self.nodes.contains(&kind) {
            return Err(EtlError::Dag(format!("step '{}' added twice", kind)));
        }
        self.nodes.push(kind);
        Ok(())
    }

    pub fn add_edge(&mut self, from: StepKind, to: StepKind) -> Result<()> {
        for end in [from, to] {
            if !self.nodes.contains(&end) {
                return Err(EtlError::Dag(format!("edge {} -> {} references unknown step '{}'", from, to, end)));
            }
        }
        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
        Ok(())
    }

    pub fn nodes(&self) -> &[StepKind] {
        &self.nodes
    }

    pub fn upstream(&self, kind: StepKind) -> Vec<StepKind> {
        self.edges.iter().filter(|(_, to)| *to == kind).map(|(from, _)| *from).collect()
    }

    /// Check that every edge joins known steps, that every step's declared
    /// dependencies are wired in, and that the graph has no cycle.
    pub fn validate(&self) -> Result<()> {
        let known: HashSet<StepKind> = self.nodes.iter().copied().collect();
        if known.len() != self.nodes.len() {
            return Err(EtlError::Dag("duplicate step in graph".to_string()));
        }
        for (from, to) in &self.edges {
            if !known.contains(from) || !known.contains(to) {
                return Err(EtlError::Dag(format!("edge {} -> {} references an unknown step", from, to)));
            }
        }
        for kind in &self.nodes {
            let upstream = self.upstream(*kind);
            for dep in kind.dependencies() {
                if !upstream.contains(&dep) {
                    return Err(EtlError::Dag(format!("step '{}' depends on '{}' which is not wired in", kind, dep)));
                }
            }
        }
        self.layers().map(|_| ())
    }

    /// Topological layers: every step in a layer depends only on steps in
    /// earlier layers, so a layer's steps can run concurrently. Within a
    /// layer steps keep insertion order.
    pub fn layers(&self) -> Result<Vec<Vec<StepKind>>> {
        let mut in_degree: HashMap<StepKind, usize> = self.nodes.iter().map(|k| (*k, 0)).collect();
        for (_, to) in &self.edges {
            if let Some(degree) = in_degree.get_mut(to) {
                *degree += 1;
            }
        }

        let mut layers = Vec::new();
        let mut placed = 0;
        let mut ready: Vec<StepKind> = self.nodes.iter().copied().filter(|k| in_degree[k] == 0).collect();

        while !ready.is_empty() {
            placed += ready.len();
            let mut next = Vec::new();
            for kind in &ready {
                for (_, to) in self.edges.iter().filter(|(from, _)| from == kind) {
                    if let Some(degree) = in_degree.get_mut(to) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*to);
                        }
                    }
                }
            }
            next.sort_by_key(|k| self.nodes.iter().position(|n| n == k));
            layers.push(std::mem::replace(&mut ready, next));
        }

        if placed != self.nodes.len() {
            let stuck: Vec<String> = self
                .nodes
                .iter()
                .filter(|k| in_degree[*k] > 0)
                .map(|k| k.to_string())
                .collect();
            return Err(EtlError::Dag(format!("cycle detected among steps: {}", stuck.join(", "))));
        }
        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toll_data_layers_fan_out_and_in() {
        let dag = PipelineDag::toll_data();
        assert!(dag.validate().is_ok());
        assert_eq!(
            dag.layers().unwrap(),
            vec![
                vec![StepKind::Expand],
                vec![StepKind::ExtractCsv, StepKind::ExtractTsv, StepKind::ExtractFixedWidth],
                vec![StepKind::Consolidate],
                vec![StepKind::Transform],
            ]
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut dag = PipelineDag::toll_data();
        dag.add_edge(StepKind::Transform, StepKind::Expand).unwrap();

        let err = dag.validate().unwrap_err();
        assert!(matches!(err, EtlError::Dag(_)));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_unknown_step_edge_is_rejected() {
        let mut dag = PipelineDag::new();
        dag.add_node(StepKind::Expand).unwrap();
        assert!(dag.add_edge(StepKind::Expand, StepKind::ExtractCsv).is_err());
        assert!(dag.add_node(StepKind::Expand).is_err());
    }

    #[test]
    fn test_missing_dependency_is_rejected() {
        let mut dag = PipelineDag::new();
        dag.add_node(StepKind::Expand).unwrap();
        dag.add_node(StepKind::ExtractCsv).unwrap();

        let err = dag.validate().unwrap_err();
        assert!(err.to_string().contains("extract_csv"));

        dag.add_edge(StepKind::Expand, StepKind::ExtractCsv).unwrap();
        assert!(dag.validate().is_ok());
    }

    #[test]
    fn test_step_names_round_trip() {
        for kind in StepKind::ALL {
            assert_eq!(StepKind::from_name(kind.step_name()), Some(kind));
        }
        assert_eq!(StepKind::from_name("load"), None);
    }
}
