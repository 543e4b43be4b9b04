//! ART to DOT (Graphviz) conversion.
//!
//! The generated DOT output follows these conventions:
//! - **States** are boxes labeled with their id, location and call context
//! - **Covered states** are drawn with the covered style (default: dashed)
//! - **States at error locations** are filled with the error color
//! - **Tree edges** go from parent to child and are labeled with the CFA edge
//! - **Coverage edges** go from a covered state to its coverer, dashed
//!
//! Render with: `dot -Tpng art.dot -o art.png`.

use crate::art::Art;
use crate::cfa::Cfa;
use crate::coverage::CoverageRelation;
use crate::manager::FormulaManager;
use crate::transfer::TransferRelation;

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for states (default: "box")
    pub state_shape: &'static str,
    /// Style for covered states (default: "dashed")
    pub covered_style: &'static str,
    /// Fill color for states at error locations (default: "salmon")
    pub error_color: &'static str,
    /// Style for coverage edges (default: "dashed")
    pub coverage_edge_style: &'static str,
    /// Whether tree edges are labeled with their CFA edge (default: true)
    pub edge_labels: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            state_shape: "box",
            covered_style: "dashed",
            error_color: "salmon",
            coverage_edge_style: "dashed",
            edge_labels: true,
        }
    }
}

/// Converts the live part of an ART to DOT format.
pub fn art_to_dot(art: &Art, coverage: &CoverageRelation, cfa: &Cfa) -> Result<String, std::fmt::Error> {
    art_to_dot_with_config(art, coverage, cfa, &DotConfig::default())
}

pub fn art_to_dot_with_config(
    art: &Art,
    coverage: &CoverageRelation,
    cfa: &Cfa,
    config: &DotConfig,
) -> Result<String, std::fmt::Error> {
    use std::fmt::Write as _;

    let mut dot = String::new();
    writeln!(dot, "digraph art {{")?;
    writeln!(dot, "node [shape={}];", config.state_shape)?;

    for state in art.states() {
        let mut attrs = format!(
            "label=\"{} @ {}\\n{}\"",
            state.id(),
            state.location(),
            state.context()
        );
        if state.is_covered() {
            write!(attrs, ", style={}", config.covered_style)?;
        }
        if cfa.is_error_location(state.location()) {
            write!(attrs, ", style=filled, fillcolor={}", config.error_color)?;
        }
        writeln!(dot, "{} [{}];", state.id(), attrs)?;
    }

    for state in art.states() {
        let Some(parent) = state.parent() else {
            continue;
        };
        if !art.contains(parent) {
            continue;
        }
        match state.incoming() {
            Some(edge) if config.edge_labels => {
                let label = cfa.edge(edge).kind.to_string().replace('"', "\\\"");
                writeln!(dot, "{} -> {} [label=\"{}\"];", parent, state.id(), label)?;
            }
            _ => writeln!(dot, "{} -> {};", parent, state.id())?,
        }
    }

    for state in art.states() {
        let Some(coverer) = coverage.coverer_of(state.id()) else {
            continue;
        };
        if art.contains(coverer) {
            writeln!(
                dot,
                "{} -> {} [style={}, constraint=false];",
                state.id(),
                coverer,
                config.coverage_edge_style
            )?;
        }
    }

    writeln!(dot, "}}")?;
    Ok(dot)
}

impl<M: FormulaManager> TransferRelation<'_, M> {
    /// The current ART in DOT format.
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        art_to_dot(self.art(), self.coverage(), self.cfa())
    }
}
