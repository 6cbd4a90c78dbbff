//! Layout engine
//!
//! Layered layout in two stages:
//!
//! 1. Global: rank by depth (petgraph toposort), order each rank by
//!    barycenter sweeps, then centre parents over their children.
//! 2. Local repair: within each rank, sort by the cross-axis coordinate and
//!    push any node closer than the minimum spacing to its predecessor.
//!
//! Stage 1 only minimises crossings; stage 2 is what guarantees that boxes
//! in one rank never overlap. Ties are broken by input order, so the same
//! input always produces the same positions.

use crate::error::KernelError;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction::{Incoming, Outgoing};
use ptree_model::{Edge, Node, NodeId, Position, Tree};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const MAX_SWEEPS: usize = 8;

/// Axis along which ranks advance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Ranks advance along x; siblings stack along y
    #[default]
    LeftToRight,
    /// Ranks advance along y; siblings spread along x
    TopToBottom,
}

/// Node geometry and spacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    /// Gap between consecutive ranks
    pub rank_spacing: f64,
    /// Minimum gap between neighbours in one rank
    pub node_spacing: f64,
    /// Extra room around each box during global placement
    pub padding: f64,
    /// Offset of the whole drawing from the origin
    pub margin: f64,
    pub direction: Direction,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 600.0,
            node_height: 200.0,
            rank_spacing: 300.0,
            node_spacing: 250.0,
            padding: 20.0,
            margin: 100.0,
            direction: Direction::LeftToRight,
        }
    }
}

impl LayoutConfig {
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn with_node_size(mut self, width: f64, height: f64) -> Self {
        self.node_width = width;
        self.node_height = height;
        self
    }

    #[must_use]
    pub fn with_spacing(mut self, rank_spacing: f64, node_spacing: f64) -> Self {
        self.rank_spacing = rank_spacing;
        self.node_spacing = node_spacing;
        self
    }

    /// Box extent along the rank axis
    fn main_extent(&self) -> f64 {
        match self.direction {
            Direction::LeftToRight => self.node_width,
            Direction::TopToBottom => self.node_height,
        }
    }

    /// Box extent across ranks
    fn cross_extent(&self) -> f64 {
        match self.direction {
            Direction::LeftToRight => self.node_height,
            Direction::TopToBottom => self.node_width,
        }
    }

    /// Smallest allowed distance between same-rank positions
    #[must_use]
    pub fn min_separation(&self) -> f64 {
        self.cross_extent() + self.node_spacing
    }
}

/// Where one node ended up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub id: NodeId,
    /// Depth from the root
    pub rank: usize,
    /// Index within the rank after repair
    pub order: usize,
    pub position: Position,
}

/// Positions for a node set, in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    placements: Vec<Placement>,
    index: HashMap<NodeId, usize>,
}

impl Layout {
    #[must_use]
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Placement> {
        self.index.get(id).map(|&i| &self.placements[i])
    }

    #[must_use]
    pub fn position(&self, id: &NodeId) -> Option<Position> {
        self.get(id).map(|p| p.position)
    }

    #[must_use]
    pub fn rank(&self, id: &NodeId) -> Option<usize> {
        self.get(id).map(|p| p.rank)
    }

    /// Number of ranks
    #[must_use]
    pub fn depth(&self) -> usize {
        self.placements.iter().map(|p| p.rank + 1).max().unwrap_or(0)
    }

    /// Write positions into `nodes`; returns how many were placed
    pub fn apply(&self, nodes: &mut [Node]) -> usize {
        let mut placed = 0;
        for node in nodes {
            if let Some(position) = self.position(&node.id) {
                node.position = position;
                placed += 1;
            }
        }
        placed
    }
}

/// Assigns positions to tree nodes
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    #[must_use]
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out `tree` and write the positions into its nodes
    pub fn apply(&self, tree: &mut Tree) -> Result<Layout, KernelError> {
        let layout = self.layout(&tree.nodes, &tree.edges)?;
        layout.apply(&mut tree.nodes);
        Ok(layout)
    }

    /// Compute positions for `nodes` connected by `edges`
    #[allow(clippy::cast_precision_loss)]
    pub fn layout(&self, nodes: &[Node], edges: &[Edge]) -> Result<Layout, KernelError> {
        if nodes.is_empty() {
            return Ok(Layout::default());
        }

        let mut graph: DiGraph<&NodeId, ()> = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut lookup: HashMap<&NodeId, NodeIndex> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            lookup.insert(&node.id, graph.add_node(&node.id));
        }
        for edge in edges {
            let source = *lookup
                .get(&edge.source)
                .ok_or_else(|| KernelError::UnknownEndpoint(edge.source.clone()))?;
            let target = *lookup
                .get(&edge.target)
                .ok_or_else(|| KernelError::UnknownEndpoint(edge.target.clone()))?;
            graph.update_edge(source, target, ());
        }

        let sorted = toposort(&graph, None)
            .map_err(|cycle| KernelError::Cyclic(graph[cycle.node_id()].clone()))?;

        let count = nodes.len();
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut succs: Vec<Vec<usize>> = vec![Vec::new(); count];
        for ix in graph.node_indices() {
            preds[ix.index()] = graph.neighbors_directed(ix, Incoming).map(NodeIndex::index).collect();
            succs[ix.index()] = graph.neighbors_directed(ix, Outgoing).map(NodeIndex::index).collect();
        }

        let mut rank = vec![0usize; count];
        for ix in sorted {
            let next = rank[ix.index()] + 1;
            for &succ in &succs[ix.index()] {
                rank[succ] = rank[succ].max(next);
            }
        }

        let layer_count = rank.iter().copied().max().unwrap_or(0) + 1;
        let mut layers: Vec<Vec<usize>> = vec![Vec::new(); layer_count];
        for (index, &r) in rank.iter().enumerate() {
            layers[r].push(index);
        }

        let layers = order_layers(layers, &preds, &succs);
        let mut cross = initial_cross(&layers, &succs, &self.config);
        let order = repair(&layers, &mut cross, self.config.min_separation());

        let shift = cross.iter().copied().fold(f64::INFINITY, f64::min);
        let main_step = self.config.main_extent() + self.config.padding + self.config.rank_spacing;

        let placements: Vec<Placement> = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let main = self.config.margin + rank[index] as f64 * main_step;
                let across = self.config.margin + cross[index] - shift;
                let position = match self.config.direction {
                    Direction::LeftToRight => Position::new(main, across),
                    Direction::TopToBottom => Position::new(across, main),
                };
                Placement {
                    id: node.id.clone(),
                    rank: rank[index],
                    order: order[index],
                    position,
                }
            })
            .collect();

        debug!(nodes = count, ranks = layer_count, "computed layout");
        let index = placements
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        Ok(Layout { placements, index })
    }
}

/// Barycenter sweeps; keeps the ordering with the fewest crossings
fn order_layers(layers: Vec<Vec<usize>>, preds: &[Vec<usize>], succs: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let count = preds.len();
    let mut best_crossings = count_crossings(&layers, succs, count);
    let mut best = layers.clone();
    let mut current = layers;

    for _ in 0..MAX_SWEEPS {
        if best_crossings == 0 {
            break;
        }
        for layer in 1..current.len() {
            let slots = slot_map(&current[layer - 1], count);
            sort_by_barycenter(&mut current[layer], preds, &slots);
        }
        for layer in (0..current.len().saturating_sub(1)).rev() {
            let slots = slot_map(&current[layer + 1], count);
            sort_by_barycenter(&mut current[layer], succs, &slots);
        }

        let crossings = count_crossings(&current, succs, count);
        if crossings >= best_crossings {
            break;
        }
        best_crossings = crossings;
        best.clone_from(&current);
    }
    best
}

fn slot_map(layer: &[usize], count: usize) -> Vec<Option<usize>> {
    let mut slots = vec![None; count];
    for (slot, &node) in layer.iter().enumerate() {
        slots[node] = Some(slot);
    }
    slots
}

/// Stable sort by mean neighbour slot; nodes without neighbours keep theirs
#[allow(clippy::cast_precision_loss)]
fn sort_by_barycenter(layer: &mut [usize], adjacent: &[Vec<usize>], slots: &[Option<usize>]) {
    let mut keyed: Vec<(f64, usize)> = layer
        .iter()
        .enumerate()
        .map(|(own_slot, &node)| {
            let found: Vec<usize> = adjacent[node].iter().filter_map(|&n| slots[n]).collect();
            let key = if found.is_empty() {
                own_slot as f64
            } else {
                found.iter().sum::<usize>() as f64 / found.len() as f64
            };
            (key, node)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    for (dst, (_, node)) in layer.iter_mut().zip(keyed) {
        *dst = node;
    }
}

fn count_crossings(layers: &[Vec<usize>], succs: &[Vec<usize>], count: usize) -> usize {
    let mut total = 0;
    for pair in layers.windows(2) {
        let below = slot_map(&pair[1], count);
        let mut spans: Vec<(usize, usize)> = Vec::new();
        for (upper, &node) in pair[0].iter().enumerate() {
            for &succ in &succs[node] {
                if let Some(lower) = below[succ] {
                    spans.push((upper, lower));
                }
            }
        }
        for (i, a) in spans.iter().enumerate() {
            for b in &spans[i + 1..] {
                if (a.0 < b.0 && a.1 > b.1) || (a.0 > b.0 && a.1 < b.1) {
                    total += 1;
                }
            }
        }
    }
    total
}

/// Slot-based coordinates, then parents centred over their children
#[allow(clippy::cast_precision_loss)]
fn initial_cross(layers: &[Vec<usize>], succs: &[Vec<usize>], config: &LayoutConfig) -> Vec<f64> {
    let pitch = config.cross_extent() + config.padding + config.node_spacing;
    let mut cross = vec![0.0; succs.len()];
    for layer in layers {
        for (slot, &node) in layer.iter().enumerate() {
            cross[node] = slot as f64 * pitch;
        }
    }
    for layer in layers.iter().rev() {
        for &node in layer {
            let (lo, hi) = succs[node]
                .iter()
                .map(|&c| cross[c])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            if lo.is_finite() {
                cross[node] = (lo + hi) / 2.0;
            }
        }
    }
    cross
}

/// Enforce the minimum gap within each rank; returns each node's final slot
fn repair(layers: &[Vec<usize>], cross: &mut [f64], min_gap: f64) -> Vec<usize> {
    let mut order = vec![0; cross.len()];
    for layer in layers {
        let mut sorted = layer.clone();
        sorted.sort_by(|&a, &b| cross[a].total_cmp(&cross[b]));

        let mut previous: Option<f64> = None;
        for (slot, &node) in sorted.iter().enumerate() {
            if let Some(prev) = previous {
                let floor = prev + min_gap;
                if cross[node] < floor {
                    cross[node] = floor;
                }
            }
            previous = Some(cross[node]);
            order[node] = slot;
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ptree_model::Candidate;

    fn fan(children: usize) -> Tree {
        let mut tree = Tree::from_prompt("root").unwrap();
        let root = tree.root().unwrap().id.clone();
        let kids = (0..children).map(|i| Candidate::new(format!("c{i}"), "", Vec::new())).collect();
        tree.attach_candidates(&root, kids).unwrap();
        tree
    }

    #[test]
    fn single_node_sits_at_margin() {
        let tree = Tree::from_prompt("only").unwrap();
        let layout = LayoutEngine::default().layout(&tree.nodes, &tree.edges).unwrap();
        assert_eq!(layout.position(&tree.nodes[0].id), Some(Position::new(100.0, 100.0)));
        assert_eq!(layout.depth(), 1);
    }

    #[test]
    fn children_are_one_rank_right_of_parent() {
        let tree = fan(3);
        let layout = LayoutEngine::default().layout(&tree.nodes, &tree.edges).unwrap();
        let root = layout.get(&tree.nodes[0].id).unwrap();
        assert_eq!(root.rank, 0);
        for child in &tree.nodes[1..] {
            let placed = layout.get(&child.id).unwrap();
            assert_eq!(placed.rank, 1);
            assert_eq!(placed.position.x, 100.0 + 600.0 + 20.0 + 300.0);
        }
    }

    #[test]
    fn siblings_keep_input_order_and_spacing() {
        let tree = fan(3);
        let layout = LayoutEngine::default().layout(&tree.nodes, &tree.edges).unwrap();
        let ys: Vec<f64> = tree.nodes[1..]
            .iter()
            .map(|n| layout.position(&n.id).unwrap().y)
            .collect();
        assert!(ys.windows(2).all(|w| w[1] - w[0] >= 450.0));
        let orders: Vec<usize> = tree.nodes[1..].iter().map(|n| layout.get(&n.id).unwrap().order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn parent_is_centred_over_children() {
        let tree = fan(3);
        let layout = LayoutEngine::default().layout(&tree.nodes, &tree.edges).unwrap();
        let root_y = layout.position(&tree.nodes[0].id).unwrap().y;
        let middle_y = layout.position(&tree.nodes[2].id).unwrap().y;
        assert_eq!(root_y, middle_y);
    }

    #[test]
    fn top_to_bottom_swaps_axes() {
        let tree = fan(2);
        let engine = LayoutEngine::new(LayoutConfig::default().with_direction(Direction::TopToBottom));
        let layout = engine.layout(&tree.nodes, &tree.edges).unwrap();
        let child = layout.position(&tree.nodes[1].id).unwrap();
        assert_eq!(child.y, 100.0 + 200.0 + 20.0 + 300.0);
    }

    #[test]
    fn cyclic_edges_are_rejected() {
        let tree = fan(1);
        let mut edges = tree.edges.clone();
        edges.push(Edge::link(&tree.nodes[1].id, &tree.nodes[0].id));
        assert!(matches!(
            LayoutEngine::default().layout(&tree.nodes, &edges),
            Err(KernelError::Cyclic(_))
        ));
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let tree = fan(1);
        let mut edges = tree.edges.clone();
        edges.push(Edge::link(&tree.nodes[0].id, &NodeId::from_raw("ghost")));
        assert_eq!(
            LayoutEngine::default().layout(&tree.nodes, &edges),
            Err(KernelError::UnknownEndpoint(NodeId::from_raw("ghost")))
        );
    }

    #[test]
    fn apply_writes_positions_into_tree() {
        let mut tree = fan(2);
        let layout = LayoutEngine::default().apply(&mut tree).unwrap();
        for node in &tree.nodes {
            assert_eq!(Some(node.position), layout.position(&node.id));
        }
    }

    #[test]
    fn barycenter_untangles_crossed_input() {
        // Two parents whose children arrive in swapped order.
        let mut tree = fan(2);
        let a = tree.nodes[1].id.clone();
        let b = tree.nodes[2].id.clone();
        tree.attach_candidates(&b, vec![Candidate::new("b1", "", Vec::new())]).unwrap();
        tree.attach_candidates(&a, vec![Candidate::new("a1", "", Vec::new())]).unwrap();

        let layout = LayoutEngine::default().layout(&tree.nodes, &tree.edges).unwrap();
        let y = |id: &NodeId| layout.position(id).unwrap().y;
        let (a1, b1) = (&tree.nodes[4].id, &tree.nodes[3].id);
        assert_eq!(y(&a) < y(&b), y(a1) < y(b1));
    }
}
