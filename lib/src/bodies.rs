//! Orbit nodes and the registry that holds them.
//!
//! The registry is declared as an adjacency list of [`NodeSpec`]s (node
//! name → parent name), validated once, and materialized into an
//! immutable arena ordered so that every parent precedes its children.

use std::{collections::HashMap, f64::consts, sync::Arc};

use color_eyre::eyre::{self, bail, OptionExt};
use itertools::Itertools;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    arena::{Arena, IdLike},
    config::ensure_finite,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u32);

impl IdLike for NodeId {
    fn from_raw(index: usize) -> Self {
        Self(index as u32)
    }

    fn into_raw(self) -> usize {
        self.0 as usize
    }
}

/// Whether a node is something you can see or only a frame of reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    PhysicalBody,
    ReferenceFrame,
}

/// Shape of the motion a node performs around its parent's pivot.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OrbitShape {
    /// Uniform circular motion, expressed as a rotation of the orbit
    /// sub-frame followed by an offset of `radius` along its X axis.
    Circular { radius: f64 },
    /// Position `(cos θ · semi_major, 0, sin θ · semi_minor)`, no rotation.
    Elliptical { semi_major: f64, semi_minor: f64 },
}

impl Default for OrbitShape {
    fn default() -> Self {
        OrbitShape::Circular { radius: 0.0 }
    }
}

/// Rendering attributes. The engine never looks at these.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Appearance {
    pub size: f64,
    pub color: Option<[u8; 3]>,
    pub texture: Option<Arc<str>>,
}

/// Declares that a node's anomaly is another node's anomaly plus a fixed
/// offset, instead of its own speed and phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouplingSpec {
    pub source: Arc<str>,
    #[serde(default)]
    pub offset_deg: f64,
}

/// One row of the declarative node table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: Arc<str>,
    pub kind: NodeKind,
    #[serde(default)]
    pub parent: Option<Arc<str>>,
    #[serde(default)]
    pub center: [f64; 3],
    #[serde(default)]
    pub tilt_a_deg: f64,
    #[serde(default)]
    pub tilt_b_deg: f64,
    #[serde(default)]
    pub shape: OrbitShape,
    /// `rad/day`
    #[serde(default)]
    pub angular_speed: f64,
    #[serde(default)]
    pub start_phase_deg: f64,
    /// `rad/day`
    #[serde(default)]
    pub spin_speed: Option<f64>,
    #[serde(default)]
    pub coupling: Option<CouplingSpec>,
    #[serde(default)]
    pub appearance: Appearance,
}

impl NodeSpec {
    fn new(name: &str, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            center: [0.0; 3],
            tilt_a_deg: 0.0,
            tilt_b_deg: 0.0,
            shape: OrbitShape::default(),
            angular_speed: 0.0,
            start_phase_deg: 0.0,
            spin_speed: None,
            coupling: None,
            appearance: Appearance::default(),
        }
    }

    pub fn body(name: &str) -> Self {
        Self::new(name, NodeKind::PhysicalBody)
    }

    pub fn frame(name: &str) -> Self {
        Self::new(name, NodeKind::ReferenceFrame)
    }

    #[must_use]
    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn center(mut self, x: f64, y: f64, z: f64) -> Self {
        self.center = [x, y, z];
        self
    }

    #[must_use]
    pub fn tilt(mut self, a_deg: f64, b_deg: f64) -> Self {
        self.tilt_a_deg = a_deg;
        self.tilt_b_deg = b_deg;
        self
    }

    #[must_use]
    pub fn circular(mut self, radius: f64) -> Self {
        self.shape = OrbitShape::Circular { radius };
        self
    }

    #[must_use]
    pub fn elliptical(mut self, semi_major: f64, semi_minor: f64) -> Self {
        self.shape = OrbitShape::Elliptical {
            semi_major,
            semi_minor,
        };
        self
    }

    #[must_use]
    pub fn speed(mut self, rad_per_day: f64) -> Self {
        self.angular_speed = rad_per_day;
        self
    }

    /// Angular speed from a signed period in days. A zero period means
    /// the node does not move.
    #[must_use]
    pub fn period(self, days: f64) -> Self {
        self.speed(period_to_speed(days))
    }

    #[must_use]
    pub fn phase(mut self, deg: f64) -> Self {
        self.start_phase_deg = deg;
        self
    }

    #[must_use]
    pub fn spin_period(mut self, days: f64) -> Self {
        self.spin_speed = Some(period_to_speed(days));
        self
    }

    #[must_use]
    pub fn coupled_to(mut self, source: &str, offset_deg: f64) -> Self {
        self.coupling = Some(CouplingSpec {
            source: source.into(),
            offset_deg,
        });
        self
    }

    #[must_use]
    pub fn appearance(mut self, size: f64, color: [u8; 3]) -> Self {
        self.appearance.size = size;
        self.appearance.color = Some(color);
        self
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.name.is_empty() {
            bail!("node with an empty name");
        }
        let name = &self.name;
        ensure_finite(&format!("{name}.center.x"), self.center[0])?;
        ensure_finite(&format!("{name}.center.y"), self.center[1])?;
        ensure_finite(&format!("{name}.center.z"), self.center[2])?;
        ensure_finite(&format!("{name}.tilt_a_deg"), self.tilt_a_deg)?;
        ensure_finite(&format!("{name}.tilt_b_deg"), self.tilt_b_deg)?;
        ensure_finite(&format!("{name}.angular_speed"), self.angular_speed)?;
        ensure_finite(&format!("{name}.start_phase_deg"), self.start_phase_deg)?;
        if let Some(spin) = self.spin_speed {
            ensure_finite(&format!("{name}.spin_speed"), spin)?;
        }
        if let Some(coupling) = &self.coupling {
            ensure_finite(&format!("{name}.coupling.offset_deg"), coupling.offset_deg)?;
        }
        match self.shape {
            OrbitShape::Circular { radius } => {
                ensure_finite(&format!("{name}.radius"), radius)?;
                if radius < 0.0 {
                    bail!("{name}: negative orbit radius {radius}");
                }
            }
            OrbitShape::Elliptical {
                semi_major,
                semi_minor,
            } => {
                ensure_finite(&format!("{name}.semi_major"), semi_major)?;
                ensure_finite(&format!("{name}.semi_minor"), semi_minor)?;
                if semi_major < 0.0 || semi_minor < 0.0 {
                    bail!("{name}: negative semi-axis ({semi_major}, {semi_minor})");
                }
            }
        }
        Ok(())
    }
}

fn period_to_speed(days: f64) -> f64 {
    if days == 0.0 {
        0.0
    } else {
        2.0 * consts::PI / days
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Coupling {
    pub source: NodeId,
    /// `rad`
    pub offset: f64,
}

/// A validated orbit node. Angles are stored in radians.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitNode {
    pub id: NodeId,
    pub name: Arc<str>,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// In table order.
    pub children: Vec<NodeId>,
    pub center: Vector3<f64>,
    pub tilt_a: f64,
    pub tilt_b: f64,
    pub shape: OrbitShape,
    /// `rad/day`
    pub angular_speed: f64,
    pub start_phase: f64,
    /// `rad/day`
    pub spin_speed: Option<f64>,
    pub coupling: Option<Coupling>,
    pub appearance: Appearance,
}

impl OrbitNode {
    /// Anomaly from this node's own speed and phase.
    pub fn own_anomaly(&self, t: f64) -> f64 {
        self.angular_speed * t - self.start_phase
    }

    pub fn spin_angle(&self, t: f64) -> Option<f64> {
        self.spin_speed.map(|speed| speed * t)
    }

    pub fn is_physical(&self) -> bool {
        self.kind == NodeKind::PhysicalBody
    }
}

/// The immutable node table.
#[derive(Clone, Debug)]
pub struct Registry {
    nodes: Arena<NodeId, OrbitNode>,
    by_name: HashMap<Arc<str>, NodeId>,
    root: NodeId,
}

impl Registry {
    pub fn build(specs: impl IntoIterator<Item = NodeSpec>) -> eyre::Result<Self> {
        let specs: Vec<NodeSpec> = specs.into_iter().collect();
        if specs.is_empty() {
            bail!("node table is empty");
        }
        for spec in &specs {
            spec.validate()?;
        }

        let duplicates = specs.iter().map(|s| &s.name).duplicates().join(", ");
        if !duplicates.is_empty() {
            bail!("duplicate node names: {duplicates}");
        }
        let index: HashMap<&str, usize> = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (&*s.name, i))
            .collect();

        let roots = specs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.parent.is_none())
            .map(|(i, _)| i)
            .collect_vec();
        let root = match roots.as_slice() {
            [root] => *root,
            [] => bail!("node table has no root (every node names a parent)"),
            many => bail!(
                "node table has {} roots: {}",
                many.len(),
                many.iter().map(|&i| &specs[i].name).join(", ")
            ),
        };

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            if let Some(parent) = &spec.parent {
                let p = *index.get(&**parent).ok_or_else(|| {
                    eyre::eyre!("{}: parent {parent:?} does not exist", spec.name)
                })?;
                children[p].push(i);
            }
        }

        // Depth-first preorder from the root; parents land before children.
        let mut order = Vec::with_capacity(specs.len());
        let mut visited = vec![false; specs.len()];
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            visited[i] = true;
            order.push(i);
            stack.extend(children[i].iter().rev().copied());
        }
        if order.len() != specs.len() {
            let stray = specs
                .iter()
                .zip(&visited)
                .filter(|(_, v)| !**v)
                .map(|(s, _)| &s.name)
                .join(", ");
            bail!("nodes not reachable from the root (parent cycle): {stray}");
        }

        let mut ids = vec![NodeId(0); specs.len()];
        for (position, &i) in order.iter().enumerate() {
            ids[i] = NodeId::from_raw(position);
        }

        let mut nodes = Arena::with_capacity(specs.len());
        for &i in &order {
            let spec = &specs[i];
            let coupling = match &spec.coupling {
                None => None,
                Some(c) => {
                    let source = *index.get(&*c.source).ok_or_else(|| {
                        eyre::eyre!("{}: coupling source {:?} does not exist", spec.name, c.source)
                    })?;
                    if source == i {
                        bail!("{}: node is coupled to itself", spec.name);
                    }
                    if specs[source].coupling.is_some() {
                        bail!(
                            "{}: coupling source {} is itself coupled",
                            spec.name,
                            c.source
                        );
                    }
                    Some(Coupling {
                        source: ids[source],
                        offset: c.offset_deg.to_radians(),
                    })
                }
            };
            nodes.push(OrbitNode {
                id: ids[i],
                name: spec.name.clone(),
                kind: spec.kind,
                parent: spec.parent.as_ref().map(|p| ids[index[&**p]]),
                children: children[i].iter().map(|&c| ids[c]).collect(),
                center: Vector3::from(spec.center),
                tilt_a: spec.tilt_a_deg.to_radians(),
                tilt_b: spec.tilt_b_deg.to_radians(),
                shape: spec.shape,
                angular_speed: spec.angular_speed,
                start_phase: spec.start_phase_deg.to_radians(),
                spin_speed: spec.spin_speed,
                coupling,
                appearance: spec.appearance.clone(),
            });
        }

        let by_name = nodes.iter().map(|(id, n)| (n.name.clone(), id)).collect();
        let registry = Self {
            nodes,
            by_name,
            root: ids[root],
        };
        info!(
            nodes = registry.len(),
            bodies = registry.bodies().count(),
            "built orbit-node registry"
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&OrbitNode> {
        self.nodes.get(id)
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Like [`Registry::lookup`], for names the host cannot run without.
    pub fn require(&self, name: &str) -> eyre::Result<NodeId> {
        self.lookup(name)
            .ok_or_eyre(format!("node {name:?} is not in the registry"))
    }

    /// Nodes in topological order.
    pub fn iter(&self) -> impl Iterator<Item = &OrbitNode> {
        self.nodes.values()
    }

    pub fn bodies(&self) -> impl Iterator<Item = &OrbitNode> {
        self.iter().filter(|n| n.is_physical())
    }

    /// Path from the root down to `id`, both included.
    pub fn lineage(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Anomaly of `id` at time `t` (`rad`).
    ///
    /// A coupled node takes its source's anomaly, computed from the source's
    /// static parameters, plus its offset.
    pub fn anomaly(&self, id: NodeId, t: f64) -> f64 {
        let node = &self.nodes[id];
        match node.coupling {
            Some(coupling) => self.nodes[coupling.source].own_anomaly(t) + coupling.offset,
            None => node.own_anomaly(t),
        }
    }

    pub(crate) fn log_summary(&self) {
        for node in self.iter() {
            debug!(
                name = %node.name,
                parent = ?node.parent.map(|p| &*self.nodes[p].name),
                kind = ?node.kind,
                children = node.children.len(),
                "node"
            );
        }
    }
}

impl std::ops::Index<NodeId> for Registry {
    type Output = OrbitNode;

    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index]
    }
}

#[cfg(test)]
fn small_table() -> Vec<NodeSpec> {
    vec![
        NodeSpec::body("planet")
            .parent("star")
            .circular(10.0)
            .period(100.0),
        NodeSpec::frame("origin"),
        NodeSpec::body("moon").parent("planet").circular(1.0).period(10.0),
        NodeSpec::body("star").parent("origin"),
        NodeSpec::frame("marker")
            .parent("origin")
            .coupled_to("planet", 90.0),
    ]
}

#[test]
fn parents_precede_children() {
    let registry = Registry::build(small_table()).unwrap();
    assert_eq!(registry.len(), 5);
    assert_eq!(registry[registry.root()].name.as_ref(), "origin");
    for node in registry.iter() {
        if let Some(parent) = node.parent {
            assert!(parent < node.id, "{} before its parent", node.name);
        }
    }
    let moon = registry.lookup("moon").unwrap();
    let names = registry
        .lineage(moon)
        .into_iter()
        .map(|id| registry[id].name.to_string())
        .collect_vec();
    assert_eq!(names, ["origin", "star", "planet", "moon"]);

    let child_names = |name: &str| {
        registry[registry.lookup(name).unwrap()]
            .children
            .iter()
            .map(|&id| registry[id].name.to_string())
            .collect_vec()
    };
    assert_eq!(child_names("origin"), ["star", "marker"]);
    assert_eq!(child_names("planet"), ["moon"]);
    assert!(child_names("moon").is_empty());
    for node in registry.iter() {
        for &child in &node.children {
            assert_eq!(registry[child].parent, Some(node.id));
        }
    }
    assert_eq!(registry.bodies().count(), 3);
}

#[test]
fn coupled_anomaly_follows_source() {
    let registry = Registry::build(small_table()).unwrap();
    let planet = registry.lookup("planet").unwrap();
    let marker = registry.lookup("marker").unwrap();
    for t in [-500.0, 0.0, 12.5, 1e4] {
        let expected = registry.anomaly(planet, t) + consts::FRAC_PI_2;
        assert!((registry.anomaly(marker, t) - expected).abs() < 1e-12);
    }
}

#[test]
fn malformed_tables_are_rejected() {
    let mut dup = small_table();
    dup.push(NodeSpec::body("moon").parent("star"));
    let err = Registry::build(dup).unwrap_err().to_string();
    assert!(err.contains("duplicate"), "{err}");

    let mut dangling = small_table();
    dangling.push(NodeSpec::body("comet").parent("nowhere"));
    let err = Registry::build(dangling).unwrap_err().to_string();
    assert!(err.contains("nowhere"), "{err}");

    let mut cycle = small_table();
    cycle.push(NodeSpec::frame("a").parent("b"));
    cycle.push(NodeSpec::frame("b").parent("a"));
    let err = Registry::build(cycle).unwrap_err().to_string();
    assert!(err.contains("cycle"), "{err}");

    let mut two_roots = small_table();
    two_roots.push(NodeSpec::frame("elsewhere"));
    assert!(Registry::build(two_roots).is_err());

    let mut nan = small_table();
    nan.push(NodeSpec::body("bad").parent("star").circular(f64::NAN));
    let err = Registry::build(nan).unwrap_err().to_string();
    assert!(err.contains("bad.radius"), "{err}");

    let mut chained = small_table();
    chained.push(NodeSpec::frame("echo").parent("origin").coupled_to("marker", 0.0));
    assert!(Registry::build(chained).is_err());

    assert!(Registry::build(Vec::new()).is_err());
}

#[test]
fn node_table_parses_from_toml() {
    #[derive(Deserialize)]
    struct Table {
        node: Vec<NodeSpec>,
    }
    let table: Table = toml::from_str(
        r#"
        [[node]]
        name = "root"
        kind = "reference-frame"

        [[node]]
        name = "comet"
        kind = "physical-body"
        parent = "root"
        angular_speed = 0.01
        shape = { kind = "elliptical", semi_major = 30.0, semi_minor = 8.0 }
        "#,
    )
    .unwrap();
    let registry = Registry::build(table.node).unwrap();
    let comet = &registry[registry.require("comet").unwrap()];
    assert_eq!(
        comet.shape,
        OrbitShape::Elliptical {
            semi_major: 30.0,
            semi_minor: 8.0
        }
    );
    assert!(registry.require("halley").is_err());
}
