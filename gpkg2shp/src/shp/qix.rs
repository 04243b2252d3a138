//! Index spatial quadtree (.qix), format "SQT" de MapServer/GDAL
//!
//! L'arbre est construit comme shapelib: chaque noeud est coupé en deux le
//! long de son plus grand côté (ratio 0.55, les moitiés se chevauchent),
//! puis chaque moitié à nouveau, ce qui donne 4 sous-noeuds. Une forme est
//! rangée dans le noeud le plus profond qui la contient entièrement.

use std::io::{self, Write};

use geo::Rect;

/// Ratio de découpe d'un noeud
const SPLIT_RATIO: f64 = 0.55;

/// Profondeur maximale estimée automatiquement
const MAX_DEFAULT_DEPTH: u32 = 12;

/// Taille fixe d'un noeud sérialisé: offset, emprise, nb formes, nb sous-noeuds
const NODE_FIXED_LEN: u32 = 4 + 32 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    min: [f64; 2],
    max: [f64; 2],
}

impl Bounds {
    fn from_rect(rect: &Rect) -> Self {
        Self {
            min: [rect.min().x, rect.min().y],
            max: [rect.max().x, rect.max().y],
        }
    }

    fn contains(&self, other: &Bounds) -> bool {
        (0..2).all(|d| other.min[d] >= self.min[d] && other.max[d] <= self.max[d])
    }

    /// Coupe en deux moitiés chevauchantes le long du plus grand côté
    fn split(&self) -> (Bounds, Bounds) {
        let axis = if self.max[0] - self.min[0] > self.max[1] - self.min[1] {
            0
        } else {
            1
        };
        let range = self.max[axis] - self.min[axis];

        let mut first = *self;
        let mut second = *self;
        first.max[axis] = self.min[axis] + range * SPLIT_RATIO;
        second.min[axis] = self.max[axis] - range * SPLIT_RATIO;
        (first, second)
    }

    fn quadrants(&self) -> [Bounds; 4] {
        let (half1, half2) = self.split();
        let (q1, q2) = half1.split();
        let (q3, q4) = half2.split();
        [q1, q2, q3, q4]
    }
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Bounds,
    ids: Vec<i32>,
    children: Vec<Node>,
}

impl Node {
    fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            ids: Vec::new(),
            children: Vec::new(),
        }
    }

    fn insert(&mut self, id: i32, shape: &Bounds, depth: u32) {
        if depth > 1 {
            if self.children.is_empty() {
                let quadrants = self.bounds.quadrants();
                if quadrants.iter().any(|q| q.contains(shape)) {
                    self.children = quadrants.into_iter().map(Node::new).collect();
                }
            }
            if let Some(child) = self
                .children
                .iter_mut()
                .find(|c| c.bounds.contains(shape))
            {
                child.insert(id, shape, depth - 1);
                return;
            }
        }
        self.ids.push(id);
    }

    /// Supprime les sous-noeuds vides; retourne true si le noeud est vide
    fn trim(&mut self) -> bool {
        self.children.retain_mut(|child| !child.trim());

        // Un noeud sans forme et avec un seul fils est remplacé par ce fils
        if self.ids.is_empty() && self.children.len() == 1 {
            if let Some(child) = self.children.pop() {
                *self = child;
            }
        }

        self.ids.is_empty() && self.children.is_empty()
    }

    /// Taille sérialisée de ce noeud seul
    fn own_len(&self) -> u32 {
        NODE_FIXED_LEN + 4 * self.ids.len() as u32
    }

    /// Taille sérialisée de tous les descendants
    fn subtree_len(&self) -> u32 {
        self.children
            .iter()
            .map(|c| c.own_len() + c.subtree_len())
            .sum()
    }

    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.subtree_len().to_le_bytes())?;
        for v in [
            self.bounds.min[0],
            self.bounds.min[1],
            self.bounds.max[0],
            self.bounds.max[1],
        ] {
            w.write_all(&v.to_le_bytes())?;
        }
        w.write_all(&(self.ids.len() as i32).to_le_bytes())?;
        for id in &self.ids {
            w.write_all(&id.to_le_bytes())?;
        }
        w.write_all(&(self.children.len() as i32).to_le_bytes())?;
        for child in &self.children {
            child.write(w)?;
        }
        Ok(())
    }

    fn count_nodes(&self) -> usize {
        1 + self.children.iter().map(Node::count_nodes).sum::<usize>()
    }
}

/// Quadtree des emprises d'un Shapefile
#[derive(Debug, Clone)]
pub struct QuadTree {
    root: Node,
    max_depth: u32,
    shape_count: u32,
}

/// Profondeur automatique: environ 8 formes par feuille, au plus 12 niveaux
pub fn auto_depth(shape_count: usize) -> u32 {
    let mut depth = 0;
    let mut max_node_count: usize = 1;
    while max_node_count.saturating_mul(4) < shape_count {
        depth += 1;
        max_node_count *= 2;
    }
    depth.min(MAX_DEFAULT_DEPTH)
}

impl QuadTree {
    /// Construit l'arbre; `shapes[i]` est l'emprise de l'enregistrement i (None si nul)
    pub fn build(extent: Option<Rect>, shapes: &[Option<Rect>], max_depth: Option<u32>) -> Self {
        let max_depth = max_depth.unwrap_or_else(|| auto_depth(shapes.len()));
        let bounds = extent.as_ref().map(Bounds::from_rect).unwrap_or(Bounds {
            min: [0.0; 2],
            max: [0.0; 2],
        });

        let mut root = Node::new(bounds);
        let mut shape_count = 0u32;
        for (id, shape) in shapes.iter().enumerate() {
            if let Some(rect) = shape {
                root.insert(id as i32, &Bounds::from_rect(rect), max_depth);
                shape_count += 1;
            }
        }
        root.trim();

        Self {
            root,
            max_depth,
            shape_count,
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }

    /// Écrit l'index: en-tête de 8 octets, nb formes, profondeur, puis les noeuds
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        // "SQT", ordre LSB, version 1, 3 octets réservés
        w.write_all(&[b'S', b'Q', b'T', 1, 1, 0, 0, 0])?;
        w.write_all(&(self.shape_count as i32).to_le_bytes())?;
        w.write_all(&(self.max_depth as i32).to_le_bytes())?;
        self.root.write(w)
    }
}
