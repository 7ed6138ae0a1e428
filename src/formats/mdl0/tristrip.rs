//! Triangle strip construction.
//!
//! Triangles are joined into strips greedily: starting from the least
//! connected triangle, walk across shared edges appending the opposite
//! vertex each step. Triangles that never connect are emitted as a plain
//! triangle draw at the end.

use std::collections::VecDeque;

use ahash::AHashMap;

/// One facepoint: the index columns for a single vertex.
pub type Facepoint = Vec<u16>;

type Edge = (Facepoint, Facepoint);

struct Triangle {
    vertices: [Facepoint; 3],
    used: bool,
}

impl Triangle {
    fn edge(&self, i: usize) -> Edge {
        (
            self.vertices[i].clone(),
            self.vertices[(i + 1) % 3].clone(),
        )
    }

    /// The vertex not on edge `i`.
    fn opposite(&self, edge: &Edge) -> Option<Facepoint> {
        self.vertices
            .iter()
            .find(|v| **v != edge.0 && **v != edge.1)
            .cloned()
    }
}

fn edge_key(a: &Facepoint, b: &Facepoint) -> Edge {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Groups triangles into strips and leftover triangles.
pub struct TriangleSet {
    triangles: Vec<Triangle>,
    edges: AHashMap<Edge, Vec<usize>>,
}

pub struct StripResult {
    /// Each strip as an ordered facepoint run, at least three long.
    pub strips: Vec<Vec<Facepoint>>,
    /// Triangles that could not be joined to anything.
    pub triangles: Vec<[Facepoint; 3]>,
}

impl TriangleSet {
    pub fn new(tris: impl IntoIterator<Item = [Facepoint; 3]>) -> Self {
        let mut triangles = Vec::new();
        let mut edges: AHashMap<Edge, Vec<usize>> = AHashMap::new();
        for vertices in tris {
            // skip degenerate triangles
            if vertices[0] == vertices[1]
                || vertices[1] == vertices[2]
                || vertices[0] == vertices[2]
            {
                continue;
            }
            let index = triangles.len();
            for i in 0..3 {
                let key = edge_key(&vertices[i], &vertices[(i + 1) % 3]);
                edges.entry(key).or_default().push(index);
            }
            triangles.push(Triangle {
                vertices,
                used: false,
            });
        }
        Self { triangles, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    fn adjacent(&self, edge: &Edge, current: usize) -> Option<usize> {
        let key = edge_key(&edge.0, &edge.1);
        self.edges.get(&key).and_then(|tris| {
            tris.iter()
                .copied()
                .find(|&t| t != current && !self.triangles[t].used)
        })
    }

    fn connection_count(&self, index: usize) -> usize {
        let tri = &self.triangles[index];
        (0..3)
            .map(|i| {
                let key = edge_key(&tri.vertices[i], &tri.vertices[(i + 1) % 3]);
                self.edges.get(&key).map(|t| t.len() - 1).unwrap_or(0)
            })
            .sum()
    }

    fn extend_right(&mut self, current: usize, strip: &mut VecDeque<Facepoint>, mut last: Edge) {
        let mut current = current;
        while let Some(next) = self.adjacent(&last, current) {
            self.triangles[next].used = true;
            let vert = match self.triangles[next].opposite(&last) {
                Some(v) => v,
                None => break,
            };
            strip.push_back(vert.clone());
            last = (last.1, vert);
            current = next;
        }
    }

    fn create_strip(&mut self, start: usize) -> Option<Vec<Facepoint>> {
        for i in 0..3 {
            let edge = self.triangles[start].edge(i);
            if let Some(adjacent) = self.adjacent(&edge, start) {
                self.triangles[start].used = true;
                self.triangles[adjacent].used = true;
                let verts = self.triangles[start].vertices.clone();
                let right = match self.triangles[adjacent].opposite(&edge) {
                    Some(v) => v,
                    None => return Some(verts.to_vec()),
                };
                let mut strip = VecDeque::from(vec![
                    verts[(i + 2) % 3].clone(),
                    verts[i].clone(),
                    verts[(i + 1) % 3].clone(),
                    right.clone(),
                ]);
                let last = (verts[(i + 1) % 3].clone(), right);
                self.extend_right(adjacent, &mut strip, last);
                return Some(strip.into());
            }
        }
        None
    }

    /// Builds strips, longest chains first from the least connected seeds.
    pub fn build(mut self) -> StripResult {
        let mut order: Vec<usize> = (0..self.triangles.len()).collect();
        let counts: Vec<usize> = order.iter().map(|&i| self.connection_count(i)).collect();
        order.sort_by_key(|&i| counts[i]);

        let mut strips = Vec::new();
        let mut leftover = Vec::new();
        for index in order {
            if self.triangles[index].used {
                continue;
            }
            if counts[index] == 0 {
                self.triangles[index].used = true;
                leftover.push(self.triangles[index].vertices.clone());
                continue;
            }
            match self.create_strip(index) {
                Some(strip) => strips.push(strip),
                None => {
                    self.triangles[index].used = true;
                    leftover.push(self.triangles[index].vertices.clone());
                }
            }
        }
        StripResult {
            strips,
            triangles: leftover,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fp(i: u16) -> Facepoint {
        vec![i]
    }

    fn tri(a: u16, b: u16, c: u16) -> [Facepoint; 3] {
        [fp(a), fp(b), fp(c)]
    }

    #[test]
    fn quad_becomes_one_strip() {
        let set = TriangleSet::new(vec![tri(0, 1, 2), tri(2, 1, 3)]);
        let result = set.build();
        assert_eq!(result.triangles.len(), 0);
        assert_eq!(result.strips.len(), 1);
        assert_eq!(result.strips[0].len(), 4);
    }

    #[test]
    fn isolated_triangle_stays_a_triangle() {
        let set = TriangleSet::new(vec![tri(0, 1, 2), tri(10, 11, 12)]);
        let result = set.build();
        assert_eq!(result.strips.len(), 0);
        assert_eq!(result.triangles.len(), 2);
    }

    #[test]
    fn degenerate_triangles_are_dropped() {
        let set = TriangleSet::new(vec![tri(0, 0, 1)]);
        assert!(set.is_empty());
    }

    #[test]
    fn long_fan_extends_right() {
        // a strip of 4 triangles over 6 vertices
        let set = TriangleSet::new(vec![
            tri(0, 1, 2),
            tri(2, 1, 3),
            tri(2, 3, 4),
            tri(4, 3, 5),
        ]);
        let result = set.build();
        // every input triangle is accounted for exactly once
        let tris_in_strips: usize = result.strips.iter().map(|s| s.len() - 2).sum();
        assert_eq!(tris_in_strips + result.triangles.len(), 4);
    }
}
