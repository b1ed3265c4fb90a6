use approx::assert_relative_eq;

use tinmesh::data::{Constraint, LinearConstraint, PolygonConstraint, Vertex};
use tinmesh::{IncrementalTin, RefinementOptions, RuppertRefiner};

fn v(x: f64, y: f64) -> Vertex {
  Vertex::new(x, y, 0.0)
}

fn grid(n: usize, dx: f64, dy: f64) -> Vec<Vertex> {
  let mut pts = Vec::new();
  for i in 0..n {
    for j in 0..n {
      pts.push(v(i as f64 * dx, j as f64 * dy));
    }
  }
  pts
}

#[test]
fn grid_3x3_delaunay() {
  let mut tin = IncrementalTin::new(1.0).unwrap();
  tin.add_vertices(grid(3, 1.0, 1.0)).unwrap();
  let count = tin.count_triangles();
  assert_eq!(count.valid, 8);
  assert_eq!(count.ghost, 8);
  let bounds = tin.bounds().unwrap();
  assert_eq!(
    (bounds.min_x(), bounds.min_y(), bounds.max_x(), bounds.max_y()),
    (0.0, 0.0, 2.0, 2.0)
  );
}

#[test]
fn grid_5x5_delaunay() {
  let mut tin = IncrementalTin::new(1.0).unwrap();
  tin.add_vertices(grid(5, 1.0, 1.0)).unwrap();
  assert_eq!(tin.count_triangles().valid, 32);
  assert!(tin.is_conformant());
}

#[test]
fn right_triangle_circumcircle() {
  let mut tin = IncrementalTin::new(1.0).unwrap();
  tin
    .add_vertices(vec![v(0.0, 0.0), v(3.0, 0.0), v(0.0, 4.0)])
    .unwrap();
  let tri = tin.triangles().find(|t| !t.is_ghost()).unwrap();
  let circle = tri.circumcircle();
  assert_relative_eq!(circle.x(), 1.5);
  assert_relative_eq!(circle.y(), 2.0);
  assert_relative_eq!(circle.radius(), 2.5);
}

#[test]
fn linear_constraint_on_diagonal_row() {
  let mut tin = IncrementalTin::new(1.0).unwrap();
  tin
    .add_vertices(vec![
      v(0.0, 0.0),
      v(4.0, 0.0),
      v(4.0, 4.0),
      v(0.0, 4.0),
      v(2.0, 2.0),
    ])
    .unwrap();
  let constraint = LinearConstraint::from_vertices(vec![v(0.0, 2.0), v(4.0, 2.0)]);
  tin
    .add_constraints(vec![Box::new(constraint) as Box<dyn Constraint>], true)
    .unwrap();

  let members: Vec<_> = tin
    .edges()
    .filter(|e| e.is_constraint_line_member() && e.constraint_line_index() == Some(0))
    .collect();
  assert!(!members.is_empty());
  assert!(tin.is_conformant());
}

#[test]
fn diamond_polygon_region() {
  let mut tin = IncrementalTin::new(1.0).unwrap();
  tin
    .add_vertices(vec![
      v(-2.0, -2.0),
      v(6.0, -2.0),
      v(6.0, 6.0),
      v(-2.0, 6.0),
      v(2.0, 2.0),
    ])
    .unwrap();
  let poly = PolygonConstraint::from_vertices(vec![v(0.0, 0.0), v(4.0, 0.0), v(2.0, 3.0)]);
  tin
    .add_constraints(vec![Box::new(poly) as Box<dyn Constraint>], true)
    .unwrap();

  assert!(tin.constraints()[0].defines_constrained_region());
  let borders = tin
    .edges()
    .filter(|e| e.constraint_region_border_index() == Some(0))
    .count();
  assert_eq!(borders, 3);
  // the interior vertex (2, 2) fans the region into three triangles, so
  // the flood marks its three spokes
  let interior = tin
    .edges()
    .filter(|e| e.constraint_region_interior_index() == Some(0))
    .count();
  assert_eq!(interior, 3);
  assert_eq!(tin.count_triangles().constrained, 3);
}

#[test]
fn constraint_collinear_with_grid_vertex_splits() {
  let mut tin = IncrementalTin::new(300.0).unwrap();
  tin.add_vertices(grid(3, 400.0, 300.0)).unwrap();
  let constraint = LinearConstraint::from_vertices(vec![v(740.0, 60.0), v(60.0, 540.0)]);
  tin
    .add_constraints(vec![Box::new(constraint) as Box<dyn Constraint>], true)
    .unwrap();

  let members: Vec<_> = tin
    .edges()
    .filter(|e| e.constraint_line_index() == Some(0))
    .collect();
  // the segment passes through (400, 300) and splits there; both halves
  // carry the same line index
  assert!(members.len() >= 2);
  assert!(members
    .iter()
    .any(|e| e.a().coords() == [400.0, 300.0] || e.b().coords() == [400.0, 300.0]));
}

#[test]
fn ruppert_converges_on_gridded_region() {
  let mut tin = IncrementalTin::new(1.0).unwrap();
  tin.add_vertices(grid(5, 1.0, 1.0)).unwrap();
  let poly = PolygonConstraint::from_vertices(vec![
    v(1.0, 1.0),
    v(3.0, 1.0),
    v(3.0, 3.0),
    v(1.0, 3.0),
  ]);
  tin
    .add_constraints(vec![Box::new(poly) as Box<dyn Constraint>], true)
    .unwrap();

  let options = RefinementOptions {
    min_angle_degrees: 20.0,
    refine_only_inside_constraints: true,
    ..RefinementOptions::default()
  };
  let mut refiner = RuppertRefiner::new(&mut tin, options).unwrap();
  assert!(refiner.refine());
  drop(refiner);

  let target = 20.0_f64;
  for tri in tin.triangles().filter(|t| !t.is_ghost()) {
    let inside = [tri.edge_a(), tri.edge_b(), tri.edge_c()]
      .iter()
      .all(|e| e.is_constraint_region_member());
    if !inside {
      continue;
    }
    let a = tri.vertex_a().coords();
    let b = tri.vertex_b().coords();
    let c = tri.vertex_c().coords();
    let side = |p: [f64; 2], q: [f64; 2]| ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt();
    let (la, lb, lc) = (side(b, c), side(a, c), side(a, b));
    let angle = |opp: f64, s1: f64, s2: f64| {
      ((s1 * s1 + s2 * s2 - opp * opp) / (2.0 * s1 * s2))
        .clamp(-1.0, 1.0)
        .acos()
        .to_degrees()
    };
    let min_angle = angle(la, lb, lc)
      .min(angle(lb, la, lc))
      .min(angle(lc, la, lb));
    assert!(
      min_angle >= target - 0.1,
      "triangle with min angle {} inside the region",
      min_angle
    );
  }
}

#[test]
fn duplicate_insertion_is_idempotent() {
  let mut tin = IncrementalTin::new(1.0).unwrap();
  tin.add_vertices(grid(3, 1.0, 1.0)).unwrap();
  let count = tin.count_triangles();
  let vertices = tin.vertex_count();
  // re-adding every vertex merges them all
  for p in grid(3, 1.0, 1.0) {
    assert!(!tin.add(p).unwrap());
  }
  assert_eq!(tin.vertex_count(), vertices);
  assert_eq!(tin.count_triangles(), count);
}

#[test]
fn reapplied_constraint_leaves_mesh_unchanged() {
  let build = || {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin
      .add_vertices(vec![
        v(0.0, 0.0),
        v(4.0, 0.0),
        v(4.0, 4.0),
        v(0.0, 4.0),
        v(2.0, 2.0),
      ])
      .unwrap();
    tin
  };
  let constraint = LinearConstraint::from_vertices(vec![v(0.0, 2.0), v(4.0, 2.0)]);

  let mut once = build();
  once
    .add_constraints(vec![constraint.clone_box()], true)
    .unwrap();

  let mut twice = build();
  twice
    .add_constraints(vec![constraint.clone_box()], true)
    .unwrap();
  twice
    .add_constraints(vec![constraint.clone_box()], true)
    .unwrap();

  assert_eq!(once.vertex_count(), twice.vertex_count());
  let edge_set = |tin: &IncrementalTin| {
    let mut edges: Vec<([f64; 2], [f64; 2])> = tin
      .edges()
      .filter(|e| !e.is_ghost())
      .map(|e| (e.a().coords(), e.b().coords()))
      .collect();
    edges.sort_by(|a, b| a.partial_cmp(b).unwrap());
    edges
  };
  assert_eq!(edge_set(&once), edge_set(&twice));
}

#[test]
fn refine_once_prefix_matches_full_refinement() {
  let build = || {
    let mut tin = IncrementalTin::new(1.0).unwrap();
    tin
      .add_vertices(vec![
        v(0.0, 0.0),
        v(8.0, 0.0),
        v(8.0, 1.0),
        v(0.0, 1.0),
        v(4.0, 0.3),
      ])
      .unwrap();
    let ring = PolygonConstraint::from_vertices(vec![
      v(0.0, 0.0),
      v(8.0, 0.0),
      v(8.0, 1.0),
      v(0.0, 1.0),
    ]);
    tin
      .add_constraints(vec![Box::new(ring) as Box<dyn Constraint>], true)
      .unwrap();
    tin
  };
  let options = RefinementOptions {
    refine_only_inside_constraints: true,
    ..RefinementOptions::default()
  };

  let steiner_set = |tin: &IncrementalTin| {
    let mut pts: Vec<[f64; 2]> = tin
      .vertices()
      .filter(|p| p.is_synthetic())
      .map(|p| p.coords())
      .collect();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    pts
  };

  let mut direct = build();
  let mut refiner = RuppertRefiner::new(&mut direct, options.clone()).unwrap();
  assert!(refiner.refine());
  drop(refiner);

  let mut stepped = build();
  let mut refiner = RuppertRefiner::new(&mut stepped, options).unwrap();
  let _first = refiner.refine_once();
  assert!(refiner.refine());
  drop(refiner);

  assert_eq!(steiner_set(&direct), steiner_set(&stepped));
}

#[test]
fn pinwheel_visits_interior_vertex_degree() {
  let mut tin = IncrementalTin::new(1.0).unwrap();
  tin.add_vertices(grid(3, 1.0, 1.0)).unwrap();
  // edges incident to the grid center, counted two ways
  let center = [1.0, 1.0];
  let incident = tin
    .edges()
    .filter(|e| e.a().coords() == center || e.b().coords() == center)
    .count();
  let spoke = tin
    .edges()
    .flat_map(|e| [e, e.dual()])
    .find(|e| e.a().coords() == center)
    .unwrap();
  assert_eq!(spoke.pinwheel().count(), incident);
}
