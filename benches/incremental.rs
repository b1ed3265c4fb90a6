use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use tinmesh::data::Vertex;
use tinmesh::IncrementalTin;

fn random_cloud(n: usize, seed: u64) -> Vec<Vertex> {
  let mut rng = SmallRng::seed_from_u64(seed);
  (0..n)
    .map(|_| {
      Vertex::new(
        rng.gen_range(0.0..100.0),
        rng.gen_range(0.0..100.0),
        rng.gen_range(0.0..10.0),
      )
    })
    .collect()
}

fn incremental_insertion(c: &mut Criterion) {
  for &n in &[1_000usize, 10_000] {
    let cloud = random_cloud(n, 11);
    c.bench_function(&format!("insert_random_{}", n), |b| {
      b.iter(|| {
        let mut tin = IncrementalTin::new(1.0).unwrap();
        tin.add_vertices(black_box(cloud.clone())).unwrap();
        black_box(tin.count_triangles())
      })
    });
  }
}

fn point_location(c: &mut Criterion) {
  let mut tin = IncrementalTin::new(1.0).unwrap();
  tin.add_vertices(random_cloud(10_000, 7)).unwrap();
  let queries = random_cloud(1_000, 13);
  c.bench_function("locate_1000_in_10k", |b| {
    b.iter(|| {
      let mut nav = tin.navigator();
      let mut hits = 0usize;
      for q in &queries {
        if nav.containing_triangle(q.x(), q.y()).is_some() {
          hits += 1;
        }
      }
      black_box(hits)
    })
  });
}

criterion_group!(benches, incremental_insertion, point_location);
criterion_main!(benches);
