mod common;

use std::collections::HashSet;

use common::{endpoint_pairs, noise_volume};
use voxtrace_core::{Calibration, Point3, Volume};
use voxtrace_search::{
    AStarSearch, BackendChoice, BidirectionalSearch, Connectivity, Dijkstra, Euclidean,
    FillConfig, FloodFill, Path, Reciprocal, SearchConfig,
};

fn reciprocal() -> Reciprocal {
    Reciprocal::new(0.0, 255.0)
}

fn uniform_cost(v: &Volume, a: Point3, b: Point3, config: SearchConfig) -> Path {
    AStarSearch::new(v, a, b, reciprocal(), Dijkstra, config)
        .unwrap()
        .run()
        .unwrap()
        .path
        .unwrap()
}

fn astar(v: &Volume, a: Point3, b: Point3, config: SearchConfig) -> Path {
    AStarSearch::new(v, a, b, reciprocal(), Euclidean, config)
        .unwrap()
        .run()
        .unwrap()
        .path
        .unwrap()
}

fn bidirectional(v: &Volume, a: Point3, b: Point3, config: SearchConfig) -> Path {
    BidirectionalSearch::new(v, a, b, reciprocal(), Euclidean, config)
        .unwrap()
        .run()
        .unwrap()
        .path
        .unwrap()
}

#[test]
fn uniform_cost_is_never_beaten() {
    let v = noise_volume(1, 24, 24, 6, 1.0, 255.0);
    for (a, b) in endpoint_pairs(2, &v, 6, 8) {
        let best = uniform_cost(&v, a, b, SearchConfig::default()).total_cost();
        let tol = best * 1e-9;
        for other in [
            astar(&v, a, b, SearchConfig::default()),
            bidirectional(&v, a, b, SearchConfig::default()),
        ] {
            assert!(other.total_cost() >= best - tol, "{a} -> {b}");
        }
        // Same optimum under the admissible heuristic.
        let a_star = astar(&v, a, b, SearchConfig::default()).total_cost();
        assert!((a_star - best).abs() <= tol, "{a} -> {b}: {a_star} vs {best}");
    }
}

#[test]
fn six_connected_paths_take_face_steps() {
    let v = noise_volume(3, 16, 16, 4, 1.0, 255.0);
    let config = SearchConfig::default().with_connectivity(Connectivity::Six);
    let path = astar(&v, Point3::new(0, 0, 0), Point3::new(15, 15, 3), config);
    for w in path.points().windows(2) {
        assert_eq!(w[0].manhattan(w[1]), 1);
    }
    assert!(path.len() >= 15 + 15 + 3 + 1);
}

#[test]
fn backends_agree() {
    let v = noise_volume(4, 18, 14, 8, 20.0, 255.0);
    let (a, b) = (Point3::new(1, 2, 0), Point3::new(16, 12, 7));
    let config = |backend| {
        SearchConfig::default()
            .with_backend(backend)
            .with_disk_cache_slices(2)
    };

    let array = astar(&v, a, b, config(BackendChoice::Array));
    let bi_array = bidirectional(&v, a, b, config(BackendChoice::Array));
    for backend in [BackendChoice::Sparse, BackendChoice::Disk] {
        let p = astar(&v, a, b, config(backend));
        assert_eq!(p.points(), array.points(), "{backend}");
        assert!((p.total_cost() - array.total_cost()).abs() < 1e-6);
        assert!((p.length() - array.length()).abs() < 1e-6);
        assert_eq!(bidirectional(&v, a, b, config(backend)), bi_array, "{backend}");
    }

    let tree = |backend| {
        let mut fill = FloodFill::new(
            &v,
            vec![a],
            reciprocal(),
            FillConfig::default()
                .with_threshold(0.2)
                .with_search(config(backend)),
        )
        .unwrap();
        fill.run().unwrap();
        fill.to_tree().unwrap()
    };
    let t = tree(BackendChoice::Array);
    assert!(t.len() > 1);
    assert_eq!(tree(BackendChoice::Sparse), t);
    assert_eq!(tree(BackendChoice::Disk), t);
}

#[test]
fn equal_cost_ties_resolve_identically() {
    // Every voxel costs the same, so many shortest paths tie.
    let v = Volume::from_fn(30, 30, 3, Calibration::default(), |_| 128.0).unwrap();
    let (a, b) = (Point3::new(2, 3, 0), Point3::new(27, 21, 2));
    for run in [astar, uniform_cost, bidirectional] {
        let first = run(&v, a, b, SearchConfig::default());
        let second = run(&v, a, b, SearchConfig::default());
        assert_eq!(first.points(), second.points());
        assert_eq!(first.total_cost().to_bits(), second.total_cost().to_bits());
    }
}

#[test]
fn bidirectional_stays_close_to_optimal() {
    let v = noise_volume(5, 32, 32, 4, 100.0, 255.0);
    for (a, b) in endpoint_pairs(6, &v, 8, 16) {
        let best = uniform_cost(&v, a, b, SearchConfig::default()).total_cost();
        let bi = bidirectional(&v, a, b, SearchConfig::default()).total_cost();
        assert!(bi <= best * 1.5, "{a} -> {b}: {bi} vs {best}");
    }
}

#[test]
fn unbounded_fill_visits_foreground_once() {
    // A solid ball of radius 6 inside dark noise.
    let centre = Point3::new(10, 10, 6);
    let v = Volume::from_fn(21, 21, 13, Calibration::default(), |p| {
        if p.distance_sq(centre) <= 36 { 220.0 } else { 5.0 }
    })
    .unwrap();
    let ball = v.bounds_iter_count(|x| x > 100.0);

    for connectivity in [Connectivity::Six, Connectivity::Eighteen, Connectivity::TwentySix] {
        let config = FillConfig::default()
            .with_foreground_threshold(100.0)
            .with_search(SearchConfig::default().with_connectivity(connectivity));
        let mut fill = FloodFill::new(&v, vec![centre], reciprocal(), config).unwrap();
        let out = fill.run().unwrap();
        let reached = fill.reached().unwrap();
        let unique: HashSet<Point3> = reached.iter().map(|(p, _)| *p).collect();
        assert_eq!(reached.len(), ball, "{connectivity}");
        assert_eq!(unique.len(), ball);
        assert_eq!(out.stats.closed, ball);
        assert!(unique.iter().all(|p| p.distance_sq(centre) <= 36));
    }
}

trait CountWhere {
    fn bounds_iter_count(&self, pred: impl Fn(f32) -> bool) -> usize;
}

impl CountWhere for Volume {
    fn bounds_iter_count(&self, pred: impl Fn(f32) -> bool) -> usize {
        self.as_slice().iter().filter(|&&x| pred(x)).count()
    }
}
