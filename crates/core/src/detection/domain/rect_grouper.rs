use crate::shared::bounding_box::{BoundingBox, DetectionSet};

/// Merge raw cascade hits into confirmed detections.
///
/// Hits are clustered by [`BoundingBox::is_similar`], each cluster is averaged,
/// and clusters supported by `min_neighbors` hits or fewer are dropped. A
/// cluster lying inside a better-supported one is dropped too. With
/// `min_neighbors == 0` the raw hits are returned unchanged.
///
/// Output order follows the first hit of each cluster, so equal input gives
/// equal output.
pub fn group_rectangles(rects: &[BoundingBox], min_neighbors: usize, eps: f64) -> DetectionSet {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let (labels, n_classes) = partition(rects, eps);

    let mut sums = vec![[0i64; 4]; n_classes];
    let mut counts = vec![0usize; n_classes];
    for (rect, &label) in rects.iter().zip(&labels) {
        let s = &mut sums[label];
        s[0] += rect.x as i64;
        s[1] += rect.y as i64;
        s[2] += rect.width as i64;
        s[3] += rect.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<BoundingBox> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &n)| {
            let avg = |v: i64| (v as f64 / n as f64).round() as i32;
            BoundingBox::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3]))
        })
        .collect();

    let mut grouped = DetectionSet::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let swallowed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.is_inside(r2, dx, dy) && (n2 > n1.max(3) || n1 < 3)
        });
        if !swallowed {
            grouped.push(*r1);
        }
    }
    grouped
}

/// Union-find over the similarity relation. Labels are numbered in order of
/// first appearance.
fn partition(rects: &[BoundingBox], eps: f64) -> (Vec<usize>, usize) {
    let mut parent: Vec<usize> = (0..rects.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if rects[i].is_similar(&rects[j], eps) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    let mut root_label = vec![usize::MAX; rects.len()];
    let mut labels = Vec::with_capacity(rects.len());
    let mut next = 0;
    for i in 0..rects.len() {
        let root = find(&mut parent, i);
        if root_label[root] == usize::MAX {
            root_label[root] = next;
            next += 1;
        }
        labels.push(root_label[root]);
    }
    (labels, next)
}
