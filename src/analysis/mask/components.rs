//! 4-connected component labelling over a binary mask.

/// Summary statistics of one connected component.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Component {
    pub(crate) pixels: usize,
    pub(crate) sum_x: f64,
    pub(crate) sum_y: f64,
    pub(crate) min_x: usize,
    pub(crate) max_x: usize,
    pub(crate) min_y: usize,
    pub(crate) max_y: usize,
}

impl Component {
    fn seed(x: usize, y: usize) -> Self {
        Self {
            pixels: 0,
            sum_x: 0.0,
            sum_y: 0.0,
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
        }
    }

    fn add(&mut self, x: usize, y: usize) {
        self.pixels += 1;
        self.sum_x += x as f64;
        self.sum_y += y as f64;
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    /// Mean pixel position in `(x, y)` pixel coordinates.
    pub(crate) fn centroid(&self) -> (f64, f64) {
        let count = self.pixels as f64;
        (self.sum_x / count, self.sum_y / count)
    }

    /// Bounding-box extent as `(max - min)` per axis, `(width, height)`.
    pub(crate) fn extent(&self) -> (usize, usize) {
        (self.max_x - self.min_x, self.max_y - self.min_y)
    }
}

/// Label every component of `foreground` (row-major, `width * height`).
///
/// Components are returned in discovery order of a row-major scan.
pub(crate) fn label_components(foreground: &[bool], width: usize, height: usize) -> Vec<Component> {
    debug_assert_eq!(foreground.len(), width * height);
    let mut visited = vec![false; foreground.len()];
    let mut stack = Vec::new();
    let mut components = Vec::new();

    for start in 0..foreground.len() {
        if !foreground[start] || visited[start] {
            continue;
        }
        let mut component = Component::seed(start % width, start / width);
        visited[start] = true;
        stack.push(start);
        while let Some(index) = stack.pop() {
            let (x, y) = (index % width, index / width);
            component.add(x, y);
            let mut visit = |neighbour: usize| {
                if foreground[neighbour] && !visited[neighbour] {
                    visited[neighbour] = true;
                    stack.push(neighbour);
                }
            };
            if x > 0 {
                visit(index - 1);
            }
            if x + 1 < width {
                visit(index + 1);
            }
            if y > 0 {
                visit(index - width);
            }
            if y + 1 < height {
                visit(index + width);
            }
        }
        components.push(component);
    }
    components
}

/// Largest component by pixel count; ties keep the earliest discovered.
pub(crate) fn largest(components: &[Component]) -> Option<&Component> {
    components.iter().fold(None, |best: Option<&Component>, candidate| match best {
        Some(current) if current.pixels >= candidate.pixels => Some(current),
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&str]) -> (Vec<bool>, usize, usize) {
        let height = rows.len();
        let width = rows[0].len();
        let cells = rows
            .iter()
            .flat_map(|row| row.chars().map(|c| c == '#'))
            .collect();
        (cells, width, height)
    }

    #[test]
    fn diagonal_neighbours_are_separate_components() {
        let (cells, w, h) = grid(&["#.", ".#"]);
        let components = label_components(&cells, w, h);
        assert_eq!(components.len(), 2);
        assert!(components.iter().all(|c| c.pixels == 1));
    }

    #[test]
    fn bounding_box_and_centroid_follow_pixels() {
        let (cells, w, h) = grid(&["....", ".##.", ".###", "...."]);
        let components = label_components(&cells, w, h);
        assert_eq!(components.len(), 1);
        let component = &components[0];
        assert_eq!(component.pixels, 5);
        assert_eq!(component.extent(), (2, 1));
        let (cx, cy) = component.centroid();
        assert!((cx - 1.8).abs() < 1e-9);
        assert!((cy - 1.6).abs() < 1e-9);
    }

    #[test]
    fn ties_keep_the_first_component_in_scan_order() {
        let (cells, w, h) = grid(&["##..", "....", "..##"]);
        let components = label_components(&cells, w, h);
        let best = largest(&components).unwrap();
        assert_eq!((best.min_x, best.min_y), (0, 0));
    }

    #[test]
    fn largest_wins_regardless_of_order() {
        let (cells, w, h) = grid(&["#...", "....", ".###"]);
        let components = label_components(&cells, w, h);
        assert_eq!(largest(&components).unwrap().pixels, 3);
        assert!(largest(&[]).is_none());
    }
}
