use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates, (x1, y1) top-left and (x2, y2) bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        iou(self, other)
    }
}

/// Intersection over union. Disjoint boxes and a non-positive union give 0.
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    if ix2 < ix1 || iy2 < iy1 {
        return 0.0;
    }

    let intersection = (ix2 - ix1) * (iy2 - iy1);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_boxes() {
        let a = BBox::new(10.0, 10.0, 50.0, 30.0);
        assert_eq!(iou(&a, &a), 1.0);
    }

    #[test]
    fn test_method_matches_free_fn() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::from_xywh(5.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), iou(&a, &b));
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_symmetry() {
        let boxes = [
            BBox::new(0.0, 0.0, 10.0, 10.0),
            BBox::new(5.0, 5.0, 15.0, 15.0),
            BBox::new(2.0, -3.0, 7.5, 4.0),
            BBox::new(100.0, 100.0, 101.0, 140.0),
        ];
        for a in &boxes {
            for b in &boxes {
                assert_eq!(iou(a, b), iou(b, a));
            }
        }
    }

    #[test]
    fn test_partial_overlap() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 5.0, 15.0, 15.0);
        // 25 / (100 + 100 - 25)
        assert!((iou(&a, &b) - 25.0 / 175.0).abs() < 1e-6);
    }

    #[test]
    fn test_disjoint_and_touching() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(iou(&a, &BBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
        assert_eq!(iou(&a, &BBox::new(10.0, 0.0, 20.0, 10.0)), 0.0);
    }

    #[test]
    fn test_degenerate_union_guard() {
        let point = BBox::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(iou(&point, &point), 0.0);
    }

    #[test]
    fn test_xywh_conversion() {
        let b = BBox::from_xywh(3.0, 4.0, 10.0, 20.0);
        assert_eq!(b, BBox::new(3.0, 4.0, 13.0, 24.0));
        assert_eq!(b.width(), 10.0);
        assert_eq!(b.height(), 20.0);
    }
}
