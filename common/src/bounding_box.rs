use cgmath::{MetricSpace, Point3, Vector3};

use crate::transform::Transform;

/// An axis-aligned bounding box in 3D space.
///
/// A box starts out empty and grows through [`combine`](Self::combine) and
/// [`combine_point`](Self::combine_point). Combining with an empty box is a
/// no-op, so boxes can be folded over any number of sources.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingBox {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// A box containing nothing.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Creates a box from two opposite corners, in any order.
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Creates the smallest box enclosing all the given points.
    /// Returns an empty box if the slice is empty.
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let mut bounds = Self::empty();
        for &point in points {
            bounds.combine_point(point);
        }
        bounds
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn min(&self) -> Point3<f64> {
        self.min
    }

    pub fn max(&self) -> Point3<f64> {
        self.max
    }

    /// Returns the 8 corner points of the box.
    pub fn corners(&self) -> [Point3<f64>; 8] {
        [
            Point3::new(self.min.x, self.min.y, self.min.z),
            Point3::new(self.max.x, self.min.y, self.min.z),
            Point3::new(self.min.x, self.max.y, self.min.z),
            Point3::new(self.max.x, self.max.y, self.min.z),
            Point3::new(self.min.x, self.min.y, self.max.z),
            Point3::new(self.max.x, self.min.y, self.max.z),
            Point3::new(self.min.x, self.max.y, self.max.z),
            Point3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    /// Grows this box to include `point`.
    pub fn combine_point(&mut self, point: Point3<f64>) -> &mut Self {
        self.min = Point3::new(
            self.min.x.min(point.x),
            self.min.y.min(point.y),
            self.min.z.min(point.z),
        );
        self.max = Point3::new(
            self.max.x.max(point.x),
            self.max.y.max(point.y),
            self.max.z.max(point.z),
        );
        self
    }

    /// Grows this box to include `other`.
    pub fn combine(&mut self, other: &BoundingBox) -> &mut Self {
        if !other.is_empty() {
            self.combine_point(other.min);
            self.combine_point(other.max);
        }
        self
    }

    /// Returns the box enclosing both `self` and `other`.
    pub fn combined(&self, other: &BoundingBox) -> Self {
        let mut result = *self;
        result.combine(other);
        result
    }

    /// Transforms the box in place.
    ///
    /// All 8 corners are transformed and re-enclosed, so the result contains
    /// the transformed original but may be larger than it under rotation.
    pub fn transform(&mut self, transform: &Transform) -> &mut Self {
        if self.is_empty() {
            return self;
        }

        let corners = self.corners();
        let mut result = Self::empty();
        for corner in corners {
            result.combine_point(transform.transform_point(corner));
        }
        *self = result;
        self
    }

    pub fn transformed(&self, transform: &Transform) -> Self {
        let mut result = *self;
        result.transform(transform);
        result
    }

    /// Center of the box. The origin for an empty box.
    pub fn center(&self) -> Point3<f64> {
        if self.is_empty() {
            return Point3::new(0.0, 0.0, 0.0);
        }
        Point3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Extents along each axis. Zero for an empty box.
    pub fn size(&self) -> Vector3<f64> {
        if self.is_empty() {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        self.max - self.min
    }

    /// Radius of the sphere through the box corners (half the diagonal).
    pub fn bounding_sphere_radius(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.min.distance(self.max) / 2.0
    }

    /// Tests if a point is inside the box (inclusive of boundaries).
    pub fn contains_point(&self, point: Point3<f64>) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Tests if `other` lies entirely inside this box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.is_empty() || (self.contains_point(other.min) && self.contains_point(other.max))
    }

    /// Tests if this box intersects another box.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }
}
