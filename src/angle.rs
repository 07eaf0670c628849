use crate::pose::Point;

/// Interior angle at `vertex` between the rays towards `a` and `c`, in degrees.
///
/// The result is always the smaller of the two angles between the rays, so it lies in
/// `[0, 180]`. Coincident points are not rejected: `atan2(0, 0)` is zero, so the
/// result is well defined but meaningless.
pub(crate) fn joint_angle(a: Point, vertex: Point, c: Point) -> f32 {
    let radians = (c.y - vertex.y).atan2(c.x - vertex.x) - (a.y - vertex.y).atan2(a.x - vertex.x);
    let angle = radians.to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}
